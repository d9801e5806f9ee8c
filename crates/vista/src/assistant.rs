// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.


use crate::chart_spec::ChartSpec;
use crate::config::VistaConfig;
use crate::dataset::Dataset;
use crate::profile::DataProfiler;
use herald::{ApiClient, FragmentStream};
use llm_contracts::{LLMError, LLMResult, ProviderRequest};
use std::sync::Arc;
use tracing::{debug, info};

pub const ANALYST_INSTRUCTION: &str = "You are Dattavism, a data analysis assistant. \
     Answer from the dataset and report you are given and say so when they do not contain the answer.";

/// Text-only model calls about the loaded dataset: context detection, the
/// written report and streamed question answering.
pub struct InsightAssistant {
    client: Arc<dyn ApiClient>,
    model: String,
    preview_rows: usize,
}

impl InsightAssistant {
    pub fn new(client: Arc<dyn ApiClient>, model: impl Into<String>, config: &VistaConfig) -> Self {
        Self {
            client,
            model: model.into(),
            preview_rows: config.preview_rows,
        }
    }

    fn request(&self, prompt: String) -> ProviderRequest {
        ProviderRequest::new(self.model.clone())
            .with_system(ANALYST_INSTRUCTION)
            .with_user(prompt)
    }

    fn column_summary(dataset: &Dataset) -> String {
        dataset
            .kinds()
            .map(|(name, kind)| format!("- {name} ({kind})"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn context_prompt(&self, dataset: &Dataset) -> String {
        format!(
            "Look at this dataset and describe its domain: what it is about, what one row \
             represents and what each column most likely means.\n\n\
             Columns:\n{}\n\nFirst {} rows:\n{}\n",
            Self::column_summary(dataset),
            self.preview_rows.min(dataset.height()),
            dataset.preview_text(self.preview_rows)
        )
    }

    pub fn report_prompt(&self, dataset: &Dataset) -> LLMResult<String> {
        let profiler = DataProfiler::new();
        let profiles = profiler
            .profile(dataset)
            .map_err(|e| LLMError::Configuration(format!("Dataset could not be profiled: {e}")))?;
        let summary = profiler.get_dataset_summary(dataset, &profiles);
        Ok(format!(
            "Write a detailed analysis report of this dataset in markdown with the sections \
             Overview, Key Statistics, Trends, Anomalies and Recommendations.\n\n\
             Shape: {} rows x {} columns ({} numeric, {} categorical, {} temporal, {} geographic; \
             {} missing cells)\nColumn statistics:\n{}\n\nFirst {} rows:\n{}\n",
            summary.rows,
            summary.columns,
            summary.numeric_count,
            summary.categorical_count,
            summary.temporal_count,
            summary.geographic_count,
            summary.total_nulls,
            profiler.summary_text(&profiles),
            self.preview_rows.min(dataset.height()),
            dataset.preview_text(self.preview_rows)
        ))
    }

    pub async fn detect_context(&self, dataset: &Dataset) -> LLMResult<String> {
        let response = self
            .client
            .send_request(self.request(self.context_prompt(dataset)))
            .await?;
        info!(tokens = response.usage.total_tokens, "Detected dataset context");
        Ok(response.content)
    }

    pub async fn generate_report(&self, dataset: &Dataset) -> LLMResult<String> {
        let response = self
            .client
            .send_request(self.request(self.report_prompt(dataset)?))
            .await?;
        info!(tokens = response.usage.total_tokens, "Generated dataset report");
        Ok(response.content)
    }

    pub fn answer_prompt(
        &self,
        history: &str,
        report: &str,
        dataset: &Dataset,
        question: &str,
        charts: Option<&[ChartSpec]>,
    ) -> String {
        let mut prompt = String::new();
        if !history.trim().is_empty() {
            prompt.push_str(&format!("Conversation so far:\n{history}\n\n"));
        }
        prompt.push_str(&format!("Report:\n{report}\n\n"));
        prompt.push_str(&format!(
            "Dataset preview ({} rows in total):\n{}\n\n",
            dataset.height(),
            dataset.preview_text(self.preview_rows)
        ));
        if let Some(specs) = charts.filter(|specs| !specs.is_empty()) {
            prompt.push_str("Charts shown to the user:\n");
            for (i, spec) in specs.iter().enumerate() {
                prompt.push_str(&format!(
                    "{}. {} of {} against {}: {}\n",
                    i + 1,
                    spec.type_title(),
                    spec.y_column.as_deref().unwrap_or("-"),
                    spec.x_column.as_deref().unwrap_or("-"),
                    spec.reason
                ));
            }
            prompt.push('\n');
        }
        prompt.push_str(&format!("Question: {question}\n"));
        prompt
    }

    /// Streams the answer; the caller drains and paces the fragments.
    pub async fn answer(
        &self,
        history: &str,
        report: &str,
        dataset: &Dataset,
        question: &str,
        charts: Option<&[ChartSpec]>,
    ) -> LLMResult<FragmentStream> {
        if question.trim().is_empty() {
            return Err(LLMError::Configuration("Question is empty".to_string()));
        }
        let prompt = self.answer_prompt(history, report, dataset, question, charts);
        debug!(prompt_chars = prompt.len(), "Asking question");
        self.client.send_streaming_request(self.request(prompt)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llm_contracts::{ProviderResponse, Usage};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        prompts: Mutex<Vec<String>>,
    }

    fn user_text(request: &ProviderRequest) -> String {
        request
            .messages
            .iter()
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[async_trait]
    impl ApiClient for Recorder {
        async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
            self.prompts.lock().unwrap().push(user_text(&request));
            Ok(ProviderResponse {
                content: "Retail sales by category.".into(),
                model: request.model,
                usage: Usage::default(),
                finish_reason: None,
                raw_response: serde_json::Value::Null,
            })
        }
        async fn send_streaming_request(&self, request: ProviderRequest) -> LLMResult<FragmentStream> {
            self.prompts.lock().unwrap().push(user_text(&request));
            Ok(FragmentStream::from_fragments(vec!["A ".to_string(), "leads.".to_string()]))
        }
        fn provider_name(&self) -> &'static str {
            "recorder"
        }
    }

    fn dataset() -> Dataset {
        Dataset::from_csv_bytes(b"category,sales\nA,10\nB,20\n", &VistaConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_context_and_report_prompts() {
        let recorder = Arc::new(Recorder::default());
        let assistant = InsightAssistant::new(recorder.clone(), "m", &VistaConfig::default());
        let context = assistant.detect_context(&dataset()).await.unwrap();
        assert_eq!(context, "Retail sales by category.");
        assistant.generate_report(&dataset()).await.unwrap();
        let prompts = recorder.prompts.lock().unwrap();
        assert!(prompts[0].contains("- category (categorical)"));
        assert!(prompts[1].contains("Recommendations"));
        assert!(prompts[1].contains("Shape: 2 rows x 2 columns"));
    }

    #[tokio::test]
    async fn test_answer_streams_and_includes_history() {
        let recorder = Arc::new(Recorder::default());
        let assistant = InsightAssistant::new(recorder.clone(), "m", &VistaConfig::default());
        let charts = vec![ChartSpec::new("bar").with_x("category").with_y("sales")];
        let stream = assistant
            .answer("user: hi\nassistant: hello", "report", &dataset(), "Who leads?", Some(&charts))
            .await
            .unwrap();
        assert_eq!(stream.collect_text().await.unwrap(), "A leads.");
        let prompt = recorder.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("user: hi"));
        assert!(prompt.contains("1. Bar of sales against category"));
        assert!(prompt.contains("Question: Who leads?"));
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let assistant = InsightAssistant::new(Arc::new(Recorder::default()), "m", &VistaConfig::default());
        let result = assistant.answer("", "", &dataset(), "  ", None).await;
        assert!(matches!(result, Err(LLMError::Configuration(_))));
    }
}
