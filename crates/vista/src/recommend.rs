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
use crate::extract::extract_specs;
use crate::reshape::{unpivot_wide, VALUE_COLUMN, VARIABLE_COLUMN};
use crate::shape::TableShape;
use herald::ApiClient;
use llm_contracts::{LLMResult, ProviderRequest};
use std::sync::Arc;
use tracing::{info, warn};

pub const SYSTEM_INSTRUCTION: &str =
    "You are a data analysis assistant. You will help users visualize their datasets.";

/// Chart types the model may propose; heatmaps are only produced on request.
pub const SUGGESTABLE_TYPES: [&str; 7] =
    ["bar", "line", "scatter", "pie", "histogram", "area", "map"];

pub fn build_recommendation_prompt(
    dataset: &Dataset,
    shape: TableShape,
    unpivoted: bool,
    preview_rows: usize,
) -> String {
    let columns = dataset
        .kinds()
        .map(|(name, kind)| format!("- {name} ({kind})"))
        .collect::<Vec<_>>()
        .join("\n");
    let mut prompt = format!(
        "You are a data analyst. Based on the following dataset (summarized):\n\n\
         Shape: {} rows x {} columns\nColumns:\n{}\n",
        dataset.height(),
        dataset.width(),
        columns
    );
    if unpivoted {
        prompt.push_str(&format!(
            "The table was unpivoted from wide format: its year-like columns are stacked \
             into the `{VARIABLE_COLUMN}` column and their cells are in `{VALUE_COLUMN}`.\n"
        ));
    }
    prompt.push_str(&format!(
        "\nFirst {} rows:\n{}\n\n",
        preview_rows.min(dataset.height()),
        dataset.preview_text(preview_rows)
    ));
    prompt.push_str(
        "Suggest 2-3 useful visualizations to explore this data.\n\
         For each suggestion, include:\n",
    );
    prompt.push_str(&format!(
        "- chart_type (one of: {})\n",
        SUGGESTABLE_TYPES.join(", ")
    ));
    prompt.push_str(
        "- x_column\n\
         - y_column (if applicable)\n\
         - reason: briefly explain what insight the visualization would reveal\n\
         Recommend charts based on patterns:\n\
         - Bar charts for categorical comparisons\n\
         - Line charts for time-based trends\n\
         - Scatter plots for correlations\n\
         - Pie charts for proportions\n\
         - Histograms for distribution\n\
         - Map visualizations for geographical data (needs latitude and longitude columns)\n",
    );
    if shape == TableShape::Long {
        prompt.push_str(
            "Only suggest charts that are useful and relevant based on the structure and \
             semantics of the data. Avoid meaningless or redundant suggestions.\n",
        );
    }
    prompt.push_str(
        "\nRespond in pure JSON: an array of objects with exactly the keys \
         \"chart_type\", \"x_column\", \"y_column\" and \"reason\", like:\n\
         [\n  {\n    \"chart_type\": \"bar\",\n    \"x_column\": \"category\",\n    \
         \"y_column\": \"sales\",\n    \"reason\": \"Shows sales per category.\"\n  }\n]\n",
    );
    prompt
}

/// Outcome of one recommendation round.
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub shape: TableShape,
    /// The dataset the model saw; charts must be rendered against it.
    pub basis: Dataset,
    pub unpivoted: bool,
    pub specs: Vec<ChartSpec>,
}

pub struct RecommendationRequester {
    client: Arc<dyn ApiClient>,
    model: String,
    preview_rows: usize,
}
impl RecommendationRequester {
    pub fn new(client: Arc<dyn ApiClient>, model: impl Into<String>, config: &VistaConfig) -> Self {
        Self {
            client,
            model: model.into(),
            preview_rows: config.preview_rows,
        }
    }
    /// Sends one prompt and returns the model's text untouched.
    pub async fn request(
        &self,
        dataset: &Dataset,
        shape: TableShape,
        unpivoted: bool,
    ) -> LLMResult<String> {
        let prompt = build_recommendation_prompt(dataset, shape, unpivoted, self.preview_rows);
        let request = ProviderRequest::new(self.model.clone())
            .with_system(SYSTEM_INSTRUCTION)
            .with_user(prompt);
        let response = self.client.send_request(request).await?;
        info!(
            provider = self.client.provider_name(),
            tokens = response.usage.total_tokens,
            "Received chart recommendations"
        );
        Ok(response.content)
    }
    /// Shape detection, optional unpivot, one model call, then extraction.
    pub async fn recommend(&self, dataset: &Dataset) -> LLMResult<Recommendation> {
        let shape = TableShape::detect(dataset);
        let (basis, unpivoted) = if shape.is_wide() {
            match unpivot_wide(dataset) {
                Ok(long) => (long, true),
                Err(e) => {
                    warn!(error = %e, "Unpivot failed, recommending on the original table");
                    (dataset.clone(), false)
                }
            }
        } else {
            (dataset.clone(), false)
        };
        let reply = self.request(&basis, shape, unpivoted).await?;
        let specs = extract_specs(&reply);
        Ok(Recommendation {
            shape,
            basis,
            unpivoted,
            specs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(csv: &str) -> Dataset {
        Dataset::from_csv_bytes(csv.as_bytes(), &VistaConfig::default()).unwrap()
    }

    #[test]
    fn test_long_prompt_contents() {
        let ds = dataset("category,sales\nA,10\nB,20\n");
        let prompt = build_recommendation_prompt(&ds, TableShape::Long, false, 10);
        assert!(prompt.contains("Shape: 2 rows x 2 columns"));
        assert!(prompt.contains("- sales (numeric)"));
        assert!(prompt.contains("A,10"));
        assert!(prompt.contains("Suggest 2-3"));
        assert!(prompt.contains("Avoid meaningless or redundant suggestions."));
        assert!(prompt.contains("\"chart_type\", \"x_column\", \"y_column\" and \"reason\""));
        assert!(!prompt.contains("unpivoted"));
    }

    #[test]
    fn test_wide_prompt_notes_unpivot() {
        let ds = dataset("country,variable,value\nNO,2019,1\n");
        let prompt = build_recommendation_prompt(&ds, TableShape::Wide, true, 10);
        assert!(prompt.contains("unpivoted from wide format"));
        assert!(!prompt.contains("Avoid meaningless"));
    }

    #[test]
    fn test_preview_is_capped() {
        let csv: String = std::iter::once("n\n".to_string())
            .chain((0..25).map(|i| format!("{i}\n")))
            .collect();
        let prompt = build_recommendation_prompt(&dataset(&csv), TableShape::Long, false, 10);
        assert!(prompt.contains("First 10 rows"));
        assert!(prompt.contains("\n9\n"));
        assert!(!prompt.contains("\n10\n"));
    }
}
