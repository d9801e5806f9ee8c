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


use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use llm_contracts::{
    LLMError, LLMResult, ProviderRequest, ProviderResponse, Role, StreamChunk, Usage,
};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{ApiClient, FragmentStream};
use crate::config::{GeminiConfig, DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECONDS};

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        endpoint: Option<String>,
        timeout_seconds: Option<u64>,
    ) -> LLMResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| LLMError::Configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            endpoint: endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS)),
        })
    }

    pub fn from_config(config: &GeminiConfig) -> LLMResult<Self> {
        let mut client = Self::new(
            config.api_key.clone(),
            Some(config.endpoint.clone()),
            Some(config.timeout_seconds),
        )?;
        client.model = config.model.clone();
        Ok(client)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Model used when a request leaves its own model empty.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn method_url(&self, model: &str, method: &str) -> String {
        let model = if model.trim().is_empty() {
            self.model.as_str()
        } else {
            model
        };
        format!("{}/models/{}:{}", self.endpoint, model, method)
    }

    fn build_gemini_payload(&self, request: &ProviderRequest) -> LLMResult<Value> {
        let contents: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = if m.role == Role::Assistant { "model" } else { "user" };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();
        if contents.is_empty() {
            return Err(LLMError::Configuration(
                "Gemini request needs at least one user message".to_string(),
            ));
        }

        let mut payload = json!({ "contents": contents });
        if let Some(system) = request.system_instruction() {
            payload["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        let mut generation = serde_json::Map::new();
        if let Some(temperature) = request.generation.temperature {
            generation.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = request.generation.max_tokens {
            generation.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if let Some(top_p) = request.generation.top_p {
            generation.insert("topP".to_string(), json!(top_p));
        }
        if let Some(stop) = &request.generation.stop_sequences {
            generation.insert("stopSequences".to_string(), json!(stop));
        }
        if !generation.is_empty() {
            payload["generationConfig"] = Value::Object(generation);
        }

        for (key, value) in &request.provider_specific {
            payload[key] = value.clone();
        }
        Ok(payload)
    }

    fn parse_gemini_response(
        &self,
        response_data: Value,
        model: String,
    ) -> LLMResult<ProviderResponse> {
        let candidate = match response_data["candidates"].get(0) {
            Some(candidate) => candidate,
            None => {
                let reason = response_data["promptFeedback"]["blockReason"]
                    .as_str()
                    .unwrap_or("no candidates returned");
                return Err(LLMError::Provider(format!(
                    "Gemini returned no candidates: {reason}"
                )));
            }
        };
        let finish_reason = candidate["finishReason"].as_str().map(|s| s.to_string());
        let content = candidate_text(candidate).ok_or_else(|| {
            LLMError::Provider(format!(
                "Failed to extract content from Gemini response (finish reason: {})",
                finish_reason.as_deref().unwrap_or("unknown")
            ))
        })?;
        let usage = response_data
            .get("usageMetadata")
            .map(parse_usage)
            .unwrap_or_default();
        let model = response_data["modelVersion"]
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or(model);

        Ok(ProviderResponse {
            content,
            model,
            usage,
            finish_reason,
            raw_response: response_data,
        })
    }

    async fn execute_request(&self, url: &str, payload: &Value) -> LLMResult<Value> {
        debug!(url, "Sending request to Gemini API");
        let exchange = async {
            let resp = self
                .client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(payload)
                .send()
                .await
                .map_err(|e| LLMError::Network(format!("Request failed: {e}")))?;
            let status = resp.status();
            info!("Received response from Gemini API: {}", status);
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(status_error(status, &body));
            }
            resp.json::<Value>()
                .await
                .map_err(|e| LLMError::Serialisation(format!("Failed to parse JSON response: {e}")))
        };
        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Request to Gemini API timed out after {} seconds",
                    self.timeout.as_secs()
                );
                Err(LLMError::Timeout)
            }
        }
    }
}

#[async_trait]
impl ApiClient for GeminiClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        let payload = self.build_gemini_payload(&request)?;
        let url = self.method_url(&request.model, "generateContent");
        let response_data = self.execute_request(&url, &payload).await?;
        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model
        };
        let response = self.parse_gemini_response(response_data, model)?;
        if response.was_truncated() {
            warn!(model = %response.model, "Gemini response hit the output token limit");
        }
        Ok(response)
    }

    async fn send_streaming_request(
        &self,
        mut request: ProviderRequest,
    ) -> LLMResult<FragmentStream> {
        request.stream = true;
        let payload = self.build_gemini_payload(&request)?;
        let url = self.method_url(&request.model, "streamGenerateContent");
        debug!(url, "Opening Gemini stream");

        let send = self
            .client
            .post(&url)
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send();
        let resp = match tokio::time::timeout(self.timeout, send).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(LLMError::Network(format!("Request failed: {e}"))),
            Err(_) => {
                warn!(
                    "Gemini stream did not open within {} seconds",
                    self.timeout.as_secs()
                );
                return Err(LLMError::Timeout);
            }
        };
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let state = SseState {
            body: resp.bytes_stream().map(|r| r.map(|b| b.to_vec())).boxed(),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            usage: None,
            done: false,
            request_id: Uuid::new_v4(),
        };
        Ok(FragmentStream::new(stream::unfold(state, next_sse_chunk)))
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}

struct SseState {
    body: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    buffer: Vec<u8>,
    pending: VecDeque<LLMResult<StreamChunk>>,
    usage: Option<Usage>,
    done: bool,
    request_id: Uuid,
}

impl SseState {
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.push_line(&line);
        }
    }

    fn push_line(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        let Some(data) = line.trim().strip_prefix("data:") else {
            return;
        };
        match parse_sse_payload(data.trim_start()) {
            Some(Ok((text, usage))) => {
                if usage.is_some() {
                    self.usage = usage;
                }
                if !text.is_empty() {
                    self.pending
                        .push_back(Ok(StreamChunk::delta(self.request_id, text)));
                }
            }
            Some(Err(e)) => {
                self.pending.push_back(Err(e));
                self.done = true;
            }
            None => {}
        }
    }

    fn finish(&mut self) {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.push_line(&rest);
        }
        self.pending
            .push_back(Ok(StreamChunk::finished(self.request_id, self.usage.take())));
        self.done = true;
    }
}

async fn next_sse_chunk(mut state: SseState) -> Option<(LLMResult<StreamChunk>, SseState)> {
    loop {
        if let Some(item) = state.pending.pop_front() {
            return Some((item, state));
        }
        if state.done {
            return None;
        }
        match state.body.next().await {
            Some(Ok(bytes)) => {
                state.buffer.extend_from_slice(&bytes);
                state.drain_lines();
            }
            Some(Err(e)) => {
                state.done = true;
                return Some((Err(LLMError::Stream(format!("Gemini stream failed: {e}"))), state));
            }
            None => state.finish(),
        }
    }
}

/// Parses one SSE `data:` payload. `None` means the event carried nothing usable.
pub(crate) fn parse_sse_payload(data: &str) -> Option<LLMResult<(String, Option<Usage>)>> {
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            debug!("Skipping unparseable Gemini stream event: {e}");
            return None;
        }
    };
    if let Some(error) = value.get("error") {
        let message = error["message"].as_str().unwrap_or("unknown stream error");
        return Some(Err(LLMError::Provider(format!("Gemini stream error: {message}"))));
    }
    let text = value["candidates"]
        .get(0)
        .and_then(candidate_text)
        .unwrap_or_default();
    let usage = value.get("usageMetadata").map(parse_usage);
    Some(Ok((text, usage)))
}

fn candidate_text(candidate: &Value) -> Option<String> {
    let parts = candidate["content"]["parts"].as_array()?;
    let texts: Vec<&str> = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.concat())
    }
}

fn parse_usage(usage_data: &Value) -> Usage {
    let count = |key: &str| u32::try_from(usage_data[key].as_u64().unwrap_or(0)).unwrap_or(u32::MAX);
    let total_tokens = usage_data["totalTokenCount"]
        .as_u64()
        .map(|total| u32::try_from(total).unwrap_or(u32::MAX));
    Usage::from_counts(
        count("promptTokenCount"),
        count("candidatesTokenCount"),
        total_tokens,
    )
}

fn status_error(status: StatusCode, body: &str) -> LLMError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LLMError::Authentication(format!("Gemini rejected the API key ({status}): {body}"))
        }
        StatusCode::TOO_MANY_REQUESTS => LLMError::RateLimit,
        _ => LLMError::Provider(format!("Gemini API error {status}: {body}")),
    }
}
