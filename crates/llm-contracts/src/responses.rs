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

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A completed, non-streamed generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub content: String,
    pub model: String,
    pub usage: Usage,
    pub finish_reason: Option<String>,
    /// Provider JSON as received, kept for diagnostics.
    pub raw_response: serde_json::Value,
}

impl ProviderResponse {
    /// The provider stopped on its token budget rather than a natural end.
    pub fn was_truncated(&self) -> bool {
        self.finish_reason
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case("max_tokens") || r.eq_ignore_ascii_case("length"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Falls back to the sum when the provider omits a total.
    pub fn from_counts(prompt_tokens: u32, completion_tokens: u32, total_tokens: Option<u32>) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: total_tokens
                .unwrap_or_else(|| prompt_tokens.saturating_add(completion_tokens)),
        }
    }
}

/// One piece of a streamed generation. The last chunk of a stream has
/// `is_final` set and may carry the usage totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub request_id: Uuid,
    pub content_delta: String,
    pub is_final: bool,
    pub usage: Option<Usage>,
}

impl StreamChunk {
    pub fn delta(request_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            request_id,
            content_delta: content.into(),
            is_final: false,
            usage: None,
        }
    }

    pub fn finished(request_id: Uuid, usage: Option<Usage>) -> Self {
        Self {
            request_id,
            content_delta: String::new(),
            is_final: true,
            usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_total_fallback() {
        assert_eq!(Usage::from_counts(4, 2, None).total_tokens, 6);
        assert_eq!(Usage::from_counts(4, 2, Some(9)).total_tokens, 9);
    }

    #[test]
    fn test_truncation_reasons() {
        let mut response = ProviderResponse {
            content: String::new(),
            model: "m".into(),
            usage: Usage::default(),
            finish_reason: Some("MAX_TOKENS".into()),
            raw_response: serde_json::Value::Null,
        };
        assert!(response.was_truncated());
        response.finish_reason = Some("STOP".into());
        assert!(!response.was_truncated());
    }
}
