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
use crate::error::{ExtractError, ExtractResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

static JSON_ARRAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[\s*\{.*\}\s*\]").unwrap());

/// Finds the first JSON-array-of-objects shaped span in the trimmed text.
///
/// The match is greedy, so it runs from the first `[{` to the last `}]`.
pub fn locate_candidate(text: &str) -> ExtractResult<&str> {
    JSON_ARRAY_RE
        .find(text.trim())
        .map(|m| m.as_str())
        .ok_or(ExtractError::NoArrayFound)
}

pub fn parse_candidate(candidate: &str) -> ExtractResult<Vec<ChartSpec>> {
    let value: Value = serde_json::from_str(candidate)?;
    let Value::Array(items) = value else {
        return Err(ExtractError::NotAnArray);
    };
    let mut specs = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(obj) => specs.push(spec_from_object(&obj)),
            other => debug!(index, element = %other, "Skipping non-object chart suggestion"),
        }
    }
    Ok(specs)
}

/// Never fails: a response without a usable array yields no suggestions.
pub fn extract_specs(text: &str) -> Vec<ChartSpec> {
    let candidate = match locate_candidate(text) {
        Ok(candidate) => candidate,
        Err(e) => {
            debug!("{e}");
            return Vec::new();
        }
    };
    match parse_candidate(candidate) {
        Ok(specs) => {
            debug!(count = specs.len(), "Extracted chart suggestions");
            specs
        }
        Err(e) => {
            warn!(error = %e, "Discarding chart suggestions");
            Vec::new()
        }
    }
}

fn spec_from_object(obj: &Map<String, Value>) -> ChartSpec {
    ChartSpec {
        chart_type: field(obj, "chart_type"),
        x_column: field(obj, "x_column"),
        y_column: field(obj, "y_column"),
        reason: field(obj, "reason").unwrap_or_default(),
    }
}

fn field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}
