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
use std::str::FromStr;

/// One chart suggestion as the model emitted it.
///
/// Only the JSON structure is checked on the way in; whether `chart_type`
/// names a known chart and whether the columns exist is decided at render time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub chart_type: Option<String>,
    pub x_column: Option<String>,
    pub y_column: Option<String>,
    #[serde(default)]
    pub reason: String,
}
impl ChartSpec {
    pub fn new(chart_type: impl Into<String>) -> Self {
        Self {
            chart_type: Some(chart_type.into()),
            ..Default::default()
        }
    }
    pub fn with_x(mut self, column: impl Into<String>) -> Self {
        self.x_column = Some(column.into());
        self
    }
    pub fn with_y(mut self, column: impl Into<String>) -> Self {
        self.y_column = Some(column.into());
        self
    }
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
    /// Lower-cased, trimmed type tag used for registry lookups.
    pub fn type_tag(&self) -> Option<String> {
        self.chart_type
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
    }
    /// Display label for captions, e.g. `Bar` for `"bar"`.
    pub fn type_title(&self) -> String {
        match self.type_tag() {
            Some(tag) => match ChartKind::from_str(&tag) {
                Ok(kind) => kind.title().to_string(),
                Err(_) => capitalise(&tag),
            },
            None => "Unknown".to_string(),
        }
    }
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Pie,
    Histogram,
    Area,
    Map,
    Heatmap,
}
impl ChartKind {
    pub const ALL: [ChartKind; 8] = [
        ChartKind::Bar,
        ChartKind::Line,
        ChartKind::Scatter,
        ChartKind::Pie,
        ChartKind::Histogram,
        ChartKind::Area,
        ChartKind::Map,
        ChartKind::Heatmap,
    ];
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Scatter => "scatter",
            ChartKind::Pie => "pie",
            ChartKind::Histogram => "histogram",
            ChartKind::Area => "area",
            ChartKind::Map => "map",
            ChartKind::Heatmap => "heatmap",
        }
    }
    pub fn title(&self) -> &'static str {
        match self {
            ChartKind::Bar => "Bar",
            ChartKind::Line => "Line",
            ChartKind::Scatter => "Scatter",
            ChartKind::Pie => "Pie",
            ChartKind::Histogram => "Histogram",
            ChartKind::Area => "Area",
            ChartKind::Map => "Map",
            ChartKind::Heatmap => "Heatmap",
        }
    }
}
impl FromStr for ChartKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase();
        ChartKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == tag)
            .ok_or_else(|| format!("unknown chart type '{s}'"))
    }
}
impl std::fmt::Display for ChartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
