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


use crate::error::ConfigError;
#[derive(Debug, Clone)]
pub struct VistaConfig {
    /// Rows shown to the model in prompts and Q&A context.
    pub preview_rows: usize,
    /// Rows printed in the exported document's sample table.
    pub sample_rows: usize,
    pub chart_width: u32,
    pub chart_height: u32,
    pub histogram_bins: usize,
    pub temporal_formats: Vec<String>,
    pub temporal_threshold: f64,
}
impl Default for VistaConfig {
    fn default() -> Self {
        Self {
            preview_rows: 10,
            sample_rows: 30,
            chart_width: 800,
            chart_height: 600,
            histogram_bins: 30,
            temporal_formats: default_temporal_formats(),
            temporal_threshold: 0.8,
        }
    }
}
impl VistaConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.preview_rows == 0 {
            return Err("preview_rows must be greater than 0".to_string());
        }
        if self.sample_rows == 0 {
            return Err("sample_rows must be greater than 0".to_string());
        }
        if self.chart_width < 100 || self.chart_height < 100 {
            return Err("chart dimensions must be at least 100x100 pixels".to_string());
        }
        if self.histogram_bins == 0 {
            return Err("histogram_bins must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.temporal_threshold) {
            return Err("temporal_threshold must be between 0.0 and 1.0".to_string());
        }
        if self.temporal_formats.is_empty() {
            return Err("temporal_formats must not be empty".to_string());
        }
        Ok(())
    }
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate().map_err(|reason| ConfigError::InvalidField {
            field: "VistaConfig".to_string(),
            reason,
        })?;
        Ok(self)
    }
    pub fn with_chart_size(mut self, width: u32, height: u32) -> Self {
        self.chart_width = width;
        self.chart_height = height;
        self
    }
}
pub fn default_temporal_formats() -> Vec<String> {
    [
        "%Y-%m-%d",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%SZ",
        "%m/%d/%Y",
        "%d/%m/%Y",
        "%Y%m%d",
    ]
    .iter()
    .map(|f| f.to_string())
    .collect()
}
