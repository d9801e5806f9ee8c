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


use llm_contracts::LLMError;
use thiserror::Error;
#[derive(Error, Debug)]
pub enum VistaError {
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
    #[error("Model output error: {0}")]
    Extract(#[from] ExtractError),
    #[error("Chart error: {0}")]
    Render(#[from] RenderError),
    #[error("Export error: {0}")]
    Export(#[from] ExportError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Assistant error: {0}")]
    Llm(#[from] LLMError),
    #[error("No dataset loaded")]
    NoDataset,
}
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Failed to read data file '{path}': {source}")]
    DataFileError {
        path: String,
        #[source]
        source: polars::error::PolarsError,
    },
    #[error("Failed to parse uploaded data: {source}")]
    Parsing {
        #[source]
        source: polars::error::PolarsError,
    },
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
    #[error("Column '{column}' not found in dataset")]
    ColumnNotFound { column: String },
    #[error("Column '{column}' is not numeric")]
    NotNumeric { column: String },
    #[error("Cannot unpivot: column '{column}' clashes with a generated column name")]
    ReservedColumnName { column: String },
}
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("No JSON array of objects found in model response")]
    NoArrayFound,
    #[error("Model response contained malformed JSON: {source}")]
    MalformedJson {
        #[from]
        source: serde_json::Error,
    },
    #[error("Model response JSON is not an array")]
    NotAnArray,
}
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Unsupported chart type: {chart_type}")]
    UnsupportedChartType { chart_type: String },
    #[error("The {chart} chart needs a {axis} column")]
    MissingAxis { chart: String, axis: &'static str },
    #[error("Column '{column}' not found in dataset")]
    ColumnNotFound { column: String },
    #[error("Column '{column}' must be numeric for a {chart} chart")]
    NotNumeric { chart: String, column: String },
    #[error("Histogram requires a numerical column.")]
    HistogramNotNumeric,
    #[error("Map visualization requires 'latitude' and 'longitude' columns.")]
    MapColumnsMissing,
    #[error("Pie chart values in '{column}' must not be negative")]
    NegativeValues { column: String },
    #[error("Pie chart values in '{column}' sum to zero")]
    ZeroTotal { column: String },
    #[error("Heatmap requires at least one numerical column.")]
    NoNumericColumns,
    #[error("No plottable rows for the {chart} chart")]
    NoData { chart: String },
    #[error("Failed to read chart data: {0}")]
    Data(String),
    #[error("Chart drawing failed: {0}")]
    Drawing(String),
}
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write document '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to build PDF: {0}")]
    Pdf(String),
    #[error("Export destination must not be empty")]
    EmptyDestination,
}
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {field} {reason}")]
    InvalidField { field: String, reason: String },
}
pub type Result<T> = std::result::Result<T, VistaError>;
pub type DatasetResult<T> = std::result::Result<T, DatasetError>;
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;
pub type RenderResult<T> = std::result::Result<T, RenderError>;
pub type ExportResult<T> = std::result::Result<T, ExportError>;
impl From<DatasetError> for RenderError {
    fn from(err: DatasetError) -> Self {
        match err {
            DatasetError::ColumnNotFound { column } => RenderError::ColumnNotFound { column },
            other => RenderError::Data(other.to_string()),
        }
    }
}
impl VistaError {
    /// Everything except a dead model connection leaves the session usable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            VistaError::Llm(e) => !e.is_transport(),
            VistaError::Config(_) => false,
            _ => true,
        }
    }
    pub fn category(&self) -> &'static str {
        match self {
            VistaError::Dataset(_) => "Data",
            VistaError::Extract(_) => "Model output",
            VistaError::Render(_) => "Chart",
            VistaError::Export(_) => "Export",
            VistaError::Config(_) => "Configuration",
            VistaError::Llm(_) => "Assistant",
            VistaError::NoDataset => "Session",
        }
    }
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            VistaError::Dataset(DatasetError::Parsing { .. })
            | VistaError::Dataset(DatasetError::DataFileError { .. }) => vec![
                "Check that the file is comma separated with a header row".to_string(),
                "Make sure every row has the same number of fields".to_string(),
            ],
            VistaError::Llm(LLMError::Authentication(_)) => vec![
                "Check that GEMINI_API_KEY holds a valid key".to_string(),
            ],
            VistaError::Llm(LLMError::RateLimit) => {
                vec!["Wait a moment before sending another request".to_string()]
            }
            VistaError::NoDataset => vec!["Load a CSV file first".to_string()],
            _ => Vec::new(),
        }
    }
    pub fn user_message(&self) -> String {
        match self {
            VistaError::Dataset(DatasetError::Parsing { .. })
            | VistaError::Dataset(DatasetError::DataFileError { .. }) => {
                "The file could not be read as CSV. Please upload a valid CSV file.".to_string()
            }
            VistaError::Llm(LLMError::Authentication(_)) => {
                "The AI service rejected the API key.".to_string()
            }
            VistaError::Llm(LLMError::Timeout) => {
                "The AI service did not answer in time. Please try again.".to_string()
            }
            VistaError::Llm(e) if e.is_transport() => {
                "The AI service could not be reached. Please try again later.".to_string()
            }
            VistaError::Render(e) => e.to_string(),
            _ => self.to_string(),
        }
    }
}
