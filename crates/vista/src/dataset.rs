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


use crate::config::VistaConfig;
use crate::error::{DatasetError, DatasetResult};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Temporal,
    Geographic,
}
impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Temporal => "temporal",
            ColumnKind::Geographic => "geographic",
        }
    }
    /// Geographic coordinates are numbers too.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnKind::Numeric | ColumnKind::Geographic)
    }
}
impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A read-only table plus the logical kind of each column.
#[derive(Debug, Clone)]
pub struct Dataset {
    frame: DataFrame,
    kinds: Vec<ColumnKind>,
    temporal_formats: Vec<String>,
}
impl Dataset {
    pub fn from_frame(frame: DataFrame) -> Self {
        Self::from_frame_with(frame, &VistaConfig::default())
    }
    pub fn from_frame_with(frame: DataFrame, config: &VistaConfig) -> Self {
        let kinds = frame
            .get_columns()
            .par_iter()
            .map(|column| {
                detect_kind(
                    column.as_materialized_series(),
                    &config.temporal_formats,
                    config.temporal_threshold,
                )
            })
            .collect();
        Self {
            frame,
            kinds,
            temporal_formats: config.temporal_formats.clone(),
        }
    }
    pub fn from_csv_path<P: AsRef<Path>>(path: P, config: &VistaConfig) -> DatasetResult<Self> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let file = File::open(path).map_err(|e| DatasetError::DataFileError {
            path: shown.clone(),
            source: e.into(),
        })?;
        let frame = CsvReader::new(file)
            .finish()
            .map_err(|source| DatasetError::DataFileError {
                path: shown.clone(),
                source,
            })?;
        info!(path = %shown, rows = frame.height(), columns = frame.width(), "Loaded CSV dataset");
        Ok(Self::from_frame_with(frame, config))
    }
    pub fn from_csv_bytes(bytes: &[u8], config: &VistaConfig) -> DatasetResult<Self> {
        let frame = CsvReader::new(Cursor::new(bytes.to_vec()))
            .finish()
            .map_err(|source| DatasetError::Parsing { source })?;
        debug!(rows = frame.height(), columns = frame.width(), "Parsed CSV upload");
        Ok(Self::from_frame_with(frame, config))
    }
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }
    pub fn height(&self) -> usize {
        self.frame.height()
    }
    pub fn width(&self) -> usize {
        self.frame.width()
    }
    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }
    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }
    pub fn kind(&self, name: &str) -> Option<ColumnKind> {
        self.position(name).map(|i| self.kinds[i])
    }
    pub fn kinds(&self) -> impl Iterator<Item = (String, ColumnKind)> + '_ {
        self.frame
            .get_columns()
            .iter()
            .zip(self.kinds.iter())
            .map(|(c, k)| (c.name().to_string(), *k))
    }
    pub fn numeric_column_names(&self) -> Vec<String> {
        self.kinds()
            .filter(|(_, kind)| kind.is_numeric())
            .map(|(name, _)| name)
            .collect()
    }
    pub fn series(&self, name: &str) -> DatasetResult<&Series> {
        let i = self.position(name).ok_or_else(|| DatasetError::ColumnNotFound {
            column: name.to_string(),
        })?;
        Ok(self.frame.get_columns()[i].as_materialized_series())
    }
    /// Values of a numeric column as `f64`; refuses anything that would need coercion.
    pub fn numeric_values(&self, name: &str) -> DatasetResult<Vec<Option<f64>>> {
        let series = self.series(name)?;
        if !self.kind(name).is_some_and(|k| k.is_numeric()) {
            return Err(DatasetError::NotNumeric {
                column: name.to_string(),
            });
        }
        let floats = series.cast(&DataType::Float64)?;
        Ok(floats.f64()?.into_iter().collect())
    }
    pub fn text_values(&self, name: &str) -> DatasetResult<Vec<Option<String>>> {
        let series = self.series(name)?;
        if matches!(series.dtype(), DataType::Float64 | DataType::Float32) {
            let floats = series.cast(&DataType::Float64)?;
            return Ok(floats
                .f64()?
                .into_iter()
                .map(|v| v.map(format_number))
                .collect());
        }
        let strings = series.cast(&DataType::String)?;
        Ok(strings
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect())
    }
    /// Milliseconds since the epoch for every value that parses as a date or timestamp.
    pub fn temporal_values(&self, name: &str) -> DatasetResult<Vec<Option<i64>>> {
        Ok(self
            .text_values(name)?
            .into_iter()
            .map(|v| {
                v.and_then(|s| parse_temporal(s.trim(), &self.temporal_formats))
                    .map(|dt| dt.and_utc().timestamp_millis())
            })
            .collect())
    }
    pub fn head(&self, rows: usize) -> Dataset {
        Dataset {
            frame: self.frame.head(Some(rows)),
            kinds: self.kinds.clone(),
            temporal_formats: self.temporal_formats.clone(),
        }
    }
    /// Comma separated header and first `rows` rows; nulls print as empty cells.
    pub fn preview_text(&self, rows: usize) -> String {
        let head = self.head(rows);
        let names = head.column_names();
        let columns: Vec<Vec<Option<String>>> = names
            .iter()
            .map(|name| head.text_values(name).unwrap_or_default())
            .collect();
        let mut out = names.join(",");
        for row in 0..head.height() {
            out.push('\n');
            let cells: Vec<&str> = columns
                .iter()
                .map(|col| col.get(row).and_then(|v| v.as_deref()).unwrap_or(""))
                .collect();
            out.push_str(&cells.join(","));
        }
        out
    }
    fn position(&self, name: &str) -> Option<usize> {
        self.frame
            .get_columns()
            .iter()
            .position(|c| c.name().as_str() == name)
    }
}
fn detect_kind(series: &Series, formats: &[String], threshold: f64) -> ColumnKind {
    let dtype = series.dtype();
    if matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::UInt64
            | DataType::UInt32
    ) {
        let lowered = series.name().trim().to_lowercase();
        if lowered == "latitude" || lowered == "longitude" {
            return ColumnKind::Geographic;
        }
        return ColumnKind::Numeric;
    }
    if matches!(dtype, DataType::Date | DataType::Datetime(_, _)) {
        return ColumnKind::Temporal;
    }
    if let Ok(strings) = series.str() {
        let values: Vec<&str> = strings.into_iter().flatten().collect();
        if !values.is_empty() {
            let parsed = values
                .iter()
                .filter(|v| parse_temporal(v.trim(), formats).is_some())
                .count();
            if parsed as f64 / values.len() as f64 >= threshold {
                return ColumnKind::Temporal;
            }
        }
    }
    ColumnKind::Categorical
}
pub(crate) fn parse_temporal(value: &str, formats: &[String]) -> Option<NaiveDateTime> {
    formats.iter().find_map(|format| {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
        NaiveDate::parse_from_str(value, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}
/// Whole numbers print without a fractional part.
pub fn format_number(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales() -> Dataset {
        let csv = "category,sales,when\nA,10,2024-01-03\nB,20.5,2024-01-01\nA,,2024-01-02\n";
        Dataset::from_csv_bytes(csv.as_bytes(), &VistaConfig::default()).unwrap()
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales.csv");
        std::fs::write(&path, "category,sales\nA,10\nB,20\n").unwrap();
        let ds = Dataset::from_csv_path(&path, &VistaConfig::default()).unwrap();
        assert_eq!((ds.height(), ds.width()), (2, 2));

        let missing = dir.path().join("absent.csv");
        match Dataset::from_csv_path(&missing, &VistaConfig::default()) {
            Err(DatasetError::DataFileError { path, .. }) => assert!(path.ends_with("absent.csv")),
            other => panic!("expected a file error, got {other:?}"),
        }
    }

    #[test]
    fn test_kinds_detected() {
        let ds = sales();
        assert_eq!(ds.kind("category"), Some(ColumnKind::Categorical));
        assert_eq!(ds.kind("sales"), Some(ColumnKind::Numeric));
        assert_eq!(ds.kind("when"), Some(ColumnKind::Temporal));
        assert_eq!(ds.kind("missing"), None);
    }

    #[test]
    fn test_geographic_columns() {
        let csv = "city,Latitude,longitude\nOslo,59.9,10.7\n";
        let ds = Dataset::from_csv_bytes(csv.as_bytes(), &VistaConfig::default()).unwrap();
        assert_eq!(ds.kind("Latitude"), Some(ColumnKind::Geographic));
        assert_eq!(ds.kind("longitude"), Some(ColumnKind::Geographic));
        assert_eq!(ds.numeric_column_names(), vec!["Latitude", "longitude"]);
    }

    #[test]
    fn test_numeric_values_refuse_text() {
        let ds = sales();
        assert_eq!(
            ds.numeric_values("sales").unwrap(),
            vec![Some(10.0), Some(20.5), None]
        );
        assert!(matches!(
            ds.numeric_values("category"),
            Err(DatasetError::NotNumeric { .. })
        ));
        assert!(matches!(
            ds.numeric_values("nope"),
            Err(DatasetError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_temporal_values_parse() {
        let values = sales().temporal_values("when").unwrap();
        assert!(values.iter().all(Option::is_some));
        assert!(values[1] < values[2] && values[2] < values[0]);
    }

    #[test]
    fn test_preview_text() {
        let preview = sales().preview_text(2);
        assert_eq!(preview, "category,sales,when\nA,10,2024-01-03\nB,20.5,2024-01-01");
    }

    #[test]
    fn test_bad_csv_is_parsing_error() {
        let err = Dataset::from_csv_bytes(b"", &VistaConfig::default()).unwrap_err();
        assert!(matches!(err, DatasetError::Parsing { .. }));
    }
}
