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


use crate::dataset::{format_number, ColumnKind, Dataset};
use crate::error::DatasetResult;
use polars::prelude::QuantileMethod;
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    pub total_count: usize,
    pub null_count: usize,
    pub distinct_count: usize,
    pub numeric_stats: Option<NumericStats>,
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub q25: Option<f64>,
    pub median: Option<f64>,
    pub q75: Option<f64>,
    pub max: Option<f64>,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub rows: usize,
    pub columns: usize,
    pub numeric_count: usize,
    pub categorical_count: usize,
    pub temporal_count: usize,
    pub geographic_count: usize,
    pub total_nulls: usize,
}
/// `describe()`-style table over the numeric columns.
#[derive(Debug, Clone)]
pub struct DescribeTable {
    pub columns: Vec<String>,
    pub rows: Vec<(String, Vec<Option<f64>>)>,
}
impl DescribeTable {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
    /// Cells rounded to two decimals, `NaN` where undefined.
    pub fn cell(&self, row: usize, col: usize) -> String {
        match self.rows.get(row).and_then(|(_, v)| v.get(col)).copied().flatten() {
            Some(v) => format!("{v:.2}"),
            None => "NaN".to_string(),
        }
    }
    pub fn to_text(&self) -> String {
        if self.is_empty() {
            return "(no numeric columns)".to_string();
        }
        let label_width = self.rows.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
        let widths: Vec<usize> = (0..self.columns.len())
            .map(|c| {
                (0..self.rows.len())
                    .map(|r| self.cell(r, c).len())
                    .chain(std::iter::once(self.columns[c].len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();
        let mut out = format!("{:label_width$}", "");
        for (name, w) in self.columns.iter().zip(&widths) {
            out.push_str(&format!("  {name:>w$}"));
        }
        for (r, (label, _)) in self.rows.iter().enumerate() {
            out.push('\n');
            out.push_str(&format!("{label:label_width$}"));
            for (c, w) in widths.iter().enumerate() {
                out.push_str(&format!("  {:>w$}", self.cell(r, c)));
            }
        }
        out
    }
}
#[derive(Debug, Default)]
pub struct DataProfiler;
impl DataProfiler {
    pub fn new() -> Self {
        Self
    }
    pub fn profile(&self, dataset: &Dataset) -> DatasetResult<Vec<ColumnProfile>> {
        let total_rows = dataset.height();
        dataset
            .kinds()
            .collect::<Vec<_>>()
            .par_iter()
            .map(|(name, kind)| self.profile_column(dataset, name, *kind, total_rows))
            .collect()
    }
    fn profile_column(
        &self,
        dataset: &Dataset,
        name: &str,
        kind: ColumnKind,
        total_rows: usize,
    ) -> DatasetResult<ColumnProfile> {
        let series = dataset.series(name)?;
        let numeric_stats = if kind.is_numeric() {
            let s_float = series.cast(&DataType::Float64)?;
            Some(calculate_numeric_stats(s_float.f64()?))
        } else {
            None
        };
        Ok(ColumnProfile {
            name: name.to_string(),
            kind,
            total_count: total_rows,
            null_count: series.null_count(),
            distinct_count: series.drop_nulls().n_unique()?,
            numeric_stats,
        })
    }
    pub fn get_dataset_summary(&self, dataset: &Dataset, profiles: &[ColumnProfile]) -> DatasetSummary {
        let count = |k: ColumnKind| profiles.iter().filter(|p| p.kind == k).count();
        DatasetSummary {
            rows: dataset.height(),
            columns: dataset.width(),
            numeric_count: count(ColumnKind::Numeric),
            categorical_count: count(ColumnKind::Categorical),
            temporal_count: count(ColumnKind::Temporal),
            geographic_count: count(ColumnKind::Geographic),
            total_nulls: profiles.iter().map(|p| p.null_count).sum(),
        }
    }
    pub fn describe(&self, profiles: &[ColumnProfile]) -> DescribeTable {
        let numeric: Vec<(&str, &NumericStats)> = profiles
            .iter()
            .filter_map(|p| p.numeric_stats.as_ref().map(|s| (p.name.as_str(), s)))
            .collect();
        type Getter = fn(&NumericStats) -> Option<f64>;
        let stats: [(&str, Getter); 8] = [
            ("count", |s| Some(s.count as f64)),
            ("mean", |s| s.mean),
            ("std", |s| s.std),
            ("min", |s| s.min),
            ("25%", |s| s.q25),
            ("50%", |s| s.median),
            ("75%", |s| s.q75),
            ("max", |s| s.max),
        ];
        DescribeTable {
            columns: numeric.iter().map(|(n, _)| n.to_string()).collect(),
            rows: stats
                .iter()
                .map(|(label, get)| {
                    (
                        label.to_string(),
                        numeric.iter().map(|(_, s)| get(s).map(round2)).collect(),
                    )
                })
                .collect(),
        }
    }
    /// One line per column, for prompts.
    pub fn summary_text(&self, profiles: &[ColumnProfile]) -> String {
        profiles
            .iter()
            .map(|p| {
                let mut line = format!(
                    "- {} ({}): {} nulls, {} distinct",
                    p.name, p.kind, p.null_count, p.distinct_count
                );
                if let Some(stats) = &p.numeric_stats {
                    if let (Some(min), Some(max), Some(mean)) = (stats.min, stats.max, stats.mean) {
                        line.push_str(&format!(
                            ", min {}, max {}, mean {}",
                            format_number(round2(min)),
                            format_number(round2(max)),
                            format_number(round2(mean))
                        ));
                    }
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
fn calculate_numeric_stats(s_f64: &Float64Chunked) -> NumericStats {
    NumericStats {
        count: s_f64.len() - s_f64.null_count(),
        mean: s_f64.mean(),
        std: s_f64.std(1),
        min: s_f64.min(),
        q25: s_f64.quantile(0.25, QuantileMethod::Linear).ok().flatten(),
        median: s_f64.median(),
        q75: s_f64.quantile(0.75, QuantileMethod::Linear).ok().flatten(),
        max: s_f64.max(),
    }
}
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
