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


//! Data preparation for each chart type. Everything here is pure: it reads
//! the dataset, validates the requested columns and computes what will be drawn.

use crate::chart_spec::ChartKind;
use crate::dataset::{ColumnKind, Dataset};
use crate::error::{RenderError, RenderResult};
use crate::stats::{correlation_matrix, histogram};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ChartGeometry {
    Bars {
        labels: Vec<String>,
        values: Vec<f64>,
    },
    Points {
        points: Vec<(f64, f64)>,
    },
    Line {
        axis: LineAxis,
        points: Vec<(f64, f64)>,
        filled: bool,
    },
    Wedges {
        wedges: Vec<Wedge>,
    },
    Bins {
        bins: Vec<Bin>,
    },
    Matrix {
        columns: Vec<String>,
        coefficients: Vec<Vec<Option<f64>>>,
    },
    /// `(longitude, latitude)` pairs.
    GeoPoints {
        points: Vec<(f64, f64)>,
    },
}
/// How line x positions map back to axis labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LineAxis {
    Numeric,
    /// Milliseconds since the epoch.
    Temporal,
    /// Position `i` is the i-th distinct label in ascending order.
    Categorical(Vec<String>),
}
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Wedge {
    pub label: String,
    pub value: f64,
    pub percent: f64,
}
impl Wedge {
    pub fn annotation(&self) -> String {
        format!("{:.1}%", self.percent)
    }
}
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

pub fn required_column<'a>(
    dataset: &Dataset,
    column: Option<&'a str>,
    chart: ChartKind,
    axis: &'static str,
) -> RenderResult<&'a str> {
    let column = column.ok_or_else(|| RenderError::MissingAxis {
        chart: chart.to_string(),
        axis,
    })?;
    if !dataset.has_column(column) {
        return Err(RenderError::ColumnNotFound {
            column: column.to_string(),
        });
    }
    Ok(column)
}

fn numeric_column(dataset: &Dataset, column: &str, chart: ChartKind) -> RenderResult<Vec<Option<f64>>> {
    if !dataset.kind(column).is_some_and(|k| k.is_numeric()) {
        return Err(RenderError::NotNumeric {
            chart: chart.to_string(),
            column: column.to_string(),
        });
    }
    Ok(dataset.numeric_values(column)?)
}

/// Groups `y` by the text of `x` in order of first appearance.
fn grouped(labels: Vec<Option<String>>, values: &[Option<f64>]) -> Vec<(String, f64, usize)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, f64, usize)> = Vec::new();
    for (label, value) in labels.into_iter().zip(values.iter()) {
        let Some(label) = label else { continue };
        let slot = *index.entry(label.clone()).or_insert_with(|| {
            groups.push((label, 0.0, 0));
            groups.len() - 1
        });
        if let Some(v) = value {
            groups[slot].1 += v;
            groups[slot].2 += 1;
        }
    }
    groups
}

pub fn bar_geometry(dataset: &Dataset, x: Option<&str>, y: Option<&str>) -> RenderResult<ChartGeometry> {
    let chart = ChartKind::Bar;
    let x = required_column(dataset, x, chart, "x")?;
    let y = required_column(dataset, y, chart, "y")?;
    let values = numeric_column(dataset, y, chart)?;
    let (labels, values): (Vec<String>, Vec<f64>) = grouped(dataset.text_values(x)?, &values)
        .into_iter()
        .filter(|(_, _, n)| *n > 0)
        .map(|(label, sum, n)| (label, sum / n as f64))
        .unzip();
    if labels.is_empty() {
        return Err(RenderError::NoData {
            chart: chart.to_string(),
        });
    }
    Ok(ChartGeometry::Bars { labels, values })
}

pub fn scatter_geometry(dataset: &Dataset, x: Option<&str>, y: Option<&str>) -> RenderResult<ChartGeometry> {
    let chart = ChartKind::Scatter;
    let x = required_column(dataset, x, chart, "x")?;
    let y = required_column(dataset, y, chart, "y")?;
    let xs = numeric_column(dataset, x, chart)?;
    let ys = numeric_column(dataset, y, chart)?;
    let points = complete_pairs(&xs, &ys);
    if points.is_empty() {
        return Err(RenderError::NoData {
            chart: chart.to_string(),
        });
    }
    Ok(ChartGeometry::Points { points })
}

pub fn line_geometry(
    dataset: &Dataset,
    x: Option<&str>,
    y: Option<&str>,
    filled: bool,
) -> RenderResult<ChartGeometry> {
    let chart = if filled { ChartKind::Area } else { ChartKind::Line };
    let x = required_column(dataset, x, chart, "x")?;
    let y = required_column(dataset, y, chart, "y")?;
    let ys = numeric_column(dataset, y, chart)?;
    let (axis, mut points) = match dataset.kind(x) {
        Some(kind) if kind.is_numeric() => {
            (LineAxis::Numeric, complete_pairs(&dataset.numeric_values(x)?, &ys))
        }
        Some(ColumnKind::Temporal) => {
            let xs: Vec<Option<f64>> = dataset
                .temporal_values(x)?
                .into_iter()
                .map(|v| v.map(|ms| ms as f64))
                .collect();
            (LineAxis::Temporal, complete_pairs(&xs, &ys))
        }
        _ => {
            let pairs: Vec<(String, f64)> = dataset
                .text_values(x)?
                .into_iter()
                .zip(ys.iter())
                .filter_map(|(label, value)| Some((label?, (*value)?)))
                .collect();
            let mut labels: Vec<String> = pairs.iter().map(|(l, _)| l.clone()).collect();
            labels.sort();
            labels.dedup();
            let positions: HashMap<&str, usize> = labels
                .iter()
                .enumerate()
                .map(|(i, l)| (l.as_str(), i))
                .collect();
            let points: Vec<(f64, f64)> = pairs
                .iter()
                .map(|(label, value)| (positions[label.as_str()] as f64, *value))
                .collect();
            drop(positions);
            (LineAxis::Categorical(labels), points)
        }
    };
    if points.is_empty() {
        return Err(RenderError::NoData {
            chart: chart.to_string(),
        });
    }
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(ChartGeometry::Line {
        axis,
        points,
        filled,
    })
}

/// Sums `y` per `x` label. With a single column the wedges are its value counts.
pub fn pie_geometry(dataset: &Dataset, x: Option<&str>, y: Option<&str>) -> RenderResult<ChartGeometry> {
    let chart = ChartKind::Pie;
    let (x, y) = match (x, y) {
        (Some(x), Some(y)) => (x, y),
        (Some(only), None) | (None, Some(only)) => {
            let only = required_column(dataset, Some(only), chart, "x")?;
            return pie_counts(dataset, only);
        }
        (None, None) => {
            return Err(RenderError::MissingAxis {
                chart: chart.to_string(),
                axis: "x",
            })
        }
    };
    let x = required_column(dataset, Some(x), chart, "x")?;
    let y = required_column(dataset, Some(y), chart, "y")?;
    let values = numeric_column(dataset, y, chart)?;
    if values.iter().flatten().any(|v| *v < 0.0) {
        return Err(RenderError::NegativeValues {
            column: y.to_string(),
        });
    }
    let groups = grouped(dataset.text_values(x)?, &values);
    let total: f64 = groups.iter().map(|(_, sum, _)| sum).sum();
    if total <= 0.0 || !total.is_finite() {
        return Err(RenderError::ZeroTotal {
            column: y.to_string(),
        });
    }
    let wedges = groups
        .into_iter()
        .filter(|(_, _, n)| *n > 0)
        .map(|(label, value, _)| Wedge {
            label,
            value,
            percent: value / total * 100.0,
        })
        .collect();
    Ok(ChartGeometry::Wedges { wedges })
}

/// Occurrences per label, most frequent first.
fn pie_counts(dataset: &Dataset, column: &str) -> RenderResult<ChartGeometry> {
    let labels = dataset.text_values(column)?;
    let ones = vec![Some(1.0); labels.len()];
    let mut groups = grouped(labels, &ones);
    groups.sort_by(|a, b| b.2.cmp(&a.2));
    let total: f64 = groups.iter().map(|(_, n, _)| n).sum();
    if total <= 0.0 {
        return Err(RenderError::NoData {
            chart: ChartKind::Pie.to_string(),
        });
    }
    let wedges = groups
        .into_iter()
        .map(|(label, value, _)| Wedge {
            label,
            value,
            percent: value / total * 100.0,
        })
        .collect();
    Ok(ChartGeometry::Wedges { wedges })
}

pub fn histogram_geometry(dataset: &Dataset, y: Option<&str>, bins: usize) -> RenderResult<ChartGeometry> {
    let y = y.ok_or(RenderError::HistogramNotNumeric)?;
    if !dataset.has_column(y) {
        return Err(RenderError::ColumnNotFound {
            column: y.to_string(),
        });
    }
    if !dataset.kind(y).is_some_and(|k| k.is_numeric()) {
        return Err(RenderError::HistogramNotNumeric);
    }
    let values: Vec<f64> = dataset.numeric_values(y)?.into_iter().flatten().collect();
    let bins: Vec<Bin> = histogram(&values, bins)
        .into_iter()
        .map(|(start, end, count)| Bin { start, end, count })
        .collect();
    if bins.is_empty() {
        return Err(RenderError::NoData {
            chart: ChartKind::Histogram.to_string(),
        });
    }
    Ok(ChartGeometry::Bins { bins })
}

/// Plots the dataset's own `latitude`/`longitude` columns; requested axes are ignored.
pub fn map_geometry(dataset: &Dataset) -> RenderResult<ChartGeometry> {
    let find = |wanted: &str| {
        dataset
            .column_names()
            .into_iter()
            .find(|n| n.trim().eq_ignore_ascii_case(wanted))
    };
    let (Some(lat), Some(lon)) = (find("latitude"), find("longitude")) else {
        return Err(RenderError::MapColumnsMissing);
    };
    let lats = numeric_column(dataset, &lat, ChartKind::Map)?;
    let lons = numeric_column(dataset, &lon, ChartKind::Map)?;
    let points = complete_pairs(&lons, &lats);
    if points.is_empty() {
        return Err(RenderError::NoData {
            chart: ChartKind::Map.to_string(),
        });
    }
    Ok(ChartGeometry::GeoPoints { points })
}

pub fn heatmap_geometry(dataset: &Dataset) -> RenderResult<ChartGeometry> {
    let columns = dataset.numeric_column_names();
    if columns.is_empty() {
        return Err(RenderError::NoNumericColumns);
    }
    let values = columns
        .iter()
        .map(|c| dataset.numeric_values(c))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ChartGeometry::Matrix {
        coefficients: correlation_matrix(&values),
        columns,
    })
}

fn complete_pairs(xs: &[Option<f64>], ys: &[Option<f64>]) -> Vec<(f64, f64)> {
    xs.iter()
        .zip(ys.iter())
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect()
}
