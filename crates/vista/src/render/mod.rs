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


//! Chart rendering. A [`RendererRegistry`] maps chart-type tags to
//! [`ChartRenderer`]s; every specification in a batch is rendered on its own
//! so a bad one is reported in place while the rest still draw.

pub mod draw;
pub mod geometry;

use crate::chart_spec::{ChartKind, ChartSpec};
use crate::config::VistaConfig;
use crate::dataset::Dataset;
use crate::error::{RenderError, RenderResult};
use draw::{draw_svg, Canvas};
use geometry::ChartGeometry;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A drawn chart: the computed geometry plus its SVG document.
#[derive(Debug, Clone)]
pub struct Figure {
    pub title: String,
    pub geometry: ChartGeometry,
    pub svg: String,
}

pub trait ChartRenderer: Send + Sync {
    fn render(&self, spec: &ChartSpec, dataset: &Dataset) -> RenderResult<Figure>;
}

/// Renderer for the chart types this crate knows how to draw.
#[derive(Debug, Clone)]
pub struct BuiltinRenderer {
    kind: ChartKind,
    width: u32,
    height: u32,
    bins: usize,
}
impl BuiltinRenderer {
    pub fn new(kind: ChartKind, config: &VistaConfig) -> Self {
        Self {
            kind,
            width: config.chart_width,
            height: config.chart_height,
            bins: config.histogram_bins,
        }
    }
    fn geometry(&self, spec: &ChartSpec, dataset: &Dataset) -> RenderResult<ChartGeometry> {
        let x = spec.x_column.as_deref();
        let y = spec.y_column.as_deref();
        match self.kind {
            ChartKind::Bar => geometry::bar_geometry(dataset, x, y),
            ChartKind::Line => geometry::line_geometry(dataset, x, y, false),
            ChartKind::Area => geometry::line_geometry(dataset, x, y, true),
            ChartKind::Scatter => geometry::scatter_geometry(dataset, x, y),
            ChartKind::Pie => geometry::pie_geometry(dataset, x, y),
            ChartKind::Histogram => geometry::histogram_geometry(dataset, y, self.bins),
            ChartKind::Map => geometry::map_geometry(dataset),
            ChartKind::Heatmap => geometry::heatmap_geometry(dataset),
        }
    }
    fn canvas(&self, spec: &ChartSpec) -> Canvas {
        let x = spec.x_column.clone().unwrap_or_default();
        let y = spec.y_column.clone().unwrap_or_default();
        let (title, x_desc, y_desc) = match self.kind {
            ChartKind::Bar => (format!("Average {y} by {x}"), x, y),
            ChartKind::Line | ChartKind::Area => (format!("{y} over {x}"), x, y),
            ChartKind::Scatter => (format!("{y} vs {x}"), x, y),
            ChartKind::Pie if x.is_empty() || y.is_empty() => (
                format!("Share of {x}{y}"),
                String::new(),
                String::new(),
            ),
            ChartKind::Pie => (format!("Share of {y} by {x}"), String::new(), String::new()),
            ChartKind::Histogram => (format!("Distribution of {y}"), y, "Frequency".to_string()),
            ChartKind::Map => (
                "Geographic distribution".to_string(),
                "longitude".to_string(),
                "latitude".to_string(),
            ),
            ChartKind::Heatmap => ("Correlation heatmap".to_string(), String::new(), String::new()),
        };
        Canvas {
            title,
            x_desc,
            y_desc,
            width: self.width,
            height: self.height,
        }
    }
}
impl ChartRenderer for BuiltinRenderer {
    fn render(&self, spec: &ChartSpec, dataset: &Dataset) -> RenderResult<Figure> {
        let geometry = self.geometry(spec, dataset)?;
        let canvas = self.canvas(spec);
        let svg = draw_svg(&canvas, &geometry)?;
        Ok(Figure {
            title: canvas.title,
            geometry,
            svg,
        })
    }
}

/// Result of rendering one specification of a batch.
#[derive(Debug, Clone)]
pub enum ChartOutcome {
    Rendered {
        figure_number: usize,
        spec: ChartSpec,
        figure: Figure,
    },
    Failed {
        figure_number: usize,
        spec: ChartSpec,
        error: RenderError,
    },
}
impl ChartOutcome {
    /// 1-based position in the batch.
    pub fn figure_number(&self) -> usize {
        match self {
            ChartOutcome::Rendered { figure_number, .. }
            | ChartOutcome::Failed { figure_number, .. } => *figure_number,
        }
    }
    pub fn spec(&self) -> &ChartSpec {
        match self {
            ChartOutcome::Rendered { spec, .. } | ChartOutcome::Failed { spec, .. } => spec,
        }
    }
    pub fn figure(&self) -> Option<&Figure> {
        match self {
            ChartOutcome::Rendered { figure, .. } => Some(figure),
            ChartOutcome::Failed { .. } => None,
        }
    }
    pub fn error(&self) -> Option<&RenderError> {
        match self {
            ChartOutcome::Failed { error, .. } => Some(error),
            ChartOutcome::Rendered { .. } => None,
        }
    }
    pub fn is_rendered(&self) -> bool {
        matches!(self, ChartOutcome::Rendered { .. })
    }
    /// `Figure 2: Bar Chart`
    pub fn caption(&self) -> String {
        format!(
            "Figure {}: {} Chart",
            self.figure_number(),
            self.spec().type_title()
        )
    }
}

pub struct RendererRegistry {
    renderers: HashMap<String, Box<dyn ChartRenderer>>,
}
impl RendererRegistry {
    pub fn empty() -> Self {
        Self {
            renderers: HashMap::new(),
        }
    }
    /// Every chart the model may suggest. Heatmaps are left out.
    pub fn standard(config: &VistaConfig) -> Self {
        let mut registry = Self::empty();
        for kind in ChartKind::ALL {
            if kind != ChartKind::Heatmap {
                registry.register(kind.as_str(), Box::new(BuiltinRenderer::new(kind, config)));
            }
        }
        registry
    }
    /// The standard set plus the whole-table heatmap.
    pub fn with_export_charts(config: &VistaConfig) -> Self {
        let mut registry = Self::standard(config);
        registry.register(
            ChartKind::Heatmap.as_str(),
            Box::new(BuiltinRenderer::new(ChartKind::Heatmap, config)),
        );
        registry
    }
    pub fn register(&mut self, tag: impl Into<String>, renderer: Box<dyn ChartRenderer>) {
        self.renderers.insert(tag.into().trim().to_lowercase(), renderer);
    }
    pub fn supports(&self, tag: &str) -> bool {
        self.renderers.contains_key(&tag.trim().to_lowercase())
    }
    pub fn supported_types(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.renderers.keys().cloned().collect();
        tags.sort();
        tags
    }
    pub fn render(&self, spec: &ChartSpec, dataset: &Dataset) -> RenderResult<Figure> {
        let renderer = spec
            .type_tag()
            .and_then(|tag| self.renderers.get(&tag))
            .ok_or_else(|| RenderError::UnsupportedChartType {
                chart_type: spec
                    .chart_type
                    .clone()
                    .unwrap_or_else(|| "missing".to_string()),
            })?;
        renderer.render(spec, dataset)
    }
    /// Renders in order; failures are recorded and the batch carries on.
    pub fn render_batch(&self, specs: &[ChartSpec], dataset: &Dataset) -> Vec<ChartOutcome> {
        specs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let figure_number = i + 1;
                match self.render(spec, dataset) {
                    Ok(figure) => {
                        debug!(figure_number, title = %figure.title, "Rendered chart");
                        ChartOutcome::Rendered {
                            figure_number,
                            spec: spec.clone(),
                            figure,
                        }
                    }
                    Err(error) => {
                        warn!(figure_number, error = %error, "Chart could not be rendered");
                        ChartOutcome::Failed {
                            figure_number,
                            spec: spec.clone(),
                            error,
                        }
                    }
                }
            })
            .collect()
    }
}
impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("types", &self.supported_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        let csv = "category,sales,cost\nA,10,1\nB,20,2\nA,30,3\n";
        Dataset::from_csv_bytes(csv.as_bytes(), &VistaConfig::default()).unwrap()
    }

    #[test]
    fn test_heatmap_only_in_export_registry() {
        let config = VistaConfig::default();
        assert!(!RendererRegistry::standard(&config).supports("heatmap"));
        assert!(RendererRegistry::with_export_charts(&config).supports("Heatmap"));
        let err = RendererRegistry::standard(&config)
            .render(&ChartSpec::new("heatmap"), &dataset())
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported chart type: heatmap");
    }

    #[test]
    fn test_missing_type_is_unsupported() {
        let registry = RendererRegistry::standard(&VistaConfig::default());
        let err = registry.render(&ChartSpec::default(), &dataset()).unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedChartType { .. }));
    }

    #[test]
    fn test_custom_renderer_registration() {
        struct Fixed;
        impl ChartRenderer for Fixed {
            fn render(&self, _spec: &ChartSpec, _dataset: &Dataset) -> RenderResult<Figure> {
                Ok(Figure {
                    title: "fixed".into(),
                    geometry: ChartGeometry::Points { points: vec![] },
                    svg: "<svg/>".into(),
                })
            }
        }
        let mut registry = RendererRegistry::empty();
        registry.register("Radar", Box::new(Fixed));
        let figure = registry.render(&ChartSpec::new("radar"), &dataset()).unwrap();
        assert_eq!(figure.title, "fixed");
    }

    #[test]
    fn test_outcome_caption() {
        let registry = RendererRegistry::standard(&VistaConfig::default());
        let outcomes = registry.render_batch(
            &[ChartSpec::new("bar").with_x("category").with_y("sales")],
            &dataset(),
        );
        assert_eq!(outcomes[0].caption(), "Figure 1: Bar Chart");
        assert!(outcomes[0].figure().unwrap().svg.contains("<svg"));
    }
}
