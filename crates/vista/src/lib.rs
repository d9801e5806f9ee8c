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


//! Dataset insight pipeline: CSV ingestion and profiling, model-suggested
//! charts rendered through a renderer registry, a streamed Q&A assistant
//! and PDF report export.

pub mod assistant;
pub mod chart_spec;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod extract;
pub mod profile;
pub mod recommend;
pub mod render;
pub mod reshape;
pub mod session;
pub mod shape;
pub mod stats;

pub use assistant::InsightAssistant;
pub use chart_spec::{ChartKind, ChartSpec};
pub use config::VistaConfig;
pub use dataset::{ColumnKind, Dataset};
pub use error::{
    ConfigError, DatasetError, ExportError, ExtractError, RenderError, Result, VistaError,
};
pub use export::{DocumentStore, ExportRequest, PdfReportStore};
pub use extract::extract_specs;
pub use profile::{ColumnProfile, DataProfiler, DatasetSummary, DescribeTable};
pub use recommend::{Recommendation, RecommendationRequester};
pub use render::{ChartOutcome, ChartRenderer, Figure, RendererRegistry};
pub use reshape::unpivot_wide;
pub use session::Session;
pub use shape::TableShape;

use herald::{ApiClient, FragmentStream};
use llm_contracts::Role;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// One entry point per user action, each operating on a [`Session`].
pub struct InsightPipeline {
    config: VistaConfig,
    requester: RecommendationRequester,
    assistant: InsightAssistant,
    renderers: RendererRegistry,
    custom_renderers: RendererRegistry,
    store: Box<dyn DocumentStore + Send + Sync>,
}
impl InsightPipeline {
    pub fn new(client: Arc<dyn ApiClient>, model: impl Into<String>, config: VistaConfig) -> Result<Self> {
        let config = config.validated()?;
        let model = model.into();
        Ok(Self {
            requester: RecommendationRequester::new(client.clone(), model.clone(), &config),
            assistant: InsightAssistant::new(client, model, &config),
            renderers: RendererRegistry::standard(&config),
            custom_renderers: RendererRegistry::with_export_charts(&config),
            store: Box::new(PdfReportStore::new(config.clone())),
            config,
        })
    }
    pub fn with_store(mut self, store: Box<dyn DocumentStore + Send + Sync>) -> Self {
        self.store = store;
        self
    }
    pub fn config(&self) -> &VistaConfig {
        &self.config
    }

    /// On failure the session keeps its previous dataset.
    pub fn load_csv_path(&self, session: &mut Session, path: &Path) -> Result<()> {
        let dataset = Dataset::from_csv_path(path, &self.config)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        session.load_dataset(dataset, name);
        Ok(())
    }
    pub fn load_csv_bytes(&self, session: &mut Session, bytes: &[u8], name: &str) -> Result<()> {
        let dataset = Dataset::from_csv_bytes(bytes, &self.config)?;
        info!(file = %name, rows = dataset.height(), columns = dataset.width(), "Loaded dataset");
        session.load_dataset(dataset, name);
        Ok(())
    }

    /// Context detection followed by the written report.
    pub async fn analyse(&self, session: &mut Session) -> Result<()> {
        let dataset = session.dataset.as_ref().ok_or(VistaError::NoDataset)?;
        let context = self.assistant.detect_context(dataset).await?;
        let report = self.assistant.generate_report(dataset).await?;
        session.context = Some(context);
        session.report = Some(report);
        Ok(())
    }

    /// Asks for chart suggestions and renders each one on its own.
    pub async fn recommend_charts(&self, session: &mut Session) -> Result<Vec<ChartOutcome>> {
        let dataset = session.dataset.as_ref().ok_or(VistaError::NoDataset)?;
        let recommendation = self.requester.recommend(dataset).await?;
        info!(
            shape = ?recommendation.shape,
            unpivoted = recommendation.unpivoted,
            suggestions = recommendation.specs.len(),
            "Chart recommendation finished"
        );
        let outcomes = self
            .renderers
            .render_batch(&recommendation.specs, &recommendation.basis);
        session.apply_recommendation(recommendation);
        Ok(outcomes)
    }

    /// Renders a user-chosen chart against the loaded table. Heatmaps are
    /// available here even though the model never suggests them.
    pub fn custom_chart(&self, session: &Session, spec: &ChartSpec) -> Result<Figure> {
        let dataset = session.dataset.as_ref().ok_or(VistaError::NoDataset)?;
        Ok(self.custom_renderers.render(spec, dataset)?)
    }

    /// Streams the answer and records the question once the stream is open.
    /// The caller records the assistant turn once it has drained the stream.
    pub async fn ask(&self, session: &mut Session, question: &str) -> Result<FragmentStream> {
        let dataset = session.dataset.as_ref().ok_or(VistaError::NoDataset)?;
        let history = session.history_text_with(Role::User, question);
        let report = session.report.as_deref().unwrap_or_default();
        let charts = (!session.specs.is_empty()).then_some(session.specs.as_slice());
        let stream = self
            .assistant
            .answer(&history, report, dataset, question, charts)
            .await?;
        session.record_turn(Role::User, question);
        Ok(stream)
    }

    pub fn export(&self, session: &Session, destination: impl Into<PathBuf>) -> Result<PathBuf> {
        let dataset = session.dataset.as_ref().ok_or(VistaError::NoDataset)?;
        let request = ExportRequest {
            title: format!("{} insight report", session.dataset_label()),
            context: session.context.clone().unwrap_or_default(),
            report: session.report.clone().unwrap_or_default(),
            dataset,
            chart_basis: session.chart_basis.as_ref(),
            specs: &session.specs,
            destination: destination.into(),
        };
        Ok(self.store.export(&request)?)
    }
}
