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
use crate::dataset::Dataset;
use crate::recommend::Recommendation;
use llm_contracts::{Message, Role};
use std::path::Path;

/// Everything one user has produced so far. Derived fields are only valid
/// for the dataset they were computed from.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub dataset: Option<Dataset>,
    pub file_name: Option<String>,
    pub context: Option<String>,
    pub report: Option<String>,
    /// Table the chart specifications refer to; the unpivoted one for wide data.
    pub chart_basis: Option<Dataset>,
    pub specs: Vec<ChartSpec>,
    pub history: Vec<Message>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the dataset and forgets everything derived from the old one.
    pub fn load_dataset(&mut self, dataset: Dataset, file_name: impl Into<String>) {
        self.dataset = Some(dataset);
        self.file_name = Some(file_name.into());
        self.context = None;
        self.report = None;
        self.chart_basis = None;
        self.specs.clear();
        self.history.clear();
    }

    pub fn dataset_label(&self) -> String {
        self.file_name
            .as_deref()
            .and_then(|name| Path::new(name).file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string())
    }

    pub fn apply_recommendation(&mut self, recommendation: Recommendation) {
        self.chart_basis = Some(recommendation.basis);
        self.specs = recommendation.specs;
    }

    pub fn record_turn(&mut self, role: Role, content: impl Into<String>) {
        self.history.push(Message {
            role,
            content: content.into(),
        });
    }

    pub fn history_text(&self) -> String {
        self.history
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// History as it would read with one more turn, without recording it.
    pub fn history_text_with(&self, role: Role, content: &str) -> String {
        let pending = format!("{}: {}", role.as_str(), content);
        if self.history.is_empty() {
            pending
        } else {
            format!("{}\n{pending}", self.history_text())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VistaConfig;
    use crate::shape::TableShape;

    fn dataset(csv: &str) -> Dataset {
        Dataset::from_csv_bytes(csv.as_bytes(), &VistaConfig::default()).unwrap()
    }

    #[test]
    fn test_load_dataset_clears_derived_state() {
        let mut session = Session::new();
        session.load_dataset(dataset("a,b\n1,2\n"), "first.csv");
        session.context = Some("ctx".into());
        session.report = Some("report".into());
        session.specs.push(ChartSpec::new("bar"));
        session.record_turn(Role::User, "hi");
        session.load_dataset(dataset("c\n3\n"), "second.csv");
        assert!(session.context.is_none());
        assert!(session.report.is_none());
        assert!(session.chart_basis.is_none());
        assert!(session.specs.is_empty());
        assert!(session.history.is_empty());
        assert_eq!(session.dataset_label(), "second");
    }

    #[test]
    fn test_history_text() {
        let mut session = Session::new();
        session.record_turn(Role::User, "Which region sells most?");
        session.record_turn(Role::Assistant, "North.");
        assert_eq!(
            session.history_text(),
            "user: Which region sells most?\nassistant: North."
        );
    }

    #[test]
    fn test_apply_recommendation_keeps_original_dataset() {
        let mut session = Session::new();
        session.load_dataset(dataset("country,2020\nNO,1\n"), "wide.csv");
        session.apply_recommendation(Recommendation {
            shape: TableShape::Wide,
            basis: dataset("country,variable,value\nNO,2020,1\n"),
            unpivoted: true,
            specs: vec![ChartSpec::new("line")],
        });
        assert_eq!(session.dataset.as_ref().unwrap().width(), 2);
        assert_eq!(session.chart_basis.as_ref().unwrap().width(), 3);
        assert_eq!(session.specs.len(), 1);
    }

    #[test]
    fn test_history_text_with_pending_turn() {
        let mut session = Session::new();
        assert_eq!(session.history_text_with(Role::User, "Hi"), "user: Hi");
        session.record_turn(Role::User, "Hi");
        session.record_turn(Role::Assistant, "Hello.");
        assert_eq!(
            session.history_text_with(Role::User, "Totals?"),
            "user: Hi\nassistant: Hello.\nuser: Totals?"
        );
        assert_eq!(session.history.len(), 2);
    }
}
