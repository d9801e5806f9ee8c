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


use async_trait::async_trait;
use herald::{ApiClient, FragmentStream};
use llm_contracts::{LLMError, LLMResult, ProviderRequest, ProviderResponse, Role, Usage};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use vista::render::geometry::ChartGeometry;
use vista::error::ExportResult;
use vista::{
    ChartSpec, Dataset, DocumentStore, ExportRequest, InsightPipeline, RenderError,
    RendererRegistry, Session, VistaConfig, VistaError,
};

/// Replays canned replies in order and records every prompt it was sent.
#[derive(Default)]
struct ScriptedClient {
    replies: Mutex<VecDeque<LLMResult<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    fn with_replies(replies: Vec<LLMResult<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn next(&self, request: &ProviderRequest) -> LLMResult<String> {
        let prompt = request
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(prompt);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LLMError::Provider("no scripted reply left".into())))
    }
}

#[async_trait]
impl ApiClient for ScriptedClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        let content = self.next(&request)?;
        Ok(ProviderResponse {
            content,
            model: request.model,
            usage: Usage::default(),
            finish_reason: Some("STOP".into()),
            raw_response: serde_json::Value::Null,
        })
    }

    async fn send_streaming_request(&self, request: ProviderRequest) -> LLMResult<FragmentStream> {
        let content = self.next(&request)?;
        let fragments: Vec<String> = content.split_inclusive(' ').map(str::to_string).collect();
        Ok(FragmentStream::from_fragments(fragments))
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

const SALES_CSV: &str = "category,sales\nA,10\nB,20\nA,30\n";
const BAR_REPLY: &str = r#"Here you go: [{"chart_type":"bar","x_column":"category","y_column":"sales","reason":"compare sales by category"}] Hope this helps!"#;

fn pipeline(client: Arc<ScriptedClient>) -> InsightPipeline {
    InsightPipeline::new(client, "gemini-2.0-flash", VistaConfig::default()).unwrap()
}

#[tokio::test]
async fn test_end_to_end_bar_recommendation() {
    let client = ScriptedClient::with_replies(vec![Ok(BAR_REPLY.to_string())]);
    let pipeline = pipeline(client.clone());
    let mut session = Session::new();
    pipeline
        .load_csv_bytes(&mut session, SALES_CSV.as_bytes(), "sales.csv")
        .unwrap();

    let outcomes = pipeline.recommend_charts(&mut session).await.unwrap();

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes.iter().all(|o| o.is_rendered()));
    assert_eq!(outcomes[0].caption(), "Figure 1: Bar Chart");
    match &outcomes[0].figure().unwrap().geometry {
        ChartGeometry::Bars { labels, values } => {
            assert_eq!(labels, &vec!["A".to_string(), "B".to_string()]);
            assert_eq!(values, &vec![20.0, 20.0]);
        }
        other => panic!("expected bars, got {other:?}"),
    }
    assert_eq!(session.specs.len(), 1);
    assert!(client.prompts.lock().unwrap()[0].contains("Avoid meaningless"));
}

#[tokio::test]
async fn test_wide_table_is_unpivoted_before_recommending() {
    let reply = r#"[{"chart_type": "line", "x_column": "variable", "y_column": "value", "reason": "Trend"}]"#;
    let client = ScriptedClient::with_replies(vec![Ok(reply.to_string())]);
    let pipeline = pipeline(client.clone());
    let mut session = Session::new();
    pipeline
        .load_csv_bytes(&mut session, b"country,2019,2020\nNO,1,2\nSE,3,4\n", "wide.csv")
        .unwrap();

    let outcomes = pipeline.recommend_charts(&mut session).await.unwrap();

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_rendered());
    let basis = session.chart_basis.as_ref().unwrap();
    assert_eq!(basis.height(), 4);
    assert!(basis.has_column("variable") && basis.has_column("value"));
    assert!(client.prompts.lock().unwrap()[0].contains("unpivoted from wide format"));
}

#[tokio::test]
async fn test_transport_failure_propagates() {
    let client = ScriptedClient::with_replies(vec![Err(LLMError::Network("connection refused".into()))]);
    let pipeline = pipeline(client);
    let mut session = Session::new();
    pipeline
        .load_csv_bytes(&mut session, SALES_CSV.as_bytes(), "sales.csv")
        .unwrap();

    let err = pipeline.recommend_charts(&mut session).await.unwrap_err();

    assert!(matches!(&err, VistaError::Llm(e) if e.is_transport()));
    assert!(!err.is_recoverable());
    assert!(session.specs.is_empty());
}

#[tokio::test]
async fn test_malformed_model_output_yields_no_charts() {
    let client = ScriptedClient::with_replies(vec![Ok("[{\"chart_type\": \"bar\",}]".to_string())]);
    let pipeline = pipeline(client);
    let mut session = Session::new();
    pipeline
        .load_csv_bytes(&mut session, SALES_CSV.as_bytes(), "sales.csv")
        .unwrap();

    let outcomes = pipeline.recommend_charts(&mut session).await.unwrap();
    assert!(outcomes.is_empty());
}

#[tokio::test]
async fn test_actions_need_a_dataset() {
    let pipeline = pipeline(ScriptedClient::with_replies(vec![]));
    let mut session = Session::new();
    assert!(matches!(
        pipeline.recommend_charts(&mut session).await,
        Err(VistaError::NoDataset)
    ));
    assert!(matches!(
        pipeline.ask(&mut session, "anything?").await,
        Err(VistaError::NoDataset)
    ));
}

#[tokio::test]
async fn test_bad_upload_keeps_previous_dataset() {
    let pipeline = pipeline(ScriptedClient::with_replies(vec![]));
    let mut session = Session::new();
    pipeline
        .load_csv_bytes(&mut session, SALES_CSV.as_bytes(), "sales.csv")
        .unwrap();
    let err = pipeline
        .load_csv_path(&mut session, std::path::Path::new("/nonexistent/data.csv"))
        .unwrap_err();
    assert_eq!(err.category(), "Data");
    assert_eq!(session.file_name.as_deref(), Some("sales.csv"));
}

#[tokio::test]
async fn test_ask_streams_answer_with_history() {
    let client = ScriptedClient::with_replies(vec![
        Ok("Sales of A and B.".to_string()),
        Ok("# Overview\nA leads.".to_string()),
        Ok("Category A has the highest total.".to_string()),
    ]);
    let pipeline = pipeline(client.clone());
    let mut session = Session::new();
    pipeline
        .load_csv_bytes(&mut session, SALES_CSV.as_bytes(), "sales.csv")
        .unwrap();
    pipeline.analyse(&mut session).await.unwrap();
    assert_eq!(session.context.as_deref(), Some("Sales of A and B."));

    let mut stream = pipeline.ask(&mut session, "Which category sells most?").await.unwrap();
    let mut answer = String::new();
    let mut fragments = 0;
    while let Some(fragment) = stream.next_fragment().await {
        answer.push_str(&fragment.unwrap());
        fragments += 1;
    }
    session.record_turn(Role::Assistant, answer.clone());

    assert!(fragments > 1);
    assert_eq!(answer, "Category A has the highest total.");
    let prompt = client.prompts.lock().unwrap()[2].clone();
    assert!(prompt.contains("user: Which category sells most?"));
    assert!(prompt.contains("A leads."));
    assert_eq!(session.history.len(), 2);
}

#[tokio::test]
async fn test_export_after_recommendation() -> anyhow::Result<()> {
    let client = ScriptedClient::with_replies(vec![Ok(BAR_REPLY.to_string())]);
    let pipeline = pipeline(client);
    let mut session = Session::new();
    pipeline.load_csv_bytes(&mut session, SALES_CSV.as_bytes(), "sales.csv")?;
    pipeline.recommend_charts(&mut session).await?;

    let dir = tempfile::tempdir()?;
    let path = pipeline.export(&session, dir.path().join("sales.pdf"))?;
    let bytes = std::fs::read(path)?;
    assert!(bytes.starts_with(b"%PDF"));
    Ok(())
}

/// Captures what would have been exported.
#[derive(Default)]
struct RecordingStore {
    seen: Arc<Mutex<Vec<(String, usize, Option<usize>)>>>,
}

impl DocumentStore for RecordingStore {
    fn export(&self, request: &ExportRequest<'_>) -> ExportResult<std::path::PathBuf> {
        self.seen.lock().unwrap().push((
            request.title.clone(),
            request.dataset.height(),
            request.chart_basis.map(Dataset::height),
        ));
        Ok(request.destination.clone())
    }
}

#[tokio::test]
async fn test_export_hands_original_table_and_chart_basis_to_store() {
    let reply = r#"[{"chart_type": "bar", "x_column": "variable", "y_column": "value", "reason": "Years"}]"#;
    let store = RecordingStore::default();
    let seen = store.seen.clone();
    let pipeline = pipeline(ScriptedClient::with_replies(vec![Ok(reply.to_string())]))
        .with_store(Box::new(store));
    let mut session = Session::new();
    pipeline
        .load_csv_bytes(&mut session, b"country,2019,2020\nNO,1,2\nSE,3,4\n", "emissions.csv")
        .unwrap();
    pipeline.recommend_charts(&mut session).await.unwrap();

    let path = pipeline.export(&session, "out.pdf").unwrap();

    assert_eq!(path, std::path::PathBuf::from("out.pdf"));
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], ("emissions insight report".to_string(), 2, Some(4)));
}

#[test]
fn test_batch_isolates_failures() {
    let dataset = Dataset::from_csv_bytes(
        b"category,sales,cost,latitude,longitude\nA,10,1,59.9,10.7\nB,20,2,60.4,5.3\nA,30,3,63.4,10.4\n",
        &VistaConfig::default(),
    )
    .unwrap();
    let specs = vec![
        ChartSpec::new("scatter").with_x("sales").with_y("cost"),
        ChartSpec::new("pie").with_x("category").with_y("sales"),
        ChartSpec::new("bar").with_x("category").with_y("profit"),
        ChartSpec::new("histogram").with_y("sales"),
        ChartSpec::new("map"),
    ];
    let outcomes = RendererRegistry::standard(&VistaConfig::default()).render_batch(&specs, &dataset);

    assert_eq!(outcomes.len(), 5);
    let rendered: Vec<usize> = outcomes
        .iter()
        .filter(|o| o.is_rendered())
        .map(|o| o.figure_number())
        .collect();
    assert_eq!(rendered, vec![1, 2, 4, 5]);
    assert_eq!(
        outcomes[2].error(),
        Some(&RenderError::ColumnNotFound {
            column: "profit".into()
        })
    );
}

#[test]
fn test_chart_contract_errors() {
    let dataset = Dataset::from_csv_bytes(SALES_CSV.as_bytes(), &VistaConfig::default()).unwrap();
    let registry = RendererRegistry::standard(&VistaConfig::default());

    let histogram = registry
        .render(&ChartSpec::new("histogram").with_y("category"), &dataset)
        .unwrap_err();
    assert!(histogram.to_string().contains("requires a numerical column"));

    let map = registry.render(&ChartSpec::new("map"), &dataset).unwrap_err();
    assert_eq!(map, RenderError::MapColumnsMissing);

    let radar = registry
        .render(&ChartSpec::new("radar").with_x("category"), &dataset)
        .unwrap_err();
    assert_eq!(radar.to_string(), "Unsupported chart type: radar");
}

#[test]
fn test_custom_charts_include_heatmap_and_single_column_pie() {
    let pipeline = pipeline(ScriptedClient::with_replies(vec![]));
    let mut session = Session::new();
    pipeline
        .load_csv_bytes(&mut session, b"a,b,region\n1,2,north\n2,4,south\n3,5,south\n", "nums.csv")
        .unwrap();

    let heatmap = pipeline
        .custom_chart(&session, &ChartSpec::new("heatmap"))
        .unwrap();
    match heatmap.geometry {
        ChartGeometry::Matrix { columns, .. } => assert_eq!(columns, vec!["a", "b"]),
        other => panic!("expected a matrix, got {other:?}"),
    }

    let pie = pipeline
        .custom_chart(&session, &ChartSpec::new("pie").with_x("region"))
        .unwrap();
    assert_eq!(pie.title, "Share of region");
    match pie.geometry {
        ChartGeometry::Wedges { wedges } => {
            assert_eq!(wedges.len(), 2);
            assert_eq!(wedges[0].label, "south");
        }
        other => panic!("expected wedges, got {other:?}"),
    }

    let histogram = pipeline
        .custom_chart(&session, &ChartSpec::new("histogram").with_y("a"))
        .unwrap();
    assert!(matches!(histogram.geometry, ChartGeometry::Bins { .. }));
}

#[tokio::test]
async fn test_failed_ask_leaves_history_untouched() {
    let client = ScriptedClient::with_replies(vec![
        Err(LLMError::Network("connection refused".into())),
        Ok("A leads.".to_string()),
    ]);
    let pipeline = pipeline(client.clone());
    let mut session = Session::new();
    pipeline
        .load_csv_bytes(&mut session, SALES_CSV.as_bytes(), "sales.csv")
        .unwrap();

    let err = pipeline.ask(&mut session, "Which category leads?").await.unwrap_err();
    assert!(matches!(err, VistaError::Llm(LLMError::Network(_))));
    assert!(session.history.is_empty());

    let stream = pipeline.ask(&mut session, "Which category leads?").await.unwrap();
    assert_eq!(stream.collect_text().await.unwrap(), "A leads.");
    assert_eq!(session.history.len(), 1);
    let prompt = client.prompts.lock().unwrap()[1].clone();
    assert_eq!(prompt.matches("user: Which category leads?").count(), 1);
}
