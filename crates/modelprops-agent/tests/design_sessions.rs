//! End-to-end design session tests.
//!
//! A scripted model drives the real tools against the in-memory indexing
//! service through a [`SessionManager`], the same way the CLI does.

use std::sync::Arc;
use std::time::Duration;

use modelprops_agent::{
    AgentError, CLARIFICATION_FALLBACK, CancellationToken, DesignRef, PollPolicy, SessionManager,
    SessionSettings,
};
use modelprops_aps::{AccessToken, ApsError, FieldDescriptor, JobState, MockConnector, MockIndexService};
use modelprops_llm::{CompletionResponse, ContentBlock, MockBackend, StopReason, Usage};
use serde_json::{Value, json};

const WALLS: &str = r#"{"query": {"$eq": ["s.props.p5eddc473", "'Walls'"]}}"#;

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn text(text: &str) -> CompletionResponse {
    CompletionResponse::new(
        "msg",
        "test-model",
        vec![ContentBlock::text(text)],
        StopReason::EndTurn,
        Usage::new(10, 20),
    )
}

fn call(id: &str, tool: &str, input: Value) -> CompletionResponse {
    CompletionResponse::new(
        "msg",
        "test-model",
        vec![ContentBlock::tool_use(id, tool, input)],
        StopReason::ToolUse,
        Usage::new(10, 20),
    )
}

fn rows(n: usize) -> Vec<Value> {
    (0..n).map(|i| json!({"svf2Id": i, "Width": i})).collect()
}

fn settings() -> SessionSettings {
    SessionSettings::default().with_poll_policy(PollPolicy::fixed(Duration::from_millis(1)))
}

struct Harness {
    manager: SessionManager,
    service: Arc<MockIndexService>,
    backend: Arc<MockBackend>,
}

impl Harness {
    fn new(service: MockIndexService, replies: Vec<CompletionResponse>) -> Self {
        Self::with_settings(settings(), service, replies)
    }

    fn with_settings(
        settings: SessionSettings,
        service: MockIndexService,
        replies: Vec<CompletionResponse>,
    ) -> Self {
        let service = Arc::new(service);
        let backend = Arc::new(MockBackend::new(replies));
        let connector = Arc::new(MockConnector::new(Arc::clone(&service)));
        let manager = SessionManager::new(settings, connector, backend.clone());
        Self {
            manager,
            service,
            backend,
        }
    }

    async fn ask(&self, prompt: &str) -> modelprops_agent::Result<modelprops_agent::AgentResponse> {
        let session = self
            .manager
            .session(&DesignRef::new("b.project", "D1"), &AccessToken::new("token"))
            .await?;
        session.prompt(prompt, &CancellationToken::new()).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_question_flow() {
    let service = MockIndexService::new()
        .with_index_id("IDX1")
        .with_index_states(vec![JobState::Pending, JobState::Processing, JobState::Finished])
        .with_fields(vec![
            FieldDescriptor::new("Dimensions", "Width", "p1"),
            FieldDescriptor::new("Other", "Foo", "p2"),
            FieldDescriptor::new("__name__", "name", "p3"),
        ])
        .with_rows(vec![json!({"Width": 2}), json!({"Width": 3})]);
    let harness = Harness::new(
        service,
        vec![
            call("c1", "build_index", json!({"design_id": "D1"})),
            call("c2", "list_fields", json!({"index_id": "IDX1"})),
            call("c3", "run_query", json!({"index_id": "IDX1", "query": WALLS})),
            call(
                "c4",
                "transform_json",
                json!({"filter": "map(.Width) | add", "input_json": "[{\"Width\": 2}, {\"Width\": 3}]"}),
            ),
            text("The walls are 5 units wide in total."),
        ],
    );

    let response = harness.ask("How wide are the walls?").await.unwrap();

    assert_eq!(response.responses, vec!["The walls are 5 units wide in total."]);
    assert!(!response.truncated);
    assert!(response.tool_results.iter().all(|r| r.success));

    let contents: Vec<&str> = response.tool_results.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(contents[0], "IDX1");
    let catalog: Value = serde_json::from_str(contents[1]).unwrap();
    assert_eq!(
        catalog,
        json!({"Dimensions": {"Width": "p1"}, "__name__": {"name": "p3"}})
    );
    let found: Value = serde_json::from_str(contents[2]).unwrap();
    assert_eq!(found, json!([{"Width": 2}, {"Width": 3}]));
    let total: Value = serde_json::from_str(contents[3]).unwrap();
    assert_eq!(total, json!([5]));

    let calls = harness.service.calls();
    assert_eq!(calls.create_index, 1);
    assert_eq!(calls.get_index, 2);
    assert_eq!(calls.list_fields, 1);
    assert_eq!(calls.create_query, 1);
    assert_eq!(harness.backend.request_count(), 5);
}

#[tokio::test]
async fn test_index_reused_across_turns_and_credentials() {
    let harness = Harness::new(
        MockIndexService::new().with_index_id("IDX1"),
        vec![
            call("c1", "build_index", json!({"design_id": "D1"})),
            text("Built."),
            call("c2", "build_index", json!({"design_id": "D1"})),
            text("Still built."),
            call("c3", "build_index", json!({"design_id": "D1"})),
            text("Built for bob too."),
        ],
    );

    harness.ask("index it").await.unwrap();
    let second = harness.ask("index it again").await.unwrap();
    assert_eq!(second.tool_results[0].content, "IDX1");

    let design = DesignRef::new("b.project", "D1");
    let bob = harness
        .manager
        .session(&design, &AccessToken::new("bob"))
        .await
        .unwrap();
    let texts = bob.submit("and for me", &CancellationToken::new()).await.unwrap();
    assert_eq!(texts, vec!["Built for bob too."]);

    let calls = harness.service.calls();
    assert_eq!(calls.create_index, 1);
    assert_eq!(calls.get_index, 0);
}

#[tokio::test]
async fn test_oversized_result_is_refused_and_the_model_retries() {
    let harness = Harness::new(
        MockIndexService::new().with_rows(rows(300)),
        vec![
            call("c1", "run_query", json!({"index_id": "IDX-TEST", "query": WALLS})),
            text("Too many walls; please narrow the question."),
        ],
    );

    let response = harness.ask("list every wall").await.unwrap();

    assert!(!response.tool_results[0].success);
    assert_eq!(
        response.tool_results[0].content,
        "Error: Query returned too many results (300), please refine the query."
    );
    assert_eq!(response.responses, vec!["Too many walls; please narrow the question."]);

    let follow_up = harness.backend.requests()[1].clone();
    let blocks = follow_up.messages.last().unwrap().content.blocks();
    assert!(matches!(
        &blocks[0],
        ContentBlock::ToolResult { content, is_error: true, .. } if content.contains("too many results")
    ));
}

#[tokio::test]
async fn test_result_at_the_limit_is_returned_whole() {
    let harness = Harness::new(
        MockIndexService::new().with_rows(rows(256)),
        vec![
            call("c1", "run_query", json!({"index_id": "IDX-TEST", "query": WALLS})),
            text("256 walls."),
        ],
    );

    let response = harness.ask("list every wall").await.unwrap();

    assert!(response.tool_results[0].success);
    let found: Value = serde_json::from_str(&response.tool_results[0].content).unwrap();
    assert_eq!(found.as_array().unwrap().len(), 256);
}

#[tokio::test]
async fn test_malformed_query_makes_no_service_calls() {
    let harness = Harness::new(
        MockIndexService::new(),
        vec![
            call(
                "c1",
                "run_query",
                json!({"index_id": "IDX-TEST", "query": "walls wider than 2m"}),
            ),
            text("That query was not valid."),
        ],
    );

    let response = harness.ask("wide walls?").await.unwrap();

    assert!(!response.tool_results[0].success);
    assert!(response.tool_results[0].content.contains("Invalid query payload"));
    assert_eq!(harness.service.calls().total(), 0);
}

#[tokio::test]
async fn test_failed_index_build_is_shown_to_model() {
    let harness = Harness::new(
        MockIndexService::new()
            .with_index_states(vec![JobState::Failed])
            .with_index_errors(vec![json!({"code": "E42", "detail": "bad version"})]),
        vec![
            call("c1", "build_index", json!({"design_id": "D1"})),
            text("The design could not be indexed."),
        ],
    );

    let response = harness.ask("index it").await.unwrap();

    assert!(!response.tool_results[0].success);
    assert!(response.tool_results[0].content.contains("Index creation failed"));
    assert!(response.tool_results[0].content.contains("E42"));
}

#[tokio::test]
async fn test_identity_transform() {
    let harness = Harness::new(
        MockIndexService::new(),
        vec![
            call(
                "c1",
                "transform_json",
                json!({"filter": ".", "input_json": "{\"a\": [1, 2]}"}),
            ),
            text("Done."),
        ],
    );

    let response = harness.ask("echo").await.unwrap();

    let out: Value = serde_json::from_str(&response.tool_results[0].content).unwrap();
    assert_eq!(out, json!([{"a": [1, 2]}]));
    assert_eq!(harness.service.calls().total(), 0);
}

#[tokio::test]
async fn test_transport_failure_aborts_turn() {
    let harness = Harness::new(
        MockIndexService::new().with_transport_failure("connection reset"),
        vec![call("c1", "build_index", json!({"design_id": "D1"}))],
    );

    let err = harness.ask("index it").await.unwrap_err();
    assert!(matches!(err, AgentError::Service(ApsError::Network(_))));

    let session = harness
        .manager
        .session(&DesignRef::new("b.project", "D1"), &AccessToken::new("token"))
        .await
        .unwrap();
    assert_eq!(session.turn_count().await, 1);
}

#[tokio::test]
async fn test_round_budget_ends_with_clarification() {
    let mut settings = settings();
    settings.agent = settings.agent.with_max_iterations(3);
    let replies = (0..5)
        .map(|i| call(&format!("c{i}"), "transform_json", json!({"filter": ".", "input_json": "1"})))
        .collect();
    let harness = Harness::with_settings(settings, MockIndexService::new(), replies);

    let response = harness.ask("loop forever").await.unwrap();

    assert!(response.truncated);
    assert_eq!(response.responses, vec![CLARIFICATION_FALLBACK]);
    assert_eq!(response.tool_calls.len(), 2);
    assert_eq!(harness.backend.request_count(), 3);
}

#[tokio::test]
async fn test_transcript_written_to_cache_dir() {
    let dir = tempfile::TempDir::new().unwrap();
    let harness = Harness::with_settings(
        settings().with_cache_dir(dir.path()),
        MockIndexService::new().with_index_id("IDX1"),
        vec![call("c1", "build_index", json!({"design_id": "D1"})), text("Ready.")],
    );

    harness.ask("index it").await.unwrap();

    let design = DesignRef::new("b.project", "D1");
    let path = dir.path().join(design.key()).join("transcript.jsonl");
    let mut lines = 0;
    for _ in 0..200 {
        if let Ok(text) = std::fs::read_to_string(&path) {
            lines = text.lines().count();
            if lines >= 4 {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(lines, 4);

    let text = std::fs::read_to_string(&path).unwrap();
    let kinds: Vec<String> = text
        .lines()
        .map(|l| serde_json::from_str::<Value>(l).unwrap()["kind"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["user", "tool_call", "tool_result", "assistant"]);
}
