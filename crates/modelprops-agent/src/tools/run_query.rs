//! Tool that runs a structured query against an index.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::props::QueryExecutor;
use crate::tool::{RunQueryParams, Tool, ToolContext, ToolResult};

/// Runs a structured query and returns the matching elements' properties.
#[derive(Debug, Clone)]
pub struct RunQueryTool {
    executor: Arc<QueryExecutor>,
}

impl RunQueryTool {
    pub fn new(executor: Arc<QueryExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for RunQueryTool {
    fn name(&self) -> &str {
        "run_query"
    }

    fn description(&self) -> &str {
        "Queries an index of the given ID with a Model Properties Query Language query. Returns a JSON list with properties of matching design elements. Queries matching too many elements are rejected; refine the query and try again."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "index_id": {
                    "type": "string",
                    "description": "The ID of the index to query."
                },
                "query": {
                    "type": "string",
                    "description": "The Model Properties Query Language query: a JSON object with a \"query\" member and an optional \"columns\" member."
                }
            },
            "required": ["index_id", "query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let params = match RunQueryParams::try_from(params) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        let outcome = self
            .executor
            .run_query(&params.index_id, &params.query, &ctx.cancellation)
            .await;
        ToolResult::from_props(outcome, |rows| ToolResult::json(Value::Array(rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::PollPolicy;
    use modelprops_aps::{JobState, MockIndexService};
    use std::time::Duration;

    const WALLS: &str = r#"{"query": {"$eq": ["s.props.p5eddc473", "'Walls'"]}}"#;

    fn tool(service: Arc<MockIndexService>) -> RunQueryTool {
        let executor = QueryExecutor::new(service, "b.project")
            .with_poll_policy(PollPolicy::fixed(Duration::from_millis(1)));
        RunQueryTool::new(Arc::new(executor))
    }

    fn rows(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({"svf2Id": i})).collect()
    }

    #[tokio::test]
    async fn test_query_returns_rows() {
        let service = Arc::new(
            MockIndexService::new()
                .with_query_states(vec![JobState::Processing, JobState::Finished])
                .with_rows(rows(3)),
        );
        let result = tool(service)
            .execute(json!({"index_id": "IDX-TEST", "query": WALLS}), &ToolContext::default())
            .await
            .unwrap();

        assert_eq!(result, ToolResult::json(json!([{"svf2Id": 0}, {"svf2Id": 1}, {"svf2Id": 2}])));
    }

    #[tokio::test]
    async fn test_query_object_is_accepted() {
        let service = Arc::new(MockIndexService::new().with_rows(rows(1)));
        let query: Value = serde_json::from_str(WALLS).unwrap();
        let result = tool(Arc::clone(&service))
            .execute(json!({"index_id": "IDX-TEST", "query": query}), &ToolContext::default())
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(service.queries().len(), 1);
    }

    #[tokio::test]
    async fn test_too_many_rows_is_shown_to_model() {
        let service = Arc::new(MockIndexService::new().with_rows(rows(300)));
        let result = tool(service)
            .execute(json!({"index_id": "IDX-TEST", "query": WALLS}), &ToolContext::default())
            .await
            .unwrap();

        assert_eq!(
            result.to_llm_content(),
            "Error: Query returned too many results (300), please refine the query."
        );
    }

    #[tokio::test]
    async fn test_bad_payload_never_reaches_network() {
        let service = Arc::new(MockIndexService::new());
        let result = tool(Arc::clone(&service))
            .execute(
                json!({"index_id": "IDX-TEST", "query": "walls where width > 2"}),
                &ToolContext::default(),
            )
            .await
            .unwrap();

        assert!(result.is_error());
        assert!(result.to_llm_content().contains("Invalid query payload"));
        assert_eq!(service.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_missing_parameters_reported_together() {
        let result = tool(Arc::new(MockIndexService::new()))
            .execute(json!({}), &ToolContext::default())
            .await
            .unwrap();

        let content = result.to_llm_content();
        assert!(content.contains("index_id"));
        assert!(content.contains("query"));
    }
}
