//! Tool that reshapes JSON with a filter expression.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::props::PropsError;
use crate::tool::{Tool, ToolContext, ToolResult, TransformJsonParams};
use crate::transform::{TransformLimits, transform};

/// Applies a jq-style filter to JSON text and returns every output as a JSON
/// array.
#[derive(Debug, Clone, Default)]
pub struct TransformJsonTool {
    limits: TransformLimits,
}

impl TransformJsonTool {
    pub fn new(limits: TransformLimits) -> Self {
        Self { limits }
    }
}

#[async_trait]
impl Tool for TransformJsonTool {
    fn name(&self) -> &str {
        "transform_json"
    }

    fn description(&self) -> &str {
        "Processes the given JSON input with the given jq filter, and returns the results as a JSON array. Use it to count, sum, group or project query results."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filter": {
                    "type": "string",
                    "description": "The jq filter to execute. For example: \".[] | .Width\""
                },
                "input_json": {
                    "type": "string",
                    "description": "The JSON input to process with the filter."
                }
            },
            "required": ["filter", "input_json"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let params = match TransformJsonParams::try_from(params) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        let outcome = transform(&params.filter, &params.input_json, &self.limits).map_err(PropsError::from);
        ToolResult::from_props(outcome, |values| ToolResult::json(Value::Array(values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(params: Value) -> ToolResult {
        TransformJsonTool::default()
            .execute(params, &ToolContext::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_identity_returns_elements_in_order() {
        let result = run(json!({"filter": ".[]", "input_json": "[3, 1, 2]"})).await;
        assert_eq!(result, ToolResult::json(json!([3, 1, 2])));
    }

    #[tokio::test]
    async fn test_structured_input_is_accepted() {
        let result = run(json!({
            "filter": "map(.Width) | add",
            "input_json": [{"Width": 100}, {"Width": 20}]
        }))
        .await;
        assert_eq!(result, ToolResult::json(json!([120])));
    }

    #[tokio::test]
    async fn test_syntax_error_is_shown_to_model() {
        let result = run(json!({"filter": ".[", "input_json": "[]"})).await;
        assert!(result.is_error());
        assert!(result.to_llm_content().starts_with("Error: Filter syntax error"));
    }

    #[tokio::test]
    async fn test_runtime_error_is_shown_to_model() {
        let result = run(json!({"filter": ".[] | .Width", "input_json": "[[1]]"})).await;
        assert_eq!(
            result.to_llm_content(),
            "Error: Filter evaluation error: Cannot index array with \"Width\""
        );
    }

    #[tokio::test]
    async fn test_budget_exhaustion_is_recoverable() {
        let tool = TransformJsonTool::new(TransformLimits::default().with_max_steps(1_000));
        let result = tool
            .execute(
                json!({"filter": "[range(1e9)]", "input_json": "null"}),
                &ToolContext::default(),
            )
            .await
            .unwrap();
        assert!(result.is_error());
        assert!(result.to_llm_content().contains("budget"));
    }
}
