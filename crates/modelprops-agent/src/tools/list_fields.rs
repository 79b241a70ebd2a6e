//! Tool that lists the property fields of an index.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::props::FieldCatalogBuilder;
use crate::tool::{ListFieldsParams, Tool, ToolContext, ToolResult};

/// Lists the allow-listed property fields of an index as
/// `category → name → key`.
#[derive(Debug, Clone)]
pub struct ListFieldsTool {
    builder: Arc<FieldCatalogBuilder>,
}

impl ListFieldsTool {
    pub fn new(builder: Arc<FieldCatalogBuilder>) -> Self {
        Self { builder }
    }
}

#[async_trait]
impl Tool for ListFieldsTool {
    fn name(&self) -> &str {
        "list_fields"
    }

    fn description(&self) -> &str {
        "Lists names of property fields in an index of the given ID. Returns a JSON object mapping field categories to field names and their corresponding keys. Use the keys (as \"s.props.<key>\") when writing queries."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "index_id": {
                    "type": "string",
                    "description": "The ID of the index to list fields for."
                }
            },
            "required": ["index_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let params = match ListFieldsParams::try_from(params) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        let outcome = self
            .builder
            .list_fields(&params.index_id, &ctx.cancellation)
            .await;
        ToolResult::from_props(outcome, |catalog| ToolResult::json(catalog.to_json()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::DesignStore;
    use modelprops_aps::{FieldDescriptor, MockIndexService};
    use modelprops_session::{CacheConfig, SessionCache};

    fn tool(service: Arc<MockIndexService>) -> ListFieldsTool {
        let builder = FieldCatalogBuilder::new(
            service,
            "b.project",
            SessionCache::new(CacheConfig::new().without_ttl()),
            DesignStore::disabled(),
            "design",
        );
        ListFieldsTool::new(Arc::new(builder))
    }

    #[tokio::test]
    async fn test_list_fields_filters_categories() {
        let service = Arc::new(MockIndexService::new().with_index_id("IDX1").with_fields(vec![
            FieldDescriptor::new("__name__", "Name", "k1"),
            FieldDescriptor::new("Internal", "X", "k2"),
        ]));
        let result = tool(service)
            .execute(json!({"index_id": "IDX1"}), &ToolContext::default())
            .await
            .unwrap();

        assert_eq!(result, ToolResult::json(json!({"__name__": {"Name": "k1"}})));
        assert_eq!(result.to_llm_content(), r#"{"__name__":{"Name":"k1"}}"#);
    }

    #[tokio::test]
    async fn test_unknown_index_is_shown_to_model() {
        let service = Arc::new(MockIndexService::new());
        let result = tool(service)
            .execute(json!({"index_id": "IDX-MADE-UP"}), &ToolContext::default())
            .await
            .unwrap();

        assert!(result.is_error());
        assert!(result.to_llm_content().contains("IDX-MADE-UP"));
    }

    #[tokio::test]
    async fn test_wrong_parameter_type() {
        let result = tool(Arc::new(MockIndexService::new()))
            .execute(json!({"index_id": 42}), &ToolContext::default())
            .await
            .unwrap();

        assert!(result.is_error());
        assert!(result.to_llm_content().contains("index_id"));
    }
}
