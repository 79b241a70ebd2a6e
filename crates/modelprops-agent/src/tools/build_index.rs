//! Tool that builds the index of a design version.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::props::IndexLifecycleManager;
use crate::tool::{BuildIndexParams, Tool, ToolContext, ToolResult};

/// Builds an index of a design's elements and properties, or returns the one
/// already built for it.
#[derive(Debug, Clone)]
pub struct BuildIndexTool {
    manager: Arc<IndexLifecycleManager>,
}

impl BuildIndexTool {
    pub fn new(manager: Arc<IndexLifecycleManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for BuildIndexTool {
    fn name(&self) -> &str {
        "build_index"
    }

    fn description(&self) -> &str {
        "Builds an index of design elements, property fields, and property values for the given design ID. Returns the ID of the created index. Indexes are reused, so calling this again for the same design is cheap."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "design_id": {
                    "type": "string",
                    "description": "The ID of the design to build the index for."
                }
            },
            "required": ["design_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let params = match BuildIndexParams::try_from(params) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        let outcome = self
            .manager
            .ensure_index(&params.design_id, &ctx.cancellation)
            .await;
        ToolResult::from_props(outcome, ToolResult::text)
    }
}
