//! The design property tools offered to the model.
//!
//! - `build_index`: build (or reuse) the index of a design version
//! - `list_fields`: the allow-listed field catalog of an index
//! - `run_query`: run a structured query against an index
//! - `transform_json`: reshape JSON with a filter expression

mod build_index;
mod list_fields;
mod run_query;
mod transform_json;

use std::sync::Arc;

pub use build_index::BuildIndexTool;
pub use list_fields::ListFieldsTool;
pub use run_query::RunQueryTool;
pub use transform_json::TransformJsonTool;

use crate::props::{FieldCatalogBuilder, IndexLifecycleManager, QueryExecutor};
use crate::tool::ToolRegistry;
use crate::transform::TransformLimits;

/// Register all four design property tools.
pub fn register_design_tools(
    registry: &mut ToolRegistry,
    index: Arc<IndexLifecycleManager>,
    fields: Arc<FieldCatalogBuilder>,
    query: Arc<QueryExecutor>,
    limits: TransformLimits,
) {
    registry.register(BuildIndexTool::new(index));
    registry.register(ListFieldsTool::new(fields));
    registry.register(RunQueryTool::new(query));
    registry.register(TransformJsonTool::new(limits));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::{DesignStore, IndexCache};
    use modelprops_aps::MockIndexService;
    use modelprops_session::{CacheConfig, SessionCache};

    #[test]
    fn test_register_design_tools() {
        let service = Arc::new(MockIndexService::new());
        let cache = IndexCache::in_memory(CacheConfig::new().without_ttl());
        let mut registry = ToolRegistry::new();
        register_design_tools(
            &mut registry,
            Arc::new(IndexLifecycleManager::new(service.clone(), "p", cache)),
            Arc::new(FieldCatalogBuilder::new(
                service.clone(),
                "p",
                SessionCache::new(CacheConfig::new()),
                DesignStore::disabled(),
                "design",
            )),
            Arc::new(QueryExecutor::new(service, "p")),
            TransformLimits::default(),
        );

        assert_eq!(
            registry.names(),
            vec!["build_index", "list_fields", "run_query", "transform_json"]
        );
        for def in registry.to_llm_definitions() {
            assert!(!def.description.is_empty(), "{}", def.name);
        }
    }
}
