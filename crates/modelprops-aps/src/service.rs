//! The service contract the agent core depends on.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{AccessToken, FieldDescriptor, IndexRequest, IndexStatus, QueryStatus, StructuredQuery};

/// Asynchronous design-property indexing service.
///
/// Index builds and queries are jobs: `create_*` starts one and returns its
/// initial status, `get_*` polls it. Implementations handle their own
/// transport retries; errors returned here are final.
#[async_trait]
pub trait IndexService: Send + Sync {
    /// Start (or look up) an index build over the requested versions.
    async fn create_index(&self, project_id: &str, request: &IndexRequest) -> Result<IndexStatus>;

    /// Poll an index build.
    async fn get_index(&self, project_id: &str, index_id: &str) -> Result<IndexStatus>;

    /// List every raw field of a finished index.
    async fn list_fields(&self, project_id: &str, index_id: &str) -> Result<Vec<FieldDescriptor>>;

    /// Submit a structured query against a finished index.
    async fn create_query(
        &self,
        project_id: &str,
        index_id: &str,
        query: &StructuredQuery,
    ) -> Result<QueryStatus>;

    /// Poll a query.
    async fn get_query(&self, project_id: &str, index_id: &str, query_id: &str) -> Result<QueryStatus>;

    /// Fetch the rows of a finished query.
    async fn get_query_results(
        &self,
        project_id: &str,
        index_id: &str,
        query_id: &str,
    ) -> Result<Vec<Value>>;
}

/// A service that can be shared across tasks.
pub type SharedIndexService = Arc<dyn IndexService>;

/// Opens an [`IndexService`] on behalf of one credential.
pub trait ServiceConnector: Send + Sync {
    /// Bind a service handle to the given access token.
    fn connect(&self, token: &AccessToken) -> Result<SharedIndexService>;
}
