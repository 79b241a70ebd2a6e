//! Structured query execution.

use modelprops_aps::{JobState, SharedIndexService, StructuredQuery};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::error::{PropsError, PropsResult};
use super::poll::{PollPolicy, cancellable, poll_until_terminal};

/// Largest result set handed back to the model.
pub const DEFAULT_MAX_RESULTS: usize = 256;

/// Parse query text into the service's structured query schema.
///
/// The payload must be a JSON object with an object-valued `query`; `columns`
/// is optional but must be an object when present. Other keys pass through.
pub fn parse_query(text: &str) -> PropsResult<StructuredQuery> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| PropsError::QueryPayload(format!("not valid JSON: {}", e)))?;

    let Value::Object(map) = &value else {
        return Err(PropsError::QueryPayload(
            "expected a JSON object with a \"query\" key".to_string(),
        ));
    };
    match map.get("query") {
        Some(Value::Object(_)) => {}
        Some(_) => {
            return Err(PropsError::QueryPayload(
                "\"query\" must be an object".to_string(),
            ));
        }
        None => {
            return Err(PropsError::QueryPayload(
                "missing required \"query\" key".to_string(),
            ));
        }
    }
    if let Some(columns) = map.get("columns")
        && !columns.is_object()
    {
        return Err(PropsError::QueryPayload(
            "\"columns\" must be an object".to_string(),
        ));
    }

    serde_json::from_value(value).map_err(|e| PropsError::QueryPayload(e.to_string()))
}

/// Submits queries, waits for them, and enforces the row cap.
pub struct QueryExecutor {
    service: SharedIndexService,
    project_id: String,
    poll: PollPolicy,
    max_results: usize,
}

impl QueryExecutor {
    /// Create an executor with the default policy and row cap.
    pub fn new(service: SharedIndexService, project_id: impl Into<String>) -> Self {
        Self {
            service,
            project_id: project_id.into(),
            poll: PollPolicy::default(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Set the polling policy.
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Set the row cap.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Run `query_text` against `index_id` and return its rows.
    ///
    /// The text is validated before anything is sent. A result set larger
    /// than the cap is rejected whole; it is never truncated.
    pub async fn run_query(
        &self,
        index_id: &str,
        query_text: &str,
        cancel: &CancellationToken,
    ) -> PropsResult<Vec<Value>> {
        let query = parse_query(query_text)?;

        let submitted = cancellable(cancel, async {
            self.service
                .create_query(&self.project_id, index_id, &query)
                .await
                .map_err(PropsError::from)
        })
        .await?;
        let query_id = submitted.query_id.clone();
        tracing::info!(index_id, query_id = %query_id, state = %submitted.state, "Query submitted");

        let operation = format!("query {}", query_id);
        let status = poll_until_terminal(
            submitted,
            &self.poll,
            cancel,
            &operation,
            || self.service.get_query(&self.project_id, index_id, &query_id),
            |s| s.state,
        )
        .await?;

        if status.state == JobState::Failed {
            tracing::info!(index_id, query_id = %query_id, "Query failed");
            return Err(PropsError::QueryExecution {
                errors: status.errors,
            });
        }

        let rows = cancellable(cancel, async {
            self.service
                .get_query_results(&self.project_id, index_id, &query_id)
                .await
                .map_err(PropsError::from)
        })
        .await?;

        if rows.len() > self.max_results {
            tracing::info!(
                index_id,
                query_id = %query_id,
                count = rows.len(),
                limit = self.max_results,
                "Query result rejected as too large"
            );
            return Err(PropsError::ResultTooLarge {
                count: rows.len(),
                limit: self.max_results,
            });
        }

        tracing::info!(index_id, query_id = %query_id, count = rows.len(), "Query finished");
        Ok(rows)
    }
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("project_id", &self.project_id)
            .field("poll", &self.poll)
            .field("max_results", &self.max_results)
            .finish_non_exhaustive()
    }
}
