//! Failures of the design property operations.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::error::AgentError;

/// Result type for design property operations.
pub type PropsResult<T> = std::result::Result<T, PropsError>;

/// Error raised by index builds, field listing, queries and transforms.
///
/// Most kinds describe something the model can act on (a failed build, a bad
/// payload, too many rows) and are shown to it as tool output. `Cancelled`
/// and most `Service` errors are not; see [`PropsError::is_recoverable`].
#[derive(Debug, Error)]
pub enum PropsError {
    /// The remote build finished in the `failed` state.
    #[error("Index creation failed with errors: {}", render_errors(.errors))]
    IndexBuild {
        /// Error descriptors reported by the service.
        errors: Vec<Value>,
    },

    /// The query text does not match the structured query schema.
    #[error("Invalid query payload: {0}")]
    QueryPayload(String),

    /// The remote query finished in the `failed` state.
    #[error("Query failed with errors: {}", render_errors(.errors))]
    QueryExecution {
        /// Error descriptors reported by the service.
        errors: Vec<Value>,
    },

    /// More rows matched than the caller may receive.
    #[error("Query returned too many results ({count}), please refine the query.")]
    ResultTooLarge {
        /// Rows the query produced.
        count: usize,
        /// Largest accepted row count.
        limit: usize,
    },

    /// The filter expression did not compile.
    #[error("Filter syntax error: {0}")]
    FilterSyntax(String),

    /// The filter raised while running against the input.
    #[error("Filter evaluation error: {0}")]
    FilterEvaluation(String),

    /// A remote job was still running when the wait deadline passed.
    #[error("Timed out after {}s waiting for {operation}", .waited.as_secs())]
    Timeout {
        /// What was being waited on, e.g. `index IDX1`.
        operation: String,
        /// How long the wait lasted.
        waited: Duration,
    },

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Transport or credential failure below the tool boundary.
    #[error(transparent)]
    Service(#[from] modelprops_aps::ApsError),
}

impl PropsError {
    /// Whether the model should see this as a tool failure and try again.
    ///
    /// Service errors are recoverable only when the request itself was
    /// rejected, e.g. an index id the service does not know.
    pub fn is_recoverable(&self) -> bool {
        match self {
            PropsError::Cancelled => false,
            PropsError::Service(err) => err.is_request_error(),
            _ => true,
        }
    }
}

impl From<PropsError> for AgentError {
    fn from(err: PropsError) -> Self {
        match err {
            PropsError::Service(e) => AgentError::Service(e),
            PropsError::Cancelled => AgentError::Cancelled,
            other => AgentError::Tool(other.to_string()),
        }
    }
}

/// Render service error descriptors as compact JSON.
fn render_errors(errors: &[Value]) -> String {
    serde_json::to_string(errors).unwrap_or_else(|_| format!("{:?}", errors))
}
