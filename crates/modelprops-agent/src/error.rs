//! Agent failures and how they split between the model and the caller.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

/// A failure during a turn.
///
/// [`AgentError::is_recoverable`] variants are mistakes in a tool call; the
/// model sees them as an error tool result and may try again. The rest end
/// the turn and are returned to whoever asked the question.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model call failed: {0}")]
    Llm(#[from] modelprops_llm::LlmError),

    /// Transport, credential or protocol failure of the indexing service.
    #[error("indexing service failed: {0}")]
    Service(#[from] modelprops_aps::ApsError),

    #[error("tool failed: {0}")]
    Tool(String),

    #[error("no tool named '{0}' (tool not found)")]
    ToolNotFound(String),

    #[error("invalid tool arguments: {0}")]
    InvalidToolParams(String),

    #[error("agent misconfigured: {0}")]
    Config(String),

    #[error("cannot encode value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("turn cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Tool(_) | Self::ToolNotFound(_) | Self::InvalidToolParams(_)
        )
    }
}
