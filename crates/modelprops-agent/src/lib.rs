//! Agent core for modelprops.
//!
//! This crate answers natural-language questions about design properties by
//! letting a model drive four tools against the model properties indexing
//! service.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  SessionManager                                             │
//! │  - One DesignSession per project, design and credential    │
//! │  - Shared index and field caches                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Agent                                                      │
//! │  - Round-budgeted conversation loop                         │
//! │  - Tool failures shown to the model as text                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//!       ┌──────────┐    ┌──────────┐    ┌──────────┐
//!       │LlmBackend│    │ToolReg   │    │ Journal  │
//!       └──────────┘    └──────────┘    └──────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//!        build_index     list_fields      run_query ── transform_json
//! ```
//!
//! # Core Components
//!
//! - [`SessionManager`]: creates and reuses [`DesignSession`]s
//! - [`Agent`]: runs one turn of the conversation
//! - [`props`]: index lifecycle, field catalog and query execution
//! - [`transform`]: the sandboxed JSON filter language
//! - [`Journal`]: append-only transcript of every turn

pub mod agent;
pub mod error;
pub mod journal;
pub mod prompt;
pub mod props;
pub mod session;
pub mod tool;
pub mod tools;
pub mod transform;
pub mod types;

// Re-export core types
pub use error::{AgentError, Result};
pub use types::{
    AgentConfig, AgentResponse, DEFAULT_MAX_ITERATIONS, Session, SessionId, ToolCall,
    ToolResultRecord, Turn, TurnId,
};

// Re-export tool types
pub use tool::{
    BuildIndexParams, ListFieldsParams, ParamExt, ParamResult, ParameterValidationError,
    RunQueryParams, Tool, ToolContext, ToolRegistry, ToolResult, TransformJsonParams,
};
pub use tools::{
    BuildIndexTool, ListFieldsTool, RunQueryTool, TransformJsonTool, register_design_tools,
};

// Re-export agent
pub use agent::{Agent, AgentBuilder, CLARIFICATION_FALLBACK};
pub use journal::{Journal, JournalEntry, JournalEvent};
pub use prompt::SystemPromptBuilder;

// Re-export design property operations
pub use props::{
    DesignStore, FieldCatalog, FieldCatalogBuilder, IndexCache, IndexLifecycleManager,
    PollPolicy, PropsError, PropsResult, QueryExecutor,
};
pub use session::{DesignRef, DesignSession, SessionManager, SessionSettings};
pub use transform::{Filter, TransformError, TransformLimits, transform};

pub use tokio_util::sync::CancellationToken;
