//! Language model client abstraction.
//!
//! The agent talks to a chat model through the [`LlmBackend`] trait. The model
//! is treated as an opaque capability: it receives the conversation plus the
//! advertised tool definitions and answers with text, tool calls, or both.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  LlmBackend trait            │
//! │  - complete() -> Response    │
//! └──────────────────────────────┘
//!             │
//!     ┌───────┴────────┐
//!     ▼                ▼
//! ┌─────────┐    ┌─────────────┐
//! │ OpenAI  │    │ MockBackend │
//! └─────────┘    └─────────────┘
//! ```

pub mod backend;
pub mod error;
pub mod openai;
pub mod types;

pub use backend::{LlmBackend, SharedBackend, with_retry};
#[cfg(any(test, feature = "testing"))]
pub use backend::{MockBackend, MockResponse};
pub use error::{LlmError, Result};
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use types::{
    CompletionRequest, CompletionResponse, Content, ContentBlock, Message, Role, StopReason,
    ToolDefinition, ToolResultBlock, ToolUseBlock, Usage,
};
