//! System prompt generation.
//!
//! ```rust,ignore
//! use modelprops_agent::prompt::SystemPromptBuilder;
//!
//! let prompt = SystemPromptBuilder::new()
//!     .with_tools(&registry)
//!     .with_design(version_urn)
//!     .build();
//! ```

mod builder;

pub use builder::{QUERY_LANGUAGE_GUIDE, SystemPromptBuilder, ToolSummary};
