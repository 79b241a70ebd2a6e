//! Design property operations behind the agent's tools.
//!
//! ```text
//! IndexLifecycleManager ── create_index / get_index ──┐
//! FieldCatalogBuilder ──── list_fields ───────────────┼──▶ IndexService
//! QueryExecutor ────────── create_query / get_query ──┘
//! ```
//!
//! Each operation waits on remote jobs through [`poll`], which backs off,
//! honors a deadline, and stops when the caller's cancellation token fires.

pub mod cache;
pub mod error;
pub mod fields;
pub mod index;
pub mod poll;
pub mod query;

pub use cache::{DesignStore, IndexCache, IndexRecord, decode_design_key, design_key};
pub use error::{PropsError, PropsResult};
pub use fields::{DEFAULT_CATEGORIES, FieldCatalog, FieldCatalogBuilder};
pub use index::IndexLifecycleManager;
pub use poll::PollPolicy;
pub use query::{DEFAULT_MAX_RESULTS, QueryExecutor, parse_query};
