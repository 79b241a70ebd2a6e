//! Bounded cache with LRU eviction and idle expiry.
//!
//! Holds long-lived per-design state (conversation sessions, built index
//! identifiers) so a busy process never grows without bound:
//! - LRU eviction once `max_entries` is reached
//! - Optional idle TTL, reset on every access
//! - Optional background sweep of expired entries
//!
//! # Example
//!
//! ```rust,ignore
//! use modelprops_session::{CacheConfig, SessionCache};
//!
//! let config = CacheConfig::default()
//!     .with_max_entries(64)
//!     .with_ttl(Duration::from_secs(3600));
//!
//! let cache: SessionCache<String> = SessionCache::new(config);
//! cache.insert("design-key", "IDX1".to_string()).await;
//! ```

mod cache;
mod config;
mod ttl;

pub use cache::SessionCache;
pub use config::CacheConfig;
pub use ttl::TtlTracker;
