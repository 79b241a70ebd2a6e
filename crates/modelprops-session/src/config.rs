//! Cache configuration.

use std::time::Duration;

/// Default maximum number of cached entries.
pub const DEFAULT_MAX_ENTRIES: usize = 64;

/// Default idle TTL.
pub const DEFAULT_TTL: Option<Duration> = Some(Duration::from_secs(3600));

/// Configuration for a [`SessionCache`](crate::SessionCache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum entries before LRU eviction.
    pub max_entries: usize,

    /// Entries idle longer than this are dropped.
    pub ttl: Option<Duration>,

    /// Whether [`SessionCache::spawn_cleanup_task`](crate::SessionCache::spawn_cleanup_task)
    /// starts a sweeper. Without it, expired entries are dropped on access.
    pub enable_cleanup_task: bool,

    /// Interval between sweeps.
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl: DEFAULT_TTL,
            enable_cleanup_task: true,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of entries.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set the idle TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Never expire entries by age.
    pub fn without_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    /// Enable or disable the background sweeper.
    pub fn with_cleanup_task(mut self, enabled: bool) -> Self {
        self.enable_cleanup_task = enabled;
        self
    }

    /// Set the sweep interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}
