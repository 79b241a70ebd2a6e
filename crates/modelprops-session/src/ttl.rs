//! Idle-time tracking for cache expiry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks last access times for TTL-based expiration.
#[derive(Debug)]
pub struct TtlTracker {
    access_times: HashMap<String, Instant>,
    ttl: Option<Duration>,
}

impl TtlTracker {
    /// Create a tracker; `None` disables expiry.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            access_times: HashMap::new(),
            ttl,
        }
    }

    /// Record an access (resets the idle timer).
    pub fn touch(&mut self, key: &str) {
        self.access_times.insert(key.to_string(), Instant::now());
    }

    /// Whether the key has been idle longer than the TTL.
    ///
    /// Untracked keys count as expired when a TTL is set.
    pub fn is_expired(&self, key: &str) -> bool {
        match self.ttl {
            None => false,
            Some(ttl) => match self.access_times.get(key) {
                None => true,
                Some(last_access) => last_access.elapsed() > ttl,
            },
        }
    }

    /// Stop tracking a key.
    pub fn remove(&mut self, key: &str) {
        self.access_times.remove(key);
    }

    /// Remove all expired keys and return them.
    pub fn drain_expired(&mut self) -> Vec<String> {
        let Some(ttl) = self.ttl else {
            return Vec::new();
        };
        let now = Instant::now();
        let expired: Vec<String> = self
            .access_times
            .iter()
            .filter(|(_, last_access)| now.duration_since(**last_access) > ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.access_times.remove(key);
        }
        expired
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.access_times.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.access_times.is_empty()
    }

    /// The configured TTL.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }
}
