//! LRU cache with idle expiry.

use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};

use lru::LruCache;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::ttl::TtlTracker;

struct CacheInner<V> {
    lru: LruCache<String, V>,
    ttl: TtlTracker,
}

impl<V> CacheInner<V> {
    /// Drop `key` if it has expired. Returns whether it was dropped.
    fn evict_if_expired(&mut self, key: &str) -> bool {
        if self.lru.contains(key) && self.ttl.is_expired(key) {
            debug!(key = %key, "Cache entry expired");
            self.lru.pop(key);
            self.ttl.remove(key);
            true
        } else {
            false
        }
    }

    /// Drop every expired entry and return how many were dropped.
    fn sweep(&mut self) -> usize {
        let mut count = 0;
        for key in self.ttl.drain_expired() {
            if self.lru.pop(&key).is_some() {
                count += 1;
            }
        }
        count
    }
}

/// Bounded cache keyed by string.
///
/// Values are cloned out on read, so store cheap handles (`Arc<_>`, ids).
/// Cloning the cache shares the underlying storage.
pub struct SessionCache<V> {
    inner: Arc<RwLock<CacheInner<V>>>,
    config: CacheConfig,
}

impl<V: Clone + Send + Sync + 'static> SessionCache<V> {
    /// Create an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        let inner = CacheInner {
            lru: LruCache::new(cap),
            ttl: TtlTracker::new(config.ttl),
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
            config,
        }
    }

    /// Number of cached entries, including ones not yet swept.
    pub async fn len(&self) -> usize {
        self.inner.read().await.lru.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.lru.is_empty()
    }

    /// Look up a live entry, marking it recently used and resetting its TTL.
    pub async fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.write().await;
        if inner.evict_if_expired(key) {
            return None;
        }
        let value = inner.lru.get(key).cloned();
        if value.is_some() {
            trace!(key = %key, "Cache hit");
            inner.ttl.touch(key);
        }
        value
    }

    /// Insert or replace an entry.
    ///
    /// Returns the entry evicted to make room, if any.
    pub async fn insert(&self, key: &str, value: V) -> Option<(String, V)> {
        let mut inner = self.inner.write().await;

        let evicted = inner.lru.push(key.to_string(), value);
        let evicted = match evicted {
            Some((evicted_key, evicted_value)) if evicted_key != key => {
                debug!(key = %evicted_key, "Evicting least recently used entry");
                inner.ttl.remove(&evicted_key);
                Some((evicted_key, evicted_value))
            }
            _ => None,
        };
        inner.ttl.touch(key);

        trace!(key = %key, cache_size = inner.lru.len(), "Cache entry inserted");
        evicted
    }

    /// Whether a live entry exists, without touching it.
    pub async fn contains(&self, key: &str) -> bool {
        let inner = self.inner.read().await;
        inner.lru.contains(key) && !inner.ttl.is_expired(key)
    }

    /// Remove an entry, returning it.
    pub async fn remove(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.write().await;
        inner.ttl.remove(key);
        inner.lru.pop(key)
    }

    /// Start a background sweep when enabled in the configuration.
    ///
    /// The task stops on its own once every clone of the cache is dropped.
    pub fn spawn_cleanup_task(&self) -> Option<JoinHandle<()>> {
        if !self.config.enable_cleanup_task || self.config.ttl.is_none() {
            return None;
        }
        let weak: Weak<RwLock<CacheInner<V>>> = Arc::downgrade(&self.inner);
        let period = self.config.cleanup_interval;

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let count = inner.write().await.sweep();
                if count > 0 {
                    debug!(count, "Swept expired cache entries");
                }
            }
        }))
    }
}

impl<V> Clone for SessionCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
        }
    }
}
