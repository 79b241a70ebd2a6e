//! Index and field catalog caching.
//!
//! Finished index ids are kept in a bounded in-memory cache shared by every
//! session and, when a cache directory is configured, in one directory per
//! design:
//!
//! ```text
//! <cache_dir>/<design key>/index.json        finished build record
//! <cache_dir>/<design key>/fields.json       field catalog of that index
//! <cache_dir>/<design key>/transcript.jsonl  interaction journal
//! ```
//!
//! The design key is the version id in URL-safe base64, so any version id
//! becomes a valid directory name and can be recovered from it.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use modelprops_aps::JobState;
use modelprops_session::{CacheConfig, SessionCache};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use super::error::PropsResult;
use super::fields::FieldCatalog;

const INDEX_FILE: &str = "index.json";
const FIELDS_FILE: &str = "fields.json";
const TRANSCRIPT_FILE: &str = "transcript.jsonl";

// ─────────────────────────────────────────────────────────────────────────────
// Design keys
// ─────────────────────────────────────────────────────────────────────────────

/// Filesystem-safe, reversible key for a design version id.
pub fn design_key(version_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(version_id.as_bytes())
}

/// Recover the version id from a [`design_key`].
pub fn decode_design_key(key: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(key).ok()?;
    String::from_utf8(bytes).ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// On-disk records
// ─────────────────────────────────────────────────────────────────────────────

/// A finished index build as recorded on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub index_id: String,
    pub state: JobState,
    pub version_urn: String,
    pub created_at: DateTime<Utc>,
}

impl IndexRecord {
    /// Record a finished build.
    pub fn finished(index_id: impl Into<String>, version_urn: impl Into<String>) -> Self {
        Self {
            index_id: index_id.into(),
            state: JobState::Finished,
            version_urn: version_urn.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FieldsRecord {
    index_id: String,
    catalog: FieldCatalog,
}

/// Per-design cache directory.
///
/// Disk problems never fail an operation: reads that fail are misses and
/// writes that fail are logged and dropped.
#[derive(Debug, Clone, Default)]
pub struct DesignStore {
    root: Option<PathBuf>,
}

impl DesignStore {
    /// Store records under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// A store that keeps nothing on disk.
    pub fn disabled() -> Self {
        Self { root: None }
    }

    /// The cache root, if enabled.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Directory for one design.
    pub fn design_dir(&self, key: &str) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(key))
    }

    /// Journal file for one design.
    pub fn transcript_path(&self, key: &str) -> Option<PathBuf> {
        self.design_dir(key).map(|dir| dir.join(TRANSCRIPT_FILE))
    }

    /// The recorded finished build for a design.
    pub async fn load_index(&self, key: &str) -> Option<IndexRecord> {
        let path = self.design_dir(key)?.join(INDEX_FILE);
        let record: IndexRecord = read_json(&path).await?;
        (record.state == JobState::Finished).then_some(record)
    }

    /// Persist a finished build. Other states are ignored.
    pub async fn save_index(&self, key: &str, record: &IndexRecord) {
        if record.state != JobState::Finished {
            return;
        }
        if let Some(dir) = self.design_dir(key) {
            write_json_atomic(&dir, INDEX_FILE, record).await;
        }
    }

    /// The cached catalog for `index_id`, if the recorded one matches.
    pub async fn load_fields(&self, key: &str, index_id: &str) -> Option<FieldCatalog> {
        let path = self.design_dir(key)?.join(FIELDS_FILE);
        let record: FieldsRecord = read_json(&path).await?;
        (record.index_id == index_id).then_some(record.catalog)
    }

    /// Persist the catalog of `index_id`.
    pub async fn save_fields(&self, key: &str, index_id: &str, catalog: &FieldCatalog) {
        if let Some(dir) = self.design_dir(key) {
            let record = FieldsRecord {
                index_id: index_id.to_string(),
                catalog: catalog.clone(),
            };
            write_json_atomic(&dir, FIELDS_FILE, &record).await;
        }
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable cache file");
            None
        }
    }
}

/// Write through a temp file and rename, so readers never see a partial file.
async fn write_json_atomic<T: Serialize>(dir: &Path, name: &str, value: &T) {
    let target = dir.join(name);
    let result = async {
        tokio::fs::create_dir_all(dir).await?;
        let body = serde_json::to_vec_pretty(value).map_err(std::io::Error::other)?;
        let tmp = dir.join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok::<_, std::io::Error>(())
    }
    .await;

    if let Err(e) = result {
        tracing::warn!(path = %target.display(), error = %e, "Failed to write cache file");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Index cache
// ─────────────────────────────────────────────────────────────────────────────

/// Design → finished index id, shared across sessions.
///
/// Lookups go memory first, then disk. Builds go through
/// [`IndexCache::get_or_build`], which holds a per-design lock so at most one
/// build per design is in flight.
#[derive(Clone)]
pub struct IndexCache {
    memory: SessionCache<String>,
    store: DesignStore,
    locks: LockMap,
}

type LockMap = Arc<parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

impl IndexCache {
    /// Create a cache over the given store.
    pub fn new(config: CacheConfig, store: DesignStore) -> Self {
        Self {
            memory: SessionCache::new(config),
            store,
            locks: Arc::new(parking_lot::Mutex::new(HashMap::new())),
        }
    }

    /// A memory-only cache.
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(config, DesignStore::disabled())
    }

    /// The disk store behind this cache.
    pub fn store(&self) -> &DesignStore {
        &self.store
    }

    /// The finished index id recorded for `version_urn`.
    pub async fn lookup(&self, version_urn: &str) -> Option<String> {
        let key = design_key(version_urn);
        if let Some(index_id) = self.memory.get(&key).await {
            return Some(index_id);
        }
        let record = self.store.load_index(&key).await?;
        tracing::debug!(index_id = %record.index_id, "Index id restored from disk");
        self.memory.insert(&key, record.index_id.clone()).await;
        Some(record.index_id)
    }

    /// Return the cached index id or run `build` exactly once to obtain one.
    ///
    /// Only successful builds are recorded.
    pub async fn get_or_build<F, Fut>(&self, version_urn: &str, build: F) -> PropsResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PropsResult<String>>,
    {
        if let Some(index_id) = self.lookup(version_urn).await {
            return Ok(index_id);
        }

        let key = design_key(version_urn);
        let slot = DesignLock::acquire(&self.locks, &key);
        let _guard = slot.lock.lock().await;
        if let Some(index_id) = self.lookup(version_urn).await {
            return Ok(index_id);
        }

        let index_id = build().await?;
        let record = IndexRecord::finished(&index_id, version_urn);
        self.store.save_index(&key, &record).await;
        self.memory.insert(&key, index_id.clone()).await;
        Ok(index_id)
    }

    /// Start sweeping expired index ids in the background.
    pub fn spawn_cleanup_task(&self) {
        self.memory.spawn_cleanup_task();
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().len()
    }
}

/// One caller's share of a design's build lock.
///
/// The map entry goes away when the last share is dropped, whether the build
/// finished, failed or its future was dropped midway.
struct DesignLock {
    locks: LockMap,
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl DesignLock {
    fn acquire(locks: &LockMap, key: &str) -> Self {
        let lock = Arc::clone(locks.lock().entry(key.to_string()).or_default());
        Self {
            locks: Arc::clone(locks),
            key: key.to_string(),
            lock,
        }
    }
}

impl Drop for DesignLock {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        // The map and this share are the only holders left.
        let last = locks
            .get(&self.key)
            .is_some_and(|entry| Arc::ptr_eq(entry, &self.lock) && Arc::strong_count(entry) == 2);
        if last {
            locks.remove(&self.key);
        }
    }
}

impl std::fmt::Debug for IndexCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCache")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::error::PropsError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    const VERSION: &str = "urn:adsk.wipprod:fs.file:vf.abc?version=2";

    fn memory_config() -> CacheConfig {
        CacheConfig::new().with_max_entries(8).without_ttl()
    }

    #[test]
    fn test_design_key_roundtrip_and_safety() {
        let key = design_key(VERSION);
        assert!(!key.contains('/'));
        assert!(!key.contains('='));
        assert!(!key.contains('+'));
        assert_eq!(decode_design_key(&key).as_deref(), Some(VERSION));
        assert_eq!(decode_design_key("not base64!"), None);
    }

    #[tokio::test]
    async fn test_store_roundtrip_and_layout() {
        let dir = TempDir::new().unwrap();
        let store = DesignStore::new(dir.path());
        let key = design_key(VERSION);

        store.save_index(&key, &IndexRecord::finished("IDX1", VERSION)).await;

        assert!(dir.path().join(&key).join("index.json").is_file());
        let record = store.load_index(&key).await.unwrap();
        assert_eq!(record.index_id, "IDX1");
        assert_eq!(record.version_urn, VERSION);
    }

    #[tokio::test]
    async fn test_store_never_records_unfinished_builds() {
        let dir = TempDir::new().unwrap();
        let store = DesignStore::new(dir.path());
        let mut record = IndexRecord::finished("IDX1", VERSION);
        record.state = JobState::Failed;

        store.save_index("k", &record).await;
        assert!(store.load_index("k").await.is_none());
        assert!(!dir.path().join("k").exists());
    }

    #[tokio::test]
    async fn test_store_ignores_corrupt_file() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("k")).unwrap();
        std::fs::write(dir.path().join("k").join("index.json"), "{not json").unwrap();

        let store = DesignStore::new(dir.path());
        assert!(store.load_index("k").await.is_none());
    }

    #[tokio::test]
    async fn test_fields_record_is_tied_to_index() {
        let dir = TempDir::new().unwrap();
        let store = DesignStore::new(dir.path());
        let catalog = FieldCatalog::default();

        store.save_fields("k", "IDX1", &catalog).await;
        assert!(store.load_fields("k", "IDX1").await.is_some());
        assert!(store.load_fields("k", "IDX2").await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_store_keeps_nothing() {
        let store = DesignStore::disabled();
        store.save_index("k", &IndexRecord::finished("IDX1", VERSION)).await;
        assert!(store.load_index("k").await.is_none());
        assert!(store.transcript_path("k").is_none());
    }

    #[tokio::test]
    async fn test_get_or_build_builds_once() {
        let cache = IndexCache::in_memory(memory_config());
        let builds = AtomicUsize::new(0);

        for _ in 0..3 {
            let id = cache
                .get_or_build(VERSION, || async {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok("IDX1".to_string())
                })
                .await
                .unwrap();
            assert_eq!(id, "IDX1");
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_build_is_not_cached() {
        let cache = IndexCache::in_memory(memory_config());

        let err = cache
            .get_or_build(VERSION, || async {
                Err(PropsError::IndexBuild { errors: vec![] })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PropsError::IndexBuild { .. }));
        assert!(cache.lookup(VERSION).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_builds_are_serialized() {
        let cache = IndexCache::in_memory(memory_config());
        let builds = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let builds = Arc::clone(&builds);
                tokio::spawn(async move {
                    cache
                        .get_or_build(VERSION, || async move {
                            builds.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok("IDX1".to_string())
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "IDX1");
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lock_released_when_build_is_dropped() {
        let cache = IndexCache::in_memory(memory_config());
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();

        let task = tokio::spawn({
            let cache = cache.clone();
            async move {
                cache
                    .get_or_build(VERSION, || async move {
                        let _ = started_tx.send(());
                        std::future::pending::<PropsResult<String>>().await
                    })
                    .await
            }
        });
        started_rx.await.unwrap();
        assert_eq!(cache.lock_count(), 1);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(cache.lock_count(), 0);

        let id = cache
            .get_or_build(VERSION, || async { Ok("IDX1".to_string()) })
            .await
            .unwrap();
        assert_eq!(id, "IDX1");
        assert_eq!(cache.lock_count(), 0);
    }

    #[test]
    fn test_lock_kept_while_another_caller_waits() {
        let cache = IndexCache::in_memory(memory_config());
        let key = design_key(VERSION);

        let first = DesignLock::acquire(&cache.locks, &key);
        let second = DesignLock::acquire(&cache.locks, &key);
        drop(first);
        assert_eq!(cache.lock_count(), 1);
        drop(second);
        assert_eq!(cache.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_disk_record_survives_new_cache() {
        let dir = TempDir::new().unwrap();
        let first = IndexCache::new(memory_config(), DesignStore::new(dir.path()));
        first
            .get_or_build(VERSION, || async { Ok("IDX1".to_string()) })
            .await
            .unwrap();

        let second = IndexCache::new(memory_config(), DesignStore::new(dir.path()));
        assert_eq!(second.lookup(VERSION).await.as_deref(), Some("IDX1"));
    }
}
