//! Design sessions and their manager.
//!
//! A [`DesignSession`] is one conversation about one design version on behalf
//! of one credential. The [`SessionManager`] hands out sessions, reusing a
//! live one for the same project, design and credential, and evicts idle or
//! least recently used sessions once the configured bounds are reached.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use modelprops_aps::{AccessToken, ServiceConnector};
use modelprops_llm::SharedBackend;
use modelprops_session::{CacheConfig, SessionCache};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::agent::Agent;
use crate::error::Result;
use crate::journal::Journal;
use crate::prompt::SystemPromptBuilder;
use crate::props::{
    DEFAULT_CATEGORIES, DEFAULT_MAX_RESULTS, DesignStore, FieldCatalog, FieldCatalogBuilder,
    IndexCache, IndexLifecycleManager, PollPolicy, QueryExecutor, design_key,
};
use crate::tool::ToolRegistry;
use crate::tools::register_design_tools;
use crate::transform::TransformLimits;
use crate::types::{AgentConfig, AgentResponse, Session, SessionId};

// ─────────────────────────────────────────────────────────────────────────────
// Design Reference
// ─────────────────────────────────────────────────────────────────────────────

/// A design version within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DesignRef {
    /// Project the design lives in.
    pub project_id: String,
    /// Version URN of the design.
    pub version_urn: String,
}

impl DesignRef {
    pub fn new(project_id: impl Into<String>, version_urn: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            version_urn: version_urn.into(),
        }
    }

    /// Filesystem-safe key of the design version.
    pub fn key(&self) -> String {
        design_key(&self.version_urn)
    }
}

impl std::fmt::Display for DesignRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.project_id, self.version_urn)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a [`SessionManager`] needs to build sessions.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Model, token and round budget settings for every agent.
    pub agent: AgentConfig,
    /// Largest result set `run_query` accepts.
    pub max_results: usize,
    /// Field categories `list_fields` keeps.
    pub categories: Vec<String>,
    /// Polling of index builds and queries.
    pub poll: PollPolicy,
    /// Budget of `transform_json`.
    pub transform: TransformLimits,
    /// Live sessions kept before the least recently used is evicted.
    pub max_sessions: usize,
    /// Idle time after which a session expires. `None` keeps sessions until evicted.
    pub idle_ttl: Option<Duration>,
    /// How often [`SessionManager::spawn_cleanup_tasks`] sweeps expired entries.
    pub cleanup_interval: Duration,
    /// Index ids kept in memory.
    pub max_cached_indexes: usize,
    /// Root of the on-disk design cache. `None` keeps everything in memory.
    pub cache_dir: Option<PathBuf>,
    /// Whether to write per-design transcripts under `cache_dir`.
    pub transcripts: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            max_results: DEFAULT_MAX_RESULTS,
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            poll: PollPolicy::default(),
            transform: TransformLimits::default(),
            max_sessions: 64,
            idle_ttl: Some(Duration::from_secs(3600)),
            cleanup_interval: Duration::from_secs(60),
            max_cached_indexes: 1024,
            cache_dir: None,
            transcripts: true,
        }
    }
}

impl SessionSettings {
    pub fn with_agent_config(mut self, agent: AgentConfig) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    pub fn with_idle_ttl(mut self, ttl: Option<Duration>, cleanup_interval: Duration) -> Self {
        self.idle_ttl = ttl;
        self.cleanup_interval = cleanup_interval;
        self
    }

    fn cache_config(&self, max_entries: usize) -> CacheConfig {
        let config = CacheConfig::new()
            .with_max_entries(max_entries)
            .with_cleanup_interval(self.cleanup_interval);
        match self.idle_ttl {
            Some(ttl) => config.with_ttl(ttl),
            None => config.without_ttl(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Design Session
// ─────────────────────────────────────────────────────────────────────────────

/// One conversation about one design.
///
/// Turns are serialized: a prompt submitted while another is running waits
/// for it to finish.
pub struct DesignSession {
    design: DesignRef,
    agent: Agent,
    state: Mutex<Session>,
}

impl DesignSession {
    /// Wrap an agent configured for `design`.
    pub fn new(design: DesignRef, agent: Agent) -> Self {
        Self {
            design,
            agent,
            state: Mutex::new(Session::new()),
        }
    }

    pub fn design(&self) -> &DesignRef {
        &self.design
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Id of the conversation thread.
    pub async fn id(&self) -> SessionId {
        self.state.lock().await.id
    }

    /// Number of turns taken so far.
    pub async fn turn_count(&self) -> usize {
        self.state.lock().await.turn_count()
    }

    /// Run one turn and return the model's texts in order.
    pub async fn submit(&self, prompt: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
        Ok(self.prompt(prompt, cancel).await?.responses)
    }

    /// Run one turn and return the full response.
    pub async fn prompt(&self, prompt: &str, cancel: &CancellationToken) -> Result<AgentResponse> {
        let mut session = self.state.lock().await;
        self.agent.turn(&mut session, prompt, cancel).await
    }
}

impl std::fmt::Debug for DesignSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DesignSession")
            .field("design", &self.design)
            .field("agent", &self.agent)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Manager
// ─────────────────────────────────────────────────────────────────────────────

/// Creates and reuses design sessions.
///
/// Index ids and field catalogs are shared by every session; a design's index
/// is built at most once per process (and once per cache directory when one
/// is configured).
pub struct SessionManager {
    settings: SessionSettings,
    connector: Arc<dyn ServiceConnector>,
    backend: SharedBackend,
    store: DesignStore,
    sessions: SessionCache<Arc<DesignSession>>,
    indexes: IndexCache,
    fields: SessionCache<Arc<FieldCatalog>>,
    create_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(
        settings: SessionSettings,
        connector: Arc<dyn ServiceConnector>,
        backend: SharedBackend,
    ) -> Self {
        let store = match &settings.cache_dir {
            Some(dir) => DesignStore::new(dir),
            None => DesignStore::disabled(),
        };
        let sessions = SessionCache::new(settings.cache_config(settings.max_sessions));
        let indexes = IndexCache::new(
            settings.cache_config(settings.max_cached_indexes),
            store.clone(),
        );
        let fields = SessionCache::new(settings.cache_config(settings.max_cached_indexes));

        Self {
            settings,
            connector,
            backend,
            store,
            sessions,
            indexes,
            fields,
            create_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// The shared index cache.
    pub fn indexes(&self) -> &IndexCache {
        &self.indexes
    }

    /// Start sweeping expired sessions and cache entries in the background.
    /// The sweeps stop once the manager is dropped.
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn_cleanup_tasks(&self) {
        self.sessions.spawn_cleanup_task();
        self.fields.spawn_cleanup_task();
        self.indexes.spawn_cleanup_task();
    }

    /// The live session for `design` and `token`, creating one if needed.
    pub async fn session(&self, design: &DesignRef, token: &AccessToken) -> Result<Arc<DesignSession>> {
        let key = session_key(design, token);
        if let Some(session) = self.sessions.get(&key).await {
            return Ok(session);
        }

        let _guard = self.create_lock.lock().await;
        if let Some(session) = self.sessions.get(&key).await {
            return Ok(session);
        }

        let session = Arc::new(self.build_session(design, token)?);
        if let Some((_, evicted)) = self.sessions.insert(&key, Arc::clone(&session)).await {
            tracing::debug!(design = %evicted.design(), "Session evicted");
        }
        tracing::info!(design = %design, "Session created");
        Ok(session)
    }

    /// Submit a prompt to the session for `design` and `token`.
    pub async fn submit(
        &self,
        design: &DesignRef,
        token: &AccessToken,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        self.session(design, token).await?.submit(prompt, cancel).await
    }

    /// Drop the session for `design` and `token`, if any.
    pub async fn close(&self, design: &DesignRef, token: &AccessToken) -> bool {
        self.sessions.remove(&session_key(design, token)).await.is_some()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.is_empty().await
    }

    fn build_session(&self, design: &DesignRef, token: &AccessToken) -> Result<DesignSession> {
        let service = self.connector.connect(token)?;
        let key = design.key();
        let settings = &self.settings;

        let index = IndexLifecycleManager::new(service.clone(), &design.project_id, self.indexes.clone())
            .with_poll_policy(settings.poll.clone());
        let fields = FieldCatalogBuilder::new(
            service.clone(),
            &design.project_id,
            self.fields.clone(),
            self.store.clone(),
            &key,
        )
        .with_categories(settings.categories.clone());
        let query = QueryExecutor::new(service, &design.project_id)
            .with_poll_policy(settings.poll.clone())
            .with_max_results(settings.max_results);

        let mut tools = ToolRegistry::new();
        register_design_tools(
            &mut tools,
            Arc::new(index),
            Arc::new(fields),
            Arc::new(query),
            settings.transform,
        );

        let journal = match self.store.transcript_path(&key) {
            Some(path) if settings.transcripts => Journal::spawn(path).0,
            _ => Journal::disabled(),
        };

        let agent = Agent::builder()
            .with_shared_backend(self.backend.clone())
            .with_config(settings.agent.clone())
            .with_tools(tools)
            .with_prompt_builder(SystemPromptBuilder::new().with_design(&design.version_urn))
            .with_journal(journal)
            .build()?;

        Ok(DesignSession::new(design.clone(), agent))
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("settings", &self.settings)
            .field("store", &self.store)
            .finish()
    }
}

/// Cache key of a session: project, design and a fingerprint of the
/// credential, so the raw token is never kept as a key.
fn session_key(design: &DesignRef, token: &AccessToken) -> String {
    let mut hasher = DefaultHasher::new();
    token.secret().hash(&mut hasher);
    format!(
        "{}:{}:{:016x}",
        design.project_id,
        design.key(),
        hasher.finish()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelprops_aps::{MockConnector, MockIndexService};
    use modelprops_llm::{
        CompletionResponse, ContentBlock, MockBackend, MockResponse, StopReason, Usage,
    };

    fn text(t: &str) -> CompletionResponse {
        CompletionResponse::new("m", "mock", vec![ContentBlock::text(t)], StopReason::EndTurn, Usage::new(1, 1))
    }

    fn new_manager(settings: SessionSettings, replies: Vec<CompletionResponse>) -> (SessionManager, Arc<MockConnector>) {
        let connector = Arc::new(MockConnector::new(Arc::new(MockIndexService::new())));
        let manager = SessionManager::new(settings, connector.clone(), Arc::new(MockBackend::new(replies)));
        (manager, connector)
    }

    #[test]
    fn test_session_key_hides_token() {
        let design = DesignRef::new("b.p1", "urn:v1");
        let key = session_key(&design, &AccessToken::new("secret-token"));
        assert!(!key.contains("secret-token"));
        assert_ne!(key, session_key(&design, &AccessToken::new("other-token")));
        assert_eq!(key, session_key(&design, &AccessToken::new("secret-token")));
    }

    #[tokio::test]
    async fn test_session_reused_per_design_and_credential() {
        let (manager, connector) = new_manager(SessionSettings::default(), vec![]);
        let d1 = DesignRef::new("p", "urn:v1");
        let d2 = DesignRef::new("p", "urn:v2");
        let alice = AccessToken::new("alice");

        let a = manager.session(&d1, &alice).await.unwrap();
        let b = manager.session(&d1, &alice).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = manager.session(&d2, &alice).await.unwrap();
        let d = manager.session(&d1, &AccessToken::new("bob")).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert!(!Arc::ptr_eq(&a, &d));
        assert_eq!(manager.len().await, 3);
        assert_eq!(connector.tokens().len(), 3);
    }

    #[tokio::test]
    async fn test_least_recently_used_session_evicted() {
        let (manager, _) = new_manager(SessionSettings::default().with_max_sessions(2), vec![]);
        let token = AccessToken::new("t");
        let first = manager.session(&DesignRef::new("p", "urn:v1"), &token).await.unwrap();
        manager.session(&DesignRef::new("p", "urn:v2"), &token).await.unwrap();
        manager.session(&DesignRef::new("p", "urn:v3"), &token).await.unwrap();

        assert_eq!(manager.len().await, 2);
        let again = manager.session(&DesignRef::new("p", "urn:v1"), &token).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &again));
    }

    #[tokio::test]
    async fn test_prompt_names_design() {
        let (manager, _) = new_manager(SessionSettings::default(), vec![]);
        let session = manager
            .session(&DesignRef::new("p", "urn:adsk:v7"), &AccessToken::new("t"))
            .await
            .unwrap();

        let prompt = session.agent().config().system_prompt.clone().unwrap();
        assert!(prompt.contains("you are working with design ID \"urn:adsk:v7\""));
        assert_eq!(
            session.agent().tools().names(),
            vec!["build_index", "list_fields", "run_query", "transform_json"]
        );
    }

    #[tokio::test]
    async fn test_submit_returns_texts() {
        let (manager, _) = new_manager(SessionSettings::default(), vec![text("Hello"), text("Again")]);
        let design = DesignRef::new("p", "urn:v1");
        let token = AccessToken::new("t");
        let cancel = CancellationToken::new();

        assert_eq!(manager.submit(&design, &token, "hi", &cancel).await.unwrap(), vec!["Hello"]);
        assert_eq!(manager.submit(&design, &token, "hi", &cancel).await.unwrap(), vec!["Again"]);
        assert_eq!(manager.session(&design, &token).await.unwrap().turn_count().await, 2);
    }

    #[tokio::test]
    async fn test_cleanup_tasks_sweep_idle_sessions() {
        let settings = SessionSettings::default()
            .with_idle_ttl(Some(Duration::from_millis(30)), Duration::from_millis(10));
        let (manager, _) = new_manager(settings, vec![]);
        manager.spawn_cleanup_tasks();
        manager
            .session(&DesignRef::new("p", "urn:v1"), &AccessToken::new("t"))
            .await
            .unwrap();
        assert_eq!(manager.len().await, 1);

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_turns_are_serialized() {
        let backend = Arc::new(MockBackend::with_results(vec![
            MockResponse::Delayed(Duration::from_millis(50), text("first")),
            MockResponse::Success(text("second")),
        ]));
        let connector = Arc::new(MockConnector::new(Arc::new(MockIndexService::new())));
        let manager = SessionManager::new(SessionSettings::default(), connector, backend.clone());
        let session = manager
            .session(&DesignRef::new("p", "urn:v1"), &AccessToken::new("t"))
            .await
            .unwrap();

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.submit("one", &CancellationToken::new()).await }
        });
        while backend.request_count() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let second = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.submit("two", &CancellationToken::new()).await }
        });

        assert_eq!(first.await.unwrap().unwrap(), vec!["first"]);
        assert_eq!(second.await.unwrap().unwrap(), vec!["second"]);
        assert_eq!(session.turn_count().await, 2);

        // The second turn saw the whole first exchange.
        let shown: Vec<String> = backend.requests()[1]
            .messages
            .iter()
            .map(|m| m.content.to_text())
            .collect();
        assert_eq!(shown, vec!["one", "first", "two"]);
    }

    #[tokio::test]
    async fn test_close_session() {
        let (manager, _) = new_manager(SessionSettings::default(), vec![]);
        let design = DesignRef::new("p", "urn:v1");
        let token = AccessToken::new("t");
        manager.session(&design, &token).await.unwrap();

        assert!(manager.close(&design, &token).await);
        assert!(manager.is_empty().await);
        assert!(!manager.close(&design, &token).await);
    }
}
