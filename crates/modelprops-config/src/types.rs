//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [llm]         # chat completion backend
//! [aps]         # indexing service connection
//! [agent]       # turn loop and tool limits
//! [poll]        # job polling backoff
//! [transform]   # filter evaluator budget
//! [session]     # session cache and on-disk caches
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Environment variable consulted for the LLM API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Property categories exposed to the model by default.
pub const DEFAULT_CATEGORIES: [&str; 4] = [
    "__name__",
    "__category__",
    "Dimensions",
    "Materials and Finishes",
];

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. project-local
/// overrides) can be loaded and merged. Use the `effective_*` accessors to
/// read a section with defaults filled in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPropsConfig {
    /// Chat completion backend.
    pub llm: Option<LlmConfig>,
    /// Indexing service connection.
    pub aps: Option<ApsConfig>,
    /// Turn loop and tool limits.
    pub agent: Option<AgentSection>,
    /// Job polling.
    pub poll: Option<PollConfig>,
    /// Filter evaluator budget.
    pub transform: Option<TransformConfig>,
    /// Session cache and on-disk caches.
    pub session: Option<SessionConfig>,
}

impl ModelPropsConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole, not merged field by field.
    pub fn merge(&mut self, other: ModelPropsConfig) {
        if other.llm.is_some() {
            self.llm = other.llm;
        }
        if other.aps.is_some() {
            self.aps = other.aps;
        }
        if other.agent.is_some() {
            self.agent = other.agent;
        }
        if other.poll.is_some() {
            self.poll = other.poll;
        }
        if other.transform.is_some() {
            self.transform = other.transform;
        }
        if other.session.is_some() {
            self.session = other.session;
        }
    }

    pub fn effective_llm(&self) -> LlmConfig {
        self.llm.clone().unwrap_or_default()
    }

    pub fn effective_aps(&self) -> ApsConfig {
        self.aps.clone().unwrap_or_default()
    }

    pub fn effective_agent(&self) -> AgentSection {
        self.agent.clone().unwrap_or_default()
    }

    pub fn effective_poll(&self) -> PollConfig {
        self.poll.clone().unwrap_or_default()
    }

    pub fn effective_transform(&self) -> TransformConfig {
        self.transform.clone().unwrap_or_default()
    }

    pub fn effective_session(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }

    /// Check values that would make the agent misbehave.
    pub fn validate(&self) -> Result<()> {
        let agent = self.effective_agent();
        if agent.max_iterations == 0 {
            return Err(invalid("agent.max_iterations", "must be at least 1"));
        }
        if agent.max_results == 0 {
            return Err(invalid("agent.max_results", "must be at least 1"));
        }
        if agent.categories.is_empty() {
            return Err(invalid("agent.categories", "must name at least one category"));
        }

        let poll = self.effective_poll();
        if poll.initial_interval_ms == 0 {
            return Err(invalid("poll.initial_interval_ms", "must be positive"));
        }
        if poll.max_interval_ms < poll.initial_interval_ms {
            return Err(invalid(
                "poll.max_interval_ms",
                "must not be below initial_interval_ms",
            ));
        }
        if !(poll.multiplier >= 1.0 && poll.multiplier.is_finite()) {
            return Err(invalid("poll.multiplier", "must be a finite number >= 1.0"));
        }

        let transform = self.effective_transform();
        if transform.max_steps == 0 || transform.max_outputs == 0 {
            return Err(invalid("transform", "budgets must be positive"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM
// ─────────────────────────────────────────────────────────────────────────────

/// Chat completion backend configuration.
///
/// ```toml
/// [llm]
/// model = "gpt-4o"
/// base_url = "https://api.openai.com/v1"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API base URL (for proxies or compatible endpoints).
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// API key (prefer the environment variable; warns if set here).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Completion token limit per request.
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries for rate limits and transient failures.
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
            max_tokens: 4096,
            temperature: None,
            timeout_secs: 120,
            max_retries: 3,
        }
    }
}

impl LlmConfig {
    /// Returns true if an API key is stored directly in the config file.
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Resolve the API key: environment variable first, then config file.
    pub fn resolve_api_key(&self) -> Result<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    /// Resolve the API key with a custom environment lookup.
    pub fn resolve_api_key_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<String> {
        if let Some(value) = env(API_KEY_ENV).filter(|v| !v.is_empty()) {
            return Ok(value);
        }
        self.api_key
            .clone()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::ApiKeyNotFound {
                env_var: API_KEY_ENV.to_string(),
            })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Indexing service
// ─────────────────────────────────────────────────────────────────────────────

/// Indexing service connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApsConfig {
    /// Scheme and host of the service.
    pub host: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries for transient failures.
    pub max_retries: u32,
}

impl Default for ApsConfig {
    fn default() -> Self {
        Self {
            host: "https://developer.api.autodesk.com".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl ApsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// Turn loop and tool limits.
///
/// ```toml
/// [agent]
/// max_iterations = 12
/// max_results = 256
/// categories = ["__name__", "__category__", "Dimensions", "Materials and Finishes"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Model rounds per user turn before falling back to a clarification.
    pub max_iterations: usize,
    /// Largest query result accepted; larger results are rejected.
    pub max_results: usize,
    /// Property categories included in the field catalog.
    pub categories: Vec<String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: 12,
            max_results: 256,
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Polling
// ─────────────────────────────────────────────────────────────────────────────

/// Backoff settings for polling index builds and queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// First wait between polls, in milliseconds.
    pub initial_interval_ms: u64,
    /// Upper bound on the wait between polls, in milliseconds.
    pub max_interval_ms: u64,
    /// Growth factor applied after each poll.
    pub multiplier: f64,
    /// Give up after this many seconds; unset waits indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_wait_secs: Option<u64>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1000,
            max_interval_ms: 8000,
            multiplier: 2.0,
            max_wait_secs: Some(600),
        }
    }
}

impl PollConfig {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs.map(Duration::from_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transform
// ─────────────────────────────────────────────────────────────────────────────

/// Budget for the JSON filter evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Evaluation steps allowed per filter run.
    pub max_steps: u64,
    /// Output values allowed per filter run.
    pub max_outputs: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            max_steps: 100_000,
            max_outputs: 10_000,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Session cache and on-disk cache configuration.
///
/// ```toml
/// [session]
/// max_sessions = 64
/// idle_ttl_secs = 3600
/// cache_dir = "/var/cache/modelprops"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Live design sessions kept before LRU eviction.
    pub max_sessions: usize,
    /// Idle seconds before a session is dropped.
    pub idle_ttl_secs: u64,
    /// Index identifiers kept in memory.
    pub max_cached_indexes: usize,
    /// Root of the per-design cache directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Append conversation transcripts to the design cache directory.
    pub transcripts: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 64,
            idle_ttl_secs: 3600,
            max_cached_indexes: 1024,
            cache_dir: None,
            transcripts: true,
        }
    }
}

impl SessionConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    /// Configured cache directory, or `cache` under the user config dir.
    pub fn resolved_cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(|| crate::config_dir().map(|d| d.join("cache")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ModelPropsConfig::from_toml("").unwrap();
        assert!(config.llm.is_none());

        let agent = config.effective_agent();
        assert_eq!(agent.max_iterations, 12);
        assert_eq!(agent.max_results, 256);
        assert_eq!(agent.categories.len(), 4);
        assert_eq!(config.effective_llm().model, "gpt-4o");
        assert_eq!(config.effective_poll().max_wait(), Some(Duration::from_secs(600)));
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let config = ModelPropsConfig::from_toml(
            r#"
[poll]
initial_interval_ms = 250

[session]
cache_dir = "/tmp/mp-cache"
transcripts = false
"#,
        )
        .unwrap();

        let poll = config.effective_poll();
        assert_eq!(poll.initial_interval(), Duration::from_millis(250));
        assert_eq!(poll.max_interval_ms, 8000);

        let session = config.effective_session();
        assert!(!session.transcripts);
        assert_eq!(session.max_sessions, 64);
        assert_eq!(
            session.resolved_cache_dir(),
            Some(PathBuf::from("/tmp/mp-cache"))
        );
    }

    #[test]
    fn test_merge_replaces_sections() {
        let mut base = ModelPropsConfig::from_toml(
            r#"
[llm]
model = "gpt-4o"

[agent]
max_results = 100
"#,
        )
        .unwrap();
        let overlay = ModelPropsConfig::from_toml(
            r#"
[llm]
model = "gpt-4o-mini"
"#,
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(base.effective_llm().model, "gpt-4o-mini");
        assert_eq!(base.effective_agent().max_results, 100);
    }

    #[test]
    fn test_toml_roundtrip_keeps_values() {
        let mut config = ModelPropsConfig::new();
        config.agent = Some(AgentSection {
            max_iterations: 4,
            ..Default::default()
        });
        let text = config.to_toml().unwrap();
        assert!(text.contains("max_iterations = 4"));
        assert_eq!(ModelPropsConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ModelPropsConfig::from_toml("[poll]\nmultiplier = 0.5\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("poll.multiplier"));

        let config = ModelPropsConfig::from_toml("[agent]\nmax_results = 0\n").unwrap();
        assert!(config.validate().is_err());

        let config = ModelPropsConfig::from_toml(
            "[poll]\ninitial_interval_ms = 5000\nmax_interval_ms = 100\n",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_resolution_order() {
        let llm = LlmConfig {
            api_key: Some("from-file".to_string()),
            ..Default::default()
        };
        assert!(llm.has_plaintext_api_key());

        let from_env = llm
            .resolve_api_key_with(|name| (name == API_KEY_ENV).then(|| "from-env".to_string()))
            .unwrap();
        assert_eq!(from_env, "from-env");

        let from_file = llm.resolve_api_key_with(|_| Some(String::new())).unwrap();
        assert_eq!(from_file, "from-file");

        let missing = LlmConfig::default().resolve_api_key_with(|_| None);
        assert!(matches!(missing, Err(ConfigError::ApiKeyNotFound { .. })));
    }
}
