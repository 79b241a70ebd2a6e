//! CLI command handlers.

pub mod ask;
pub mod chat;
pub mod inspect;
pub mod repl;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use modelprops_agent::{
    AgentConfig, CancellationToken, DesignRef, PollPolicy, SessionManager, SessionSettings,
    TransformLimits,
};
use modelprops_aps::{AccessToken, ClientConfig, HttpConnector};
use modelprops_config::ModelPropsConfig;
use modelprops_llm::{OpenAiBackend, OpenAiConfig, SharedBackend};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Effective configuration.
    pub config: ModelPropsConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load configuration from `path`, or discover it when no path is given.
    pub fn load(path: Option<&Path>, json_output: bool, verbose: bool) -> Result<Self> {
        let config = match path {
            Some(path) => modelprops_config::load_config_file(path)?,
            None => {
                let loaded = modelprops_config::load_config(None)?;
                for warning in &loaded.warnings {
                    tracing::warn!("{}", warning);
                }
                for source in loaded.loaded_from() {
                    tracing::debug!(path = %source.display(), "Loaded config");
                }
                loaded.config
            }
        };
        config.validate()?;

        Ok(Self {
            config,
            json_output,
            verbose,
        })
    }

    /// Session settings derived from the configuration.
    pub fn settings(&self) -> SessionSettings {
        settings_from_config(&self.config)
    }

    /// Connector to the indexing service.
    pub fn connector(&self) -> Result<HttpConnector> {
        let aps = self.config.effective_aps();
        let defaults = ClientConfig::default();
        let backoff = defaults.retry_backoff;
        let config = defaults
            .with_host(aps.host.clone())
            .with_timeout(aps.timeout())
            .with_retries(aps.max_retries, backoff);
        Ok(HttpConnector::new(config)?)
    }

    /// Chat completion backend.
    pub fn backend(&self) -> Result<SharedBackend> {
        let llm = self.config.effective_llm();
        let api_key = llm.resolve_api_key()?;
        let config = OpenAiConfig::openai(api_key)
            .with_base_url(&llm.base_url)
            .with_model(&llm.model)
            .with_timeout(llm.timeout())
            .with_max_retries(llm.max_retries);
        Ok(Arc::new(OpenAiBackend::new(config)?))
    }

    /// Session manager wired to the live services.
    pub fn session_manager(&self) -> Result<SessionManager> {
        let connector = Arc::new(self.connector()?);
        let backend = self.backend()?;
        Ok(SessionManager::new(self.settings(), connector, backend))
    }
}

/// Map configuration sections onto session settings.
pub fn settings_from_config(config: &ModelPropsConfig) -> SessionSettings {
    let llm = config.effective_llm();
    let agent = config.effective_agent();
    let poll = config.effective_poll();
    let transform = config.effective_transform();
    let session = config.effective_session();

    let mut agent_config = AgentConfig::new(&llm.model)
        .with_max_tokens(llm.max_tokens)
        .with_max_iterations(u32::try_from(agent.max_iterations).unwrap_or(u32::MAX));
    if let Some(temperature) = llm.temperature {
        agent_config = agent_config.with_temperature(temperature);
    }

    SessionSettings {
        agent: agent_config,
        max_results: agent.max_results,
        categories: agent.categories,
        poll: PollPolicy {
            initial_interval: poll.initial_interval(),
            max_interval: poll.max_interval(),
            multiplier: poll.multiplier,
            max_wait: poll.max_wait(),
        },
        transform: TransformLimits::default()
            .with_max_steps(transform.max_steps)
            .with_max_outputs(transform.max_outputs),
        max_sessions: session.max_sessions,
        idle_ttl: Some(session.idle_ttl()),
        max_cached_indexes: session.max_cached_indexes,
        cache_dir: session.resolved_cache_dir(),
        transcripts: session.transcripts,
        ..SessionSettings::default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared Arguments
// ─────────────────────────────────────────────────────────────────────────────

/// Which design to work with, and on whose behalf.
#[derive(Args, Debug, Clone)]
pub struct DesignArgs {
    /// Project containing the design (e.g. b.1234abcd-...)
    #[arg(short, long, env = "MODELPROPS_PROJECT")]
    pub project: String,

    /// Version URN of the design
    #[arg(short, long, env = "MODELPROPS_DESIGN")]
    pub design: String,

    /// Access token for the indexing service
    #[arg(long, env = "APS_ACCESS_TOKEN", hide_env_values = true)]
    pub token: String,
}

impl DesignArgs {
    pub fn design_ref(&self) -> DesignRef {
        DesignRef::new(&self.project, &self.design)
    }

    pub fn access_token(&self) -> Result<AccessToken> {
        let token = self.token.trim();
        if token.is_empty() {
            anyhow::bail!("access token is empty");
        }
        Ok(AccessToken::new(token))
    }
}

/// A token cancelled on the first Ctrl+C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted; cancelling");
            trigger.cancel();
        }
    });
    cancel
}
