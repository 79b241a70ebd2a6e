//! Config loading failures.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot render config as TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A setting is outside what the session layer accepts.
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },

    #[error("no model API key: export {env_var} or set api_key under [llm]")]
    ApiKeyNotFound { env_var: String },
}
