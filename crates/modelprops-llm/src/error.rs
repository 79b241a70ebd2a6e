//! Failures talking to the model provider.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

/// Why a completion could not be produced.
///
/// Only [`LlmError::Network`], [`LlmError::RateLimit`] and 5xx
/// [`LlmError::Api`] replies are worth another attempt.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider answered with a non-success status.
    #[error("model provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// The request never got an answer.
    #[error("model provider unreachable: {0}")]
    Network(String),

    /// HTTP 429. `retry_after` comes from the `Retry-After` header when sent.
    #[error("model provider is throttling requests: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    /// The API key was missing, wrong or lacked access to the model.
    #[error("model provider rejected the credentials: {0}")]
    Auth(String),

    #[error("model backend misconfigured: {0}")]
    Config(String),

    /// The provider answered 2xx with a body we could not read.
    #[error("unreadable completion: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimit { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Server-requested pause before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::InvalidResponse(err.to_string());
        }
        let what = if err.is_timeout() {
            "timed out"
        } else if err.is_connect() {
            "connect failed"
        } else {
            "transport"
        };
        Self::Network(format!("{what}: {err}"))
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> LlmError {
        LlmError::Api {
            status,
            message: "x".into(),
        }
    }

    #[test]
    fn server_side_failures_are_retried() {
        assert!(api(500).is_retryable());
        assert!(api(503).is_retryable());
        assert!(!api(400).is_retryable());
        assert!(LlmError::Network("reset".into()).is_retryable());
        assert!(!LlmError::Auth("bad key".into()).is_retryable());
        assert!(!LlmError::InvalidResponse("eof".into()).is_retryable());
    }

    #[test]
    fn throttling_carries_its_pause() {
        let err = LlmError::RateLimit {
            message: "slow down".into(),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
        assert_eq!(api(502).retry_after(), None);
    }

    #[test]
    fn display_names_the_status() {
        assert_eq!(
            api(418).to_string(),
            "model provider returned HTTP 418: x"
        );
    }
}
