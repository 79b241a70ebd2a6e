//! Client error types.

use thiserror::Error;

/// Error raised by the indexing service or the transport underneath it.
///
/// Apart from [`ApsError::is_request_error`] cases, none of these can be fixed
/// by the language model choosing different tool arguments, so the agent
/// treats them as hard failures.
#[derive(Debug, Error)]
pub enum ApsError {
    /// Connection, timeout or other transport failure.
    #[error("Network error: {0}")]
    Network(String),

    /// URL construction failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A response body could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The service answered with an unexpected shape.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Service returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error code from the service, when present.
        code: String,
        /// Error message from the service.
        message: String,
    },

    /// The access token was rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Project, index or query does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApsError {
    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ApsError::Auth(_))
    }

    /// Check if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApsError::Api { status: 429, .. })
    }

    /// The service rejected what was asked for (unknown index or query, bad
    /// request body), as opposed to who asked or how it was sent.
    pub fn is_request_error(&self) -> bool {
        match self {
            ApsError::NotFound(_) => true,
            ApsError::Api { status, .. } => {
                (400..500).contains(status) && !matches!(status, 401 | 403 | 429)
            }
            _ => false,
        }
    }

    /// Transient failures worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApsError::Network(_) => true,
            ApsError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApsError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            ApsError::Network(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            ApsError::UnexpectedResponse(err.to_string())
        } else {
            ApsError::Network(err.to_string())
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ApsError>;

/// Error body returned by the service.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, alias = "detail", alias = "title")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ApsError::Network("reset".into()).is_retryable());
        assert!(
            ApsError::Api {
                status: 503,
                code: "unavailable".into(),
                message: "try later".into()
            }
            .is_retryable()
        );
        assert!(
            ApsError::Api {
                status: 429,
                code: "throttled".into(),
                message: "slow down".into()
            }
            .is_rate_limited()
        );
        assert!(
            !ApsError::Api {
                status: 400,
                code: "bad".into(),
                message: "bad request".into()
            }
            .is_retryable()
        );
        assert!(!ApsError::Auth("expired".into()).is_retryable());
        assert!(ApsError::Auth("expired".into()).is_auth_error());
    }

    #[test]
    fn test_request_errors() {
        let api = |status| ApsError::Api {
            status,
            code: "E".into(),
            message: "m".into(),
        };
        assert!(ApsError::NotFound("index IDX9".into()).is_request_error());
        assert!(api(400).is_request_error());
        assert!(!api(403).is_request_error());
        assert!(!api(429).is_request_error());
        assert!(!api(500).is_request_error());
        assert!(!ApsError::Network("reset".into()).is_request_error());
    }

    #[test]
    fn test_error_response_aliases() {
        let body: ErrorResponse =
            serde_json::from_str(r#"{"code":"E1","detail":"index missing"}"#).unwrap();
        assert_eq!(body.code.as_deref(), Some("E1"));
        assert_eq!(body.message.as_deref(), Some("index missing"));
    }
}
