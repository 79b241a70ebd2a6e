//! The seam between the agent and a chat model, plus retry policy and a
//! scripted stand-in for tests.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::types::{CompletionRequest, CompletionResponse};

/// Longest pause honoured from a `Retry-After` header.
const MAX_SERVER_PAUSE: Duration = Duration::from_secs(30);

/// Run `attempt` until it succeeds, fails permanently, or `max_retries`
/// extra attempts have been spent.
///
/// The pause doubles after each failure unless the provider asked for a
/// specific delay, which wins (capped at thirty seconds).
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut pause = initial_backoff;
    for retry in 1..=max_retries {
        let err = match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => err,
            Err(err) => return Err(err),
        };
        let wait = err
            .retry_after()
            .map(|d| d.min(MAX_SERVER_PAUSE))
            .unwrap_or(pause);
        tracing::warn!(
            backend = backend_name,
            retry,
            max_retries,
            wait_ms = wait.as_millis() as u64,
            error = %err,
            "Completion failed, backing off"
        );
        tokio::time::sleep(wait).await;
        pause = pause.saturating_mul(2);
    }
    attempt().await
}

/// A chat model that understands tool calling.
///
/// Tool definitions go out in `request.tools`; calls come back as
/// `tool_use` blocks in the response content.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Label used in logs.
    fn name(&self) -> &str;
}

pub type SharedBackend = Arc<dyn LlmBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(any(test, feature = "testing"))]
pub use mock::{MockBackend, MockResponse};

#[cfg(any(test, feature = "testing"))]
mod mock {
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::LlmBackend;
    use crate::error::{LlmError, Result};
    use crate::types::{CompletionRequest, CompletionResponse, ContentBlock, StopReason, Usage};

    /// One scripted reply of a [`MockBackend`].
    #[derive(Debug)]
    pub enum MockResponse {
        /// Return this completion.
        Success(CompletionResponse),
        /// Fail the call as an HTTP 500 carrying this message.
        Error(String),
        /// Return this completion after a pause.
        Delayed(Duration, CompletionResponse),
    }

    /// A mock backend for testing purposes.
    ///
    /// Returns pre-configured responses in order and records every request, so
    /// tests can drive the turn loop deterministically and inspect what the
    /// model was shown.
    #[derive(Debug)]
    pub struct MockBackend {
        name: String,
        responses: Mutex<VecDeque<MockResponse>>,
        request_log: Mutex<Vec<CompletionRequest>>,
    }

    impl MockBackend {
        /// Create a new mock backend with the given responses.
        ///
        /// If more requests are made than responses available, an error is
        /// returned.
        pub fn new(responses: Vec<CompletionResponse>) -> Self {
            Self::with_results(responses.into_iter().map(MockResponse::Success).collect())
        }

        /// Create a mock backend that can also fail on chosen calls.
        pub fn with_results(results: Vec<MockResponse>) -> Self {
            Self {
                name: "mock".to_string(),
                responses: Mutex::new(results.into()),
                request_log: Mutex::new(Vec::new()),
            }
        }

        /// Create a mock backend with a single text response.
        pub fn with_text(text: impl Into<String>) -> Self {
            Self::new(vec![CompletionResponse::new(
                "mock_msg_1",
                "mock-model",
                vec![ContentBlock::text(text)],
                StopReason::EndTurn,
                Usage::new(10, 20),
            )])
        }

        /// Get all requests that were made to this backend.
        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.request_log.lock().clone()
        }

        /// Get the number of requests made.
        pub fn request_count(&self) -> usize {
            self.request_log.lock().len()
        }
    }

    #[async_trait]
    impl LlmBackend for MockBackend {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            self.request_log.lock().push(request);

            let next = self.responses.lock().pop_front();
            match next {
                Some(MockResponse::Success(response)) => Ok(response),
                Some(MockResponse::Delayed(delay, response)) => {
                    tokio::time::sleep(delay).await;
                    Ok(response)
                }
                Some(MockResponse::Error(message)) => Err(LlmError::Api {
                    status: 500,
                    message,
                }),
                None => Err(LlmError::Config(
                    "mock backend has no scripted replies left".to_string(),
                )),
            }
        }

        fn name(&self) -> &str {
            &self.name
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
