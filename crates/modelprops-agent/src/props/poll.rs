//! Waiting on remote jobs.
//!
//! Index builds and queries are polled until they reach a terminal state.
//! Waits back off exponentially, stop at an optional deadline, and abort as
//! soon as the caller's cancellation token fires.

use std::future::Future;
use std::time::Duration;

use modelprops_aps::JobState;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::{PropsError, PropsResult};

/// Backoff and deadline for job polling.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the first re-check.
    pub initial_interval: Duration,
    /// Upper bound on the delay between checks.
    pub max_interval: Duration,
    /// Growth factor applied after every check.
    pub multiplier: f64,
    /// Give up after this long. `None` waits until cancelled.
    pub max_wait: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(8),
            multiplier: 2.0,
            max_wait: Some(Duration::from_secs(600)),
        }
    }
}

impl PollPolicy {
    /// Poll at a constant interval with no deadline.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
            max_wait: None,
        }
    }

    /// Set the deadline.
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// The delay following `current`.
    pub fn next_interval(&self, current: Duration) -> Duration {
        let factor = if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        };
        current.mul_f64(factor).min(self.max_interval)
    }
}

/// Run `fut` unless `cancel` fires first.
pub async fn cancellable<F, T>(cancel: &CancellationToken, fut: F) -> PropsResult<T>
where
    F: Future<Output = PropsResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PropsError::Cancelled),
        result = fut => result,
    }
}

/// Poll a job until it reaches `finished` or `failed`.
///
/// `initial` is the status returned when the job was submitted; if it is
/// already terminal no request is made. `pending` and `processing` both count
/// as in flight. Every `fetch` and every sleep races the cancellation token.
pub async fn poll_until_terminal<T, F, Fut>(
    initial: T,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut fetch: F,
    state_of: impl Fn(&T) -> JobState,
) -> PropsResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = modelprops_aps::Result<T>>,
{
    let started = Instant::now();
    let deadline = policy.max_wait.map(|wait| started + wait);
    let mut interval = policy.initial_interval;
    let mut status = initial;
    let mut attempt = 0u32;

    while !state_of(&status).is_terminal() {
        if cancel.is_cancelled() {
            return Err(PropsError::Cancelled);
        }

        let mut sleep_for = interval;
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    operation,
                    attempt,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Gave up waiting for remote job"
                );
                return Err(PropsError::Timeout {
                    operation: operation.to_string(),
                    waited: started.elapsed(),
                });
            }
            sleep_for = sleep_for.min(deadline - now);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PropsError::Cancelled),
            _ = tokio::time::sleep(sleep_for) => {}
        }

        attempt += 1;
        status = cancellable(cancel, async { fetch().await.map_err(PropsError::from) }).await?;
        tracing::debug!(
            operation,
            attempt,
            state = %state_of(&status),
            "Polled remote job"
        );
        interval = policy.next_interval(interval);
    }

    Ok(status)
}
