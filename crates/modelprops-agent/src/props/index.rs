//! Index lifecycle.

use modelprops_aps::{IndexRequest, JobState, SharedIndexService};
use tokio_util::sync::CancellationToken;

use super::cache::IndexCache;
use super::error::{PropsError, PropsResult};
use super::poll::{PollPolicy, cancellable, poll_until_terminal};

/// Builds, waits for and remembers the index of a design version.
pub struct IndexLifecycleManager {
    service: SharedIndexService,
    project_id: String,
    cache: IndexCache,
    poll: PollPolicy,
}

impl IndexLifecycleManager {
    /// Create a manager using `cache` for finished index ids.
    pub fn new(service: SharedIndexService, project_id: impl Into<String>, cache: IndexCache) -> Self {
        Self {
            service,
            project_id: project_id.into(),
            cache,
            poll: PollPolicy::default(),
        }
    }

    /// Set the polling policy.
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// The index id of `version_urn`, building the index if needed.
    ///
    /// A recorded finished build is returned without any request. Failed
    /// builds are reported with the service's error list and never recorded.
    pub async fn ensure_index(&self, version_urn: &str, cancel: &CancellationToken) -> PropsResult<String> {
        self.cache
            .get_or_build(version_urn, || self.build(version_urn, cancel))
            .await
    }

    async fn build(&self, version_urn: &str, cancel: &CancellationToken) -> PropsResult<String> {
        let request = IndexRequest::single(version_urn);
        let submitted = cancellable(cancel, async {
            self.service
                .create_index(&self.project_id, &request)
                .await
                .map_err(PropsError::from)
        })
        .await?;

        let index_id = submitted.index_id.clone();
        tracing::info!(index_id = %index_id, state = %submitted.state, "Index build submitted");

        let operation = format!("index {}", index_id);
        let status = poll_until_terminal(
            submitted,
            &self.poll,
            cancel,
            &operation,
            || self.service.get_index(&self.project_id, &index_id),
            |s| s.state,
        )
        .await?;

        match status.state {
            JobState::Finished => {
                tracing::info!(index_id = %status.index_id, "Index ready");
                Ok(status.index_id)
            }
            _ => {
                tracing::warn!(index_id = %status.index_id, errors = status.errors.len(), "Index build failed");
                Err(PropsError::IndexBuild {
                    errors: status.errors,
                })
            }
        }
    }
}

impl std::fmt::Debug for IndexLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexLifecycleManager")
            .field("project_id", &self.project_id)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}
