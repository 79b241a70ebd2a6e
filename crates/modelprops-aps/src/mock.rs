//! Scripted in-memory [`IndexService`] for tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{ApsError, Result};
use crate::service::{IndexService, ServiceConnector, SharedIndexService};
use crate::types::{
    AccessToken, FieldDescriptor, IndexRequest, IndexStatus, JobState, QueryStatus, StructuredQuery,
};

/// Number of calls made to each service operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create_index: usize,
    pub get_index: usize,
    pub list_fields: usize,
    pub create_query: usize,
    pub get_query: usize,
    pub get_query_results: usize,
}

impl CallCounts {
    /// Calls across every operation.
    pub fn total(&self) -> usize {
        self.create_index
            + self.get_index
            + self.list_fields
            + self.create_query
            + self.get_query
            + self.get_query_results
    }
}

/// Pops from the front, but keeps returning the last state once the script
/// runs out.
#[derive(Debug)]
struct StateScript(VecDeque<JobState>);

impl StateScript {
    fn new(states: Vec<JobState>) -> Self {
        Self(states.into())
    }

    fn next(&mut self) -> JobState {
        if self.0.len() > 1 {
            self.0.pop_front().unwrap_or(JobState::Finished)
        } else {
            self.0.front().copied().unwrap_or(JobState::Finished)
        }
    }
}

#[derive(Debug)]
struct MockState {
    index_states: StateScript,
    index_errors: Vec<Value>,
    query_states: StateScript,
    query_errors: Vec<Value>,
    fields: Vec<FieldDescriptor>,
    rows: Vec<Value>,
    transport_failure: Option<String>,
    calls: CallCounts,
    queries: Vec<StructuredQuery>,
    next_query: usize,
}

/// A scripted indexing service.
///
/// Every index build and query finishes immediately unless a state script is
/// given. Scripts are consumed one state per call; the last state sticks.
pub struct MockIndexService {
    index_id: String,
    state: Mutex<MockState>,
}

impl Default for MockIndexService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIndexService {
    /// Create a service whose jobs finish immediately with no fields or rows.
    pub fn new() -> Self {
        Self {
            index_id: "IDX-TEST".to_string(),
            state: Mutex::new(MockState {
                index_states: StateScript::new(vec![JobState::Finished]),
                index_errors: Vec::new(),
                query_states: StateScript::new(vec![JobState::Finished]),
                query_errors: Vec::new(),
                fields: Vec::new(),
                rows: Vec::new(),
                transport_failure: None,
                calls: CallCounts::default(),
                queries: Vec::new(),
                next_query: 0,
            }),
        }
    }

    /// Use a specific index identifier.
    pub fn with_index_id(mut self, index_id: impl Into<String>) -> Self {
        self.index_id = index_id.into();
        self
    }

    /// Script the states reported for the index build.
    pub fn with_index_states(self, states: Vec<JobState>) -> Self {
        self.state.lock().index_states = StateScript::new(states);
        self
    }

    /// Errors attached to a failed index build.
    pub fn with_index_errors(self, errors: Vec<Value>) -> Self {
        self.state.lock().index_errors = errors;
        self
    }

    /// Script the states reported for every query.
    pub fn with_query_states(self, states: Vec<JobState>) -> Self {
        self.state.lock().query_states = StateScript::new(states);
        self
    }

    /// Errors attached to a failed query.
    pub fn with_query_errors(self, errors: Vec<Value>) -> Self {
        self.state.lock().query_errors = errors;
        self
    }

    /// Fields listed for the index.
    pub fn with_fields(self, fields: Vec<FieldDescriptor>) -> Self {
        self.state.lock().fields = fields;
        self
    }

    /// Rows returned by every finished query.
    pub fn with_rows(self, rows: Vec<Value>) -> Self {
        self.state.lock().rows = rows;
        self
    }

    /// Make every call fail with a network error.
    pub fn with_transport_failure(self, message: impl Into<String>) -> Self {
        self.state.lock().transport_failure = Some(message.into());
        self
    }

    /// Snapshot of the call counters.
    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }

    /// Query payloads received so far.
    pub fn queries(&self) -> Vec<StructuredQuery> {
        self.state.lock().queries.clone()
    }

    fn check_transport(state: &MockState) -> Result<()> {
        match &state.transport_failure {
            Some(message) => Err(ApsError::Network(message.clone())),
            None => Ok(()),
        }
    }

    fn check_index(&self, index_id: &str) -> Result<()> {
        if index_id != self.index_id {
            return Err(ApsError::NotFound(format!("index {}", index_id)));
        }
        Ok(())
    }

    fn index_status(&self, state: &mut MockState) -> IndexStatus {
        let job = state.index_states.next();
        IndexStatus {
            index_id: self.index_id.clone(),
            state: job,
            errors: if job == JobState::Failed {
                state.index_errors.clone()
            } else {
                Vec::new()
            },
        }
    }

    fn query_status(state: &mut MockState, query_id: &str) -> QueryStatus {
        let job = state.query_states.next();
        QueryStatus {
            query_id: query_id.to_string(),
            state: job,
            errors: if job == JobState::Failed {
                state.query_errors.clone()
            } else {
                Vec::new()
            },
        }
    }
}

#[async_trait]
impl IndexService for MockIndexService {
    async fn create_index(&self, _project_id: &str, _request: &IndexRequest) -> Result<IndexStatus> {
        let mut state = self.state.lock();
        state.calls.create_index += 1;
        Self::check_transport(&state)?;
        Ok(self.index_status(&mut state))
    }

    async fn get_index(&self, _project_id: &str, index_id: &str) -> Result<IndexStatus> {
        let mut state = self.state.lock();
        state.calls.get_index += 1;
        Self::check_transport(&state)?;
        self.check_index(index_id)?;
        Ok(self.index_status(&mut state))
    }

    async fn list_fields(&self, _project_id: &str, index_id: &str) -> Result<Vec<FieldDescriptor>> {
        let mut state = self.state.lock();
        state.calls.list_fields += 1;
        Self::check_transport(&state)?;
        self.check_index(index_id)?;
        Ok(state.fields.clone())
    }

    async fn create_query(
        &self,
        _project_id: &str,
        index_id: &str,
        query: &StructuredQuery,
    ) -> Result<QueryStatus> {
        let mut state = self.state.lock();
        state.calls.create_query += 1;
        Self::check_transport(&state)?;
        self.check_index(index_id)?;
        state.queries.push(query.clone());
        state.next_query += 1;
        let query_id = format!("Q{}", state.next_query);
        Ok(Self::query_status(&mut state, &query_id))
    }

    async fn get_query(&self, _project_id: &str, _index_id: &str, query_id: &str) -> Result<QueryStatus> {
        let mut state = self.state.lock();
        state.calls.get_query += 1;
        Self::check_transport(&state)?;
        Ok(Self::query_status(&mut state, query_id))
    }

    async fn get_query_results(
        &self,
        _project_id: &str,
        _index_id: &str,
        _query_id: &str,
    ) -> Result<Vec<Value>> {
        let mut state = self.state.lock();
        state.calls.get_query_results += 1;
        Self::check_transport(&state)?;
        Ok(state.rows.clone())
    }
}

/// Connector that hands out the same mock for every credential.
pub struct MockConnector {
    service: Arc<MockIndexService>,
    connects: Mutex<Vec<AccessToken>>,
}

impl MockConnector {
    /// Wrap a mock service.
    pub fn new(service: Arc<MockIndexService>) -> Self {
        Self {
            service,
            connects: Mutex::new(Vec::new()),
        }
    }

    /// Tokens that have been connected, in order.
    pub fn tokens(&self) -> Vec<AccessToken> {
        self.connects.lock().clone()
    }
}

impl ServiceConnector for MockConnector {
    fn connect(&self, token: &AccessToken) -> Result<SharedIndexService> {
        self.connects.lock().push(token.clone());
        Ok(self.service.clone())
    }
}
