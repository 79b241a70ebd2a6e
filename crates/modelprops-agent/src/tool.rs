//! The [`Tool`] trait, parameter checking shared by the design tools, and the
//! [`ToolRegistry`] the agent dispatches through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::props::PropsError;
use crate::types::{SessionId, TurnId};

// ─────────────────────────────────────────────────────────────────────────────
// Parameters
// ─────────────────────────────────────────────────────────────────────────────

/// A tool call the model got wrong. The message tells it how to fix the call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParameterValidationError {
    #[error("missing required parameter '{name}': {hint}")]
    MissingRequired {
        name: &'static str,
        hint: &'static str,
    },

    #[error("invalid type for '{name}': expected {expected}, got {actual}")]
    InvalidType {
        name: &'static str,
        expected: &'static str,
        actual: String,
    },

    #[error("'{name}' has invalid value '{value}': {message}")]
    InvalidValue {
        name: &'static str,
        value: String,
        message: String,
    },

    #[error("parameter validation failed: {}", join_errors(.0))]
    Multiple(Vec<ParameterValidationError>),
}

fn join_errors(errors: &[ParameterValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ParameterValidationError {
    pub fn missing(name: &'static str, hint: &'static str) -> Self {
        Self::MissingRequired { name, hint }
    }

    pub fn invalid_type(name: &'static str, expected: &'static str, actual: impl Into<String>) -> Self {
        Self::InvalidType {
            name,
            expected,
            actual: actual.into(),
        }
    }

    pub fn invalid_value(name: &'static str, value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            name,
            value: value.into(),
            message: message.into(),
        }
    }

    /// Bundle the errors of several parameters. One error stays as it is.
    pub fn multiple(mut errors: Vec<ParameterValidationError>) -> Self {
        match errors.len() {
            1 => errors.remove(0),
            _ => Self::Multiple(errors),
        }
    }
}

impl From<ParameterValidationError> for AgentError {
    fn from(err: ParameterValidationError) -> Self {
        AgentError::InvalidToolParams(err.to_string())
    }
}

pub type ParamResult<T> = std::result::Result<T, ParameterValidationError>;

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Accessors over a tool call's argument object.
pub trait ParamExt {
    /// A string that is present and not blank.
    fn required_str(&self, name: &'static str, hint: &'static str) -> ParamResult<&str>;

    /// A JSON document passed as text. Models often inline the document
    /// itself instead; that is accepted and re-serialized.
    fn required_json_text(&self, name: &'static str, hint: &'static str) -> ParamResult<String>;
}

impl ParamExt for Value {
    fn required_str(&self, name: &'static str, hint: &'static str) -> ParamResult<&str> {
        match self.get(name).filter(|v| !v.is_null()) {
            None => Err(ParameterValidationError::missing(name, hint)),
            Some(Value::String(s)) if s.trim().is_empty() => Err(
                ParameterValidationError::invalid_value(name, s.as_str(), "must not be empty"),
            ),
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(ParameterValidationError::invalid_type(name, "string", kind_of(other))),
        }
    }

    fn required_json_text(&self, name: &'static str, hint: &'static str) -> ParamResult<String> {
        match self.get(name).filter(|v| !v.is_null()) {
            None => Err(ParameterValidationError::missing(name, hint)),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(document) => Ok(document.to_string()),
        }
    }
}

const INDEX_ID_HINT: &str = "provide the ID returned by build_index";

#[derive(Debug, Clone)]
pub struct BuildIndexParams {
    pub design_id: String,
}

impl TryFrom<Value> for BuildIndexParams {
    type Error = ParameterValidationError;

    fn try_from(params: Value) -> ParamResult<Self> {
        let design_id = params.required_str("design_id", "provide the design ID to build the index for")?;
        Ok(Self {
            design_id: design_id.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ListFieldsParams {
    pub index_id: String,
}

impl TryFrom<Value> for ListFieldsParams {
    type Error = ParameterValidationError;

    fn try_from(params: Value) -> ParamResult<Self> {
        let index_id = params.required_str("index_id", INDEX_ID_HINT)?;
        Ok(Self {
            index_id: index_id.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunQueryParams {
    pub index_id: String,
    /// Query payload as JSON text; parsed by the executor.
    pub query: String,
}

impl TryFrom<Value> for RunQueryParams {
    type Error = ParameterValidationError;

    fn try_from(params: Value) -> ParamResult<Self> {
        let index_id = params.required_str("index_id", INDEX_ID_HINT);
        let query = params.required_json_text(
            "query",
            "provide the query as a JSON object with a \"query\" member",
        );
        match (index_id, query) {
            (Ok(index_id), Ok(query)) => Ok(Self {
                index_id: index_id.trim().to_string(),
                query,
            }),
            (a, b) => Err(ParameterValidationError::multiple(
                [a.err(), b.err()].into_iter().flatten().collect(),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformJsonParams {
    pub filter: String,
    pub input_json: String,
}

impl TryFrom<Value> for TransformJsonParams {
    type Error = ParameterValidationError;

    fn try_from(params: Value) -> ParamResult<Self> {
        let filter = params.required_str("filter", "provide a filter expression such as \".[] | .Width\"");
        let input = params.required_json_text("input_json", "provide the JSON text to process");
        match (filter, input) {
            (Ok(filter), Ok(input_json)) => Ok(Self {
                filter: filter.to_string(),
                input_json,
            }),
            (a, b) => Err(ParameterValidationError::multiple(
                [a.err(), b.err()].into_iter().flatten().collect(),
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool
// ─────────────────────────────────────────────────────────────────────────────

/// Something the model can call.
///
/// Failures the model can work around are returned as
/// [`ToolResult::Error`]. An `Err` ends the turn.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Read by the model to decide when to call the tool.
    fn description(&self) -> &str;

    /// JSON Schema of the argument object.
    fn parameters(&self) -> Value;

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult>;
}

/// Where a tool call happens, and the token that cancels it.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub session_id: SessionId,
    pub turn_id: TurnId,
    pub cancellation: CancellationToken,
}

impl ToolContext {
    pub fn new(session_id: SessionId, turn_id: TurnId, cancellation: CancellationToken) -> Self {
        Self {
            session_id,
            turn_id,
            cancellation,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// What a tool hands back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResult {
    Text { content: String },
    Json { content: Value },
    Error { message: String },
}

impl ToolResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn json(content: Value) -> Self {
        Self::Json { content }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Render a design property operation's outcome.
    ///
    /// Recoverable [`PropsError`]s become an error result the model reads.
    /// Transport, credential and cancellation failures stay `Err`.
    pub fn from_props<T>(
        outcome: std::result::Result<T, PropsError>,
        render: impl FnOnce(T) -> ToolResult,
    ) -> Result<ToolResult> {
        match outcome {
            Ok(value) => Ok(render(value)),
            Err(err) if err.is_recoverable() => Ok(Self::error(err.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn is_success(&self) -> bool {
        !self.is_error()
    }

    /// Text placed in the tool result block. JSON is compact since query
    /// rows can be numerous.
    pub fn to_llm_content(&self) -> String {
        match self {
            Self::Text { content } => content.clone(),
            Self::Json { content } => content.to_string(),
            Self::Error { message } => format!("Error: {message}"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Tools by name. Iteration is name-ordered so the tool list sent to the
/// model never changes between rounds.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any with the same name.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn to_llm_definitions(&self) -> Vec<modelprops_llm::ToolDefinition> {
        self.iter()
            .map(|t| modelprops_llm::ToolDefinition::new(t.name(), t.description(), t.parameters()))
            .collect()
    }

    /// Run the named tool. An unknown name is a recoverable error.
    pub async fn execute(&self, name: &str, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        match self.tools.get(name) {
            Some(tool) => tool.execute(params, ctx).await,
            None => Err(AgentError::ToolNotFound(name.to_string())),
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tools.keys()).finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test double
// ─────────────────────────────────────────────────────────────────────────────

/// Scripted tool that records the arguments it was called with.
#[cfg(test)]
#[derive(Debug)]
pub struct MockTool {
    name: String,
    description: String,
    parameters: Value,
    response: Option<ToolResult>,
    calls: parking_lot::Mutex<Vec<Value>>,
}

#[cfg(test)]
impl MockTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: "A mock tool for testing".to_string(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
            response: None,
            calls: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_response(mut self, response: ToolResult) -> Self {
        self.response = Some(response);
        self
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[cfg(test)]
#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        self.calls.lock().push(params);
        Ok(self
            .response
            .clone()
            .unwrap_or_else(|| ToolResult::text("mock response")))
    }
}
