//! Conversation state and turn output.

use chrono::{DateTime, Utc};
use modelprops_llm::{Message, Usage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Identifies a design session; doubles as the conversation thread id.
    SessionId
);
uuid_id!(TurnId);

// ─────────────────────────────────────────────────────────────────────────────
// Turns
// ─────────────────────────────────────────────────────────────────────────────

/// A tool invocation as the model requested it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// What a tool invocation produced, as shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultRecord {
    pub tool_call_id: String,
    pub success: bool,
    pub content: String,
}

/// One prompt and everything done to answer it.
///
/// `completed_at` stays `None` when the turn was aborted by a hard failure or
/// cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub user_message: String,
    pub responses: Vec<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResultRecord>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Turn {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            id: TurnId::new(),
            user_message: user_message.into(),
            responses: vec![],
            tool_calls: vec![],
            tool_results: vec![],
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// What one design conversation remembers between turns.
///
/// `history` is exactly what the model is shown next time, tool calls and
/// tool output included, so follow-ups can refer back to earlier rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub history: Vec<Message>,
    pub turns: Vec<Turn>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.turns
            .last()
            .map(|t| t.completed_at.unwrap_or(t.started_at))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Model calls allowed per turn unless configured otherwise.
pub const DEFAULT_MAX_ITERATIONS: u32 = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    /// Round budget; when spent the turn ends with the clarification text.
    pub max_iterations: u32,
    pub system_prompt: Option<String>,
}

impl AgentConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: 4096,
            temperature: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_prompt: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// At least one round is always allowed.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new(modelprops_llm::openai::DEFAULT_MODEL)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Turn output
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a finished turn hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Non-empty texts from the model, in the order they were produced.
    pub responses: Vec<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResultRecord>,
    /// Model calls spent.
    pub iterations: u32,
    pub usage: Usage,
    /// Set when the round budget ran out.
    pub truncated: bool,
}

impl AgentResponse {
    pub fn final_text(&self) -> Option<&str> {
        self.responses.last().map(String::as_str)
    }
}
