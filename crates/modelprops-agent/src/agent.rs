//! The tool-calling loop.
//!
//! Each round sends the thread to the model and runs whatever tools it asks
//! for, in order. A round without tool calls ends the turn, as does running
//! out of rounds.

use std::sync::Arc;
use std::time::Instant;

use modelprops_llm::{
    CompletionRequest, CompletionResponse, LlmBackend, Message, SharedBackend, ToolResultBlock,
    Usage,
};
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::journal::{Journal, JournalEntry, JournalEvent};
use crate::prompt::SystemPromptBuilder;
use crate::tool::{ToolContext, ToolRegistry, ToolResult};
use crate::types::{
    AgentConfig, AgentResponse, Session, SessionId, ToolCall, ToolResultRecord, Turn, TurnId,
};

/// Answer given when the model is still calling tools after the round budget.
pub const CLARIFICATION_FALLBACK: &str = "I wasn't able to work out an answer within the allowed number of steps. \
Could you clarify the question or narrow it down, for example to a specific category of elements?";

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// A model plus the tools it may call. Holds no conversation state; that
/// lives in the [`Session`] passed to each turn.
pub struct Agent {
    backend: SharedBackend,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
    journal: Journal,
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answer one prompt.
    ///
    /// All non-empty model texts come back in order. Recoverable tool failures
    /// are fed to the model as tool output. Model, service and cancellation
    /// failures abort the turn and leave `session.history` untouched, though
    /// the aborted turn is still recorded.
    pub async fn turn(
        &self,
        session: &mut Session,
        user_message: &str,
        cancel: &CancellationToken,
    ) -> Result<AgentResponse> {
        let mut turn = Turn::new(user_message);
        let session_id = session.id;
        let turn_id = turn.id;

        tracing::info!(
            %session_id,
            %turn_id,
            message_len = user_message.len(),
            "Turn started"
        );
        self.record(session_id, turn_id, JournalEvent::User {
            text: user_message.to_string(),
        });

        let mut messages = session.history.clone();
        messages.push(Message::user(user_message));

        match self.run_loop(session_id, &mut turn, &mut messages, cancel).await {
            Ok(response) => {
                turn.responses = response.responses.clone();
                turn.complete();
                session.history = messages;
                session.record_turn(turn);
                Ok(response)
            }
            Err(e) => {
                tracing::warn!(%session_id, %turn_id, error = %e, "Turn failed");
                self.record(session_id, turn_id, JournalEvent::Failed {
                    error: e.to_string(),
                });
                session.record_turn(turn);
                Err(e)
            }
        }
    }

    async fn run_loop(
        &self,
        session_id: SessionId,
        turn: &mut Turn,
        messages: &mut Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<AgentResponse> {
        let turn_id = turn.id;
        let mut responses = Vec::new();
        let mut usage = Usage::default();
        let mut iterations = 0u32;

        loop {
            iterations += 1;

            let request = self.build_request(messages);
            tracing::debug!(
                %session_id,
                iteration = iterations,
                messages = messages.len(),
                model = %request.model,
                "Calling LLM"
            );

            let call_start = Instant::now();
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                response = self.backend.complete(request) => response?,
            };
            usage += response.usage;

            tracing::debug!(
                %session_id,
                iteration = iterations,
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                stop_reason = ?response.stop_reason,
                has_tool_use = response.has_tool_use(),
                duration_ms = call_start.elapsed().as_millis() as u64,
                "LLM response received"
            );

            let text = response.text();
            if !text.trim().is_empty() {
                self.record(session_id, turn_id, JournalEvent::Assistant { text: text.clone() });
                responses.push(text);
            }

            if !response.has_tool_use() {
                messages.push(Message::assistant_blocks(response.content));
                tracing::info!(
                    %session_id,
                    %turn_id,
                    iterations,
                    tool_calls = turn.tool_calls.len(),
                    responses = responses.len(),
                    "Turn completed"
                );
                return Ok(self.response(turn, responses, iterations, usage, false));
            }

            if iterations >= self.config.max_iterations {
                tracing::warn!(%session_id, %turn_id, iterations, "Round budget exhausted");
                self.record(session_id, turn_id, JournalEvent::RoundBudgetExhausted { iterations });
                messages.push(Message::assistant(CLARIFICATION_FALLBACK));
                responses.push(CLARIFICATION_FALLBACK.to_string());
                return Ok(self.response(turn, responses, iterations, usage, true));
            }

            let results = self.execute_tools(&response, session_id, turn, cancel).await?;
            messages.push(Message::assistant_blocks(response.content));
            messages.push(Message::tool_results(results));
        }
    }

    fn response(
        &self,
        turn: &Turn,
        responses: Vec<String>,
        iterations: u32,
        usage: Usage,
        truncated: bool,
    ) -> AgentResponse {
        AgentResponse {
            responses,
            tool_calls: turn.tool_calls.clone(),
            tool_results: turn.tool_results.clone(),
            iterations,
            usage,
            truncated,
        }
    }

    /// Build a completion request.
    fn build_request(&self, messages: &[Message]) -> CompletionRequest {
        let mut request =
            CompletionRequest::new(&self.config.model, messages.to_vec(), self.config.max_tokens);

        if let Some(ref prompt) = self.config.system_prompt {
            request = request.with_system(prompt);
        }

        if let Some(temp) = self.config.temperature {
            request = request.with_temperature(temp);
        }

        let tool_defs = self.tools.to_llm_definitions();
        if !tool_defs.is_empty() {
            request = request.with_tools(tool_defs);
        }

        request
    }

    /// Execute the tool calls of a response in order.
    async fn execute_tools(
        &self,
        response: &CompletionResponse,
        session_id: SessionId,
        turn: &mut Turn,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolResultBlock>> {
        let ctx = ToolContext::new(session_id, turn.id, cancel.clone());
        let mut blocks = Vec::new();

        for tool_use in response.tool_uses() {
            self.record(session_id, turn.id, JournalEvent::ToolCall {
                id: tool_use.id.clone(),
                name: tool_use.name.clone(),
                input: tool_use.input.clone(),
            });
            turn.tool_calls.push(ToolCall {
                id: tool_use.id.clone(),
                name: tool_use.name.clone(),
                arguments: tool_use.input.clone(),
            });

            tracing::debug!(
                tool = %tool_use.name,
                tool_call_id = %tool_use.id,
                input_bytes = tool_use.input.to_string().len(),
                "Tool: executing"
            );

            let result = match self
                .tools
                .execute(&tool_use.name, tool_use.input.clone(), &ctx)
                .await
            {
                Ok(result) => result,
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(tool = %tool_use.name, error = %e, "Tool execution failed");
                    ToolResult::error(e.to_string())
                }
                Err(e) => return Err(e),
            };

            let content = result.to_llm_content();
            tracing::debug!(
                tool = %tool_use.name,
                tool_call_id = %tool_use.id,
                success = result.is_success(),
                output_bytes = content.len(),
                "Tool: completed"
            );
            self.record(session_id, turn.id, JournalEvent::ToolResult {
                id: tool_use.id.clone(),
                content: content.clone(),
                is_error: result.is_error(),
            });

            blocks.push(if result.is_success() {
                ToolResultBlock::success(&tool_use.id, &content)
            } else {
                ToolResultBlock::error(&tool_use.id, &content)
            });
            turn.tool_results.push(ToolResultRecord {
                tool_call_id: tool_use.id,
                success: result.is_success(),
                content,
            });
        }

        Ok(blocks)
    }

    fn record(&self, session_id: SessionId, turn_id: TurnId, event: JournalEvent) {
        self.journal
            .record(JournalEntry::new(session_id, turn_id, event));
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("backend", &self.backend.name())
            .field("tools", &self.tools)
            .field("config", &self.config)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Assembles an [`Agent`]. Only the backend is mandatory.
pub struct AgentBuilder {
    backend: Option<SharedBackend>,
    tools: ToolRegistry,
    config: AgentConfig,
    prompt_builder: Option<SystemPromptBuilder>,
    journal: Journal,
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
            prompt_builder: None,
            journal: Journal::disabled(),
        }
    }

    pub fn with_backend(self, backend: impl LlmBackend + 'static) -> Self {
        self.with_shared_backend(Arc::new(backend))
    }

    pub fn with_shared_backend(mut self, backend: SharedBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool<T: crate::tool::Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.config = self.config.with_max_iterations(max_iterations);
        self
    }

    /// Render the system prompt from `builder` and the registered tools at
    /// build time, replacing any fixed prompt.
    pub fn with_prompt_builder(mut self, builder: SystemPromptBuilder) -> Self {
        self.prompt_builder = Some(builder);
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let Self {
            backend,
            tools,
            mut config,
            prompt_builder,
            journal,
        } = self;
        let backend =
            backend.ok_or_else(|| AgentError::Config("an LLM backend is required".to_string()))?;
        if let Some(builder) = prompt_builder {
            config.system_prompt = Some(builder.with_tools(&tools).build());
        }

        Ok(Agent {
            backend,
            tools: Arc::new(tools),
            config,
            journal,
        })
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
