//! Append-only interaction journal.
//!
//! Every user prompt, model message, tool call and tool result of a design
//! session is appended as one JSON line to the session's transcript file.
//! Recording never blocks or fails a turn: entries go over an unbounded
//! channel to a single writer task, and write failures are logged and
//! dropped.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::types::{SessionId, TurnId};

// ─────────────────────────────────────────────────────────────────────────────
// Entries
// ─────────────────────────────────────────────────────────────────────────────

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEvent {
    /// The user's prompt.
    User { text: String },
    /// Text the model produced.
    Assistant { text: String },
    /// A tool call requested by the model.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// The output returned to the model for a tool call.
    ToolResult {
        id: String,
        content: String,
        is_error: bool,
    },
    /// The round budget ran out and the turn ended with a clarification request.
    RoundBudgetExhausted { iterations: u32 },
    /// The turn failed.
    Failed { error: String },
}

/// One line of a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub session_id: SessionId,
    pub turn_id: TurnId,
    #[serde(flatten)]
    pub event: JournalEvent,
}

impl JournalEntry {
    pub fn new(session_id: SessionId, turn_id: TurnId, event: JournalEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id,
            turn_id,
            event,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Journal
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to a session's transcript sink.
///
/// Cloning is cheap; all clones feed the same writer. The writer task ends
/// once every handle is dropped and the queue is drained.
#[derive(Debug, Clone)]
pub struct Journal {
    sender: Option<mpsc::UnboundedSender<JournalEntry>>,
}

impl Journal {
    /// Start a writer appending to `path`. The parent directory is created on
    /// first write.
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn(path: impl Into<PathBuf>) -> (Self, JoinHandle<()>) {
        let path = path.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(write_entries(path, receiver));
        (
            Self {
                sender: Some(sender),
            },
            handle,
        )
    }

    /// A journal that records nothing.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Queue an entry. Never blocks and never fails.
    pub fn record(&self, entry: JournalEntry) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.send(entry).is_err() {
            tracing::warn!("Journal writer has stopped; entry dropped");
        }
    }
}

async fn write_entries(path: PathBuf, mut receiver: mpsc::UnboundedReceiver<JournalEntry>) {
    let mut file: Option<tokio::fs::File> = None;

    while let Some(entry) = receiver.recv().await {
        let mut line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize journal entry");
                continue;
            }
        };
        line.push('\n');

        if file.is_none() {
            file = open_append(&path).await;
        }
        let Some(f) = file.as_mut() else {
            continue;
        };
        if let Err(e) = f.write_all(line.as_bytes()).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write journal entry");
            file = None;
            continue;
        }
        if let Err(e) = f.flush().await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to flush journal");
        }
    }
}

async fn open_append(path: &Path) -> Option<tokio::fs::File> {
    if let Some(parent) = path.parent()
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        tracing::warn!(path = %parent.display(), error = %e, "Failed to create journal directory");
        return None;
    }
    match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
    {
        Ok(file) => Some(file),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to open journal");
            None
        }
    }
}
