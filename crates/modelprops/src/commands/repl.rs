//! Line editor loop behind `modelprops chat`.

use std::sync::Arc;

use anyhow::Result;
use console::{Style, Term, style};
use modelprops_agent::{AgentError, AgentResponse, CancellationToken, DesignSession};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

/// A line starting with `/`.
#[derive(Debug, PartialEq, Eq)]
enum Slash<'a> {
    Quit,
    Help,
    Clear,
    Session,
    Unknown(&'a str),
}

impl<'a> Slash<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let word = line.strip_prefix('/')?.split_whitespace().next().unwrap_or("");
        Some(match word {
            "quit" | "q" | "exit" => Self::Quit,
            "help" | "h" | "?" | "" => Self::Help,
            "clear" | "cls" => Self::Clear,
            "session" => Self::Session,
            other => Self::Unknown(other),
        })
    }
}

pub struct Repl {
    session: Arc<DesignSession>,
    editor: Editor<(), DefaultHistory>,
    verbose: bool,
}

impl Repl {
    pub fn new(session: Arc<DesignSession>, verbose: bool) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();
        Ok(Self {
            session,
            editor: Editor::with_config(config)?,
            verbose,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        self.banner();
        let prompt = format!("{} ", style("modelprops>").cyan().bold());

        loop {
            let line = match self.editor.readline(&prompt) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => {
                    dim("(Ctrl+D or /quit to leave)");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(e) => {
                    error(&format!("input: {e}"));
                    break;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match Slash::parse(line) {
                Some(Slash::Quit) => break,
                Some(Slash::Help) => help(),
                Some(Slash::Clear) => Term::stdout().clear_screen()?,
                Some(Slash::Session) => {
                    println!("Session: {}", self.session.id().await);
                    println!("Design:  {}", self.session.design());
                    println!("Turns:   {}", self.session.turn_count().await);
                }
                Some(Slash::Unknown(word)) => error(&format!("unknown command /{word}, try /help")),
                None => {
                    if let Err(e) = self.ask(line).await {
                        error(&e.to_string());
                    }
                }
            }
        }

        dim("Bye.");
        Ok(())
    }

    /// One turn. Ctrl+C while it runs cancels the turn, not the REPL.
    async fn ask(&self, question: &str) -> Result<()> {
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            }
        });
        let outcome = self.session.prompt(question, &cancel).await;
        watcher.abort();

        match outcome {
            Ok(response) => {
                self.render(&response);
                Ok(())
            }
            Err(AgentError::Cancelled) => {
                dim("(cancelled)");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn render(&self, response: &AgentResponse) {
        for (call, result) in response.tool_calls.iter().zip(&response.tool_results) {
            let mark = if result.success { "ok" } else { "failed" };
            dim(&format!("[{} {}]", call.name, mark));
        }
        for text in &response.responses {
            println!("{text}");
        }
        if self.verbose {
            dim(&format!(
                "{} model calls, {} tokens",
                response.iterations,
                response.usage.total()
            ));
        }
        println!();
    }

    fn banner(&self) {
        println!();
        println!("{}", style("modelprops chat").bold().cyan());
        dim(&format!("Design {}", self.session.design().version_urn));
        dim("Ask about the design's elements and properties. /help lists commands.");
        println!();
    }
}

fn help() {
    let rows = [
        ("/quit, /q", "leave"),
        ("/help, /h", "this list"),
        ("/clear", "clear the screen"),
        ("/session", "session id, design and turn count"),
        ("Ctrl+C", "cancel the running question"),
        ("Ctrl+D", "leave"),
    ];
    for (keys, what) in rows {
        println!("  {:<12} {}", style(keys).cyan(), what);
    }
}

fn dim(msg: &str) {
    println!("{}", Style::new().dim().apply_to(msg));
}

fn error(msg: &str) {
    println!("{} {}", style("Error:").red(), msg);
}
