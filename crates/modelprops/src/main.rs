//! `modelprops`: ask a chat model about the elements and properties of a
//! design model.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod commands;

use commands::{ask, chat, inspect};

/// Workspace crates whose log level follows `--verbose`.
const OWN_CRATES: [&str; 5] = [
    "modelprops",
    "modelprops_agent",
    "modelprops_llm",
    "modelprops_aps",
    "modelprops_config",
];

/// Ask questions about the properties of a design model
#[derive(Parser)]
#[command(name = "modelprops", author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log debug detail to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Read this config file instead of discovering one
    #[arg(long, global = true, env = "MODELPROPS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Answer one question about a design and exit
    Ask(ask::AskArgs),

    /// Talk about a design interactively
    Chat(chat::ChatArgs),

    /// Build a design's index and show which fields it exposes
    Inspect(inspect::InspectArgs),
}

fn directives(own_level: &str, rest: &str) -> EnvFilter {
    let mut spec: Vec<String> = OWN_CRATES
        .iter()
        .map(|krate| format!("{krate}={own_level}"))
        .collect();
    spec.push(rest.to_string());
    EnvFilter::new(spec.join(","))
}

/// Terse stderr output plus a daily JSON log under the config dir. The guard
/// flushes the file writer on drop.
fn init_logging(verbose: bool) -> WorkerGuard {
    let console = if verbose {
        directives("debug", "info")
    } else {
        directives("info", "warn")
    };
    let log_dir = modelprops_config::config_dir()
        .map(|dir| dir.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "modelprops.log"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_filter(directives("trace", "info")),
        )
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose);

    let ctx = commands::Context::load(cli.config.as_deref(), cli.json, cli.verbose)?;
    match cli.command {
        Commands::Ask(args) => ask::run(args, &ctx).await,
        Commands::Chat(args) => chat::run(args, &ctx).await,
        Commands::Inspect(args) => inspect::run(args, &ctx).await,
    }
}
