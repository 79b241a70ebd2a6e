//! Ask command - one-shot question about a design.

use anyhow::Result;
use clap::Args;
use console::Style;
use serde_json::json;

use super::{Context, DesignArgs, cancel_on_ctrl_c};

/// Arguments for the ask command.
#[derive(Args, Debug)]
pub struct AskArgs {
    #[command(flatten)]
    pub design: DesignArgs,

    /// The question or prompt to send
    #[arg(required = true)]
    pub prompt: String,
}

/// Run the ask command.
pub async fn run(args: AskArgs, ctx: &Context) -> Result<()> {
    let design = args.design.design_ref();
    let token = args.design.access_token()?;
    let dim = Style::new().dim();

    if ctx.verbose {
        eprintln!("{}", dim.apply_to(format!("Design: {}", design)));
    }

    let manager = ctx.session_manager()?;
    let session = manager.session(&design, &token).await?;
    let cancel = cancel_on_ctrl_c();
    let response = session.prompt(&args.prompt, &cancel).await?;

    if ctx.json_output {
        let output = json!({
            "design": design.version_urn,
            "responses": response.responses,
            "tool_calls": response.tool_calls.len(),
            "iterations": response.iterations,
            "truncated": response.truncated,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for call in &response.tool_calls {
        eprintln!("{}", dim.apply_to(format!("[{}]", call.name)));
    }
    for text in &response.responses {
        println!("{}", text);
    }
    if ctx.verbose {
        eprintln!(
            "{}",
            dim.apply_to(format!(
                "{} rounds, {} tokens",
                response.iterations,
                response.usage.total()
            ))
        );
    }

    Ok(())
}
