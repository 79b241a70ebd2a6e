//! Chat command - interactive REPL about one design.

use anyhow::Result;
use clap::Args;

use super::repl::Repl;
use super::{Context, DesignArgs};

/// Arguments for the chat command.
#[derive(Args, Debug)]
pub struct ChatArgs {
    #[command(flatten)]
    pub design: DesignArgs,
}

/// Run the chat command (REPL).
pub async fn run(args: ChatArgs, ctx: &Context) -> Result<()> {
    let design = args.design.design_ref();
    let token = args.design.access_token()?;

    let manager = ctx.session_manager()?;
    manager.spawn_cleanup_tasks();
    let session = manager.session(&design, &token).await?;

    let mut repl = Repl::new(session, ctx.verbose)?;
    repl.run().await
}
