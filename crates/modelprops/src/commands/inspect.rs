//! Inspect command - build a design's index and print its field catalog.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use modelprops_agent::{DesignStore, FieldCatalogBuilder, IndexCache, IndexLifecycleManager};
use modelprops_aps::ServiceConnector;
use modelprops_session::{CacheConfig, SessionCache};
use serde_json::json;

use super::{Context, DesignArgs, cancel_on_ctrl_c};

/// Arguments for the inspect command.
#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(flatten)]
    pub design: DesignArgs,

    /// Only print the index id
    #[arg(long)]
    pub index_only: bool,
}

/// Run the inspect command.
pub async fn run(args: InspectArgs, ctx: &Context) -> Result<()> {
    let design = args.design.design_ref();
    let token = args.design.access_token()?;
    let settings = ctx.settings();
    let service = ctx.connector()?.connect(&token)?;

    let store = match &settings.cache_dir {
        Some(dir) => DesignStore::new(dir),
        None => DesignStore::disabled(),
    };
    let indexes = IndexCache::new(
        CacheConfig::new().with_max_entries(settings.max_cached_indexes),
        store.clone(),
    );
    let manager = IndexLifecycleManager::new(service.clone(), &design.project_id, indexes)
        .with_poll_policy(settings.poll.clone());
    let builder = FieldCatalogBuilder::new(
        service,
        &design.project_id,
        SessionCache::new(CacheConfig::new()),
        store,
        design.key(),
    )
    .with_categories(settings.categories.clone());

    let cancel = cancel_on_ctrl_c();
    let index_id = manager.ensure_index(&design.version_urn, &cancel).await?;
    if args.index_only {
        if ctx.json_output {
            println!("{}", json!({ "index_id": index_id }));
        } else {
            println!("{}", index_id);
        }
        return Ok(());
    }

    let catalog = builder.list_fields(&index_id, &cancel).await?;

    if ctx.json_output {
        let output = json!({
            "index_id": index_id,
            "fields": catalog.to_json(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{} {}", style("Index:").bold(), index_id);
    for category in catalog.categories() {
        println!();
        println!("{}", style(category).bold().cyan());
        if let Some(fields) = catalog.category(category) {
            for (name, key) in fields {
                println!("  {} {}", name, dim.apply_to(key));
            }
        }
    }

    Ok(())
}
