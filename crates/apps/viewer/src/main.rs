mod config;
mod location;

use std::sync::Arc;

use clap::Parser;
use scene::{Engine, RenderState};
use serde::Serialize;
use streaming::HttpQueryService;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Args;
use crate::location::MemoryLocation;

#[derive(Serialize)]
struct SessionReport {
    api_url: String,
    url_writes: u64,
    history_replacements: u64,
    tree_path_found: Option<bool>,
    state: RenderState,
}

fn main() {
    if let Err(e) = real_main() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<(), String> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_env("CMV_LOG").unwrap_or_else(|_| EnvFilter::new(&args.log));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // One thread: store callbacks and fetch completions interleave the way
    // they would on a page's event loop.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to start runtime: {e}"))?;
    runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<(), String> {
    let api_url = config::api_url(args.api_url.as_deref());
    let service = HttpQueryService::new(&api_url).map_err(|e| {
        error!(%api_url, error = %e, "bad query service url");
        format!("invalid api url {api_url:?}: {e}")
    })?;
    let location = Arc::new(MemoryLocation::parse(&args.location)?);
    let timing = config::timing_from_env();

    let engine = Engine::new(Arc::new(service), timing, location.clone()).map_err(|e| {
        error!(error = %e, "bad timing configuration");
        format!("invalid timing: {e}")
    })?;
    info!(%api_url, location = %args.location, "session started");

    engine.viewport().set_container_size(args.width, args.height);
    let tree_path_found = apply(&engine, &args).await;

    tokio::time::sleep(args.settle()).await;
    engine.url_sync().flush();

    let report = SessionReport {
        api_url,
        url_writes: engine.url_sync().writes(),
        history_replacements: location.replacements(),
        tree_path_found,
        state: engine.render_state(),
    };
    let json = serde_json::to_string_pretty(&report).map_err(|e| format!("encode report: {e}"))?;
    println!("{json}");
    Ok(())
}

/// Applies the requested mutations in the order a user would make them.
async fn apply(engine: &Engine, args: &Args) -> Option<bool> {
    if let Some(view) = args.hierarchy() {
        engine.hierarchy().set_filter(Some(view));
    }
    if let Some(category) = &args.color {
        engine.colouring().set_category(category.clone());
    }
    if let Some(detail) = args.level_of_detail() {
        engine.viewport().set_level_of_detail(detail);
    }

    if let Some([from, to]) = args.path.as_deref() {
        let connectivity = engine.connectivity();
        connectivity.set_excluded_edges(args.exclude.clone());
        connectivity.set_path_from_text(from.clone());
        connectivity.set_path_to_text(to.clone());
    }
    if let Some(node) = &args.flood {
        let connectivity = engine.connectivity();
        connectivity.set_flood_fill_excluded_edges(args.flood_exclude.clone());
        connectivity.set_flood_fill_text(node.clone());
    }
    if let Some(text) = &args.search {
        engine.search().set_input(text.clone());
    }

    // Catalogue failures are logged by the engine and leave the lists empty.
    let _ = engine.load_column_names().await;
    let _ = engine.load_detail_levels().await;
    let tree_path_found = match engine.load_tree().await {
        Ok(found) => Some(found),
        Err(e) => {
            warn!(error = %e, "hierarchy tree unavailable");
            None
        }
    };

    if let Some(name) = &args.fly_to
        && !engine.viewport().fly_to(name).await
    {
        warn!(%name, "no location for asset");
    }
    tree_path_found
}
