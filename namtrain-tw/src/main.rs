//! namtrain-tw - Training Worker service
//!
//! Accepts reamp audio pairs, orchestrates long-running model-training runs
//! against them, and serves run state, metrics and exported artifacts over
//! HTTP.

use anyhow::Result;
use clap::Parser;
use namtrain_common::config::{self, DataLayout, TomlConfig};
use namtrain_tw::files::FileRegistry;
use namtrain_tw::store::RunStore;
use namtrain_tw::trainer::ProcessTrainer;
use namtrain_tw::AppState;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "namtrain-tw", about = "NAM trainer backend service")]
struct Args {
    /// Data folder (overrides NAMTRAIN_ROOT and the config file)
    #[arg(long)]
    root: Option<String>,

    /// Listen address
    #[arg(long, default_value = "127.0.0.1:5731")]
    listen: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting namtrain-tw (Training Worker) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Step 1: Resolve the data folder and create its layout if missing
    let toml_config = TomlConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Config file unusable, continuing with defaults");
        TomlConfig::default()
    });
    let root = config::resolve_root_folder(args.root.as_deref(), &toml_config);
    let layout = DataLayout::new(root);
    layout
        .ensure_directories()
        .map_err(|e| anyhow::anyhow!("Failed to initialize data folder: {}", e))?;
    info!("Data folder: {}", layout.root().display());

    // Step 2: Rehydrate the run store before serving anything
    let store = Arc::new(RunStore::new(layout.runs_dir()));
    let recovered = store.recover().await?;
    info!(runs = recovered, "Run store ready");

    let files = Arc::new(FileRegistry::new(layout.files_dir()));
    let trainer_command = config::resolve_trainer_command(&toml_config);
    info!(command = %trainer_command, "External trainer configured");
    let trainer = Arc::new(ProcessTrainer::new(trainer_command));

    // Step 3: Serve
    let state = AppState::new(store, files, trainer);
    let app = namtrain_tw::build_router(state);

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!("Listening on http://{}", args.listen);
    info!("Health check: http://{}/health", args.listen);

    axum::serve(listener, app).await?;

    Ok(())
}
