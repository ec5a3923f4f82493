//! Headless castview demo.
//!
//! Renders a synthetic screen with a moving cursor into the windows listed in
//! the config, using the recording GPU backend, then prints run statistics
//! as JSON.
//!
//! Usage: `castview [config.json]`

mod config;
mod pipeline;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;

fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "castview=info,castview_render=debug,castview_capture=info,castview_gpu=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> Result<()> {
    init_logging();
    info!("castview v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    info!(
        windows = config.windows.len(),
        fps = config.render.fps,
        seconds = config.run_seconds,
        "Configuration loaded"
    );

    let summary = pipeline::run(&config)?;
    let report = serde_json::to_string_pretty(&summary).context("Failed to encode run summary")?;
    println!("{}", report);
    Ok(())
}
