//! VisionIDE: code editor over a live camera background
//!
//! Initializes the global allocator, sets up logging, loads the host
//! configuration and hands control to the window event loop.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vide_host::HostConfig;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    info!("VisionIDE starting...");

    let config = HostConfig::load()?;
    vide_host::run(config)
}
