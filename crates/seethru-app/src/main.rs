use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;
mod demo;

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG=debug shows per-message traffic
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let args = app::Args::parse();

    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "seethru-node".to_owned());
    info!("SeeThru v{} on {}", env!("CARGO_PKG_VERSION"), host);

    match app::run(args).await {
        Ok(()) => {
            info!("SeeThru exited cleanly.");
            Ok(())
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            Err(e)
        }
    }
}
