//! serve-a-file: a static file HTTP/1.1 server
//!
//! Serves a document root over HTTP/1.1 with keep-alive support:
//! - Asynchronous connection engine with per-session write queueing
//! - Directory listings with hidden-file filtering
//! - Root-confined path resolution (no traversal)
//! - Configuration via CLI arguments or TOML file

mod config;
mod content;
mod engine;
mod http;

use crate::config::Config;
use crate::engine::Engine;
use crate::http::handler::HttpHandler;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        root = %config.root.display(),
        buffer_size = config.buffer_size,
        "Starting serve-a-file"
    );

    let handler = Arc::new(HttpHandler::new(config.root.clone()));
    let engine = Arc::new(Engine::bind(&config, handler).await?);

    // Ctrl-C releases the shutdown latch; a second signal is a no-op.
    {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => engine.stop(),
                Err(e) => warn!(error = %e, "failed to listen for shutdown signal"),
            }
        });
    }

    engine.run().await;
    Ok(())
}
