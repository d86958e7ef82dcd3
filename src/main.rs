//! Form Uploadr - form upload relay for S3
//!
//! Serves an upload form and stores each submitted file in an S3 bucket.

use anyhow::Context;
use clap::Parser;
use form_uploadr::config::{ConfigProvider, FileConfigProvider};
use form_uploadr::metrics::server::MetricsServer;
use form_uploadr::s3::S3Store;
use form_uploadr::server::{AppState, Server};
use form_uploadr::{logging, VERSION};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Form Uploadr - upload form that stores files in S3
#[derive(Parser, Debug)]
#[command(name = "form-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // A missing .env file is fine
    let dotenv = dotenvy::dotenv();

    logging::init_subscriber(&args.log_level)?;
    info!("Starting Form Uploadr v{}", VERSION);
    if let Ok(path) = dotenv {
        info!("Loaded environment from {:?}", path);
    }

    let config = FileConfigProvider::new(&args.config)
        .load()
        .with_context(|| format!("failed to load configuration from {:?}", args.config))?;
    info!("Loaded configuration from {:?}", args.config);

    let mut metrics_server = if config.metrics.enabled {
        let mut server = MetricsServer::new(config.metrics.address.clone());
        server.start().await?;
        Some(server)
    } else {
        None
    };

    let store = S3Store::from_config(&config.storage)
        .await
        .context("failed to initialise storage client")?;
    info!(
        bucket = %config.storage.bucket,
        region = %store.region(),
        endpoint = store.endpoint().unwrap_or("aws"),
        "Storage client ready"
    );

    let state = AppState::from_config(&config, Arc::new(store))?;
    let server = Server::bind(&config.server.address, state).await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    if let Some(ref mut metrics) = metrics_server {
        metrics.shutdown().await;
    }

    info!("Shutting down");
    Ok(())
}
