//! Main entry point for the transcript-downloader CLI

use clap::Parser;
use std::time::Duration;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use transcript_downloader::cli::{Cli, Commands};
use transcript_downloader::metrics::init_metrics;
use transcript_downloader::shutdown::{self, ShutdownCoordinator};

/// Initialize tracing subscriber with optional JSON formatting.
///
/// Logs go to stderr; stdout carries command output only.
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("transcript_downloader=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    // .env must be loaded before clap reads env fallbacks
    let dotenv = dotenvy::dotenv();
    init_tracing();
    if let Err(e) = &dotenv {
        if !e.not_found() {
            warn!(error = %e, "Failed to load .env file");
        }
    }

    let cli = Cli::parse();

    let shutdown = ShutdownCoordinator::shared();
    shutdown::set_global_shutdown(shutdown.clone());
    shutdown::install_ctrl_c_handler(shutdown);

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = init_metrics(addr).await {
            warn!(error = %e, addr = %addr, "Metrics exporter not started");
        }
    }

    let result = match cli.command {
        Commands::Download(ref args) => args.execute(&cli).await.map_err(|e| anyhow::anyhow!(e)),
        Commands::ListCalls(ref args) => args.execute(&cli).await.map_err(|e| anyhow::anyhow!(e)),
        Commands::Test(ref args) => args
            .execute_from_env(
                Duration::from_secs(cli.api_timeout),
                cli.api_base_url.as_deref(),
                cli.output_format,
            )
            .await
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Info(ref args) => args.execute(&cli).map_err(|e| anyhow::anyhow!(e)),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
