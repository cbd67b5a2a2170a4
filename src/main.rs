use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber;

use floodgate::config::FloodgateConfig;
use floodgate::management::{FileConfigStore, ManagementServer};
use floodgate::ratelimit::AdmissionEngine;
use floodgate::registry::StaticResourceRegistry;

#[derive(Parser, Debug)]
#[command(name = "floodgate", version, about = "Request-admission gate for multi-tenant API proxies")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "floodgate.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    info!("Starting Floodgate Admission Gate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = FloodgateConfig::from_file(&args.config)?;
    info!(admin_addr = %config.server.admin_addr, "Configuration loaded");

    // Initialize the admission engine and apply the on-disk rules
    let registry = Arc::new(StaticResourceRegistry::new(config.resources.clone()));
    let engine = Arc::new(AdmissionEngine::new(registry));
    engine.update(&config.rate_limits.rules, &config.identities);
    info!(active_rules = engine.rule_count(), "Admission engine initialized");

    // Create and start the management server
    let store = Arc::new(FileConfigStore::new(&args.config));
    let admin_addr = config.server.admin_addr;
    let server = ManagementServer::new(admin_addr, engine, store, config);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Floodgate Admission Gate stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
