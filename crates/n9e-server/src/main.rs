use anyhow::Result;
use n9e_common::time::SystemClock;
use n9e_notify::LogTransport;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use n9e_server::app::App;
use n9e_server::config::ServerConfig;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  n9e-alertd [config.toml]    Start the alert daemon (default: config/server.toml)");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = match args.get(1).map(|s| s.as_str()) {
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(path) => path,
        None => "config/server.toml",
    };
    let config = ServerConfig::load(config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(config.log.directive().parse()?))
        .init();

    run_server(config).await
}

async fn run_server(config: ServerConfig) -> Result<()> {
    tracing::info!(
        data_dir = %config.data_dir,
        db = %config.redacted_url(),
        workers = config.engine.workers,
        "n9e-alertd starting"
    );

    let mut app = App::build(config, Arc::new(LogTransport), Arc::new(SystemClock)).await?;
    let snapshot = app.registry.snapshot();
    tracing::info!(
        rules = snapshot.rule_count(),
        mutes = snapshot.mute_count(),
        subscriptions = snapshot.subscription_count(),
        "Registry loaded"
    );

    app.spawn_background();
    tracing::info!("Server started");

    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down gracefully");

    app.shutdown().await;
    tracing::info!("Server stopped");

    Ok(())
}
