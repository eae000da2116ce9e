//! Mesh node binary - CLI entry point

use std::time::Duration;

use clap::Parser;
use tracing::info;

use mesh_cli::error::{CliError, Result};
use mesh_cli::Cli;
use mesh_core::NodeConfig;
use mesh_runtime::NodeBuilder;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if cli.qemu {
        info!("using QEMU device wiring");
    }

    let config = NodeConfig::default().apply_env()?;
    check_simulation_controller(&config.pysim_url).await?;

    let node_id = cli.node_id();
    info!(node_id = %node_id, root = cli.root, "starting mesh node");

    let mut runtime = NodeBuilder::new()
        .with_config(config)
        .as_root(cli.root)
        .build_and_start()?;

    shutdown_signal().await;

    runtime.shutdown().await?;
    info!("mesh node exited successfully");
    Ok(())
}

/// Fails fast if the simulation controller is unreachable at startup (§7).
async fn check_simulation_controller(pysim_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| CliError::ControllerUnreachable(pysim_url.to_string(), e.to_string()))?;

    client
        .get(pysim_url)
        .send()
        .await
        .map_err(|e| CliError::ControllerUnreachable(pysim_url.to_string(), e.to_string()))?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
