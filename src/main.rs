//! SSH poller - Entry point
//!
//! Parses CLI arguments, loads the host file, starts polling every host and
//! handles graceful shutdown.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ssh_poller::config::{Args, Config};
use ssh_poller::error::Result;
use ssh_poller::service::Service;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing/logging to stderr (stdout carries the entity dump)
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Validate and create config
    let config = Config::from_args(args)?;

    info!("SSH poller v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Polling {} host(s)", config.hosts.len());

    let print_entities = config.print_entities;
    let service = Service::new(config).await?;

    if print_entities {
        service.wait_first_refresh().await;
        let snapshot = service.snapshot().await;
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize entities: {}", e),
        }
        service.shutdown().await;
        return Ok(());
    }

    info!("SSH poller running");

    // Wait for Ctrl+C or SIGTERM
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    // Cleanup
    service.shutdown().await;

    info!("SSH poller stopped");

    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
