//! Mail table gateway
//!
//! Bridges a mail transfer agent's table lookups and policy delegation to
//! REST backends.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────── gateway-loop thread ─┐
//!   MTA connection       │  ┌──────────┐   ┌────────────┐   ┌───────────┐   │
//!   ─────────────────────┼─▶│ listener │──▶│ connection │──▶│  session  │   │
//!                        │  └──────────┘   │  (reader)  │   │ (handler) │   │
//!                        │                 └─────▲──────┘   └─────┬─────┘   │
//!                        │                       │ SocketOps      │         │
//!                        └───────────────────────┼────────────────┼─────────┘
//!                                                │                ▼
//!                        ┌───────────────────────┴──── backend executor ─────┐
//!                        │  classify outcome ◀── RestClient::call (reqwest) ─┼──▶ REST backend
//!                        └───────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::runtime::Handle;

use mail_table_gateway::backend::{Backend, ReqwestClient};
use mail_table_gateway::config::{load_config, EndpointRegistry};
use mail_table_gateway::lifecycle::signals::wait_for_shutdown_signal;
use mail_table_gateway::net::EventLoop;
use mail_table_gateway::observability::{logging, metrics};

/// Protocol gateway between an MTA's lookup tables and REST backends.
#[derive(Debug, Parser)]
#[command(name = "mail-table-gateway", version, about)]
struct Cli {
    /// Path to the JSON configuration file.
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_logging();

    tracing::info!("mail-table-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli.config)?;
    tracing::info!(
        path = %cli.config.display(),
        endpoints = config.endpoints.len(),
        "Configuration loaded"
    );

    if let Some(address) = &config.metrics_address {
        metrics::init_metrics(address.parse()?)?;
    }

    let client = ReqwestClient::new(&config.user_agent)?;
    let backend = Backend::new(Arc::new(client), Handle::current());
    let registry = EndpointRegistry::from_config(&config);
    let event_loop = EventLoop::start(&registry, backend)?;

    for bound in event_loop.bound() {
        tracing::info!(
            endpoint = %bound.name,
            mode = %bound.mode,
            address = %bound.local_addr,
            "Listening for connections"
        );
    }

    let signal = wait_for_shutdown_signal().await?;
    tracing::info!(signal, "Shutdown signal received");

    event_loop.stop();
    tokio::task::spawn_blocking(move || event_loop.join()).await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
