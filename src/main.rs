//! Document Proxy
//!
//! A masking reverse proxy for document attachments, built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────────────┐
//!                         │                     DOCUMENT PROXY                        │
//!                         │                                                           │
//!   Client Request        │  ┌─────────┐   ┌──────────┐   ┌───────────┐   ┌────────┐ │
//!   ──────────────────────┼─▶│ routing │──▶│ security │──▶│ security  │──▶│upstream│─┼──▶ Object
//!   /document/{d}/        │  │ router  │   │identifier│   │rate_limit │   │dispatch│ │    Storage
//!     attachment/{a}      │  └────┬────┘   └────┬─────┘   └─────┬─────┘   └───┬────┘ │
//!                         │       │ /health     │               │             │      │
//!                         │       ▼             ▼               ▼             ▼      │
//!   Client Response       │  ┌──────────────────────────────────────┐   ┌─────────┐  │
//!   ◀─────────────────────┼──│  error (uniform JSON envelope)       │   │response │  │
//!   ◀─────────────────────┼──┼──────────────────────────────────────┼───│transform│◀─┤
//!                         │  └──────────────────────────────────────┘   └─────────┘  │
//!                         │                                                           │
//!                         │   config · observability · lifecycle (cross-cutting)     │
//!                         └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use document_proxy::config::{load_config, loader, ProxyConfig};
use document_proxy::observability::{logging, metrics};
use document_proxy::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "document-proxy")]
#[command(about = "Masked document and attachment proxy for object storage", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long, env = "DOCPROXY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => loader::finalize(ProxyConfig::default(), |key| std::env::var(key).ok())?,
    };

    logging::init_logging(&config.observability);

    tracing::info!("document-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        rate_limit_capacity = config.rate_limit.capacity,
        rate_limit_refill = config.rate_limit.refill_per_second,
        response_timeout_ms = config.timeouts.response_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        // Validation guarantees the address parses.
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
