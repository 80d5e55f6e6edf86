//! mDNS CORS proxy.
//!
//! Lets a browser page reach devices on the local network: it serves the
//! mDNS services seen on the LAN as JSON and relays plain HTTP requests to
//! those devices, adding the CORS header browsers require.
//!
//! # Architecture Overview
//!
//! ```text
//! Browser
//!     → listener (accept, handle bound)
//!     → engine (one task, registry of handles)
//!     → http classify
//!           GET /mdns         → discovery cache snapshot → close
//!           OPTIONS           → fixed 204 preflight
//!           GET/POST /<host>  → connect origin → relay
//!
//! Device (origin)
//!     → relay → CORS rewrite → Browser
//!
//! Refresh timer
//!     → mdns-sd browse → discovery updates → cache
//! ```

use std::path::PathBuf;

use clap::Parser;

use mdns_cors_proxy::config::loader::{load_config, ConfigError};
use mdns_cors_proxy::config::validation::validate_config;
use mdns_cors_proxy::config::ProxyConfig;
use mdns_cors_proxy::discovery::{MdnsBrowser, NoDiscovery};
use mdns_cors_proxy::lifecycle::signals::spawn_signal_listener;
use mdns_cors_proxy::observability::{logging, metrics};
use mdns_cors_proxy::{Engine, ProxyError, Shutdown};

#[derive(Parser)]
#[command(name = "mdns-cors-proxy")]
#[command(about = "Serve LAN mDNS services and relay HTTP to them with CORS headers", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Override observability.log_level.
    #[arg(long)]
    log_level: Option<String>,
}

fn resolve_config(cli: &Cli) -> Result<ProxyConfig, ProxyError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }
    // Overrides bypass the loader, so validate again.
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    logging::init(&config.observability);
    tracing::info!("mdns-cors-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        }
    }

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    if config.discovery.enabled {
        let browser = MdnsBrowser::new(&config.discovery)?;
        Engine::bind(config, browser).await?.run(shutdown.subscribe()).await?;
    } else {
        tracing::info!("Discovery disabled");
        Engine::bind(config, NoDiscovery).await?.run(shutdown.subscribe()).await?;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
