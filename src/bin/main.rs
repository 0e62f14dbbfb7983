//! tiller-dns binary entry point.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tiller_dns::{ddns, telemetry, Config, DnsServer, HealthChecker, LookupCache, Store};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Authoritative DNS server with weighted, geo-targeted and health-aware
/// answer selection.
#[derive(Parser, Debug)]
#[command(name = "tiller-dns")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML). Environment variables with the
    /// DNS_ prefix override file values.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;

    telemetry::init(&config).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        listen_addr = %config.listen_addr(),
        db_path = %config.db_path.display(),
        cache_ttl_seconds = config.cache_ttl_seconds,
        "Starting tiller-dns"
    );

    let store = Arc::new(Store::open(&config.db_path)?);
    let cache = LookupCache::new(config.cache_ttl());

    // Setup graceful shutdown
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for shutdown signal: {e}");
            }
            info!("shutdown signal received");
            cancel.cancel();
        }
    });

    // Background health probes
    let checker = HealthChecker::new(
        Arc::clone(&store),
        cache.clone(),
        config.health_interval(),
        config.health_timeout(),
    )?;
    let health_handle = tokio::spawn(checker.run(cancel.clone()));

    // Optional DDNS update endpoint
    let ddns_handle = config.update_listen.map(|listen| {
        let store = Arc::clone(&store);
        let cache = cache.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = ddns::serve(listen, store, cache, cancel).await {
                error!("DDNS endpoint error: {e}");
            }
        })
    });

    // Run DNS server until shutdown
    let server = DnsServer::new(config, store, cache);
    let result = server.run(cancel.clone()).await;

    cancel.cancel();
    let _ = health_handle.await;
    if let Some(handle) = ddns_handle {
        let _ = handle.await;
    }

    if let Err(e) = result {
        error!("DNS server error: {e}");
        return Err(e.into());
    }

    info!("tiller-dns shutdown complete");
    Ok(())
}
