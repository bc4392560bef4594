//! Smart kart - cart reconciliation service
//!
//! Fuses a weight scale and a barcode reader into one model of the cart and
//! flags carts whose weight disagrees with the scanned items.
//!
//! Module structure:
//! - `domain/` - Core types (weights, scans, products, cart)
//! - `io/` - Sensor sources, catalog, ingredient analysis
//! - `services/` - Channels, ledger, reconciliation, session
//! - `infra/` - Infrastructure (Config, Logging, Metrics)

use anyhow::Context;
use clap::Parser;
use smart_kart::infra::{logging, Config};
use smart_kart::io::Capabilities;
use smart_kart::services::SessionController;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Smart kart - weight and barcode reconciliation for shopping carts
#[derive(Parser, Debug)]
#[command(name = "smart-kart", version, about)]
struct Args {
    /// Path to TOML configuration file (defaults to CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Use simulated sensors regardless of the configuration
    #[arg(long)]
    simulation: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load(&std::env::args().collect::<Vec<_>>())?,
    };
    let config = if args.simulation { config.with_simulation(true) } else { config };

    logging::init(&config, args.debug);
    info!(git_hash = %env!("GIT_HASH"), "smart-kart starting");

    info!(
        config_file = %config.config_file(),
        simulation = %config.simulation(),
        weight_device = %config.weight_device(),
        scanner_device = %config.scanner_device(),
        threshold_grams = %config.weight_threshold_grams(),
        tolerance = %config.tolerance(),
        "config_loaded"
    );

    let (capabilities, _handles) = Capabilities::from_config(&config)?;
    let metrics_interval = config.metrics_interval_secs();
    let session = Arc::new(SessionController::new(config, capabilities)?);

    session.start().await.context("Failed to start session")?;

    // Periodic metrics summary
    let metrics = session.metrics();
    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics.report().log();
        }
    });

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
    info!("shutdown_signal_received");

    reporter.abort();
    session.shutdown().await;

    let summary = session.snapshot();
    info!(
        items = %summary.items,
        products = ?summary.products,
        total_price = %format!("{:.2}", summary.total_price),
        "final_cart"
    );
    info!("smart-kart shutdown complete");
    Ok(())
}
