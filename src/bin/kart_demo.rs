//! Scripted shopping session against simulated sensors
//!
//! Tares the scale, scans a book, an apple and a milk carton (placing the
//! matching weight on the scale after each), checks for milk, then shows what
//! happens when an unscanned item lands in the cart.
//!
//! Usage:
//!   cargo run --bin kart-demo -- --config config/dev.toml

use anyhow::Context;
use clap::Parser;
use smart_kart::domain::types::SymbolType;
use smart_kart::infra::{logging, Config};
use smart_kart::io::{Capabilities, SimulationHandles};
use smart_kart::services::SessionController;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "kart-demo")]
#[command(about = "Simulated shopping session for the smart kart engine")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Pause between steps in milliseconds
    #[arg(long, default_value = "1000")]
    step_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load_from_path(&args.config)?.with_simulation(true);
    logging::init(&config, args.debug);

    println!("\n{}", "=".repeat(60));
    println!("SMART KART SYSTEM TEST");
    println!("{}", "=".repeat(60));
    println!("All sensors are simulated, no hardware required.");
    println!("{}\n", "-".repeat(60));

    let (capabilities, handles) = Capabilities::from_config(&config)?;
    let handles = handles.context("simulation handles missing in simulation mode")?;
    let session = SessionController::new(config, capabilities)?;
    let step = Duration::from_millis(args.step_ms);

    session.start().await.context("Failed to start session")?;
    let result = run_script(&session, &handles, step).await;

    println!("\nShutting down...");
    session.shutdown().await;
    println!("Test complete.");
    result
}

async fn run_script(
    session: &SessionController,
    handles: &SimulationHandles,
    step: Duration,
) -> anyhow::Result<()> {
    tokio::time::sleep(step).await;

    println!("Taring the scale...");
    if !session.tare().await {
        anyhow::bail!("tare failed");
    }

    let items = [
        ("Design Patterns book", "9780201379624", 950.0),
        ("an Apple", "7501234567890", 200.0),
    ];
    for (label, barcode, grams) in items {
        scan_and_place(session, handles, label, barcode, grams, step).await;
    }

    check_ingredient(session, "milk");

    scan_and_place(session, handles, "a Milk carton", "5901234123457", 1000.0, step).await;
    check_ingredient(session, "milk");

    println!("\nSomething unscanned is dropped into the cart...");
    handles.scale.add_load(500.0);
    tokio::time::sleep(step).await;
    print_verdict(session);

    println!("\nShopping session complete!");
    println!("{}", "-".repeat(60));
    let summary = session.snapshot();
    println!("Final cart summary:");
    println!("  Items: {}", summary.items);
    println!("  Expected weight: {}g", summary.expected_weight);
    println!("  Actual weight: {}g", summary.actual_weight);
    println!("  Total price: ${:.2}", summary.total_price);
    Ok(())
}

async fn scan_and_place(
    session: &SessionController,
    handles: &SimulationHandles,
    label: &str,
    barcode: &str,
    grams: f64,
    step: Duration,
) {
    println!("\nShopper scans {label}...");
    handles.scanner.present(barcode, SymbolType::infer_from_payload(barcode));
    handles.scale.add_load(grams);
    tokio::time::sleep(step).await;

    let summary = session.snapshot();
    println!("Cart contains {} item(s):", summary.items);
    for product in &summary.products {
        println!("  - {product}");
    }
    println!("Expected weight: {}g", summary.expected_weight);
    println!("Total price: ${:.2}", summary.total_price);
    print_verdict(session);
}

fn check_ingredient(session: &SessionController, ingredient: &str) {
    println!("\nShopper checks if products contain {ingredient}...");
    let report = session.ingredient_report(ingredient);
    if report.containing.is_empty() {
        println!("None of the products in your cart contain {ingredient}.");
    } else {
        println!("The following products contain {ingredient}: {}", report.containing.join(", "));
    }
    if !report.unknown.is_empty() {
        println!("Could not check: {}", report.unknown.join(", "));
    }
}

fn print_verdict(session: &SessionController) {
    let result = session.reconciliation();
    let verdict = if result.verified { "VERIFIED" } else { "DISCREPANCY" };
    println!(
        "Weight check: {verdict} (actual {:.1}g, expected {:.1}g, allowed +/-{:.1}g)",
        result.actual_weight, result.expected_weight, result.allowed_tolerance
    );
}
