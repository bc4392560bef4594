//! End-to-end session tests against simulated sensors

use async_trait::async_trait;
use smart_kart::domain::errors::{SensorError, SessionError};
use smart_kart::domain::types::{Product, ProductId, ScanOutcome, SymbolType, WeightState};
use smart_kart::infra::Config;
use smart_kart::io::{Capabilities, InMemoryCatalog, SimulatedScanner, SimulationHandles, WeightSource};
use smart_kart::services::{SessionController, SessionState};
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL_MS: u64 = 5;

fn product(id: &str, name: &str, grams: f64, ingredients: Option<&[&str]>) -> Product {
    Product {
        id: ProductId::from(id),
        name: name.to_string(),
        unit_price: 2.0,
        unit_weight_grams: grams,
        ingredients: ingredients.map(|l| l.iter().map(|s| s.to_string()).collect()),
    }
}

fn test_config() -> Config {
    Config::default().with_simulation(true).with_poll_intervals(POLL_MS, POLL_MS)
}

fn session_with(products: Vec<Product>) -> (SessionController, SimulationHandles) {
    let (capabilities, handles) =
        Capabilities::simulated(Arc::new(InMemoryCatalog::with_products(products)));
    (SessionController::new(test_config(), capabilities).unwrap(), handles)
}

fn demo_session() -> (SessionController, SimulationHandles) {
    let (capabilities, handles) = Capabilities::simulated(Arc::new(InMemoryCatalog::demo()));
    (SessionController::new(test_config(), capabilities).unwrap(), handles)
}

/// Poll `condition` until it holds or two seconds pass
async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(POLL_MS)).await;
    }
    condition()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(POLL_MS * 10)).await;
}

#[tokio::test]
async fn test_sub_threshold_changes_fire_nothing() {
    let (session, handles) = demo_session();
    session.start().await.unwrap();

    for grams in [5.0, 8.0, -3.0, 9.0, 0.0] {
        handles.scale.set_load(grams);
        settle().await;
    }

    let metrics = session.metrics();
    assert_eq!(metrics.weight_added_total(), 0);
    assert_eq!(metrics.weight_removed_total(), 0);
    assert_eq!(session.weight_state(), WeightState::Stable);
    session.shutdown().await;
}

#[tokio::test]
async fn test_step_fires_exactly_one_item_added() {
    let (session, handles) = demo_session();
    session.start().await.unwrap();
    settle().await;

    handles.scale.set_load(205.0);
    assert!(wait_until(|| session.snapshot().actual_weight == 205.0).await);
    assert!(wait_until(|| session.weight_state() == WeightState::Stable).await);
    settle().await;

    assert_eq!(session.metrics().weight_added_total(), 1);
    session.shutdown().await;
}

#[tokio::test]
async fn test_tare_zeroes_actual_but_not_expected() {
    let (session, handles) = demo_session();
    session.start().await.unwrap();

    session.on_scan("7501234567890");
    handles.scale.set_load(300.0);
    assert!(wait_until(|| session.snapshot().actual_weight == 300.0).await);

    assert!(session.tare().await);
    let summary = session.snapshot();
    assert_eq!(summary.actual_weight, 0.0);
    assert_eq!(summary.expected_weight, 200.0);
    assert_eq!(session.weight_state(), WeightState::Stable);

    // Stale samples from before the tare never resurface
    settle().await;
    assert_eq!(session.snapshot().actual_weight, 0.0);
    session.shutdown().await;
}

#[tokio::test]
async fn test_tare_while_changing() {
    let (session, handles) = demo_session();
    session.start().await.unwrap();

    handles.scale.set_load(150.0);
    assert!(wait_until(|| session.metrics().weight_added_total() == 1).await);
    assert!(session.tare().await);
    assert_eq!(session.snapshot().actual_weight, 0.0);
    assert_eq!(session.weight_state(), WeightState::Stable);
    session.shutdown().await;
}

#[tokio::test]
async fn test_tare_rejected_when_not_running() {
    let (session, _handles) = demo_session();
    assert!(!session.tare().await);

    session.start().await.unwrap();
    session.shutdown().await;
    assert!(!session.tare().await);
}

#[tokio::test]
async fn test_empty_cart_reconciliation() {
    let (session, handles) = demo_session();
    let mut results = session.subscribe();
    session.start().await.unwrap();

    assert!(wait_until(|| results.borrow_and_update().is_some_and(|r| r.verified)).await);

    handles.scale.set_load(50.0);
    assert!(
        wait_until(|| {
            results
                .borrow_and_update()
                .is_some_and(|r| !r.verified && r.actual_weight == 50.0 && r.allowed_tolerance == 0.0)
        })
        .await
    );
    assert!(session.metrics().discrepancies_total() >= 1);
    session.shutdown().await;
}

#[tokio::test]
async fn test_scan_then_weight_scenario() {
    let (session, handles) = session_with(vec![product("A", "Item A", 200.0, None)]);
    let results = session.subscribe();
    session.start().await.unwrap();

    assert_eq!(
        session.on_scan("A"),
        ScanOutcome::Added { name: "Item A".to_string(), expected_weight: 200.0 }
    );

    handles.scale.set_load(205.0);
    assert!(
        wait_until(|| results.borrow().is_some_and(|r| r.actual_weight == 205.0 && r.verified)).await
    );
    let result = session.reconciliation();
    assert_eq!(result.difference, 5.0);
    assert!(result.verified);

    handles.scale.set_load(400.0);
    assert!(
        wait_until(|| results.borrow().is_some_and(|r| r.actual_weight == 400.0 && !r.verified))
            .await
    );
    assert!(!session.reconciliation().verified);
    session.shutdown().await;
}

#[tokio::test]
async fn test_disabled_verification_never_reconciles() {
    let config = test_config().with_verification_enabled(false);
    let (capabilities, handles) = Capabilities::simulated(Arc::new(InMemoryCatalog::demo()));
    let session = SessionController::new(config, capabilities).unwrap();
    let results = session.subscribe();
    session.start().await.unwrap();

    session.on_scan("7501234567890");
    handles.scale.set_load(900.0);
    assert!(wait_until(|| session.snapshot().actual_weight == 900.0).await);
    assert!(wait_until(|| session.weight_state() == WeightState::Stable).await);
    settle().await;

    assert!(results.borrow().is_none());
    assert_eq!(session.metrics().discrepancies_total(), 0);
    session.shutdown().await;
}

#[tokio::test]
async fn test_item_removed_keeps_ledger_entry() {
    let (session, handles) = session_with(vec![product("A", "Item A", 200.0, None)]);
    session.start().await.unwrap();

    session.on_scan("A");
    handles.scale.set_load(200.0);
    assert!(wait_until(|| session.snapshot().actual_weight == 200.0).await);

    handles.scale.set_load(0.0);
    assert!(wait_until(|| session.metrics().weight_removed_total() == 1).await);
    assert_eq!(session.snapshot().items, 1);
    assert!(wait_until(|| !session.reconciliation().verified).await);
    session.shutdown().await;
}

#[tokio::test]
async fn test_double_shutdown_releases_once() {
    let (session, handles) = demo_session();
    session.start().await.unwrap();

    settle().await;

    // Loops that exit cleanly finish well inside the join timeout
    let started = Instant::now();
    session.shutdown().await;
    assert!(started.elapsed() < Duration::from_millis(500));
    session.shutdown().await;

    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(handles.scale.close_count(), 1);
    assert_eq!(handles.scanner.close_count(), 1);
}

#[tokio::test]
async fn test_rescan_adds_second_unit() {
    let (session, handles) = demo_session();
    session.start().await.unwrap();

    handles.scanner.present("7501234567890", SymbolType::Ean13);
    handles.scanner.present("7501234567890", SymbolType::Ean13);
    assert!(wait_until(|| session.snapshot().items == 2).await);

    let summary = session.snapshot();
    assert_eq!(summary.expected_weight, 400.0);
    assert_eq!(summary.products, vec!["Apple", "Apple"]);
    session.shutdown().await;
}

#[tokio::test]
async fn test_rescan_burst_survives_small_event_buffer() {
    let config = Config::default().with_simulation(true).with_poll_intervals(1, 1).with_event_buffer(1);
    let (capabilities, handles) = Capabilities::simulated(Arc::new(InMemoryCatalog::demo()));
    let session = SessionController::new(config, capabilities).unwrap();
    session.start().await.unwrap();

    for _ in 0..200 {
        handles.scanner.present("7501234567890", SymbolType::Ean13);
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while session.snapshot().items < 200 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let summary = session.snapshot();
    assert_eq!(summary.items, 200);
    assert_eq!(summary.expected_weight, 200.0 * 200.0);
    assert_eq!(session.metrics().scans_total(), 200);
    session.shutdown().await;
}

#[tokio::test]
async fn test_unknown_barcode() {
    let (session, handles) = demo_session();
    session.start().await.unwrap();

    assert_eq!(session.on_scan("0000000000000"), ScanOutcome::NotFound);
    handles.scanner.present("1111111111111", SymbolType::Ean13);
    assert!(wait_until(|| session.metrics().scans_unknown_total() == 2).await);

    let summary = session.snapshot();
    assert_eq!(summary.items, 0);
    assert_eq!(summary.expected_weight, 0.0);
    session.shutdown().await;
}

#[tokio::test]
async fn test_sensor_faults_do_not_stop_session() {
    let (session, handles) = demo_session();
    session.start().await.unwrap();

    handles.scale.set_failing(true);
    handles.scanner.set_failing(true);
    assert!(wait_until(|| session.weight_state() == WeightState::Error).await);
    assert!(wait_until(|| session.metrics().scanner_faults_total() > 0).await);
    assert_eq!(session.state(), SessionState::Running);

    handles.scale.set_failing(false);
    handles.scanner.set_failing(false);
    assert!(wait_until(|| session.weight_state() == WeightState::Stable).await);

    handles.scanner.present("5901234123457", SymbolType::Ean13);
    assert!(wait_until(|| session.snapshot().items == 1).await);
    assert!(session.metrics().weight_faults_total() > 0);
    session.shutdown().await;
}

#[tokio::test]
async fn test_open_failure_prevents_start() {
    let (session, handles) = demo_session();
    handles.scale.set_fail_open(true);

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, SessionError::Init { component: "weight_sensor", .. }));
    assert_eq!(session.state(), SessionState::Idle);

    handles.scale.set_fail_open(false);
    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Running);
    session.shutdown().await;
}

#[tokio::test]
async fn test_verify_ingredient() {
    let (session, _handles) = session_with(vec![
        product("5901234123457", "Milk", 1000.0, Some(&["Milk", "Vitamin D"])),
        product("9780201379624", "Design Patterns", 950.0, Some(&[])),
        product("bread_loaf", "Bread", 500.0, None),
    ]);

    session.on_scan("9780201379624");
    assert!(session.verify_ingredient("milk").is_empty());

    session.on_scan("5901234123457");
    session.on_scan("5901234123457");
    assert_eq!(session.verify_ingredient("milk"), vec!["Milk"]);

    // No list in the catalog: analysed from the label image
    session.on_scan("bread_loaf");
    assert_eq!(session.verify_ingredient("gluten"), vec!["Bread"]);
}

#[tokio::test]
async fn test_disabled_ingredient_analysis_reports_unknown() {
    let config = test_config();
    let (mut capabilities, _handles) = Capabilities::simulated(Arc::new(InMemoryCatalog::with_products([
        product("bar", "Protein Bar", 60.0, None),
    ])));
    capabilities.ingredients = None;
    let session = SessionController::new(config, capabilities).unwrap();

    session.on_scan("bar");
    let report = session.ingredient_report("milk");
    assert!(report.containing.is_empty());
    assert_eq!(report.unknown, vec!["Protein Bar"]);
}

#[tokio::test]
async fn test_without_weight_sensor() {
    let config = test_config().with_weight_enabled(false);
    let (capabilities, handles) = Capabilities::from_config(&config).unwrap();
    assert!(capabilities.weight.is_none());
    let handles = handles.unwrap();
    let session = SessionController::new(config, capabilities).unwrap();
    session.start().await.unwrap();

    assert!(!session.tare().await);
    handles.scanner.present("7501234567890", SymbolType::Ean13);
    assert!(wait_until(|| session.snapshot().items == 1).await);
    session.shutdown().await;
}

/// Scale whose reads never complete
struct HangingScale;

#[async_trait]
impl WeightSource for HangingScale {
    fn name(&self) -> &str {
        "hanging-scale"
    }

    async fn read(&mut self) -> Result<f64, SensorError> {
        std::future::pending().await
    }

    async fn tare(&mut self) -> Result<(), SensorError> {
        Ok(())
    }
}

/// Scale that takes a while to open
struct SlowOpenScale;

#[async_trait]
impl WeightSource for SlowOpenScale {
    fn name(&self) -> &str {
        "slow-open-scale"
    }

    async fn open(&mut self) -> Result<(), SensorError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }

    async fn read(&mut self) -> Result<f64, SensorError> {
        Ok(0.0)
    }

    async fn tare(&mut self) -> Result<(), SensorError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_concurrent_start_is_rejected() {
    let (scanner, _scanner_handle) = SimulatedScanner::new();
    let capabilities = Capabilities {
        weight: Some(Box::new(SlowOpenScale)),
        symbols: Some(Box::new(scanner)),
        lookup: Arc::new(InMemoryCatalog::demo()),
        ingredients: None,
    };
    let session = SessionController::new(test_config(), capabilities).unwrap();

    let (first, second) = tokio::join!(session.start(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let state = session.state();
        (state, session.start().await)
    });

    first.unwrap();
    let (state_during_open, second) = second;
    assert_eq!(state_during_open, SessionState::Idle);
    assert!(matches!(second, Err(SessionError::Starting)));
    assert_eq!(session.state(), SessionState::Running);
    session.shutdown().await;
}

#[tokio::test]
async fn test_stuck_channel_is_abandoned() {
    let (scanner, _scanner_handle) = SimulatedScanner::new();
    let capabilities = Capabilities {
        weight: Some(Box::new(HangingScale)),
        symbols: Some(Box::new(scanner)),
        lookup: Arc::new(InMemoryCatalog::demo()),
        ingredients: None,
    };
    let config = test_config().with_join_timeout_ms(100);
    let session = SessionController::new(config, capabilities).unwrap();
    session.start().await.unwrap();
    settle().await;

    let started = Instant::now();
    session.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(session.state(), SessionState::Stopped);
}
