//! Session controller - lifecycle owner of the channels and the ledger
//!
//! `Idle -> Running -> ShuttingDown -> Stopped`. All methods take `&self`, so
//! the controller can be shared behind an `Arc` and shut down from any task.

use crate::domain::cart::{CartSummary, IngredientReport, ReconciliationResult};
use crate::domain::errors::{ConfigError, SessionError};
use crate::domain::types::{ScanOutcome, WeightState};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::catalog::ProductLookup;
use crate::io::scale::WeightSource;
use crate::io::scanner::SymbolSource;
use crate::io::Capabilities;
use crate::services::coordinator::{apply_scan, Coordinator};
use crate::services::ingredient_verifier::IngredientVerifier;
use crate::services::ledger::CartLedger;
use crate::services::reconciler::{reconcile, Reconciler};
use crate::services::scan_channel::ScanChannel;
use crate::services::weight_channel::{WeightChannel, WeightCommand};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    ShuttingDown,
    Stopped,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::ShuttingDown => "shutting_down",
            SessionState::Stopped => "stopped",
        }
    }
}

/// Sources waiting to be opened by `start()`
struct Sources {
    weight: Option<Box<dyn WeightSource>>,
    symbols: Option<Box<dyn SymbolSource>>,
}

/// Handles to the spawned loops
struct Running {
    shutdown_tx: watch::Sender<bool>,
    tare_tx: Option<mpsc::Sender<WeightCommand>>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

pub struct SessionController {
    id: Uuid,
    config: Config,
    state: Mutex<SessionState>,
    sources: Mutex<Option<Sources>>,
    running: Mutex<Option<Running>>,
    ledger: Arc<Mutex<CartLedger>>,
    lookup: Arc<dyn ProductLookup>,
    verifier: IngredientVerifier,
    metrics: Arc<Metrics>,
    weight_state_tx: Arc<watch::Sender<WeightState>>,
    result_tx: Arc<watch::Sender<Option<ReconciliationResult>>>,
}

impl SessionController {
    /// Build an idle session. Invalid settings are rejected here and only here.
    pub fn new(config: Config, capabilities: Capabilities) -> Result<Self, ConfigError> {
        config.validate()?;

        let Capabilities { weight, symbols, lookup, ingredients } = capabilities;
        let verifier = IngredientVerifier::new(ingredients, config.images_dir());
        let (weight_state_tx, _) = watch::channel(WeightState::Stable);
        let (result_tx, _) = watch::channel(None);

        let id = Uuid::now_v7();
        info!(session_id = %id, "session_created");

        Ok(Self {
            id,
            config,
            state: Mutex::new(SessionState::Idle),
            sources: Mutex::new(Some(Sources { weight, symbols })),
            running: Mutex::new(None),
            ledger: Arc::new(Mutex::new(CartLedger::new())),
            lookup,
            verifier,
            metrics: Arc::new(Metrics::new()),
            weight_state_tx: Arc::new(weight_state_tx),
            result_tx: Arc::new(result_tx),
        })
    }

    /// Open the sources and spawn the weight, scan and coordination loops.
    ///
    /// A no-op when already running. Fails with `SessionError::Starting` while
    /// another `start` is still opening sources, and with `SessionError::Init`
    /// if a configured source cannot be opened, in which case the session
    /// stays idle.
    pub async fn start(&self) -> Result<(), SessionError> {
        let mut sources = {
            let state = *self.state.lock();
            match state {
                SessionState::Running => {
                    warn!(session_id = %self.id, "session_already_running");
                    return Ok(());
                }
                SessionState::ShuttingDown | SessionState::Stopped => {
                    return Err(SessionError::Stopped);
                }
                SessionState::Idle => {}
            }
            match self.sources.lock().take() {
                Some(sources) => sources,
                None => {
                    warn!(session_id = %self.id, "session_start_in_progress");
                    return Err(SessionError::Starting);
                }
            }
        };

        if let Err(e) = Self::open_sources(&mut sources).await {
            error!(session_id = %self.id, error = %e, "session_start_failed");
            *self.sources.lock() = Some(sources);
            return Err(e);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::channel(self.config.event_buffer());
        let mut tasks = Vec::with_capacity(3);
        let mut tare_tx = None;

        if let Some(source) = sources.weight {
            let (command_tx, command_rx) = mpsc::channel(4);
            let channel = WeightChannel::new(
                source,
                self.config.weight_threshold_grams(),
                Duration::from_millis(self.config.weight_poll_interval_ms()),
                event_tx.clone(),
                command_rx,
                self.weight_state_tx.clone(),
                self.metrics.clone(),
            );
            tasks.push(("weight_channel", tokio::spawn(channel.run(shutdown_rx.clone()))));
            tare_tx = Some(command_tx);
        }

        if let Some(source) = sources.symbols {
            let channel = ScanChannel::new(
                source,
                Duration::from_millis(self.config.scanner_poll_interval_ms()),
                event_tx.clone(),
                self.metrics.clone(),
            );
            tasks.push(("scan_channel", tokio::spawn(channel.run(shutdown_rx.clone()))));
        }
        drop(event_tx);

        let verify_interval = self
            .config
            .verification_enabled()
            .then(|| Duration::from_millis(self.config.verify_interval_ms()));
        let coordinator = Coordinator::new(
            self.ledger.clone(),
            self.lookup.clone(),
            Reconciler::new(self.config.tolerance(), self.metrics.clone()),
            self.result_tx.clone(),
            self.metrics.clone(),
            verify_interval,
        );
        tasks.push(("coordinator", tokio::spawn(coordinator.run(event_rx, shutdown_rx))));

        *self.running.lock() = Some(Running { shutdown_tx, tare_tx, tasks });
        *self.state.lock() = SessionState::Running;
        info!(session_id = %self.id, "session_started");
        Ok(())
    }

    async fn open_sources(sources: &mut Sources) -> Result<(), SessionError> {
        if let Some(weight) = sources.weight.as_mut() {
            weight
                .open()
                .await
                .map_err(|source| SessionError::Init { component: "weight_sensor", source })?;
        }
        if let Some(symbols) = sources.symbols.as_mut() {
            if let Err(source) = symbols.open().await {
                if let Some(weight) = sources.weight.as_mut() {
                    weight.close().await;
                }
                return Err(SessionError::Init { component: "barcode_scanner", source });
            }
        }
        Ok(())
    }

    /// Stop every loop and wait a bounded time for each to finish.
    ///
    /// Safe to call repeatedly and from any task. Loops that do not finish in
    /// time are aborted and reported as abandoned.
    pub async fn shutdown(&self) {
        let running = {
            let mut state = self.state.lock();
            match *state {
                SessionState::Running => {
                    *state = SessionState::ShuttingDown;
                    self.running.lock().take()
                }
                other => {
                    debug!(session_id = %self.id, state = %other.as_str(), "shutdown_noop");
                    return;
                }
            }
        };

        info!(session_id = %self.id, "session_shutting_down");

        if let Some(running) = running {
            let _ = running.shutdown_tx.send(true);
            let join_timeout = Duration::from_millis(self.config.join_timeout_ms());

            for (name, mut task) in running.tasks {
                match tokio::time::timeout(join_timeout, &mut task).await {
                    Ok(Ok(())) => debug!(task = %name, "task_joined"),
                    Ok(Err(e)) => warn!(task = %name, error = %e, "task_failed"),
                    Err(_) => {
                        task.abort();
                        warn!(
                            task = %name,
                            timeout_ms = %join_timeout.as_millis(),
                            "task_abandoned"
                        );
                    }
                }
            }
        }

        *self.state.lock() = SessionState::Stopped;
        let summary = self.snapshot();
        info!(
            session_id = %self.id,
            items = %summary.items,
            actual_grams = %summary.actual_weight,
            expected_grams = %summary.expected_weight,
            total_price = %format!("{:.2}", summary.total_price),
            "session_stopped"
        );
    }

    /// Zero the scale and the ledger's actual weight.
    ///
    /// Only meaningful while running. The expected weight is left alone.
    pub async fn tare(&self) -> bool {
        if self.state() != SessionState::Running {
            warn!(session_id = %self.id, state = %self.state().as_str(), "tare_rejected");
            return false;
        }

        let Some(tare_tx) = self.running.lock().as_ref().and_then(|r| r.tare_tx.clone()) else {
            warn!(session_id = %self.id, "tare_unavailable");
            return false;
        };

        let timeout = Duration::from_millis(self.config.tare_timeout_ms());
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = tokio::time::timeout(timeout, tare_tx.send(WeightCommand::Tare { reply: reply_tx }));
        if !matches!(sent.await, Ok(Ok(()))) {
            warn!(session_id = %self.id, "tare_not_delivered");
            return false;
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(Some(epoch))) => {
                self.ledger.lock().tare(epoch);
                info!(session_id = %self.id, epoch = %epoch, "session_tared");
                true
            }
            Ok(Ok(None)) => false,
            _ => {
                warn!(session_id = %self.id, timeout_ms = %timeout.as_millis(), "tare_timed_out");
                false
            }
        }
    }

    /// Resolve a barcode and add the product to the cart
    pub fn on_scan(&self, barcode: &str) -> ScanOutcome {
        apply_scan(barcode, self.lookup.as_ref(), &self.ledger, &self.metrics)
    }

    /// Consistent point-in-time view of the cart
    pub fn snapshot(&self) -> CartSummary {
        self.ledger.lock().snapshot()
    }

    /// Names of cart products known to contain `ingredient`
    pub fn verify_ingredient(&self, ingredient: &str) -> Vec<String> {
        self.ingredient_report(ingredient).containing
    }

    /// Products containing `ingredient`, plus those that could not be checked
    pub fn ingredient_report(&self, ingredient: &str) -> IngredientReport {
        let products: Vec<_> = self.ledger.lock().items().iter().map(|i| i.product.clone()).collect();
        self.verifier.report(&products, ingredient)
    }

    /// Reconcile the current totals on demand
    pub fn reconciliation(&self) -> ReconciliationResult {
        let (actual, expected) = self.ledger.lock().weights();
        reconcile(actual, expected, self.config.tolerance())
    }

    /// Latest result published by the coordination loop
    pub fn subscribe(&self) -> watch::Receiver<Option<ReconciliationResult>> {
        self.result_tx.subscribe()
    }

    pub fn weight_state(&self) -> WeightState {
        *self.weight_state_tx.borrow()
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::catalog::InMemoryCatalog;

    fn session() -> (SessionController, crate::io::SimulationHandles) {
        let (capabilities, handles) = Capabilities::simulated(Arc::new(InMemoryCatalog::demo()));
        let config = Config::default().with_simulation(true).with_poll_intervals(5, 5);
        (SessionController::new(config, capabilities).unwrap(), handles)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (capabilities, _) = Capabilities::simulated(Arc::new(InMemoryCatalog::demo()));
        let config = Config::default().with_tolerance(-1.0);
        assert!(SessionController::new(config, capabilities).is_err());
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let (session, handles) = session();
        assert_eq!(session.state(), SessionState::Idle);

        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Running);
        session.start().await.unwrap();

        session.shutdown().await;
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(handles.scale.close_count(), 1);
        assert!(matches!(session.start().await, Err(SessionError::Stopped)));
    }

    #[tokio::test]
    async fn test_tare_requires_running() {
        let (session, _handles) = session();
        assert!(!session.tare().await);
    }

    #[tokio::test]
    async fn test_shutdown_while_idle_is_noop() {
        let (session, _handles) = session();
        session.shutdown().await;
        assert_eq!(session.state(), SessionState::Idle);
    }
}
