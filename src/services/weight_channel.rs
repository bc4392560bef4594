//! Weight channel - polls the scale and classifies readings
//!
//! The channel is a single-task actor: polling, classification and tare all
//! run on the same task, so `tare` can never interleave with a classify step.
//! Every sample is forwarded to the coordinator tagged with the tare epoch it
//! was measured in.

use crate::domain::types::{WeightSample, WeightState};
use crate::infra::metrics::Metrics;
use crate::io::scale::WeightSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::ChannelEvent;

/// Classifies samples against the last stable reading
///
/// A reading that moves at least `threshold` away from the baseline fires
/// `ItemAdded`/`ItemRemoved` once and enters `Changing`. While changing, the
/// reading settles (and becomes the new baseline) as soon as it is back within
/// `threshold` of either the baseline or the previous sample.
#[derive(Debug, Clone)]
pub struct WeightClassifier {
    threshold: f64,
    last_stable: f64,
    previous: f64,
    changing: bool,
    state: WeightState,
}

impl WeightClassifier {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last_stable: 0.0,
            previous: 0.0,
            changing: false,
            state: WeightState::Stable,
        }
    }

    /// Classify one reading in grams
    pub fn classify(&mut self, grams: f64) -> WeightState {
        let diff = grams - self.last_stable;

        let state = if !self.changing {
            if diff.abs() < self.threshold {
                WeightState::Stable
            } else {
                self.changing = true;
                if diff > 0.0 {
                    WeightState::ItemAdded
                } else {
                    WeightState::ItemRemoved
                }
            }
        } else if diff.abs() < self.threshold || (grams - self.previous).abs() < self.threshold {
            // Change completed: commit the settled reading as the new baseline
            self.changing = false;
            self.last_stable = grams;
            WeightState::Stable
        } else {
            WeightState::Changing
        };

        self.previous = grams;
        self.state = state;
        state
    }

    /// Record a failed read. The baseline is left untouched.
    pub fn record_fault(&mut self) -> WeightState {
        self.state = WeightState::Error;
        self.state
    }

    /// Zero the baseline after a tare
    pub fn reset(&mut self) {
        self.last_stable = 0.0;
        self.previous = 0.0;
        self.changing = false;
        self.state = WeightState::Stable;
    }

    #[inline]
    pub fn state(&self) -> WeightState {
        self.state
    }

    #[inline]
    pub fn last_stable(&self) -> f64 {
        self.last_stable
    }
}

/// One classified reading
#[derive(Debug, Clone, Copy)]
pub struct WeightEvent {
    pub sample: WeightSample,
    pub state: WeightState,
    /// Difference from the baseline the sample was classified against
    pub delta: f64,
    /// Tare epoch the sample was measured in
    pub epoch: u64,
}

/// Commands accepted by the weight channel
#[derive(Debug)]
pub enum WeightCommand {
    /// Zero the scale; replies with the new tare epoch, or `None` on failure
    Tare { reply: oneshot::Sender<Option<u64>> },
}

/// Polling actor owning the weight source and the classifier
pub struct WeightChannel {
    source: Box<dyn WeightSource>,
    classifier: WeightClassifier,
    poll_interval: Duration,
    epoch: u64,
    event_tx: mpsc::Sender<ChannelEvent>,
    command_rx: mpsc::Receiver<WeightCommand>,
    state_tx: Arc<watch::Sender<WeightState>>,
    metrics: Arc<Metrics>,
    /// Fault already reported; cleared by the next good read
    faulted: bool,
}

impl WeightChannel {
    pub fn new(
        source: Box<dyn WeightSource>,
        threshold: f64,
        poll_interval: Duration,
        event_tx: mpsc::Sender<ChannelEvent>,
        command_rx: mpsc::Receiver<WeightCommand>,
        state_tx: Arc<watch::Sender<WeightState>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            source,
            classifier: WeightClassifier::new(threshold),
            poll_interval,
            epoch: 0,
            event_tx,
            command_rx,
            state_tx,
            metrics,
            faulted: false,
        }
    }

    /// Run until shutdown is signalled, then release the source
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            source = %self.source.name(),
            threshold_grams = %self.classifier.threshold,
            poll_interval_ms = %self.poll_interval.as_millis(),
            "weight_channel_started"
        );

        let mut poll_timer = interval(self.poll_interval);
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("weight_channel_shutdown");
                        break;
                    }
                }
                Some(command) = self.command_rx.recv() => {
                    match command {
                        WeightCommand::Tare { reply } => {
                            let result = self.tare().await;
                            // The tick due right now would race the reset; push it back
                            poll_timer.reset();
                            let _ = reply.send(result);
                        }
                    }
                }
                _ = poll_timer.tick() => {
                    self.poll().await;
                }
            }
        }

        self.source.close().await;
        info!("weight_channel_stopped");
    }

    async fn poll(&mut self) {
        match self.source.read().await {
            Ok(grams) => {
                if self.faulted {
                    self.faulted = false;
                    info!(source = %self.source.name(), "weight_sensor_recovered");
                }

                let baseline = self.classifier.last_stable();
                let state = self.classifier.classify(grams);
                let event = WeightEvent {
                    sample: WeightSample::new(grams),
                    state,
                    delta: grams - baseline,
                    epoch: self.epoch,
                };

                self.metrics.record_weight_sample();
                match state {
                    WeightState::ItemAdded => {
                        self.metrics.record_weight_added();
                        info!(grams = %grams, delta = %event.delta, "weight_item_added");
                    }
                    WeightState::ItemRemoved => {
                        self.metrics.record_weight_removed();
                        info!(grams = %grams, delta = %event.delta, "weight_item_removed");
                    }
                    WeightState::Changing => debug!(grams = %grams, "weight_changing"),
                    _ => trace!(grams = %grams, state = %state.as_str(), "weight_sample"),
                }

                self.publish_state(state);
                self.emit(ChannelEvent::Weight(event));
            }
            Err(e) => {
                self.metrics.record_weight_fault();
                let state = self.classifier.record_fault();
                if !self.faulted {
                    self.faulted = true;
                    warn!(source = %self.source.name(), error = %e, "weight_sensor_fault");
                } else {
                    debug!(error = %e, "weight_sensor_fault_repeated");
                }
                self.publish_state(state);
                self.emit(ChannelEvent::WeightFault { error: e.to_string() });
            }
        }
    }

    async fn tare(&mut self) -> Option<u64> {
        match self.source.tare().await {
            Ok(()) => {
                self.classifier.reset();
                self.epoch += 1;
                self.publish_state(WeightState::Stable);
                info!(epoch = %self.epoch, "weight_tared");
                Some(self.epoch)
            }
            Err(e) => {
                warn!(source = %self.source.name(), error = %e, "weight_tare_failed");
                None
            }
        }
    }

    fn publish_state(&self, state: WeightState) {
        self.state_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    fn emit(&self, event: ChannelEvent) {
        if self.event_tx.try_send(event).is_err() {
            self.metrics.record_event_dropped();
            debug!("weight_event_dropped");
        }
    }
}
