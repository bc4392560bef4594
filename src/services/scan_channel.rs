//! Scan channel - polls the symbol source on its own cadence
//!
//! Every successful decode is forwarded, including repeats of the same
//! payload: scanning a barcode again means "one more unit".

use crate::domain::types::ScanEvent;
use crate::infra::metrics::Metrics;
use crate::io::scanner::SymbolSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::ChannelEvent;

pub struct ScanChannel {
    source: Box<dyn SymbolSource>,
    poll_interval: Duration,
    event_tx: mpsc::Sender<ChannelEvent>,
    metrics: Arc<Metrics>,
    faulted: bool,
}

impl ScanChannel {
    pub fn new(
        source: Box<dyn SymbolSource>,
        poll_interval: Duration,
        event_tx: mpsc::Sender<ChannelEvent>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { source, poll_interval, event_tx, metrics, faulted: false }
    }

    /// Run until shutdown is signalled, then release the source
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            source = %self.source.name(),
            poll_interval_ms = %self.poll_interval.as_millis(),
            "scan_channel_started"
        );

        let mut poll_timer = interval(self.poll_interval);
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scan_channel_shutdown");
                        break;
                    }
                }
                _ = poll_timer.tick() => {
                    if !self.poll(&mut shutdown).await {
                        info!("scan_channel_shutdown");
                        break;
                    }
                }
            }
        }

        self.source.close().await;
        info!("scan_channel_stopped");
    }

    /// Read once and forward the result. Returns false once shutdown is observed.
    async fn poll(&mut self, shutdown: &mut watch::Receiver<bool>) -> bool {
        match self.source.read().await {
            Ok(symbol) => {
                if self.faulted {
                    self.faulted = false;
                    info!(source = %self.source.name(), "scanner_recovered");
                }
                let Some((data, symbol_type)) = symbol else {
                    return true;
                };

                info!(data = %data, symbol = %symbol_type.as_str(), "symbol_decoded");
                return self.forward_scan(ScanEvent::new(data, symbol_type), shutdown).await;
            }
            Err(e) => {
                self.metrics.record_scanner_fault();
                if !self.faulted {
                    self.faulted = true;
                    warn!(source = %self.source.name(), error = %e, "scanner_fault");
                } else {
                    debug!(error = %e, "scanner_fault_repeated");
                }
                self.emit(ChannelEvent::ScanFault { error: e.to_string() });
            }
        }
        true
    }

    /// Decoded symbols are consumed from the reader, so they wait for queue
    /// space instead of being dropped. Shutdown still interrupts the wait.
    async fn forward_scan(&mut self, scan: ScanEvent, shutdown: &mut watch::Receiver<bool>) -> bool {
        let data = scan.data.clone();
        let send = self.event_tx.send(ChannelEvent::Scan(scan));
        tokio::pin!(send);

        loop {
            tokio::select! {
                sent = &mut send => {
                    if sent.is_err() {
                        self.metrics.record_event_dropped();
                        warn!(data = %data, "scan_event_undeliverable");
                    }
                    return true;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.metrics.record_event_dropped();
                        warn!(data = %data, "scan_event_abandoned_on_shutdown");
                        return false;
                    }
                }
            }
        }
    }

    /// Faults are advisory; drop them when the coordinator is behind
    fn emit(&self, event: ChannelEvent) {
        if self.event_tx.try_send(event).is_err() {
            self.metrics.record_event_dropped();
            debug!("scan_fault_dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::SymbolType;
    use crate::io::scanner::SimulatedScanner;

    #[tokio::test]
    async fn test_scan_channel_forwards_each_decode() {
        let (scanner, handle) = SimulatedScanner::new();
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let channel =
            ScanChannel::new(Box::new(scanner), Duration::from_millis(5), event_tx, Arc::new(Metrics::new()));

        handle.present("7501234567890", SymbolType::Ean13);
        handle.present("7501234567890", SymbolType::Ean13);
        let task = tokio::spawn(channel.run(shutdown_rx));

        for _ in 0..2 {
            let event = tokio::time::timeout(Duration::from_secs(1), event_rx.recv())
                .await
                .unwrap()
                .unwrap();
            match event {
                ChannelEvent::Scan(scan) => assert_eq!(scan.data, "7501234567890"),
                other => panic!("unexpected event {other:?}"),
            }
        }

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(handle.close_count(), 1);
    }

    #[tokio::test]
    async fn test_scan_channel_waits_for_queue_space() {
        let (scanner, handle) = SimulatedScanner::new();
        let metrics = Arc::new(Metrics::new());
        let (event_tx, mut event_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let channel =
            ScanChannel::new(Box::new(scanner), Duration::from_millis(1), event_tx, metrics.clone());

        for _ in 0..20 {
            handle.present("7501234567890", SymbolType::Ean13);
        }
        let task = tokio::spawn(channel.run(shutdown_rx));

        // Let the reader run ahead of a stalled consumer
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut received = 0;
        while received < 20 {
            let event = tokio::time::timeout(Duration::from_secs(1), event_rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(event, ChannelEvent::Scan(_)));
            received += 1;
        }
        assert_eq!(metrics.report().events_dropped_total, 0);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_scan_channel_stops_while_queue_full() {
        let (scanner, handle) = SimulatedScanner::new();
        let (event_tx, _event_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let channel = ScanChannel::new(
            Box::new(scanner),
            Duration::from_millis(1),
            event_tx,
            Arc::new(Metrics::new()),
        );

        handle.present("111", SymbolType::Ean8);
        handle.present("222", SymbolType::Ean8);
        let task = tokio::spawn(channel.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(20)).await;

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(handle.close_count(), 1);
    }

    #[tokio::test]
    async fn test_scan_channel_reports_faults() {
        let (scanner, handle) = SimulatedScanner::new();
        handle.set_failing(true);
        let metrics = Arc::new(Metrics::new());
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let channel = ScanChannel::new(Box::new(scanner), Duration::from_millis(5), event_tx, metrics);
        let task = tokio::spawn(channel.run(shutdown_rx));

        let event = tokio::time::timeout(Duration::from_secs(1), event_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, ChannelEvent::ScanFault { .. }));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
