//! Symbol sources: serial barcode/QR reader and a simulated reader
//!
//! Serial readers in keyboard-less mode emit one decoded symbol per line,
//! CR and/or LF terminated. When the reader is configured to transmit AIM
//! symbology identifiers the payload is prefixed with `]` + code + modifier
//! (e.g. `]E0` for EAN-13); otherwise the symbology is inferred from the
//! payload shape.

use crate::domain::errors::SensorError;
use crate::domain::types::SymbolType;
use crate::infra::config::Config;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

/// How long a poll waits for bytes before reporting "nothing scanned"
const READ_TIMEOUT: Duration = Duration::from_millis(50);

const MAX_BUFFER_LEN: usize = 1024;

/// Decoded symbol: payload plus symbology
pub type DecodedSymbol = (String, SymbolType);

/// Source of decoded barcode/QR symbols
#[async_trait]
pub trait SymbolSource: Send {
    /// Device name used in logs
    fn name(&self) -> &str;

    /// Acquire the device. Failure here prevents the session from starting.
    async fn open(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    /// Return at most one decoded symbol. `Ok(None)` when nothing is in view.
    async fn read(&mut self) -> Result<Option<DecodedSymbol>, SensorError>;

    /// Release the device
    async fn close(&mut self) {}
}

/// Parse one reader line into a payload and symbology
pub fn parse_symbol_line(line: &str) -> Option<DecodedSymbol> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if line.starts_with(']') && line.len() > 3 {
        if let Some(symbol_type) = line.get(..3).and_then(SymbolType::from_aim_identifier) {
            let data = line[3..].to_string();
            return Some((data, symbol_type));
        }
    }

    Some((line.to_string(), SymbolType::infer_from_payload(line)))
}

/// Remove and return the first complete line, keeping the rest buffered
fn take_first_line(buffer: &mut Vec<u8>) -> Option<String> {
    loop {
        let end = buffer.iter().position(|&b| b == b'\n' || b == b'\r')?;
        let line: Vec<u8> = buffer.drain(..=end).collect();
        let line = &line[..line.len() - 1];
        if !line.is_empty() {
            return Some(String::from_utf8_lossy(line).into_owned());
        }
    }
}

/// Barcode reader on a serial (or USB CDC) port
pub struct SerialScanner {
    device: String,
    baud: u32,
    port: Option<tokio_serial::SerialStream>,
    /// Lines can arrive split across reads, and several can arrive at once
    read_buffer: Vec<u8>,
}

impl SerialScanner {
    pub fn new(config: &Config) -> Self {
        Self {
            device: config.scanner_device().to_string(),
            baud: config.scanner_baud(),
            port: None,
            read_buffer: Vec::with_capacity(128),
        }
    }

    fn next_buffered(&mut self) -> Option<DecodedSymbol> {
        while let Some(line) = take_first_line(&mut self.read_buffer) {
            if let Some(symbol) = parse_symbol_line(&line) {
                return Some(symbol);
            }
        }
        None
    }
}

#[async_trait]
impl SymbolSource for SerialScanner {
    fn name(&self) -> &str {
        &self.device
    }

    async fn open(&mut self) -> Result<(), SensorError> {
        let port = tokio_serial::new(&self.device, self.baud)
            .timeout(Duration::from_millis(100))
            .open_native_async()
            .map_err(|e| SensorError::Unavailable {
                device: self.device.clone(),
                reason: e.to_string(),
            })?;

        info!(device = %self.device, baud = %self.baud, "scanner_port_opened");
        self.port = Some(port);
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<DecodedSymbol>, SensorError> {
        // Symbols left over from a previous burst are surfaced one per poll
        if let Some(symbol) = self.next_buffered() {
            return Ok(Some(symbol));
        }

        let Some(port) = self.port.as_mut() else {
            return Err(SensorError::ReadFailure(format!("{} not open", self.device)));
        };

        let mut temp_buf = [0u8; 128];
        match tokio::time::timeout(READ_TIMEOUT, port.read(&mut temp_buf)).await {
            Ok(Ok(n)) if n > 0 => {
                self.read_buffer.extend_from_slice(&temp_buf[..n]);
                if self.read_buffer.len() > MAX_BUFFER_LEN {
                    debug!(discarded = self.read_buffer.len(), "scanner_buffer_overflow");
                    self.read_buffer.clear();
                }
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) if e.kind() == ErrorKind::TimedOut => {}
            Ok(Err(e)) => return Err(SensorError::Io(e)),
            Err(_) => {}
        }

        Ok(self.next_buffered())
    }

    async fn close(&mut self) {
        if self.port.take().is_some() {
            info!(device = %self.device, "scanner_port_closed");
        }
    }
}

#[derive(Debug, Default)]
struct SimulatedScannerState {
    /// Each frame may hold several symbols in view at once
    frames: VecDeque<Vec<DecodedSymbol>>,
    failing: bool,
    close_count: u32,
}

/// In-memory reader driven through a [`ScannerHandle`]
pub struct SimulatedScanner {
    state: Arc<Mutex<SimulatedScannerState>>,
}

/// Control side of a [`SimulatedScanner`]
#[derive(Clone)]
pub struct ScannerHandle {
    state: Arc<Mutex<SimulatedScannerState>>,
}

impl SimulatedScanner {
    pub fn new() -> (Self, ScannerHandle) {
        let state = Arc::new(Mutex::new(SimulatedScannerState::default()));
        (Self { state: state.clone() }, ScannerHandle { state })
    }
}

impl ScannerHandle {
    /// Hold a single symbol in front of the reader for one poll
    pub fn present(&self, data: &str, symbol_type: SymbolType) {
        debug!(data = %data, symbol = %symbol_type.as_str(), "simulated_scan");
        self.present_frame(vec![(data.to_string(), symbol_type)]);
    }

    /// Several symbols visible in the same frame
    pub fn present_frame(&self, symbols: Vec<DecodedSymbol>) {
        self.state.lock().frames.push_back(symbols);
    }

    pub fn pending(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    pub fn close_count(&self) -> u32 {
        self.state.lock().close_count
    }
}

#[async_trait]
impl SymbolSource for SimulatedScanner {
    fn name(&self) -> &str {
        "simulated-scanner"
    }

    async fn read(&mut self) -> Result<Option<DecodedSymbol>, SensorError> {
        let mut state = self.state.lock();
        if state.failing {
            return Err(SensorError::ReadFailure("simulated fault".to_string()));
        }
        // First symbol the decoder returned wins; the rest of the frame is dropped
        Ok(state.frames.pop_front().and_then(|frame| frame.into_iter().next()))
    }

    async fn close(&mut self) {
        self.state.lock().close_count += 1;
    }
}
