//! Weight sources: serial load-cell scale and a simulated scale
//!
//! Serial protocol (continuous-output scale indicators):
//! - 8N1, configurable baud
//! - One ASCII frame per line, terminated by CR and/or LF
//! - Frame carries a signed decimal value and an optional unit suffix,
//!   e.g. `ST,GS,+  0205.0 g` or `  -12.5g` or `0.205 kg`
//! - The indicator streams frames continuously; the freshest complete frame wins

use crate::domain::errors::SensorError;
use crate::infra::config::Config;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// Maximum read attempts before a poll gives up
const MAX_READ_ATTEMPTS: usize = 20;

/// Per-attempt read timeout
const READ_TIMEOUT: Duration = Duration::from_millis(25);

/// Cap on buffered bytes without a line terminator
const MAX_BUFFER_LEN: usize = 256;

/// Source of raw weight readings in grams
#[async_trait]
pub trait WeightSource: Send {
    /// Device name used in logs
    fn name(&self) -> &str;

    /// Acquire the device. Failure here prevents the session from starting.
    async fn open(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    /// Read the current weight in grams
    async fn read(&mut self) -> Result<f64, SensorError>;

    /// Make the current load read as zero
    async fn tare(&mut self) -> Result<(), SensorError>;

    /// Release the device
    async fn close(&mut self) {}
}

/// Parse one scale frame into grams
pub fn parse_weight_frame(line: &str) -> Option<f64> {
    let bytes = line.as_bytes();
    let digit_start = bytes.iter().position(|b| b.is_ascii_digit())?;

    // Sign may be separated from the digits by padding spaces
    let negative = line[..digit_start].trim_end().ends_with('-');

    let digit_end = bytes[digit_start..]
        .iter()
        .position(|b| !(b.is_ascii_digit() || *b == b'.'))
        .map(|p| digit_start + p)
        .unwrap_or(bytes.len());

    let value: f64 = line[digit_start..digit_end].parse().ok()?;
    let unit = line[digit_end..].trim().to_ascii_lowercase();
    let factor = match unit.as_str() {
        "" | "g" => 1.0,
        "kg" => 1000.0,
        "lb" => 453.592,
        "oz" => 28.3495,
        _ => return None,
    };

    let grams = value * factor;
    Some(if negative { -grams } else { grams })
}

/// Drain every complete line from the buffer and return the last one.
/// Trailing partial data stays in the buffer for the next read.
fn take_latest_line(buffer: &mut Vec<u8>) -> Option<String> {
    let last_terminator = buffer.iter().rposition(|&b| b == b'\n' || b == b'\r')?;
    let complete: Vec<u8> = buffer.drain(..=last_terminator).collect();

    complete
        .split(|&b| b == b'\n' || b == b'\r')
        .filter(|l| !l.is_empty())
        .last()
        .map(|l| String::from_utf8_lossy(l).into_owned())
}

/// Load-cell indicator on a serial port
pub struct SerialScale {
    device: String,
    baud: u32,
    offset_grams: f64,
    reference_unit: f64,
    /// Software tare, in calibrated grams
    zero_grams: f64,
    port: Option<tokio_serial::SerialStream>,
    /// Persistent read buffer; frames can arrive split across reads
    read_buffer: Vec<u8>,
}

impl SerialScale {
    pub fn new(config: &Config) -> Self {
        Self {
            device: config.weight_device().to_string(),
            baud: config.weight_baud(),
            offset_grams: config.weight_offset_grams(),
            reference_unit: config.weight_reference_unit(),
            zero_grams: 0.0,
            port: None,
            read_buffer: Vec::with_capacity(MAX_BUFFER_LEN),
        }
    }

    #[inline]
    fn calibrate(&self, raw: f64) -> f64 {
        (raw - self.offset_grams) / self.reference_unit - self.zero_grams
    }

    /// Read until at least one complete frame is buffered
    async fn read_frame(&mut self) -> Result<String, SensorError> {
        let Some(port) = self.port.as_mut() else {
            return Err(SensorError::ReadFailure(format!("{} not open", self.device)));
        };

        let mut temp_buf = [0u8; 64];
        for _ in 0..MAX_READ_ATTEMPTS {
            if let Some(line) = take_latest_line(&mut self.read_buffer) {
                return Ok(line);
            }

            match tokio::time::timeout(READ_TIMEOUT, port.read(&mut temp_buf)).await {
                Ok(Ok(n)) if n > 0 => {
                    self.read_buffer.extend_from_slice(&temp_buf[..n]);
                    if self.read_buffer.len() > MAX_BUFFER_LEN {
                        debug!(discarded = self.read_buffer.len(), "scale_buffer_overflow");
                        self.read_buffer.clear();
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) if e.kind() == ErrorKind::TimedOut => {}
                Ok(Err(e)) => return Err(SensorError::Io(e)),
                Err(_) => {}
            }
        }

        Err(SensorError::ReadFailure(format!(
            "no complete frame after {} attempts",
            MAX_READ_ATTEMPTS
        )))
    }
}

#[async_trait]
impl WeightSource for SerialScale {
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

        info!(device = %self.device, baud = %self.baud, "scale_port_opened");
        self.port = Some(port);
        Ok(())
    }

    async fn read(&mut self) -> Result<f64, SensorError> {
        let line = self.read_frame().await?;
        let raw = parse_weight_frame(&line)
            .ok_or_else(|| SensorError::Malformed(line.clone()))?;
        Ok(self.calibrate(raw))
    }

    async fn tare(&mut self) -> Result<(), SensorError> {
        let current = self.read().await?;
        self.zero_grams += current;
        info!(device = %self.device, zero_grams = %self.zero_grams, "scale_tared");
        Ok(())
    }

    async fn close(&mut self) {
        if self.port.take().is_some() {
            info!(device = %self.device, "scale_port_closed");
        }
    }
}

#[derive(Debug, Default)]
struct SimulatedScaleState {
    /// Physical load on the platform
    load_grams: f64,
    /// Load that reads as zero
    zero_grams: f64,
    failing: bool,
    fail_open: bool,
    close_count: u32,
}

/// In-memory scale driven through a [`ScaleHandle`]
pub struct SimulatedScale {
    state: Arc<Mutex<SimulatedScaleState>>,
}

/// Control side of a [`SimulatedScale`]
#[derive(Clone)]
pub struct ScaleHandle {
    state: Arc<Mutex<SimulatedScaleState>>,
}

impl SimulatedScale {
    pub fn new() -> (Self, ScaleHandle) {
        let state = Arc::new(Mutex::new(SimulatedScaleState::default()));
        (Self { state: state.clone() }, ScaleHandle { state })
    }
}

impl ScaleHandle {
    /// Set the physical load on the platform
    pub fn set_load(&self, grams: f64) {
        let mut state = self.state.lock();
        debug!(from = %state.load_grams, to = %grams, "simulated_load_change");
        state.load_grams = grams;
    }

    /// Put an item on (positive) or take one off (negative)
    pub fn add_load(&self, grams: f64) {
        let mut state = self.state.lock();
        state.load_grams += grams;
    }

    pub fn load(&self) -> f64 {
        self.state.lock().load_grams
    }

    /// Make every read fail until cleared
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Make the next `open()` fail
    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    pub fn close_count(&self) -> u32 {
        self.state.lock().close_count
    }
}

#[async_trait]
impl WeightSource for SimulatedScale {
    fn name(&self) -> &str {
        "simulated-scale"
    }

    async fn open(&mut self) -> Result<(), SensorError> {
        if self.state.lock().fail_open {
            return Err(SensorError::Unavailable {
                device: self.name().to_string(),
                reason: "simulated open failure".to_string(),
            });
        }
        info!("simulated_scale_opened");
        Ok(())
    }

    async fn read(&mut self) -> Result<f64, SensorError> {
        let state = self.state.lock();
        if state.failing {
            return Err(SensorError::ReadFailure("simulated fault".to_string()));
        }
        Ok(state.load_grams - state.zero_grams)
    }

    async fn tare(&mut self) -> Result<(), SensorError> {
        let mut state = self.state.lock();
        if state.failing {
            warn!("simulated_tare_failed");
            return Err(SensorError::ReadFailure("simulated fault".to_string()));
        }
        state.zero_grams = state.load_grams;
        Ok(())
    }

    async fn close(&mut self) {
        self.state.lock().close_count += 1;
    }
}
