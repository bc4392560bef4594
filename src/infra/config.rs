//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::errors::ConfigError;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SystemConfig {
    /// Use simulated scale and scanner instead of serial hardware
    #[serde(default)]
    pub simulation: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), json: false }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeightSensorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub device: String,
    pub baud: u32,
    /// Minimum difference from the last stable reading that counts as a change
    #[serde(default = "default_threshold_grams")]
    pub threshold_grams: f64,
    /// Calibration divisor applied to raw readings
    #[serde(default = "default_reference_unit")]
    pub reference_unit: f64,
    /// Subtracted from raw readings before calibration
    #[serde(default)]
    pub offset_grams: f64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BarcodeScannerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub device: String,
    pub baud: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeightVerificationConfig {
    /// When false, no reconciliation runs at all: neither on stable weight
    /// nor on the periodic pass
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Allowed discrepancy as a fraction of expected weight (0.1 = 10%)
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Period of the coordinator's verification pass
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
}

impl Default for WeightVerificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tolerance: default_tolerance(),
            interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngredientVerificationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Directory holding product label images (`<id>.jpg`)
    #[serde(default = "default_images_dir")]
    pub images_dir: String,
}

impl Default for IngredientVerificationConfig {
    fn default() -> Self {
        Self { enabled: true, images_dir: default_images_dir() }
    }
}

fn default_images_dir() -> String {
    "assets/images".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Bounded wait per loop on shutdown before it is abandoned
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
    /// Capacity of the channel feeding the coordinator
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    #[serde(default = "default_tare_timeout_ms")]
    pub tare_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            join_timeout_ms: default_join_timeout_ms(),
            event_buffer: default_event_buffer(),
            tare_timeout_ms: default_tare_timeout_ms(),
        }
    }
}

fn default_join_timeout_ms() -> u64 {
    1000
}

fn default_event_buffer() -> usize {
    256
}

fn default_tare_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CatalogConfig {
    /// JSON product catalog; the built-in demo catalog is used when absent
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_threshold_grams() -> f64 {
    10.0
}

fn default_reference_unit() -> f64 {
    1.0
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_tolerance() -> f64 {
    0.1
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub weight_sensor: WeightSensorConfig,
    pub barcode_scanner: BarcodeScannerConfig,
    #[serde(default)]
    pub weight_verification: WeightVerificationConfig,
    #[serde(default)]
    pub ingredient_verification: IngredientVerificationConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    simulation: bool,
    log_level: String,
    log_json: bool,
    weight_enabled: bool,
    weight_device: String,
    weight_baud: u32,
    weight_threshold_grams: f64,
    weight_reference_unit: f64,
    weight_offset_grams: f64,
    weight_poll_interval_ms: u64,
    scanner_enabled: bool,
    scanner_device: String,
    scanner_baud: u32,
    scanner_poll_interval_ms: u64,
    verification_enabled: bool,
    tolerance: f64,
    verify_interval_ms: u64,
    ingredients_enabled: bool,
    images_dir: String,
    join_timeout_ms: u64,
    event_buffer: usize,
    tare_timeout_ms: u64,
    catalog_file: Option<String>,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            simulation: false,
            log_level: default_log_level(),
            log_json: false,
            weight_enabled: true,
            weight_device: "/dev/ttyUSB0".to_string(),
            weight_baud: 9600,
            weight_threshold_grams: 10.0,
            weight_reference_unit: 1.0,
            weight_offset_grams: 0.0,
            weight_poll_interval_ms: 500,
            scanner_enabled: true,
            scanner_device: "/dev/ttyACM0".to_string(),
            scanner_baud: 9600,
            scanner_poll_interval_ms: 500,
            verification_enabled: true,
            tolerance: 0.1,
            verify_interval_ms: 500,
            ingredients_enabled: true,
            images_dir: default_images_dir(),
            join_timeout_ms: 1000,
            event_buffer: 256,
            tare_timeout_ms: 2000,
            catalog_file: None,
            metrics_interval_secs: 10,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            simulation: toml_config.system.simulation,
            log_level: toml_config.logging.level,
            log_json: toml_config.logging.json,
            weight_enabled: toml_config.weight_sensor.enabled,
            weight_device: toml_config.weight_sensor.device,
            weight_baud: toml_config.weight_sensor.baud,
            weight_threshold_grams: toml_config.weight_sensor.threshold_grams,
            weight_reference_unit: toml_config.weight_sensor.reference_unit,
            weight_offset_grams: toml_config.weight_sensor.offset_grams,
            weight_poll_interval_ms: toml_config.weight_sensor.poll_interval_ms,
            scanner_enabled: toml_config.barcode_scanner.enabled,
            scanner_device: toml_config.barcode_scanner.device,
            scanner_baud: toml_config.barcode_scanner.baud,
            scanner_poll_interval_ms: toml_config.barcode_scanner.poll_interval_ms,
            verification_enabled: toml_config.weight_verification.enabled,
            tolerance: toml_config.weight_verification.tolerance,
            verify_interval_ms: toml_config.weight_verification.interval_ms,
            ingredients_enabled: toml_config.ingredient_verification.enabled,
            images_dir: toml_config.ingredient_verification.images_dir,
            join_timeout_ms: toml_config.session.join_timeout_ms,
            event_buffer: toml_config.session.event_buffer,
            tare_timeout_ms: toml_config.session.tare_timeout_ms,
            catalog_file: toml_config.catalog.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> anyhow::Result<Self> {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    /// Load configuration from an explicit path.
    ///
    /// Only a missing file falls back to defaults. A file that exists but
    /// cannot be read or parsed is an error.
    pub fn load_from_path(path: &str) -> anyhow::Result<Self> {
        match Self::from_file(path) {
            Ok(config) => Ok(config),
            Err(e) if is_not_found(&e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Reject settings the engine cannot run with. Only called at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.weight_threshold_grams.is_finite() || self.weight_threshold_grams <= 0.0 {
            return Err(ConfigError::invalid(
                "weight_sensor.threshold_grams",
                format!("must be a positive number, got {}", self.weight_threshold_grams),
            ));
        }
        if !self.weight_reference_unit.is_finite() || self.weight_reference_unit == 0.0 {
            return Err(ConfigError::invalid(
                "weight_sensor.reference_unit",
                format!("must be a non-zero number, got {}", self.weight_reference_unit),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ConfigError::invalid(
                "weight_verification.tolerance",
                format!("must be a non-negative fraction, got {}", self.tolerance),
            ));
        }
        for (field, value) in [
            ("weight_sensor.poll_interval_ms", self.weight_poll_interval_ms),
            ("barcode_scanner.poll_interval_ms", self.scanner_poll_interval_ms),
            ("weight_verification.interval_ms", self.verify_interval_ms),
            ("session.join_timeout_ms", self.join_timeout_ms),
            ("session.tare_timeout_ms", self.tare_timeout_ms),
            ("metrics.interval_secs", self.metrics_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::invalid("session.event_buffer", "must be greater than zero"));
        }
        Ok(())
    }

    // Getters for all config fields
    pub fn simulation(&self) -> bool {
        self.simulation
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn log_json(&self) -> bool {
        self.log_json
    }

    pub fn weight_enabled(&self) -> bool {
        self.weight_enabled
    }

    pub fn weight_device(&self) -> &str {
        &self.weight_device
    }

    pub fn weight_baud(&self) -> u32 {
        self.weight_baud
    }

    pub fn weight_threshold_grams(&self) -> f64 {
        self.weight_threshold_grams
    }

    pub fn weight_reference_unit(&self) -> f64 {
        self.weight_reference_unit
    }

    pub fn weight_offset_grams(&self) -> f64 {
        self.weight_offset_grams
    }

    pub fn weight_poll_interval_ms(&self) -> u64 {
        self.weight_poll_interval_ms
    }

    pub fn scanner_enabled(&self) -> bool {
        self.scanner_enabled
    }

    pub fn scanner_device(&self) -> &str {
        &self.scanner_device
    }

    pub fn scanner_baud(&self) -> u32 {
        self.scanner_baud
    }

    pub fn scanner_poll_interval_ms(&self) -> u64 {
        self.scanner_poll_interval_ms
    }

    pub fn verification_enabled(&self) -> bool {
        self.verification_enabled
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn verify_interval_ms(&self) -> u64 {
        self.verify_interval_ms
    }

    pub fn ingredients_enabled(&self) -> bool {
        self.ingredients_enabled
    }

    pub fn images_dir(&self) -> &str {
        &self.images_dir
    }

    pub fn join_timeout_ms(&self) -> u64 {
        self.join_timeout_ms
    }

    pub fn event_buffer(&self) -> usize {
        self.event_buffer
    }

    pub fn tare_timeout_ms(&self) -> u64 {
        self.tare_timeout_ms
    }

    pub fn catalog_file(&self) -> Option<&str> {
        self.catalog_file.as_deref()
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder: switch to simulated sensors
    pub fn with_simulation(mut self, simulation: bool) -> Self {
        self.simulation = simulation;
        self
    }

    /// Builder: fast poll cadence, used by tests and the demo binary
    pub fn with_poll_intervals(mut self, weight_ms: u64, scanner_ms: u64) -> Self {
        self.weight_poll_interval_ms = weight_ms;
        self.scanner_poll_interval_ms = scanner_ms;
        self.verify_interval_ms = weight_ms;
        self
    }

    pub fn with_threshold_grams(mut self, grams: f64) -> Self {
        self.weight_threshold_grams = grams;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_weight_enabled(mut self, enabled: bool) -> Self {
        self.weight_enabled = enabled;
        self
    }

    pub fn with_join_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.join_timeout_ms = timeout_ms;
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    pub fn with_verification_enabled(mut self, enabled: bool) -> Self {
        self.verification_enabled = enabled;
        self
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
        .any(|io| io.kind() == std::io::ErrorKind::NotFound)
}
