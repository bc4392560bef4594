//! Infrastructure - configuration, logging and metrics
//!
//! - `config` - TOML configuration loading and validation
//! - `logging` - tracing subscriber setup
//! - `metrics` - lock-free counters with periodic reporting

pub mod config;
pub mod logging;
pub mod metrics;

pub use config::Config;
pub use metrics::Metrics;
