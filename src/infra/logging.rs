//! Structured logging setup shared by the binaries
//!
//! `RUST_LOG` wins over the configured level; `--debug` forces debug.

use crate::infra::config::Config;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Safe to call more than once; later calls are ignored.
pub fn init(config: &Config, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level()))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);

    let result = if config.log_json() { builder.json().try_init() } else { builder.try_init() };
    if let Err(e) = result {
        eprintln!("Warning: logging already initialized: {e}");
    }
}
