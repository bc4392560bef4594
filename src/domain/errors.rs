//! Error taxonomy shared by the sensors, the catalog side and the session

use thiserror::Error;

/// Weight or symbol source could not be read (or opened)
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor {device} could not be opened: {reason}")]
    Unavailable { device: String, reason: String },

    #[error("sensor read failed: {0}")]
    ReadFailure(String),

    #[error("malformed sensor frame: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Label image analysis could not produce an ingredient list
#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("ingredient analysis unavailable: {0}")]
    Unavailable(String),

    #[error("label image not readable: {0}")]
    ImageUnreadable(String),
}

/// Settings rejected at startup
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid configuration: {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid { field, reason: reason.into() }
    }
}

/// Session lifecycle failures surfaced to the caller of `start()`
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to initialize {component}: {source}")]
    Init {
        component: &'static str,
        #[source]
        source: SensorError,
    },

    #[error("session start already in progress")]
    Starting,

    #[error("session already stopped")]
    Stopped,
}
