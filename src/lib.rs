//! Smart kart library
//!
//! Sensor-fusion engine that reconciles a weight scale and a barcode reader
//! into one model of the cart. Exposes modules for integration testing and
//! binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
