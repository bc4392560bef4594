//! Domain models - core types of the cart engine
//!
//! This module contains the canonical data types used throughout the system:
//! - `types` - weight samples and states, scan events, products
//! - `cart` - cart items, summaries and reconciliation results
//! - `errors` - sensor, analysis, config and session errors

pub mod cart;
pub mod errors;
pub mod types;

// Re-export commonly used types at module level
pub use cart::{CartItem, CartSummary, IngredientReport, ReconciliationResult};
pub use errors::{AnalysisError, ConfigError, SensorError, SessionError};
pub use types::{
    Product, ProductId, ScanEvent, ScanOutcome, SymbolType, WeightSample, WeightState,
};
