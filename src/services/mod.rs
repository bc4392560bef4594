//! Services - cart engine logic and state management
//!
//! This module contains the core services:
//! - `weight_channel` - Scale polling and weight-change classification
//! - `scan_channel` - Barcode polling
//! - `ledger` - Authoritative cart contents and running weights
//! - `reconciler` - Tolerance-based verification of actual vs expected weight
//! - `coordinator` - Single consumer of channel events
//! - `ingredient_verifier` - Ingredient checks across cart products
//! - `session` - Lifecycle owner exposed to the application

pub mod coordinator;
pub mod ingredient_verifier;
pub mod ledger;
pub mod reconciler;
pub mod scan_channel;
pub mod session;
pub mod weight_channel;

use crate::domain::types::ScanEvent;
use weight_channel::WeightEvent;

// Re-export commonly used types
pub use ledger::CartLedger;
pub use reconciler::{reconcile, Reconciler};
pub use session::{SessionController, SessionState};
pub use weight_channel::WeightClassifier;

/// Message sent by a channel loop to the coordinator
#[derive(Debug)]
pub enum ChannelEvent {
    Weight(WeightEvent),
    WeightFault { error: String },
    Scan(ScanEvent),
    ScanFault { error: String },
}
