//! IO modules - hardware and collaborator interfaces
//!
//! This module contains every external capability the engine consumes:
//! - `scale` - weight sources (serial load cell, simulated)
//! - `scanner` - symbol sources (serial barcode reader, simulated)
//! - `catalog` - product lookup
//! - `ingredients` - label image ingredient analysis
//!
//! `Capabilities` bundles them. It is resolved once at startup, so nothing
//! downstream branches on simulation mode.

pub mod catalog;
pub mod ingredients;
pub mod scale;
pub mod scanner;

// Re-export commonly used types
pub use catalog::{InMemoryCatalog, ProductLookup};
pub use ingredients::{IngredientAnalysis, IngredientCheck, ImageHandle, SimulatedAnalyzer};
pub use scale::{ScaleHandle, SerialScale, SimulatedScale, WeightSource};
pub use scanner::{ScannerHandle, SerialScanner, SimulatedScanner, SymbolSource};

use crate::infra::config::Config;
use std::sync::Arc;
use tracing::info;

/// External capabilities handed to the session at construction
pub struct Capabilities {
    /// `None` when the weight sensor is disabled
    pub weight: Option<Box<dyn WeightSource>>,
    /// `None` when the barcode scanner is disabled
    pub symbols: Option<Box<dyn SymbolSource>>,
    pub lookup: Arc<dyn ProductLookup>,
    /// `None` when label analysis is unavailable
    pub ingredients: Option<Arc<dyn IngredientCheck>>,
}

/// Control handles for simulated sensors
#[derive(Clone)]
pub struct SimulationHandles {
    pub scale: ScaleHandle,
    pub scanner: ScannerHandle,
}

impl Capabilities {
    /// Fully simulated capability set around the given catalog
    pub fn simulated(lookup: Arc<dyn ProductLookup>) -> (Self, SimulationHandles) {
        let (scale, scale_handle) = SimulatedScale::new();
        let (scanner, scanner_handle) = SimulatedScanner::new();
        let capabilities = Self {
            weight: Some(Box::new(scale)),
            symbols: Some(Box::new(scanner)),
            lookup,
            ingredients: Some(Arc::new(SimulatedAnalyzer)),
        };
        (capabilities, SimulationHandles { scale: scale_handle, scanner: scanner_handle })
    }

    /// Resolve capabilities from configuration.
    ///
    /// Returns simulation handles when `system.simulation` is set.
    pub fn from_config(config: &Config) -> anyhow::Result<(Self, Option<SimulationHandles>)> {
        let lookup: Arc<dyn ProductLookup> = match config.catalog_file() {
            Some(path) => Arc::new(InMemoryCatalog::from_json_file(path)?),
            None => Arc::new(InMemoryCatalog::demo()),
        };

        let (mut capabilities, handles) = if config.simulation() {
            let (capabilities, handles) = Self::simulated(lookup);
            (capabilities, Some(handles))
        } else {
            let capabilities = Self {
                weight: Some(Box::new(SerialScale::new(config))),
                symbols: Some(Box::new(SerialScanner::new(config))),
                lookup,
                // No label analyzer ships with the hardware build
                ingredients: None,
            };
            (capabilities, None)
        };

        if !config.weight_enabled() {
            capabilities.weight = None;
        }
        if !config.scanner_enabled() {
            capabilities.symbols = None;
        }
        if !config.ingredients_enabled() {
            capabilities.ingredients = None;
        }

        info!(
            simulation = %config.simulation(),
            weight = ?capabilities.weight.as_ref().map(|w| w.name().to_string()),
            scanner = ?capabilities.symbols.as_ref().map(|s| s.name().to_string()),
            ingredients = %capabilities.ingredients.is_some(),
            "capabilities_resolved"
        );

        Ok((capabilities, handles))
    }
}
