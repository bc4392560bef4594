//! Shared types for the cart engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Newtype wrapper for product identifiers (the decoded barcode payload)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        ProductId(s.to_string())
    }
}

/// A single reading from the scale
#[derive(Debug, Clone, Copy)]
pub struct WeightSample {
    pub grams: f64,
    pub taken_at: Instant,
}

impl WeightSample {
    #[inline]
    pub fn new(grams: f64) -> Self {
        Self { grams, taken_at: Instant::now() }
    }
}

/// Classification of the scale relative to the last stable reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightState {
    Stable,
    Changing,
    ItemAdded,
    ItemRemoved,
    Error,
}

impl WeightState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightState::Stable => "stable",
            WeightState::Changing => "changing",
            WeightState::ItemAdded => "item_added",
            WeightState::ItemRemoved => "item_removed",
            WeightState::Error => "error",
        }
    }

    /// True for the two states that fire an add/remove event
    #[inline]
    pub fn is_transition(&self) -> bool {
        matches!(self, WeightState::ItemAdded | WeightState::ItemRemoved)
    }
}

/// Barcode symbology reported by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolType {
    Ean13,
    Ean8,
    UpcA,
    UpcE,
    Code39,
    Code128,
    QrCode,
    Unknown,
}

impl std::str::FromStr for SymbolType {
    type Err = std::convert::Infallible;

    /// Parses zbar-style decoder tags ("EAN13", "QRCODE", "UPCA", ...)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().replace('-', "").as_str() {
            "EAN13" => SymbolType::Ean13,
            "EAN8" => SymbolType::Ean8,
            "UPCA" | "UPC" => SymbolType::UpcA,
            "UPCE" => SymbolType::UpcE,
            "CODE39" => SymbolType::Code39,
            "CODE128" => SymbolType::Code128,
            "QRCODE" | "QR" => SymbolType::QrCode,
            _ => SymbolType::Unknown,
        })
    }
}

impl SymbolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolType::Ean13 => "EAN-13",
            SymbolType::Ean8 => "EAN-8",
            SymbolType::UpcA => "UPC-A",
            SymbolType::UpcE => "UPC-E",
            SymbolType::Code39 => "CODE39",
            SymbolType::Code128 => "CODE128",
            SymbolType::QrCode => "QRCODE",
            SymbolType::Unknown => "UNKNOWN",
        }
    }

    /// Map an AIM symbology identifier (`]E0`, `]C1`, ...) to a symbol type.
    ///
    /// Scanners configured to transmit the identifier prefix every payload with
    /// these three characters.
    pub fn from_aim_identifier(id: &str) -> Option<Self> {
        let mut chars = id.strip_prefix(']')?.chars();
        let code = chars.next()?;
        let modifier = chars.next()?;
        Some(match (code, modifier) {
            ('E', '0') => SymbolType::Ean13,
            ('E', '4') => SymbolType::Ean8,
            ('E', _) => SymbolType::UpcE,
            ('A', _) => SymbolType::Code39,
            ('C', _) => SymbolType::Code128,
            ('Q', _) => SymbolType::QrCode,
            _ => SymbolType::Unknown,
        })
    }

    /// Best-effort guess from the payload alone
    pub fn infer_from_payload(data: &str) -> Self {
        let all_digits = !data.is_empty() && data.bytes().all(|b| b.is_ascii_digit());
        match (all_digits, data.len()) {
            (true, 13) => SymbolType::Ean13,
            (true, 12) => SymbolType::UpcA,
            (true, 8) => SymbolType::Ean8,
            _ if data.contains("://") => SymbolType::QrCode,
            _ => SymbolType::Unknown,
        }
    }
}

/// A decoded symbol emitted by the scan channel
#[derive(Debug, Clone)]
pub struct ScanEvent {
    pub data: String,
    pub symbol_type: SymbolType,
    pub scanned_at: DateTime<Utc>,
}

impl ScanEvent {
    pub fn new(data: impl Into<String>, symbol_type: SymbolType) -> Self {
        Self { data: data.into(), symbol_type, scanned_at: Utc::now() }
    }
}

/// Product record as returned by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub unit_price: f64,
    pub unit_weight_grams: f64,
    #[serde(default)]
    pub ingredients: Option<Vec<String>>,
}

/// Outcome of resolving a scanned barcode against the catalog
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Added { name: String, expected_weight: f64 },
    NotFound,
}
