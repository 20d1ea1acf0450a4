//! Contract Cache
//!
//! Instrument metadata discovered at connect time, plus the spot symbols
//! that support margin trading. Read-only between instrument queries.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::domain::trading::{Contract, Product, round_to};

/// Margin mode sent with every order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeMode {
    /// Spot without borrowing.
    Cash,
    /// Cross margin.
    Cross,
}

impl TradeMode {
    /// Wire value of the `tdMode` field.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Cross => "cross",
        }
    }
}

/// Symbol-keyed contract metadata.
#[derive(Debug, Default)]
pub struct ContractCache {
    contracts: RwLock<HashMap<String, Contract>>,
    margin_spot: RwLock<HashSet<String>>,
}

impl ContractCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a contract.
    pub fn insert(&self, contract: Contract) {
        self.contracts
            .write()
            .insert(contract.symbol.clone(), contract);
    }

    /// Copy of the contract for `symbol`.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<Contract> {
        self.contracts.read().get(symbol).cloned()
    }

    /// Copies of every cached contract.
    #[must_use]
    pub fn all(&self) -> Vec<Contract> {
        self.contracts.read().values().cloned().collect()
    }

    /// Number of cached contracts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contracts.read().len()
    }

    /// Whether no contracts are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contracts.read().is_empty()
    }

    /// Record a spot symbol whose maximum leverage exceeds one.
    pub fn mark_margin_spot(&self, symbol: &str) {
        self.margin_spot.write().insert(symbol.to_string());
    }

    /// Whether `symbol` supports margin spot trading.
    #[must_use]
    pub fn is_margin_spot(&self, symbol: &str) -> bool {
        self.margin_spot.read().contains(symbol)
    }

    /// Margin mode for orders on `symbol`, or `None` for unknown symbols.
    #[must_use]
    pub fn trade_mode(&self, symbol: &str) -> Option<TradeMode> {
        let product = self.contracts.read().get(symbol)?.product;
        let mode = match product {
            Product::Spot if !self.is_margin_spot(symbol) => TradeMode::Cash,
            _ => TradeMode::Cross,
        };
        Some(mode)
    }

    /// Round a fill size to the contract's minimum volume.
    ///
    /// Unknown symbols pass the volume through unchanged.
    #[must_use]
    pub fn round_volume(&self, symbol: &str, volume: Decimal) -> Decimal {
        self.contracts
            .read()
            .get(symbol)
            .map_or(volume, |contract| round_to(volume, contract.min_volume))
    }
}
