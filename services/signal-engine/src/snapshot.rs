//! Market snapshot - the input contract from the data-retrieval side
//!
//! The engine never fetches anything itself; every refresh cycle is
//! evaluated against an already-fetched snapshot deserialized from a
//! JSON file the data-retrieval collaborator drops for us.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::factors::FactorInputs;

/// One daily close
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosePoint {
    pub date: NaiveDate,
    pub close: Decimal,
}

/// Snapshot of everything the engine needs for one refresh cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Timestamp the snapshot was assembled
    pub as_of: DateTime<Utc>,
    /// Daily close series per underlying ticker, oldest first
    #[serde(default)]
    pub underlying_history: BTreeMap<String, Vec<ClosePoint>>,
    /// Latest price per leveraged ticker
    #[serde(default)]
    pub leveraged_prices: BTreeMap<String, Decimal>,
    /// Classified factor inputs; any of them may be missing
    #[serde(default)]
    pub factors: FactorInputs,
}

impl MarketSnapshot {
    /// Empty snapshot at a given timestamp
    pub fn empty(as_of: DateTime<Utc>) -> Self {
        Self {
            as_of,
            underlying_history: BTreeMap::new(),
            leveraged_prices: BTreeMap::new(),
            factors: FactorInputs::default(),
        }
    }

    /// Close series for an underlying, if the snapshot carries one
    pub fn history(&self, underlying: &str) -> Option<&[ClosePoint]> {
        self.underlying_history.get(underlying).map(|v| v.as_slice())
    }

    /// Latest price for a leveraged ticker
    pub fn leveraged_price(&self, leveraged: &str) -> Option<Decimal> {
        self.leveraged_prices.get(leveraged).copied()
    }
}
