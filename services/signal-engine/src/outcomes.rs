//! Trade outcome log - entry context capture and closed-trade records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::confidence::{ConfidenceAssessment, ConfidenceRating};
use crate::error::{EngineError, Result};
use crate::factors::FactorClass;

/// Entry-time context held until the trade closes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEntry {
    pub id: Uuid,
    pub ticker: String,
    pub underlying: String,
    pub entry_date: DateTime<Utc>,
    pub entry_price: Decimal,
    pub rating: ConfidenceRating,
    /// Factor classifications captured at entry, keyed by factor name
    pub factors_at_entry: BTreeMap<String, FactorClass>,
}

/// A closed trade; immutable once created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub id: Uuid,
    pub ticker: String,
    pub underlying: String,
    pub entry_date: DateTime<Utc>,
    pub exit_date: DateTime<Utc>,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub pl_fraction: Decimal,
    pub win: bool,
    pub rating_at_entry: ConfidenceRating,
    pub factors_at_entry: BTreeMap<String, FactorClass>,
}

/// The outcome log: pending entries keyed by ticker plus the
/// append-only list of closed trades
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcomeLog {
    #[serde(default)]
    pub pending: BTreeMap<String, PendingEntry>,
    #[serde(default)]
    pub closed: Vec<TradeOutcome>,
}

impl OutcomeLog {
    /// Record an entry with its confidence context
    pub fn record_entry(
        &mut self,
        ticker: &str,
        underlying: &str,
        entry_price: Decimal,
        assessment: &ConfidenceAssessment,
        now: DateTime<Utc>,
    ) -> &PendingEntry {
        let factors = assessment
            .factors
            .iter()
            .map(|f| (f.kind.name().to_string(), f.class))
            .collect();
        let entry = PendingEntry {
            id: Uuid::new_v4(),
            ticker: ticker.to_string(),
            underlying: underlying.to_string(),
            entry_date: now,
            entry_price,
            rating: assessment.rating,
            factors_at_entry: factors,
        };
        self.pending.insert(ticker.to_string(), entry);
        &self.pending[ticker]
    }

    /// Close out the pending entry for a ticker, appending the
    /// immutable outcome record
    pub fn record_exit(
        &mut self,
        ticker: &str,
        exit_price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<&TradeOutcome> {
        let entry = self
            .pending
            .remove(ticker)
            .ok_or_else(|| EngineError::UnknownTicker(ticker.to_string()))?;
        let pl_fraction = if entry.entry_price > Decimal::ZERO {
            (exit_price - entry.entry_price) / entry.entry_price
        } else {
            Decimal::ZERO
        };
        self.closed.push(TradeOutcome {
            id: entry.id,
            ticker: entry.ticker,
            underlying: entry.underlying,
            entry_date: entry.entry_date,
            exit_date: now,
            entry_price: entry.entry_price,
            exit_price,
            pl_fraction,
            win: pl_fraction > Decimal::ZERO,
            rating_at_entry: entry.rating,
            factors_at_entry: entry.factors_at_entry,
        });
        Ok(self.closed.last().expect("outcome just pushed"))
    }

    /// Closed outcomes for one ticker
    pub fn closed_for(&self, ticker: &str) -> Vec<&TradeOutcome> {
        self.closed.iter().filter(|o| o.ticker == ticker).collect()
    }

    pub fn win_count(&self) -> usize {
        self.closed.iter().filter(|o| o.win).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::assess;
    use crate::factors::{FactorContext, FactorInputs};

    fn assessment() -> ConfidenceAssessment {
        let inputs = FactorInputs::default();
        let ctx = FactorContext {
            drawdown: Decimal::new(6, 2),
            entry_threshold: Decimal::new(5, 2),
            inputs: &inputs,
            risk_check_passed: Some(true),
        };
        assess(&ctx)
    }

    #[test]
    fn test_entry_exit_roundtrip() {
        let mut log = OutcomeLog::default();
        log.record_entry("TQQQ", "QQQ", Decimal::from(40), &assessment(), Utc::now());
        assert!(log.pending.contains_key("TQQQ"));

        let outcome = log
            .record_exit("TQQQ", Decimal::from(44), Utc::now())
            .unwrap();
        assert_eq!(outcome.pl_fraction, Decimal::new(10, 2));
        assert!(outcome.win);
        assert_eq!(outcome.factors_at_entry.len(), 14);
        assert!(log.pending.is_empty());
        assert_eq!(log.closed.len(), 1);
    }

    #[test]
    fn test_exit_without_entry() {
        let mut log = OutcomeLog::default();
        let err = log
            .record_exit("TQQQ", Decimal::from(44), Utc::now())
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownTicker(_)));
    }

    #[test]
    fn test_losing_exit_marked() {
        let mut log = OutcomeLog::default();
        log.record_entry("TQQQ", "QQQ", Decimal::from(40), &assessment(), Utc::now());
        let outcome = log
            .record_exit("TQQQ", Decimal::from(36), Utc::now())
            .unwrap();
        assert!(!outcome.win);
        assert_eq!(outcome.pl_fraction, Decimal::new(-10, 2));
        assert_eq!(log.win_count(), 0);
    }

    #[test]
    fn test_closed_for_filters_by_ticker() {
        let mut log = OutcomeLog::default();
        log.record_entry("TQQQ", "QQQ", Decimal::from(40), &assessment(), Utc::now());
        log.record_exit("TQQQ", Decimal::from(44), Utc::now()).unwrap();
        log.record_entry("SOXL", "SOXX", Decimal::from(20), &assessment(), Utc::now());
        log.record_exit("SOXL", Decimal::from(18), Utc::now()).unwrap();

        assert_eq!(log.closed_for("TQQQ").len(), 1);
        assert_eq!(log.closed_for("SOXL").len(), 1);
        assert_eq!(log.closed_for("UPRO").len(), 0);
    }
}
