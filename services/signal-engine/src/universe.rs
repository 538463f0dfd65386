//! Tracked universe of leveraged/underlying pairs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// One tracked leveraged instrument and the index it amplifies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairSpec {
    /// Leveraged instrument ticker (e.g. TQQQ)
    pub leveraged: String,
    /// Underlying index/asset ticker (e.g. QQQ)
    pub underlying: String,
    /// Human-readable name
    pub name: String,
    /// Sector bucket used for exposure limits
    pub sector: String,
    /// Leverage multiplier (e.g. 3)
    pub leverage: Decimal,
    /// Drawdown fraction that opens a SIGNAL
    pub entry_threshold: Decimal,
    /// Drawdown fraction that opens an ALERT (must be below entry)
    pub alert_threshold: Decimal,
    /// Unrealized P/L fraction that marks TARGET
    pub profit_target: Decimal,
}

impl PairSpec {
    /// Validate per-pair thresholds
    pub fn validate(&self) -> Result<()> {
        if self.alert_threshold >= self.entry_threshold {
            return Err(EngineError::Config(format!(
                "{}: alert threshold {} must be below entry threshold {}",
                self.leveraged, self.alert_threshold, self.entry_threshold
            )));
        }
        if self.entry_threshold <= Decimal::ZERO || self.entry_threshold >= Decimal::ONE {
            return Err(EngineError::Config(format!(
                "{}: entry threshold {} outside (0, 1)",
                self.leveraged, self.entry_threshold
            )));
        }
        if self.alert_threshold <= Decimal::ZERO {
            return Err(EngineError::Config(format!(
                "{}: alert threshold {} must be positive",
                self.leveraged, self.alert_threshold
            )));
        }
        if self.leverage < Decimal::ONE {
            return Err(EngineError::Config(format!(
                "{}: leverage {} below 1",
                self.leveraged, self.leverage
            )));
        }
        if self.profit_target <= Decimal::ZERO {
            return Err(EngineError::Config(format!(
                "{}: profit target {} must be positive",
                self.leveraged, self.profit_target
            )));
        }
        Ok(())
    }
}

fn pair(
    leveraged: &str,
    underlying: &str,
    name: &str,
    sector: &str,
    leverage: u32,
    entry_bps: i64,
    alert_bps: i64,
    target_bps: i64,
) -> PairSpec {
    PairSpec {
        leveraged: leveraged.to_string(),
        underlying: underlying.to_string(),
        name: name.to_string(),
        sector: sector.to_string(),
        leverage: Decimal::from(leverage),
        entry_threshold: Decimal::new(entry_bps, 4),
        alert_threshold: Decimal::new(alert_bps, 4),
        profit_target: Decimal::new(target_bps, 4),
    }
}

/// Default tracked universe
///
/// Thresholds are drawdown fractions of the underlying; more volatile
/// underlyings get deeper thresholds.
pub fn default_universe() -> Vec<PairSpec> {
    vec![
        pair("TQQQ", "QQQ", "Nasdaq-100 3x Bull", "nasdaq", 3, 500, 300, 1000),
        pair("UPRO", "SPY", "S&P 500 3x Bull", "sp500", 3, 500, 300, 1000),
        pair("SOXL", "SOXX", "Semiconductors 3x Bull", "semiconductors", 3, 800, 500, 1000),
        pair("TNA", "IWM", "Russell 2000 3x Bull", "smallcap", 3, 700, 400, 1000),
        pair("TECL", "XLK", "Tech 3x Bull", "technology", 3, 700, 400, 1000),
        pair("FAS", "XLF", "Financials 3x Bull", "financials", 3, 700, 400, 1000),
        pair("LABU", "XBI", "Biotech 3x Bull", "biotech", 3, 1000, 700, 1000),
        pair("UCO", "USO", "Oil 2x Bull", "energy", 2, 1000, 700, 1000),
    ]
}

/// Look up a pair by its leveraged ticker
pub fn find_pair<'a>(universe: &'a [PairSpec], leveraged: &str) -> Option<&'a PairSpec> {
    let wanted = leveraged.to_uppercase();
    universe.iter().find(|p| p.leveraged == wanted)
}

/// Deduplicated underlying tickers, in universe order
pub fn underlying_tickers(universe: &[PairSpec]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    universe
        .iter()
        .filter(|p| seen.insert(p.underlying.clone()))
        .map(|p| p.underlying.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_universe_is_valid() {
        let universe = default_universe();
        assert_eq!(universe.len(), 8);
        for p in &universe {
            p.validate().unwrap();
        }
    }

    #[test]
    fn test_find_pair_case_insensitive() {
        let universe = default_universe();
        let p = find_pair(&universe, "tqqq").unwrap();
        assert_eq!(p.underlying, "QQQ");
        assert!(find_pair(&universe, "ZZZZ").is_none());
    }

    #[test]
    fn test_alert_above_entry_rejected() {
        let mut p = default_universe().remove(0);
        p.alert_threshold = p.entry_threshold;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_underlying_tickers_dedup() {
        let mut universe = default_universe();
        let mut dup = universe[0].clone();
        dup.leveraged = "QLD".to_string();
        universe.push(dup);
        let tickers = underlying_tickers(&universe);
        assert_eq!(tickers.iter().filter(|t| *t == "QQQ").count(), 1);
    }
}
