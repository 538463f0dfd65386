//! Outcome-driven factor weights
//!
//! Recompute is a full replace over the entire closed-outcome log:
//! deterministic, idempotent, and published as one table so readers
//! never see a partial update.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::factors::{FactorClass, FactorKind, ALL_FACTORS};
use crate::outcomes::OutcomeLog;

/// Learned predictive weight for one factor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorWeight {
    pub factor: FactorKind,
    /// Win-rate differential: rate(FAVORABLE at entry) - rate(not)
    pub weight: Decimal,
    pub favorable_wins: u32,
    pub favorable_total: u32,
    pub complement_wins: u32,
    pub complement_total: u32,
}

impl FactorWeight {
    /// Outcomes backing this estimate
    pub fn samples(&self) -> u32 {
        self.favorable_total + self.complement_total
    }
}

/// The full factor-weight table, replaced atomically on recompute
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeightTable {
    pub computed_at: Option<DateTime<Utc>>,
    pub trade_count: usize,
    #[serde(default)]
    pub weights: BTreeMap<FactorKind, FactorWeight>,
}

impl WeightTable {
    pub fn get(&self, factor: FactorKind) -> Option<&FactorWeight> {
        self.weights.get(&factor)
    }

    pub fn insert(&mut self, weight: FactorWeight) {
        self.weights.insert(weight.factor, weight);
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

// Win rate with the empty-partition convention: no samples reads as a
// coin flip so the differential stays bounded and unexcited.
fn win_rate(wins: u32, total: u32) -> Decimal {
    if total == 0 {
        Decimal::new(5, 1)
    } else {
        Decimal::from(wins) / Decimal::from(total)
    }
}

/// Rebuild the weight table from every closed outcome in the log.
///
/// For each factor the closed trades are partitioned into
/// FAVORABLE-at-entry vs everything else (NEUTRAL, UNFAVORABLE, or
/// absent from the entry capture); the weight is the win-rate
/// difference between the two groups.
pub fn recompute(log: &OutcomeLog, now: DateTime<Utc>) -> WeightTable {
    let mut table = WeightTable {
        computed_at: Some(now),
        trade_count: log.closed.len(),
        weights: BTreeMap::new(),
    };
    if log.closed.is_empty() {
        return table;
    }

    for factor in ALL_FACTORS {
        let mut favorable_wins = 0u32;
        let mut favorable_total = 0u32;
        let mut complement_wins = 0u32;
        let mut complement_total = 0u32;

        for outcome in &log.closed {
            let favorable = outcome
                .factors_at_entry
                .get(factor.name())
                .map(|c| *c == FactorClass::Favorable)
                .unwrap_or(false);
            if favorable {
                favorable_total += 1;
                if outcome.win {
                    favorable_wins += 1;
                }
            } else {
                complement_total += 1;
                if outcome.win {
                    complement_wins += 1;
                }
            }
        }

        let weight = win_rate(favorable_wins, favorable_total)
            - win_rate(complement_wins, complement_total);
        table.insert(FactorWeight {
            factor,
            weight,
            favorable_wins,
            favorable_total,
            complement_wins,
            complement_total,
        });
    }
    table
}

/// Human-readable learning summary
#[derive(Debug, Clone, Serialize)]
pub struct LearningSummary {
    pub trade_count: usize,
    pub win_count: usize,
    pub win_rate: Decimal,
    pub avg_pl_fraction: Decimal,
    pub top_factor: Option<FactorKind>,
}

/// Summarize the log and weight table, or None without closed trades
pub fn summarize(log: &OutcomeLog, table: &WeightTable) -> Option<LearningSummary> {
    if log.closed.is_empty() {
        return None;
    }
    let n = Decimal::from(log.closed.len());
    let wins = log.win_count();
    let avg_pl = log.closed.iter().map(|o| o.pl_fraction).sum::<Decimal>() / n;
    let top = table
        .weights
        .values()
        .max_by(|a, b| a.weight.cmp(&b.weight))
        .map(|w| w.factor);
    Some(LearningSummary {
        trade_count: log.closed.len(),
        win_count: wins,
        win_rate: Decimal::from(wins) / n,
        avg_pl_fraction: avg_pl,
        top_factor: top,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ConfidenceRating;
    use crate::outcomes::TradeOutcome;
    use uuid::Uuid;

    fn outcome(win: bool, drawdown_favorable: bool) -> TradeOutcome {
        let mut factors = BTreeMap::new();
        factors.insert(
            FactorKind::DrawdownDepth.name().to_string(),
            if drawdown_favorable {
                FactorClass::Favorable
            } else {
                FactorClass::Neutral
            },
        );
        factors.insert(
            FactorKind::YieldCurve.name().to_string(),
            FactorClass::Neutral,
        );
        let pl = if win {
            Decimal::new(10, 2)
        } else {
            Decimal::new(-10, 2)
        };
        TradeOutcome {
            id: Uuid::new_v4(),
            ticker: "TQQQ".to_string(),
            underlying: "QQQ".to_string(),
            entry_date: Utc::now(),
            exit_date: Utc::now(),
            entry_price: Decimal::from(40),
            exit_price: Decimal::from(40) * (Decimal::ONE + pl),
            pl_fraction: pl,
            win,
            rating_at_entry: ConfidenceRating::Medium,
            factors_at_entry: factors,
        }
    }

    fn log_with(outcomes: Vec<TradeOutcome>) -> OutcomeLog {
        OutcomeLog {
            pending: BTreeMap::new(),
            closed: outcomes,
        }
    }

    #[test]
    fn test_weight_is_win_rate_differential() {
        // Favorable group: 3 of 4 wins. Complement: 1 of 4 wins.
        let mut outcomes = Vec::new();
        for i in 0..4 {
            outcomes.push(outcome(i < 3, true));
        }
        for i in 0..4 {
            outcomes.push(outcome(i < 1, false));
        }
        let table = recompute(&log_with(outcomes), Utc::now());
        let w = table.get(FactorKind::DrawdownDepth).unwrap();
        assert_eq!(w.favorable_total, 4);
        assert_eq!(w.complement_total, 4);
        assert_eq!(w.weight, Decimal::new(5, 1)); // 0.75 - 0.25
        assert_eq!(w.samples(), 8);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let outcomes: Vec<TradeOutcome> =
            (0..10).map(|i| outcome(i % 3 == 0, i % 2 == 0)).collect();
        let log = log_with(outcomes);
        let now = Utc::now();
        let a = recompute(&log, now);
        let b = recompute(&log, now);
        assert_eq!(a.trade_count, b.trade_count);
        for factor in ALL_FACTORS {
            let wa = a.get(factor).unwrap();
            let wb = b.get(factor).unwrap();
            assert_eq!(wa.weight, wb.weight);
            assert_eq!(wa.samples(), wb.samples());
        }
    }

    #[test]
    fn test_empty_log_yields_empty_table() {
        let table = recompute(&OutcomeLog::default(), Utc::now());
        assert!(table.is_empty());
        assert_eq!(table.trade_count, 0);
    }

    #[test]
    fn test_absent_factor_counts_as_complement() {
        // Outcomes only capture two factors; every other factor's
        // partition is entirely complement with a coin-flip favorable
        // rate, so its weight is 0.5 - complement_rate.
        let outcomes = vec![outcome(true, true), outcome(true, true)];
        let table = recompute(&log_with(outcomes), Utc::now());
        let w = table.get(FactorKind::SocialSentiment).unwrap();
        assert_eq!(w.favorable_total, 0);
        assert_eq!(w.complement_total, 2);
        assert_eq!(w.weight, Decimal::new(-5, 1)); // 0.5 - 1.0
    }

    #[test]
    fn test_summary_top_factor() {
        let mut outcomes = Vec::new();
        for i in 0..4 {
            outcomes.push(outcome(i < 3, true));
        }
        for i in 0..4 {
            outcomes.push(outcome(i < 1, false));
        }
        let log = log_with(outcomes);
        let table = recompute(&log, Utc::now());
        let summary = summarize(&log, &table).unwrap();
        assert_eq!(summary.trade_count, 8);
        assert_eq!(summary.win_count, 4);
        assert_eq!(summary.win_rate, Decimal::new(5, 1));
        assert_eq!(summary.top_factor, Some(FactorKind::DrawdownDepth));
    }
}
