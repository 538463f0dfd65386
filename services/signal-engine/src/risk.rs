//! Portfolio risk limits and the veto gate
//!
//! Five blocking criteria evaluated in a fixed order; the first
//! breach wins and carries its numbers so the caller can explain
//! remediation. Same-sector correlation is advisory only.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{EngineError, Result};
use crate::portfolio::PortfolioState;
use crate::snapshot::ClosePoint;

/// Process-wide portfolio risk limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Max concurrent open positions
    #[serde(default = "default_max_positions")]
    pub max_concurrent_positions: usize,
    /// Max single position as a fraction of portfolio value
    #[serde(default = "default_max_single_position")]
    pub max_single_position_fraction: Decimal,
    /// Max per-sector exposure as a fraction of portfolio value
    #[serde(default = "default_max_sector")]
    pub max_sector_fraction: Decimal,
    /// Max aggregate leveraged notional as a multiple of portfolio value
    #[serde(default = "default_max_leveraged")]
    pub max_leveraged_exposure: Decimal,
    /// Minimum cash reserve as a fraction of portfolio value
    #[serde(default = "default_min_cash")]
    pub min_cash_reserve_fraction: Decimal,
    /// Return correlation above which same-sector pairs are flagged
    #[serde(default = "default_correlation_threshold")]
    pub sector_correlation_threshold: f64,
}

fn default_max_positions() -> usize {
    4
}
fn default_max_single_position() -> Decimal {
    Decimal::new(30, 2)
}
fn default_max_sector() -> Decimal {
    Decimal::new(50, 2)
}
fn default_max_leveraged() -> Decimal {
    Decimal::from(3)
}
fn default_min_cash() -> Decimal {
    Decimal::new(20, 2)
}
fn default_correlation_threshold() -> f64 {
    0.70
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_concurrent_positions: default_max_positions(),
            max_single_position_fraction: default_max_single_position(),
            max_sector_fraction: default_max_sector(),
            max_leveraged_exposure: default_max_leveraged(),
            min_cash_reserve_fraction: default_min_cash(),
            sector_correlation_threshold: default_correlation_threshold(),
        }
    }
}

impl RiskLimits {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_positions == 0 {
            return Err(EngineError::Config(
                "max_concurrent_positions must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("max_single_position_fraction", self.max_single_position_fraction),
            ("max_sector_fraction", self.max_sector_fraction),
            ("min_cash_reserve_fraction", self.min_cash_reserve_fraction),
        ] {
            if value <= Decimal::ZERO || value > Decimal::ONE {
                return Err(EngineError::Config(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if self.max_leveraged_exposure <= Decimal::ZERO {
            return Err(EngineError::Config(
                "max_leveraged_exposure must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.sector_correlation_threshold) {
            return Err(EngineError::Config(format!(
                "sector_correlation_threshold must be in [0, 1], got {}",
                self.sector_correlation_threshold
            )));
        }
        Ok(())
    }
}

/// Portfolio exposure breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureReport {
    pub total_value: Decimal,
    pub invested_value: Decimal,
    pub cash_value: Decimal,
    pub invested_fraction: Decimal,
    pub cash_fraction: Decimal,
    /// Leveraged notional as a multiple of portfolio value
    pub leveraged_ratio: Decimal,
    pub sector_fractions: BTreeMap<String, Decimal>,
    pub position_count: usize,
    pub unrealized_pl: Decimal,
    pub unrealized_pl_fraction: Decimal,
}

impl ExposureReport {
    /// Compute the breakdown from current portfolio state
    pub fn from_portfolio(portfolio: &PortfolioState) -> Self {
        let total = portfolio.total_value;
        let invested = portfolio.invested_value();
        let cash = portfolio.cash;
        let unrealized: Decimal = portfolio.positions.iter().map(|p| p.unrealized_pl()).sum();

        let fraction = |value: Decimal| {
            if total > Decimal::ZERO {
                value / total
            } else {
                Decimal::ZERO
            }
        };

        Self {
            total_value: total,
            invested_value: invested,
            cash_value: cash,
            invested_fraction: fraction(invested),
            cash_fraction: fraction(cash),
            leveraged_ratio: fraction(portfolio.leveraged_exposure()),
            sector_fractions: portfolio
                .sector_exposure()
                .into_iter()
                .map(|(sector, value)| (sector, fraction(value)))
                .collect(),
            position_count: portfolio.positions.len(),
            unrealized_pl: unrealized,
            unrealized_pl_fraction: fraction(unrealized),
        }
    }
}

/// The five blocking criteria, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitCriterion {
    PositionCount,
    SinglePositionFraction,
    SectorFraction,
    LeveragedExposure,
    CashReserve,
}

impl std::fmt::Display for LimitCriterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitCriterion::PositionCount => write!(f, "position count"),
            LimitCriterion::SinglePositionFraction => write!(f, "single position fraction"),
            LimitCriterion::SectorFraction => write!(f, "sector exposure"),
            LimitCriterion::LeveragedExposure => write!(f, "aggregate leveraged exposure"),
            LimitCriterion::CashReserve => write!(f, "cash reserve"),
        }
    }
}

/// A breached limit with its numbers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VetoReason {
    pub criterion: LimitCriterion,
    /// Value before the proposed entry
    pub current: Decimal,
    /// Value if the entry were taken
    pub after_entry: Decimal,
    pub limit: Decimal,
}

impl std::fmt::Display for VetoReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} would be {} against a limit of {} (currently {})",
            self.criterion, self.after_entry, self.limit, self.current
        )
    }
}

/// Remaining room on one limit after the proposed entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitHeadroom {
    pub criterion: LimitCriterion,
    pub after_entry: Decimal,
    pub limit: Decimal,
}

/// Advisory flag for correlated same-sector exposure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationWarning {
    pub ticker: String,
    pub existing_ticker: String,
    pub sector: String,
    pub correlation: f64,
}

/// Outcome of the veto gate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum VetoDecision {
    Approved {
        headroom: Vec<LimitHeadroom>,
        warnings: Vec<CorrelationWarning>,
    },
    Rejected(VetoReason),
}

impl VetoDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, VetoDecision::Approved { .. })
    }
}

/// A proposed entry to gate
#[derive(Debug, Clone)]
pub struct ProposedEntry {
    pub ticker: String,
    pub underlying: String,
    pub sector: String,
    pub leverage: Decimal,
    pub notional: Decimal,
}

/// Evaluate a proposed entry against the portfolio and limits.
///
/// `histories` maps underlying tickers to their close series and only
/// feeds the advisory correlation check; missing series simply skip
/// the flag.
pub fn evaluate(
    proposal: &ProposedEntry,
    portfolio: &PortfolioState,
    limits: &RiskLimits,
    histories: &BTreeMap<String, Vec<ClosePoint>>,
) -> VetoDecision {
    let total = portfolio.total_value;
    let mut headroom = Vec::new();

    // 1. Position count
    let count = Decimal::from(portfolio.positions.len());
    let count_after = count + Decimal::ONE;
    let count_limit = Decimal::from(limits.max_concurrent_positions);
    if portfolio.positions.len() >= limits.max_concurrent_positions {
        return VetoDecision::Rejected(VetoReason {
            criterion: LimitCriterion::PositionCount,
            current: count,
            after_entry: count_after,
            limit: count_limit,
        });
    }
    headroom.push(LimitHeadroom {
        criterion: LimitCriterion::PositionCount,
        after_entry: count_after,
        limit: count_limit,
    });

    // Fraction-based criteria are meaningless on an empty book
    if total > Decimal::ZERO {
        // 2. Single position fraction
        let fraction = proposal.notional / total;
        if fraction > limits.max_single_position_fraction {
            return VetoDecision::Rejected(VetoReason {
                criterion: LimitCriterion::SinglePositionFraction,
                current: Decimal::ZERO,
                after_entry: fraction,
                limit: limits.max_single_position_fraction,
            });
        }
        headroom.push(LimitHeadroom {
            criterion: LimitCriterion::SinglePositionFraction,
            after_entry: fraction,
            limit: limits.max_single_position_fraction,
        });

        // 3. Sector exposure
        let sector_current = portfolio
            .sector_exposure()
            .get(&proposal.sector)
            .copied()
            .unwrap_or(Decimal::ZERO)
            / total;
        let sector_after = sector_current + proposal.notional / total;
        if sector_after > limits.max_sector_fraction {
            return VetoDecision::Rejected(VetoReason {
                criterion: LimitCriterion::SectorFraction,
                current: sector_current,
                after_entry: sector_after,
                limit: limits.max_sector_fraction,
            });
        }
        headroom.push(LimitHeadroom {
            criterion: LimitCriterion::SectorFraction,
            after_entry: sector_after,
            limit: limits.max_sector_fraction,
        });

        // 4. Aggregate leveraged exposure
        let leveraged_current = portfolio.leveraged_exposure() / total;
        let leveraged_after =
            (portfolio.leveraged_exposure() + proposal.notional * proposal.leverage) / total;
        if leveraged_after > limits.max_leveraged_exposure {
            return VetoDecision::Rejected(VetoReason {
                criterion: LimitCriterion::LeveragedExposure,
                current: leveraged_current,
                after_entry: leveraged_after,
                limit: limits.max_leveraged_exposure,
            });
        }
        headroom.push(LimitHeadroom {
            criterion: LimitCriterion::LeveragedExposure,
            after_entry: leveraged_after,
            limit: limits.max_leveraged_exposure,
        });

        // 5. Cash reserve
        let cash_current = portfolio.cash / total;
        let cash_after = (portfolio.cash - proposal.notional) / total;
        if cash_after < limits.min_cash_reserve_fraction {
            return VetoDecision::Rejected(VetoReason {
                criterion: LimitCriterion::CashReserve,
                current: cash_current,
                after_entry: cash_after,
                limit: limits.min_cash_reserve_fraction,
            });
        }
        headroom.push(LimitHeadroom {
            criterion: LimitCriterion::CashReserve,
            after_entry: cash_after,
            limit: limits.min_cash_reserve_fraction,
        });
    }

    // 6. Advisory: correlated same-sector exposure. Flags, never vetoes.
    let mut warnings = Vec::new();
    let proposal_history = histories.get(&proposal.underlying);
    for pos in &portfolio.positions {
        if pos.sector != proposal.sector {
            continue;
        }
        let Some(a) = proposal_history else { break };
        let Some(b) = histories.get(&pos.underlying) else {
            continue;
        };
        if let Some(corr) = return_correlation(a, b) {
            if corr > limits.sector_correlation_threshold {
                warnings.push(CorrelationWarning {
                    ticker: proposal.ticker.clone(),
                    existing_ticker: pos.ticker.clone(),
                    sector: proposal.sector.clone(),
                    correlation: corr,
                });
            }
        }
    }

    VetoDecision::Approved { headroom, warnings }
}

// Correlation needs enough overlap to mean anything
const MIN_CORRELATION_RETURNS: usize = 20;

/// Pearson correlation of daily returns over common dates
pub fn return_correlation(a: &[ClosePoint], b: &[ClosePoint]) -> Option<f64> {
    let b_by_date: BTreeMap<_, _> = b.iter().map(|p| (p.date, p.close)).collect();
    let common: Vec<(Decimal, Decimal)> = a
        .iter()
        .filter_map(|p| b_by_date.get(&p.date).map(|bc| (p.close, *bc)))
        .collect();
    if common.len() < MIN_CORRELATION_RETURNS + 1 {
        return None;
    }

    let returns: Vec<(f64, f64)> = common
        .windows(2)
        .filter_map(|w| {
            let (a0, b0) = w[0];
            let (a1, b1) = w[1];
            if a0 <= Decimal::ZERO || b0 <= Decimal::ZERO {
                return None;
            }
            let ra = ((a1 - a0) / a0).to_f64()?;
            let rb = ((b1 - b0) / b0).to_f64()?;
            Some((ra, rb))
        })
        .collect();
    if returns.len() < MIN_CORRELATION_RETURNS {
        return None;
    }

    let n = returns.len() as f64;
    let mean_a = returns.iter().map(|(a, _)| a).sum::<f64>() / n;
    let mean_b = returns.iter().map(|(_, b)| b).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (ra, rb) in &returns {
        let da = ra - mean_a;
        let db = rb - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}
