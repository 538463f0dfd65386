//! Position sizing - fixed-fraction and half-Kelly

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::factors::VolRegime;
use crate::outcomes::TradeOutcome;

/// Which sizing method the engine uses for approved entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    #[default]
    FixedFraction,
    HalfKelly,
}

/// Sizing knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    #[serde(default)]
    pub method: SizingMethod,
    /// Portfolio fraction risked per trade
    #[serde(default = "default_risk_fraction")]
    pub risk_fraction: Decimal,
    /// Size reduction applied in an extreme volatility regime
    #[serde(default = "default_extreme_vol_haircut")]
    pub extreme_vol_haircut: Decimal,
    /// Closed trades required before Kelly sizing is allowed
    #[serde(default = "default_min_kelly_trades")]
    pub min_kelly_trades: usize,
}

fn default_risk_fraction() -> Decimal {
    Decimal::new(2, 2)
}
fn default_extreme_vol_haircut() -> Decimal {
    Decimal::new(25, 2)
}
fn default_min_kelly_trades() -> usize {
    10
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            method: SizingMethod::default(),
            risk_fraction: default_risk_fraction(),
            extreme_vol_haircut: default_extreme_vol_haircut(),
            min_kelly_trades: default_min_kelly_trades(),
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.risk_fraction <= Decimal::ZERO || self.risk_fraction >= Decimal::ONE {
            return Err(EngineError::Config(format!(
                "risk_fraction must be in (0, 1), got {}",
                self.risk_fraction
            )));
        }
        if self.extreme_vol_haircut < Decimal::ZERO || self.extreme_vol_haircut >= Decimal::ONE {
            return Err(EngineError::Config(format!(
                "extreme_vol_haircut must be in [0, 1), got {}",
                self.extreme_vol_haircut
            )));
        }
        Ok(())
    }
}

/// A recommended notional for an approved entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeRecommendation {
    pub method: SizingMethod,
    pub notional: Decimal,
    /// Recommended size as a fraction of portfolio value
    pub portfolio_fraction: Decimal,
    pub shares: Decimal,
    pub rationale: String,
}

/// Fixed-fraction size: risk fraction of portfolio value divided by
/// the instrument's leverage, reduced when volatility is extreme.
pub fn fixed_fraction(
    portfolio_value: Decimal,
    leverage: Decimal,
    entry_price: Decimal,
    cfg: &SizingConfig,
    vol_regime: Option<VolRegime>,
) -> SizeRecommendation {
    let base = if leverage > Decimal::ZERO {
        portfolio_value * cfg.risk_fraction / leverage
    } else {
        Decimal::ZERO
    };
    let (notional, note) = if vol_regime == Some(VolRegime::Extreme) {
        (
            base * (Decimal::ONE - cfg.extreme_vol_haircut),
            " (reduced for extreme volatility)",
        )
    } else {
        (base, "")
    };
    let fraction = if portfolio_value > Decimal::ZERO {
        notional / portfolio_value
    } else {
        Decimal::ZERO
    };
    SizeRecommendation {
        method: SizingMethod::FixedFraction,
        notional,
        portfolio_fraction: fraction,
        shares: shares_for(notional, entry_price),
        rationale: format!(
            "{} risk at {}x leverage = {} notional{}",
            cfg.risk_fraction, leverage, notional, note
        ),
    }
}

/// Half-Kelly size from the closed-trade history of one ticker.
///
/// f* = (p*b - q) / b with p the win rate, b the average-win to
/// average-loss ratio, q = 1 - p; the recommendation is half of f*,
/// floored at zero. Fails with `InsufficientTradeHistory` when fewer
/// than `min_kelly_trades` closed trades exist; falling back to
/// fixed-fraction in that case is the caller's decision.
pub fn half_kelly(
    portfolio_value: Decimal,
    entry_price: Decimal,
    ticker: &str,
    closed: &[&TradeOutcome],
    cfg: &SizingConfig,
) -> Result<SizeRecommendation> {
    if closed.len() < cfg.min_kelly_trades {
        return Err(EngineError::InsufficientTradeHistory {
            ticker: ticker.to_string(),
            closed: closed.len(),
            required: cfg.min_kelly_trades,
        });
    }

    let n = Decimal::from(closed.len());
    let wins: Vec<Decimal> = closed
        .iter()
        .filter(|o| o.win)
        .map(|o| o.pl_fraction)
        .collect();
    let losses: Vec<Decimal> = closed
        .iter()
        .filter(|o| !o.win)
        .map(|o| o.pl_fraction.abs())
        .collect();

    if wins.is_empty() || losses.is_empty() {
        // Degenerate history: Kelly is undefined, recommend nothing
        return Ok(SizeRecommendation {
            method: SizingMethod::HalfKelly,
            notional: Decimal::ZERO,
            portfolio_fraction: Decimal::ZERO,
            shares: Decimal::ZERO,
            rationale: format!(
                "kelly undefined for {ticker}: {} win(s), {} loss(es)",
                wins.len(),
                losses.len()
            ),
        });
    }

    let p = Decimal::from(wins.len()) / n;
    let avg_win = wins.iter().copied().sum::<Decimal>() / Decimal::from(wins.len());
    let avg_loss = losses.iter().copied().sum::<Decimal>() / Decimal::from(losses.len());
    if avg_loss <= Decimal::ZERO {
        return Ok(SizeRecommendation {
            method: SizingMethod::HalfKelly,
            notional: Decimal::ZERO,
            portfolio_fraction: Decimal::ZERO,
            shares: Decimal::ZERO,
            rationale: format!("kelly undefined for {ticker}: zero average loss"),
        });
    }

    let b = avg_win / avg_loss;
    let q = Decimal::ONE - p;
    let kelly = ((p * b) - q) / b;
    let half = (kelly / Decimal::from(2)).max(Decimal::ZERO);

    let notional = portfolio_value * half;
    Ok(SizeRecommendation {
        method: SizingMethod::HalfKelly,
        notional,
        portfolio_fraction: half,
        shares: shares_for(notional, entry_price),
        rationale: format!(
            "kelly f*={kelly}, half-kelly {half} of portfolio = {notional}"
        ),
    })
}

fn shares_for(notional: Decimal, entry_price: Decimal) -> Decimal {
    if entry_price > Decimal::ZERO {
        notional / entry_price
    } else {
        Decimal::ZERO
    }
}
