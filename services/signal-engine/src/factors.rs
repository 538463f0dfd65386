//! Confidence factor table
//!
//! Every factor is one variant of [`FactorKind`] and classifies to
//! FAVORABLE / NEUTRAL / UNFAVORABLE through a single dispatch in
//! [`classify`], so adding or removing a factor is one registration
//! point. Social and news sentiment are contrarian on purpose: extreme
//! bearishness is what a mean-reversion entry wants to see.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The fixed set of confidence factors, in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    DrawdownDepth,
    VolatilityRegime,
    RateTrajectory,
    YieldCurve,
    FilingSentiment,
    FundamentalsHealth,
    PredictionMarket,
    EarningsProximity,
    GeopoliticalRisk,
    SocialSentiment,
    NewsSentiment,
    MarketBreadth,
    SmartMoney,
    PortfolioRisk,
}

/// Canonical evaluation order
pub const ALL_FACTORS: [FactorKind; 14] = [
    FactorKind::DrawdownDepth,
    FactorKind::VolatilityRegime,
    FactorKind::RateTrajectory,
    FactorKind::YieldCurve,
    FactorKind::FilingSentiment,
    FactorKind::FundamentalsHealth,
    FactorKind::PredictionMarket,
    FactorKind::EarningsProximity,
    FactorKind::GeopoliticalRisk,
    FactorKind::SocialSentiment,
    FactorKind::NewsSentiment,
    FactorKind::MarketBreadth,
    FactorKind::SmartMoney,
    FactorKind::PortfolioRisk,
];

impl FactorKind {
    /// Stable name used in persisted factor maps and weight tables
    pub fn name(&self) -> &'static str {
        match self {
            FactorKind::DrawdownDepth => "drawdown_depth",
            FactorKind::VolatilityRegime => "volatility_regime",
            FactorKind::RateTrajectory => "rate_trajectory",
            FactorKind::YieldCurve => "yield_curve",
            FactorKind::FilingSentiment => "filing_sentiment",
            FactorKind::FundamentalsHealth => "fundamentals_health",
            FactorKind::PredictionMarket => "prediction_market",
            FactorKind::EarningsProximity => "earnings_proximity",
            FactorKind::GeopoliticalRisk => "geopolitical_risk",
            FactorKind::SocialSentiment => "social_sentiment",
            FactorKind::NewsSentiment => "news_sentiment",
            FactorKind::MarketBreadth => "market_breadth",
            FactorKind::SmartMoney => "smart_money",
            FactorKind::PortfolioRisk => "portfolio_risk",
        }
    }
}

impl std::fmt::Display for FactorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Classification of one factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorClass {
    Favorable,
    Neutral,
    Unfavorable,
}

impl std::fmt::Display for FactorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactorClass::Favorable => write!(f, "favorable"),
            FactorClass::Neutral => write!(f, "neutral"),
            FactorClass::Unfavorable => write!(f, "unfavorable"),
        }
    }
}

/// One classified factor with a human-readable detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorResult {
    pub kind: FactorKind,
    pub class: FactorClass,
    pub detail: String,
}

/// Volatility regime label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolRegime {
    Low,
    Normal,
    Elevated,
    Extreme,
}

/// Policy-rate trajectory label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateTrajectory {
    Cutting,
    Holding,
    Hiking,
}

/// Yield curve shape label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveShape {
    Normal,
    Flat,
    Inverted,
}

/// Fundamental health label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthRating {
    Strong,
    Stable,
    Weak,
    Deteriorating,
}

/// Directional sentiment label (social, news, smart money)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketTone {
    Bearish,
    Neutral,
    Bullish,
}

/// Geopolitical risk label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

/// Breadth/rotation regime label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationRegime {
    RiskOff,
    Mixed,
    RiskOn,
}

/// External factor inputs for one evaluation timestamp
///
/// Every field is optional. A missing input classifies its factor as
/// NEUTRAL; the assessment never aborts on partial data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactorInputs {
    #[serde(default)]
    pub volatility_regime: Option<VolRegime>,
    #[serde(default)]
    pub rate_trajectory: Option<RateTrajectory>,
    #[serde(default)]
    pub yield_curve: Option<CurveShape>,
    /// Count of high-materiality filings in the lookback window
    #[serde(default)]
    pub material_filings: Option<u32>,
    #[serde(default)]
    pub fundamentals: Option<HealthRating>,
    /// Pre-classified prediction-market alignment
    #[serde(default)]
    pub prediction_market: Option<FactorClass>,
    /// Calendar days until the next earnings report
    #[serde(default)]
    pub days_to_earnings: Option<i64>,
    #[serde(default)]
    pub geopolitical_risk: Option<RiskLevel>,
    #[serde(default)]
    pub social_sentiment: Option<MarketTone>,
    #[serde(default)]
    pub news_sentiment: Option<MarketTone>,
    #[serde(default)]
    pub rotation: Option<RotationRegime>,
    #[serde(default)]
    pub smart_money: Option<MarketTone>,
}

/// Everything a single classification needs
#[derive(Debug, Clone, Copy)]
pub struct FactorContext<'a> {
    /// Current drawdown fraction of the underlying
    pub drawdown: Decimal,
    /// Entry threshold of the pair under evaluation
    pub entry_threshold: Decimal,
    pub inputs: &'a FactorInputs,
    /// Outcome of the portfolio-risk gate for the proposed entry
    pub risk_check_passed: Option<bool>,
}

fn result(kind: FactorKind, class: FactorClass, detail: impl Into<String>) -> FactorResult {
    FactorResult {
        kind,
        class,
        detail: detail.into(),
    }
}

/// Classify one factor against the context
pub fn classify(kind: FactorKind, ctx: &FactorContext<'_>) -> FactorResult {
    use FactorClass::{Favorable, Neutral, Unfavorable};

    match kind {
        FactorKind::DrawdownDepth => {
            let deep = ctx.entry_threshold * Decimal::new(15, 1);
            if ctx.drawdown >= deep {
                result(kind, Favorable, format!("deep drawdown: {}", ctx.drawdown))
            } else if ctx.drawdown >= ctx.entry_threshold {
                result(kind, Neutral, format!("at threshold: {}", ctx.drawdown))
            } else {
                result(kind, Unfavorable, format!("shallow: {}", ctx.drawdown))
            }
        }
        FactorKind::VolatilityRegime => match ctx.inputs.volatility_regime {
            Some(VolRegime::Elevated) | Some(VolRegime::Extreme) => {
                result(kind, Favorable, "volatility elevated: fear present")
            }
            Some(VolRegime::Normal) => result(kind, Neutral, "volatility in normal range"),
            Some(VolRegime::Low) => result(kind, Unfavorable, "volatility low: complacent market"),
            None => result(kind, Neutral, "volatility regime unavailable"),
        },
        FactorKind::RateTrajectory => match ctx.inputs.rate_trajectory {
            Some(RateTrajectory::Cutting) => result(kind, Favorable, "policy rates being cut"),
            Some(RateTrajectory::Hiking) => result(kind, Unfavorable, "policy rates being hiked"),
            Some(RateTrajectory::Holding) => result(kind, Neutral, "policy rates on hold"),
            None => result(kind, Neutral, "rate trajectory unavailable"),
        },
        FactorKind::YieldCurve => match ctx.inputs.yield_curve {
            Some(CurveShape::Normal) => result(kind, Favorable, "normal yield curve"),
            Some(CurveShape::Inverted) => result(kind, Unfavorable, "inverted yield curve"),
            Some(CurveShape::Flat) => result(kind, Neutral, "flat yield curve"),
            None => result(kind, Neutral, "yield curve unavailable"),
        },
        FactorKind::FilingSentiment => match ctx.inputs.material_filings {
            Some(0) => result(kind, Neutral, "no material filings"),
            Some(n) if n > 3 => result(kind, Unfavorable, format!("{n} material filings")),
            Some(n) => result(kind, Neutral, format!("{n} material filing(s)")),
            None => result(kind, Neutral, "filing data unavailable"),
        },
        FactorKind::FundamentalsHealth => match ctx.inputs.fundamentals {
            Some(HealthRating::Strong) => result(kind, Favorable, "fundamentals strong"),
            Some(HealthRating::Stable) => result(kind, Neutral, "fundamentals stable"),
            Some(HealthRating::Weak) => result(kind, Unfavorable, "fundamentals weak"),
            Some(HealthRating::Deteriorating) => {
                result(kind, Unfavorable, "fundamentals deteriorating")
            }
            None => result(kind, Neutral, "fundamentals unavailable"),
        },
        FactorKind::PredictionMarket => match ctx.inputs.prediction_market {
            Some(class) => result(kind, class, format!("prediction markets {class}")),
            None => result(kind, Neutral, "prediction markets unavailable"),
        },
        FactorKind::EarningsProximity => match ctx.inputs.days_to_earnings {
            Some(d) if d <= 7 => {
                result(kind, Unfavorable, format!("earnings in {d} day(s)"))
            }
            Some(d) if d <= 14 => result(kind, Neutral, format!("earnings in {d} days")),
            Some(d) => result(kind, Favorable, format!("no earnings for {d} days")),
            None => result(kind, Neutral, "earnings calendar unavailable"),
        },
        FactorKind::GeopoliticalRisk => match ctx.inputs.geopolitical_risk {
            Some(RiskLevel::Low) => result(kind, Favorable, "low geopolitical risk"),
            Some(RiskLevel::High) => result(kind, Unfavorable, "high geopolitical risk"),
            Some(RiskLevel::Moderate) => result(kind, Neutral, "moderate geopolitical risk"),
            None => result(kind, Neutral, "geopolitical risk unavailable"),
        },
        // Contrarian: bearish crowds are the mean-reversion setup
        FactorKind::SocialSentiment => match ctx.inputs.social_sentiment {
            Some(MarketTone::Bearish) => {
                result(kind, Favorable, "social sentiment bearish (contrarian)")
            }
            Some(MarketTone::Bullish) => result(kind, Neutral, "social sentiment bullish"),
            Some(MarketTone::Neutral) => result(kind, Neutral, "social sentiment neutral"),
            None => result(kind, Neutral, "social sentiment unavailable"),
        },
        // Contrarian, same inversion as social sentiment
        FactorKind::NewsSentiment => match ctx.inputs.news_sentiment {
            Some(MarketTone::Bearish) => {
                result(kind, Favorable, "news sentiment bearish (contrarian)")
            }
            Some(MarketTone::Bullish) => result(kind, Neutral, "news sentiment bullish"),
            Some(MarketTone::Neutral) => result(kind, Neutral, "news sentiment neutral"),
            None => result(kind, Neutral, "news sentiment unavailable"),
        },
        FactorKind::MarketBreadth => match ctx.inputs.rotation {
            Some(RotationRegime::RiskOff) => {
                result(kind, Favorable, "market risk-off (contrarian opportunity)")
            }
            Some(RotationRegime::RiskOn) => result(kind, Neutral, "market risk-on"),
            Some(RotationRegime::Mixed) => result(kind, Neutral, "rotation mixed"),
            None => result(kind, Neutral, "breadth data unavailable"),
        },
        FactorKind::SmartMoney => match ctx.inputs.smart_money {
            Some(MarketTone::Bullish) => result(kind, Favorable, "smart money buying"),
            Some(MarketTone::Bearish) => result(kind, Unfavorable, "smart money selling"),
            Some(MarketTone::Neutral) => result(kind, Neutral, "smart money flat"),
            None => result(kind, Neutral, "smart money data unavailable"),
        },
        FactorKind::PortfolioRisk => match ctx.risk_check_passed {
            Some(true) => result(kind, Favorable, "risk limits pass"),
            Some(false) => result(kind, Unfavorable, "risk limits would be breached"),
            None => result(kind, Neutral, "risk check not evaluated"),
        },
    }
}

/// Classify every factor, in canonical order
pub fn classify_all(ctx: &FactorContext<'_>) -> Vec<FactorResult> {
    ALL_FACTORS.iter().map(|kind| classify(*kind, ctx)).collect()
}
