//! Confidence scoring - aggregates factor classifications into a rating

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::factors::{classify_all, FactorClass, FactorContext, FactorResult};
use crate::weights::WeightTable;

/// Overall conviction rating for a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceRating {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for ConfidenceRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceRating::High => write!(f, "HIGH"),
            ConfidenceRating::Medium => write!(f, "MEDIUM"),
            ConfidenceRating::Low => write!(f, "LOW"),
        }
    }
}

/// Result of one confidence evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceAssessment {
    pub rating: ConfidenceRating,
    /// Raw count of FAVORABLE factors
    pub favorable: usize,
    pub total: usize,
    /// Weighted favorable share, present only in weighted mode
    pub weighted_share: Option<Decimal>,
    /// Per-factor classifications, canonical order
    pub factors: Vec<FactorResult>,
}

// Rating boundaries as favorable shares of the factor total:
// HIGH at 10/14 and above, MEDIUM at 5/14 and above.
const HIGH_NUMERATOR: i64 = 10;
const MEDIUM_NUMERATOR: i64 = 5;
const FACTOR_TOTAL: i64 = 14;

fn rating_for_count(favorable: usize) -> ConfidenceRating {
    if favorable as i64 >= HIGH_NUMERATOR {
        ConfidenceRating::High
    } else if favorable as i64 >= MEDIUM_NUMERATOR {
        ConfidenceRating::Medium
    } else {
        ConfidenceRating::Low
    }
}

fn rating_for_share(share: Decimal) -> ConfidenceRating {
    let high = Decimal::from(HIGH_NUMERATOR) / Decimal::from(FACTOR_TOTAL);
    let medium = Decimal::from(MEDIUM_NUMERATOR) / Decimal::from(FACTOR_TOTAL);
    if share >= high {
        ConfidenceRating::High
    } else if share >= medium {
        ConfidenceRating::Medium
    } else {
        ConfidenceRating::Low
    }
}

/// Unweighted assessment: count FAVORABLE factors against the total
pub fn assess(ctx: &FactorContext<'_>) -> ConfidenceAssessment {
    let factors = classify_all(ctx);
    let favorable = factors
        .iter()
        .filter(|f| f.class == FactorClass::Favorable)
        .count();
    ConfidenceAssessment {
        rating: rating_for_count(favorable),
        favorable,
        total: factors.len(),
        weighted_share: None,
        factors,
    }
}

/// Weighted assessment: each factor's vote is scaled by its learned
/// predictive weight, falling back to a neutral multiplier for factors
/// with fewer than `min_samples` outcomes behind the estimate.
pub fn assess_weighted(
    ctx: &FactorContext<'_>,
    weights: &WeightTable,
    min_samples: u32,
) -> ConfidenceAssessment {
    let factors = classify_all(ctx);

    let mut favorable_score = Decimal::ZERO;
    let mut total_score = Decimal::ZERO;
    let mut favorable = 0usize;

    for f in &factors {
        let multiplier = weights
            .get(f.kind)
            .filter(|w| w.samples() >= min_samples)
            .map(|w| vote_multiplier(w.weight))
            .unwrap_or(Decimal::ONE);
        total_score += multiplier;
        if f.class == FactorClass::Favorable {
            favorable_score += multiplier;
            favorable += 1;
        }
    }

    let share = if total_score > Decimal::ZERO {
        favorable_score / total_score
    } else {
        Decimal::ZERO
    };

    ConfidenceAssessment {
        rating: rating_for_share(share),
        favorable,
        total: factors.len(),
        weighted_share: Some(share),
        factors,
    }
}

// A weight is a win-rate differential in [-1, 1]; 1 + differential
// turns it into a vote multiplier, clamped so a single factor can
// neither vanish nor dominate.
fn vote_multiplier(weight: Decimal) -> Decimal {
    let raw = Decimal::ONE + weight;
    raw.clamp(Decimal::new(25, 2), Decimal::from(2))
}
