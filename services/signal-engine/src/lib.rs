//! Signal Engine Library
//!
//! Decision core for a leveraged-ETF mean-reversion advisor: drawdown
//! tracking, signal lifecycle, multi-factor confidence scoring, a
//! portfolio risk veto gate, position sizing, and outcome-driven
//! factor-weight learning. All market data arrives as already-fetched
//! snapshots; the core performs no network I/O.

pub mod config;
pub mod confidence;
pub mod drawdown;
pub mod engine;
pub mod error;
pub mod factors;
pub mod outcomes;
pub mod portfolio;
pub mod risk;
pub mod signal;
pub mod sizing;
pub mod snapshot;
pub mod store;
pub mod universe;
pub mod weights;

// Re-export main types for convenience
pub use config::{EngineConfig, LearningConfig};
pub use confidence::{ConfidenceAssessment, ConfidenceRating};
pub use engine::{CycleReport, Engine, EnterOutcome, PairEvaluation};
pub use error::{EngineError, Result};
pub use factors::{FactorClass, FactorInputs, FactorKind};
pub use portfolio::{PortfolioPosition, PortfolioState};
pub use risk::{ExposureReport, LimitCriterion, RiskLimits, VetoDecision};
pub use signal::{Signal, SignalState};
pub use sizing::{SizeRecommendation, SizingConfig, SizingMethod};
pub use snapshot::{ClosePoint, MarketSnapshot};
pub use store::StateStore;
pub use universe::PairSpec;
pub use weights::{FactorWeight, WeightTable};
