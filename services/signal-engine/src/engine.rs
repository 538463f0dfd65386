//! Engine orchestration - refresh cycles and the enter/close operations
//!
//! Each refresh cycle is one read-modify-write pass over the persisted
//! state: load everything, evaluate every tracked pair against the
//! snapshot, write everything back. A pair that cannot be evaluated is
//! skipped with its prior state retained; it never takes the rest of
//! the universe down with it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::confidence::{assess, assess_weighted, ConfidenceAssessment};
use crate::drawdown;
use crate::error::{EngineError, Result};
use crate::factors::FactorContext;
use crate::outcomes::{OutcomeLog, TradeOutcome};
use crate::portfolio::PortfolioState;
use crate::risk::{self, CorrelationWarning, ExposureReport, ProposedEntry, VetoDecision, VetoReason};
use crate::signal::{Signal, SignalState};
use crate::sizing::{self, SizeRecommendation, SizingMethod};
use crate::snapshot::MarketSnapshot;
use crate::store::{EngineState, StateStore};
use crate::universe::{find_pair, PairSpec};
use crate::weights::{self, WeightTable};

/// Evaluation of one pair within a cycle
#[derive(Debug, Clone, Serialize)]
pub struct PairEvaluation {
    pub ticker: String,
    pub state: SignalState,
    pub drawdown: Decimal,
    /// Present for pairs in SIGNAL state
    pub assessment: Option<ConfidenceAssessment>,
    pub veto: Option<VetoDecision>,
    pub sizing: Option<SizeRecommendation>,
}

/// A pair left out of a cycle, with why
#[derive(Debug, Clone, Serialize)]
pub struct SkippedPair {
    pub ticker: String,
    pub reason: String,
}

/// What one refresh cycle produced
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub as_of: DateTime<Utc>,
    pub evaluated: Vec<PairEvaluation>,
    pub skipped: Vec<SkippedPair>,
}

impl CycleReport {
    /// Pairs requiring user action (open signal or target hit)
    pub fn actionable(&self) -> Vec<&PairEvaluation> {
        self.evaluated
            .iter()
            .filter(|e| matches!(e.state, SignalState::Signal | SignalState::Target))
            .collect()
    }
}

/// Result of an enter request
#[derive(Debug, Clone)]
pub enum EnterOutcome {
    Entered {
        assessment: ConfidenceAssessment,
        sizing: SizeRecommendation,
        warnings: Vec<CorrelationWarning>,
    },
    Vetoed(VetoReason),
}

/// The decision engine over a persistent store
pub struct Engine {
    config: EngineConfig,
    store: StateStore,
}

impl Engine {
    pub fn new(config: EngineConfig, store: StateStore) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate every tracked pair against a snapshot and persist the
    /// resulting state
    pub fn refresh_cycle(&self, snapshot: &MarketSnapshot) -> Result<CycleReport> {
        let now = snapshot.as_of;
        let mut state = self.store.load(self.config.starting_cash, now)?;

        // Seed signals for any newly configured pairs
        for pair in &self.config.universe {
            state
                .signals
                .entry(pair.leveraged.clone())
                .or_insert_with(|| Signal::new(pair, now));
        }

        state.portfolio.mark_to_market(&snapshot.leveraged_prices, now);

        let mut evaluated = Vec::new();
        let mut skipped = Vec::new();

        for pair in &self.config.universe {
            match self.evaluate_pair(pair, &mut state, snapshot, now) {
                Ok(evaluation) => evaluated.push(evaluation),
                Err(e) => {
                    warn!("{}: evaluation skipped: {}", pair.leveraged, e);
                    skipped.push(SkippedPair {
                        ticker: pair.leveraged.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        state.versions = self.store.commit(&state)?;

        let report = CycleReport {
            as_of: now,
            evaluated,
            skipped,
        };
        info!(
            "cycle complete: {} evaluated, {} skipped, {} actionable",
            report.evaluated.len(),
            report.skipped.len(),
            report.actionable().len()
        );
        Ok(report)
    }

    fn evaluate_pair(
        &self,
        pair: &PairSpec,
        state: &mut EngineState,
        snapshot: &MarketSnapshot,
        now: DateTime<Utc>,
    ) -> Result<PairEvaluation> {
        let closes = snapshot.history(&pair.underlying).unwrap_or(&[]);
        let reading = drawdown::measure(&pair.underlying, closes)?;

        let signal = state
            .signals
            .get_mut(&pair.leveraged)
            .ok_or_else(|| EngineError::UnknownTicker(pair.leveraged.clone()))?;
        signal.absorb_reading(&reading, now);

        if signal.state.holds_position() {
            if let Some(price) = snapshot.leveraged_price(&pair.leveraged) {
                signal.mark_position(price, now);
            } else {
                debug!("{}: no leveraged price, P/L not refreshed", pair.leveraged);
            }
            return Ok(PairEvaluation {
                ticker: pair.leveraged.clone(),
                state: signal.state,
                drawdown: signal.underlying_drawdown,
                assessment: None,
                veto: None,
                sizing: None,
            });
        }

        if signal.state != SignalState::Signal {
            return Ok(PairEvaluation {
                ticker: pair.leveraged.clone(),
                state: signal.state,
                drawdown: signal.underlying_drawdown,
                assessment: None,
                veto: None,
                sizing: None,
            });
        }

        // Open signal: size it, gate it, score it
        let entry_price = snapshot
            .leveraged_price(&pair.leveraged)
            .unwrap_or(Decimal::ZERO);
        let sizing = self.recommend_size(
            &state.portfolio,
            &state.outcomes,
            pair,
            entry_price,
            snapshot,
        );
        let proposal = ProposedEntry {
            ticker: pair.leveraged.clone(),
            underlying: pair.underlying.clone(),
            sector: pair.sector.clone(),
            leverage: pair.leverage,
            notional: sizing.notional,
        };
        let veto = risk::evaluate(
            &proposal,
            &state.portfolio,
            &self.config.risk,
            &snapshot.underlying_history,
        );
        let assessment = self.assess_signal(
            signal.underlying_drawdown,
            signal.entry_threshold,
            snapshot,
            &state.weights,
            Some(veto.is_approved()),
        );

        info!(
            "{}: SIGNAL at {} drawdown, confidence {} ({}/{} favorable), veto {}",
            pair.leveraged,
            signal.underlying_drawdown,
            assessment.rating,
            assessment.favorable,
            assessment.total,
            if veto.is_approved() { "approved" } else { "rejected" }
        );

        Ok(PairEvaluation {
            ticker: pair.leveraged.clone(),
            state: signal.state,
            drawdown: signal.underlying_drawdown,
            assessment: Some(assessment),
            veto: Some(veto),
            sizing: Some(sizing),
        })
    }

    fn assess_signal(
        &self,
        drawdown: Decimal,
        entry_threshold: Decimal,
        snapshot: &MarketSnapshot,
        weights: &WeightTable,
        risk_check_passed: Option<bool>,
    ) -> ConfidenceAssessment {
        let ctx = FactorContext {
            drawdown,
            entry_threshold,
            inputs: &snapshot.factors,
            risk_check_passed,
        };
        if self.config.learning.weighted_scoring && !weights.is_empty() {
            assess_weighted(&ctx, weights, self.config.learning.min_factor_samples)
        } else {
            assess(&ctx)
        }
    }

    /// Recommended size for an entry. Kelly sizing without enough
    /// closed trades falls back to fixed-fraction here, at the caller
    /// level, with a log line marking the downgrade.
    fn recommend_size(
        &self,
        portfolio: &PortfolioState,
        outcomes: &OutcomeLog,
        pair: &PairSpec,
        entry_price: Decimal,
        snapshot: &MarketSnapshot,
    ) -> SizeRecommendation {
        let vol = snapshot.factors.volatility_regime;
        match self.config.sizing.method {
            SizingMethod::FixedFraction => sizing::fixed_fraction(
                portfolio.total_value,
                pair.leverage,
                entry_price,
                &self.config.sizing,
                vol,
            ),
            SizingMethod::HalfKelly => {
                let closed = outcomes.closed_for(&pair.leveraged);
                match sizing::half_kelly(
                    portfolio.total_value,
                    entry_price,
                    &pair.leveraged,
                    &closed,
                    &self.config.sizing,
                ) {
                    Ok(recommendation) => recommendation,
                    Err(e) => {
                        warn!("{}: {}; falling back to fixed-fraction", pair.leveraged, e);
                        sizing::fixed_fraction(
                            portfolio.total_value,
                            pair.leverage,
                            entry_price,
                            &self.config.sizing,
                            vol,
                        )
                    }
                }
            }
        }
    }

    /// Take an open SIGNAL into ACTIVE at the given fill price.
    ///
    /// The veto gate runs first; a rejection leaves every document
    /// untouched. On approval the signal, portfolio, and outcome log
    /// move together in one commit.
    pub fn enter(
        &self,
        ticker: &str,
        price: Decimal,
        snapshot: &MarketSnapshot,
    ) -> Result<EnterOutcome> {
        let now = Utc::now();
        let mut state = self.store.load(self.config.starting_cash, now)?;
        let pair = find_pair(&self.config.universe, ticker)
            .ok_or_else(|| EngineError::UnknownTicker(ticker.to_string()))?;
        let signal = state
            .signals
            .get_mut(&pair.leveraged)
            .ok_or_else(|| EngineError::UnknownTicker(ticker.to_string()))?;
        if signal.state != SignalState::Signal {
            return Err(EngineError::InvalidTransition {
                ticker: pair.leveraged.clone(),
                state: signal.state,
                operation: "enter",
            });
        }

        let mut sizing =
            self.recommend_size(&state.portfolio, &state.outcomes, pair, price, snapshot);
        if sizing.notional <= Decimal::ZERO {
            warn!(
                "{}: {:?} sizing recommended nothing; using fixed-fraction",
                pair.leveraged, sizing.method
            );
            sizing = sizing::fixed_fraction(
                state.portfolio.total_value,
                pair.leverage,
                price,
                &self.config.sizing,
                snapshot.factors.volatility_regime,
            );
        }

        let proposal = ProposedEntry {
            ticker: pair.leveraged.clone(),
            underlying: pair.underlying.clone(),
            sector: pair.sector.clone(),
            leverage: pair.leverage,
            notional: sizing.notional,
        };
        let veto = risk::evaluate(
            &proposal,
            &state.portfolio,
            &self.config.risk,
            &snapshot.underlying_history,
        );
        let warnings = match veto {
            VetoDecision::Rejected(reason) => {
                info!("{}: entry vetoed: {}", pair.leveraged, reason);
                return Ok(EnterOutcome::Vetoed(reason));
            }
            VetoDecision::Approved { warnings, .. } => warnings,
        };
        for w in &warnings {
            warn!(
                "{}: correlated {} exposure with {} (r={:.2})",
                w.ticker, w.sector, w.existing_ticker, w.correlation
            );
        }

        let assessment = self.assess_signal(
            signal.underlying_drawdown,
            signal.entry_threshold,
            snapshot,
            &state.weights,
            Some(true),
        );

        signal.begin_entry(price, now)?;
        state.portfolio.enter_position(
            &pair.leveraged,
            &pair.underlying,
            &pair.sector,
            pair.leverage,
            price,
            sizing.notional,
            now,
        )?;
        state
            .outcomes
            .record_entry(&pair.leveraged, &pair.underlying, price, &assessment, now);

        state.versions = self.store.commit(&state)?;
        info!(
            "{}: entered at {} for {} ({} confidence)",
            pair.leveraged, price, sizing.notional, assessment.rating
        );
        Ok(EnterOutcome::Entered {
            assessment,
            sizing,
            warnings,
        })
    }

    /// Close a held position at the given price, record the outcome,
    /// and relearn factor weights from the full log.
    pub fn close(&self, ticker: &str, price: Decimal) -> Result<TradeOutcome> {
        let now = Utc::now();
        let mut state = self.store.load(self.config.starting_cash, now)?;
        let pair = find_pair(&self.config.universe, ticker)
            .ok_or_else(|| EngineError::UnknownTicker(ticker.to_string()))?;
        let signal = state
            .signals
            .get_mut(&pair.leveraged)
            .ok_or_else(|| EngineError::UnknownTicker(ticker.to_string()))?;

        let (fill, pl) = signal.close_out(price, now)?;
        state.portfolio.close_position(&pair.leveraged, price, now)?;
        let outcome = state
            .outcomes
            .record_exit(&pair.leveraged, price, now)?
            .clone();

        // Feedback loop: rebuild the weight table from the whole log
        state.weights = weights::recompute(&state.outcomes, now);
        if let Some(summary) = weights::summarize(&state.outcomes, &state.weights) {
            info!(
                "learning: {} trades, win rate {}, avg P/L {}, top factor {:?}",
                summary.trade_count, summary.win_rate, summary.avg_pl_fraction, summary.top_factor
            );
        }

        state.versions = self.store.commit(&state)?;
        info!(
            "{}: closed at {} (entered {}), P/L {}",
            pair.leveraged, price, fill.price, pl
        );
        Ok(outcome)
    }

    /// Current signal records
    pub fn signals(&self) -> Result<Vec<Signal>> {
        let state = self.store.load(self.config.starting_cash, Utc::now())?;
        Ok(state.signals.into_values().collect())
    }

    /// Signals requiring user action (open SIGNAL or TARGET hit)
    pub fn actionable_signals(&self) -> Result<Vec<Signal>> {
        Ok(self
            .signals()?
            .into_iter()
            .filter(|s| matches!(s.state, SignalState::Signal | SignalState::Target))
            .collect())
    }

    /// Current portfolio state
    pub fn portfolio(&self) -> Result<PortfolioState> {
        let state = self.store.load(self.config.starting_cash, Utc::now())?;
        Ok(state.portfolio)
    }

    /// Exposure breakdown of the current portfolio
    pub fn exposure(&self) -> Result<ExposureReport> {
        Ok(ExposureReport::from_portfolio(&self.portfolio()?))
    }
}
