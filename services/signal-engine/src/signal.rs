//! Signal lifecycle - per-pair state machine
//!
//! WATCH -> ALERT -> SIGNAL are driven by the underlying's drawdown
//! with hysteresis (recovery exits through the lower bound). SIGNAL ->
//! ACTIVE happens only through an explicit, veto-approved `enter`;
//! ACTIVE/TARGET ignore drawdown entirely and are driven by live P/L
//! until an explicit `close` frees the pair back to WATCH.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::drawdown::DrawdownReading;
use crate::error::{EngineError, Result};
use crate::universe::PairSpec;

/// Signal lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalState {
    Watch,
    Alert,
    Signal,
    Active,
    Target,
}

impl SignalState {
    /// True while a position is held
    pub fn holds_position(&self) -> bool {
        matches!(self, SignalState::Active | SignalState::Target)
    }
}

impl std::fmt::Display for SignalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalState::Watch => write!(f, "WATCH"),
            SignalState::Alert => write!(f, "ALERT"),
            SignalState::Signal => write!(f, "SIGNAL"),
            SignalState::Active => write!(f, "ACTIVE"),
            SignalState::Target => write!(f, "TARGET"),
        }
    }
}

/// Entry fill recorded when a signal goes ACTIVE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFill {
    pub price: Decimal,
    pub date: DateTime<Utc>,
}

/// A tracked trading signal for one leveraged/underlying pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub leveraged_ticker: String,
    pub underlying_ticker: String,
    pub leverage: Decimal,
    pub state: SignalState,
    /// Current drawdown fraction of the underlying from its ATH
    pub underlying_drawdown: Decimal,
    /// Highest underlying price ever observed; never decreases
    pub underlying_ath: Decimal,
    pub underlying_ath_date: Option<NaiveDate>,
    pub underlying_price: Decimal,
    pub entry_threshold: Decimal,
    pub alert_threshold: Decimal,
    pub profit_target: Decimal,
    /// Present exactly while state is ACTIVE or TARGET
    pub entry: Option<EntryFill>,
    pub leveraged_price: Option<Decimal>,
    /// Unrealized P/L fraction while a position is held
    pub unrealized_pl: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Drawdown-driven state transition, pure over its inputs.
///
/// A reading at or past the entry threshold opens SIGNAL from any
/// non-holding state, including WATCH directly (gapped data may never
/// print an ALERT-band reading). Holding states are untouched here.
pub fn state_for_drawdown(
    previous: SignalState,
    drawdown: Decimal,
    alert_threshold: Decimal,
    entry_threshold: Decimal,
) -> SignalState {
    if previous.holds_position() {
        return previous;
    }
    if drawdown >= entry_threshold {
        SignalState::Signal
    } else if drawdown >= alert_threshold {
        SignalState::Alert
    } else {
        SignalState::Watch
    }
}

impl Signal {
    /// Fresh WATCH signal for a configured pair
    pub fn new(spec: &PairSpec, now: DateTime<Utc>) -> Self {
        Self {
            leveraged_ticker: spec.leveraged.clone(),
            underlying_ticker: spec.underlying.clone(),
            leverage: spec.leverage,
            state: SignalState::Watch,
            underlying_drawdown: Decimal::ZERO,
            underlying_ath: Decimal::ZERO,
            underlying_ath_date: None,
            underlying_price: Decimal::ZERO,
            entry_threshold: spec.entry_threshold,
            alert_threshold: spec.alert_threshold,
            profit_target: spec.profit_target,
            entry: None,
            leveraged_price: None,
            unrealized_pl: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fold a drawdown reading into the signal.
    ///
    /// The persisted ATH only ever ratchets upward; if re-fetched
    /// history comes back with gaps below it, the drawdown is
    /// recomputed against the kept ATH.
    pub fn absorb_reading(&mut self, reading: &DrawdownReading, now: DateTime<Utc>) {
        if reading.ath_price >= self.underlying_ath {
            self.underlying_ath = reading.ath_price;
            self.underlying_ath_date = Some(reading.ath_date);
            self.underlying_drawdown = reading.drawdown;
        } else {
            self.underlying_drawdown = ((self.underlying_ath - reading.current_price)
                / self.underlying_ath)
                .max(Decimal::ZERO);
        }
        self.underlying_price = reading.current_price;

        let next = state_for_drawdown(
            self.state,
            self.underlying_drawdown,
            self.alert_threshold,
            self.entry_threshold,
        );
        if next != self.state {
            debug!(
                "{}: {} -> {} (drawdown {})",
                self.leveraged_ticker, self.state, next, self.underlying_drawdown
            );
            self.state = next;
        }
        self.updated_at = now;
    }

    /// Update a held position with the current leveraged price.
    ///
    /// P/L alone decides ACTIVE vs TARGET; a TARGET position whose P/L
    /// slips back under the target reverts to ACTIVE. No-op unless a
    /// position is held.
    pub fn mark_position(&mut self, leveraged_price: Decimal, now: DateTime<Utc>) {
        let Some(fill) = self.entry else {
            return;
        };
        if fill.price <= Decimal::ZERO {
            return;
        }
        let pl = (leveraged_price - fill.price) / fill.price;
        self.leveraged_price = Some(leveraged_price);
        self.unrealized_pl = Some(pl);
        let next = if pl >= self.profit_target {
            SignalState::Target
        } else {
            SignalState::Active
        };
        if next != self.state {
            debug!(
                "{}: {} -> {} (P/L {})",
                self.leveraged_ticker, self.state, next, pl
            );
            self.state = next;
        }
        self.updated_at = now;
    }

    /// Record a veto-approved entry fill. Only valid from SIGNAL.
    pub fn begin_entry(&mut self, price: Decimal, now: DateTime<Utc>) -> Result<()> {
        if self.state != SignalState::Signal {
            return Err(EngineError::InvalidTransition {
                ticker: self.leveraged_ticker.clone(),
                state: self.state,
                operation: "enter",
            });
        }
        self.entry = Some(EntryFill { price, date: now });
        self.leveraged_price = Some(price);
        self.unrealized_pl = Some(Decimal::ZERO);
        self.state = SignalState::Active;
        self.updated_at = now;
        Ok(())
    }

    /// Close out a held position, returning the fill and realized P/L
    /// fraction. Only valid from ACTIVE/TARGET; frees the pair back to
    /// WATCH with entry fields cleared.
    pub fn close_out(&mut self, price: Decimal, now: DateTime<Utc>) -> Result<(EntryFill, Decimal)> {
        if !self.state.holds_position() {
            return Err(EngineError::InvalidTransition {
                ticker: self.leveraged_ticker.clone(),
                state: self.state,
                operation: "close",
            });
        }
        // holds_position implies the fill is present
        let fill = self.entry.take().ok_or_else(|| EngineError::InvalidTransition {
            ticker: self.leveraged_ticker.clone(),
            state: self.state,
            operation: "close",
        })?;
        let pl = if fill.price > Decimal::ZERO {
            (price - fill.price) / fill.price
        } else {
            Decimal::ZERO
        };
        self.state = SignalState::Watch;
        self.leveraged_price = None;
        self.unrealized_pl = None;
        self.updated_at = now;
        Ok((fill, pl))
    }
}
