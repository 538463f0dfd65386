//! Portfolio state - positions, cash, realized P/L

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::{EngineError, Result};

/// An open position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioPosition {
    pub ticker: String,
    pub underlying: String,
    pub sector: String,
    pub leverage: Decimal,
    pub shares: Decimal,
    pub entry_price: Decimal,
    pub entry_date: DateTime<Utc>,
    pub current_price: Option<Decimal>,
}

impl PortfolioPosition {
    /// Current market value (entry price until marked)
    pub fn market_value(&self) -> Decimal {
        self.shares * self.current_price.unwrap_or(self.entry_price)
    }

    /// Notional exposure after leverage
    pub fn leveraged_exposure(&self) -> Decimal {
        self.market_value() * self.leverage
    }

    /// Unrealized P/L in currency terms
    pub fn unrealized_pl(&self) -> Decimal {
        self.shares * (self.current_price.unwrap_or(self.entry_price) - self.entry_price)
    }
}

/// The portfolio: one logical instance, mutated only by enter/close
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioState {
    pub total_value: Decimal,
    pub cash: Decimal,
    pub positions: Vec<PortfolioPosition>,
    pub realized_pl: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl PortfolioState {
    /// New all-cash portfolio
    pub fn new(starting_cash: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            total_value: starting_cash,
            cash: starting_cash,
            positions: Vec::new(),
            realized_pl: Decimal::ZERO,
            updated_at: now,
        }
    }

    /// Sum of open position market values
    pub fn invested_value(&self) -> Decimal {
        self.positions.iter().map(|p| p.market_value()).sum()
    }

    /// Market value per sector
    pub fn sector_exposure(&self) -> BTreeMap<String, Decimal> {
        let mut by_sector = BTreeMap::new();
        for p in &self.positions {
            *by_sector.entry(p.sector.clone()).or_insert(Decimal::ZERO) += p.market_value();
        }
        by_sector
    }

    /// Sum of leveraged notional exposure
    pub fn leveraged_exposure(&self) -> Decimal {
        self.positions.iter().map(|p| p.leveraged_exposure()).sum()
    }

    pub fn position(&self, ticker: &str) -> Option<&PortfolioPosition> {
        self.positions.iter().find(|p| p.ticker == ticker)
    }

    /// Open a position: deduct cash, record shares at the fill price.
    ///
    /// A notional above available cash is capped at 95% of cash rather
    /// than rejected; the risk gate has already bounded the size.
    pub fn enter_position(
        &mut self,
        ticker: &str,
        underlying: &str,
        sector: &str,
        leverage: Decimal,
        price: Decimal,
        notional: Decimal,
        now: DateTime<Utc>,
    ) -> Result<&PortfolioPosition> {
        if price <= Decimal::ZERO {
            return Err(EngineError::Config(format!(
                "entry price for {ticker} must be positive, got {price}"
            )));
        }
        if self.position(ticker).is_some() {
            return Err(EngineError::Config(format!(
                "position in {ticker} already open"
            )));
        }

        let mut spend = notional;
        if spend > self.cash {
            spend = self.cash * Decimal::new(95, 2);
            debug!(
                "{}: notional {} above cash {}, capped to {}",
                ticker, notional, self.cash, spend
            );
        }

        let shares = spend / price;
        self.positions.push(PortfolioPosition {
            ticker: ticker.to_string(),
            underlying: underlying.to_string(),
            sector: sector.to_string(),
            leverage,
            shares,
            entry_price: price,
            entry_date: now,
            current_price: Some(price),
        });
        self.cash -= spend;
        self.recompute_total(now);

        info!("opened {}: {} shares at {} ({})", ticker, shares, price, spend);
        Ok(self.positions.last().expect("position just pushed"))
    }

    /// Close a position at the given price, returning (P/L fraction,
    /// P/L amount).
    pub fn close_position(
        &mut self,
        ticker: &str,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(Decimal, Decimal)> {
        let idx = self
            .positions
            .iter()
            .position(|p| p.ticker == ticker)
            .ok_or_else(|| EngineError::UnknownTicker(ticker.to_string()))?;
        let pos = self.positions.remove(idx);

        let proceeds = pos.shares * price;
        let cost = pos.shares * pos.entry_price;
        let pl = proceeds - cost;
        let pl_fraction = if pos.entry_price > Decimal::ZERO {
            (price - pos.entry_price) / pos.entry_price
        } else {
            Decimal::ZERO
        };

        self.cash += proceeds;
        self.realized_pl += pl;
        self.recompute_total(now);

        info!(
            "closed {}: {} at {} | P/L {} ({})",
            ticker, pos.shares, price, pl, pl_fraction
        );
        Ok((pl_fraction, pl))
    }

    /// Refresh position prices from the latest snapshot
    pub fn mark_to_market(&mut self, prices: &BTreeMap<String, Decimal>, now: DateTime<Utc>) {
        let mut touched = false;
        for p in &mut self.positions {
            if let Some(price) = prices.get(&p.ticker) {
                p.current_price = Some(*price);
                touched = true;
            }
        }
        if touched {
            self.recompute_total(now);
        }
    }

    fn recompute_total(&mut self, now: DateTime<Utc>) {
        self.total_value = self.cash + self.invested_value();
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn portfolio() -> PortfolioState {
        PortfolioState::new(usd(25_000), Utc::now())
    }

    #[test]
    fn test_enter_deducts_cash() {
        let mut p = portfolio();
        p.enter_position("TQQQ", "QQQ", "nasdaq", usd(3), usd(40), usd(2_000), Utc::now())
            .unwrap();
        assert_eq!(p.cash, usd(23_000));
        assert_eq!(p.total_value, usd(25_000));
        assert_eq!(p.position("TQQQ").unwrap().shares, usd(50));
    }

    #[test]
    fn test_enter_caps_at_available_cash() {
        let mut p = PortfolioState::new(usd(1_000), Utc::now());
        p.enter_position("TQQQ", "QQQ", "nasdaq", usd(3), usd(40), usd(5_000), Utc::now())
            .unwrap();
        // Capped at 95% of cash
        assert_eq!(p.cash, usd(50));
        assert_eq!(p.invested_value(), usd(950));
    }

    #[test]
    fn test_close_realizes_pl() {
        let mut p = portfolio();
        p.enter_position("TQQQ", "QQQ", "nasdaq", usd(3), usd(40), usd(2_000), Utc::now())
            .unwrap();
        let (pl_fraction, pl) = p.close_position("TQQQ", usd(44), Utc::now()).unwrap();
        assert_eq!(pl_fraction, Decimal::new(10, 2));
        assert_eq!(pl, usd(200));
        assert_eq!(p.realized_pl, usd(200));
        assert_eq!(p.cash, usd(25_200));
        assert!(p.positions.is_empty());
    }

    #[test]
    fn test_close_unknown_ticker() {
        let mut p = portfolio();
        let err = p.close_position("SOXL", usd(10), Utc::now()).unwrap_err();
        assert!(matches!(err, EngineError::UnknownTicker(_)));
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let mut p = portfolio();
        p.enter_position("TQQQ", "QQQ", "nasdaq", usd(3), usd(40), usd(2_000), Utc::now())
            .unwrap();
        assert!(p
            .enter_position("TQQQ", "QQQ", "nasdaq", usd(3), usd(41), usd(2_000), Utc::now())
            .is_err());
    }

    #[test]
    fn test_mark_to_market_and_sector_exposure() {
        let mut p = portfolio();
        p.enter_position("TQQQ", "QQQ", "nasdaq", usd(3), usd(40), usd(2_000), Utc::now())
            .unwrap();
        p.enter_position("TECL", "XLK", "technology", usd(3), usd(50), usd(3_000), Utc::now())
            .unwrap();

        let mut prices = BTreeMap::new();
        prices.insert("TQQQ".to_string(), usd(44));
        p.mark_to_market(&prices, Utc::now());

        assert_eq!(p.position("TQQQ").unwrap().unrealized_pl(), usd(200));
        let sectors = p.sector_exposure();
        assert_eq!(sectors["nasdaq"], usd(2_200));
        assert_eq!(sectors["technology"], usd(3_000));
        assert_eq!(p.total_value, usd(25_200));
    }
}
