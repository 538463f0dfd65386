//! Drawdown measurement from all-time high

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::snapshot::ClosePoint;

/// One drawdown measurement for an underlying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawdownReading {
    pub current_price: Decimal,
    pub ath_price: Decimal,
    pub ath_date: NaiveDate,
    /// Fractional decline from ATH, clamped to >= 0
    pub drawdown: Decimal,
}

/// Measure the current drawdown of a close series, oldest point first.
///
/// Pure over the provided history. Ties for the all-time high resolve
/// to the most recent occurrence. Fails with `InsufficientHistory`
/// below two points.
pub fn measure(ticker: &str, closes: &[ClosePoint]) -> Result<DrawdownReading> {
    if closes.len() < 2 {
        return Err(EngineError::InsufficientHistory {
            ticker: ticker.to_string(),
            points: closes.len(),
        });
    }

    let mut ath = closes[0];
    for point in &closes[1..] {
        if point.close >= ath.close {
            ath = *point;
        }
    }

    let last = closes[closes.len() - 1];
    let drawdown = if ath.close > Decimal::ZERO {
        ((ath.close - last.close) / ath.close).max(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };

    Ok(DrawdownReading {
        current_price: last.close,
        ath_price: ath.close,
        ath_date: ath.date,
        drawdown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(closes: &[i64]) -> Vec<ClosePoint> {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| ClosePoint {
                date: NaiveDate::from_ymd_opt(2025, 1, 1)
                    .unwrap()
                    .checked_add_days(chrono::Days::new(i as u64))
                    .unwrap(),
                close: Decimal::from(*c),
            })
            .collect()
    }

    #[test]
    fn test_six_percent_drawdown() {
        let s = series(&[90, 100, 94]);
        let r = measure("QQQ", &s).unwrap();
        assert_eq!(r.ath_price, Decimal::from(100));
        assert_eq!(r.current_price, Decimal::from(94));
        assert_eq!(r.drawdown, Decimal::new(6, 2));
    }

    #[test]
    fn test_new_high_clamps_to_zero() {
        let s = series(&[90, 100, 105]);
        let r = measure("QQQ", &s).unwrap();
        assert_eq!(r.ath_price, Decimal::from(105));
        assert_eq!(r.drawdown, Decimal::ZERO);
    }

    #[test]
    fn test_ath_tie_takes_most_recent() {
        let mut s = series(&[100, 95, 100, 94]);
        let expected_date = s[2].date;
        let r = measure("QQQ", &s).unwrap();
        assert_eq!(r.ath_date, expected_date);

        // Same tie, reversed magnitudes elsewhere, still most recent
        s.push(ClosePoint {
            date: s[3].date.succ_opt().unwrap(),
            close: Decimal::from(100),
        });
        let r = measure("QQQ", &s).unwrap();
        assert_eq!(r.ath_date, s[4].date);
    }

    #[test]
    fn test_insufficient_history() {
        let s = series(&[100]);
        let err = measure("QQQ", &s).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientHistory { points: 1, .. }
        ));
    }

    #[test]
    fn test_ath_nondecreasing_over_prefixes() {
        let s = series(&[50, 80, 70, 90, 60, 85, 100, 40]);
        let mut prev_ath = Decimal::ZERO;
        for end in 2..=s.len() {
            let r = measure("QQQ", &s[..end]).unwrap();
            assert!(r.ath_price >= prev_ath);
            assert!(r.drawdown >= Decimal::ZERO && r.drawdown < Decimal::ONE);
            prev_ath = r.ath_price;
        }
    }
}
