//! End-to-end engine test harness
//!
//! Validates the full decision loop:
//! snapshot -> drawdown -> lifecycle -> confidence/veto/sizing ->
//! enter -> target -> close -> outcome log + factor weights

use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

use signal_engine::{
    factors::{MarketTone, RotationRegime, VolRegime},
    ClosePoint, Engine, EngineConfig, EnterOutcome, FactorInputs, LimitCriterion, MarketSnapshot,
    PairSpec, SignalState, SizingMethod, StateStore,
};

fn usd(v: i64) -> Decimal {
    Decimal::from(v)
}

fn pct(bps: i64) -> Decimal {
    Decimal::new(bps, 4)
}

fn pair(leveraged: &str, underlying: &str, sector: &str) -> PairSpec {
    PairSpec {
        leveraged: leveraged.to_string(),
        underlying: underlying.to_string(),
        name: format!("{leveraged} 3x Bull"),
        sector: sector.to_string(),
        leverage: usd(3),
        entry_threshold: pct(500),
        alert_threshold: pct(300),
        profit_target: pct(1000),
    }
}

fn series(closes: &[i64]) -> Vec<ClosePoint> {
    let start = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, c)| ClosePoint {
            date: start.checked_add_days(chrono::Days::new(i as u64)).unwrap(),
            close: Decimal::from(*c),
        })
        .collect()
}

/// Snapshot with one underlying series and one leveraged price
fn snapshot(day: u32, histories: &[(&str, &[i64])], prices: &[(&str, i64)]) -> MarketSnapshot {
    let mut s = MarketSnapshot::empty(Utc.with_ymd_and_hms(2025, 7, day, 21, 0, 0).unwrap());
    for (ticker, closes) in histories {
        s.underlying_history
            .insert(ticker.to_string(), series(closes));
    }
    for (ticker, price) in prices {
        s.leveraged_prices.insert(ticker.to_string(), usd(*price));
    }
    s.factors = FactorInputs {
        volatility_regime: Some(VolRegime::Elevated),
        social_sentiment: Some(MarketTone::Bearish),
        news_sentiment: Some(MarketTone::Bearish),
        rotation: Some(RotationRegime::RiskOff),
        ..Default::default()
    };
    s
}

fn engine_with(config: EngineConfig, dir: &std::path::Path) -> Engine {
    let store = StateStore::open(dir).unwrap();
    Engine::new(config, store).unwrap()
}

fn single_pair_config() -> EngineConfig {
    EngineConfig {
        universe: vec![pair("TQQQ", "QQQ", "nasdaq")],
        starting_cash: usd(25_000),
        ..Default::default()
    }
}

#[test]
fn full_signal_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(single_pair_config(), dir.path());

    // Day 1: at the high -> WATCH
    let report = engine
        .refresh_cycle(&snapshot(1, &[("QQQ", &[90, 95, 100])], &[("TQQQ", 50)]))
        .unwrap();
    assert_eq!(report.evaluated[0].state, SignalState::Watch);
    assert!(report.evaluated[0].assessment.is_none());

    // Day 2: 3.5% off the high -> ALERT
    let report = engine
        .refresh_cycle(&snapshot(2, &[("QQQ", &[90, 95, 100, 97])], &[("TQQQ", 46)]))
        .unwrap();
    // 3/100 drawdown = 3% is right at alert; 97 -> 3%
    assert_eq!(report.evaluated[0].state, SignalState::Alert);

    // Day 3: 6% off -> SIGNAL with assessment, veto, sizing attached
    let report = engine
        .refresh_cycle(&snapshot(3, &[("QQQ", &[90, 95, 100, 97, 94])], &[("TQQQ", 40)]))
        .unwrap();
    let evaluation = &report.evaluated[0];
    assert_eq!(evaluation.state, SignalState::Signal);
    assert_eq!(evaluation.drawdown, pct(600));
    let assessment = evaluation.assessment.as_ref().unwrap();
    assert_eq!(assessment.total, 14);
    assert!(evaluation.veto.as_ref().unwrap().is_approved());
    let sizing = evaluation.sizing.as_ref().unwrap();
    // 2% of 25k at 3x leverage
    assert_eq!(sizing.notional, usd(500) / usd(3));
    assert_eq!(report.actionable().len(), 1);

    // Explicit enter at 40
    let entry_snapshot = snapshot(3, &[("QQQ", &[90, 95, 100, 97, 94])], &[("TQQQ", 40)]);
    let outcome = engine.enter("TQQQ", usd(40), &entry_snapshot).unwrap();
    match outcome {
        EnterOutcome::Entered { assessment, .. } => {
            assert_eq!(assessment.total, 14);
        }
        EnterOutcome::Vetoed(reason) => panic!("unexpected veto: {reason}"),
    }

    let signals = engine.signals().unwrap();
    assert_eq!(signals[0].state, SignalState::Active);
    assert!(signals[0].entry.is_some());
    let portfolio = engine.portfolio().unwrap();
    assert_eq!(portfolio.positions.len(), 1);

    // Re-entering an ACTIVE signal is an invalid transition
    assert!(engine.enter("TQQQ", usd(40), &entry_snapshot).is_err());

    // Next cycle: leveraged price hits +12.5% -> TARGET; the
    // underlying's recovery is ignored while the position is held
    let report = engine
        .refresh_cycle(&snapshot(
            4,
            &[("QQQ", &[90, 95, 100, 97, 94, 99])],
            &[("TQQQ", 45)],
        ))
        .unwrap();
    assert_eq!(report.evaluated[0].state, SignalState::Target);
    assert_eq!(report.actionable().len(), 1);

    // Close at 45: outcome recorded, weights learned, signal freed
    let outcome = engine.close("TQQQ", usd(45)).unwrap();
    assert!(outcome.win);
    assert_eq!(outcome.pl_fraction, Decimal::new(125, 3));
    assert_eq!(outcome.factors_at_entry.len(), 14);

    let signals = engine.signals().unwrap();
    assert_eq!(signals[0].state, SignalState::Watch);
    assert!(signals[0].entry.is_none());

    let portfolio = engine.portfolio().unwrap();
    assert!(portfolio.positions.is_empty());
    assert!(portfolio.realized_pl > Decimal::ZERO);

    // Closing again is an invalid transition
    assert!(engine.close("TQQQ", usd(45)).is_err());
}

#[test]
fn sector_cap_vetoes_third_entry() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig {
        universe: vec![
            pair("TECL", "XLK", "tech"),
            pair("SOXL", "SOXX", "tech"),
            pair("TQQQ", "QQQ", "tech"),
        ],
        starting_cash: usd(25_000),
        ..Default::default()
    };
    // 60% risk at 3x leverage = 20% of the book per entry
    config.sizing.risk_fraction = pct(6000);
    let engine = engine_with(config, dir.path());

    // All three underlyings 6% off their highs -> three SIGNALs
    let dip = [90, 95, 100, 97, 94];
    let s = snapshot(
        10,
        &[("XLK", &dip), ("SOXX", &dip), ("QQQ", &dip)],
        &[("TECL", 50), ("SOXL", 20), ("TQQQ", 40)],
    );
    let report = engine.refresh_cycle(&s).unwrap();
    assert_eq!(report.actionable().len(), 3);

    assert!(matches!(
        engine.enter("TECL", usd(50), &s).unwrap(),
        EnterOutcome::Entered { .. }
    ));
    assert!(matches!(
        engine.enter("SOXL", usd(20), &s).unwrap(),
        EnterOutcome::Entered { .. }
    ));

    // Third same-sector entry pushes tech past the 50% cap
    match engine.enter("TQQQ", usd(40), &s).unwrap() {
        EnterOutcome::Vetoed(reason) => {
            assert_eq!(reason.criterion, LimitCriterion::SectorFraction);
            assert_eq!(reason.current, pct(4000));
            assert_eq!(reason.after_entry, pct(6000));
            assert_eq!(reason.limit, pct(5000));
        }
        EnterOutcome::Entered { .. } => panic!("expected sector veto"),
    }

    // The veto mutated nothing: TQQQ still an open SIGNAL, book unchanged
    let signals = engine.signals().unwrap();
    let tqqq = signals
        .iter()
        .find(|s| s.leveraged_ticker == "TQQQ")
        .unwrap();
    assert_eq!(tqqq.state, SignalState::Signal);
    assert!(tqqq.entry.is_none());
    assert_eq!(engine.portfolio().unwrap().positions.len(), 2);
}

#[test]
fn pair_failures_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        universe: vec![pair("TQQQ", "QQQ", "nasdaq"), pair("TECL", "XLK", "tech")],
        starting_cash: usd(25_000),
        ..Default::default()
    };
    let engine = engine_with(config, dir.path());

    // XLK has a single stale point; QQQ is fine. The cycle must
    // evaluate QQQ and skip XLK with its prior state retained.
    let s = snapshot(
        5,
        &[("QQQ", &[90, 95, 100, 94]), ("XLK", &[80])],
        &[("TQQQ", 40), ("TECL", 50)],
    );
    let report = engine.refresh_cycle(&s).unwrap();
    assert_eq!(report.evaluated.len(), 1);
    assert_eq!(report.evaluated[0].ticker, "TQQQ");
    assert_eq!(report.evaluated[0].state, SignalState::Signal);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].ticker, "TECL");
    assert!(report.skipped[0].reason.contains("insufficient price history"));

    // The skipped pair still exists, untouched, in the signal set
    let signals = engine.signals().unwrap();
    let tecl = signals
        .iter()
        .find(|s| s.leveraged_ticker == "TECL")
        .unwrap();
    assert_eq!(tecl.state, SignalState::Watch);
}

#[test]
fn kelly_without_history_falls_back_to_fixed_fraction() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = single_pair_config();
    config.sizing.method = SizingMethod::HalfKelly;
    let engine = engine_with(config, dir.path());

    let report = engine
        .refresh_cycle(&snapshot(7, &[("QQQ", &[90, 95, 100, 94])], &[("TQQQ", 40)]))
        .unwrap();
    let sizing = report.evaluated[0].sizing.as_ref().unwrap();
    // No closed trades yet: the engine downgraded to fixed-fraction
    assert_eq!(sizing.method, SizingMethod::FixedFraction);
    assert!(sizing.notional > Decimal::ZERO);
}

#[test]
fn state_survives_engine_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = engine_with(single_pair_config(), dir.path());
        engine
            .refresh_cycle(&snapshot(1, &[("QQQ", &[90, 95, 100, 94])], &[("TQQQ", 40)]))
            .unwrap();
        let signals = engine.signals().unwrap();
        assert_eq!(signals[0].state, SignalState::Signal);
    }

    // A fresh engine over the same data directory sees the same state
    let engine = engine_with(single_pair_config(), dir.path());
    let signals = engine.signals().unwrap();
    assert_eq!(signals[0].state, SignalState::Signal);
    assert_eq!(signals[0].underlying_ath, usd(100));

    // ATH ratchet holds across restart: a gappy re-fetch with a lower
    // high does not lower the stored ATH
    let report = engine
        .refresh_cycle(&snapshot(2, &[("QQQ", &[95, 93])], &[("TQQQ", 39)]))
        .unwrap();
    assert_eq!(report.evaluated[0].drawdown, pct(700));
    let signals = engine.signals().unwrap();
    assert_eq!(signals[0].underlying_ath, usd(100));
}

#[test]
fn contrarian_factors_lift_confidence() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(single_pair_config(), dir.path());

    // Deep drawdown (9% vs 5% threshold) with bearish sentiment
    let mut s = snapshot(8, &[("QQQ", &[90, 95, 100, 91])], &[("TQQQ", 40)]);
    let report = engine.refresh_cycle(&s).unwrap();
    let with_bearish = report.evaluated[0]
        .assessment
        .as_ref()
        .unwrap()
        .favorable;

    // Same snapshot with bullish crowds: two fewer favorable factors
    s.factors.social_sentiment = Some(MarketTone::Bullish);
    s.factors.news_sentiment = Some(MarketTone::Bullish);
    s.as_of = Utc.with_ymd_and_hms(2025, 7, 9, 21, 0, 0).unwrap();
    let report = engine.refresh_cycle(&s).unwrap();
    let with_bullish = report.evaluated[0]
        .assessment
        .as_ref()
        .unwrap()
        .favorable;

    assert_eq!(with_bearish, with_bullish + 2);
}
