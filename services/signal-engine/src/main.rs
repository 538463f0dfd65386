//! Signal Engine - mean-reversion decision service
//!
//! Long-running loop that:
//! 1. Watches for market snapshots dropped by data-retrieval
//! 2. Runs a refresh cycle over the tracked universe on each new one
//! 3. Persists signals, portfolio, outcomes, and factor weights
//!
//! Entries and exits are explicit operations exposed by the library;
//! this binary only keeps the signal picture current.

use std::path::PathBuf;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};

use signal_engine::{Engine, EngineConfig, MarketSnapshot, StateStore};

/// Runtime configuration loaded from environment
#[derive(Debug, Clone)]
struct RuntimeConfig {
    config_path: Option<PathBuf>,
    data_dir: PathBuf,
    snapshot_path: PathBuf,
    refresh_interval: Duration,
    run_once: bool,
}

fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let config_path = std::env::var("ENGINE_CONFIG").ok().map(PathBuf::from);

    let data_dir = std::env::var("DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("signal-engine")
    });

    let snapshot_path = std::env::var("SNAPSHOT_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data_dir.join("snapshot.json"));

    let refresh_interval = std::env::var("REFRESH_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(300));

    let run_once = std::env::var("RUN_ONCE").is_ok();

    Ok(RuntimeConfig {
        config_path,
        data_dir,
        snapshot_path,
        refresh_interval,
        run_once,
    })
}

fn load_snapshot(path: &PathBuf) -> anyhow::Result<MarketSnapshot> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Starting Signal Engine...");

    let runtime = load_runtime_config()?;
    info!(
        "Data dir: {:?}, snapshot: {:?}, interval: {:?}",
        runtime.data_dir, runtime.snapshot_path, runtime.refresh_interval
    );

    let config = match &runtime.config_path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    info!(
        "Tracking {} pairs, starting cash {}",
        config.universe.len(),
        config.starting_cash
    );

    let store = StateStore::open(&runtime.data_dir)?;
    let engine = Engine::new(config, store)?;

    let mut tick = interval(runtime.refresh_interval);
    let mut last_snapshot_time = None;

    loop {
        tick.tick().await;

        let snapshot = match load_snapshot(&runtime.snapshot_path) {
            Ok(s) => s,
            Err(e) => {
                warn!("No usable snapshot at {:?}: {}", runtime.snapshot_path, e);
                if runtime.run_once {
                    return Err(e);
                }
                continue;
            }
        };

        // Skip cycles until data-retrieval drops a fresh snapshot
        if last_snapshot_time == Some(snapshot.as_of) && !runtime.run_once {
            continue;
        }
        last_snapshot_time = Some(snapshot.as_of);

        match engine.refresh_cycle(&snapshot) {
            Ok(report) => {
                for evaluation in report.actionable() {
                    info!(
                        "ACTION {}: {} at {} drawdown",
                        evaluation.ticker, evaluation.state, evaluation.drawdown
                    );
                }
                for skip in &report.skipped {
                    warn!("skipped {}: {}", skip.ticker, skip.reason);
                }
                if let Ok(exposure) = engine.exposure() {
                    info!(
                        "portfolio: {} total, {} invested, {} positions, {} leveraged",
                        exposure.total_value,
                        exposure.invested_fraction,
                        exposure.position_count,
                        exposure.leveraged_ratio
                    );
                }
            }
            Err(e) => {
                error!("Refresh cycle error: {}", e);
            }
        }

        if runtime.run_once {
            info!("RUN_ONCE set, exiting after one cycle");
            return Ok(());
        }
    }
}
