//! Persisted state - versioned JSON documents
//!
//! Four documents live under the data directory: signals.json,
//! portfolio.json, outcomes.json, weights.json. Every document carries
//! a monotonic version; a write first checks that the on-disk version
//! still matches the version that was loaded, and replaces the file
//! through a temp-file rename so readers never observe a partial
//! document. A concurrent writer that lost the race gets `StaleState`
//! instead of silently clobbering its peer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::outcomes::OutcomeLog;
use crate::portfolio::PortfolioState;
use crate::signal::Signal;
use crate::weights::WeightTable;

const SIGNALS_FILE: &str = "signals.json";
const PORTFOLIO_FILE: &str = "portfolio.json";
const OUTCOMES_FILE: &str = "outcomes.json";
const WEIGHTS_FILE: &str = "weights.json";

#[derive(Debug, Serialize, Deserialize)]
struct Versioned<T> {
    version: u64,
    data: T,
}

/// Versions the current state was loaded at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateVersions {
    pub signals: u64,
    pub portfolio: u64,
    pub outcomes: u64,
    pub weights: u64,
}

/// Everything the engine reads and writes in one cycle
#[derive(Debug, Clone)]
pub struct EngineState {
    pub signals: BTreeMap<String, Signal>,
    pub portfolio: PortfolioState,
    pub outcomes: OutcomeLog,
    pub weights: WeightTable,
    pub versions: StateVersions,
}

/// File-backed state store
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Open (and create if needed) the data directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the whole state, initializing missing documents
    pub fn load(&self, starting_cash: Decimal, now: DateTime<Utc>) -> Result<EngineState> {
        let signals = self.read::<BTreeMap<String, Signal>>(SIGNALS_FILE)?;
        let portfolio = self.read::<PortfolioState>(PORTFOLIO_FILE)?;
        let outcomes = self.read::<OutcomeLog>(OUTCOMES_FILE)?;
        let weights = self.read::<WeightTable>(WEIGHTS_FILE)?;

        let versions = StateVersions {
            signals: signals.as_ref().map(|d| d.version).unwrap_or(0),
            portfolio: portfolio.as_ref().map(|d| d.version).unwrap_or(0),
            outcomes: outcomes.as_ref().map(|d| d.version).unwrap_or(0),
            weights: weights.as_ref().map(|d| d.version).unwrap_or(0),
        };

        Ok(EngineState {
            signals: signals.map(|d| d.data).unwrap_or_default(),
            portfolio: portfolio
                .map(|d| d.data)
                .unwrap_or_else(|| PortfolioState::new(starting_cash, now)),
            outcomes: outcomes.map(|d| d.data).unwrap_or_default(),
            weights: weights.map(|d| d.data).unwrap_or_default(),
            versions,
        })
    }

    /// Write the whole state back, failing with `StaleState` if any
    /// document changed on disk since it was loaded
    pub fn commit(&self, state: &EngineState) -> Result<StateVersions> {
        // Verify every version before touching any file, so a stale
        // writer leaves nothing half-committed.
        self.check_version(SIGNALS_FILE, state.versions.signals)?;
        self.check_version(PORTFOLIO_FILE, state.versions.portfolio)?;
        self.check_version(OUTCOMES_FILE, state.versions.outcomes)?;
        self.check_version(WEIGHTS_FILE, state.versions.weights)?;

        let versions = StateVersions {
            signals: self.write(SIGNALS_FILE, &state.signals, state.versions.signals)?,
            portfolio: self.write(PORTFOLIO_FILE, &state.portfolio, state.versions.portfolio)?,
            outcomes: self.write(OUTCOMES_FILE, &state.outcomes, state.versions.outcomes)?,
            weights: self.write(WEIGHTS_FILE, &state.weights, state.versions.weights)?,
        };
        debug!("state committed at versions {:?}", versions);
        Ok(versions)
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn read<T: DeserializeOwned>(&self, file: &str) -> Result<Option<Versioned<T>>> {
        let path = self.path(file);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn on_disk_version(&self, file: &str) -> Result<u64> {
        #[derive(Deserialize)]
        struct VersionOnly {
            version: u64,
        }
        let path = self.path(file);
        if !path.exists() {
            return Ok(0);
        }
        let raw = fs::read_to_string(&path)?;
        let v: VersionOnly = serde_json::from_str(&raw)?;
        Ok(v.version)
    }

    fn check_version(&self, file: &str, loaded: u64) -> Result<()> {
        let on_disk = self.on_disk_version(file)?;
        if on_disk != loaded {
            return Err(EngineError::StaleState {
                document: file.to_string(),
                on_disk,
                loaded,
            });
        }
        Ok(())
    }

    fn write<T: Serialize>(&self, file: &str, data: &T, loaded_version: u64) -> Result<u64> {
        let next = loaded_version + 1;
        let doc = Versioned {
            version: next,
            data,
        };
        let json = serde_json::to_string_pretty(&doc)?;

        let path = self.path(file);
        let tmp = self.dir.join(format!("{file}.tmp"));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(next)
    }
}
