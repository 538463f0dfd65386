//! Engine configuration

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EngineError, Result};
use crate::risk::RiskLimits;
use crate::sizing::SizingConfig;
use crate::universe::{default_universe, PairSpec};

/// Learning-loop knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Use learned factor weights in confidence scoring
    #[serde(default = "default_weighted_scoring")]
    pub weighted_scoring: bool,
    /// Minimum outcomes behind a factor weight before it scales votes
    #[serde(default = "default_min_factor_samples")]
    pub min_factor_samples: u32,
}

fn default_weighted_scoring() -> bool {
    true
}
fn default_min_factor_samples() -> u32 {
    5
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            weighted_scoring: default_weighted_scoring(),
            min_factor_samples: default_min_factor_samples(),
        }
    }
}

/// Full engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tracked leveraged/underlying pairs
    #[serde(default = "default_universe")]
    pub universe: Vec<PairSpec>,
    #[serde(default)]
    pub risk: RiskLimits,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub learning: LearningConfig,
    /// Cash the portfolio starts with when no state exists yet
    #[serde(default = "default_starting_cash")]
    pub starting_cash: Decimal,
}

fn default_starting_cash() -> Decimal {
    Decimal::from(10_000)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            universe: default_universe(),
            risk: RiskLimits::default(),
            sizing: SizingConfig::default(),
            learning: LearningConfig::default(),
            starting_cash: default_starting_cash(),
        }
    }
}

impl EngineConfig {
    /// Load from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&raw)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate thresholds, limits, and universe consistency
    pub fn validate(&self) -> Result<()> {
        if self.universe.is_empty() {
            return Err(EngineError::Config("universe is empty".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for pair in &self.universe {
            pair.validate()?;
            if !seen.insert(pair.leveraged.clone()) {
                return Err(EngineError::Config(format!(
                    "duplicate leveraged ticker {}",
                    pair.leveraged
                )));
            }
        }
        self.risk.validate()?;
        self.sizing.validate()?;
        if self.starting_cash <= Decimal::ZERO {
            return Err(EngineError::Config(format!(
                "starting_cash must be positive, got {}",
                self.starting_cash
            )));
        }
        Ok(())
    }
}
