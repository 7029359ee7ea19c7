//! Engine configuration
//!
//! Loaded from an embedded default (`config/engine.toml`) with an optional
//! user override file applied on top. Override files may be partial.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration (embedded at compile time)
const DEFAULT_CONFIG: &str = include_str!("../../../config/engine.toml");

/// Sweep interval bounds in seconds
const MIN_SWEEP_SECS: u64 = 10;
const MAX_SWEEP_SECS: u64 = 60;

/// Thresholds and tolerances for the matching engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub match_floor: u8,
    pub auto_confirm_floor: u8,
    pub amount_tolerance_bps: u32,
    pub price_tolerance_bps: u32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            match_floor: 60,
            auto_confirm_floor: 70,
            amount_tolerance_bps: 5,
            price_tolerance_bps: 5,
        }
    }
}

impl MatchingConfig {
    /// Relative tolerances as decimal fractions
    pub fn tolerance(&self) -> Tolerance {
        Tolerance {
            amount: Decimal::new(self.amount_tolerance_bps as i64, 4),
            price: Decimal::new(self.price_tolerance_bps as i64, 4),
        }
    }
}

/// Relative tolerances used by the comparator (0.0005 = 0.05%)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tolerance {
    pub amount: Decimal,
    pub price: Decimal,
}

impl Default for Tolerance {
    fn default() -> Self {
        MatchingConfig::default().tolerance()
    }
}

/// Automation scheduler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationConfig {
    pub sweep_interval_secs: u64,
    pub max_delay_minutes: i64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
            max_delay_minutes: 1440,
        }
    }
}

impl AutomationConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub matching: MatchingConfig,
    pub automation: AutomationConfig,
}

impl EngineConfig {
    /// Load the embedded default, then the override file if one exists.
    ///
    /// An explicit path must exist; the platform default path is optional.
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        apply_toml(&mut config, DEFAULT_CONFIG)?;

        let path = match override_path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Some(path.to_path_buf())
            }
            None => default_config_path().filter(|p| p.exists()),
        };

        if let Some(path) = path {
            let content = fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;
            apply_toml(&mut config, &content)?;
            tracing::debug!("Loaded engine config override from {}", path.display());
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a complete or partial TOML document over the defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config = Self::default();
        apply_toml(&mut config, content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let m = &self.matching;
        if m.match_floor > 100 || m.auto_confirm_floor > 100 {
            return Err(Error::Config(
                "match_floor and auto_confirm_floor must be within 0..=100".into(),
            ));
        }
        if m.match_floor > m.auto_confirm_floor {
            return Err(Error::Config(format!(
                "match_floor ({}) must not exceed auto_confirm_floor ({})",
                m.match_floor, m.auto_confirm_floor
            )));
        }
        let a = &self.automation;
        if !(MIN_SWEEP_SECS..=MAX_SWEEP_SECS).contains(&a.sweep_interval_secs) {
            return Err(Error::Config(format!(
                "sweep_interval_secs must be within {}..={}",
                MIN_SWEEP_SECS, MAX_SWEEP_SECS
            )));
        }
        if a.max_delay_minutes < 0 {
            return Err(Error::Config("max_delay_minutes must not be negative".into()));
        }
        Ok(())
    }
}

/// Get the default override config path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("confirma").join("config").join("engine.toml"))
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    matching: Option<RawMatching>,
    automation: Option<RawAutomation>,
}

#[derive(Debug, Deserialize)]
struct RawMatching {
    match_floor: Option<u8>,
    auto_confirm_floor: Option<u8>,
    amount_tolerance_bps: Option<u32>,
    price_tolerance_bps: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawAutomation {
    sweep_interval_secs: Option<u64>,
    max_delay_minutes: Option<i64>,
}

fn apply_toml(config: &mut EngineConfig, content: &str) -> Result<()> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    if let Some(matching) = raw.matching {
        if let Some(v) = matching.match_floor {
            config.matching.match_floor = v;
        }
        if let Some(v) = matching.auto_confirm_floor {
            config.matching.auto_confirm_floor = v;
        }
        if let Some(v) = matching.amount_tolerance_bps {
            config.matching.amount_tolerance_bps = v;
        }
        if let Some(v) = matching.price_tolerance_bps {
            config.matching.price_tolerance_bps = v;
        }
    }

    if let Some(automation) = raw.automation {
        if let Some(v) = automation.sweep_interval_secs {
            config.automation.sweep_interval_secs = v;
        }
        if let Some(v) = automation.max_delay_minutes {
            config.automation.max_delay_minutes = v;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_default_matches_code_default() {
        let config = EngineConfig::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_toml("[matching]\nmatch_floor = 50\n").unwrap();
        assert_eq!(config.matching.match_floor, 50);
        assert_eq!(config.matching.auto_confirm_floor, 70);
        assert_eq!(config.automation.sweep_interval_secs, 30);
    }

    #[test]
    fn test_tolerance_from_bps() {
        let tolerance = MatchingConfig::default().tolerance();
        assert_eq!(tolerance.amount, "0.0005".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_rejects_inverted_floors() {
        let err = EngineConfig::from_toml("[matching]\nmatch_floor = 80\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_sweep_interval_out_of_range() {
        assert!(EngineConfig::from_toml("[automation]\nsweep_interval_secs = 5\n").is_err());
        assert!(EngineConfig::from_toml("[automation]\nsweep_interval_secs = 61\n").is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        fs::write(&path, "[automation]\nmax_delay_minutes = 60\n").unwrap();

        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.automation.max_delay_minutes, 60);

        let missing = dir.path().join("missing.toml");
        assert!(EngineConfig::load(Some(&missing)).is_err());
    }
}
