//! Configuration file support for formula tooling.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/formula/config.toml`,
//! then selected limits can be overridden from the environment.

use crate::budget::{TrimPolicy, DEFAULT_MINOR_OVERAGE_FRACTION};
use crate::correction::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::engine::EngineLimits;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub correction: CorrectionConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Mass and capsule limits handed to the engine
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_ceiling_mg")]
    pub ceiling_mg: f64,

    #[serde(default = "default_minor_overage_fraction")]
    pub minor_overage_fraction: f64,

    #[serde(default = "default_capsule_capacity_mg")]
    pub capsule_capacity_mg: f64,

    #[serde(default = "default_trim_bases_last")]
    pub trim_bases_last: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            ceiling_mg: default_ceiling_mg(),
            minor_overage_fraction: default_minor_overage_fraction(),
            capsule_capacity_mg: default_capsule_capacity_mg(),
            trim_bases_last: default_trim_bases_last(),
        }
    }
}

/// Correction loop configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CorrectionConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

/// External catalog configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct CatalogConfig {
    /// Catalog file to load instead of the built-in one
    pub path: Option<PathBuf>,
}

// Default value functions
fn home_dir_or_cwd() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| home_dir_or_cwd().join(".local/share"));
    base.join("formula")
}

fn default_ceiling_mg() -> f64 {
    5500.0
}

fn default_minor_overage_fraction() -> f64 {
    DEFAULT_MINOR_OVERAGE_FRACTION
}

fn default_capsule_capacity_mg() -> f64 {
    500.0
}

fn default_trim_bases_last() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// Environment variables that override file settings
pub const ENV_CEILING_MG: &str = "FORMULA_CEILING_MG";
pub const ENV_MINOR_OVERAGE_FRACTION: &str = "FORMULA_MINOR_OVERAGE_FRACTION";
pub const ENV_CAPSULE_CAPACITY_MG: &str = "FORMULA_CAPSULE_CAPACITY_MG";
pub const ENV_MAX_ATTEMPTS: &str = "FORMULA_MAX_ATTEMPTS";

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has invalid value '{}'", key, raw))),
    }
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| home_dir_or_cwd().join(".config"));
        base.join("formula").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = parse_override(&lookup, ENV_CEILING_MG)? {
            self.limits.ceiling_mg = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_MINOR_OVERAGE_FRACTION)? {
            self.limits.minor_overage_fraction = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_CAPSULE_CAPACITY_MG)? {
            self.limits.capsule_capacity_mg = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_MAX_ATTEMPTS)? {
            self.correction.max_attempts = v;
        }
        Ok(())
    }

    /// Reject limits the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        let limits = &self.limits;
        if !(limits.ceiling_mg.is_finite() && limits.ceiling_mg > 0.0) {
            return Err(Error::Config(format!(
                "ceiling_mg must be positive, got {}",
                limits.ceiling_mg
            )));
        }
        if !(limits.capsule_capacity_mg.is_finite() && limits.capsule_capacity_mg > 0.0) {
            return Err(Error::Config(format!(
                "capsule_capacity_mg must be positive, got {}",
                limits.capsule_capacity_mg
            )));
        }
        if !(limits.minor_overage_fraction > 0.0 && limits.minor_overage_fraction < 1.0) {
            return Err(Error::Config(format!(
                "minor_overage_fraction must be between 0 and 1, got {}",
                limits.minor_overage_fraction
            )));
        }
        if self.correction.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn engine_limits(&self) -> EngineLimits {
        EngineLimits {
            ceiling_mg: self.limits.ceiling_mg,
            minor_overage_fraction: self.limits.minor_overage_fraction,
            capsule_capacity_mg: self.limits.capsule_capacity_mg,
            trim_policy: TrimPolicy {
                additions_before_bases: self.limits.trim_bases_last,
            },
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.correction.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.limits.ceiling_mg, 5500.0);
        assert_eq!(config.limits.minor_overage_fraction, 0.15);
        assert_eq!(config.correction.max_attempts, 3);
        assert!(config.catalog.path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested/config.toml");

        let mut config = Config::default();
        config.limits.ceiling_mg = 6000.0;
        config.save_to(&path).unwrap();

        let parsed = Config::load_from(&path).unwrap();
        assert_eq!(parsed.limits.ceiling_mg, 6000.0);
        assert_eq!(parsed.data.data_dir, config.data.data_dir);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[limits]
ceiling_mg = 4000.0

[catalog]
path = "/etc/formula/catalog.csv"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.limits.ceiling_mg, 4000.0);
        assert_eq!(config.limits.capsule_capacity_mg, 500.0); // default
        assert_eq!(
            config.catalog.path,
            Some(PathBuf::from("/etc/formula/catalog.csv"))
        );
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_CEILING_MG, "5000"),
            (ENV_MAX_ATTEMPTS, " 5 "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.limits.ceiling_mg, 5000.0);
        assert_eq!(config.correction.max_attempts, 5);
        assert_eq!(config.engine_limits().ceiling_mg, 5000.0);
        assert_eq!(config.retry_policy().max_attempts, 5);
    }

    #[test]
    fn test_invalid_override_is_config_error() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|k| (k == ENV_CAPSULE_CAPACITY_MG).then(|| "big".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_limits() {
        let mut config = Config::default();
        config.limits.minor_overage_fraction = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.limits.capsule_capacity_mg = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.correction.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
