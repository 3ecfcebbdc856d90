//! Runtime configuration shared by the RoleForge binaries.
//!
//! Values are passed explicitly into each component; nothing here is global.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const ENV_REGISTRY: &str = "ROLEFORGE_REGISTRY";
pub const ENV_DRAFTS_DIR: &str = "ROLEFORGE_DRAFTS_DIR";
pub const ENV_THRESHOLD: &str = "ROLEFORGE_THRESHOLD";
pub const ENV_TOP_K: &str = "ROLEFORGE_TOP_K";
pub const ENV_MUTATIONS: &str = "ROLEFORGE_MUTATIONS";
pub const ENV_INTERVAL_SECS: &str = "ROLEFORGE_INTERVAL_SECS";
pub const ENV_SEED: &str = "ROLEFORGE_SEED";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    InvalidValue { var: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// Registry source document (YAML, or JSON by extension).
    pub registry_path: PathBuf,
    /// Directory receiving one JSON record per draft.
    pub drafts_dir: PathBuf,
    /// Arbitration threshold in `(0, 1]`.
    pub threshold: f64,
    /// Shortlist size for selection.
    pub top_k: usize,
    /// Drafts proposed per evolution cycle.
    pub mutations_per_cycle: usize,
    /// Seconds between daemon evolution cycles.
    pub evolve_interval_secs: u64,
    /// Fixed RNG seed; entropy-seeded when `None`.
    pub seed: Option<u64>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            registry_path: PathBuf::from("roles.yaml"),
            drafts_dir: PathBuf::from("drafts"),
            threshold: crate::negotiator::DEFAULT_THRESHOLD,
            top_k: 3,
            mutations_per_cycle: 3,
            evolve_interval_secs: 3600,
            seed: None,
        }
    }
}

impl ForgeConfig {
    /// Build from `ROLEFORGE_*` environment variables, defaulting unset ones.
    ///
    /// Reads:
    /// - ROLEFORGE_REGISTRY (default: "roles.yaml")
    /// - ROLEFORGE_DRAFTS_DIR (default: "drafts")
    /// - ROLEFORGE_THRESHOLD (default: 0.7)
    /// - ROLEFORGE_TOP_K (default: 3)
    /// - ROLEFORGE_MUTATIONS (default: 3)
    /// - ROLEFORGE_INTERVAL_SECS (default: 3600)
    /// - ROLEFORGE_SEED (optional)
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`ForgeConfig::from_env`] with an injectable variable lookup.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            registry_path: lookup(ENV_REGISTRY)
                .map(PathBuf::from)
                .unwrap_or(defaults.registry_path),
            drafts_dir: lookup(ENV_DRAFTS_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.drafts_dir),
            threshold: parse_var(&lookup, ENV_THRESHOLD)?.unwrap_or(defaults.threshold),
            top_k: parse_var(&lookup, ENV_TOP_K)?.unwrap_or(defaults.top_k),
            mutations_per_cycle: parse_var(&lookup, ENV_MUTATIONS)?
                .unwrap_or(defaults.mutations_per_cycle),
            evolve_interval_secs: parse_var(&lookup, ENV_INTERVAL_SECS)?
                .unwrap_or(defaults.evolve_interval_secs),
            seed: parse_var(&lookup, ENV_SEED)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "threshold {} is outside (0, 1]",
                self.threshold
            )));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be positive".into()));
        }
        if self.mutations_per_cycle == 0 {
            return Err(ConfigError::Invalid(
                "mutations_per_cycle must be positive".into(),
            ));
        }
        if self.evolve_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "evolve_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, var: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value: raw,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = ForgeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ForgeConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let config = ForgeConfig::from_lookup(lookup(&[
            (ENV_REGISTRY, "/etc/roleforge/roles.yaml"),
            (ENV_THRESHOLD, "0.55"),
            (ENV_TOP_K, "5"),
            (ENV_SEED, "1234"),
        ]))
        .unwrap();
        assert_eq!(config.registry_path, PathBuf::from("/etc/roleforge/roles.yaml"));
        assert!((config.threshold - 0.55).abs() < 1e-12);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.seed, Some(1234));
        assert_eq!(config.drafts_dir, PathBuf::from("drafts"));
    }

    #[test]
    fn test_unparsable_value_names_the_variable() {
        let err = ForgeConfig::from_lookup(lookup(&[(ENV_TOP_K, "many")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                var: ENV_TOP_K.to_string(),
                value: "many".to_string(),
            }
        );
    }

    #[test]
    fn test_validate_rejects_bad_threshold_and_zero_counts() {
        assert!(ForgeConfig::from_lookup(lookup(&[(ENV_THRESHOLD, "0")])).is_err());
        assert!(ForgeConfig::from_lookup(lookup(&[(ENV_THRESHOLD, "1.5")])).is_err());
        assert!(ForgeConfig::from_lookup(lookup(&[(ENV_MUTATIONS, "0")])).is_err());
        assert!(ForgeConfig::from_lookup(lookup(&[(ENV_INTERVAL_SECS, "0")])).is_err());
    }
}
