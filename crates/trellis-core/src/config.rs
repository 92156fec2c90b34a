//! Engine configuration
//!
//! Defaults, then an optional JSON file, then `TRELLIS_*` environment
//! overrides. Every section validates itself before an engine is built.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::decay::{DecayConfig, DecayFunction, TimeUnit};
use crate::error::{GraphError, Result};
use crate::similarity::SimilarityConfig;
use crate::spatial::SpatialConfig;

pub const ENV_DECAY_FUNCTION: &str = "TRELLIS_DECAY_FUNCTION";
pub const ENV_DECAY_BASE_RATE: &str = "TRELLIS_DECAY_BASE_RATE";
pub const ENV_DECAY_TIME_UNIT: &str = "TRELLIS_DECAY_TIME_UNIT";
pub const ENV_MIN_RELEVANCE: &str = "TRELLIS_MIN_RELEVANCE";
pub const ENV_DECAY_INTERVAL: &str = "TRELLIS_DECAY_INTERVAL_MINUTES";
pub const ENV_SEMANTIC_INTERVAL: &str = "TRELLIS_SEMANTIC_INTERVAL_MINUTES";

/// Configuration for every engine component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct EngineConfig {
    pub decay: DecayConfig,
    pub spatial: SpatialConfig,
    pub similarity: SimilarityConfig,
}

impl EngineConfig {
    /// Read a JSON config file; missing sections keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults or the given file, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from any key lookup, such as the environment
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup(ENV_DECAY_FUNCTION) {
            self.decay.decay_function = parse_override(ENV_DECAY_FUNCTION, &v, DecayFunction::from_str)?;
        }
        if let Some(v) = lookup(ENV_DECAY_TIME_UNIT) {
            self.decay.time_unit = parse_override(ENV_DECAY_TIME_UNIT, &v, TimeUnit::from_str)?;
        }
        if let Some(v) = lookup(ENV_DECAY_BASE_RATE) {
            self.decay.base_rate = parse_override(ENV_DECAY_BASE_RATE, &v, f64::from_str)?;
        }
        if let Some(v) = lookup(ENV_MIN_RELEVANCE) {
            self.decay.minimum_relevance = parse_override(ENV_MIN_RELEVANCE, &v, f64::from_str)?;
        }
        if let Some(v) = lookup(ENV_DECAY_INTERVAL) {
            self.decay.sweep_interval_minutes = parse_override(ENV_DECAY_INTERVAL, &v, u64::from_str)?;
        }
        if let Some(v) = lookup(ENV_SEMANTIC_INTERVAL) {
            self.similarity.sweep_interval_minutes =
                parse_override(ENV_SEMANTIC_INTERVAL, &v, u64::from_str)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        self.decay.validate()?;
        self.spatial.validate()?;
        self.similarity.validate()
    }
}

fn parse_override<T, E: std::fmt::Display>(
    key: &str,
    value: &str,
    parse: impl Fn(&str) -> std::result::Result<T, E>,
) -> Result<T> {
    parse(value.trim()).map_err(|e| GraphError::Validation(format!("{}={:?}: {}", key, value, e)))
}
