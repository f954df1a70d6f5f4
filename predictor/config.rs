//! Model parameters, loadable from a TOML file.
//!
//! ```toml
//! beta = 0.05
//! prior_probability = 0.3
//! epsilon = 0.01
//! num_features = 10
//! ```
//!
//! Missing keys fall back to the defaults below. Range checks happen when a
//! predictor is built from the config, not here.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Parameters fixed for the lifetime of one predictor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PredictorConfig {
    /// Scale of the observation noise added to every prediction's variance.
    pub beta: f64,
    /// Probability predicted by a freshly initialised model.
    pub prior_probability: f64,
    /// Rate at which every trained belief regresses toward the prior.
    pub epsilon: f64,
    /// Exact length of every feature vector, bias slot included.
    pub num_features: usize,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            beta: 0.05,
            prior_probability: 0.5,
            epsilon: 0.05,
            num_features: 8,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

impl PredictorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        Self::from_toml_str(&toml_string)
    }

    pub fn from_toml_str(toml_string: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_string)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
