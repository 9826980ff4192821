//! Engine configuration
//!
//! Read from an optional TOML file; every field has a default so an empty or
//! missing file yields a working setup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::forest::RandomForestParams;
use crate::synthetic::DEFAULT_SEED;

/// Overrides `model_dir` when set.
pub const MODEL_DIR_ENV: &str = "PREDICTOR_MODEL_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the persisted model and scaler
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    /// Share of samples held out for evaluation
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    /// Seeds both the train/test split and the forest
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Synthetic data used when a fresh deployment has no model yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default = "default_bootstrap_samples")]
    pub samples: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_n_estimators() -> usize {
    100
}

fn default_min_samples_split() -> usize {
    2
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_bootstrap_samples() -> usize {
    200
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            training: TrainingConfig::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_depth: None,
            min_samples_split: default_min_samples_split(),
            test_fraction: default_test_fraction(),
            seed: default_seed(),
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            samples: default_bootstrap_samples(),
            seed: default_seed(),
        }
    }
}

impl TrainingConfig {
    pub fn forest_params(&self) -> RandomForestParams {
        RandomForestParams::default()
            .n_estimators(self.n_estimators)
            .max_depth(self.max_depth)
            .min_samples_split(self.min_samples_split)
            .seed(self.seed)
    }
}

impl EngineConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Loads `path` if given, falling back to defaults, then applies the
    /// environment override.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                debug!(path = %path.display(), "reading config");
                Self::from_toml(&std::fs::read_to_string(path)?)?
            }
            None => Self::default(),
        };

        if let Ok(dir) = std::env::var(MODEL_DIR_ENV) {
            if !dir.is_empty() {
                config.model_dir = PathBuf::from(dir);
            }
        }
        Ok(config)
    }
}
