//! Student performance prediction engine.
//!
//! Turns a small feature vector (previous grade, optional current grade,
//! attendance, weekly study hours) into an expected score in [0, 100]. A
//! random forest answers once trained; a closed-form heuristic answers
//! before that, or when the input cannot be fed to the trained model.

pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod forest;
pub mod model;
pub mod predictor;
pub mod scoring;
pub mod synthetic;

pub use config::{BootstrapConfig, EngineConfig, TrainingConfig};
pub use error::{EngineError, Result};
pub use features::{FeatureLayout, FeatureVector, TrainingSample, TrainingSet};
pub use model::{Metrics, ModelStore, TrainedModel};
pub use predictor::{initialize, ModelInfo, Prediction, PredictionSource, Predictor};
pub use scoring::heuristic;
