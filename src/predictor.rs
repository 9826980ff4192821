use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{BootstrapConfig, EngineConfig, TrainingConfig};
use crate::data::train_test_split;
use crate::error::Result;
use crate::features::{FeatureLayout, FeatureVector, TrainingSet};
use crate::model::{FittedModel, Metrics, ModelStore, TrainedModel};
use crate::scoring::{clamp_score, heuristic};
use crate::synthetic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    Model,
    Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub score: f64,
    pub source: PredictionSource,
}

/// Summary of the model currently held by a predictor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub trained: bool,
    pub layout: Option<FeatureLayout>,
    pub n_trees: usize,
    pub metrics: Option<Metrics>,
}

/// Owns the trained model (if any) for the life of the process.
///
/// Not internally synchronized: callers sharing one predictor across threads
/// must serialize `train` against `predict` themselves.
#[derive(Debug, Clone)]
pub struct Predictor {
    store: ModelStore,
    training: TrainingConfig,
    model: Option<TrainedModel>,
}

impl Predictor {
    /// Creates a predictor and attempts to load a persisted model once.
    pub fn new(config: &EngineConfig) -> Self {
        let mut predictor = Self::untrained(config);
        predictor.load();
        predictor
    }

    /// A predictor that answers from the heuristic until trained. Nothing
    /// is read from disk.
    pub fn untrained(config: &EngineConfig) -> Self {
        Self {
            store: ModelStore::new(&config.model_dir),
            training: config.training.clone(),
            model: None,
        }
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn layout(&self) -> Option<FeatureLayout> {
        self.model.as_ref().map(TrainedModel::layout)
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            trained: self.is_trained(),
            layout: self.layout(),
            n_trees: self
                .model
                .as_ref()
                .map_or(0, |m| m.fitted().forest().n_trees()),
            metrics: self.model.as_ref().map(|m| m.fitted().metrics()),
        }
    }

    /// Replaces the model with one trained on `set` and persists it.
    ///
    /// The model layout follows the set: three-field samples give a legacy
    /// model, four-field samples a full one.
    pub fn train(&mut self, set: &TrainingSet) -> Result<Metrics> {
        let layout = set.layout()?;
        let (train, test) = train_test_split(set, self.training.test_fraction, self.training.seed)?;

        info!(
            ?layout,
            train = train.len(),
            test = test.len(),
            trees = self.training.n_estimators,
            "training random forest"
        );
        let fitted = FittedModel::fit(&train, &test, &self.training.forest_params())?;
        let metrics = fitted.metrics();

        self.model = Some(TrainedModel::new(layout, fitted));
        self.save()?;

        info!(mse = metrics.mse, r2 = metrics.r2, test_size = metrics.test_size, "model trained");
        Ok(metrics)
    }

    /// Persists the current model. Without a model there is nothing to write.
    pub fn save(&self) -> Result<()> {
        match &self.model {
            Some(model) => self.store.save(model),
            None => {
                debug!("no model to save");
                Ok(())
            }
        }
    }

    /// Reloads the persisted model. Any failure leaves the predictor
    /// untrained; the error is logged, never returned.
    pub fn load(&mut self) -> bool {
        match self.store.load() {
            Ok(Some(model)) => {
                info!(layout = ?model.layout(), dir = %self.store.dir().display(), "loaded persisted model");
                self.model = Some(model);
                true
            }
            Ok(None) => {
                self.model = None;
                false
            }
            Err(e) => {
                warn!(error = %e, dir = %self.store.dir().display(), "could not load persisted model, using heuristic");
                self.model = None;
                false
            }
        }
    }

    pub fn predict(&self, features: &FeatureVector) -> f64 {
        self.predict_detailed(features).score
    }

    /// Always answers with a score in [0, 100].
    pub fn predict_detailed(&self, features: &FeatureVector) -> Prediction {
        let Some(model) = &self.model else {
            return Self::fallback(features);
        };

        match model.predict(features) {
            Some(score) => Prediction {
                score: clamp_score(score),
                source: PredictionSource::Model,
            },
            None => {
                debug!(
                    model_layout = ?model.layout(),
                    input_layout = ?features.layout(),
                    "feature layout does not fit the model, using heuristic"
                );
                Self::fallback(features)
            }
        }
    }

    fn fallback(features: &FeatureVector) -> Prediction {
        Prediction {
            score: heuristic(features),
            source: PredictionSource::Heuristic,
        }
    }
}

/// Trains on synthetic data when the predictor has no model yet, so a fresh
/// deployment starts with a usable model. Returns the metrics when training
/// happened.
pub fn initialize(predictor: &mut Predictor, bootstrap: &BootstrapConfig) -> Result<Option<Metrics>> {
    if predictor.is_trained() {
        debug!("model already present, skipping bootstrap");
        return Ok(None);
    }

    info!(samples = bootstrap.samples, "bootstrapping model from synthetic data");
    let set = synthetic::generate(bootstrap.samples, bootstrap.seed)?;
    let metrics = predictor.train(&set)?;
    Ok(Some(metrics))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &std::path::Path) -> EngineConfig {
        EngineConfig {
            model_dir: dir.to_path_buf(),
            training: TrainingConfig {
                n_estimators: 20,
                ..TrainingConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_untrained_uses_heuristic() {
        let dir = tempfile::tempdir().unwrap();
        let predictor = Predictor::new(&config_in(dir.path()));
        assert!(!predictor.is_trained());

        let v = FeatureVector::full(70.0, 85.0, 95.0, 10.0);
        let p = predictor.predict_detailed(&v);
        assert_eq!(p.source, PredictionSource::Heuristic);
        assert_eq!(p.score, heuristic(&v));
    }

    #[test]
    fn test_full_model_with_legacy_input_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut predictor = Predictor::new(&config_in(dir.path()));
        predictor.train(&synthetic::generate(100, 42).unwrap()).unwrap();

        let v = FeatureVector::legacy(60.0, 70.0, 5.0);
        let p = predictor.predict_detailed(&v);
        assert_eq!(p.source, PredictionSource::Heuristic);
        assert!((p.score - 58.25).abs() < 1e-9);
    }

    #[test]
    fn test_train_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let mut predictor = Predictor::new(&config);
        predictor.train(&synthetic::generate(100, 42).unwrap()).unwrap();
        assert!(predictor.store().exists());

        let reloaded = Predictor::new(&config);
        assert_eq!(reloaded.layout(), Some(FeatureLayout::Full));

        let v = FeatureVector::full(81.0, 88.0, 92.0, 14.0);
        assert_eq!(reloaded.predict(&v), predictor.predict(&v));
    }

    #[test]
    fn test_corrupt_files_leave_predictor_untrained() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let store = ModelStore::new(dir.path());
        std::fs::write(store.model_path(), "{").unwrap();
        std::fs::write(store.scaler_path(), "{").unwrap();

        let mut predictor = Predictor::new(&config);
        assert!(!predictor.is_trained());
        assert!(!predictor.load());

        let v = FeatureVector::legacy(60.0, 70.0, 5.0);
        assert_eq!(predictor.predict_detailed(&v).source, PredictionSource::Heuristic);
    }

    #[test]
    fn test_initialize_skips_when_trained() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let mut predictor = Predictor::new(&config);
        let bootstrap = BootstrapConfig {
            samples: 60,
            ..BootstrapConfig::default()
        };

        assert!(initialize(&mut predictor, &bootstrap).unwrap().is_some());
        assert!(initialize(&mut predictor, &bootstrap).unwrap().is_none());
    }

    #[test]
    fn test_info_reflects_model() {
        let dir = tempfile::tempdir().unwrap();
        let mut predictor = Predictor::new(&config_in(dir.path()));
        let info = predictor.info();
        assert!(!info.trained);
        assert_eq!(info.n_trees, 0);

        let metrics = predictor.train(&synthetic::generate_legacy(80, 42).unwrap()).unwrap();
        let info = predictor.info();
        assert!(info.trained);
        assert_eq!(info.layout, Some(FeatureLayout::Legacy));
        assert_eq!(info.n_trees, 20);
        assert_eq!(info.metrics, Some(metrics));
    }

    #[test]
    fn test_train_rejects_mixed_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut predictor = Predictor::new(&config_in(dir.path()));
        let mut set = synthetic::generate(20, 42).unwrap();
        set.push(FeatureVector::legacy(50.0, 60.0, 3.0), 55.0);

        assert!(predictor.train(&set).is_err());
        assert!(!predictor.is_trained());
        assert!(!predictor.store().exists());
    }
}
