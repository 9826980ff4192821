use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use linfa::prelude::*;
use linfa_preprocessing::linear_scaling::LinearScaler;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::Partition;
use crate::error::{EngineError, Result};
use crate::features::{FeatureLayout, FeatureVector};
use crate::forest::{RandomForestParams, RandomForestRegressor};

pub const MODEL_FILE: &str = "performance_model.json";
pub const SCALER_FILE: &str = "performance_scaler.json";

/// Bumped whenever the on-disk artifact shape changes.
const FORMAT_VERSION: u32 = 1;

/// Held-out evaluation of a freshly trained model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub mse: f64,
    pub r2: f64,
    pub test_size: usize,
}

/// A forest together with the scaler fit on the same training columns.
#[derive(Debug, Clone)]
pub struct FittedModel {
    scaler: LinearScaler<f64>,
    forest: RandomForestRegressor,
    metrics: Metrics,
}

impl FittedModel {
    /// Fits the scaler on `train` only, trains the forest on the scaled
    /// training partition and scores it on `test`.
    pub fn fit(train: &Partition, test: &Partition, params: &RandomForestParams) -> Result<Self> {
        let dataset = Dataset::new(train.features.clone(), train.targets.clone());
        let scaler = LinearScaler::<f64>::standard()
            .fit(&dataset)
            .map_err(|e| EngineError::Scaler(e.to_string()))?;

        let scaled = Dataset::new(scaler.transform(train.features.clone()), train.targets.clone());
        let forest = params.fit(&scaled)?;

        let predicted = forest.predict(&scaler.transform(test.features.clone()));
        let metrics = Metrics {
            mse: predicted.mean_squared_error(&test.targets)?,
            r2: predicted.r2(&test.targets)?,
            test_size: test.len(),
        };

        Ok(Self {
            scaler,
            forest,
            metrics,
        })
    }

    pub fn width(&self) -> usize {
        self.forest.n_features()
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    pub fn forest(&self) -> &RandomForestRegressor {
        &self.forest
    }

    /// `None` when the scaler was fit on a different number of columns.
    pub fn predict_row(&self, row: &[f64]) -> Option<f64> {
        if row.len() != self.scaler.offsets().len() || row.len() != self.forest.n_features() {
            return None;
        }
        let x = Array2::from_shape_vec((1, row.len()), row.to_vec()).ok()?;
        let scaled = self.scaler.transform(x);
        self.forest.predict(&scaled).get(0).copied()
    }
}

/// Trained model tagged with the feature layout it was trained on.
#[derive(Debug, Clone)]
pub enum TrainedModel {
    Legacy(FittedModel),
    Full(FittedModel),
}

impl TrainedModel {
    pub fn new(layout: FeatureLayout, fitted: FittedModel) -> Self {
        match layout {
            FeatureLayout::Legacy => TrainedModel::Legacy(fitted),
            FeatureLayout::Full => TrainedModel::Full(fitted),
        }
    }

    pub fn layout(&self) -> FeatureLayout {
        match self {
            TrainedModel::Legacy(_) => FeatureLayout::Legacy,
            TrainedModel::Full(_) => FeatureLayout::Full,
        }
    }

    pub fn fitted(&self) -> &FittedModel {
        match self {
            TrainedModel::Legacy(fitted) | TrainedModel::Full(fitted) => fitted,
        }
    }

    /// Raw model output, or `None` when `features` cannot be reconciled with
    /// the trained layout. A four-field vector fed to a legacy model loses
    /// its `current_grade`; a three-field vector cannot feed a full model.
    pub fn predict(&self, features: &FeatureVector) -> Option<f64> {
        let row = features.project(self.layout())?;
        self.fitted().predict_row(&row)
    }
}

#[derive(Serialize, Deserialize)]
struct ModelArtifact {
    format_version: u32,
    generation: u64,
    layout: FeatureLayout,
    metrics: Metrics,
    forest: RandomForestRegressor,
}

#[derive(Serialize, Deserialize)]
struct ScalerArtifact {
    format_version: u32,
    generation: u64,
    layout: FeatureLayout,
    scaler: LinearScaler<f64>,
}

/// Two co-located files holding the forest and its scaler. They are always
/// written and read as a pair.
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE)
    }

    pub fn scaler_path(&self) -> PathBuf {
        self.dir.join(SCALER_FILE)
    }

    pub fn exists(&self) -> bool {
        self.model_path().exists() && self.scaler_path().exists()
    }

    /// Replaces any persisted pair. Both files are staged next to their
    /// targets and renamed into place, so a reader never sees a partially
    /// written file; a crash between the two renames leaves mismatched
    /// generations, which `load` rejects.
    pub fn save(&self, model: &TrainedModel) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let generation: u64 = rand::random();
        let layout = model.layout();
        let fitted = model.fitted();

        let model_tmp = staging_path(&self.model_path());
        let scaler_tmp = staging_path(&self.scaler_path());

        write_json(
            &model_tmp,
            &ModelArtifact {
                format_version: FORMAT_VERSION,
                generation,
                layout,
                metrics: fitted.metrics,
                forest: fitted.forest.clone(),
            },
        )?;
        write_json(
            &scaler_tmp,
            &ScalerArtifact {
                format_version: FORMAT_VERSION,
                generation,
                layout,
                scaler: fitted.scaler.clone(),
            },
        )?;

        fs::rename(&model_tmp, self.model_path())?;
        fs::rename(&scaler_tmp, self.scaler_path())?;

        info!(dir = %self.dir.display(), ?layout, generation, "saved model and scaler");
        Ok(())
    }

    /// `Ok(None)` when nothing has been persisted yet.
    pub fn load(&self) -> Result<Option<TrainedModel>> {
        if !self.exists() {
            debug!(dir = %self.dir.display(), "no persisted model");
            return Ok(None);
        }

        let model: ModelArtifact = read_json(&self.model_path())?;
        let scaler: ScalerArtifact = read_json(&self.scaler_path())?;

        if model.format_version != FORMAT_VERSION || scaler.format_version != FORMAT_VERSION {
            return Err(EngineError::IncompatibleArtifacts(format!(
                "format versions {} / {}, expected {}",
                model.format_version, scaler.format_version, FORMAT_VERSION
            )));
        }
        if model.generation != scaler.generation {
            return Err(EngineError::IncompatibleArtifacts(
                "model and scaler come from different training runs".to_string(),
            ));
        }
        if model.layout != scaler.layout {
            return Err(EngineError::IncompatibleArtifacts(format!(
                "model layout {:?} but scaler layout {:?}",
                model.layout, scaler.layout
            )));
        }

        let width = model.layout.width();
        if model.forest.n_features() != width || scaler.scaler.offsets().len() != width {
            return Err(EngineError::IncompatibleArtifacts(format!(
                "layout {:?} expects {} features, forest has {}, scaler has {}",
                model.layout,
                width,
                model.forest.n_features(),
                scaler.scaler.offsets().len()
            )));
        }

        let fitted = FittedModel {
            scaler: scaler.scaler,
            forest: model.forest,
            metrics: model.metrics,
        };
        Ok(Some(TrainedModel::new(model.layout, fitted)))
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
