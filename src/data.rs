use std::path::Path;

use csv::{Reader, Writer};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::features::{FeatureVector, TrainingSet};

/// One row of a historical observations CSV. `current_grade` may be left
/// empty for records collected before the field existed.
#[derive(Debug, Serialize, Deserialize)]
struct ObservationRow {
    previous_grade: f64,
    current_grade: Option<f64>,
    attendance_percentage: f64,
    study_hours: f64,
    actual_score: f64,
}

pub fn load_training_set(path: impl AsRef<Path>) -> Result<TrainingSet> {
    let path = path.as_ref();
    let mut rdr = Reader::from_path(path)?;
    let mut set = TrainingSet::default();

    for result in rdr.deserialize() {
        let row: ObservationRow = result?;
        set.push(
            FeatureVector {
                previous_grade: row.previous_grade,
                current_grade: row.current_grade,
                attendance_percentage: row.attendance_percentage,
                study_hours: row.study_hours,
            },
            row.actual_score,
        );
    }

    info!(path = %path.display(), records = set.len(), "loaded training observations");
    Ok(set)
}

pub fn write_training_set(set: &TrainingSet, path: impl AsRef<Path>) -> Result<()> {
    let mut wtr = Writer::from_path(path.as_ref())?;
    for sample in &set.samples {
        let f = sample.features;
        wtr.serialize(ObservationRow {
            previous_grade: f.previous_grade,
            current_grade: f.current_grade,
            attendance_percentage: f.attendance_percentage,
            study_hours: f.study_hours,
            actual_score: sample.actual_score,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Features and targets of one partition.
#[derive(Debug, Clone)]
pub struct Partition {
    pub features: Array2<f64>,
    pub targets: Array1<f64>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Seeded shuffle-and-split into (train, test). The test partition holds
/// `ceil(n * test_fraction)` samples and both sides keep at least one.
pub fn train_test_split(
    set: &TrainingSet,
    test_fraction: f64,
    seed: u64,
) -> Result<(Partition, Partition)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(EngineError::InvalidParameter(format!(
            "test_fraction must be in (0, 1), got {test_fraction}"
        )));
    }

    let features = set.features()?;
    let targets = set.targets();
    let n = targets.len();
    if n < 2 {
        return Err(EngineError::NotEnoughSamples {
            required: 2,
            actual: n,
        });
    }

    let n_test = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n - 1);

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let (test_idx, train_idx) = indices.split_at(n_test);

    let take = |idx: &[usize]| Partition {
        features: features.select(Axis(0), idx),
        targets: targets.select(Axis(0), idx),
    };
    Ok((take(train_idx), take(test_idx)))
}
