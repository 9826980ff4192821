use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Column layout a model was trained on.
///
/// `Legacy` models predate the `current_grade` field and expect
/// `[previous_grade, attendance_percentage, study_hours]`; `Full` models expect
/// `[previous_grade, current_grade, attendance_percentage, study_hours]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureLayout {
    Legacy,
    Full,
}

impl FeatureLayout {
    pub fn width(self) -> usize {
        match self {
            FeatureLayout::Legacy => 3,
            FeatureLayout::Full => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub previous_grade: f64,
    pub current_grade: Option<f64>,
    pub attendance_percentage: f64,
    pub study_hours: f64,
}

impl FeatureVector {
    pub fn legacy(previous_grade: f64, attendance_percentage: f64, study_hours: f64) -> Self {
        Self {
            previous_grade,
            current_grade: None,
            attendance_percentage,
            study_hours,
        }
    }

    pub fn full(
        previous_grade: f64,
        current_grade: f64,
        attendance_percentage: f64,
        study_hours: f64,
    ) -> Self {
        Self {
            previous_grade,
            current_grade: Some(current_grade),
            attendance_percentage,
            study_hours,
        }
    }

    pub fn layout(&self) -> FeatureLayout {
        if self.current_grade.is_some() {
            FeatureLayout::Full
        } else {
            FeatureLayout::Legacy
        }
    }

    /// Values in the column order of the vector's own layout.
    pub fn to_row(&self) -> Vec<f64> {
        match self.current_grade {
            Some(current) => vec![
                self.previous_grade,
                current,
                self.attendance_percentage,
                self.study_hours,
            ],
            None => vec![self.previous_grade, self.attendance_percentage, self.study_hours],
        }
    }

    /// Values in the column order of `layout`, if this vector carries enough
    /// fields for it. A full vector projects onto the legacy layout by
    /// dropping `current_grade`; a legacy vector cannot be widened.
    pub fn project(&self, layout: FeatureLayout) -> Option<Vec<f64>> {
        match (layout, self.current_grade) {
            (FeatureLayout::Full, Some(_)) => Some(self.to_row()),
            (FeatureLayout::Full, None) => None,
            (FeatureLayout::Legacy, _) => Some(vec![
                self.previous_grade,
                self.attendance_percentage,
                self.study_hours,
            ]),
        }
    }

    pub fn without_current_grade(&self) -> Self {
        Self {
            current_grade: None,
            ..*self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub features: FeatureVector,
    pub actual_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingSet {
    pub samples: Vec<TrainingSample>,
}

impl TrainingSet {
    pub fn new(samples: Vec<TrainingSample>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn push(&mut self, features: FeatureVector, actual_score: f64) {
        self.samples.push(TrainingSample {
            features,
            actual_score,
        });
    }

    /// The single layout shared by every sample.
    pub fn layout(&self) -> Result<FeatureLayout> {
        let first = self
            .samples
            .first()
            .ok_or(EngineError::EmptyTrainingSet)?
            .features
            .layout();

        if self.samples.iter().any(|s| s.features.layout() != first) {
            return Err(EngineError::MixedLayouts);
        }
        Ok(first)
    }

    pub fn features(&self) -> Result<Array2<f64>> {
        let layout = self.layout()?;
        let flat: Vec<f64> = self
            .samples
            .iter()
            .flat_map(|s| s.features.to_row())
            .collect();
        Ok(Array2::from_shape_vec((self.len(), layout.width()), flat)?)
    }

    pub fn targets(&self) -> Array1<f64> {
        self.samples.iter().map(|s| s.actual_score).collect()
    }

    /// Same observations with `current_grade` removed from every sample.
    pub fn to_legacy(&self) -> TrainingSet {
        self.samples
            .iter()
            .map(|s| TrainingSample {
                features: s.features.without_current_grade(),
                actual_score: s.actual_score,
            })
            .collect()
    }
}

impl FromIterator<TrainingSample> for TrainingSet {
    fn from_iter<I: IntoIterator<Item = TrainingSample>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
