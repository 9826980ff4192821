//! Synthetic bootstrap data for a first model when no real history exists.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Beta, Distribution, Normal};

use crate::error::{EngineError, Result};
use crate::features::{FeatureVector, TrainingSet};
use crate::scoring::{clamp_score, expected_score};

pub const DEFAULT_SEED: u64 = 42;

/// Label noise standard deviation.
const NOISE_STD: f64 = 3.0;

struct Draws {
    previous: Normal<f64>,
    current: Normal<f64>,
    attendance: Beta<f64>,
    study: Normal<f64>,
    noise: Normal<f64>,
}

impl Draws {
    fn new() -> Result<Self> {
        Ok(Self {
            previous: Normal::new(75.0, 10.0).map_err(invalid)?,
            current: Normal::new(78.0, 12.0).map_err(invalid)?,
            // Skewed toward high attendance
            attendance: Beta::new(7.0, 2.0).map_err(invalid)?,
            study: Normal::new(15.0, 8.0).map_err(invalid)?,
            noise: Normal::new(0.0, NOISE_STD).map_err(invalid)?,
        })
    }
}

fn invalid(e: impl std::fmt::Display) -> EngineError {
    EngineError::InvalidParameter(e.to_string())
}

/// Labeled four-field training set of `n_samples` observations.
///
/// The same `seed` always yields the same set.
pub fn generate(n_samples: usize, seed: u64) -> Result<TrainingSet> {
    let draws = Draws::new()?;
    let mut rng = StdRng::seed_from_u64(seed);

    let mut set = TrainingSet::default();
    for _ in 0..n_samples {
        let previous_grade = draws.previous.sample(&mut rng).clamp(40.0, 100.0);
        let current_grade = draws.current.sample(&mut rng).clamp(40.0, 100.0);
        let attendance = (draws.attendance.sample(&mut rng) * 100.0).clamp(50.0, 100.0);
        let study_hours = draws.study.sample(&mut rng).clamp(1.0, 40.0);

        let score = expected_score(previous_grade, Some(current_grade), attendance, study_hours)
            + draws.noise.sample(&mut rng);

        set.push(
            FeatureVector::full(previous_grade, current_grade, attendance, study_hours),
            clamp_score(score),
        );
    }
    Ok(set)
}

/// Same observations as [`generate`] without `current_grade`, matching the
/// data older three-field models were trained on.
pub fn generate_legacy(n_samples: usize, seed: u64) -> Result<TrainingSet> {
    Ok(generate(n_samples, seed)?.to_legacy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureLayout;

    #[test]
    fn test_generate_size_and_layout() {
        let set = generate(200, DEFAULT_SEED).unwrap();
        assert_eq!(set.len(), 200);
        assert_eq!(set.layout().unwrap(), FeatureLayout::Full);
    }

    #[test]
    fn test_generate_is_reproducible() {
        let a = generate(50, 7).unwrap();
        let b = generate(50, 7).unwrap();
        assert_eq!(a, b);

        let c = generate(50, 8).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_fields_are_clipped() {
        let set = generate(500, DEFAULT_SEED).unwrap();
        for s in &set.samples {
            let f = s.features;
            assert!((40.0..=100.0).contains(&f.previous_grade));
            assert!((40.0..=100.0).contains(&f.current_grade.unwrap()));
            assert!((50.0..=100.0).contains(&f.attendance_percentage));
            assert!((1.0..=40.0).contains(&f.study_hours));
            assert!((0.0..=100.0).contains(&s.actual_score));
        }
    }

    #[test]
    fn test_labels_follow_the_scoring_rule() {
        let set = generate(300, DEFAULT_SEED).unwrap();
        let mean_residual = set
            .samples
            .iter()
            .map(|s| {
                let f = s.features;
                s.actual_score
                    - expected_score(
                        f.previous_grade,
                        f.current_grade,
                        f.attendance_percentage,
                        f.study_hours,
                    )
            })
            .sum::<f64>()
            / set.len() as f64;

        // Only zero-mean noise separates labels from the rule.
        assert!(mean_residual.abs() < 1.0, "mean residual {mean_residual}");
    }

    #[test]
    fn test_legacy_drops_current_grade() {
        let full = generate(20, DEFAULT_SEED).unwrap();
        let legacy = generate_legacy(20, DEFAULT_SEED).unwrap();
        assert_eq!(legacy.layout().unwrap(), FeatureLayout::Legacy);
        for (f, l) in full.samples.iter().zip(&legacy.samples) {
            assert_eq!(f.actual_score, l.actual_score);
            assert_eq!(f.features.previous_grade, l.features.previous_grade);
            assert_eq!(l.features.current_grade, None);
        }
    }
}
