//! Bagged random forest of CART regression trees.
//!
//! Plugs into linfa's `Fit` / `Predict` traits so it trains on a linfa
//! `Dataset` like the rest of the pipeline. linfa 0.7 ships no forest
//! regressor (`linfa-trees` only classifies), hence the trees here.

use linfa::traits::{Fit, PredictInplace};
use linfa::DatasetBase;
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestParams {
    n_estimators: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    seed: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

impl RandomForestParams {
    pub fn n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    pub fn max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(EngineError::InvalidParameter(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(EngineError::InvalidParameter(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        if self.max_depth == Some(0) {
            return Err(EngineError::InvalidParameter(
                "max_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// Number of samples, in feature-sorted order, sent left.
    position: usize,
    score: f64,
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    params: &'a RandomForestParams,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    fn build(
        x: &'a Array2<f64>,
        y: &'a Array1<f64>,
        params: &'a RandomForestParams,
        mut indices: Vec<usize>,
    ) -> RegressionTree {
        let mut builder = Self {
            x,
            y,
            params,
            nodes: Vec::new(),
        };
        builder.grow(&mut indices, 0);
        RegressionTree {
            nodes: builder.nodes,
        }
    }

    fn grow(&mut self, indices: &mut [usize], depth: usize) -> usize {
        let node_id = self.nodes.len();
        let mean = indices.iter().map(|&i| self.y[i]).sum::<f64>() / indices.len() as f64;
        self.nodes.push(Node::Leaf { value: mean });

        let depth_exhausted = self.params.max_depth.is_some_and(|max| depth >= max);
        if indices.len() < self.params.min_samples_split || depth_exhausted {
            return node_id;
        }

        let Some(split) = self.best_split(indices) else {
            return node_id;
        };

        self.sort_by_feature(indices, split.feature);
        let (left_idx, right_idx) = indices.split_at_mut(split.position);
        let left = self.grow(left_idx, depth + 1);
        let right = self.grow(right_idx, depth + 1);

        self.nodes[node_id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_id
    }

    fn sort_by_feature(&self, indices: &mut [usize], feature: usize) {
        indices.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));
    }

    /// Split maximizing variance reduction. Minimizing the summed squared
    /// error of both children is the same as maximizing
    /// `sum_l^2 / n_l + sum_r^2 / n_r`.
    fn best_split(&self, indices: &mut [usize]) -> Option<SplitCandidate> {
        let n = indices.len();
        let total: f64 = indices.iter().map(|&i| self.y[i]).sum();
        let parent_score = total * total / n as f64;
        let mut best: Option<SplitCandidate> = None;

        for feature in 0..self.x.ncols() {
            self.sort_by_feature(indices, feature);

            let mut left_sum = 0.0;
            for position in 1..n {
                left_sum += self.y[indices[position - 1]];

                let lo = self.x[[indices[position - 1], feature]];
                let hi = self.x[[indices[position], feature]];
                if lo == hi {
                    continue;
                }

                let right_sum = total - left_sum;
                let score = left_sum * left_sum / position as f64
                    + right_sum * right_sum / (n - position) as f64;

                if best.as_ref().map_or(true, |b| score > b.score) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: lo + (hi - lo) / 2.0,
                        position,
                        score,
                    });
                }
            }
        }

        best.filter(|b| b.score > parent_score + 1e-12 * parent_score.abs().max(1.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl RandomForestRegressor {
    pub fn params() -> RandomForestParams {
        RandomForestParams::default()
    }

    /// Number of input columns the forest was fit on.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / self.trees.len() as f64
    }
}

impl Fit<Array2<f64>, Array1<f64>, EngineError> for RandomForestParams {
    type Object = RandomForestRegressor;

    fn fit(
        &self,
        dataset: &DatasetBase<Array2<f64>, Array1<f64>>,
    ) -> Result<RandomForestRegressor> {
        self.validate()?;

        let x = dataset.records();
        let y = dataset.targets();
        let n = x.nrows();
        if n == 0 {
            return Err(EngineError::EmptyTrainingSet);
        }
        if y.len() != n {
            return Err(EngineError::InvalidParameter(format!(
                "{} records but {} targets",
                n,
                y.len()
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let trees = (0..self.n_estimators)
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                TreeBuilder::build(x, y, self, bootstrap)
            })
            .collect();

        Ok(RandomForestRegressor {
            n_features: x.ncols(),
            trees,
        })
    }
}

impl PredictInplace<Array2<f64>, Array1<f64>> for RandomForestRegressor {
    fn predict_inplace(&self, x: &Array2<f64>, y: &mut Array1<f64>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "the number of records and targets must match"
        );
        assert_eq!(
            x.ncols(),
            self.n_features,
            "forest was fit on a different number of features"
        );

        for (row, target) in x.rows().into_iter().zip(y.iter_mut()) {
            *target = self.predict_row(row);
        }
    }

    fn default_target(&self, x: &Array2<f64>) -> Array1<f64> {
        Array1::zeros(x.nrows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linfa::prelude::*;
    use ndarray::{array, Ix1};

    fn step_dataset() -> Dataset<f64, f64, Ix1> {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0], [8.0]];
        let y = array![10.0, 10.0, 10.0, 10.0, 50.0, 50.0, 50.0, 50.0];
        Dataset::new(x, y)
    }

    #[test]
    fn test_single_tree_learns_step_function() {
        let dataset = step_dataset();
        let params = RandomForestRegressor::params().n_estimators(1);
        let forest = params.fit(&dataset).unwrap();

        let pred = forest.predict(&array![[1.5], [7.5]]);
        // A bootstrap sample may miss one side of the step entirely, so only
        // check ordering rather than exact leaf values.
        assert!(pred[0] <= pred[1]);
    }

    #[test]
    fn test_forest_fits_step_function() {
        let dataset = step_dataset();
        let forest = RandomForestRegressor::params().fit(&dataset).unwrap();

        let pred = forest.predict(&array![[1.0], [8.0]]);
        assert!(pred[0] < 20.0, "low side predicted {}", pred[0]);
        assert!(pred[1] > 40.0, "high side predicted {}", pred[1]);
        assert_eq!(forest.n_trees(), 100);
        assert_eq!(forest.n_features(), 1);
    }

    #[test]
    fn test_predictions_stay_within_target_range() {
        let dataset = step_dataset();
        let forest = RandomForestRegressor::params().fit(&dataset).unwrap();

        let pred = forest.predict(&array![[-100.0], [0.0], [4.5], [1000.0]]);
        assert!(pred.iter().all(|&p| (10.0..=50.0).contains(&p)));
    }

    #[test]
    fn test_constant_targets_give_single_leaf() {
        let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let y = array![7.0, 7.0, 7.0];
        let forest = RandomForestRegressor::params()
            .n_estimators(3)
            .fit(&Dataset::new(x, y))
            .unwrap();

        assert!(forest.trees().iter().all(|t| t.depth() == 0));
        assert_eq!(forest.predict(&array![[0.0, 0.0]])[0], 7.0);
    }

    #[test]
    fn test_max_depth_is_respected() {
        let forest = RandomForestRegressor::params()
            .max_depth(Some(1))
            .fit(&step_dataset())
            .unwrap();
        assert!(forest.trees().iter().all(|t| t.depth() <= 1));
    }

    #[test]
    fn test_same_seed_same_forest() {
        let a = RandomForestRegressor::params().seed(3).fit(&step_dataset()).unwrap();
        let b = RandomForestRegressor::params().seed(3).fit(&step_dataset()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_params_are_rejected() {
        let dataset = step_dataset();
        assert!(RandomForestRegressor::params()
            .n_estimators(0)
            .fit(&dataset)
            .is_err());
        assert!(RandomForestRegressor::params()
            .min_samples_split(1)
            .fit(&dataset)
            .is_err());
    }

    #[test]
    fn test_forest_serializes() {
        let forest = RandomForestRegressor::params()
            .n_estimators(2)
            .fit(&step_dataset())
            .unwrap();
        let json = serde_json::to_string(&forest).unwrap();
        let restored: RandomForestRegressor = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, forest);
    }
}
