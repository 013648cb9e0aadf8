use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tree::{sample_features, RegressionTree, TreeParams};
use super::{normalize_importance, FitError, Regressor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means every feature.
    pub max_features: Option<usize>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 15,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: None,
        }
    }
}

/// Bagged regression trees averaged at prediction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    importance: Vec<f64>,
}

impl RandomForest {
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        params: &ForestParams,
        seed: u64,
    ) -> Result<Self, FitError> {
        let (n, width) = x.dim();
        if n < 2 {
            return Err(FitError::InsufficientData {
                rows: n,
                required: 2,
            });
        }

        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
        };
        let mut importance = vec![0.0; width];
        let mut trees = Vec::with_capacity(params.n_trees.max(1));

        for tree_idx in 0..params.n_trees.max(1) {
            let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(tree_idx as u64));
            let samples: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let features = match params.max_features {
                Some(count) => sample_features(width, count, &mut rng),
                None => (0..width).collect(),
            };
            trees.push(RegressionTree::fit(
                x,
                y,
                &samples,
                &features,
                tree_params,
                &mut importance,
            ));
        }

        Ok(Self {
            trees,
            importance: normalize_importance(importance),
        })
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for RandomForest {
    fn predict(&self, features: ArrayView1<'_, f64>) -> f64 {
        let total: f64 = self.trees.iter().map(|tree| tree.predict(features)).sum();
        total / self.trees.len() as f64
    }

    fn feature_importance(&self) -> Option<&[f64]> {
        Some(&self.importance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1, Array2};

    fn params() -> ForestParams {
        ForestParams {
            n_trees: 10,
            ..ForestParams::default()
        }
    }

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((40, 2), |(i, col)| if col == 0 { i as f64 } else { 7.0 });
        let y = x.column(0).mapv(|value| 3.0 * value);
        (x, y)
    }

    #[test]
    fn same_seed_grows_the_same_forest() {
        let (x, y) = data();
        let first = RandomForest::fit(x.view(), y.view(), &params(), 42).expect("fits");
        let second = RandomForest::fit(x.view(), y.view(), &params(), 42).expect("fits");
        assert_eq!(first, second);
        assert_eq!(first.tree_count(), 10);
    }

    #[test]
    fn predictions_track_the_target() {
        let (x, y) = data();
        let forest = RandomForest::fit(x.view(), y.view(), &params(), 42).expect("fits");

        let low = forest.predict(array![5.0, 7.0].view());
        let high = forest.predict(array![35.0, 7.0].view());
        assert!(low < high);
        assert!((high - 105.0).abs() < 20.0);
    }

    #[test]
    fn constant_feature_has_no_importance() {
        let (x, y) = data();
        let forest = RandomForest::fit(x.view(), y.view(), &params(), 42).expect("fits");
        let importance = forest.feature_importance().expect("tree families expose importance");

        assert!((importance[0] - 1.0).abs() < 1e-9);
        assert_eq!(importance[1], 0.0);
    }

    #[test]
    fn single_row_is_insufficient() {
        let x = array![[1.0]];
        let y = array![1.0];
        let result = RandomForest::fit(x.view(), y.view(), &params(), 1);
        assert!(matches!(result, Err(FitError::InsufficientData { .. })));
    }
}
