use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::SmallRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::tree::{sample_features, RegressionTree, TreeParams};
use super::{normalize_importance, FitError, Regressor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub rounds: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Fraction of rows drawn without replacement for each round.
    pub subsample: f64,
    /// Fraction of features offered to each round's tree.
    pub colsample: f64,
    pub min_samples_leaf: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            rounds: 200,
            max_depth: 8,
            learning_rate: 0.1,
            subsample: 0.8,
            colsample: 0.8,
            min_samples_leaf: 1,
        }
    }
}

/// Squared-loss gradient boosting over shallow regression trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    base: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
    importance: Vec<f64>,
}

impl GradientBoostedTrees {
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        params: &BoostingParams,
        seed: u64,
    ) -> Result<Self, FitError> {
        let (n, width) = x.dim();
        if n < 2 {
            return Err(FitError::InsufficientData {
                rows: n,
                required: 2,
            });
        }
        if !(params.learning_rate > 0.0 && params.learning_rate.is_finite()) {
            return Err(FitError::NumericalInstability(format!(
                "learning rate {} is not a positive number",
                params.learning_rate
            )));
        }

        let base = y.mean().unwrap_or(0.0);
        let row_count = fraction_of(n, params.subsample);
        let feature_count = fraction_of(width, params.colsample);
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: 2 * params.min_samples_leaf.max(1),
            min_samples_leaf: params.min_samples_leaf,
        };

        let mut rng = SmallRng::seed_from_u64(seed);
        let mut predictions = Array1::from_elem(n, base);
        let mut importance = vec![0.0; width];
        let mut trees = Vec::with_capacity(params.rounds);

        for _ in 0..params.rounds {
            let residuals = &y - &predictions;
            let mut samples = index::sample(&mut rng, n, row_count).into_vec();
            samples.sort_unstable();
            let features = sample_features(width, feature_count, &mut rng);

            let tree = RegressionTree::fit(
                x,
                residuals.view(),
                &samples,
                &features,
                tree_params,
                &mut importance,
            );
            for (prediction, row) in predictions.iter_mut().zip(x.rows()) {
                *prediction += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            base,
            learning_rate: params.learning_rate,
            trees,
            importance: normalize_importance(importance),
        })
    }
}

impl Regressor for GradientBoostedTrees {
    fn predict(&self, features: ArrayView1<'_, f64>) -> f64 {
        self.trees
            .iter()
            .fold(self.base, |acc, tree| acc + self.learning_rate * tree.predict(features))
    }

    fn feature_importance(&self) -> Option<&[f64]> {
        Some(&self.importance)
    }
}

fn fraction_of(total: usize, fraction: f64) -> usize {
    // Guard against 0.8 * 10 landing a hair above 8 before ceil.
    let count = (total as f64 * fraction.clamp(0.0, 1.0) - 1e-9).ceil() as usize;
    count.clamp(1, total.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((50, 2), |(i, col)| {
            if col == 0 {
                i as f64
            } else {
                (i % 5) as f64
            }
        });
        let y = x
            .rows()
            .into_iter()
            .map(|row| row[0] * row[0] / 10.0 + row[1])
            .collect();
        (x, y)
    }

    fn params() -> BoostingParams {
        BoostingParams {
            rounds: 40,
            max_depth: 3,
            ..BoostingParams::default()
        }
    }

    #[test]
    fn boosting_reduces_training_error_below_the_mean_model() {
        let (x, y) = data();
        let model = GradientBoostedTrees::fit(x.view(), y.view(), &params(), 9).expect("fits");
        let mean = y.mean().expect("non-empty");

        let fitted: Array1<f64> = x.rows().into_iter().map(|row| model.predict(row)).collect();
        let model_error = (&fitted - &y).mapv(f64::abs).sum();
        let mean_error = y.mapv(|target| (mean - target).abs()).sum();
        assert!(model_error < mean_error / 2.0);
    }

    #[test]
    fn zero_rounds_predicts_the_mean() {
        let (x, y) = data();
        let model = GradientBoostedTrees::fit(
            x.view(),
            y.view(),
            &BoostingParams {
                rounds: 0,
                ..params()
            },
            9,
        )
        .expect("fits");
        let mean = y.mean().expect("non-empty");
        assert!((model.predict(x.row(0)) - mean).abs() < 1e-9);
    }

    #[test]
    fn seeded_fit_is_reproducible() {
        let (x, y) = data();
        assert_eq!(
            GradientBoostedTrees::fit(x.view(), y.view(), &params(), 5).expect("fits"),
            GradientBoostedTrees::fit(x.view(), y.view(), &params(), 5).expect("fits")
        );
    }

    #[test]
    fn non_positive_learning_rate_is_rejected() {
        let (x, y) = data();
        let bad = BoostingParams {
            learning_rate: 0.0,
            ..params()
        };
        assert!(matches!(
            GradientBoostedTrees::fit(x.view(), y.view(), &bad, 1),
            Err(FitError::NumericalInstability(_))
        ));
    }

    #[test]
    fn fraction_is_at_least_one() {
        assert_eq!(fraction_of(10, 0.8), 8);
        assert_eq!(fraction_of(3, 0.01), 1);
        assert_eq!(fraction_of(25, 0.8), 20);
    }
}
