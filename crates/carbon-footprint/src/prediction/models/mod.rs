//! Regression model families competing for the live prediction slot.

mod boosting;
mod forest;
pub mod metrics;
mod neural;
mod tree;

pub use boosting::{BoostingParams, GradientBoostedTrees};
pub use forest::{ForestParams, RandomForest};
pub use neural::{NeuralNetwork, NeuralParams};
pub use tree::{RegressionTree, TreeParams};

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;

use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Identifier of a model family. Declaration order doubles as the selection
/// tie-break priority: earlier families win exact ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    RandomForest,
    GradientBoostedTrees,
    NeuralNetwork,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 3] = [
        ModelFamily::RandomForest,
        ModelFamily::GradientBoostedTrees,
        ModelFamily::NeuralNetwork,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelFamily::RandomForest => "random_forest",
            ModelFamily::GradientBoostedTrees => "gradient_boosted_trees",
            ModelFamily::NeuralNetwork => "neural_network",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown model family `{0}`")]
pub struct UnknownModelFamily(pub String);

impl FromStr for ModelFamily {
    type Err = UnknownModelFamily;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ModelFamily::ALL
            .into_iter()
            .find(|family| family.as_str() == value.trim())
            .ok_or_else(|| UnknownModelFamily(value.to_string()))
    }
}

/// Common inference surface of every fitted model.
pub trait Regressor {
    fn predict(&self, features: ArrayView1<'_, f64>) -> f64;

    /// Normalized per-feature importance in vector order, for families that expose it.
    fn feature_importance(&self) -> Option<&[f64]> {
        None
    }
}

/// Hyper-parameters for every family, carried by the trainer configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelHyperparameters {
    pub forest: ForestParams,
    pub boosting: BoostingParams,
    pub neural: NeuralParams,
}

/// A fitted regressor of any family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", content = "model", rename_all = "snake_case")]
pub enum FittedModel {
    RandomForest(RandomForest),
    GradientBoostedTrees(GradientBoostedTrees),
    NeuralNetwork(NeuralNetwork),
}

impl FittedModel {
    pub fn family(&self) -> ModelFamily {
        match self {
            FittedModel::RandomForest(_) => ModelFamily::RandomForest,
            FittedModel::GradientBoostedTrees(_) => ModelFamily::GradientBoostedTrees,
            FittedModel::NeuralNetwork(_) => ModelFamily::NeuralNetwork,
        }
    }

    fn regressor(&self) -> &dyn Regressor {
        match self {
            FittedModel::RandomForest(model) => model,
            FittedModel::GradientBoostedTrees(model) => model,
            FittedModel::NeuralNetwork(model) => model,
        }
    }
}

impl Regressor for FittedModel {
    fn predict(&self, features: ArrayView1<'_, f64>) -> f64 {
        self.regressor().predict(features)
    }

    fn feature_importance(&self) -> Option<&[f64]> {
        self.regressor().feature_importance()
    }
}

/// Why a single family could not be fitted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("{rows} training rows available; at least {required} are needed")]
    InsufficientData { rows: usize, required: usize },
    #[error("numerical instability: {0}")]
    NumericalInstability(String),
    #[error("fit aborted: {0}")]
    Panicked(String),
}

/// Fit one family on the design matrix `x` (one row per household) and target `y`. A panic inside the fit is contained and reported as
/// [`FitError::Panicked`] so sibling families keep training.
pub fn fit_family(
    family: ModelFamily,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    params: &ModelHyperparameters,
    seed: u64,
) -> Result<FittedModel, FitError> {
    if x.nrows() == 0 || x.nrows() != y.len() {
        return Err(FitError::InsufficientData {
            rows: x.nrows().min(y.len()),
            required: 1,
        });
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| match family {
        ModelFamily::RandomForest => {
            RandomForest::fit(x, y, &params.forest, seed).map(FittedModel::RandomForest)
        }
        ModelFamily::GradientBoostedTrees => GradientBoostedTrees::fit(x, y, &params.boosting, seed)
            .map(FittedModel::GradientBoostedTrees),
        ModelFamily::NeuralNetwork => {
            NeuralNetwork::fit(x, y, &params.neural, seed).map(FittedModel::NeuralNetwork)
        }
    }));

    outcome.unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|text| text.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "model fit panicked".to_string());
        Err(FitError::Panicked(message))
    })
}

/// Normalize accumulated importances so they sum to one.
pub(crate) fn normalize_importance(mut importance: Vec<f64>) -> Vec<f64> {
    let total: f64 = importance.iter().sum();
    if total > 0.0 && total.is_finite() {
        for value in &mut importance {
            *value /= total;
        }
    }
    importance
}
