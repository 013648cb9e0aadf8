use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::dataset::{DataError, PreparedDataset, RawTable};
use super::features::{feature_names, CategoryEncoder, FeatureDeriver, FeatureVector, FEATURE_COUNT};
use super::models::metrics::{mean_absolute_error, r2_score};
use super::models::{fit_family, FitError, FittedModel, ModelFamily, ModelHyperparameters, Regressor};
use super::pool::ModelPool;
use super::selector::SelectionError;

/// Families to train and how to evaluate them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub families: Vec<ModelFamily>,
    /// Share of rows held out for evaluation.
    pub holdout_fraction: f64,
    pub seed: u64,
    pub hyperparameters: ModelHyperparameters,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            families: ModelFamily::ALL.to_vec(),
            holdout_fraction: 0.2,
            seed: 42,
            hyperparameters: ModelHyperparameters::default(),
        }
    }
}

/// Held-out evaluation recorded for one family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyMetrics {
    pub mae: f64,
    pub r2: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_importance: Option<BTreeMap<String, f64>>,
}

/// A fitted model with its recorded metrics. Never mutated after training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub model: FittedModel,
    pub metrics: FamilyMetrics,
}

impl TrainedModel {
    pub fn family(&self) -> ModelFamily {
        self.model.family()
    }

    pub fn predict(&self, features: &FeatureVector) -> f64 {
        self.model.predict(ArrayView1::from(features.as_slice()))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{family} failed to train: {source}")]
pub struct FamilyTrainingError {
    pub family: ModelFamily,
    #[source]
    pub source: FitError,
}

pub type FamilyOutcome = Result<TrainedModel, FamilyTrainingError>;

/// Result of one training pass: the encoder fitted for it and every family's outcome.
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub encoder: CategoryEncoder,
    pub outcomes: BTreeMap<ModelFamily, FamilyOutcome>,
    pub training_rows: usize,
    pub holdout_rows: usize,
}

impl TrainingRun {
    pub fn succeeded(&self) -> Vec<ModelFamily> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_ok())
            .map(|(family, _)| *family)
            .collect()
    }

    pub fn failures(&self) -> BTreeMap<ModelFamily, String> {
        self.outcomes
            .iter()
            .filter_map(|(family, outcome)| {
                outcome
                    .as_ref()
                    .err()
                    .map(|error| (*family, error.source.to_string()))
            })
            .collect()
    }

    /// Build a pool from the families that trained; fails only when none did.
    pub fn into_pool(self) -> Result<ModelPool, SelectionError> {
        let models = self
            .outcomes
            .into_iter()
            .filter_map(|(family, outcome)| outcome.ok().map(|model| (family, model)))
            .collect();
        ModelPool::assemble(models, self.encoder, chrono::Utc::now())
    }
}

/// Fits every configured family independently on a shared split.
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn train_table(&self, table: &RawTable) -> Result<TrainingRun, DataError> {
        let dataset = PreparedDataset::from_table(table)?;
        Ok(self.train(&dataset))
    }

    pub fn train(&self, dataset: &PreparedDataset) -> TrainingRun {
        let encoder = CategoryEncoder::fit(&dataset.rows);
        let x = design_matrix(dataset, &encoder);
        let y = Array1::from(dataset.targets.clone());

        let (train_idx, holdout_idx) =
            split_indices(x.nrows(), self.config.holdout_fraction, self.config.seed);
        let train_x = x.select(Axis(0), &train_idx);
        let train_y = y.select(Axis(0), &train_idx);
        let holdout_x = x.select(Axis(0), &holdout_idx);
        let holdout_y = y.select(Axis(0), &holdout_idx);

        let mut outcomes = BTreeMap::new();
        for &family in &self.config.families {
            let outcome = self
                .train_family(
                    family,
                    train_x.view(),
                    train_y.view(),
                    holdout_x.view(),
                    holdout_y.view(),
                )
                .map_err(|source| FamilyTrainingError { family, source });

            match &outcome {
                Ok(trained) => info!(
                    family = %family,
                    mae = trained.metrics.mae,
                    r2 = trained.metrics.r2,
                    "model family trained"
                ),
                Err(error) => warn!(family = %family, error = %error.source, "model family failed to train"),
            }
            outcomes.insert(family, outcome);
        }

        TrainingRun {
            encoder,
            outcomes,
            training_rows: train_x.nrows(),
            holdout_rows: holdout_x.nrows(),
        }
    }

    fn train_family(
        &self,
        family: ModelFamily,
        train_x: ArrayView2<'_, f64>,
        train_y: ArrayView1<'_, f64>,
        holdout_x: ArrayView2<'_, f64>,
        holdout_y: ArrayView1<'_, f64>,
    ) -> Result<TrainedModel, FitError> {
        let model = fit_family(
            family,
            train_x,
            train_y,
            &self.config.hyperparameters,
            self.config.seed,
        )?;

        let predictions: Array1<f64> = holdout_x
            .rows()
            .into_iter()
            .map(|row| model.predict(row))
            .collect();
        if predictions.iter().any(|value| !value.is_finite()) {
            return Err(FitError::NumericalInstability(
                "non-finite prediction on held-out rows".to_string(),
            ));
        }

        let mae = mean_absolute_error(holdout_y, predictions.view());
        let r2 = r2_score(holdout_y, predictions.view());
        if !mae.is_finite() || !r2.is_finite() {
            return Err(FitError::NumericalInstability(format!(
                "held-out metrics are not finite (mae {mae}, r2 {r2})"
            )));
        }

        let feature_importance = model.feature_importance().map(|weights| {
            feature_names()
                .zip(weights.iter().copied())
                .map(|(name, weight)| (name.to_string(), weight))
                .collect()
        });

        Ok(TrainedModel {
            model,
            metrics: FamilyMetrics {
                mae,
                r2,
                feature_importance,
            },
        })
    }
}

/// Seeded shuffle then split; both sides always keep at least one row.
pub(crate) fn split_indices(rows: usize, holdout_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut order: Vec<usize> = (0..rows).collect();
    order.shuffle(&mut SmallRng::seed_from_u64(seed));

    let holdout = ((rows as f64) * holdout_fraction - 1e-9).ceil() as usize;
    let holdout = holdout.clamp(1, rows.saturating_sub(1).max(1));
    let train = order.split_off(holdout);
    (train, order)
}

/// One row per household, columns in feature-vector order.
fn design_matrix(dataset: &PreparedDataset, encoder: &CategoryEncoder) -> Array2<f64> {
    let vectors: Vec<FeatureVector> = dataset
        .rows
        .iter()
        .map(|row| FeatureDeriver::vectorize(row, encoder))
        .collect();
    Array2::from_shape_fn((vectors.len(), FEATURE_COUNT), |(row, col)| {
        vectors[row].as_slice()[col]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_holds_out_the_configured_share() {
        let (train, holdout) = split_indices(10, 0.2, 42);
        assert_eq!(holdout.len(), 2);
        assert_eq!(train.len(), 8);

        let mut all: Vec<usize> = train.iter().chain(&holdout).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn split_is_seeded() {
        assert_eq!(split_indices(30, 0.2, 7), split_indices(30, 0.2, 7));
        assert_ne!(split_indices(30, 0.2, 7), split_indices(30, 0.2, 8));
    }

    #[test]
    fn split_keeps_a_row_on_each_side() {
        let (train, holdout) = split_indices(2, 0.9, 1);
        assert_eq!(train.len(), 1);
        assert_eq!(holdout.len(), 1);
    }
}
