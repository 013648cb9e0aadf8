//! Carbon footprint prediction pipeline.
//!
//! Survey submissions flow through the feature deriver into the currently selected model of
//! the installed [`ModelPool`]; the blender reconciles the model output with a physics
//! baseline. The retrain scheduler counts successful predictions and replaces the pool once
//! enough new submissions have arrived.

pub mod artifacts;
pub mod blender;
pub mod dataset;
pub mod domain;
pub mod features;
pub mod models;
pub mod pool;
pub mod repository;
pub mod router;
pub mod scheduler;
pub mod selector;
pub mod service;
pub mod trainer;

#[cfg(test)]
mod tests;

pub use artifacts::{ArtifactError, ArtifactStore, FsArtifactStore};
pub use blender::{BlendAdjustment, BlendOutcome, EmissionFactors, PredictionBlender};
pub use dataset::{
    schema_columns, CsvDatasetSource, DataError, PreparedDataset, RawTable, TrainingDataSource,
};
pub use domain::{DerivedFields, DerivedSubmission, InferenceError, PredictionResult, Submission};
pub use features::{CategoryEncoder, FeatureDeriver, FeatureVector, RawFeatures};
pub use models::{FitError, FittedModel, ModelFamily, ModelHyperparameters, Regressor};
pub use pool::{ModelPool, ModelRegistry};
pub use repository::{StoreError, SubmissionId, SubmissionRecord, SubmissionStore};
pub use router::prediction_router;
pub use scheduler::{RetrainPhase, RetrainScheduler, RetrainTicket, SubmissionStats};
pub use selector::{ModelSelector, SelectionError};
pub use service::{
    InitialLoad, LabelError, ModelPerformance, PredictionError, PredictionService, RetrainError,
    RetrainReport, RetrainStatus, RetrainTrigger, ServedPrediction,
};
pub use trainer::{
    FamilyMetrics, FamilyOutcome, FamilyTrainingError, TrainedModel, Trainer, TrainerConfig,
    TrainingRun,
};
