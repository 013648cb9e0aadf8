use crate::infra::InMemorySubmissionStore;
use carbon_footprint::config::{AppConfig, PipelineConfig};
use carbon_footprint::error::AppError;
use carbon_footprint::prediction::{
    ArtifactStore, CsvDatasetSource, FeatureDeriver, FsArtifactStore, PredictionBlender,
    PredictionError, PredictionResult, PredictionService, RetrainReport, Submission,
};
use carbon_footprint::telemetry;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Args, Debug)]
pub(crate) struct TrainArgs {
    /// Training CSV (defaults to CARBON_DATASET_PATH)
    #[arg(long)]
    pub(crate) dataset: Option<PathBuf>,
    /// Directory receiving the model artifacts (defaults to CARBON_ARTIFACT_DIR)
    #[arg(long)]
    pub(crate) artifacts: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct PredictArgs {
    /// JSON file holding one survey submission
    #[arg(long)]
    pub(crate) submission: PathBuf,
    /// Directory holding the model artifacts (defaults to CARBON_ARTIFACT_DIR)
    #[arg(long)]
    pub(crate) artifacts: Option<PathBuf>,
}

pub(crate) async fn run_train(args: TrainArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let mut pipeline = config.pipeline;
    if let Some(dataset) = args.dataset {
        pipeline.dataset_path = dataset;
    }
    if let Some(artifacts) = args.artifacts {
        pipeline.artifact_dir = artifacts;
    }

    let report = train(&pipeline).await?;
    info!(
        best_model = %report.best_model,
        artifact_dir = %pipeline.artifact_dir.display(),
        "offline training finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub(crate) fn run_predict(args: PredictArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let mut pipeline = config.pipeline;
    if let Some(artifacts) = args.artifacts {
        pipeline.artifact_dir = artifacts;
    }

    let raw = std::fs::read_to_string(&args.submission)?;
    let submission: Submission = serde_json::from_str(&raw)?;
    let result = predict(&pipeline, submission)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn train(pipeline: &PipelineConfig) -> Result<RetrainReport, AppError> {
    let service = PredictionService::new(
        Arc::new(InMemorySubmissionStore::default()),
        Arc::new(CsvDatasetSource::new(pipeline.dataset_path.clone())),
        Arc::new(FsArtifactStore::new(pipeline.artifact_dir.clone())),
        pipeline,
    );
    Ok(service.retrain().await?)
}

fn predict(pipeline: &PipelineConfig, submission: Submission) -> Result<PredictionResult, AppError> {
    let pool = FsArtifactStore::new(pipeline.artifact_dir.clone())
        .load()?
        .ok_or(PredictionError::ModelsUnavailable)?;
    let derived = FeatureDeriver::derive(submission).map_err(PredictionError::from)?;
    let (result, _) = PredictionBlender::new(pipeline.emission_factors)
        .predict(&derived, &pool)
        .map_err(PredictionError::from)?;
    Ok(result)
}
