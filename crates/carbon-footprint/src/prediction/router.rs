use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::error::AppError;

use super::artifacts::ArtifactStore;
use super::dataset::TrainingDataSource;
use super::domain::Submission;
use super::repository::{SubmissionId, SubmissionStore};
use super::scheduler::SubmissionStats;
use super::service::{ModelPerformance, PredictionService, RetrainReport, ServedPrediction};

/// Router exposing prediction, labelling, manual retraining and pool introspection.
pub fn prediction_router<S, D, A>(service: Arc<PredictionService<S, D, A>>) -> Router
where
    S: SubmissionStore + 'static,
    D: TrainingDataSource + 'static,
    A: ArtifactStore + 'static,
{
    Router::new()
        .route("/api/predict", post(predict_handler::<S, D, A>))
        .route(
            "/api/submissions/:id/actual",
            post(record_actual_handler::<S, D, A>),
        )
        .route("/api/retrain", post(retrain_handler::<S, D, A>))
        .route("/api/model-performance", get(performance_handler::<S, D, A>))
        .route("/api/submission-stats", get(stats_handler::<S, D, A>))
        .with_state(service)
}

/// Realized emission reported for an earlier submission.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ActualEmission {
    pub actual_co2: f64,
}

pub(crate) async fn predict_handler<S, D, A>(
    State(service): State<Arc<PredictionService<S, D, A>>>,
    Json(submission): Json<Submission>,
) -> Result<Json<ServedPrediction>, AppError>
where
    S: SubmissionStore + 'static,
    D: TrainingDataSource + 'static,
    A: ArtifactStore + 'static,
{
    Ok(Json(service.predict(submission)?))
}

pub(crate) async fn record_actual_handler<S, D, A>(
    State(service): State<Arc<PredictionService<S, D, A>>>,
    Path(id): Path<SubmissionId>,
    Json(label): Json<ActualEmission>,
) -> Result<StatusCode, AppError>
where
    S: SubmissionStore + 'static,
    D: TrainingDataSource + 'static,
    A: ArtifactStore + 'static,
{
    service.record_actual(id, label.actual_co2)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn retrain_handler<S, D, A>(
    State(service): State<Arc<PredictionService<S, D, A>>>,
) -> Result<Json<RetrainReport>, AppError>
where
    S: SubmissionStore + 'static,
    D: TrainingDataSource + 'static,
    A: ArtifactStore + 'static,
{
    Ok(Json(service.retrain().await?))
}

pub(crate) async fn performance_handler<S, D, A>(
    State(service): State<Arc<PredictionService<S, D, A>>>,
) -> Json<ModelPerformance>
where
    S: SubmissionStore + 'static,
    D: TrainingDataSource + 'static,
    A: ArtifactStore + 'static,
{
    Json(service.performance())
}

pub(crate) async fn stats_handler<S, D, A>(
    State(service): State<Arc<PredictionService<S, D, A>>>,
) -> Json<SubmissionStats>
where
    S: SubmissionStore + 'static,
    D: TrainingDataSource + 'static,
    A: ArtifactStore + 'static,
{
    Json(service.submission_stats())
}
