use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;

use super::artifacts::ArtifactStore;
use super::blender::PredictionBlender;
use super::dataset::{DataError, TrainingDataSource};
use super::domain::{InferenceError, PredictionResult, Submission};
use super::features::FeatureDeriver;
use super::models::ModelFamily;
use super::pool::{ModelPool, ModelRegistry};
use super::repository::{StoreError, SubmissionId, SubmissionRecord, SubmissionStore};
use super::scheduler::{RetrainPhase, RetrainScheduler, RetrainTicket, SubmissionStats};
use super::selector::SelectionError;
use super::trainer::{FamilyMetrics, Trainer, TrainingRun};

/// Service composing feature derivation, the live model pool, blending and retraining.
pub struct PredictionService<S, D, A> {
    cycle: RetrainCycle<S, D, A>,
    blender: Arc<PredictionBlender>,
    scheduler: Arc<RetrainScheduler>,
    background: Mutex<Option<JoinHandle<()>>>,
}

/// Everything one Trainer -> ModelSelector pass needs, cloneable into a background task.
struct RetrainCycle<S, D, A> {
    registry: Arc<ModelRegistry>,
    trainer: Arc<Trainer>,
    store: Arc<S>,
    dataset: Arc<D>,
    artifacts: Arc<A>,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<S, D, A> Clone for RetrainCycle<S, D, A> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            trainer: Arc::clone(&self.trainer),
            store: Arc::clone(&self.store),
            dataset: Arc::clone(&self.dataset),
            artifacts: Arc::clone(&self.artifacts),
            lock: Arc::clone(&self.lock),
        }
    }
}

static SUBMISSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_submission_id() -> SubmissionId {
    SubmissionId(SUBMISSION_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrainTrigger {
    Automatic,
    Manual,
    Startup,
}

impl fmt::Display for RetrainTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RetrainTrigger::Automatic => "automatic",
            RetrainTrigger::Manual => "manual",
            RetrainTrigger::Startup => "startup",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrainStatus {
    Success,
    /// At least one family failed; the rest were installed.
    Partial,
}

/// Summary of a completed retrain cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrainReport {
    pub status: RetrainStatus,
    pub trigger: RetrainTrigger,
    pub models_retrained: Vec<ModelFamily>,
    pub failed_models: BTreeMap<ModelFamily, String>,
    pub best_model: ModelFamily,
    pub performance: BTreeMap<ModelFamily, FamilyMetrics>,
    pub training_rows: usize,
    pub holdout_rows: usize,
    pub trained_at: DateTime<Utc>,
}

/// Answer to the model-performance query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelPerformance {
    pub models_loaded: bool,
    pub best_model: Option<ModelFamily>,
    pub performance: BTreeMap<ModelFamily, FamilyMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
}

/// A served prediction plus the id its submission was logged under, so the caller can
/// report the realized emission later.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServedPrediction {
    /// Absent when the submission log rejected the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<SubmissionId>,
    #[serde(flatten)]
    pub result: PredictionResult,
}

/// How the first pool of the process was obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum InitialLoad {
    Restored { best_model: ModelFamily },
    Trained(RetrainReport),
}

impl<S, D, A> PredictionService<S, D, A>
where
    S: SubmissionStore + 'static,
    D: TrainingDataSource + 'static,
    A: ArtifactStore + 'static,
{
    pub fn new(store: Arc<S>, dataset: Arc<D>, artifacts: Arc<A>, config: &PipelineConfig) -> Self {
        Self::with_components(
            store,
            dataset,
            artifacts,
            Trainer::new(config.trainer_config()),
            PredictionBlender::new(config.emission_factors),
            config.retrain_threshold,
        )
    }

    pub fn with_components(
        store: Arc<S>,
        dataset: Arc<D>,
        artifacts: Arc<A>,
        trainer: Trainer,
        blender: PredictionBlender,
        retrain_threshold: u64,
    ) -> Self {
        Self {
            cycle: RetrainCycle {
                registry: Arc::new(ModelRegistry::new()),
                trainer: Arc::new(trainer),
                store,
                dataset,
                artifacts,
                lock: Arc::new(tokio::sync::Mutex::new(())),
            },
            blender: Arc::new(blender),
            scheduler: Arc::new(RetrainScheduler::new(retrain_threshold)),
            background: Mutex::new(None),
        }
    }

    /// Score a submission with the current pool snapshot.
    ///
    /// The submission counter moves only after the result exists, so a retrain it triggers
    /// never changes the model that served this request.
    pub fn predict(&self, submission: Submission) -> Result<ServedPrediction, PredictionError> {
        let derived = FeatureDeriver::derive(submission)?;
        let pool = self
            .cycle
            .registry
            .snapshot()
            .ok_or(PredictionError::ModelsUnavailable)?;
        let (result, outcome) = self.blender.predict(&derived, &pool)?;
        debug!(
            model = %result.model_used,
            raw = outcome.raw,
            baseline = outcome.baseline,
            predicted_co2 = result.predicted_co2,
            "prediction served"
        );

        let record = SubmissionRecord {
            id: next_submission_id(),
            submission: derived,
            predicted_co2: result.predicted_co2,
            actual_co2: None,
            created_at: Utc::now(),
        };
        let submission_id = match self.cycle.store.insert(record) {
            Ok(stored) => Some(stored.id),
            Err(err) => {
                warn!(error = %err, "failed to log submission");
                None
            }
        };

        if let Some(ticket) = self.scheduler.record_prediction() {
            self.spawn_retrain(ticket);
        }

        Ok(ServedPrediction {
            submission_id,
            result,
        })
    }

    /// Run a retrain cycle now, queuing behind any cycle already in flight.
    pub async fn retrain(&self) -> Result<RetrainReport, RetrainError> {
        let ticket = self.scheduler.begin_cycle();
        self.cycle.run(RetrainTrigger::Manual, ticket).await
    }

    /// Restore persisted artifacts, falling back to a full training cycle.
    pub async fn initialize(&self) -> Result<InitialLoad, RetrainError> {
        let artifacts = Arc::clone(&self.cycle.artifacts);
        match tokio::task::spawn_blocking(move || artifacts.load()).await {
            Ok(Ok(Some(pool))) => {
                let best_model = pool.best();
                self.cycle.registry.install(pool);
                return Ok(InitialLoad::Restored { best_model });
            }
            Ok(Ok(None)) => info!("no model artifacts found; training from dataset"),
            Ok(Err(err)) => warn!(error = %err, "model artifacts unusable; training from dataset"),
            Err(err) => warn!(error = %err, "artifact restore worker failed"),
        }

        let ticket = self.scheduler.begin_cycle();
        let report = self.cycle.run(RetrainTrigger::Startup, ticket).await?;
        Ok(InitialLoad::Trained(report))
    }

    /// Await the automatic retrain spawned by the most recent threshold crossing, if any.
    pub async fn wait_for_background_retrain(&self) {
        let handle = self.background.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(error = %err, "background retrain task aborted");
            }
        }
    }

    pub fn performance(&self) -> ModelPerformance {
        match self.cycle.registry.snapshot() {
            Some(pool) => ModelPerformance {
                models_loaded: true,
                best_model: Some(pool.best()),
                performance: pool.performance(),
                trained_at: Some(pool.trained_at()),
            },
            None => ModelPerformance::default(),
        }
    }

    pub fn submission_stats(&self) -> SubmissionStats {
        self.scheduler.stats()
    }

    pub fn retrain_phase(&self) -> RetrainPhase {
        self.scheduler.phase()
    }

    pub fn models_loaded(&self) -> bool {
        self.cycle.registry.is_loaded()
    }

    pub fn snapshot(&self) -> Option<Arc<ModelPool>> {
        self.cycle.registry.snapshot()
    }

    /// Attach a realized emission value so the next cycle trains on it.
    pub fn record_actual(&self, id: SubmissionId, actual_co2: f64) -> Result<(), LabelError> {
        if !actual_co2.is_finite() || actual_co2 < 0.0 {
            return Err(LabelError::InvalidValue(actual_co2));
        }
        self.cycle.store.record_actual(id, actual_co2)?;
        info!(submission = %id, actual_co2, "submission labelled");
        Ok(())
    }

    fn spawn_retrain(&self, ticket: RetrainTicket) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime available; skipping automatic retrain");
            return;
        };

        let cycle = self.cycle.clone();
        let handle = runtime.spawn(async move {
            // Failures are already logged inside the cycle.
            let _ = cycle.run(RetrainTrigger::Automatic, ticket).await;
        });
        *self.background.lock() = Some(handle);
    }
}

impl<S, D, A> RetrainCycle<S, D, A>
where
    S: SubmissionStore + 'static,
    D: TrainingDataSource + 'static,
    A: ArtifactStore + 'static,
{
    /// One Trainer -> ModelSelector pass. The ticket is released when this returns, so
    /// the counter resets whether or not the cycle succeeded.
    async fn run(
        &self,
        trigger: RetrainTrigger,
        ticket: RetrainTicket,
    ) -> Result<RetrainReport, RetrainError> {
        let _exclusive = self.lock.lock().await;
        info!(trigger = %trigger, "retrain cycle started");

        let result = self.train(trigger).await;
        match &result {
            Ok(report) => info!(
                trigger = %trigger,
                best_model = %report.best_model,
                retrained = report.models_retrained.len(),
                failed = report.failed_models.len(),
                "retrain cycle completed"
            ),
            Err(err) => error!(
                trigger = %trigger,
                error = %err,
                "retrain cycle failed; previous models stay active"
            ),
        }

        drop(ticket);
        result
    }

    async fn train(&self, trigger: RetrainTrigger) -> Result<RetrainReport, RetrainError> {
        let dataset = Arc::clone(&self.dataset);
        let store = Arc::clone(&self.store);
        let trainer = Arc::clone(&self.trainer);

        let run = tokio::task::spawn_blocking(move || {
            collect_and_train(dataset.as_ref(), store.as_ref(), &trainer)
        })
        .await
        .map_err(|err| RetrainError::Worker(err.to_string()))??;

        let models_retrained = run.succeeded();
        let failed_models = run.failures();
        let (training_rows, holdout_rows) = (run.training_rows, run.holdout_rows);
        let pool = Arc::new(run.into_pool()?);

        let report = RetrainReport {
            status: if failed_models.is_empty() {
                RetrainStatus::Success
            } else {
                RetrainStatus::Partial
            },
            trigger,
            models_retrained,
            failed_models,
            best_model: pool.best(),
            performance: pool.performance(),
            training_rows,
            holdout_rows,
            trained_at: pool.trained_at(),
        };

        self.registry.install(Arc::clone(&pool));

        let artifacts = Arc::clone(&self.artifacts);
        match tokio::task::spawn_blocking(move || artifacts.save(&pool)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "failed to persist model artifacts"),
            Err(err) => warn!(error = %err, "artifact persistence worker failed"),
        }

        Ok(report)
    }
}

/// Base dataset plus every labelled submission, then a full training pass.
fn collect_and_train<S, D>(dataset: &D, store: &S, trainer: &Trainer) -> Result<TrainingRun, RetrainError>
where
    S: SubmissionStore + ?Sized,
    D: TrainingDataSource + ?Sized,
{
    let mut table = dataset.load()?;

    match store.labelled() {
        Ok(records) => {
            let mut appended = 0;
            for row in records.iter().filter_map(SubmissionRecord::dataset_row) {
                table.push_named(&row);
                appended += 1;
            }
            debug!(appended, "labelled submissions added to training table");
        }
        Err(err) => warn!(
            error = %err,
            "labelled submissions unavailable; training on the base dataset only"
        ),
    }

    Ok(trainer.train_table(&table)?)
}

#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("no trained models are available yet")]
    ModelsUnavailable,
}

impl PredictionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PredictionError::Inference(InferenceError::NonFiniteOutput { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            PredictionError::Inference(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PredictionError::ModelsUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LabelError {
    #[error("actual_co2 must be a finite, non-negative number (got {0})")]
    InvalidValue(f64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LabelError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LabelError::InvalidValue(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LabelError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            LabelError::Store(StoreError::Conflict) => StatusCode::CONFLICT,
            LabelError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetrainError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("training worker failed: {0}")]
    Worker(String),
}

impl RetrainError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RetrainError::Data(_) => StatusCode::BAD_REQUEST,
            RetrainError::Selection(_) | RetrainError::Worker(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
