use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemorySubmissionStore};
use crate::routes::with_prediction_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use carbon_footprint::config::AppConfig;
use carbon_footprint::error::AppError;
use carbon_footprint::prediction::{
    CsvDatasetSource, FsArtifactStore, InitialLoad, PredictionService,
};
use carbon_footprint::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let service = Arc::new(PredictionService::new(
        Arc::new(InMemorySubmissionStore::default()),
        Arc::new(CsvDatasetSource::new(config.pipeline.dataset_path.clone())),
        Arc::new(FsArtifactStore::new(config.pipeline.artifact_dir.clone())),
        &config.pipeline,
    ));

    let app = with_prediction_routes(service.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Predictions answer 503 until the first pool lands.
    tokio::spawn(async move {
        match service.initialize().await {
            Ok(InitialLoad::Restored { best_model }) => {
                info!(%best_model, "model pool restored from artifacts");
            }
            Ok(InitialLoad::Trained(report)) => {
                info!(best_model = %report.best_model, "model pool trained at start-up");
            }
            Err(err) => {
                error!(error = %err, "no model pool available; use /api/retrain once the dataset is fixed");
                return;
            }
        }
        readiness_flag.store(true, Ordering::Release);
    });

    info!(?config.environment, %addr, "carbon footprint service listening");

    axum::serve(listener, app).await?;
    Ok(())
}
