use super::common::*;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::response::IntoResponse;
use serde_json::json;
use tower::ServiceExt;

use crate::prediction::prediction_router;
use crate::prediction::router::{predict_handler, retrain_handler};
use crate::prediction::{RawTable, Submission};

fn predict_request(submission: &Submission) -> Request<Body> {
    Request::post("/api/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(submission).unwrap()))
        .unwrap()
}

fn label_request(id: u64, actual_co2: f64) -> Request<Body> {
    Request::post(format!("/api/submissions/{id}/actual"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::to_vec(&json!({ "actual_co2": actual_co2 })).unwrap(),
        ))
        .unwrap()
}

#[tokio::test]
async fn predict_route_is_unavailable_before_training() {
    let (service, _, _) = build_service(60, 20);
    let router = prediction_router(service);

    let response = router
        .oneshot(predict_request(&vegetarian_submission()))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let payload = body_json(response).await;
    assert!(payload["error"].as_str().is_some());
}

#[tokio::test]
async fn predict_route_returns_a_blended_result() {
    let (service, _, _) = build_service(60, 20);
    service.initialize().await.expect("startup training");
    let best = service.snapshot().expect("pool").best();
    let router = prediction_router(service);

    let response = router
        .oneshot(predict_request(&vegetarian_submission()))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await;
    assert!(payload["predicted_co2"].as_f64().expect("number") > 0.0);
    let confidence = payload["confidence"].as_f64().expect("number");
    assert!((0.6..=0.95).contains(&confidence));
    assert_eq!(payload["model_used"], best.as_str());
    assert!(payload["submission_id"].as_u64().is_some());
}

#[tokio::test]
async fn labelled_submission_feeds_the_next_retrain() {
    let (service, store, _) = build_service(60, 100);
    service.initialize().await.expect("startup training");
    let router = prediction_router(service);

    let response = router
        .clone()
        .oneshot(predict_request(&synthetic_submission(3)))
        .await
        .expect("route executes");
    let id = body_json(response).await["submission_id"]
        .as_u64()
        .expect("submission id");

    let response = router
        .clone()
        .oneshot(label_request(id, synthetic_target(3)))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(store.records()[0].actual_co2, Some(synthetic_target(3)));

    let response = router
        .oneshot(Request::post("/api/retrain").body(Body::empty()).unwrap())
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await;
    assert_eq!(payload["training_rows"], 48);
    assert_eq!(payload["holdout_rows"], 13);
}

#[tokio::test]
async fn labelling_an_unknown_submission_is_not_found() {
    let (service, _, _) = build_service(60, 20);
    let router = prediction_router(service);

    let response = router
        .oneshot(label_request(u64::MAX, 120.0))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = body_json(response).await;
    assert!(payload["error"]
        .as_str()
        .expect("message")
        .contains("not found"));
}

#[tokio::test]
async fn negative_actual_is_unprocessable() {
    let (service, store, _) = build_service(60, 20);
    service.initialize().await.expect("startup training");
    let served = service.predict(vegetarian_submission()).expect("prediction");
    let id = served.submission_id.expect("logged").0;
    let router = prediction_router(service);

    let response = router
        .oneshot(label_request(id, -5.0))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(store.records()[0].actual_co2, None);
}

#[tokio::test]
async fn predict_handler_rejects_blank_answers() {
    let (service, _, _) = build_service(60, 20);
    service.initialize().await.expect("startup training");

    let mut submission = vegetarian_submission();
    submission.diet = "  ".to_string();
    let response = predict_handler::<MemorySubmissionStore, RawTable, MemoryArtifactStore>(
        State(service.clone()),
        axum::Json(submission),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = body_json(response).await;
    assert!(payload["error"]
        .as_str()
        .expect("message")
        .contains("diet"));
    assert_eq!(service.submission_stats().submissions_since_last_retrain, 0);
}

#[tokio::test]
async fn performance_route_reports_an_empty_registry() {
    let (service, _, _) = build_service(60, 20);
    let router = prediction_router(service);

    let response = router
        .oneshot(
            Request::get("/api/model-performance")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await;
    assert_eq!(payload["models_loaded"], false);
    assert!(payload["best_model"].is_null());
}

#[tokio::test]
async fn performance_route_lists_every_family() {
    let (service, _, _) = build_service(60, 20);
    service.initialize().await.expect("startup training");
    let router = prediction_router(service);

    let response = router
        .oneshot(
            Request::get("/api/model-performance")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");

    let payload = body_json(response).await;
    assert_eq!(payload["models_loaded"], true);
    let performance = payload["performance"].as_object().expect("map");
    for family in ["random_forest", "gradient_boosted_trees", "neural_network"] {
        let metrics = &performance[family];
        assert!(metrics["r2"].is_number());
        assert!(metrics["mae"].is_number());
    }
}

#[tokio::test]
async fn stats_route_counts_down_to_the_next_retrain() {
    let (service, _, _) = build_service(60, 20);
    service.initialize().await.expect("startup training");
    for _ in 0..4 {
        service.predict(vegetarian_submission()).expect("prediction");
    }
    let router = prediction_router(service);

    let response = router
        .oneshot(
            Request::get("/api/submission-stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await;
    assert_eq!(payload["submissions_since_last_retrain"], 4);
    assert_eq!(payload["retrain_threshold"], 20);
    assert_eq!(payload["submissions_until_retrain"], 16);
}

#[tokio::test]
async fn retrain_route_returns_the_cycle_report() {
    let (service, _, _) = build_service(60, 20);
    let router = prediction_router(service);

    let response = router
        .oneshot(Request::post("/api/retrain").body(Body::empty()).unwrap())
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await;
    assert_eq!(payload["status"], "success");
    assert_eq!(payload["trigger"], "manual");
    assert_eq!(payload["models_retrained"].as_array().expect("list").len(), 3);
    assert!(payload["best_model"].is_string());
}

#[tokio::test]
async fn retrain_handler_maps_dataset_errors_to_bad_request() {
    let (service, _, _) = service_with(
        headerless_table(),
        MemoryArtifactStore::default(),
        fast_trainer_config(),
        20,
    );

    let response =
        retrain_handler::<MemorySubmissionStore, RawTable, MemoryArtifactStore>(State(service))
            .await
            .into_response();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = body_json(response).await;
    assert!(payload["error"]
        .as_str()
        .expect("message")
        .contains("missing required column"));
}
