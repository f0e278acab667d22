mod common;

use axum::http::StatusCode;

// ----------------------------------------------------------------------------
// GET /health
// ----------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_no_models_on_cold_start() {
    let app = common::build_test_app();
    let response = common::get(app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = common::body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["model_loaded"], false);
    assert_eq!(json["model_loading"], false);
    assert_eq!(json["gpu_available"], false);
    assert_eq!(json["device"], "cpu");
    assert_eq!(json["providers"], serde_json::json!([]));
    assert!(json.get("error").is_none());
}

#[tokio::test]
async fn health_lists_loaded_providers() {
    let app = common::build_test_app_with(common::restoration_snapshot(None));
    let json = common::body_json(common::get(app, "/health").await).await;

    assert_eq!(json["model_loaded"], true);
    assert_eq!(json["providers"], serde_json::json!(["realesrgan"]));
}

#[tokio::test]
async fn responses_carry_a_uuid_request_id() {
    let app = common::build_test_app();
    let response = common::get(app, "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("x-request-id header should be set")
        .to_str()
        .unwrap();
    assert!(uuid::Uuid::parse_str(request_id).is_ok());
}

// ----------------------------------------------------------------------------
// GET /
// ----------------------------------------------------------------------------

#[tokio::test]
async fn root_describes_the_service() {
    let app = common::build_test_app();
    let response = common::get(app, "/").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = common::body_json(response).await;
    assert_eq!(json["service"], "upscaler-api");
    assert_eq!(json["model_loaded"], false);
    let endpoints = json["endpoints"].as_array().unwrap();
    assert!(endpoints.iter().any(|e| e == "POST /upscale/stream"));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = common::build_test_app();
    let response = common::get(app, "/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ----------------------------------------------------------------------------
// POST /load-model
// ----------------------------------------------------------------------------

#[tokio::test]
async fn load_model_starts_background_loading() {
    let app = common::build_test_app();
    let response = common::post_empty(app, "/load-model").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = common::body_json(response).await;
    assert_eq!(json["status"], "started");
    assert!(json["message"].as_str().is_some_and(|m| !m.is_empty()));
}

#[tokio::test]
async fn load_model_is_a_no_op_when_loaded() {
    let app = common::build_test_app_with(common::restoration_snapshot(None));
    let json = common::body_json(common::post_empty(app, "/load-model").await).await;
    assert_eq!(json["status"], "already_loaded");
}
