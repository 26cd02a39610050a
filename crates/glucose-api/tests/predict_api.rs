//! 예측 API HTTP 통합 테스트.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use glucose_api::{create_api_router, AppState, HealthResponse, PredictResponse};
use glucose_core::ForecastConfig;
use glucose_ml::{ForecastService, MockPredictor};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app(config: ForecastConfig) -> Router {
    let predictor = MockPredictor::for_config(&config).with_name("integration_model");
    let service = ForecastService::new(config, Box::new(predictor)).unwrap();
    create_api_router().with_state(Arc::new(AppState::new(service, 4)))
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap()
}

fn observations(len: usize) -> Vec<Value> {
    (0..len)
        .map(|i| {
            json!({
                "timestamp": (start() + Duration::minutes(5 * i as i64)).timestamp(),
                "glucose": 5.5 + (i as f64 * 0.25).cos(),
                "insulin": if i % 12 == 0 { 1.5 } else { 0.0 },
            })
        })
        .collect()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn predict_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/predict")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn dense_predict_returns_twelve_labels_five_minutes_apart() {
    let (status, body) = send(
        app(ForecastConfig::dense()),
        predict_request(json!({ "observations": observations(24) })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let response: PredictResponse = serde_json::from_value(body).unwrap();
    assert_eq!(response.model, "integration_model");
    assert_eq!(response.labels.len(), 12);

    let last = start() + Duration::minutes(5 * 23);
    assert_eq!(response.labels[0].time, last + Duration::minutes(5));
    for pair in response.labels.windows(2) {
        assert_eq!(pair[1].time - pair[0].time, Duration::minutes(5));
    }
}

#[tokio::test]
async fn short_window_is_rejected_without_labels() {
    let (status, body) = send(
        app(ForecastConfig::dense()),
        predict_request(json!({ "observations": observations(10) })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");
    assert_eq!(body["message"], "not enough points");
    assert_eq!(body["details"], json!({ "required": 24, "actual": 10 }));
    assert!(body.get("labels").is_none());
}

#[tokio::test]
async fn unordered_timestamps_are_invalid_argument() {
    let mut obs = observations(24);
    obs.swap(3, 4);

    let (status, body) = send(
        app(ForecastConfig::dense()),
        predict_request(json!({ "observations": obs })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn window_ending_near_max_date_is_invalid_argument() {
    let last = DateTime::<Utc>::MAX_UTC.timestamp() - 60;
    let obs: Vec<Value> = (0..24)
        .map(|i| {
            json!({
                "timestamp": last - 300 * (23 - i),
                "glucose": 5.0 + (i % 4) as f64,
            })
        })
        .collect();

    let (status, body) = send(
        app(ForecastConfig::dense()),
        predict_request(json!({ "observations": obs })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");
    assert!(body.get("labels").is_none());
}

#[tokio::test]
async fn recurrent_predict_with_events_returns_seventy_two_labels() {
    let events = json!([
        { "time": (start() + Duration::minutes(37)).to_rfc3339(), "value": 45.0 },
    ]);

    let (status, body) = send(
        app(ForecastConfig::recurrent()),
        predict_request(json!({
            "observations": observations(48),
            "carbs_events": events,
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let response: PredictResponse = serde_json::from_value(body).unwrap();
    assert_eq!(response.labels.len(), 72);
    for pair in response.labels.windows(2) {
        assert!(pair[1].time > pair[0].time);
    }
}

#[tokio::test]
async fn readiness_reports_loaded_model() {
    let request = Request::builder()
        .uri("/health/ready")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(ForecastConfig::recurrent()), request).await;

    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = serde_json::from_value(body).unwrap();
    assert_eq!(health.model.name, "integration_model");
    assert_eq!(health.model.input_shape, vec![1, 48, 3]);
    assert_eq!(health.model.horizon, 72);
    assert_eq!(health.model.mode, "autoregressive");
}
