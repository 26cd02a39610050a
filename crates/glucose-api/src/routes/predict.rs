//! 혈당 예측 endpoint.
//!
//! # 엔드포인트
//!
//! - `POST /api/v1/predict` - 관측값 윈도우로 다음 구간 혈당 예측
//!
//! 파이프라인은 CPU 작업이므로 워커 퍼밋을 얻은 뒤 blocking 스레드에서 실행합니다.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use glucose_core::{Channel, ForecastResult, Observation, ObservationWindow, TimedValue};
use glucose_ml::MlError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::{
    from_ml_error, internal, invalid_argument, not_enough_points, ApiErrorResponse, ApiResult,
    UNAVAILABLE,
};
use crate::metrics::record_forecast;
use crate::state::AppState;

// ==================== 요청/응답 타입 ====================

/// 단일 관측값.
///
/// 시간은 RFC3339 `time` 또는 epoch 초 `timestamp` 중 하나로 전달합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    pub glucose: f64,
    #[serde(default)]
    pub insulin: f64,
    #[serde(default)]
    pub carbs: f64,
}

/// 희소 이벤트 (인슐린 투여, 탄수화물 섭취).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    pub value: f64,
}

/// 예측 요청.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictRequest {
    pub observations: Vec<ObservationDto>,
    #[serde(default)]
    pub insulin_events: Vec<EventDto>,
    #[serde(default)]
    pub carbs_events: Vec<EventDto>,
}

/// 예측 스텝 하나.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub value: f64,
    pub time: DateTime<Utc>,
}

/// 예측 응답.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub labels: Vec<Label>,
    pub model: String,
}

impl From<ForecastResult> for PredictResponse {
    fn from(result: ForecastResult) -> Self {
        Self {
            labels: result
                .steps
                .into_iter()
                .map(|step| Label {
                    value: step.value,
                    time: step.time,
                })
                .collect(),
            model: result.model,
        }
    }
}

// ==================== 변환 ====================

fn resolve_time(
    time: Option<DateTime<Utc>>,
    timestamp: Option<i64>,
    what: &str,
    index: usize,
) -> Result<DateTime<Utc>, String> {
    match (time, timestamp) {
        (Some(time), _) => Ok(time),
        (None, Some(secs)) => DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| format!("{what}[{index}]: timestamp {secs} out of range")),
        (None, None) => Err(format!("{what}[{index}]: missing time")),
    }
}

fn to_observations(dtos: &[ObservationDto]) -> Result<Vec<Observation>, String> {
    dtos.iter()
        .enumerate()
        .map(|(i, dto)| {
            let time = resolve_time(dto.time, dto.timestamp, "observations", i)?;
            Ok(Observation::glucose(time, dto.glucose).with_exogenous(dto.insulin, dto.carbs))
        })
        .collect()
}

fn to_events(dtos: &[EventDto], what: &str) -> Result<Vec<TimedValue>, String> {
    dtos.iter()
        .enumerate()
        .map(|(i, dto)| Ok(TimedValue::new(resolve_time(dto.time, dto.timestamp, what, i)?, dto.value)))
        .collect()
}

fn run_pipeline(
    state: &AppState,
    observations: Vec<Observation>,
    insulin: Vec<TimedValue>,
    carbs: Vec<TimedValue>,
) -> Result<ForecastResult, MlError> {
    let mut window = ObservationWindow::new(observations)?;
    if !insulin.is_empty() {
        window = window.with_events(Channel::Insulin, &insulin)?;
    }
    if !carbs.is_empty() {
        window = window.with_events(Channel::Carbs, &carbs)?;
    }
    state.service.forecast(&window)
}

// ==================== 핸들러 ====================

/// 혈당 예측.
///
/// POST /api/v1/predict
pub async fn predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> ApiResult<Json<PredictResponse>> {
    let started = Instant::now();

    // 잘못된 본문도 같은 에러 형식으로 응답
    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            debug!(status = %rejection.status(), "Rejecting malformed request body");
            record_forecast("invalid_argument", started.elapsed().as_secs_f64());
            return Err(invalid_argument(rejection.body_text()));
        }
    };

    // 관측값 수는 다른 검증보다 먼저 확인
    let required = state.service.required_history();
    let actual = request.observations.len();
    if actual < required {
        debug!(required, actual, "Rejecting short observation window");
        record_forecast("invalid_argument", started.elapsed().as_secs_f64());
        return Err(not_enough_points(required, actual));
    }

    let converted = to_observations(&request.observations).and_then(|observations| {
        let insulin = to_events(&request.insulin_events, "insulin_events")?;
        let carbs = to_events(&request.carbs_events, "carbs_events")?;
        Ok((observations, insulin, carbs))
    });
    let (observations, insulin, carbs) = match converted {
        Ok(parts) => parts,
        Err(message) => {
            record_forecast("invalid_argument", started.elapsed().as_secs_f64());
            return Err(invalid_argument(message));
        }
    };

    let permit = match Arc::clone(&state.workers).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            warn!("Worker pool closed");
            record_forecast("internal", started.elapsed().as_secs_f64());
            return Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiErrorResponse::new(UNAVAILABLE, "worker pool closed")),
            ));
        }
    };

    let worker_state = Arc::clone(&state);
    let joined = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        run_pipeline(&worker_state, observations, insulin, carbs)
    })
    .await;

    let elapsed = started.elapsed().as_secs_f64();
    match joined {
        Ok(Ok(result)) => {
            record_forecast("ok", elapsed);
            debug!(steps = result.len(), elapsed, "Forecast completed");
            Ok(Json(PredictResponse::from(result)))
        }
        Ok(Err(e)) => {
            let outcome = if e.is_client_error() {
                "invalid_argument"
            } else {
                "internal"
            };
            record_forecast(outcome, elapsed);
            Err(from_ml_error(&e))
        }
        Err(join_error) => {
            warn!(error = %join_error, "Forecast worker panicked");
            record_forecast("internal", elapsed);
            Err(internal("forecast worker failed"))
        }
    }
}

/// 예측 라우터 생성.
pub fn predict_router() -> Router<Arc<AppState>> {
    Router::new().route("/predict", post(predict))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::INVALID_ARGUMENT;
    use crate::state::create_test_state;
    use axum::{body::Body, http::Request};
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .nest("/api/v1", predict_router())
            .with_state(Arc::new(create_test_state()))
    }

    fn observations(len: usize) -> Vec<serde_json::Value> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap();
        (0..len)
            .map(|i| {
                json!({
                    "time": (start + Duration::minutes(5 * i as i64)).to_rfc3339(),
                    "glucose": 6.0 + (i as f64 * 0.3).sin(),
                })
            })
            .collect()
    }

    async fn post_json(body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/predict")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_predict_returns_horizon_labels() {
        let (status, body) = post_json(json!({ "observations": observations(24) })).await;

        assert_eq!(status, StatusCode::OK);
        let response: PredictResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.labels.len(), 12);
        assert_eq!(response.model, "test_model");
    }

    #[tokio::test]
    async fn test_predict_short_window_is_invalid_argument() {
        let (status, body) = post_json(json!({ "observations": observations(10) })).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], INVALID_ARGUMENT);
        assert_eq!(body["message"], "not enough points");
        assert!(body.get("labels").is_none());
    }

    #[tokio::test]
    async fn test_predict_missing_time_is_invalid_argument() {
        let mut obs = observations(24);
        obs[5] = json!({ "glucose": 6.0 });

        let (status, body) = post_json(json!({ "observations": obs })).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], INVALID_ARGUMENT);
        assert!(body["message"].as_str().unwrap().contains("observations[5]"));
    }

    #[tokio::test]
    async fn test_malformed_body_uses_error_shape() {
        let mut obs = observations(24);
        obs[0] = json!({ "time": "2024-03-01T07:00:00Z" });

        let (status, body) = post_json(json!({ "observations": obs })).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], INVALID_ARGUMENT);
        assert!(body["message"].as_str().unwrap().contains("glucose"));
    }

    #[tokio::test]
    async fn test_non_json_body_uses_error_shape() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/predict")
                    .header("content-type", "text/plain")
                    .body(Body::from("glucose=6.2"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], INVALID_ARGUMENT);
    }

    #[test]
    fn test_resolve_time_prefers_rfc3339() {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap();

        assert_eq!(resolve_time(Some(time), Some(0), "observations", 0), Ok(time));
        assert_eq!(
            resolve_time(None, Some(time.timestamp()), "observations", 0),
            Ok(time)
        );
        assert!(resolve_time(None, None, "observations", 0).is_err());
    }
}
