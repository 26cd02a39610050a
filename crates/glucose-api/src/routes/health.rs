//! 헬스 체크 endpoint.
//!
//! 로드밸런서나 오케스트레이션 시스템(Kubernetes 등)에서 사용됩니다.

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router,
};
use glucose_ml::PredictionMode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

/// 헬스 체크 응답 구조체.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 전체 서비스 상태 ("healthy" | "degraded")
    pub status: String,

    /// API 버전
    pub version: String,

    /// 서버 업타임(초)
    pub uptime_secs: i64,

    /// 현재 시간 (ISO 8601)
    pub timestamp: String,

    /// 로드된 모델 정보
    pub model: ModelInfo,

    /// 개별 컴포넌트 상태
    pub components: ComponentHealth,
}

/// 로드된 모델 정보.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    /// 모델 이름
    pub name: String,
    /// 입력 텐서 형태
    pub input_shape: Vec<usize>,
    /// 요청당 예측 스텝 수
    pub horizon: usize,
    /// 요청이 가져야 하는 최소 관측값 수
    pub required_history: usize,
    /// "single_shot" | "autoregressive"
    pub mode: String,
}

/// 개별 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// 모델 상태
    pub model: ComponentStatus,

    /// 워커 풀 상태
    pub workers: ComponentStatus,
}

/// 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// 상태 ("up" | "busy")
    pub status: String,

    /// 추가 정보 (선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    /// 정상 상태.
    pub fn up() -> Self {
        Self {
            status: "up".to_string(),
            message: None,
        }
    }

    /// 모든 워커가 사용 중인 상태.
    pub fn busy(message: impl Into<String>) -> Self {
        Self {
            status: "busy".to_string(),
            message: Some(message.into()),
        }
    }

    /// 정보 포함 정상 상태.
    pub fn up_with_info(message: impl Into<String>) -> Self {
        Self {
            status: "up".to_string(),
            message: Some(message.into()),
        }
    }
}

/// 간단한 헬스 체크 (liveness probe용).
///
/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// 상세 헬스 체크 (readiness probe용).
///
/// 모델은 시작 시점에 로드되므로 서버가 응답한다면 항상 준비된 상태입니다.
/// 워커가 모두 사용 중이면 "degraded"로 보고하지만 200을 유지합니다.
///
/// GET /health/ready
pub async fn health_ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let service = &state.service;
    let available = state.available_workers();

    let (overall_status, workers_status) = if available == 0 {
        ("degraded", ComponentStatus::busy(format!("0/{} workers idle", state.worker_count)))
    } else {
        (
            "healthy",
            ComponentStatus::up_with_info(format!(
                "{}/{} workers idle",
                available, state.worker_count
            )),
        )
    };

    let mode = match service.mode() {
        PredictionMode::SingleShot => "single_shot",
        PredictionMode::Autoregressive { .. } => "autoregressive",
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        model: ModelInfo {
            name: service.model_name().to_string(),
            input_shape: service.input_shape().to_vec(),
            horizon: service.config().horizon,
            required_history: service.required_history(),
            mode: mode.to_string(),
        },
        components: ComponentHealth {
            model: ComponentStatus::up(),
            workers: workers_status,
        },
    };

    (StatusCode::OK, Json(response))
}

/// 헬스 체크 라우터 생성.
pub fn health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(health_ready))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_check_returns_ok() {
        let app = Router::new().route("/health", get(health_check));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready_reports_model() {
        use crate::state::create_test_state;

        let state = Arc::new(create_test_state());
        let app = Router::new()
            .route("/health/ready", get(health_ready))
            .with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health/ready")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();

        assert_eq!(health.status, "healthy");
        assert_eq!(health.model.name, "test_model");
        assert_eq!(health.model.input_shape, vec![1, 24]);
        assert_eq!(health.model.horizon, 12);
        assert_eq!(health.model.mode, "single_shot");
        assert!(!health.version.is_empty());
    }

    #[test]
    fn test_component_status_variants() {
        let up = ComponentStatus::up();
        assert_eq!(up.status, "up");
        assert!(up.message.is_none());

        let busy = ComponentStatus::busy("0/2 workers idle");
        assert_eq!(busy.status, "busy");
        assert_eq!(busy.message, Some("0/2 workers idle".to_string()));
    }
}
