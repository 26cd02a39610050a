//! API 라우트.
//!
//! # 라우트 구조
//!
//! - `/health` - 헬스 체크 (liveness)
//! - `/health/ready` - 상세 헬스 체크 (readiness)
//! - `/api/v1/predict` - 혈당 예측

pub mod health;
pub mod predict;

pub use health::{health_router, ComponentHealth, ComponentStatus, HealthResponse, ModelInfo};
pub use predict::{
    predict_router, EventDto, Label, ObservationDto, PredictRequest, PredictResponse,
};

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// 전체 API 라우터 생성.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        // 헬스 체크 엔드포인트
        .nest("/health", health_router())
        // API v1 엔드포인트
        .nest("/api/v1", predict_router())
}
