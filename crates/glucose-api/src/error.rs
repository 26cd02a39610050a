//! 통합 API 에러 응답 타입.
//!
//! 모든 엔드포인트에서 일관된 에러 형식을 제공하고,
//! 파이프라인 에러를 HTTP 상태 코드로 변환합니다.

use axum::http::StatusCode;
use axum::Json;
use glucose_ml::MlError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

/// 입력을 고쳐서 해결할 수 있는 요청 에러 코드.
pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
/// 서버 내부 에러 코드.
pub const INTERNAL: &str = "INTERNAL";
/// 워커 풀을 사용할 수 없을 때의 에러 코드.
pub const UNAVAILABLE: &str = "UNAVAILABLE";

/// 통합 API 에러 응답.
///
/// # 예시
///
/// ```json
/// {
///   "code": "INVALID_ARGUMENT",
///   "message": "not enough points",
///   "details": { "required": 24, "actual": 10 },
///   "timestamp": 1738300800
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "INVALID_ARGUMENT", "INTERNAL")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 추가 에러 상세 정보 (선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// 에러 발생 타임스탬프 (Unix timestamp, 선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ApiErrorResponse {
    /// 기본 에러 생성 (타임스탬프 포함).
    ///
    /// # Example
    ///
    /// ```
    /// use glucose_api::error::ApiErrorResponse;
    ///
    /// let error = ApiErrorResponse::new("INVALID_ARGUMENT", "not enough points");
    /// assert_eq!(error.code(), "INVALID_ARGUMENT");
    /// ```
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: Some(chrono::Utc::now().timestamp()),
        }
    }

    /// 상세 정보 포함 에러 생성.
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            details: Some(details),
            ..Self::new(code, message)
        }
    }

    /// 에러 코드 반환.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// 에러 메시지 반환.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiErrorResponse {}

/// API 핸들러 Result 타입 별칭.
pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiErrorResponse>)>;

/// 요청 에러 응답 (400 INVALID_ARGUMENT).
pub fn invalid_argument(message: impl Into<String>) -> (StatusCode, Json<ApiErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiErrorResponse::new(INVALID_ARGUMENT, message)),
    )
}

/// 관측값이 부족할 때의 응답.
pub fn not_enough_points(required: usize, actual: usize) -> (StatusCode, Json<ApiErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiErrorResponse::with_details(
            INVALID_ARGUMENT,
            "not enough points",
            json!({ "required": required, "actual": actual }),
        )),
    )
}

/// 서버 내부 에러 응답 (500 INTERNAL).
pub fn internal(message: impl Into<String>) -> (StatusCode, Json<ApiErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiErrorResponse::new(INTERNAL, message)),
    )
}

/// 파이프라인 에러를 HTTP 응답으로 변환합니다.
///
/// 클라이언트 에러는 400, 그 외(형태 불일치, 추론 실패 등)는 500으로 변환하고 로그를 남깁니다.
pub fn from_ml_error(err: &MlError) -> (StatusCode, Json<ApiErrorResponse>) {
    match err {
        MlError::InsufficientHistory { required, actual } => {
            not_enough_points(*required, *actual)
        }
        e if e.is_client_error() => invalid_argument(e.to_string()),
        e => {
            error!(kind = e.kind(), error = %e, "Forecast pipeline failed");
            internal(e.to_string())
        }
    }
}
