//! ML 모듈 에러 타입.

use glucose_core::CoreError;
use thiserror::Error;

/// 예측 파이프라인에서 발생할 수 있는 에러.
#[derive(Debug, Error)]
pub enum MlError {
    /// 모델이 요구하는 것보다 관측값이 적음
    #[error("Insufficient history: need {required} observations, got {actual}")]
    InsufficientHistory { required: usize, actual: usize },

    /// 표준편차가 0인(또는 유한하지 않은) 윈도우
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    /// 유효하지 않은 입력 데이터 (정렬되지 않은 타임스탬프, NaN 등)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 모델 아티팩트를 로드할 수 없음
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// 텐서 형태 계약 위반
    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// 모델 추론 중 에러
    #[error("Inference error: {0}")]
    Inference(String),

    /// ONNX Runtime 에러
    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(String),

    /// 잘못된 파이프라인 설정
    #[error("Configuration error: {0}")]
    Config(String),
}

/// ML 작업을 위한 Result 타입.
pub type MlResult<T> = Result<T, MlError>;

impl MlError {
    /// 호출자가 입력을 고쳐서 해결할 수 있는 에러인지 확인 (INVALID_ARGUMENT).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MlError::InsufficientHistory { .. }
                | MlError::DegenerateInput(_)
                | MlError::InvalidInput(_)
        )
    }

    /// 프로세스 시작을 중단해야 하는 에러인지 확인.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MlError::ModelUnavailable(_) | MlError::Config(_))
    }

    /// 메트릭/로그에 사용할 짧은 분류 이름.
    pub fn kind(&self) -> &'static str {
        match self {
            MlError::InsufficientHistory { .. } => "insufficient_history",
            MlError::DegenerateInput(_) => "degenerate_input",
            MlError::InvalidInput(_) => "invalid_input",
            MlError::ModelUnavailable(_) => "model_unavailable",
            MlError::ShapeMismatch { .. } => "shape_mismatch",
            MlError::Inference(_) => "inference",
            MlError::OnnxRuntime(_) => "onnx_runtime",
            MlError::Config(_) => "config",
        }
    }
}

impl From<CoreError> for MlError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidInput(msg) => MlError::InvalidInput(msg),
            CoreError::LengthMismatch {
                context,
                expected,
                actual,
            } => MlError::ShapeMismatch {
                context,
                expected,
                actual,
            },
            other => MlError::Config(other.to_string()),
        }
    }
}

// ONNX Runtime 에러로부터 변환
#[cfg(feature = "ml")]
impl From<ort::Error> for MlError {
    fn from(err: ort::Error) -> Self {
        MlError::OnnxRuntime(err.to_string())
    }
}
