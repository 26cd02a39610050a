//! 핵심 에러 타입.
//!
//! 설정 로드/검증과 도메인 입력 검증에서 발생하는 에러를 정의합니다.

use thiserror::Error;

/// 핵심 도메인 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 설정 에러 (시작 시점에 치명적)
    #[error("설정 에러: {0}")]
    Config(String),

    /// 설정 파일/환경 변수 로드 에러
    #[error("설정 로드 에러: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    /// 잘못된 입력 (정렬되지 않은 타임스탬프, 유한하지 않은 값 등)
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 짝지어야 하는 두 시퀀스의 길이가 다름 (내부 계약 위반)
    #[error("길이 불일치 ({context}): expected {expected}, got {actual}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// 핵심 작업을 위한 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// 호출자가 입력을 고쳐서 해결할 수 있는 에러인지 확인합니다.
    pub fn is_client_error(&self) -> bool {
        matches!(self, CoreError::InvalidInput(_))
    }

    /// 프로세스 시작을 중단해야 하는 에러인지 확인합니다.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::Config(_) | CoreError::ConfigLoad(_))
    }
}
