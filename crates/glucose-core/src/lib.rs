//! # Glucose Core
//!
//! 혈당 예측 서비스의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 서비스 전반에서 사용되는 기본 타입을 제공합니다:
//! - 관측값(Observation) 및 관측 윈도우
//! - 예측 결과와 타임스탬프 생성
//! - 채널별 정규화 상수
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
