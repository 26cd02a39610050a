//! # Glucose ML
//!
//! 혈당 예측 파이프라인을 제공합니다:
//!
//! - **정규화**: 요청별 평균/표준편차 또는 채널별 고정 상수 기반 스케일링
//! - **Feature 추출**: passthrough 정규화 또는 통계 feature engineering
//! - **예측기**: ONNX Runtime 모델 또는 결정적 mock 모델
//! - **자기회귀 롤아웃**: 1회 호출보다 긴 horizon을 위한 반복 예측
//! - **예측 서비스**: 요청 단위 단계 오케스트레이션
//!
//! # 아키텍처
//!
//! ```text
//! ObservationWindow
//!        │
//!        ▼
//! ┌──────────────────┐
//! │ FeatureExtractor │ ← 정규화 파라미터 결정
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐     ┌──────────────────────┐
//! │    Predictor     │ ◄── │ AutoregressiveRoller │ (H > h)
//! │  (ONNX / Mock)   │     └──────────────────────┘
//! └────────┬─────────┘
//!          │
//!          ▼
//!   denormalize + timestamp
//!          │
//!          ▼
//!    ForecastResult
//! ```
//!
//! # 예제
//!
//! ```ignore
//! use glucose_core::ForecastConfig;
//! use glucose_ml::{ForecastService, MockPredictor};
//!
//! let config = ForecastConfig::dense();
//! let predictor = MockPredictor::for_config(&config);
//! let service = ForecastService::new(config, Box::new(predictor))?;
//!
//! let result = service.forecast(&window)?;
//! for step in &result.steps {
//!     println!("{} -> {:.1}", step.time, step.value);
//! }
//! ```

pub mod error;
pub mod features;
pub mod normalization;
pub mod predictor;
pub mod rollout;
pub mod service;
pub mod types;

// 자주 사용되는 타입 재내보내기
pub use error::{MlError, MlResult};
pub use features::{ExtractedFeatures, FeatureExtractor};
pub use normalization::{denormalize, normalize, NormalizationCodec, NormalizationParams};
#[cfg(feature = "ml")]
pub use predictor::OnnxPredictor;
pub use predictor::{load_predictor, MockBehavior, MockPredictor, Predictor};
pub use rollout::{AutoregressiveRoller, RolloutBuffer};
pub use service::{ForecastService, ForecastStage, PredictionMode};
pub use types::FeatureVector;
