//! 예측 서비스 - 요청 단위로 파이프라인 단계를 실행합니다.
//!
//! ```text
//! Received → Validated → Featurized → Predicted → Formatted → Responded
//!     │                      │
//!     └──────────┬───────────┘
//!                ▼
//!            Rejected
//! ```
//!
//! 모든 실패는 동기적이고 종결적이며, 재시도나 부분 결과는 없습니다.

use glucose_core::{
    forecast_span, forecast_timestamps, ForecastConfig, ForecastResult, Observation,
    ObservationWindow,
};
use std::fmt;
use tracing::{debug, info, warn};

use crate::features::FeatureExtractor;
use crate::normalization::{denormalize, NormalizationParams};
use crate::predictor::{run_model, Predictor};
use crate::rollout::AutoregressiveRoller;
use crate::{MlError, MlResult};

/// 요청 처리 단계.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastStage {
    /// 요청 수신
    Received,
    /// 입력 검증 완료
    Validated,
    /// feature 추출 완료
    Featurized,
    /// 모델 예측 완료
    Predicted,
    /// 역정규화 및 타임스탬프 생성 완료
    Formatted,
    /// 응답 완료
    Responded,
    /// 거부됨 (모델 호출 없음)
    Rejected,
}

impl fmt::Display for ForecastStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ForecastStage::Received => "received",
            ForecastStage::Validated => "validated",
            ForecastStage::Featurized => "featurized",
            ForecastStage::Predicted => "predicted",
            ForecastStage::Formatted => "formatted",
            ForecastStage::Responded => "responded",
            ForecastStage::Rejected => "rejected",
        };
        write!(f, "{}", name)
    }
}

/// 예측 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionMode {
    /// 모델 1회 호출로 전체 horizon 생성
    SingleShot,
    /// 모델을 `calls`번 호출해서 horizon 생성
    Autoregressive {
        /// 호출당 스텝 수
        steps_per_call: usize,
        /// 호출 횟수
        calls: usize,
    },
}

/// 예측 서비스.
///
/// 설정과 모델은 시작 시 한 번 로드되어 읽기 전용으로 공유됩니다.
pub struct ForecastService {
    config: ForecastConfig,
    extractor: FeatureExtractor,
    roller: Option<AutoregressiveRoller>,
    predictor: Box<dyn Predictor>,
    mode: PredictionMode,
}

impl fmt::Debug for ForecastService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForecastService")
            .field("model", &self.predictor.model_name())
            .field("mode", &self.mode)
            .field("input_shape", &self.extractor.input_shape())
            .finish()
    }
}

impl ForecastService {
    /// 새 예측 서비스 생성.
    ///
    /// 설정 불변 조건과 모델 형태 계약을 검증합니다. 불일치는 시작 시점 에러입니다.
    pub fn new(config: ForecastConfig, predictor: Box<dyn Predictor>) -> MlResult<Self> {
        config.validate()?;

        let extractor = FeatureExtractor::new(&config);

        if predictor.input_shape() != extractor.input_shape() {
            return Err(MlError::Config(format!(
                "model '{}' expects input {:?}, pipeline produces {:?}",
                predictor.model_name(),
                predictor.input_shape(),
                extractor.input_shape()
            )));
        }
        if predictor.output_len() != config.steps_per_call {
            return Err(MlError::Config(format!(
                "model '{}' emits {} steps per call, steps_per_call is {}",
                predictor.model_name(),
                predictor.output_len(),
                config.steps_per_call
            )));
        }

        let (mode, roller) = if config.is_autoregressive() {
            (
                PredictionMode::Autoregressive {
                    steps_per_call: config.steps_per_call,
                    calls: config.calls_per_request(),
                },
                Some(AutoregressiveRoller::new(&config)),
            )
        } else {
            (PredictionMode::SingleShot, None)
        };

        info!(
            model = %predictor.model_name(),
            mode = ?mode,
            input_shape = ?extractor.input_shape(),
            horizon = config.horizon,
            "Forecast service ready"
        );

        Ok(Self {
            config,
            extractor,
            roller,
            predictor,
            mode,
        })
    }

    /// 설정 반환.
    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// 예측 방식 반환.
    pub fn mode(&self) -> PredictionMode {
        self.mode
    }

    /// 모델 이름 반환.
    pub fn model_name(&self) -> &str {
        self.predictor.model_name()
    }

    /// 모델 입력 형태 반환.
    pub fn input_shape(&self) -> &[usize] {
        self.extractor.input_shape()
    }

    /// 요청이 가져야 하는 최소 관측값 수.
    pub fn required_history(&self) -> usize {
        self.extractor.min_observations()
    }

    /// 원시 관측값 목록에서 예측합니다.
    ///
    /// 개수를 먼저 확인하고 그 다음 정렬/유한성을 검증합니다.
    pub fn forecast_observations(&self, observations: Vec<Observation>) -> MlResult<ForecastResult> {
        let required = self.required_history();
        if observations.len() < required {
            debug!(stage = %ForecastStage::Rejected, required, actual = observations.len());
            return Err(MlError::InsufficientHistory {
                required,
                actual: observations.len(),
            });
        }

        let window = ObservationWindow::new(observations).map_err(|e| {
            debug!(stage = %ForecastStage::Rejected, error = %e);
            MlError::from(e)
        })?;
        self.forecast(&window)
    }

    /// 검증된 관측 윈도우에서 예측합니다.
    pub fn forecast(&self, window: &ObservationWindow) -> MlResult<ForecastResult> {
        let span = forecast_span!("forecast", self.predictor.model_name(), window.len());
        let _guard = span.enter();

        debug!(stage = %ForecastStage::Received);

        // 1. 검증
        let required = self.required_history();
        let last_observed = match window.last_time() {
            Some(time) if window.len() >= required => time,
            _ => {
                debug!(stage = %ForecastStage::Rejected, required, actual = window.len());
                return Err(MlError::InsufficientHistory {
                    required,
                    actual: window.len(),
                });
            }
        };
        debug!(stage = %ForecastStage::Validated);

        // 2. feature 추출
        let features = self.extractor.extract(window).map_err(|e| {
            debug!(stage = %ForecastStage::Rejected, error = %e);
            e
        })?;
        debug!(stage = %ForecastStage::Featurized, features = features.vector.len());

        // 3. 예측 (정규화된 타깃 값)
        let normalized: Vec<f64> = match &self.roller {
            None => run_model(self.predictor.as_ref(), &features.vector)?
                .into_iter()
                .map(f64::from)
                .collect(),
            Some(roller) => roller.roll(self.predictor.as_ref(), &features)?,
        };
        if normalized.len() != self.config.horizon {
            return Err(MlError::ShapeMismatch {
                context: "forecast horizon",
                expected: self.config.horizon,
                actual: normalized.len(),
            });
        }
        debug!(stage = %ForecastStage::Predicted, steps = normalized.len());

        // 4. 역정규화 (타깃 채널 파라미터)
        let target = NormalizationParams::Global(
            features.params.channel(self.config.channels.len() - 1),
        );
        let values = denormalize(&normalized, &target)?;

        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            warn!(step = pos, "Model produced a non-finite prediction");
            return Err(MlError::Inference(format!(
                "non-finite prediction at step {}",
                pos + 1
            )));
        }

        // 5. 타임스탬프
        let times = forecast_timestamps(
            last_observed,
            self.config.step_interval(),
            self.config.horizon,
            self.config.round_timestamps,
        )
        .map_err(|e| {
            debug!(stage = %ForecastStage::Rejected, error = %e);
            MlError::from(e)
        })?;
        let result =
            ForecastResult::new(self.predictor.model_name(), last_observed, &values, &times)?;
        debug!(stage = %ForecastStage::Formatted, horizon = result.len());

        debug!(stage = %ForecastStage::Responded);
        Ok(result)
    }
}
