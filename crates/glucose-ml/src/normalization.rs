//! 평균/표준편차 기반 정규화와 역정규화.
//!
//! 값은 `[rows, channels]` row-major로 평탄화되어 있다고 가정합니다.
//! 파라미터는 두 가지 출처를 가집니다:
//! - 요청별: 평탄화된 원시 윈도우 전체의 평균과 모표준편차 (ddof = 0)
//! - 고정: 시작 시 설정에서 로드한 채널별 상수

use glucose_core::{ChannelScale, DegeneratePolicy, NormalizationConfig, NormalizationMode};
use tracing::warn;

use crate::{MlError, MlResult};

/// 정규화 파라미터.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizationParams {
    /// 모든 채널에 하나의 `(mean, std)` 적용
    Global(ChannelScale),
    /// 채널별 `(mean, std)`, 채널 순서와 동일
    PerChannel(Vec<ChannelScale>),
}

impl NormalizationParams {
    /// 값을 바꾸지 않는 항등 파라미터.
    pub fn identity() -> Self {
        Self::Global(ChannelScale::identity())
    }

    /// 평탄화된 값 전체의 평균과 모표준편차로 파라미터를 계산합니다.
    ///
    /// 표준편차가 0이거나 유한하지 않으면 `DegenerateInput`을 반환합니다.
    pub fn from_values(values: &[f64]) -> MlResult<Self> {
        let scale = window_stats(values)?;
        if scale.is_degenerate() {
            return Err(MlError::DegenerateInput(format!(
                "window has zero or non-finite std (mean {:.3}, std {})",
                scale.mean, scale.std
            )));
        }
        Ok(Self::Global(scale))
    }

    /// 채널 인덱스에 적용되는 스케일.
    pub fn channel(&self, index: usize) -> ChannelScale {
        match self {
            Self::Global(scale) => *scale,
            Self::PerChannel(scales) => scales.get(index).copied().unwrap_or_default(),
        }
    }

    /// 채널별 파라미터일 때 채널 수.
    fn channel_count(&self) -> Option<usize> {
        match self {
            Self::Global(_) => None,
            Self::PerChannel(scales) => Some(scales.len()),
        }
    }

    fn validate(&self, values: &[f64]) -> MlResult<usize> {
        match self.channel_count() {
            None => {
                if self.channel(0).is_degenerate() {
                    return Err(MlError::DegenerateInput(
                        "normalization std is zero or non-finite".to_string(),
                    ));
                }
                Ok(1)
            }
            Some(0) => Err(MlError::Config(
                "per-channel normalization without channels".to_string(),
            )),
            Some(n) => {
                if values.len() % n != 0 {
                    return Err(MlError::ShapeMismatch {
                        context: "normalization rows",
                        expected: values.len() - values.len() % n,
                        actual: values.len(),
                    });
                }
                if let Some(pos) = (0..n).position(|i| self.channel(i).is_degenerate()) {
                    return Err(MlError::DegenerateInput(format!(
                        "channel {} std is zero or non-finite",
                        pos
                    )));
                }
                Ok(n)
            }
        }
    }
}

/// `(v - mean) / std`를 원소별(채널별)로 적용합니다.
pub fn normalize(values: &[f64], params: &NormalizationParams) -> MlResult<Vec<f64>> {
    let channels = params.validate(values)?;
    Ok(values
        .iter()
        .enumerate()
        .map(|(i, v)| params.channel(i % channels).normalize(*v))
        .collect())
}

/// `normalize`의 역연산 `v * std + mean`.
pub fn denormalize(values: &[f64], params: &NormalizationParams) -> MlResult<Vec<f64>> {
    let channels = params.validate(values)?;
    Ok(values
        .iter()
        .enumerate()
        .map(|(i, v)| params.channel(i % channels).denormalize(*v))
        .collect())
}

/// 평균과 모표준편차 (numpy 기본값 ddof = 0과 동일).
fn window_stats(values: &[f64]) -> MlResult<ChannelScale> {
    if values.is_empty() {
        return Err(MlError::InvalidInput(
            "cannot compute statistics of an empty window".to_string(),
        ));
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    Ok(ChannelScale::new(mean, variance.sqrt()))
}

/// 설정에 따라 요청별 정규화 파라미터를 결정하는 codec.
#[derive(Debug, Clone)]
pub struct NormalizationCodec {
    config: NormalizationConfig,
}

impl NormalizationCodec {
    /// 새 codec 생성.
    pub fn new(config: NormalizationConfig) -> Self {
        Self { config }
    }

    /// 설정 반환.
    pub fn config(&self) -> &NormalizationConfig {
        &self.config
    }

    /// 평탄화된 원시 윈도우에 적용할 파라미터를 결정합니다.
    ///
    /// 분산이 0인 윈도우는 `DegeneratePolicy`에 따라 거부하거나 대체 상수를 사용합니다.
    pub fn params_for(&self, raw: &[f64]) -> MlResult<NormalizationParams> {
        match self.config.mode {
            NormalizationMode::Fixed => {
                Ok(NormalizationParams::PerChannel(self.config.fixed.clone()))
            }
            NormalizationMode::PerRequest => match NormalizationParams::from_values(raw) {
                Err(MlError::DegenerateInput(msg)) => match self.config.degenerate {
                    DegeneratePolicy::Reject => Err(MlError::DegenerateInput(msg)),
                    DegeneratePolicy::Fallback { mean, std } => {
                        warn!(
                            reason = %msg,
                            fallback_mean = mean,
                            fallback_std = std,
                            "Degenerate window, using fallback normalization"
                        );
                        Ok(NormalizationParams::Global(ChannelScale::new(mean, std)))
                    }
                },
                other => other,
            },
        }
    }
}
