//! 자기회귀 다단계 예측.
//!
//! 모델 1회 호출이 `h`스텝만 예측할 때 `H = k * h`스텝을 얻기 위해
//! 예측을 버퍼에 덧붙이며 `k`번 호출합니다.
//!
//! ```text
//! buffer:  [ window_len 행 | h | h | ... | h ]
//! call i:       └── rows [i*h, i*h + window_len) ──┘
//! ```
//!
//! 예측하지 않는 외생 채널(인슐린, 탄수화물)은 `ExogenousPolicy`로 채웁니다.

use glucose_core::{ExogenousPolicy, ForecastConfig};
use tracing::debug;

use crate::features::ExtractedFeatures;
use crate::normalization::NormalizationParams;
use crate::predictor::{run_model, Predictor};
use crate::{FeatureVector, MlError, MlResult};

/// 덧붙이기만 가능한 `[rows, channels]` 정규화 버퍼.
///
/// 타깃 채널은 항상 마지막 열입니다.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutBuffer {
    values: Vec<f64>,
    channels: usize,
}

impl RolloutBuffer {
    /// 정규화된 초기 윈도우로 버퍼 생성.
    pub fn new(initial: Vec<f64>, channels: usize) -> MlResult<Self> {
        if channels == 0 || initial.is_empty() || initial.len() % channels != 0 {
            return Err(MlError::ShapeMismatch {
                context: "rollout buffer",
                expected: channels.max(1) * (initial.len() / channels.max(1)).max(1),
                actual: initial.len(),
            });
        }
        Ok(Self {
            values: initial,
            channels,
        })
    }

    /// 행 수.
    pub fn len(&self) -> usize {
        self.values.len() / self.channels
    }

    /// 비어 있는지 확인.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 채널 수.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// `[start, start + rows)` 행을 평탄화된 슬라이스로 반환.
    pub fn rows(&self, start: usize, rows: usize) -> MlResult<&[f64]> {
        let begin = start * self.channels;
        let end = (start + rows) * self.channels;
        self.values.get(begin..end).ok_or(MlError::ShapeMismatch {
            context: "rollout window",
            expected: start + rows,
            actual: self.len(),
        })
    }

    /// 행들을 덧붙입니다.
    pub fn append(&mut self, rows: &[f64]) -> MlResult<()> {
        if rows.len() % self.channels != 0 {
            return Err(MlError::ShapeMismatch {
                context: "rollout append",
                expected: rows.len() - rows.len() % self.channels,
                actual: rows.len(),
            });
        }
        self.values.extend_from_slice(rows);
        Ok(())
    }

    /// 마지막 `n`행의 타깃 채널 값을 시간순으로 반환.
    pub fn target_tail(&self, n: usize) -> Vec<f64> {
        let start = self.len().saturating_sub(n);
        self.values[start * self.channels..]
            .chunks_exact(self.channels)
            .map(|row| row[self.channels - 1])
            .collect()
    }
}

/// 모델을 반복 호출해서 긴 horizon을 생성하는 롤러.
#[derive(Debug, Clone)]
pub struct AutoregressiveRoller {
    window_len: usize,
    steps_per_call: usize,
    calls: usize,
    channels: usize,
    input_shape: Vec<usize>,
    exogenous: ExogenousPolicy,
}

impl AutoregressiveRoller {
    /// 예측 설정에서 롤러 생성.
    pub fn new(config: &ForecastConfig) -> Self {
        Self {
            window_len: config.lookback,
            steps_per_call: config.steps_per_call,
            calls: config.calls_per_request(),
            channels: config.channels.len(),
            input_shape: config.model_input_shape(),
            exogenous: config.exogenous,
        }
    }

    /// 생성하는 전체 스텝 수 (H).
    pub fn horizon(&self) -> usize {
        self.steps_per_call * self.calls
    }

    /// 새 행의 외생 채널에 넣을 정규화 값 (타깃 채널 제외, 채널 순서).
    pub fn exogenous_fill(&self, params: &NormalizationParams) -> Vec<f64> {
        (0..self.channels.saturating_sub(1))
            .map(|idx| {
                let scale = params.channel(idx);
                match self.exogenous {
                    ExogenousPolicy::Neutral => scale.neutral(),
                    ExogenousPolicy::Fixed { value } => scale.normalize(value),
                }
            })
            .collect()
    }

    /// 롤아웃을 수행하고 최종 버퍼를 반환합니다.
    ///
    /// 최종 버퍼 길이는 항상 `window_len + H`입니다.
    pub fn roll_buffer(
        &self,
        predictor: &dyn Predictor,
        features: &ExtractedFeatures,
    ) -> MlResult<RolloutBuffer> {
        let mut buffer = RolloutBuffer::new(features.normalized_rows.clone(), self.channels)?;
        if buffer.len() != self.window_len {
            return Err(MlError::ShapeMismatch {
                context: "rollout initial window",
                expected: self.window_len,
                actual: buffer.len(),
            });
        }

        let fill = self.exogenous_fill(&features.params);
        let mut rows = Vec::with_capacity(self.steps_per_call * self.channels);

        for call in 0..self.calls {
            let window = buffer.rows(call * self.steps_per_call, self.window_len)?;
            let input = FeatureVector::from_f64(window, self.input_shape.clone());
            let predictions = run_model(predictor, &input)?;

            rows.clear();
            for prediction in &predictions {
                rows.extend_from_slice(&fill);
                rows.push(f64::from(*prediction));
            }
            buffer.append(&rows)?;

            debug!(call, buffered = buffer.len(), "Rollout step");
        }

        Ok(buffer)
    }

    /// 롤아웃을 수행하고 정규화된 타깃 예측 `H`개를 시간순으로 반환합니다.
    pub fn roll(
        &self,
        predictor: &dyn Predictor,
        features: &ExtractedFeatures,
    ) -> MlResult<Vec<f64>> {
        let buffer = self.roll_buffer(predictor, features)?;
        Ok(buffer.target_tail(self.horizon()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::{MockBehavior, MockPredictor};
    use glucose_core::ChannelScale;

    fn extracted(rows: usize, channels: usize, params: NormalizationParams) -> ExtractedFeatures {
        let normalized_rows: Vec<f64> = (0..rows * channels).map(|i| i as f64 * 0.01).collect();
        ExtractedFeatures {
            vector: FeatureVector::from_f64(&normalized_rows, vec![1, rows, channels]),
            normalized_rows,
            params,
        }
    }

    #[test]
    fn test_buffer_rows_and_tail() {
        let mut buffer = RolloutBuffer::new(vec![1.0, 10.0, 2.0, 20.0], 2).unwrap();
        buffer.append(&[3.0, 30.0]).unwrap();

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.rows(1, 2).unwrap(), &[2.0, 20.0, 3.0, 30.0]);
        assert_eq!(buffer.target_tail(2), vec![20.0, 30.0]);
        assert!(buffer.rows(2, 2).is_err());
        assert!(buffer.append(&[4.0]).is_err());
    }

    #[test]
    fn test_recurrent_rollout_lengths() {
        let config = ForecastConfig::recurrent();
        let params = NormalizationParams::PerChannel(config.normalization.fixed.clone());
        let features = extracted(48, 3, params);
        let roller = AutoregressiveRoller::new(&config);
        let predictor = MockPredictor::for_config(&config).with_behavior(MockBehavior::Ramp(1.0));

        let buffer = roller.roll_buffer(&predictor, &features).unwrap();
        assert_eq!(buffer.len(), 120);
        assert_eq!(predictor.call_count(), 12);

        let forecast = roller.roll(&predictor, &features).unwrap();
        assert_eq!(forecast.len(), 72);
        // ramp는 매 호출의 마지막 예측에서 이어지므로 1씩 증가하는 연속 수열
        let first = forecast[0];
        for (i, value) in forecast.iter().enumerate() {
            assert!((value - (first + i as f64)).abs() < 1e-3);
        }
    }

    #[test]
    fn test_neutral_exogenous_denormalizes_to_zero() {
        let config = ForecastConfig::recurrent();
        let scales = config.normalization.fixed.clone();
        let params = NormalizationParams::PerChannel(scales.clone());
        let roller = AutoregressiveRoller::new(&config);

        let fill = roller.exogenous_fill(&params);
        assert_eq!(fill.len(), 2);
        for (value, scale) in fill.iter().zip(&scales) {
            assert_eq!(*value, -scale.mean / scale.std);
            assert!(scale.denormalize(*value).abs() < 1e-12);
        }

        let features = extracted(48, 3, params);
        let predictor = MockPredictor::for_config(&config);
        let buffer = roller.roll_buffer(&predictor, &features).unwrap();
        let appended = buffer.rows(48, 72).unwrap();
        for row in appended.chunks_exact(3) {
            assert_eq!(row[0], fill[0]);
            assert_eq!(row[1], fill[1]);
        }
    }

    #[test]
    fn test_fixed_exogenous_value() {
        let config = ForecastConfig {
            exogenous: ExogenousPolicy::Fixed { value: 2.0 },
            ..ForecastConfig::recurrent()
        };
        let params = NormalizationParams::PerChannel(vec![
            ChannelScale::new(1.0, 2.0),
            ChannelScale::new(0.0, 4.0),
            ChannelScale::new(7.0, 2.0),
        ]);

        let fill = AutoregressiveRoller::new(&config).exogenous_fill(&params);
        assert_eq!(fill, vec![0.5, 0.5]);
    }

    #[test]
    fn test_initial_window_length_checked() {
        let config = ForecastConfig::recurrent();
        let features = extracted(40, 3, NormalizationParams::identity());
        let predictor = MockPredictor::for_config(&config);

        let result = AutoregressiveRoller::new(&config).roll(&predictor, &features);
        assert!(matches!(result, Err(MlError::ShapeMismatch { .. })));
        assert_eq!(predictor.call_count(), 0);
    }
}
