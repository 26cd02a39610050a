//! 모델 입력을 위한 feature engineering.
//!
//! 관측 윈도우를 모델이 기대하는 고정 길이 feature vector로 변환합니다.
//! 두 가지 전략을 지원합니다:
//! - **passthrough**: 최근 `lookback`개 관측값을 정규화해서 그대로 전달
//! - **statistical**: 타깃 채널에서 시간/차분/lag/rolling 통계 feature 추출
//!
//! statistical feature 순서는 모델 계약의 일부이며 바꾸면 안 됩니다:
//!
//! | 순서 | 이름 | 설명 |
//! |------|------|------|
//! | 1 | `tod_sin`, `tod_cos` | 마지막 관측의 하루 중 시각 |
//! | 2 | `dop_sin`, `dop_cos` | 주기(기본 7일) 내 위치 |
//! | 3 | `diff_max_pos`, `diff_max_neg` | 연속 차분의 최대 상승/최대 하락 (없으면 0) |
//! | 4 | `diff_sum_pos`, `diff_sum_neg` | 상승/하락 차분 합 |
//! | 5 | `lag_diff_{n}` | `x[last] - x[last - n]` |
//! | 6 | `rolling_std_{w}` | 최근 `w`개 값의 모표준편차 |
//! | 7 | `raw_{i}` | 최근 `raw_points`개 원시 값, 최신 값부터 |

use chrono::Timelike;
use glucose_core::{
    Channel, FeatureStrategyConfig, ForecastConfig, ObservationWindow, StatisticalFeatureConfig,
};
use std::f64::consts::TAU;

use crate::normalization::{normalize, NormalizationCodec, NormalizationParams};
use crate::{FeatureVector, MlError, MlResult};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// feature 추출 결과.
#[derive(Debug, Clone)]
pub struct ExtractedFeatures {
    /// 모델 입력
    pub vector: FeatureVector,
    /// 정규화된 `[rows, channels]` 윈도우 (passthrough에서만 채워짐)
    pub normalized_rows: Vec<f64>,
    /// 이 요청에 사용된 정규화 파라미터
    pub params: NormalizationParams,
}

/// 관측 윈도우를 모델 입력으로 변환하는 feature 추출기.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    strategy: FeatureStrategyConfig,
    channels: Vec<Channel>,
    lookback: usize,
    min_observations: usize,
    input_shape: Vec<usize>,
    codec: NormalizationCodec,
}

impl FeatureExtractor {
    /// 예측 설정에서 추출기 생성.
    pub fn new(config: &ForecastConfig) -> Self {
        Self {
            strategy: config.features.clone(),
            channels: config.channels.clone(),
            lookback: config.lookback,
            min_observations: config.required_history(),
            input_shape: config.model_input_shape(),
            codec: NormalizationCodec::new(config.normalization.clone()),
        }
    }

    /// 추출에 필요한 최소 관측값 수.
    pub fn min_observations(&self) -> usize {
        self.min_observations
    }

    /// 생성되는 텐서 형태 (배치 차원 포함).
    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    /// 생성되는 feature 개수.
    pub fn feature_count(&self) -> usize {
        self.input_shape.iter().product()
    }

    /// 모델 입력 채널 순서.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// feature 이름을 모델 입력 순서대로 반환.
    pub fn feature_names(&self) -> Vec<String> {
        match &self.strategy {
            FeatureStrategyConfig::Passthrough => (0..self.lookback)
                .flat_map(|row| {
                    self.channels
                        .iter()
                        .map(move |channel| format!("{}_{}", channel, row))
                })
                .collect(),
            FeatureStrategyConfig::Statistical(stats) => statistical_feature_names(stats),
        }
    }

    /// 관측 윈도우에서 feature 추출.
    ///
    /// 윈도우는 오래된 것부터 최신 순으로 정렬되어 있어야 합니다.
    pub fn extract(&self, window: &ObservationWindow) -> MlResult<ExtractedFeatures> {
        if window.len() < self.min_observations {
            return Err(MlError::InsufficientHistory {
                required: self.min_observations,
                actual: window.len(),
            });
        }

        match &self.strategy {
            FeatureStrategyConfig::Passthrough => self.extract_passthrough(window),
            FeatureStrategyConfig::Statistical(stats) => self.extract_statistical(stats, window),
        }
    }

    fn extract_passthrough(&self, window: &ObservationWindow) -> MlResult<ExtractedFeatures> {
        let raw = window.flatten(&self.channels, self.lookback);
        let params = self.codec.params_for(&raw)?;
        let normalized_rows = normalize(&raw, &params)?;

        let vector = FeatureVector::from_f64(&normalized_rows, self.input_shape.clone());
        if vector.len() != self.feature_count() {
            return Err(MlError::ShapeMismatch {
                context: "passthrough features",
                expected: self.feature_count(),
                actual: vector.len(),
            });
        }

        Ok(ExtractedFeatures {
            vector,
            normalized_rows,
            params,
        })
    }

    fn extract_statistical(
        &self,
        stats: &StatisticalFeatureConfig,
        window: &ObservationWindow,
    ) -> MlResult<ExtractedFeatures> {
        let observations = window.tail(self.min_observations);
        let last = observations.last().ok_or(MlError::InsufficientHistory {
            required: self.min_observations,
            actual: 0,
        })?;
        let values: Vec<f64> = observations.iter().map(|o| o.glucose).collect();
        let newest = values.len() - 1;

        let mut features = Vec::with_capacity(stats.feature_count());

        // 1. 하루 중 시각
        let tod = TAU * f64::from(last.time.num_seconds_from_midnight()) / SECONDS_PER_DAY;
        features.push(tod.sin());
        features.push(tod.cos());

        // 2. 주기 내 위치
        let period_secs = i64::from(stats.period_days) * SECONDS_PER_DAY as i64;
        let dop = TAU * last.time.timestamp().rem_euclid(period_secs) as f64 / period_secs as f64;
        features.push(dop.sin());
        features.push(dop.cos());

        // 3-4. 연속 차분 통계
        let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
        let rising = diffs.iter().copied().filter(|d| *d > 0.0);
        let falling = diffs.iter().copied().filter(|d| *d < 0.0);
        features.push(rising.clone().fold(0.0, f64::max));
        features.push(falling.clone().fold(0.0, f64::min));
        features.push(rising.sum());
        features.push(falling.sum());

        // 5. lag 차분
        for lag in &stats.lags {
            features.push(values[newest] - values[newest - lag]);
        }

        // 6. rolling 표준편차
        for w in &stats.rolling_windows {
            features.push(population_std(&values[values.len() - w..]));
        }

        // 7. 최근 원시 값 (최신 값부터)
        features.extend(values.iter().rev().take(stats.raw_points));

        if features.len() != self.feature_count() {
            return Err(MlError::ShapeMismatch {
                context: "statistical features",
                expected: self.feature_count(),
                actual: features.len(),
            });
        }

        let vector = FeatureVector::with_names(
            features.iter().map(|v| *v as f32).collect(),
            statistical_feature_names(stats),
        );

        Ok(ExtractedFeatures {
            vector,
            normalized_rows: Vec::new(),
            params: NormalizationParams::identity(),
        })
    }
}

fn statistical_feature_names(stats: &StatisticalFeatureConfig) -> Vec<String> {
    let mut names: Vec<String> = [
        "tod_sin",
        "tod_cos",
        "dop_sin",
        "dop_cos",
        "diff_max_pos",
        "diff_max_neg",
        "diff_sum_pos",
        "diff_sum_neg",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    names.extend(stats.lags.iter().map(|n| format!("lag_diff_{}", n)));
    names.extend(stats.rolling_windows.iter().map(|w| format!("rolling_std_{}", w)));
    names.extend((0..stats.raw_points).map(|i| format!("raw_{}", i)));
    names
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}
