//! 예측 결과 타입.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

/// 예측 한 스텝.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionStep {
    /// 마지막 관측 이후 스텝 번호 (1부터 시작)
    pub step: usize,
    /// 마지막 관측 시각으로부터의 오프셋 (초)
    pub offset_secs: i64,
    /// 예측 시각
    pub time: DateTime<Utc>,
    /// 예측 값 (원시 단위)
    pub value: f64,
}

/// 요청 하나에 대한 예측 결과.
///
/// 길이는 항상 설정된 horizon과 같고, 요청마다 새로 생성됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    /// 예측을 생성한 모델 이름
    pub model: String,
    /// 시간순 예측 스텝
    pub steps: Vec<PredictionStep>,
}

impl ForecastResult {
    /// 값과 타임스탬프를 짝지어 결과를 만듭니다.
    ///
    /// `values`와 `times`의 길이가 다르면 `LengthMismatch`를 반환합니다.
    pub fn new(
        model: impl Into<String>,
        last_observed: DateTime<Utc>,
        values: &[f64],
        times: &[DateTime<Utc>],
    ) -> CoreResult<Self> {
        if values.len() != times.len() {
            return Err(CoreError::LengthMismatch {
                context: "forecast timestamps",
                expected: values.len(),
                actual: times.len(),
            });
        }

        let steps = values
            .iter()
            .zip(times)
            .enumerate()
            .map(|(i, (value, time))| PredictionStep {
                step: i + 1,
                offset_secs: (*time - last_observed).num_seconds(),
                time: *time,
                value: *value,
            })
            .collect();

        Ok(Self {
            model: model.into(),
            steps,
        })
    }

    /// 스텝 수.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// 비어 있는지 확인.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 예측 값만 시간순으로 반환.
    pub fn values(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.value).collect()
    }
}

/// `last + (i+1) * interval` 형태의 예측 타임스탬프를 생성합니다.
///
/// `round`가 켜져 있으면 각 시각을 interval 단위로 반올림합니다.
/// 표현 가능한 시각 범위를 넘어가면 `InvalidInput`을 반환합니다.
pub fn forecast_timestamps(
    last: DateTime<Utc>,
    interval: Duration,
    horizon: usize,
    round: bool,
) -> CoreResult<Vec<DateTime<Utc>>> {
    let step = TimeDelta::from_std(interval).map_err(|_| {
        CoreError::InvalidInput(format!("step interval {:?} out of range", interval))
    })?;
    let out_of_range = |i: usize| {
        CoreError::InvalidInput(format!(
            "forecast step {} after {} is outside the representable time range",
            i, last
        ))
    };

    (1..=horizon)
        .map(|i| {
            let offset = i64::try_from(i)
                .ok()
                .and_then(|n| step.num_milliseconds().checked_mul(n))
                .and_then(TimeDelta::try_milliseconds)
                .ok_or_else(|| out_of_range(i))?;
            let time = last
                .checked_add_signed(offset)
                .ok_or_else(|| out_of_range(i))?;

            if round {
                Ok(time.duration_round(step).unwrap_or(time))
            } else {
                Ok(time)
            }
        })
        .collect()
}
