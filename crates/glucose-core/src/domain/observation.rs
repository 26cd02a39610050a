//! 관측값 타입 및 관측 윈도우.
//!
//! 이 모듈은 요청으로 들어오는 시계열 입력을 정의합니다:
//! - `Channel` - 관측 채널 (탄수화물, 인슐린, 혈당)
//! - `Observation` - 한 시점의 채널 값
//! - `TimedValue` - 희소한 이벤트 (인슐린 투여, 탄수화물 섭취)
//! - `ObservationWindow` - 시간순으로 검증된 관측값 시퀀스

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};

/// 관측 채널.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// 탄수화물 섭취량 (g)
    Carbs,
    /// 인슐린 투여량 (U)
    Insulin,
    /// 혈당 (mmol/L), 예측 대상 채널
    Glucose,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Carbs => write!(f, "carbs"),
            Channel::Insulin => write!(f, "insulin"),
            Channel::Glucose => write!(f, "glucose"),
        }
    }
}

/// 한 시점의 관측값.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// 관측 시각
    pub time: DateTime<Utc>,
    /// 혈당
    pub glucose: f64,
    /// 인슐린 (없으면 0)
    #[serde(default)]
    pub insulin: f64,
    /// 탄수화물 (없으면 0)
    #[serde(default)]
    pub carbs: f64,
}

impl Observation {
    /// 혈당만 있는 관측값을 생성합니다.
    pub fn glucose(time: DateTime<Utc>, glucose: f64) -> Self {
        Self {
            time,
            glucose,
            insulin: 0.0,
            carbs: 0.0,
        }
    }

    /// 인슐린/탄수화물 값을 설정합니다.
    pub fn with_exogenous(mut self, insulin: f64, carbs: f64) -> Self {
        self.insulin = insulin;
        self.carbs = carbs;
        self
    }

    /// 채널 값을 반환합니다.
    pub fn value(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Carbs => self.carbs,
            Channel::Insulin => self.insulin,
            Channel::Glucose => self.glucose,
        }
    }

    fn value_mut(&mut self, channel: Channel) -> &mut f64 {
        match channel {
            Channel::Carbs => &mut self.carbs,
            Channel::Insulin => &mut self.insulin,
            Channel::Glucose => &mut self.glucose,
        }
    }

    fn is_finite(&self) -> bool {
        self.glucose.is_finite() && self.insulin.is_finite() && self.carbs.is_finite()
    }
}

/// 시각이 붙은 단일 값 (희소 이벤트).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedValue {
    /// 이벤트 시각
    pub time: DateTime<Utc>,
    /// 값
    pub value: f64,
}

impl TimedValue {
    /// 새 이벤트를 생성합니다.
    pub fn new(time: DateTime<Utc>, value: f64) -> Self {
        Self { time, value }
    }
}

/// 시간순으로 엄격히 증가하는 관측값 시퀀스.
///
/// 생성 시점에 정렬과 유한성을 검증하므로 이후 단계는 이를 가정할 수 있습니다.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationWindow {
    observations: Vec<Observation>,
}

impl ObservationWindow {
    /// 관측값을 검증해서 윈도우를 생성합니다.
    pub fn new(observations: Vec<Observation>) -> CoreResult<Self> {
        if let Some(pos) = observations.iter().position(|o| !o.is_finite()) {
            return Err(CoreError::InvalidInput(format!(
                "observation {} has a non-finite value",
                pos
            )));
        }

        if let Some(pos) = observations
            .windows(2)
            .position(|pair| pair[1].time <= pair[0].time)
        {
            return Err(CoreError::InvalidInput(format!(
                "observation timestamps must be strictly increasing (index {})",
                pos + 1
            )));
        }

        Ok(Self { observations })
    }

    /// 관측값 개수.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// 비어 있는지 확인.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// 전체 관측값.
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// 마지막 관측 시각.
    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        self.observations.last().map(|o| o.time)
    }

    /// 가장 최근 `n`개 관측값 (부족하면 전체).
    pub fn tail(&self, n: usize) -> &[Observation] {
        let start = self.observations.len().saturating_sub(n);
        &self.observations[start..]
    }

    /// 한 채널의 값을 시간순으로 반환합니다.
    pub fn channel_values(&self, channel: Channel) -> Vec<f64> {
        self.observations.iter().map(|o| o.value(channel)).collect()
    }

    /// 최근 `rows`개 관측값을 `[rows, channels]` row-major로 평탄화합니다.
    pub fn flatten(&self, channels: &[Channel], rows: usize) -> Vec<f64> {
        self.tail(rows)
            .iter()
            .flat_map(|o| channels.iter().map(move |c| o.value(*c)))
            .collect()
    }

    /// 희소 이벤트를 관측 타임라인에 정렬해서 더합니다.
    ///
    /// 각 이벤트는 이벤트 시각 이후(같은 시각 포함) 첫 관측점에 붙고,
    /// 마지막 관측점 이후 이벤트는 마지막 점에 붙습니다.
    /// 같은 점에 붙은 이벤트는 합산됩니다.
    pub fn with_events(mut self, channel: Channel, events: &[TimedValue]) -> CoreResult<Self> {
        if channel == Channel::Glucose {
            return Err(CoreError::InvalidInput(
                "events can only be attached to exogenous channels".to_string(),
            ));
        }
        if events.is_empty() {
            return Ok(self);
        }
        if self.observations.is_empty() {
            return Err(CoreError::InvalidInput(
                "cannot align events onto an empty window".to_string(),
            ));
        }
        if let Some(pos) = events.iter().position(|e| !e.value.is_finite()) {
            return Err(CoreError::InvalidInput(format!(
                "{} event {} has a non-finite value",
                channel, pos
            )));
        }

        let last = self.observations.len() - 1;
        for event in events {
            let idx = self
                .observations
                .partition_point(|o| o.time < event.time)
                .min(last);
            *self.observations[idx].value_mut(channel) += event.value;
        }

        Ok(self)
    }
}
