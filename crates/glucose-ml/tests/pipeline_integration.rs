//! 예측 파이프라인 통합 테스트.
//!
//! mock 모델로 관측값 → feature → 예측 → 역정규화 → 타임스탬프 전체 경로를 검증합니다.

use chrono::{DateTime, Duration, TimeZone, Utc};
use glucose_core::{
    Channel, DegeneratePolicy, FeatureStrategyConfig, ForecastConfig, Observation,
    ObservationWindow, StatisticalFeatureConfig, TimedValue,
};
use glucose_ml::{FeatureVector, ForecastService, MlError, MockBehavior, MockPredictor, Predictor};
use std::sync::Arc;

/// 서비스가 소유한 mock의 호출 횟수를 테스트에서 읽기 위한 래퍼.
struct Shared(Arc<MockPredictor>);

impl Predictor for Shared {
    fn predict(&self, features: &FeatureVector) -> glucose_ml::MlResult<Vec<f32>> {
        self.0.predict(features)
    }

    fn input_shape(&self) -> &[usize] {
        self.0.input_shape()
    }

    fn output_len(&self) -> usize {
        self.0.output_len()
    }

    fn model_name(&self) -> &str {
        self.0.model_name()
    }
}

fn service_with(config: ForecastConfig, mock: MockPredictor) -> (ForecastService, Arc<MockPredictor>) {
    let mock = Arc::new(mock);
    let service = ForecastService::new(config, Box::new(Shared(mock.clone()))).unwrap();
    (service, mock)
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap()
}

fn glucose_series(len: usize) -> Vec<Observation> {
    (0..len)
        .map(|i| {
            let value = 6.0 + (i as f64 * 0.4).sin() * 1.5;
            Observation::glucose(start() + Duration::minutes(5 * i as i64), value)
        })
        .collect()
}

fn three_channel_series(len: usize) -> Vec<Observation> {
    glucose_series(len)
        .into_iter()
        .enumerate()
        .map(|(i, obs)| {
            let insulin = if i % 12 == 0 { 2.0 } else { 0.0 };
            let carbs = if i % 24 == 6 { 40.0 } else { 0.0 };
            obs.with_exogenous(insulin, carbs)
        })
        .collect()
}

#[test]
fn scenario_a_dense_single_call() {
    let config = ForecastConfig::dense();
    let (service, mock) = service_with(config.clone(), MockPredictor::for_config(&config));

    let observations = glucose_series(24);
    let last_time = observations[23].time;
    let result = service.forecast_observations(observations).unwrap();

    assert_eq!(mock.call_count(), 1);
    assert_eq!(result.len(), 12);
    for (i, step) in result.steps.iter().enumerate() {
        assert_eq!(step.step, i + 1);
        assert_eq!(step.time, last_time + Duration::minutes(5 * (i as i64 + 1)));
        assert_eq!(step.offset_secs, 300 * (i as i64 + 1));
    }
}

#[test]
fn scenario_b_recurrent_rollout() {
    let config = ForecastConfig::recurrent();
    let (service, mock) = service_with(
        config.clone(),
        MockPredictor::for_config(&config).with_behavior(MockBehavior::Ramp(0.01)),
    );

    let observations = three_channel_series(48);
    let last_time = observations[47].time;
    let result = service.forecast_observations(observations).unwrap();

    assert_eq!(mock.call_count(), 12);
    assert_eq!(result.len(), 72);
    assert_eq!(result.steps[0].time, last_time + Duration::minutes(5));
    for pair in result.steps.windows(2) {
        assert_eq!(pair[1].time - pair[0].time, Duration::minutes(5));
    }
    // ramp는 정규화 공간에서 증가하므로 원시 값도 단조 증가
    for pair in result.steps.windows(2) {
        assert!(pair[1].value > pair[0].value);
    }
}

#[test]
fn scenario_c_not_enough_points() {
    let config = ForecastConfig::dense();
    let (service, mock) = service_with(config.clone(), MockPredictor::for_config(&config));

    let err = service.forecast_observations(glucose_series(10)).unwrap_err();

    assert!(err.is_client_error());
    assert!(matches!(
        err,
        MlError::InsufficientHistory {
            required: 24,
            actual: 10
        }
    ));
    assert_eq!(mock.call_count(), 0);
}

#[test]
fn longer_history_uses_most_recent_lookback() {
    let config = ForecastConfig::dense();
    let (service, _) = service_with(config.clone(), MockPredictor::for_config(&config));

    let observations = glucose_series(40);
    let last = observations[39];
    let result = service.forecast_observations(observations).unwrap();

    assert_eq!(result.steps[0].time, last.time + Duration::minutes(5));
    // persistence mock은 마지막 관측값을 반복
    assert!((result.steps[11].value - last.glucose).abs() < 1e-4);
}

#[test]
fn degenerate_window_reject_and_fallback() {
    let flat: Vec<Observation> = (0..24)
        .map(|i| Observation::glucose(start() + Duration::minutes(5 * i), 6.2))
        .collect();

    let config = ForecastConfig::dense();
    let (service, mock) = service_with(config.clone(), MockPredictor::for_config(&config));
    let err = service.forecast_observations(flat.clone()).unwrap_err();
    assert!(matches!(err, MlError::DegenerateInput(_)));
    assert_eq!(mock.call_count(), 0);

    let mut config = ForecastConfig::dense();
    config.normalization.degenerate = DegeneratePolicy::Fallback { mean: 7.0, std: 2.0 };
    let (service, mock) = service_with(config.clone(), MockPredictor::for_config(&config));
    let result = service.forecast_observations(flat).unwrap();

    assert_eq!(mock.call_count(), 1);
    assert_eq!(result.len(), 12);
    for value in result.values() {
        assert!((value - 6.2).abs() < 1e-4);
    }
}

#[test]
fn model_output_contract_violation_is_internal() {
    let config = ForecastConfig::dense();
    let (service, _) = service_with(config.clone(), MockPredictor::for_config(&config).emitting(11));

    let err = service.forecast_observations(glucose_series(24)).unwrap_err();
    assert!(matches!(err, MlError::ShapeMismatch { .. }));
    assert!(!err.is_client_error());
}

#[test]
fn statistical_single_shot() {
    let config = ForecastConfig {
        features: FeatureStrategyConfig::Statistical(StatisticalFeatureConfig::default()),
        ..ForecastConfig::dense()
    };
    let (service, mock) = service_with(
        config.clone(),
        MockPredictor::for_config(&config).with_behavior(MockBehavior::Constant(5.5)),
    );
    assert_eq!(service.input_shape(), &[1, 37]);

    let result = service.forecast_observations(glucose_series(30)).unwrap();
    assert_eq!(mock.call_count(), 1);
    // statistical 전략은 정규화하지 않으므로 모델 출력이 그대로 나옴
    assert!(result.values().iter().all(|v| (*v - 5.5).abs() < 1e-6));
}

#[test]
fn aligned_events_reach_the_model() {
    let config = ForecastConfig::recurrent();
    let (service, _) = service_with(config.clone(), MockPredictor::for_config(&config));

    let window = ObservationWindow::new(glucose_series(48))
        .unwrap()
        .with_events(
            Channel::Insulin,
            &[TimedValue::new(start() + Duration::minutes(12), 4.0)],
        )
        .unwrap()
        .with_events(
            Channel::Carbs,
            &[TimedValue::new(start() + Duration::hours(10), 60.0)],
        )
        .unwrap();

    assert_eq!(window.observations()[3].insulin, 4.0);
    assert_eq!(window.observations()[47].carbs, 60.0);
    assert_eq!(service.forecast(&window).unwrap().len(), 72);
}

#[test]
fn concurrent_requests_share_one_service() {
    let config = ForecastConfig::dense();
    let (service, mock) = service_with(config.clone(), MockPredictor::for_config(&config));
    let service = Arc::new(service);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            std::thread::spawn(move || service.forecast_observations(glucose_series(24)))
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap().len(), 12);
    }
    assert_eq!(mock.call_count(), 8);
}
