//! 저장소에 포함된 설정 파일 로드 테스트.

use glucose_core::{AppConfig, Channel, ForecastConfig, ModelBackend, NormalizationMode};
use std::path::PathBuf;

fn config_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../config")
        .join(name)
}

#[test]
fn default_config_is_the_dense_preset() {
    let config = AppConfig::load(config_path("default.toml")).unwrap();

    assert_eq!(config.model.backend, ModelBackend::Onnx);
    assert_eq!(config.server.port, 50051);
    assert_eq!(config.forecast, ForecastConfig::dense());
}

#[test]
fn recurrent_config_loads_fixed_constants() {
    let config = AppConfig::load(config_path("recurrent.toml")).unwrap();
    let forecast = &config.forecast;

    assert_eq!(
        forecast.channels,
        vec![Channel::Carbs, Channel::Insulin, Channel::Glucose]
    );
    assert_eq!(forecast.normalization.mode, NormalizationMode::Fixed);
    assert_eq!(forecast.normalization.fixed.len(), 3);
    assert_eq!(forecast.calls_per_request(), 12);
    assert_eq!(forecast.required_history(), 48);
    assert_eq!(config.model.session_pool_size, 4);
}
