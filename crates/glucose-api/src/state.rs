//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! 예측 서비스는 시작 시 한 번 만들어져 읽기 전용으로 공유되고,
//! 세마포어가 동시에 실행되는 파이프라인 수를 제한합니다.

use glucose_ml::ForecastService;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// 애플리케이션 공유 상태.
///
/// Axum의 State extractor를 통해 핸들러에 주입됩니다.
#[derive(Clone)]
pub struct AppState {
    /// 예측 서비스 (읽기 전용 설정과 모델)
    pub service: Arc<ForecastService>,

    /// 워커 풀 - 동시에 실행되는 파이프라인 수 제한
    pub workers: Arc<Semaphore>,

    /// 워커 풀 크기
    pub worker_count: usize,

    /// 서버 시작 시간
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// API 버전
    pub version: String,
}

impl AppState {
    /// 새 AppState 생성.
    pub fn new(service: ForecastService, workers: usize) -> Self {
        Self {
            service: Arc::new(service),
            workers: Arc::new(Semaphore::new(workers)),
            worker_count: workers,
            started_at: chrono::Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// 서버 업타임(초).
    pub fn uptime_secs(&self) -> i64 {
        chrono::Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds()
    }

    /// 현재 사용 가능한 워커 수.
    pub fn available_workers(&self) -> usize {
        self.workers.available_permits()
    }
}

/// 테스트용 AppState 생성 (dense 설정 + persistence mock).
#[cfg(test)]
pub fn create_test_state() -> AppState {
    use glucose_core::ForecastConfig;
    use glucose_ml::MockPredictor;

    let config = ForecastConfig::dense();
    let predictor = MockPredictor::for_config(&config).with_name("test_model");
    let service =
        ForecastService::new(config, Box::new(predictor)).expect("valid dense test config");
    AppState::new(service, 2)
}
