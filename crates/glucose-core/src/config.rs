//! 설정 관리.
//!
//! 이 모듈은 애플리케이션 설정을 정의하고 관리합니다.
//! 모든 값은 프로세스 시작 시 한 번 로드되어 검증된 뒤 변경되지 않으며,
//! 각 컴포넌트에 명시적으로 전달됩니다.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{Channel, ChannelScale};
use crate::error::{CoreError, CoreResult};

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 서버 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 모델 아티팩트 설정
    #[serde(default)]
    pub model: ModelConfig,
    /// 예측 파이프라인 설정
    #[serde(default)]
    pub forecast: ForecastConfig,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// 동시에 파이프라인을 실행할 수 있는 워커 수
    pub workers: usize,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50051,
            workers: 10,
            request_timeout_secs: 30,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
    /// 스레드 ID 출력 여부
    pub thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            thread_ids: false,
        }
    }
}

/// 모델 백엔드 종류.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelBackend {
    /// ONNX Runtime으로 아티팩트 로드 (`ml` feature 필요)
    #[default]
    Onnx,
    /// 아티팩트 없이 동작하는 결정적 mock 모델
    Mock,
}

/// 모델 아티팩트 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    /// 백엔드 종류
    pub backend: ModelBackend,
    /// 모델 파일 경로
    pub path: PathBuf,
    /// 로깅/식별을 위한 모델 이름
    pub name: String,
    /// 동시 추론을 위한 세션 수
    pub session_pool_size: usize,
    /// 그래프 최적화 활성화
    pub optimize_graph: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackend::Onnx,
            path: PathBuf::from("models/dnn_model.onnx"),
            name: "dnn_model".to_string(),
            session_pool_size: 2,
            optimize_graph: true,
        }
    }
}

/// feature 추출 전략 설정.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FeatureStrategyConfig {
    /// 원시 윈도우를 정규화해서 그대로 모델에 전달
    Passthrough,
    /// 통계 feature engineering (lag, diff, rolling std 등)
    Statistical(StatisticalFeatureConfig),
}

impl Default for FeatureStrategyConfig {
    fn default() -> Self {
        Self::Passthrough
    }
}

/// 통계 feature 추출 설정.
///
/// 모든 길이는 샘플 수 단위입니다 (5분 간격 기준 3 = 15분).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StatisticalFeatureConfig {
    /// lag 차분 간격
    pub lags: Vec<usize>,
    /// rolling 표준편차 윈도우 크기
    pub rolling_windows: Vec<usize>,
    /// 뒤에 역순으로 붙일 원시 값 개수
    pub raw_points: usize,
    /// 주기 feature의 주기 (일 단위)
    pub period_days: u32,
}

impl Default for StatisticalFeatureConfig {
    fn default() -> Self {
        Self {
            lags: vec![3, 6, 12],
            rolling_windows: vec![12, 24],
            raw_points: 24,
            period_days: 7,
        }
    }
}

impl StatisticalFeatureConfig {
    /// feature 추출에 필요한 최소 관측값 수 반환.
    pub fn min_observations(&self) -> usize {
        let max_lag = self.lags.iter().max().copied().unwrap_or(0);
        let max_window = self.rolling_windows.iter().max().copied().unwrap_or(0);

        // 차분 계산에는 최소 2개가 필요
        *[max_lag + 1, max_window, self.raw_points, 2]
            .iter()
            .max()
            .unwrap_or(&2)
    }

    /// 예상되는 feature vector 크기 반환.
    pub fn feature_count(&self) -> usize {
        // 시각 sin/cos + 주기 sin/cos
        let calendar_features = 4;
        // 최대 상승/하락 차분 + 상승/하락 차분 합
        let diff_features = 4;

        calendar_features
            + diff_features
            + self.lags.len()
            + self.rolling_windows.len()
            + self.raw_points
    }
}

/// 정규화 파라미터 출처.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMode {
    /// 요청마다 평탄화된 윈도우 전체의 평균/표준편차 계산
    #[default]
    PerRequest,
    /// 설정에 고정된 채널별 상수 사용
    Fixed,
}

/// 분산이 0인 윈도우 처리 정책.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// 요청을 거부 (INVALID_ARGUMENT)
    #[default]
    Reject,
    /// 대체 상수로 정규화
    Fallback {
        /// 대체 평균
        mean: f64,
        /// 대체 표준편차
        std: f64,
    },
}

/// 정규화 설정.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// 파라미터 출처
    pub mode: NormalizationMode,
    /// `fixed` 모드의 채널별 상수 (`channels`와 같은 순서)
    pub fixed: Vec<ChannelScale>,
    /// 분산이 0인 윈도우 처리 정책
    pub degenerate: DegeneratePolicy,
}

/// 자기회귀 롤아웃 중 관측되지 않은 외생 채널을 채우는 정책.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ExogenousPolicy {
    /// 역정규화하면 0이 되는 값 (`-mean/std`)
    #[default]
    Neutral,
    /// 지정한 원시 값을 채널 파라미터로 정규화해서 사용
    Fixed {
        /// 원시 단위 값
        value: f64,
    },
}

/// 예측 파이프라인 설정.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// 모델이 요구하는 최소 관측값 수 (L_min)
    pub lookback: usize,
    /// 요청당 예측 스텝 수 (H)
    pub horizon: usize,
    /// 모델 1회 호출이 생성하는 스텝 수 (h)
    pub steps_per_call: usize,
    /// 예측 스텝 간격 (초)
    pub step_interval_secs: u64,
    /// 모델 입력 채널 순서 (타깃 채널이 마지막)
    pub channels: Vec<Channel>,
    /// feature 추출 전략
    pub features: FeatureStrategyConfig,
    /// 정규화 설정
    pub normalization: NormalizationConfig,
    /// 롤아웃 외생 채널 정책
    pub exogenous: ExogenousPolicy,
    /// 예측 타임스탬프를 스텝 간격으로 반올림할지 여부
    pub round_timestamps: bool,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self::dense()
    }
}

impl ForecastConfig {
    /// 단일 채널 dense 모델: 24개 관측값으로 1회 호출에 12스텝 예측.
    pub fn dense() -> Self {
        Self {
            lookback: 24,
            horizon: 12,
            steps_per_call: 12,
            step_interval_secs: 300,
            channels: vec![Channel::Glucose],
            features: FeatureStrategyConfig::Passthrough,
            normalization: NormalizationConfig::default(),
            exogenous: ExogenousPolicy::Neutral,
            round_timestamps: false,
        }
    }

    /// 3채널 순환 모델: 48개 관측값, 호출당 6스텝 x 12회 = 72스텝.
    ///
    /// 채널별 상수는 학습 데이터 통계이며 배포 설정에서 덮어써야 합니다.
    pub fn recurrent() -> Self {
        Self {
            lookback: 48,
            horizon: 72,
            steps_per_call: 6,
            step_interval_secs: 300,
            channels: vec![Channel::Carbs, Channel::Insulin, Channel::Glucose],
            features: FeatureStrategyConfig::Passthrough,
            normalization: NormalizationConfig {
                mode: NormalizationMode::Fixed,
                fixed: vec![
                    ChannelScale::new(1.2, 7.5),
                    ChannelScale::new(0.15, 1.1),
                    ChannelScale::new(7.4, 2.6),
                ],
                degenerate: DegeneratePolicy::Reject,
            },
            exogenous: ExogenousPolicy::Neutral,
            round_timestamps: false,
        }
    }

    /// 예측 스텝 간격.
    pub fn step_interval(&self) -> Duration {
        Duration::from_secs(self.step_interval_secs)
    }

    /// 요청당 모델 호출 횟수 (k = H / h).
    pub fn calls_per_request(&self) -> usize {
        if self.steps_per_call == 0 {
            return 0;
        }
        self.horizon / self.steps_per_call
    }

    /// 여러 번의 모델 호출을 자기회귀로 이어 붙여야 하는지 확인.
    pub fn is_autoregressive(&self) -> bool {
        self.calls_per_request() > 1
    }

    /// 타깃 채널 (항상 마지막 채널).
    pub fn target_channel(&self) -> Channel {
        self.channels.last().copied().unwrap_or(Channel::Glucose)
    }

    /// 요청이 가져야 하는 최소 관측값 수.
    pub fn required_history(&self) -> usize {
        match &self.features {
            FeatureStrategyConfig::Passthrough => self.lookback,
            FeatureStrategyConfig::Statistical(stats) => {
                self.lookback.max(stats.min_observations())
            }
        }
    }

    /// 모델 입력 텐서 형태.
    ///
    /// - passthrough 단일 채널: `[1, lookback]`
    /// - passthrough 다채널: `[1, lookback, channels]`
    /// - statistical: `[1, feature_count]`
    pub fn model_input_shape(&self) -> Vec<usize> {
        match &self.features {
            FeatureStrategyConfig::Passthrough if self.channels.len() == 1 => {
                vec![1, self.lookback]
            }
            FeatureStrategyConfig::Passthrough => {
                vec![1, self.lookback, self.channels.len()]
            }
            FeatureStrategyConfig::Statistical(stats) => vec![1, stats.feature_count()],
        }
    }

    /// 시작 시점 불변 조건 검증.
    pub fn validate(&self) -> CoreResult<()> {
        if self.lookback == 0 {
            return Err(CoreError::Config("lookback must be positive".to_string()));
        }
        if self.horizon == 0 || self.steps_per_call == 0 {
            return Err(CoreError::Config(
                "horizon and steps_per_call must be positive".to_string(),
            ));
        }
        if self.horizon % self.steps_per_call != 0 {
            return Err(CoreError::Config(format!(
                "horizon {} is not a multiple of steps_per_call {}",
                self.horizon, self.steps_per_call
            )));
        }
        if self.step_interval_secs == 0 {
            return Err(CoreError::Config(
                "step_interval_secs must be positive".to_string(),
            ));
        }

        self.validate_channels()?;
        self.validate_normalization()?;

        if let FeatureStrategyConfig::Statistical(stats) = &self.features {
            if self.is_autoregressive() {
                return Err(CoreError::Config(
                    "statistical features only support a single model call per request"
                        .to_string(),
                ));
            }
            if self.channels.len() != 1 {
                return Err(CoreError::Config(
                    "statistical features read the target channel only".to_string(),
                ));
            }
            if stats.rolling_windows.iter().any(|w| *w < 2) || stats.lags.contains(&0) {
                return Err(CoreError::Config(
                    "lags must be >= 1 and rolling windows >= 2".to_string(),
                ));
            }
            if stats.period_days == 0 {
                return Err(CoreError::Config("period_days must be positive".to_string()));
            }
        }

        Ok(())
    }

    fn validate_channels(&self) -> CoreResult<()> {
        if self.channels.is_empty() {
            return Err(CoreError::Config("at least one channel is required".to_string()));
        }

        let unique: HashSet<_> = self.channels.iter().collect();
        if unique.len() != self.channels.len() {
            return Err(CoreError::Config(format!(
                "duplicate channels in {:?}",
                self.channels
            )));
        }

        if self.target_channel() != Channel::Glucose {
            return Err(CoreError::Config(
                "glucose must be the last (target) channel".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_normalization(&self) -> CoreResult<()> {
        let norm = &self.normalization;

        if norm.mode == NormalizationMode::Fixed {
            if norm.fixed.len() != self.channels.len() {
                return Err(CoreError::Config(format!(
                    "fixed normalization needs {} channel constants, got {}",
                    self.channels.len(),
                    norm.fixed.len()
                )));
            }
            if let Some(pos) = norm.fixed.iter().position(|s| s.is_degenerate()) {
                return Err(CoreError::Config(format!(
                    "fixed normalization constant for {:?} has zero or non-finite std",
                    self.channels[pos]
                )));
            }
        }

        if let DegeneratePolicy::Fallback { mean, std } = norm.degenerate {
            if ChannelScale::new(mean, std).is_degenerate() {
                return Err(CoreError::Config(
                    "degenerate fallback std must be finite and non-zero".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 환경 변수는 `GLUCOSE__FORECAST__HORIZON=72`처럼 `__`로 구분합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let builder = config::Config::builder()
            // 파일에서 로드 (없으면 기본값 사용)
            .add_source(config::File::from(path.as_ref()).required(false))
            // 환경 변수로 오버라이드
            .add_source(
                config::Environment::with_prefix("GLUCOSE")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> CoreResult<Self> {
        Self::load("config/default.toml")
    }

    /// 전체 설정 검증.
    pub fn validate(&self) -> CoreResult<()> {
        if self.server.workers == 0 {
            return Err(CoreError::Config("server.workers must be positive".to_string()));
        }
        if self.model.session_pool_size == 0 {
            return Err(CoreError::Config(
                "model.session_pool_size must be positive".to_string(),
            ));
        }
        self.forecast.validate()
    }
}
