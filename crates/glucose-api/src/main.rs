//! 혈당 예측 API 서버 진입점.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, middleware, routing::get, Router};
use clap::Parser;
use glucose_api::{create_api_router, metrics_layer, setup_metrics_recorder, AppState};
use glucose_core::{init_logging, AppConfig, LogConfig};
use glucose_ml::{load_predictor, ForecastService};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// 혈당 예측 추론 서버.
#[derive(Debug, Parser)]
#[command(name = "glucose-api", version, about)]
struct Cli {
    /// 설정 파일 경로
    #[arg(short, long, default_value = "config/default.toml")]
    config: PathBuf,

    /// 로그 레벨 오버라이드 (예: "debug", "glucose_ml=trace")
    #[arg(long)]
    log_level: Option<String>,

    /// 설정과 모델을 검증한 뒤 서버를 시작하지 않고 종료
    #[arg(long)]
    check: bool,
}

/// /metrics 엔드포인트 핸들러.
async fn metrics_handler(
    axum::extract::State(handle): axum::extract::State<PrometheusHandle>,
) -> String {
    handle.render()
}

/// 전체 라우터 생성.
fn create_router(state: Arc<AppState>, metrics_handle: PrometheusHandle, timeout: Duration) -> Router {
    // 메트릭 라우터 (별도 상태)
    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    Router::new()
        .merge(metrics_router)
        .merge(create_api_router().with_state(state))
        // 메트릭 미들웨어 (모든 요청에 적용)
        .layer(middleware::from_fn(metrics_layer))
        .layer(TraceLayer::new_for_http())
        // 전역 타임아웃 - 408 상태 코드 반환
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env 파일 로드 (없으면 무시)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)?;

    // tracing 초기화
    let mut log_config = LogConfig::from_settings(&config.logging).override_from_env();
    if let Some(level) = cli.log_level.clone() {
        log_config.level = level;
    }
    init_logging(log_config)?;

    info!(config = %cli.config.display(), "Starting glucose forecast server...");

    // 모델 로드 (실패 시 시작 중단)
    let predictor = load_predictor(&config.model, &config.forecast).map_err(|e| {
        error!(path = %config.model.path.display(), error = %e, "Failed to load model");
        e
    })?;

    let service = ForecastService::new(config.forecast.clone(), predictor).map_err(|e| {
        error!(error = %e, "Model does not match forecast configuration");
        e
    })?;

    info!(
        model = service.model_name(),
        input_shape = ?service.input_shape(),
        horizon = config.forecast.horizon,
        required_history = service.required_history(),
        mode = ?service.mode(),
        "Forecast service initialized"
    );

    if cli.check {
        info!("Configuration and model are valid");
        return Ok(());
    }

    // Prometheus 메트릭 레코더 설정
    let metrics_handle = setup_metrics_recorder()?;
    info!("Prometheus metrics recorder initialized");

    let state = Arc::new(AppState::new(service, config.server.workers));
    info!(version = %state.version, workers = state.worker_count, "Application state initialized");

    let app = create_router(
        state,
        metrics_handle,
        Duration::from_secs(config.server.request_timeout_secs),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| {
            error!(
                host = %config.server.host,
                port = config.server.port,
                error = %e,
                "Invalid listen address"
            );
            e
        })?;

    info!(%addr, "API server listening");
    info!("Metrics available at http://{}/metrics", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped gracefully");

    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM 시그널을 수신하면 반환합니다.
/// 진행 중인 요청은 axum이 완료될 때까지 기다립니다.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
