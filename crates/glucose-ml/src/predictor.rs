//! 학습된 모델에 대한 추상화.
//!
//! 모델은 별도로 학습되어 ONNX 형식으로 내보내야 합니다.
//! 파이프라인은 모델을 `predict(tensor) -> tensor`만 제공하는
//! 블랙박스로 다루며, 형태 계약만 검증합니다:
//! - 입력: `input_shape()` 형태의 float32 텐서
//! - 출력: `output_len()`개의 float32 값 (정규화된 타깃 예측)

use glucose_core::{ForecastConfig, ModelBackend, ModelConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::{FeatureVector, MlError, MlResult};

#[cfg(feature = "ml")]
pub use onnx::OnnxPredictor;

/// 다형성을 가능하게 하는 predictor trait.
///
/// `&self`로 동시에 호출할 수 있어야 합니다.
pub trait Predictor: Send + Sync {
    /// 정규화된 feature에서 다음 스텝들을 예측.
    fn predict(&self, features: &FeatureVector) -> MlResult<Vec<f32>>;

    /// 모델 입력 텐서 형태 (배치 차원 포함).
    fn input_shape(&self) -> &[usize];

    /// 호출 1회당 출력 값 개수.
    fn output_len(&self) -> usize;

    /// 모델 이름 반환.
    fn model_name(&self) -> &str;
}

/// 형태 계약을 검증하면서 모델을 한 번 호출합니다.
///
/// 입력이나 출력 길이가 맞지 않으면 자르거나 채우지 않고 `ShapeMismatch`를 반환합니다.
pub fn run_model(predictor: &dyn Predictor, features: &FeatureVector) -> MlResult<Vec<f32>> {
    let expected: usize = predictor.input_shape().iter().product();
    if features.len() != expected {
        return Err(MlError::ShapeMismatch {
            context: "model input",
            expected,
            actual: features.len(),
        });
    }

    let output = predictor.predict(features)?;
    metrics::counter!("model_invocations_total", "model" => predictor.model_name().to_string())
        .increment(1);

    if output.len() != predictor.output_len() {
        return Err(MlError::ShapeMismatch {
            context: "model output",
            expected: predictor.output_len(),
            actual: output.len(),
        });
    }

    Ok(output)
}

/// 설정된 백엔드로 predictor를 로드합니다.
///
/// 로드 실패는 `ModelUnavailable`이며 시작 시점에 치명적입니다.
pub fn load_predictor(
    model: &ModelConfig,
    forecast: &ForecastConfig,
) -> MlResult<Box<dyn Predictor>> {
    match model.backend {
        ModelBackend::Mock => Ok(Box::new(
            MockPredictor::for_config(forecast).with_name(model.name.clone()),
        )),
        #[cfg(feature = "ml")]
        ModelBackend::Onnx => Ok(Box::new(OnnxPredictor::load(
            model,
            forecast.model_input_shape(),
            forecast.steps_per_call,
        )?)),
        #[cfg(not(feature = "ml"))]
        ModelBackend::Onnx => Err(MlError::ModelUnavailable(format!(
            "{} requires the `ml` feature (ONNX Runtime)",
            model.path.display()
        ))),
    }
}

/// mock 모델의 출력 방식.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// 입력의 마지막 값을 모든 스텝에 반복
    Persistence,
    /// 고정 값 반환
    Constant(f32),
    /// 입력의 마지막 값에서 스텝마다 `delta`씩 증가
    Ramp(f32),
}

/// 실제 모델 파일 없이 테스트하기 위한 결정적 mock predictor.
///
/// 호출 횟수를 세기 때문에 거부된 요청이 모델을 호출하지 않았는지 확인할 수 있습니다.
#[derive(Debug)]
pub struct MockPredictor {
    name: String,
    input_shape: Vec<usize>,
    output_len: usize,
    behavior: MockBehavior,
    emitted_len: Option<usize>,
    calls: AtomicUsize,
}

impl MockPredictor {
    /// 새 mock predictor 생성.
    pub fn new(input_shape: Vec<usize>, output_len: usize) -> Self {
        Self {
            name: "mock_predictor".to_string(),
            input_shape,
            output_len,
            behavior: MockBehavior::Persistence,
            emitted_len: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// 예측 설정의 형태 계약에 맞는 mock 생성.
    pub fn for_config(config: &ForecastConfig) -> Self {
        Self::new(config.model_input_shape(), config.steps_per_call)
    }

    /// 출력 방식 설정.
    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// 모델 이름 설정.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 선언한 `output_len`과 다른 개수를 내보내도록 설정 (계약 위반 테스트용).
    pub fn emitting(mut self, len: usize) -> Self {
        self.emitted_len = Some(len);
        self
    }

    /// 지금까지의 호출 횟수.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Predictor for MockPredictor {
    fn predict(&self, features: &FeatureVector) -> MlResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let last = *features
            .as_slice()
            .last()
            .ok_or_else(|| MlError::InvalidInput("Empty feature vector".to_string()))?;
        let len = self.emitted_len.unwrap_or(self.output_len);

        let output = (1..=len)
            .map(|step| match self.behavior {
                MockBehavior::Persistence => last,
                MockBehavior::Constant(value) => value,
                MockBehavior::Ramp(delta) => last + delta * step as f32,
            })
            .collect();

        debug!(model = %self.name, outputs = len, "Mock prediction");
        Ok(output)
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn output_len(&self) -> usize {
        self.output_len
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

#[cfg(feature = "ml")]
mod onnx {
    use super::Predictor;
    use crate::{FeatureVector, MlError, MlResult};
    use glucose_core::ModelConfig;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard};
    use tracing::{debug, info};

    /// ONNX Runtime 기반 predictor.
    ///
    /// `Session::run`은 세션을 독점해야 하므로 같은 파일에서 만든
    /// 고정 크기 세션 풀을 두고, 호출마다 비어 있는 세션을 사용합니다.
    pub struct OnnxPredictor {
        sessions: Vec<Mutex<Session>>,
        next: AtomicUsize,
        input_shape: Vec<usize>,
        output_len: usize,
        name: String,
    }

    impl OnnxPredictor {
        /// 지정된 경로에서 ONNX 모델 로드.
        pub fn load(
            config: &ModelConfig,
            input_shape: Vec<usize>,
            output_len: usize,
        ) -> MlResult<Self> {
            let path = &config.path;

            if !path.exists() {
                return Err(MlError::ModelUnavailable(format!(
                    "Model file not found: {}",
                    path.display()
                )));
            }

            info!(
                path = %path.display(),
                pool = config.session_pool_size,
                "Loading ONNX model"
            );

            let level = if config.optimize_graph {
                GraphOptimizationLevel::Level3
            } else {
                GraphOptimizationLevel::Disable
            };

            let sessions = (0..config.session_pool_size.max(1))
                .map(|_| {
                    Session::builder()
                        .map_err(|e| {
                            MlError::ModelUnavailable(format!(
                                "Failed to create session builder: {}",
                                e
                            ))
                        })?
                        .with_optimization_level(level)
                        .map_err(|e| {
                            MlError::ModelUnavailable(format!(
                                "Failed to set optimization level: {}",
                                e
                            ))
                        })?
                        .commit_from_file(path)
                        .map(Mutex::new)
                        .map_err(|e| {
                            MlError::ModelUnavailable(format!("Failed to load model: {}", e))
                        })
                })
                .collect::<MlResult<Vec<_>>>()?;

            info!(
                model = %config.name,
                input_shape = ?input_shape,
                output_len,
                "ONNX model loaded successfully"
            );

            Ok(Self {
                sessions,
                next: AtomicUsize::new(0),
                input_shape,
                output_len,
                name: config.name.clone(),
            })
        }

        /// 비어 있는 세션을 고르고, 모두 사용 중이면 순번 세션을 기다립니다.
        fn acquire(&self) -> MlResult<MutexGuard<'_, Session>> {
            let start = self.next.fetch_add(1, Ordering::Relaxed) % self.sessions.len();

            for offset in 0..self.sessions.len() {
                let idx = (start + offset) % self.sessions.len();
                if let Ok(guard) = self.sessions[idx].try_lock() {
                    return Ok(guard);
                }
            }

            self.sessions[start]
                .lock()
                .map_err(|_| MlError::Inference("ONNX session mutex poisoned".to_string()))
        }
    }

    impl Predictor for OnnxPredictor {
        fn predict(&self, features: &FeatureVector) -> MlResult<Vec<f32>> {
            let shape: Vec<i64> = features.shape().iter().map(|d| *d as i64).collect();
            let input_data: Vec<f32> = features.as_slice().to_vec();

            // 텐서 값 생성
            let input_tensor =
                ort::value::Tensor::from_array((shape, input_data.into_boxed_slice())).map_err(
                    |e| MlError::Inference(format!("Failed to create input tensor: {}", e)),
                )?;

            let mut session = self.acquire()?;
            let outputs = session
                .run(ort::inputs![input_tensor])
                .map_err(|e| MlError::Inference(format!("Inference failed: {}", e)))?;

            // 첫 번째 출력 사용
            let (_, output) = outputs
                .iter()
                .next()
                .ok_or_else(|| MlError::Inference("No output tensor found".to_string()))?;

            // 텐서 데이터 추출 - (&Shape, &[f32]) 반환
            let (_, output_slice) = output.try_extract_tensor::<f32>().map_err(|e| {
                MlError::Inference(format!("Failed to extract output tensor: {}", e))
            })?;

            let values = output_slice.to_vec();
            debug!(model = %self.name, outputs = values.len(), "ONNX prediction");
            Ok(values)
        }

        fn input_shape(&self) -> &[usize] {
            &self.input_shape
        }

        fn output_len(&self) -> usize {
            self.output_len
        }

        fn model_name(&self) -> &str {
            &self.name
        }
    }

}
