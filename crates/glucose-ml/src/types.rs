//! ML 모듈의 공통 타입.

use serde::{Deserialize, Serialize};

/// 모델 입력을 위한 feature vector.
///
/// 평탄화된 f32 값과 모델에 전달할 텐서 형태를 함께 보관합니다.
/// 길이와 순서는 모델 아티팩트가 결정합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// feature 값들 (row-major)
    values: Vec<f32>,
    /// 텐서 형태 (배치 차원 포함)
    shape: Vec<usize>,
    /// 디버깅/로깅을 위한 선택적 feature 이름
    names: Option<Vec<String>>,
}

impl FeatureVector {
    /// `[1, len]` 형태의 feature vector 생성.
    pub fn new(values: Vec<f32>) -> Self {
        let shape = vec![1, values.len()];
        Self {
            values,
            shape,
            names: None,
        }
    }

    /// 지정한 텐서 형태로 feature vector 생성.
    pub fn with_shape(values: Vec<f32>, shape: Vec<usize>) -> Self {
        debug_assert_eq!(
            values.len(),
            shape.iter().product::<usize>(),
            "Shape does not match value count"
        );
        Self {
            values,
            shape,
            names: None,
        }
    }

    /// 이름이 있는 feature vector 생성.
    pub fn with_names(values: Vec<f32>, names: Vec<String>) -> Self {
        debug_assert_eq!(values.len(), names.len(), "Feature count mismatch");
        let mut vector = Self::new(values);
        vector.names = Some(names);
        vector
    }

    /// f64 값에서 변환.
    pub fn from_f64(values: &[f64], shape: Vec<usize>) -> Self {
        Self::with_shape(values.iter().map(|v| *v as f32).collect(), shape)
    }

    /// feature 값을 슬라이스로 반환.
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// 텐서 형태 반환.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// feature 개수 반환.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// feature vector가 비어있는지 확인.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 사용 가능한 경우 feature 이름 반환.
    pub fn names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }

    /// 이름으로 feature 값 조회.
    pub fn get(&self, name: &str) -> Option<f32> {
        let idx = self.names.as_ref()?.iter().position(|n| n == name)?;
        self.values.get(idx).copied()
    }

    /// 소유된 Vec<f32>로 변환.
    pub fn into_vec(self) -> Vec<f32> {
        self.values
    }
}
