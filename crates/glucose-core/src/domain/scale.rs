//! 채널별 정규화 상수.

use serde::{Deserialize, Serialize};

/// 하나의 채널(또는 평탄화된 윈도우 전체)에 대한 평균/표준편차 쌍.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelScale {
    /// 평균
    pub mean: f64,
    /// 표준편차
    pub std: f64,
}

impl ChannelScale {
    /// 새 스케일을 생성합니다.
    pub const fn new(mean: f64, std: f64) -> Self {
        Self { mean, std }
    }

    /// 정규화하지 않는 항등 스케일 `(0, 1)`.
    pub const fn identity() -> Self {
        Self::new(0.0, 1.0)
    }

    /// 표준편차가 0이거나 유한하지 않으면 나눗셈에 쓸 수 없습니다.
    pub fn is_degenerate(&self) -> bool {
        !self.mean.is_finite() || !self.std.is_finite() || self.std == 0.0
    }

    /// `(v - mean) / std`.
    #[inline]
    pub fn normalize(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }

    /// `v * std + mean`.
    #[inline]
    pub fn denormalize(&self, value: f64) -> f64 {
        value * self.std + self.mean
    }

    /// 역정규화하면 0이 되는 정규화 값 (`-mean/std`).
    #[inline]
    pub fn neutral(&self) -> f64 {
        -self.mean / self.std
    }
}

impl Default for ChannelScale {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_denormalizes_to_zero() {
        let scale = ChannelScale::new(7.4, 2.6);
        assert!(scale.denormalize(scale.neutral()).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_detection() {
        assert!(ChannelScale::new(5.0, 0.0).is_degenerate());
        assert!(ChannelScale::new(5.0, f64::NAN).is_degenerate());
        assert!(ChannelScale::new(f64::INFINITY, 1.0).is_degenerate());
        assert!(!ChannelScale::identity().is_degenerate());
    }

    #[test]
    fn test_identity_is_noop() {
        let scale = ChannelScale::identity();
        assert_eq!(scale.normalize(3.25), 3.25);
        assert_eq!(scale.denormalize(3.25), 3.25);
    }

    #[test]
    fn test_deserialize_from_json() {
        let scale: ChannelScale = serde_json::from_str(r#"{"mean": 7.4, "std": 2.6}"#).unwrap();
        assert_eq!(scale, ChannelScale::new(7.4, 2.6));
    }

    proptest::proptest! {
        #[test]
        fn prop_denormalize_inverts_normalize(
            value in -50.0f64..50.0,
            mean in -20.0f64..20.0,
            std in 0.01f64..10.0,
        ) {
            let scale = ChannelScale::new(mean, std);
            let restored = scale.denormalize(scale.normalize(value));
            proptest::prop_assert!((restored - value).abs() < 1e-9);
        }
    }
}
