//! 혈당 예측을 위한 도메인 모델.

mod forecast;
mod observation;
mod scale;

pub use forecast::*;
pub use observation::*;
pub use scale::*;
