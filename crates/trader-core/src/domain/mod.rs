//! 거래소 호출에서 주고받는 도메인 모델.

mod market;
mod market_data;
mod order;

pub use market::*;
pub use market_data::*;
pub use order::*;
