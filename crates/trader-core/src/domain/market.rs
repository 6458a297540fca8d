//! 거래소 마켓(거래쌍) 메타데이터.

use serde::{Deserialize, Serialize};

/// 거래소가 제공하는 마켓 정보.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// 거래쌍 (예: "BTC/USDT")
    pub pair: String,
    /// 기준 자산
    pub base: String,
    /// 호가 자산
    pub quote: String,
    /// 활성 플래그.
    ///
    /// 거래소가 값을 내려주지 않는 경우가 많아 `None`은 활성으로 취급합니다.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl Market {
    /// 명시적으로 `false`가 아니면 활성 마켓입니다.
    pub fn is_active(&self) -> bool {
        self.active != Some(false)
    }
}
