//! 거래소 capability trait 정의.
//!
//! 재시도 계층은 구체적인 거래소가 아니라 이 capability 집합에 대해서만 다형적입니다.
//! 거래소별 특이사항(인증, 응답 정규화, 전송 계층 rate limiter)은 구현체의 몫입니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use trader_core::{Kline, Market, OrderRequest, OrderStatus, Ticker, Timeframe};

use crate::ExchangeError;

/// 거래소 작업을 위한 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// 자산의 잔고 정보.
#[derive(Debug, Clone, PartialEq)]
pub struct Balance {
    /// 자산 이름 (예: "BTC", "USDT")
    pub asset: String,
    /// 사용 가능한 잔고
    pub free: Decimal,
    /// 주문에 묶인 잔고
    pub locked: Decimal,
}

impl Balance {
    /// 총 잔고 반환 (사용 가능 + 묶인 잔고).
    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }
}

/// 거래소 capability 인터페이스.
///
/// 같은 거래소에 대한 동시 호출은 구현체 내부의 연결 풀/rate limiter를 공유합니다.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// 거래소 이름 반환.
    fn name(&self) -> &str;

    /// 거래쌍의 현재 시세 조회.
    async fn fetch_ticker(&self, pair: &str) -> ExchangeResult<Ticker>;

    /// 과거 캔들스틱 조회.
    async fn fetch_ohlcv(
        &self,
        pair: &str,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> ExchangeResult<Vec<Kline>>;

    /// 새 주문 제출. 거래소 주문 ID를 반환합니다.
    async fn create_order(&self, request: &OrderRequest) -> ExchangeResult<String>;

    /// 주문 취소.
    async fn cancel_order(&self, pair: &str, order_id: &str) -> ExchangeResult<()>;

    /// 주문 상태 조회.
    async fn fetch_order(&self, pair: &str, order_id: &str) -> ExchangeResult<OrderStatus>;

    /// 특정 자산의 잔고 조회.
    async fn fetch_balance(&self, asset: &str) -> ExchangeResult<Balance>;

    /// 마켓 목록 조회.
    async fn fetch_markets(&self) -> ExchangeResult<Vec<Market>> {
        Ok(vec![]) // 마켓 메타데이터를 제공하지 않는 거래소를 위한 기본 구현
    }
}
