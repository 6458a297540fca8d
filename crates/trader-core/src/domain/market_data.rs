//! 시장 데이터 타입.
//!
//! - `Kline` - OHLCV 캔들스틱 데이터
//! - `Ticker` - 실시간 시세 데이터

use crate::error::TraderResult;
use crate::types::{Price, Quantity, Timeframe};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// OHLCV 캔들스틱 데이터.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    /// 거래쌍 (예: "BTC/USDT")
    pub pair: String,
    /// 타임프레임
    pub timeframe: Timeframe,
    /// 캔들 시작 시간
    pub open_time: DateTime<Utc>,
    /// 시가
    pub open: Price,
    /// 고가
    pub high: Price,
    /// 저가
    pub low: Price,
    /// 종가
    pub close: Price,
    /// 거래량 (기준 자산 단위)
    pub volume: Quantity,
}

impl Kline {
    /// 캔들 종료 시각 (다음 캔들의 시작 시각).
    pub fn close_time(&self) -> TraderResult<DateTime<Utc>> {
        self.timeframe.next_boundary(self.open_time)
    }

    /// `now` 시점에 이 캔들이 닫혔는지 확인합니다.
    ///
    /// 아직 진행 중인 마지막 캔들을 분석에서 제외할 때 사용합니다.
    pub fn is_closed_at(&self, now: DateTime<Utc>) -> TraderResult<bool> {
        Ok(self.close_time()? <= now)
    }

    /// `open_time`이 타임프레임 경계에 정렬되어 있는지 확인합니다.
    pub fn is_aligned(&self) -> bool {
        self.timeframe.is_boundary(self.open_time)
    }
}

/// 실시간 시세 데이터.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    /// 거래쌍
    pub pair: String,
    /// 최우선 매수 호가
    pub bid: Price,
    /// 최우선 매도 호가
    pub ask: Price,
    /// 최근 체결가
    pub last: Price,
    /// 24시간 거래량
    pub volume_24h: Quantity,
    /// 타임스탬프
    pub timestamp: DateTime<Utc>,
}

impl Ticker {
    /// 매수/매도 스프레드를 반환합니다.
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// 중간 가격을 반환합니다.
    pub fn mid_price(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::from(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn kline(open_time: DateTime<Utc>) -> Kline {
        Kline {
            pair: "BTC/USDT".to_string(),
            timeframe: Timeframe::M5,
            open_time,
            open: dec!(100),
            high: dec!(110),
            low: dec!(95),
            close: dec!(105),
            volume: dec!(3.5),
        }
    }

    #[test]
    fn test_kline_close_detection() {
        let open = Utc.with_ymd_and_hms(2021, 1, 1, 0, 5, 0).unwrap();
        let k = kline(open);

        assert!(k.is_aligned());
        assert_eq!(
            k.close_time().unwrap(),
            Utc.with_ymd_and_hms(2021, 1, 1, 0, 10, 0).unwrap()
        );
        assert!(!k
            .is_closed_at(Utc.with_ymd_and_hms(2021, 1, 1, 0, 9, 59).unwrap())
            .unwrap());
        assert!(k
            .is_closed_at(Utc.with_ymd_and_hms(2021, 1, 1, 0, 10, 0).unwrap())
            .unwrap());
    }

    #[test]
    fn test_kline_unaligned() {
        let k = kline(Utc.with_ymd_and_hms(2021, 1, 1, 0, 7, 0).unwrap());
        assert!(!k.is_aligned());
    }

    #[test]
    fn test_ticker_spread() {
        let t = Ticker {
            pair: "ETH/USDT".to_string(),
            bid: dec!(99),
            ask: dec!(101),
            last: dec!(100),
            volume_24h: dec!(1000),
            timestamp: Utc::now(),
        };
        assert_eq!(t.spread(), dec!(2));
        assert_eq!(t.mid_price(), dec!(100));
    }
}
