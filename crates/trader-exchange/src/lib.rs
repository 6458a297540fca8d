//! 거래소 호출 재시도 계층.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - Exchange trait: 거래소 capability 인터페이스
//! - 에러 분류기: 원시 실패를 재시도 결정용 `ErrorKind`로 매핑
//! - 백오프 정책: 호출 유형별 재시도 예산과 지수 백오프
//! - 재시도 실행기: 비동기/블로킹 두 형태, 취소 토큰 지원
//! - 재시도가 적용된 거래소 퍼사드
//! - 거래소 카탈로그 (알려진/사용 불가/공식 지원 거래소)

pub mod backoff;
pub mod catalogue;
pub mod error;
pub mod facade;
pub mod retry;
pub mod telemetry;
pub mod traits;

pub use backoff::{next_delay, Attempt, Decision, ExchangeBudgets, RetryBudget};
pub use catalogue::{
    available_exchanges, get_exchange_bad_reason, is_exchange_bad, is_exchange_known,
    is_exchange_officially_supported, ExchangeCatalogue,
};
pub use error::*;
pub use facade::{BlockingExchange, ResilientExchange};
pub use retry::{
    BlockingSleeper, CallError, CallInfo, CallResult, RetryExecutor, SleepOutcome, ThreadSleeper,
};
pub use telemetry::{
    Fanout, Outcome, OutcomeEvent, RetryEvent, RetryStats, RetryStatsSnapshot, RetryTelemetry,
    TracingTelemetry,
};
pub use traits::*;
pub use trader_core::{
    timeframe_to_minutes, timeframe_to_msecs, timeframe_to_next_date, timeframe_to_prev_date,
    timeframe_to_seconds, Timeframe,
};
