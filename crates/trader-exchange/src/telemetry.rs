//! 재시도 텔레메트리.
//!
//! 실행기는 전역 상태 대신 생성 시 주입된 `RetryTelemetry` 싱크로 이벤트를 보냅니다.
//! 기본 구현인 `TracingTelemetry`는 `tracing` 이벤트를 남기고, `RetryStats`는
//! 프로세스 단위 카운터를 유지합니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{ErrorKind, ExchangeError};

/// 재시도가 예약될 때마다 발생하는 이벤트.
#[derive(Debug, Clone, Copy)]
pub struct RetryEvent<'a> {
    /// 거래소 이름
    pub exchange: &'a str,
    /// 작업 이름 (예: "fetch_ticker")
    pub operation: &'a str,
    /// 실패한 시도 번호
    pub attempt: u32,
    /// 실패 분류
    pub kind: ErrorKind,
    /// 다음 시도까지 대기 시간 (지터 포함)
    pub delay: Duration,
    /// 원시 실패
    pub error: &'a ExchangeError,
}

/// 호출 종료 결과.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    /// 성공
    Success,
    /// 포기 (최종 분류와 원시 실패)
    GaveUp {
        kind: ErrorKind,
        error: &'a ExchangeError,
    },
    /// 외부 취소
    Cancelled,
}

/// 호출이 끝날 때 한 번 발생하는 이벤트.
#[derive(Debug, Clone, Copy)]
pub struct OutcomeEvent<'a> {
    /// 거래소 이름
    pub exchange: &'a str,
    /// 작업 이름
    pub operation: &'a str,
    /// 실제로 수행한 시도 횟수
    pub attempts: u32,
    /// 총 대기 시간
    pub waited: Duration,
    /// 결과
    pub outcome: Outcome<'a>,
}

/// 재시도 이벤트 싱크.
pub trait RetryTelemetry: Send + Sync {
    /// 재시도 예약.
    fn on_retry(&self, event: &RetryEvent<'_>);

    /// 호출 종료.
    fn on_outcome(&self, event: &OutcomeEvent<'_>);
}

/// `tracing`으로 이벤트를 기록하는 기본 싱크.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl RetryTelemetry for TracingTelemetry {
    fn on_retry(&self, event: &RetryEvent<'_>) {
        tracing::warn!(
            exchange = %event.exchange,
            operation = %event.operation,
            attempt = event.attempt,
            kind = %event.kind,
            delay_ms = event.delay.as_millis() as u64,
            error = %event.error,
            "Exchange call failed, retrying"
        );
    }

    fn on_outcome(&self, event: &OutcomeEvent<'_>) {
        match event.outcome {
            Outcome::Success if event.attempts > 1 => tracing::info!(
                exchange = %event.exchange,
                operation = %event.operation,
                attempts = event.attempts,
                waited_ms = event.waited.as_millis() as u64,
                "Exchange call recovered after retry"
            ),
            Outcome::Success => tracing::trace!(
                exchange = %event.exchange,
                operation = %event.operation,
                "Exchange call succeeded"
            ),
            Outcome::GaveUp { kind, error } => tracing::error!(
                exchange = %event.exchange,
                operation = %event.operation,
                attempts = event.attempts,
                kind = %kind,
                error = %error,
                "Exchange call gave up"
            ),
            Outcome::Cancelled => tracing::info!(
                exchange = %event.exchange,
                operation = %event.operation,
                attempts = event.attempts,
                "Exchange call cancelled"
            ),
        }
    }
}

/// 재시도 통계 카운터.
#[derive(Debug, Default)]
pub struct RetryStats {
    retries: AtomicU64,
    successes: AtomicU64,
    give_ups: AtomicU64,
    cancellations: AtomicU64,
    retries_by_kind: RwLock<HashMap<ErrorKind, u64>>,
}

/// `RetryStats`의 시점 스냅샷.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryStatsSnapshot {
    /// 예약된 재시도 수
    pub retries: u64,
    /// 성공한 호출 수
    pub successes: u64,
    /// 포기한 호출 수
    pub give_ups: u64,
    /// 취소된 호출 수
    pub cancellations: u64,
    /// 분류별 재시도 수
    pub retries_by_kind: HashMap<ErrorKind, u64>,
}

impl RetryStats {
    /// 새 카운터.
    pub fn new() -> Self {
        Self::default()
    }

    /// 현재 값을 읽습니다.
    pub fn snapshot(&self) -> RetryStatsSnapshot {
        RetryStatsSnapshot {
            retries: self.retries.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            give_ups: self.give_ups.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            retries_by_kind: self
                .retries_by_kind
                .read()
                .map(|m| m.clone())
                .unwrap_or_default(),
        }
    }
}

impl RetryTelemetry for RetryStats {
    fn on_retry(&self, event: &RetryEvent<'_>) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_kind) = self.retries_by_kind.write() {
            *by_kind.entry(event.kind).or_insert(0) += 1;
        }
    }

    fn on_outcome(&self, event: &OutcomeEvent<'_>) {
        let counter = match event.outcome {
            Outcome::Success => &self.successes,
            Outcome::GaveUp { .. } => &self.give_ups,
            Outcome::Cancelled => &self.cancellations,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// 여러 싱크로 같은 이벤트를 전달합니다.
#[derive(Clone, Default)]
pub struct Fanout {
    sinks: Vec<Arc<dyn RetryTelemetry>>,
}

impl Fanout {
    /// 빈 팬아웃.
    pub fn new() -> Self {
        Self::default()
    }

    /// 싱크를 추가합니다.
    pub fn with(mut self, sink: Arc<dyn RetryTelemetry>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl RetryTelemetry for Fanout {
    fn on_retry(&self, event: &RetryEvent<'_>) {
        for sink in &self.sinks {
            sink.on_retry(event);
        }
    }

    fn on_outcome(&self, event: &OutcomeEvent<'_>) {
        for sink in &self.sinks {
            sink.on_outcome(event);
        }
    }
}
