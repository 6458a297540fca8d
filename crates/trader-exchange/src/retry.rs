//! 재시도 실행기.
//!
//! 거래소 호출 하나를 분류기와 백오프 정책으로 감싸는 재시도 루프입니다.
//! 두 가지 실행 형태를 제공합니다:
//!
//! - [`RetryExecutor::execute`]: 비동기 형태. 대기 중에도 같은 런타임의 다른 호출은
//!   계속 진행되며, 대기는 `CancellationToken`과 경쟁합니다.
//! - [`RetryExecutor::execute_blocking`]: 블로킹 형태. 호출 스레드만 잠듭니다.
//!
//! 두 형태 모두 같은 [`RetryLoop`] 상태 기계를 사용하므로 분류와 백오프 규칙은
//! 항상 같고, 다른 점은 대기 방식뿐입니다.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::backoff::{next_delay, Attempt, Decision, RetryBudget};
use crate::error::{CallCategory, ErrorKind, ExchangeError};
use crate::telemetry::{Outcome, OutcomeEvent, RetryEvent, RetryTelemetry, TracingTelemetry};
use crate::traits::ExchangeResult;

/// 재시도 실행기의 최종 에러.
///
/// 포기한 경우에도 원래 분류와 시도 횟수가 유지되므로, 호출자는 "rate limit으로 계속
/// 실패"와 "영구적으로 잘못된 주문"을 구분할 수 있습니다.
#[derive(Debug, Error)]
pub enum CallError {
    /// 재시도 불가 에러 또는 예산 소진
    #[error("{operation} on {exchange} failed after {attempts} attempt(s) [{kind}]: {source}")]
    Failed {
        exchange: String,
        operation: String,
        kind: ErrorKind,
        attempts: u32,
        source: ExchangeError,
    },

    /// 외부에서 취소됨
    #[error("{operation} on {exchange} cancelled after {attempts} attempt(s)")]
    Cancelled {
        exchange: String,
        operation: String,
        attempts: u32,
    },
}

impl CallError {
    /// 최종 분류. 취소된 경우 `None`.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            CallError::Failed { kind, .. } => Some(*kind),
            CallError::Cancelled { .. } => None,
        }
    }

    /// 수행한 시도 횟수.
    pub fn attempts(&self) -> u32 {
        match self {
            CallError::Failed { attempts, .. } | CallError::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// 취소 여부.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CallError::Cancelled { .. })
    }

    /// 마지막 원시 실패.
    pub fn exchange_error(&self) -> Option<&ExchangeError> {
        match self {
            CallError::Failed { source, .. } => Some(source),
            CallError::Cancelled { .. } => None,
        }
    }
}

/// 재시도 실행 결과 타입.
pub type CallResult<T> = Result<T, CallError>;

/// 호출 식별 정보 (로깅과 분류 보정에 사용).
#[derive(Debug, Clone, Copy)]
pub struct CallInfo<'a> {
    /// 거래소 이름
    pub exchange: &'a str,
    /// 작업 이름
    pub operation: &'a str,
    /// 호출 유형
    pub category: CallCategory,
}

impl<'a> CallInfo<'a> {
    /// 새 호출 정보.
    pub fn new(exchange: &'a str, operation: &'a str, category: CallCategory) -> Self {
        Self {
            exchange,
            operation,
            category,
        }
    }
}

/// 블로킹 대기 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    /// 대기 시간 경과
    Elapsed,
    /// 대기 중 취소됨
    Cancelled,
}

/// 블로킹 형태에서 사용하는 대기 방식.
pub trait BlockingSleeper: Send + Sync {
    /// `delay`만큼 호출 스레드를 재웁니다. 취소되면 즉시 돌아옵니다.
    fn sleep(&self, delay: Duration, cancel: &CancellationToken) -> SleepOutcome;
}

/// 짧은 구간으로 나누어 잠들며 취소 여부를 확인하는 기본 구현.
#[derive(Debug, Clone, Copy)]
pub struct ThreadSleeper {
    slice: Duration,
}

impl Default for ThreadSleeper {
    fn default() -> Self {
        Self {
            slice: Duration::from_millis(50),
        }
    }
}

impl ThreadSleeper {
    /// 취소 확인 간격을 지정합니다.
    pub fn with_slice(slice: Duration) -> Self {
        Self {
            slice: slice.max(Duration::from_millis(1)),
        }
    }
}

impl BlockingSleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration, cancel: &CancellationToken) -> SleepOutcome {
        let deadline = Instant::now() + delay;
        loop {
            if cancel.is_cancelled() {
                return SleepOutcome::Cancelled;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return SleepOutcome::Elapsed;
            }
            std::thread::sleep(remaining.min(self.slice));
        }
    }
}

/// 재시도 실행기.
///
/// 예산 하나와 텔레메트리 싱크 하나를 가집니다. 호출 유형마다 별도 인스턴스를 만듭니다.
#[derive(Clone)]
pub struct RetryExecutor {
    budget: RetryBudget,
    telemetry: Arc<dyn RetryTelemetry>,
    sleeper: Arc<dyn BlockingSleeper>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

impl RetryExecutor {
    /// 새 실행기.
    pub fn new(budget: RetryBudget, telemetry: Arc<dyn RetryTelemetry>) -> Self {
        Self {
            budget,
            telemetry,
            sleeper: Arc::new(ThreadSleeper::default()),
        }
    }

    /// `tracing` 텔레메트리를 사용하는 실행기.
    pub fn with_tracing(budget: RetryBudget) -> Self {
        Self::new(budget, Arc::new(TracingTelemetry))
    }

    /// 블로킹 대기 방식을 교체합니다.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn BlockingSleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// 예산.
    pub fn budget(&self) -> &RetryBudget {
        &self.budget
    }

    /// 비동기 형태로 실행합니다.
    ///
    /// `op`는 시도마다 새 future를 만들어야 합니다. 대기 중 `cancel`이 취소되면
    /// 추가 시도 없이 `CallError::Cancelled`를 반환합니다.
    pub async fn execute<T, F, Fut>(
        &self,
        call: &CallInfo<'_>,
        cancel: &CancellationToken,
        mut op: F,
    ) -> CallResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ExchangeResult<T>>,
    {
        let mut state = RetryLoop::new(self, call);
        loop {
            if cancel.is_cancelled() {
                return Err(state.cancelled());
            }
            state.begin_attempt();
            let result = op().await;
            match state.record(result) {
                Step::Done(result) => return result,
                Step::Wait(delay) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(state.cancelled()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// 블로킹 형태로 실행합니다.
    ///
    /// 재시도 대기 동안 호출 스레드만 잠듭니다. 비동기 런타임 워커 스레드에서
    /// 호출하면 안 됩니다.
    pub fn execute_blocking<T, F>(
        &self,
        call: &CallInfo<'_>,
        cancel: &CancellationToken,
        mut op: F,
    ) -> CallResult<T>
    where
        F: FnMut() -> ExchangeResult<T>,
    {
        let mut state = RetryLoop::new(self, call);
        loop {
            if cancel.is_cancelled() {
                return Err(state.cancelled());
            }
            state.begin_attempt();
            let result = op();
            match state.record(result) {
                Step::Done(result) => return result,
                Step::Wait(delay) => {
                    if self.sleeper.sleep(delay, cancel) == SleepOutcome::Cancelled {
                        return Err(state.cancelled());
                    }
                }
            }
        }
    }
}

enum Step<T> {
    Done(CallResult<T>),
    Wait(Duration),
}

/// 두 실행 형태가 공유하는 재시도 상태 기계.
struct RetryLoop<'a> {
    budget: &'a RetryBudget,
    telemetry: &'a dyn RetryTelemetry,
    call: &'a CallInfo<'a>,
    attempts: u32,
    waited: Duration,
}

impl<'a> RetryLoop<'a> {
    fn new(executor: &'a RetryExecutor, call: &'a CallInfo<'a>) -> Self {
        Self {
            budget: &executor.budget,
            telemetry: executor.telemetry.as_ref(),
            call,
            attempts: 0,
            waited: Duration::ZERO,
        }
    }

    fn begin_attempt(&mut self) {
        self.attempts += 1;
    }

    fn record<T>(&mut self, result: ExchangeResult<T>) -> Step<T> {
        let error = match result {
            Ok(value) => {
                self.emit_outcome(Outcome::Success);
                return Step::Done(Ok(value));
            }
            Err(error) => error,
        };

        let kind = ErrorKind::classify_for(&error, self.call.category);
        let attempt = Attempt {
            number: self.attempts,
            kind,
            retry_after: error.retry_after(),
            elapsed: self.waited,
        };

        match next_delay(&attempt, self.budget) {
            Decision::GiveUp => {
                self.emit_outcome(Outcome::GaveUp {
                    kind,
                    error: &error,
                });
                Step::Done(Err(CallError::Failed {
                    exchange: self.call.exchange.to_string(),
                    operation: self.call.operation.to_string(),
                    kind,
                    attempts: self.attempts,
                    source: error,
                }))
            }
            Decision::Retry(delay) => {
                let delay = self.budget.apply_jitter(delay);
                self.telemetry.on_retry(&RetryEvent {
                    exchange: self.call.exchange,
                    operation: self.call.operation,
                    attempt: self.attempts,
                    kind,
                    delay,
                    error: &error,
                });
                self.waited += delay;
                Step::Wait(delay)
            }
        }
    }

    fn cancelled(&self) -> CallError {
        self.emit_outcome(Outcome::Cancelled);
        CallError::Cancelled {
            exchange: self.call.exchange.to_string(),
            operation: self.call.operation.to_string(),
            attempts: self.attempts,
        }
    }

    fn emit_outcome(&self, outcome: Outcome<'_>) {
        self.telemetry.on_outcome(&OutcomeEvent {
            exchange: self.call.exchange,
            operation: self.call.operation,
            attempts: self.attempts,
            waited: self.waited,
            outcome,
        });
    }
}
