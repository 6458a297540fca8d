//! 재시도 예산과 백오프 정책.
//!
//! `next_delay`는 (시도 번호, 에러 분류, 예산)만으로 결정되는 순수 함수입니다.
//! 지터는 여기서 더하지 않고 실행기가 결정된 대기 시간 위에 덧붙입니다.
//!
//! | 분류 | 결정 |
//! |------|------|
//! | `Operational`, `InsufficientFunds`, `InvalidOrder` | 항상 포기 |
//! | `Temporary`, `RetryableOrder` | `base * 2^(n-1)` (최대 `max_delay`) |
//! | `DDosProtection` | 위와 같되 `ddos_floor()`와 거래소 제안 대기 시간 이상 |

use std::time::Duration;

use rand::Rng;
use trader_core::{AppConfig, RetryBudgetConfig, TraderError, TraderResult};

use crate::error::ErrorKind;

/// 재시도 예산.
///
/// 호출 유형(일반 호출 / 주문 호출)마다 하나씩 만들어 실행기에 넘깁니다.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryBudget {
    /// 최대 재시도 횟수 (최초 시도 제외)
    pub max_attempts: u32,
    /// 첫 재시도 대기 시간
    pub base_delay: Duration,
    /// 지수 증가 상한
    pub max_delay: Duration,
    /// Rate limit 응답 시 최소 대기 시간 (`base_delay`보다 커야 함)
    pub ddos_min_delay: Duration,
    /// 지터 비율 (0.0 ~ 1.0)
    pub jitter: f64,
}

impl RetryBudget {
    /// 지터 없는 예산을 생성합니다.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            ddos_min_delay: (base_delay * 2).max(Duration::from_secs(5)),
            jitter: 0.0,
        }
    }

    /// 일반 거래소 호출 기본 예산.
    pub fn exchange_call() -> Self {
        Self::from(&RetryBudgetConfig::exchange_call())
    }

    /// 주문 호출 기본 예산.
    pub fn order_fetch() -> Self {
        Self::from(&RetryBudgetConfig::order_fetch())
    }

    /// Rate limit 최소 대기 시간을 설정합니다.
    pub fn with_ddos_min_delay(mut self, delay: Duration) -> Self {
        self.ddos_min_delay = delay;
        self
    }

    /// 지터 비율을 설정합니다 (0.0 ~ 1.0으로 제한).
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// 예산 값 검증.
    pub fn validate(&self) -> TraderResult<()> {
        if self.max_attempts == 0 {
            return Err(TraderError::InvalidInput(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_delay < self.base_delay {
            return Err(TraderError::InvalidInput(format!(
                "max_delay {:?} is smaller than base_delay {:?}",
                self.max_delay, self.base_delay
            )));
        }
        if self.ddos_min_delay <= self.base_delay {
            return Err(TraderError::InvalidInput(format!(
                "ddos_min_delay {:?} must exceed base_delay {:?}",
                self.ddos_min_delay, self.base_delay
            )));
        }
        Ok(())
    }

    /// 결정된 대기 시간에 `[0, jitter * delay]` 범위의 무작위 값을 더합니다.
    ///
    /// 동시에 재시도하는 호출들이 같은 순간에 몰리지 않도록 합니다.
    /// 대기 시간을 줄이지는 않으므로 최소 대기 시간 규칙은 유지됩니다.
    pub fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let extra = delay.mul_f64(self.jitter);
        let extra_ms = extra.as_millis() as u64;
        if extra_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=extra_ms))
    }

    /// Rate limit 응답 시 실제로 적용되는 최소 대기 시간.
    ///
    /// `ddos_min_delay`가 잘못 설정되어도 일반 재시도의 첫 대기 시간보다는 항상 깁니다.
    pub fn ddos_floor(&self) -> Duration {
        self.ddos_min_delay
            .max(self.base_delay.saturating_mul(2))
            .max(Duration::from_millis(1))
    }

    fn exponential(&self, number: u32) -> Duration {
        let exponent = number.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

impl From<&RetryBudgetConfig> for RetryBudget {
    fn from(config: &RetryBudgetConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            ddos_min_delay: Duration::from_millis(config.ddos_min_delay_ms),
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }
}

/// 거래소 하나에 대한 (일반 호출, 주문 호출) 예산.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeBudgets {
    /// 시세/캔들/잔고
    pub exchange_call: RetryBudget,
    /// 주문 제출/조회/취소
    pub order_fetch: RetryBudget,
}

impl Default for ExchangeBudgets {
    fn default() -> Self {
        Self {
            exchange_call: RetryBudget::exchange_call(),
            order_fetch: RetryBudget::order_fetch(),
        }
    }
}

impl ExchangeBudgets {
    /// 두 예산을 모두 검증합니다.
    pub fn validate(&self) -> TraderResult<()> {
        self.exchange_call
            .validate()
            .map_err(|e| TraderError::Config(format!("exchange_call: {}", e)))?;
        self.order_fetch
            .validate()
            .map_err(|e| TraderError::Config(format!("order_fetch: {}", e)))
    }

    /// 설정에서 거래소별 예산을 결정합니다.
    ///
    /// 거래소별 오버라이드가 있으면 전역 예산 대신 사용하고, `rate_limit_ms` 힌트는
    /// Rate limit 최소 대기 시간의 하한으로 적용합니다.
    pub fn for_exchange(config: &AppConfig, exchange: &str) -> Self {
        let overrides = config.exchange(exchange);
        let pick = |specific: Option<&RetryBudgetConfig>, global: &RetryBudgetConfig| {
            let mut budget = RetryBudget::from(specific.unwrap_or(global));
            if let Some(hint) = overrides.rate_limit_ms {
                budget.ddos_min_delay = budget.ddos_min_delay.max(Duration::from_millis(hint));
            }
            budget
        };

        Self {
            exchange_call: pick(overrides.retry.as_ref(), &config.retry.exchange_call),
            order_fetch: pick(overrides.order_retry.as_ref(), &config.retry.order_fetch),
        }
    }
}

/// 재시도 루프의 한 회차.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attempt {
    /// 방금 실패한 시도 번호 (1부터 시작)
    pub number: u32,
    /// 실패 분류
    pub kind: ErrorKind,
    /// 거래소가 제안한 대기 시간
    pub retry_after: Option<Duration>,
    /// 지금까지 대기한 총 시간
    pub elapsed: Duration,
}

/// 백오프 결정.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// 주어진 시간만큼 대기 후 재시도
    Retry(Duration),
    /// 포기
    GiveUp,
}

/// 다음 재시도까지의 대기 시간을 결정합니다.
pub fn next_delay(attempt: &Attempt, budget: &RetryBudget) -> Decision {
    if !attempt.kind.is_retryable() || attempt.number > budget.max_attempts {
        return Decision::GiveUp;
    }

    let delay = budget.exponential(attempt.number);
    match attempt.kind {
        ErrorKind::DDosProtection => {
            let floor = budget.ddos_floor().max(attempt.retry_after.unwrap_or_default());
            Decision::Retry(delay.max(floor))
        }
        _ => Decision::Retry(delay),
    }
}
