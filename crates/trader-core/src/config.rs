//! 설정 관리.
//!
//! 로깅, 재시도 예산, 거래소별 오버라이드, 거래소 카탈로그 설정을 정의합니다.
//! 모든 섹션은 기본값을 가지므로 빈 설정 파일로도 로드할 수 있습니다.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{TraderError, TraderResult};

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 호출 유형별 재시도 예산
    #[serde(default)]
    pub retry: RetryConfig,
    /// 거래소별 설정 (키: 거래소 ID)
    #[serde(default)]
    pub exchanges: HashMap<String, ExchangeConfig>,
    /// 거래소 카탈로그 설정
    #[serde(default)]
    pub catalogue: CatalogueConfig,
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
    /// 상세도 (-v 개수). 0보다 크면 `level`보다 우선합니다.
    #[serde(default)]
    pub verbosity: u8,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            verbosity: 0,
        }
    }
}

/// 재시도 예산 설정 (밀리초 단위).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RetryBudgetConfig {
    /// 최대 재시도 횟수
    pub max_attempts: u32,
    /// 첫 재시도 대기 시간 (밀리초)
    pub base_delay_ms: u64,
    /// 최대 대기 시간 (밀리초)
    pub max_delay_ms: u64,
    /// Rate limit 응답 시 최소 대기 시간 (밀리초)
    #[serde(default = "default_ddos_min_delay_ms")]
    pub ddos_min_delay_ms: u64,
    /// 지터 비율 (0.0 ~ 1.0)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_ddos_min_delay_ms() -> u64 {
    5_000
}
fn default_jitter() -> f64 {
    0.1
}

impl RetryBudgetConfig {
    /// 일반 거래소 호출 기본값.
    pub fn exchange_call() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            ddos_min_delay_ms: default_ddos_min_delay_ms(),
            jitter: default_jitter(),
        }
    }

    /// 주문 조회/생성/취소 기본값 (일반 호출보다 관대함).
    pub fn order_fetch() -> Self {
        Self {
            max_attempts: 5,
            ..Self::exchange_call()
        }
    }

    /// 설정 값 검증.
    pub fn validate(&self, section: &str) -> TraderResult<()> {
        let fail = |msg: &str| Err(TraderError::Config(format!("{}: {}", section, msg)));

        if self.max_attempts == 0 {
            return fail("max_attempts는 1 이상이어야 합니다");
        }
        if self.base_delay_ms == 0 {
            return fail("base_delay_ms는 0일 수 없습니다");
        }
        if self.max_delay_ms < self.base_delay_ms {
            return fail("max_delay_ms는 base_delay_ms보다 작을 수 없습니다");
        }
        if self.ddos_min_delay_ms <= self.base_delay_ms {
            return fail("ddos_min_delay_ms는 base_delay_ms보다 커야 합니다");
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return fail("jitter는 0.0 ~ 1.0 범위여야 합니다");
        }
        Ok(())
    }
}

/// 호출 유형별 재시도 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// 시세/캔들/잔고 등 일반 호출
    #[serde(default = "RetryBudgetConfig::exchange_call")]
    pub exchange_call: RetryBudgetConfig,
    /// 주문 관련 호출
    #[serde(default = "RetryBudgetConfig::order_fetch")]
    pub order_fetch: RetryBudgetConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            exchange_call: RetryBudgetConfig::exchange_call(),
            order_fetch: RetryBudgetConfig::order_fetch(),
        }
    }
}

/// 거래소별 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    /// 이 거래소 활성화 여부
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 요청 간 최소 간격 힌트 (밀리초). Rate limit 대기의 하한으로 사용됩니다.
    #[serde(default)]
    pub rate_limit_ms: Option<u64>,
    /// 일반 호출 재시도 예산 오버라이드
    #[serde(default)]
    pub retry: Option<RetryBudgetConfig>,
    /// 주문 호출 재시도 예산 오버라이드
    #[serde(default)]
    pub order_retry: Option<RetryBudgetConfig>,
}

fn default_enabled() -> bool {
    true
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_limit_ms: None,
            retry: None,
            order_retry: None,
        }
    }
}

/// 거래소 카탈로그 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CatalogueConfig {
    /// 추가로 차단할 거래소 (키: 거래소 ID, 값: 사유)
    #[serde(default)]
    pub blacklist: HashMap<String, String>,
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> TraderResult<Self> {
        let builder = config::Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("TRADER")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> TraderResult<Self> {
        Self::load("config/default.toml")
    }

    /// 모든 재시도 예산을 검증합니다.
    pub fn validate(&self) -> TraderResult<()> {
        self.retry.exchange_call.validate("retry.exchange_call")?;
        self.retry.order_fetch.validate("retry.order_fetch")?;
        for (name, exchange) in &self.exchanges {
            if let Some(retry) = &exchange.retry {
                retry.validate(&format!("exchanges.{}.retry", name))?;
            }
            if let Some(retry) = &exchange.order_retry {
                retry.validate(&format!("exchanges.{}.order_retry", name))?;
            }
        }
        Ok(())
    }

    /// 거래소 설정 조회 (없으면 기본값).
    pub fn exchange(&self, name: &str) -> ExchangeConfig {
        self.exchanges.get(name).cloned().unwrap_or_default()
    }
}
