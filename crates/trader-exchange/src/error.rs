//! 거래소 에러 타입과 에러 분류기.
//!
//! `ExchangeError`는 거래소 호출이 실제로 돌려준 원시 실패이고, `ErrorKind`는
//! 재시도 여부를 결정하기 위한 분류 결과입니다. 분류는 순수 함수이며 모든 실패는
//! 정확히 하나의 `ErrorKind`로 매핑됩니다.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trader_core::TraderError;

/// 거래소 관련 에러.
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    NetworkError(String),

    /// 거래소 연결 끊김
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 거래소 점검/일시 장애 (5xx)
    #[error("Exchange not available: {0}")]
    ExchangeNotAvailable(String),

    /// 요청 한도 초과. 거래소가 대기 시간을 알려준 경우 `retry_after`에 담깁니다.
    #[error("Rate limit exceeded{}", retry_after_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// 인증 에러 (잘못된 API 키 등)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 권한 부족. 일부 거래소는 요청 과다 시에도 이 응답을 보냅니다.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// API 에러 코드
    #[error("API error {code}: {message}")]
    ApiError { code: i32, message: String },

    /// 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    ParseError(String),

    /// 잔고 부족
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// 유효하지 않은 주문 파라미터
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// 유효하지 않은 수량
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// 주문 거부됨
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// 주문을 찾을 수 없음
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// 심볼을 찾을 수 없음
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// 지원되지 않는 작업
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// 잘못된 입력 (호출 이전 단계의 검증 실패)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 알 수 없는 에러
    #[error("Unknown error: {0}")]
    Unknown(String),
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {:?})", d))
        .unwrap_or_default()
}

impl ExchangeError {
    /// 거래소가 제안한 대기 시간.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ExchangeError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// HTTP 상태 코드로부터 에러를 생성합니다.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 => ExchangeError::Unauthorized(body),
            403 => ExchangeError::PermissionDenied(body),
            404 => ExchangeError::NotSupported(body),
            408 => ExchangeError::Timeout(body),
            418 | 429 => ExchangeError::RateLimited { retry_after: None },
            500..=599 => ExchangeError::ExchangeNotAvailable(format!("HTTP {}: {}", status, body)),
            _ => ExchangeError::ApiError {
                code: i32::from(status),
                message: body,
            },
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            ExchangeError::NetworkError(err.to_string())
        } else if let Some(status) = err.status() {
            ExchangeError::from_status(status.as_u16(), err.to_string())
        } else if err.is_decode() {
            ExchangeError::ParseError(err.to_string())
        } else {
            ExchangeError::Unknown(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::ParseError(err.to_string())
    }
}

impl From<TraderError> for ExchangeError {
    fn from(err: TraderError) -> Self {
        ExchangeError::InvalidInput(err.to_string())
    }
}

/// 거래소 API 코드 중 요청 한도와 권한 에러를 구분할 수 없는 코드.
///
/// 보수적으로 요청 한도 초과로 취급합니다.
const AMBIGUOUS_API_CODES: [i32; 4] = [403, 418, 429, -1003];

/// 재시도 결정을 위한 에러 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 일시적 장애 (네트워크, 5xx, 타임아웃) - 재시도
    Temporary,
    /// 요청 한도 초과 / 차단 신호 - 더 긴 대기 후 재시도
    DDosProtection,
    /// 잔고 부족 - 재시도 안 함
    InsufficientFunds,
    /// 유효하지 않은 주문 - 재시도 안 함
    InvalidOrder,
    /// 주문 관련 일시 상태 - 주문 예산 안에서 재시도
    RetryableOrder,
    /// 설정/프로그래밍 에러 - 즉시 실패
    Operational,
}

impl ErrorKind {
    /// 원시 실패를 분류합니다.
    ///
    /// 매핑되지 않은 실패는 무한 재시도 대신 즉시 드러나도록 `Operational`로 분류됩니다.
    pub fn classify(error: &ExchangeError) -> Self {
        match error {
            ExchangeError::NetworkError(_)
            | ExchangeError::Disconnected(_)
            | ExchangeError::Timeout(_)
            | ExchangeError::ExchangeNotAvailable(_) => ErrorKind::Temporary,
            ExchangeError::RateLimited { .. } | ExchangeError::PermissionDenied(_) => {
                ErrorKind::DDosProtection
            }
            ExchangeError::ApiError { code, .. } if AMBIGUOUS_API_CODES.contains(code) => {
                ErrorKind::DDosProtection
            }
            ExchangeError::InsufficientBalance(_) => ErrorKind::InsufficientFunds,
            ExchangeError::InvalidOrder(_)
            | ExchangeError::InvalidQuantity(_)
            | ExchangeError::OrderRejected(_) => ErrorKind::InvalidOrder,
            ExchangeError::OrderNotFound(_) => ErrorKind::RetryableOrder,
            ExchangeError::Unauthorized(_)
            | ExchangeError::ApiError { .. }
            | ExchangeError::ParseError(_)
            | ExchangeError::SymbolNotFound(_)
            | ExchangeError::NotSupported(_)
            | ExchangeError::InvalidInput(_)
            | ExchangeError::Unknown(_) => ErrorKind::Operational,
        }
    }

    /// 호출 유형을 고려해 분류합니다.
    ///
    /// 주문 제출 중 일시적 장애가 나면 주문이 이미 거래소에 도달했을 수 있으므로
    /// `RetryableOrder`로 올려 주문 예산과 클라이언트 주문 ID 규칙을 따르게 합니다.
    /// 주문 조회가 아닌 호출에서의 `OrderNotFound`는 재시도할 이유가 없습니다.
    pub fn classify_for(error: &ExchangeError, category: CallCategory) -> Self {
        match (Self::classify(error), category) {
            (ErrorKind::Temporary, CallCategory::OrderPlacement) => ErrorKind::RetryableOrder,
            (ErrorKind::RetryableOrder, CallCategory::MarketData) => ErrorKind::Operational,
            (kind, _) => kind,
        }
    }

    /// 재시도 대상인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Temporary | ErrorKind::DDosProtection | ErrorKind::RetryableOrder
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Temporary => write!(f, "temporary"),
            ErrorKind::DDosProtection => write!(f, "ddos_protection"),
            ErrorKind::InsufficientFunds => write!(f, "insufficient_funds"),
            ErrorKind::InvalidOrder => write!(f, "invalid_order"),
            ErrorKind::RetryableOrder => write!(f, "retryable_order"),
            ErrorKind::Operational => write!(f, "operational"),
        }
    }
}

/// 호출 유형. 분류 보정과 재시도 예산 선택에 사용됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallCategory {
    /// 시세, 캔들, 잔고 등 부작용 없는 조회
    MarketData,
    /// 주문 조회/취소
    OrderQuery,
    /// 주문 제출 (부작용 있음)
    OrderPlacement,
}

impl CallCategory {
    /// 주문 예산을 사용하는 호출인지 확인합니다.
    pub fn uses_order_budget(&self) -> bool {
        !matches!(self, CallCategory::MarketData)
    }
}
