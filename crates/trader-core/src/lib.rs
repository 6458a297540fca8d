//! # Trader Core
//!
//! 거래소 호출 계층이 공유하는 핵심 타입을 제공합니다:
//! - 타임프레임 및 캔들 경계 계산
//! - 캔들/시세/주문/마켓 도메인 타입
//! - 설정 관리 (재시도 예산, 거래소별 오버라이드, 카탈로그)
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
