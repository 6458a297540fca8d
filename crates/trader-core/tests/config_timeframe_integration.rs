//! 기본 설정 파일과 캔들 경계 계산 통합 테스트

use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use trader_core::{AppConfig, Kline, LogConfig, LogFormat, RetryBudgetConfig, Timeframe};

const DEFAULT_CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/default.toml");

#[test]
fn test_default_config_file_matches_builtin_defaults() {
    let config = AppConfig::load(DEFAULT_CONFIG).expect("default config should load");

    assert_eq!(config.retry.exchange_call, RetryBudgetConfig::exchange_call());
    assert_eq!(config.retry.order_fetch, RetryBudgetConfig::order_fetch());
    assert_eq!(config.exchange("kraken").rate_limit_ms, Some(3000));
    assert!(config.catalogue.blacklist.is_empty());

    let log = LogConfig::from_config(&config.logging);
    assert_eq!(log.format, LogFormat::Pretty);
}

#[test]
fn test_kline_close_time_follows_timeframe() {
    let open_time = Utc.with_ymd_and_hms(2024, 3, 1, 4, 0, 0).unwrap();
    let kline = Kline {
        pair: "BTC/USDT".to_string(),
        timeframe: Timeframe::H4,
        open_time,
        open: dec!(60000),
        high: dec!(61000),
        low: dec!(59000),
        close: dec!(60500),
        volume: dec!(12.5),
    };

    let close_time = kline.close_time().unwrap();
    assert_eq!(close_time, Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap());
    assert!(kline.is_aligned());
    assert!(!kline.is_closed_at(close_time - chrono::Duration::seconds(1)).unwrap());
    assert!(kline.is_closed_at(close_time).unwrap());
}

#[test]
fn test_kline_timeframe_serializes_as_string() {
    let kline = Kline {
        pair: "ETH/USDT".to_string(),
        timeframe: Timeframe::M15,
        open_time: Utc.with_ymd_and_hms(2024, 3, 1, 0, 15, 0).unwrap(),
        open: dec!(3000),
        high: dec!(3010),
        low: dec!(2990),
        close: dec!(3005),
        volume: dec!(100),
    };

    let json = serde_json::to_value(&kline).unwrap();
    assert_eq!(json["timeframe"], "15m");

    let back: Kline = serde_json::from_value(json).unwrap();
    assert_eq!(back, kline);
}
