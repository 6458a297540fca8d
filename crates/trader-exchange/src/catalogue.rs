//! 거래소 카탈로그.
//!
//! 알려진 거래소 ID, 사용 불가 거래소(사유 포함), 공식 지원 거래소를 정적 데이터로
//! 제공합니다. 모든 조회는 재시도하지 않으며 "없음" 외에는 실패하지 않습니다.

use std::collections::{BTreeMap, BTreeSet};

use trader_core::AppConfig;

/// 거래소 추상화 계층이 알고 있는 거래소 ID.
pub const KNOWN_EXCHANGES: &[&str] = &[
    "aax", "ascendex", "bequant", "bibox", "bigone", "binance", "binancecoinm", "binanceus",
    "binanceusdm", "bitbank", "bitfinex", "bitflyer", "bitget", "bithumb", "bitmart", "bitmex",
    "bitpanda", "bitso", "bitstamp", "bittrex", "bitvavo", "bybit", "cex", "coinbase",
    "coinbasepro", "coincheck", "coinex", "cryptocom", "deribit", "digifinex", "exmo", "gateio",
    "gemini", "hitbtc", "hitbtc2", "hollaex", "huobi", "huobijp", "kraken", "kucoin", "lbank",
    "mexc", "ndax", "okcoin", "okx", "phemex", "poloniex", "probit", "upbit", "wavesexchange",
    "whitebit", "woo", "zaif", "zonda",
];

/// 이 시스템과 함께 사용할 수 없는 거래소와 사유.
pub const BAD_EXCHANGES: &[(&str, &str)] = &[
    ("bitmex", "Various reasons."),
    ("bitstamp", "Does not provide OHLCV history."),
    (
        "hitbtc",
        "This API cannot be used. Use the `hitbtc2` exchange id to access this exchange.",
    ),
    ("phemex", "Does not provide OHLCV history."),
    (
        "poloniex",
        "Does not provide a fetch_order endpoint covering both open and closed orders.",
    ),
];

/// 공식 지원(테스트 완료) 거래소.
pub const OFFICIALLY_SUPPORTED: &[&str] = &["binance", "bittrex", "kraken"];

/// 사용 불가 거래소인지 확인합니다.
pub fn is_exchange_bad(exchange: &str) -> bool {
    get_exchange_bad_reason(exchange).is_some()
}

/// 사용 불가 사유. 사용 가능한 거래소면 `None`.
pub fn get_exchange_bad_reason(exchange: &str) -> Option<&'static str> {
    BAD_EXCHANGES
        .iter()
        .find(|(name, _)| *name == exchange)
        .map(|(_, reason)| *reason)
}

/// 거래소 추상화 계층이 아는 거래소인지 확인합니다.
pub fn is_exchange_known(exchange: &str) -> bool {
    KNOWN_EXCHANGES.contains(&exchange)
}

/// 공식 지원 거래소인지 확인합니다.
pub fn is_exchange_officially_supported(exchange: &str) -> bool {
    OFFICIALLY_SUPPORTED.contains(&exchange)
}

/// 사용 가능한 거래소 목록 (알려진 거래소 중 사용 불가 목록 제외).
pub fn available_exchanges() -> Vec<&'static str> {
    KNOWN_EXCHANGES
        .iter()
        .copied()
        .filter(|name| !is_exchange_bad(name))
        .collect()
}

/// 설정의 차단 목록과 거래소 활성화 여부를 정적 데이터 위에 합친 카탈로그.
#[derive(Debug, Clone, Default)]
pub struct ExchangeCatalogue {
    blacklist: BTreeMap<String, String>,
    disabled: BTreeSet<String>,
}

impl ExchangeCatalogue {
    /// 정적 데이터만 사용하는 카탈로그.
    pub fn new() -> Self {
        Self::default()
    }

    /// 설정의 `catalogue.blacklist`와 `exchanges.<id>.enabled`를 합칩니다.
    ///
    /// 같은 거래소가 정적 목록에도 있으면 설정의 사유를 사용합니다.
    pub fn from_config(config: &AppConfig) -> Self {
        let disabled: BTreeSet<String> = config
            .exchanges
            .iter()
            .filter(|(_, exchange)| !exchange.enabled)
            .map(|(name, _)| name.clone())
            .collect();
        if !disabled.is_empty() {
            tracing::debug!(disabled = ?disabled, "Exchanges disabled by configuration");
        }

        Self {
            blacklist: config
                .catalogue
                .blacklist
                .iter()
                .map(|(name, reason)| (name.clone(), reason.clone()))
                .collect(),
            disabled,
        }
    }

    /// 사용 불가 사유.
    pub fn bad_reason(&self, exchange: &str) -> Option<&str> {
        self.blacklist
            .get(exchange)
            .map(String::as_str)
            .or_else(|| get_exchange_bad_reason(exchange))
    }

    /// 사용 불가 거래소인지 확인합니다.
    pub fn is_bad(&self, exchange: &str) -> bool {
        self.bad_reason(exchange).is_some()
    }

    /// 설정에서 비활성화되지 않았는지 확인합니다. 설정에 없는 거래소는 활성입니다.
    pub fn is_enabled(&self, exchange: &str) -> bool {
        !self.disabled.contains(exchange)
    }

    /// 공식 지원 거래소인지 확인합니다.
    pub fn is_officially_supported(&self, exchange: &str) -> bool {
        is_exchange_officially_supported(exchange)
    }

    /// 사용 가능한 거래소 목록 (사용 불가 및 비활성 거래소 제외).
    pub fn available(&self) -> Vec<&'static str> {
        KNOWN_EXCHANGES
            .iter()
            .copied()
            .filter(|name| !self.is_bad(name) && self.is_enabled(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use trader_core::ExchangeConfig;

    #[test]
    fn test_static_lookups() {
        assert!(is_exchange_bad("bitmex"));
        assert!(!is_exchange_bad("binance"));
        assert_eq!(
            get_exchange_bad_reason("phemex"),
            Some("Does not provide OHLCV history.")
        );
        assert_eq!(get_exchange_bad_reason("kraken"), None);

        assert!(is_exchange_known("kraken"));
        assert!(!is_exchange_known("nonexistent"));

        assert!(is_exchange_officially_supported("binance"));
        assert!(!is_exchange_officially_supported("kucoin"));
    }

    #[test]
    fn test_available_excludes_bad() {
        let available = available_exchanges();
        assert!(available.contains(&"binance"));
        assert!(!available.contains(&"bitmex"));
        assert_eq!(available.len(), KNOWN_EXCHANGES.len() - BAD_EXCHANGES.len());
    }

    #[test]
    fn test_bad_exchanges_are_known() {
        for (name, _) in BAD_EXCHANGES {
            assert!(is_exchange_known(name), "{}", name);
        }
        for name in OFFICIALLY_SUPPORTED {
            assert!(is_exchange_known(name) && !is_exchange_bad(name), "{}", name);
        }
    }

    #[test]
    fn test_catalogue_from_config() {
        let mut config = AppConfig::default();
        config.catalogue.blacklist = HashMap::from([
            ("kucoin".to_string(), "maintenance".to_string()),
            ("bitmex".to_string(), "local policy".to_string()),
        ]);
        let catalogue = ExchangeCatalogue::from_config(&config);

        assert_eq!(catalogue.bad_reason("kucoin"), Some("maintenance"));
        assert_eq!(catalogue.bad_reason("bitmex"), Some("local policy"));
        assert_eq!(
            catalogue.bad_reason("poloniex"),
            get_exchange_bad_reason("poloniex")
        );
        assert!(!catalogue.available().contains(&"kucoin"));
        assert!(catalogue.available().contains(&"binance"));
    }

    #[test]
    fn test_disabled_exchange_is_not_available() {
        let mut config = AppConfig::default();
        config.exchanges.insert(
            "kraken".to_string(),
            ExchangeConfig {
                enabled: false,
                ..Default::default()
            },
        );
        config
            .exchanges
            .insert("binance".to_string(), ExchangeConfig::default());
        let catalogue = ExchangeCatalogue::from_config(&config);

        assert!(!catalogue.is_enabled("kraken"));
        assert!(catalogue.is_enabled("binance"));
        assert!(catalogue.is_enabled("bybit"));
        assert!(!catalogue.is_bad("kraken"));
        assert!(!catalogue.available().contains(&"kraken"));
        assert!(catalogue.available().contains(&"binance"));
        assert_eq!(catalogue.available().len(), available_exchanges().len() - 1);
    }
}
