//! ResilientExchange / BlockingExchange integration tests against a scripted exchange.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;
use trader_core::{
    AppConfig, ExchangeConfig, Kline, OrderRequest, OrderStatus, OrderStatusType,
    RetryBudgetConfig, Side, Ticker, Timeframe, TraderError,
};
use trader_exchange::{
    Balance, BlockingExchange, ErrorKind, Exchange, ExchangeBudgets, ExchangeError,
    ExchangeResult, ResilientExchange, RetryBudget, RetryStats, RetryTelemetry,
};

/// Exchange whose failures are scripted per operation key.
///
/// Keys are `"<operation>"` or `"<operation>:<pair>"`; the pair-specific queue wins.
#[derive(Default)]
struct ScriptedExchange {
    failures: Mutex<HashMap<String, VecDeque<ExchangeError>>>,
    calls: Mutex<Vec<String>>,
    client_ids: Mutex<Vec<Option<String>>>,
}

impl ScriptedExchange {
    fn fail(self, key: &str, errors: impl IntoIterator<Item = ExchangeError>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .extend(errors);
        self
    }

    fn attempt(&self, operation: &str, pair: &str) -> ExchangeResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}", operation, pair));

        let mut failures = self.failures.lock().unwrap();
        let specific = format!("{}:{}", operation, pair);
        for key in [specific.as_str(), operation] {
            if let Some(err) = failures.get_mut(key).and_then(|q| q.pop_front()) {
                return Err(err);
            }
        }
        Ok(())
    }

    fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(&format!("{}:", operation)))
            .count()
    }
}

fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
}

#[async_trait]
impl Exchange for ScriptedExchange {
    fn name(&self) -> &str {
        "mockex"
    }

    async fn fetch_ticker(&self, pair: &str) -> ExchangeResult<Ticker> {
        self.attempt("fetch_ticker", pair)?;
        Ok(Ticker {
            pair: pair.to_string(),
            bid: dec!(99),
            ask: dec!(101),
            last: dec!(100),
            volume_24h: dec!(1000),
            timestamp: ts(0, 0, 0),
        })
    }

    async fn fetch_ohlcv(
        &self,
        pair: &str,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> ExchangeResult<Vec<Kline>> {
        self.attempt("fetch_ohlcv", pair)?;
        let mut open_time = timeframe.previous_boundary(since.unwrap_or_else(|| ts(0, 0, 0)))?;
        let mut klines = Vec::new();
        for _ in 0..limit.unwrap_or(3) {
            klines.push(Kline {
                pair: pair.to_string(),
                timeframe,
                open_time,
                open: dec!(100),
                high: dec!(110),
                low: dec!(90),
                close: dec!(105),
                volume: dec!(10),
            });
            open_time = timeframe.next_boundary(open_time)?;
        }
        Ok(klines)
    }

    async fn create_order(&self, request: &OrderRequest) -> ExchangeResult<String> {
        self.client_ids
            .lock()
            .unwrap()
            .push(request.client_order_id.clone());
        self.attempt("create_order", &request.pair)?;
        Ok("order-1".to_string())
    }

    async fn cancel_order(&self, pair: &str, _order_id: &str) -> ExchangeResult<()> {
        self.attempt("cancel_order", pair)
    }

    async fn fetch_order(&self, pair: &str, order_id: &str) -> ExchangeResult<OrderStatus> {
        self.attempt("fetch_order", pair)?;
        Ok(OrderStatus {
            order_id: order_id.to_string(),
            client_order_id: None,
            pair: pair.to_string(),
            status: OrderStatusType::Filled,
            filled_quantity: dec!(0.1),
            average_price: Some(dec!(100)),
            updated_at: ts(0, 0, 0),
        })
    }

    async fn fetch_balance(&self, asset: &str) -> ExchangeResult<Balance> {
        self.attempt("fetch_balance", asset)?;
        Ok(Balance {
            asset: asset.to_string(),
            free: dec!(10),
            locked: dec!(2),
        })
    }
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn timeout() -> ExchangeError {
    ExchangeError::Timeout("read timed out".to_string())
}

fn budgets() -> ExchangeBudgets {
    ExchangeBudgets {
        exchange_call: RetryBudget::new(3, secs(1), secs(10)),
        order_fetch: RetryBudget::new(5, secs(1), secs(10)),
    }
}

fn resilient(
    exchange: ScriptedExchange,
) -> (ResilientExchange<ScriptedExchange>, Arc<RetryStats>) {
    let stats = Arc::new(RetryStats::new());
    let telemetry: Arc<dyn RetryTelemetry> = stats.clone();
    let exchange = ResilientExchange::new(exchange, budgets(), telemetry).unwrap();
    (exchange, stats)
}

#[tokio::test(start_paused = true)]
async fn test_ticker_recovers_after_temporary_failures() {
    let (exchange, stats) =
        resilient(ScriptedExchange::default().fail("fetch_ticker", [timeout(), timeout()]));
    let started = tokio::time::Instant::now();

    let ticker = exchange.fetch_ticker("BTC/USDT").await.unwrap();

    assert_eq!(ticker.last, dec!(100));
    assert_eq!(exchange.inner().call_count("fetch_ticker"), 3);
    // 1s + 2s
    let elapsed = started.elapsed();
    assert!(elapsed >= secs(3) && elapsed < secs(4), "{:?}", elapsed);

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.retries, 2);
    assert_eq!(snapshot.successes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_generic_budget_gives_up_as_temporary() {
    let (exchange, stats) = resilient(
        ScriptedExchange::default().fail("fetch_balance", (0..10).map(|_| timeout())),
    );

    let err = exchange.fetch_balance("USDT").await.unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Temporary));
    assert_eq!(err.attempts(), 4);
    assert_eq!(exchange.inner().call_count("fetch_balance"), 4);
    assert_eq!(stats.snapshot().give_ups, 1);
}

#[tokio::test(start_paused = true)]
async fn test_insufficient_funds_is_single_attempt() {
    let (exchange, _) = resilient(ScriptedExchange::default().fail(
        "create_order",
        [ExchangeError::InsufficientBalance("need 5000 USDT".to_string())],
    ));
    let request = OrderRequest::market("BTC/USDT", Side::Buy, dec!(0.1));

    let err = exchange.create_order(request).await.unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::InsufficientFunds));
    assert_eq!(err.attempts(), 1);
    assert_eq!(exchange.inner().call_count("create_order"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_order_resubmission_keeps_client_id() {
    let (exchange, _) =
        resilient(ScriptedExchange::default().fail("create_order", [timeout(), timeout()]));
    let request = OrderRequest::limit("BTC/USDT", Side::Sell, dec!(0.1), dec!(50000));

    let order_id = exchange.create_order(request).await.unwrap();

    assert_eq!(order_id, "order-1");
    let ids = exchange.inner().client_ids.lock().unwrap().clone();
    assert_eq!(ids.len(), 3);
    assert!(ids[0].is_some());
    assert!(ids.iter().all(|id| *id == ids[0]));
}

#[tokio::test(start_paused = true)]
async fn test_explicit_client_id_is_preserved() {
    let (exchange, _) = resilient(ScriptedExchange::default());
    let request = OrderRequest::market("ETH/USDT", Side::Buy, dec!(1)).with_client_id("my-id");

    exchange.create_order(request).await.unwrap();

    let ids = exchange.inner().client_ids.lock().unwrap().clone();
    assert_eq!(ids, vec![Some("my-id".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_order_fetch_uses_larger_budget() {
    let not_found = || ExchangeError::OrderNotFound("order-1".to_string());
    let (exchange, _) = resilient(
        ScriptedExchange::default().fail("fetch_order", (0..5).map(|_| not_found())),
    );

    // 5 failures exceed the generic budget (3 retries) but fit the order budget (5 retries).
    let status = exchange.fetch_order("BTC/USDT", "order-1").await.unwrap();

    assert_eq!(status.status, OrderStatusType::Filled);
    assert_eq!(exchange.inner().call_count("fetch_order"), 6);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_waits_for_ddos_floor() {
    let (exchange, _) = resilient(ScriptedExchange::default().fail(
        "cancel_order",
        [ExchangeError::RateLimited {
            retry_after: Some(secs(8)),
        }],
    ));
    let started = tokio::time::Instant::now();

    exchange.cancel_order("BTC/USDT", "order-1").await.unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= secs(8) && elapsed < secs(9), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_ohlcv_many_is_concurrent_and_keyed_by_pair() {
    let (exchange, _) = resilient(
        ScriptedExchange::default()
            .fail("fetch_ohlcv:ETH/USDT", [timeout()])
            .fail("fetch_ohlcv:BTC/USDT", [timeout(), timeout()])
            .fail(
                "fetch_ohlcv:XYZ/USDT",
                [ExchangeError::SymbolNotFound("XYZ/USDT".to_string())],
            ),
    );
    let started = tokio::time::Instant::now();

    let results = exchange
        .fetch_ohlcv_many(
            &["XYZ/USDT", "ETH/USDT", "BTC/USDT"],
            Timeframe::M5,
            Some(ts(0, 7, 30)),
            Some(2),
        )
        .await;

    // Waits overlap: the slowest pair (1s + 2s) bounds the total.
    let elapsed = started.elapsed();
    assert!(elapsed >= secs(3) && elapsed < secs(4), "{:?}", elapsed);

    let pairs: Vec<_> = results.keys().cloned().collect();
    assert_eq!(pairs, vec!["BTC/USDT", "ETH/USDT", "XYZ/USDT"]);

    let btc = results["BTC/USDT"].as_ref().unwrap();
    assert_eq!(btc.len(), 2);
    assert_eq!(btc[0].open_time, ts(0, 5, 0));
    assert_eq!(btc[1].open_time, ts(0, 10, 0));
    assert!(btc.iter().all(Kline::is_aligned));

    let xyz = results["XYZ/USDT"].as_ref().unwrap_err();
    assert_eq!(xyz.kind(), Some(ErrorKind::Operational));
    assert_eq!(xyz.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scoped_cancel_during_backoff() {
    let (exchange, stats) = resilient(
        ScriptedExchange::default().fail("fetch_ticker", (0..10).map(|_| timeout())),
    );
    let token = CancellationToken::new();
    let scoped = exchange.scoped(token.clone());

    let cancel = async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        token.cancel();
    };
    let (result, ()) = tokio::join!(scoped.fetch_ticker("BTC/USDT"), cancel);

    let err = result.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.attempts(), 1);
    assert_eq!(exchange.inner().call_count("fetch_ticker"), 1);
    assert_eq!(stats.snapshot().cancellations, 1);

    // The original handle keeps its own token.
    assert!(!exchange.cancellation_token().is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_from_config_applies_exchange_overrides() {
    let mut config = AppConfig::default();
    config.exchanges.insert(
        "mockex".to_string(),
        ExchangeConfig {
            order_retry: Some(RetryBudgetConfig {
                max_attempts: 1,
                ..RetryBudgetConfig::order_fetch()
            }),
            ..Default::default()
        },
    );
    let exchange = ResilientExchange::from_config(
        ScriptedExchange::default().fail("fetch_order", (0..3).map(|_| timeout())),
        &config,
        Arc::new(RetryStats::new()),
    )
    .unwrap();

    let err = exchange.fetch_order("BTC/USDT", "order-1").await.unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Temporary));
    assert_eq!(err.attempts(), 2);
}

fn fast_budgets() -> ExchangeBudgets {
    let budget = RetryBudget::new(3, Duration::from_millis(10), Duration::from_millis(50))
        .with_ddos_min_delay(Duration::from_millis(100));
    ExchangeBudgets {
        exchange_call: budget.clone(),
        order_fetch: budget,
    }
}

#[test]
fn test_blocking_recovers_after_temporary_failures() {
    let exchange = ResilientExchange::new(
        ScriptedExchange::default().fail("fetch_ticker", [timeout(), timeout()]),
        fast_budgets(),
        Arc::new(RetryStats::new()),
    )
    .unwrap();
    let blocking = BlockingExchange::new(exchange).unwrap();

    let ticker = blocking.fetch_ticker("BTC/USDT").unwrap();

    assert_eq!(ticker.pair, "BTC/USDT");
    assert_eq!(blocking.resilient().inner().call_count("fetch_ticker"), 3);
}

#[test]
fn test_blocking_terminal_error_and_balance() {
    let exchange = ResilientExchange::new(
        ScriptedExchange::default().fail(
            "create_order",
            [ExchangeError::InvalidQuantity("below min notional".to_string())],
        ),
        fast_budgets(),
        Arc::new(RetryStats::new()),
    )
    .unwrap();
    let blocking = BlockingExchange::new(exchange).unwrap();

    let err = blocking
        .create_order(OrderRequest::market("BTC/USDT", Side::Buy, dec!(0.00001)))
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::InvalidOrder));
    assert_eq!(err.attempts(), 1);

    let balance = blocking.fetch_balance("USDT").unwrap();
    assert_eq!(balance.total(), dec!(12));
}

#[test]
fn test_blocking_cancelled_before_first_attempt() {
    let token = CancellationToken::new();
    token.cancel();
    let exchange = ResilientExchange::new(
        ScriptedExchange::default(),
        fast_budgets(),
        Arc::new(RetryStats::new()),
    )
    .unwrap()
    .scoped(token);
    let blocking = BlockingExchange::new(exchange).unwrap();

    let err = blocking.fetch_markets().unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.attempts(), 0);
}

#[test]
fn test_invalid_budget_is_rejected_at_construction() {
    let budgets = ExchangeBudgets {
        exchange_call: RetryBudget::new(3, secs(1), secs(10)).with_ddos_min_delay(Duration::ZERO),
        ..budgets()
    };
    let err = ResilientExchange::new(
        ScriptedExchange::default(),
        budgets,
        Arc::new(RetryStats::new()),
    )
    .unwrap_err();
    assert!(matches!(err, TraderError::Config(ref msg) if msg.contains("mockex")), "{}", err);

    let mut config = AppConfig::default();
    config.retry.order_fetch.max_delay_ms = 10;
    let err = ResilientExchange::from_config(
        ScriptedExchange::default(),
        &config,
        Arc::new(RetryStats::new()),
    )
    .unwrap_err();
    assert!(matches!(err, TraderError::Config(ref msg) if msg.contains("order_fetch")), "{}", err);
}
