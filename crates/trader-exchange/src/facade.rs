//! 재시도 계층이 적용된 거래소 퍼사드.
//!
//! [`ResilientExchange`]는 [`Exchange`] 구현체의 모든 호출을 [`RetryExecutor`]로 감쌉니다.
//! 주문 제출/조회/취소는 주문 예산, 나머지는 일반 예산을 사용합니다.
//!
//! [`BlockingExchange`]는 같은 규칙을 블로킹 방식으로 제공합니다. 자체 current-thread
//! 런타임을 가지며, 재시도 대기 동안 호출 스레드만 잠듭니다.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;
use trader_core::{
    AppConfig, Kline, Market, OrderRequest, OrderStatus, Ticker, Timeframe, TraderError,
    TraderResult,
};

use crate::backoff::ExchangeBudgets;
use crate::error::CallCategory;
use crate::retry::{CallInfo, CallResult, RetryExecutor};
use crate::telemetry::{RetryTelemetry, TracingTelemetry};
use crate::traits::{Balance, Exchange, ExchangeResult};

/// 재시도가 적용된 비동기 거래소 핸들.
///
/// 복제 비용이 낮으며, 복제본은 같은 거래소 인스턴스(연결 풀, rate limiter)를 공유합니다.
pub struct ResilientExchange<E> {
    inner: Arc<E>,
    generic: RetryExecutor,
    orders: RetryExecutor,
    cancel: CancellationToken,
}

impl<E> Clone for ResilientExchange<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            generic: self.generic.clone(),
            orders: self.orders.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<E: Exchange> std::fmt::Debug for ResilientExchange<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientExchange")
            .field("exchange", &self.inner.name())
            .field("generic", &self.generic)
            .field("orders", &self.orders)
            .finish()
    }
}

impl<E: Exchange> ResilientExchange<E> {
    /// 명시적인 예산과 텔레메트리로 생성합니다.
    ///
    /// 예산이 유효하지 않으면 `TraderError::Config`를 반환합니다.
    pub fn new(
        exchange: E,
        budgets: ExchangeBudgets,
        telemetry: Arc<dyn RetryTelemetry>,
    ) -> TraderResult<Self> {
        Self::from_shared(Arc::new(exchange), budgets, telemetry)
    }

    /// 이미 공유 중인 거래소 인스턴스로 생성합니다.
    pub fn from_shared(
        exchange: Arc<E>,
        budgets: ExchangeBudgets,
        telemetry: Arc<dyn RetryTelemetry>,
    ) -> TraderResult<Self> {
        budgets
            .validate()
            .map_err(|e| TraderError::Config(format!("{}: {}", exchange.name(), e)))?;
        Ok(Self::build(exchange, budgets, telemetry))
    }

    /// 설정 파일의 전역/거래소별 예산으로 생성합니다.
    pub fn from_config(
        exchange: E,
        config: &AppConfig,
        telemetry: Arc<dyn RetryTelemetry>,
    ) -> TraderResult<Self> {
        let budgets = ExchangeBudgets::for_exchange(config, exchange.name());
        tracing::debug!(
            exchange = %exchange.name(),
            max_attempts = budgets.exchange_call.max_attempts,
            order_max_attempts = budgets.order_fetch.max_attempts,
            "Retry budgets resolved"
        );
        Self::new(exchange, budgets, telemetry)
    }

    /// 기본 예산과 `tracing` 텔레메트리로 생성합니다.
    pub fn with_defaults(exchange: E) -> Self {
        Self::build(
            Arc::new(exchange),
            ExchangeBudgets::default(),
            Arc::new(TracingTelemetry),
        )
    }

    fn build(
        exchange: Arc<E>,
        budgets: ExchangeBudgets,
        telemetry: Arc<dyn RetryTelemetry>,
    ) -> Self {
        Self {
            inner: exchange,
            generic: RetryExecutor::new(budgets.exchange_call, Arc::clone(&telemetry)),
            orders: RetryExecutor::new(budgets.order_fetch, telemetry),
            cancel: CancellationToken::new(),
        }
    }

    /// 주어진 취소 토큰을 따르는 핸들을 반환합니다.
    ///
    /// 토큰이 취소되면 대기 중인 재시도는 즉시 `CallError::Cancelled`로 끝나고
    /// 새 시도는 시작되지 않습니다. 이미 진행 중인 거래소 요청은 끊지 않습니다.
    pub fn scoped(&self, token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..self.clone()
        }
    }

    /// 현재 취소 토큰.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// 거래소 이름.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// 감싼 거래소 인스턴스.
    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// 호출 유형에 맞는 실행기.
    pub fn executor(&self, category: CallCategory) -> &RetryExecutor {
        if category.uses_order_budget() {
            &self.orders
        } else {
            &self.generic
        }
    }

    async fn run<T, F, Fut>(&self, operation: &str, category: CallCategory, op: F) -> CallResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ExchangeResult<T>>,
    {
        let info = CallInfo::new(self.inner.name(), operation, category);
        self.executor(category).execute(&info, &self.cancel, op).await
    }

    /// 현재 시세 조회.
    pub async fn fetch_ticker(&self, pair: &str) -> CallResult<Ticker> {
        let inner = &*self.inner;
        self.run("fetch_ticker", CallCategory::MarketData, move || {
            inner.fetch_ticker(pair)
        })
        .await
    }

    /// 캔들 조회.
    pub async fn fetch_ohlcv(
        &self,
        pair: &str,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> CallResult<Vec<Kline>> {
        let inner = &*self.inner;
        self.run("fetch_ohlcv", CallCategory::MarketData, move || {
            inner.fetch_ohlcv(pair, timeframe, since, limit)
        })
        .await
    }

    /// 여러 거래쌍의 캔들을 동시에 조회합니다.
    ///
    /// 모든 조회는 호출한 태스크 안에서 동시에 진행되며, 각 조회는 독립적으로
    /// 재시도합니다. 결과는 완료 순서가 아니라 거래쌍으로 정렬됩니다.
    pub async fn fetch_ohlcv_many<P: AsRef<str>>(
        &self,
        pairs: &[P],
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> BTreeMap<String, CallResult<Vec<Kline>>> {
        let fetches = pairs.iter().map(|pair| async move {
            let pair = pair.as_ref();
            let result = self.fetch_ohlcv(pair, timeframe, since, limit).await;
            (pair.to_string(), result)
        });

        join_all(fetches).await.into_iter().collect()
    }

    /// 주문 제출.
    ///
    /// 클라이언트 주문 ID가 없으면 발급하며, 모든 재시도가 같은 ID를 사용합니다.
    pub async fn create_order(&self, mut request: OrderRequest) -> CallResult<String> {
        let client_order_id = request.ensure_client_id().to_string();
        tracing::debug!(
            exchange = %self.name(),
            pair = %request.pair,
            client_order_id = %client_order_id,
            "Submitting order"
        );

        let inner = &*self.inner;
        let request = &request;
        self.run("create_order", CallCategory::OrderPlacement, move || {
            inner.create_order(request)
        })
        .await
    }

    /// 주문 취소.
    pub async fn cancel_order(&self, pair: &str, order_id: &str) -> CallResult<()> {
        let inner = &*self.inner;
        self.run("cancel_order", CallCategory::OrderQuery, move || {
            inner.cancel_order(pair, order_id)
        })
        .await
    }

    /// 주문 상태 조회.
    pub async fn fetch_order(&self, pair: &str, order_id: &str) -> CallResult<OrderStatus> {
        let inner = &*self.inner;
        self.run("fetch_order", CallCategory::OrderQuery, move || {
            inner.fetch_order(pair, order_id)
        })
        .await
    }

    /// 잔고 조회.
    pub async fn fetch_balance(&self, asset: &str) -> CallResult<Balance> {
        let inner = &*self.inner;
        self.run("fetch_balance", CallCategory::MarketData, move || {
            inner.fetch_balance(asset)
        })
        .await
    }

    /// 마켓 목록 조회.
    pub async fn fetch_markets(&self) -> CallResult<Vec<Market>> {
        let inner = &*self.inner;
        self.run("fetch_markets", CallCategory::MarketData, move || {
            inner.fetch_markets()
        })
        .await
    }
}

/// 재시도가 적용된 블로킹 거래소 핸들.
///
/// 각 시도는 내부 런타임에서 거래소 호출 하나를 `block_on`으로 실행하고, 재시도 대기는
/// [`RetryExecutor::execute_blocking`]의 스레드 대기를 사용합니다.
/// 비동기 런타임 안에서 호출하면 패닉하므로 일반 스레드에서만 사용해야 합니다.
pub struct BlockingExchange<E> {
    exchange: ResilientExchange<E>,
    runtime: Runtime,
}

impl<E: Exchange> BlockingExchange<E> {
    /// 비동기 핸들을 감싸 블로킹 핸들을 만듭니다.
    ///
    /// 예산, 텔레메트리, 취소 토큰은 `exchange`의 것을 그대로 사용합니다.
    pub fn new(exchange: ResilientExchange<E>) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { exchange, runtime })
    }

    /// 비동기 핸들.
    pub fn resilient(&self) -> &ResilientExchange<E> {
        &self.exchange
    }

    /// 거래소 이름.
    pub fn name(&self) -> &str {
        self.exchange.name()
    }

    fn run<T, F, Fut>(&self, operation: &str, category: CallCategory, mut op: F) -> CallResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ExchangeResult<T>>,
    {
        let info = CallInfo::new(self.name(), operation, category);
        self.exchange.executor(category).execute_blocking(
            &info,
            self.exchange.cancellation_token(),
            || self.runtime.block_on(op()),
        )
    }

    /// 현재 시세 조회.
    pub fn fetch_ticker(&self, pair: &str) -> CallResult<Ticker> {
        let inner = self.exchange.inner();
        self.run("fetch_ticker", CallCategory::MarketData, move || inner.fetch_ticker(pair))
    }

    /// 캔들 조회.
    pub fn fetch_ohlcv(
        &self,
        pair: &str,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> CallResult<Vec<Kline>> {
        let inner = self.exchange.inner();
        self.run("fetch_ohlcv", CallCategory::MarketData, move || {
            inner.fetch_ohlcv(pair, timeframe, since, limit)
        })
    }

    /// 주문 제출. 클라이언트 주문 ID 규칙은 비동기 형태와 같습니다.
    pub fn create_order(&self, mut request: OrderRequest) -> CallResult<String> {
        request.ensure_client_id();
        let request = &request;
        let inner = self.exchange.inner();
        self.run("create_order", CallCategory::OrderPlacement, move || {
            inner.create_order(request)
        })
    }

    /// 주문 취소.
    pub fn cancel_order(&self, pair: &str, order_id: &str) -> CallResult<()> {
        let inner = self.exchange.inner();
        self.run("cancel_order", CallCategory::OrderQuery, move || {
            inner.cancel_order(pair, order_id)
        })
    }

    /// 주문 상태 조회.
    pub fn fetch_order(&self, pair: &str, order_id: &str) -> CallResult<OrderStatus> {
        let inner = self.exchange.inner();
        self.run("fetch_order", CallCategory::OrderQuery, move || {
            inner.fetch_order(pair, order_id)
        })
    }

    /// 잔고 조회.
    pub fn fetch_balance(&self, asset: &str) -> CallResult<Balance> {
        let inner = self.exchange.inner();
        self.run("fetch_balance", CallCategory::MarketData, move || {
            inner.fetch_balance(asset)
        })
    }

    /// 마켓 목록 조회.
    pub fn fetch_markets(&self) -> CallResult<Vec<Market>> {
        let inner = self.exchange.inner();
        self.run("fetch_markets", CallCategory::MarketData, move || inner.fetch_markets())
    }
}
