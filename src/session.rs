//! The exchange session: one venue, one account, one state cache.
//!
//! [`Session`] wraps a venue adapter and keeps a concurrency-safe cache
//! synchronized from two asynchronous sources: stream pushes and periodic
//! REST pulls. All state lives behind a single async mutex and every
//! mutation happens between suspension points, so invariants hold whenever
//! the lock is released.
//!
//! The REST pipeline methods live in [`crate::rest`] and the stream loop in
//! [`crate::ws`]; both are `impl` blocks on the shared inner type, the way
//! endpoint groups hang off one client.
//!
//! # Lifecycle
//!
//! `start` resolves the instrument set (expanding the `"*"` wildcard),
//! bootstraps quotes and open orders, spawns the periodic pull and retention
//! tasks, connects the stream endpoints, backfills historical data, then
//! starts the heartbeat and idle-timeout monitors. `stop` flips a terminal
//! flag, closes every connection and awaits every task; the session is
//! one-shot and unusable afterwards.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::adapter::{ExchangeAdapter, OrderRef, RequestIdSource};
use crate::cache::StateCache;
use crate::config::SessionConfig;
use crate::error::{ExchangeError, Result};
use crate::orders::{CancelFilter, ClientOrderIdGenerator, OrderLedger};
use crate::time::TimePoint;
use crate::types::account::{Balance, Fill, Order, Position};
use crate::types::enums::{ApiMethod, OrderStatus};
use crate::types::market::{Bbo, Instrument, Ohlcv, Trade};
use crate::wire::StreamRequest;
use crate::ws::connection::{ConnectionHandle, ReconnectBackoff};

/// Socket read timeout for the HTTP channel.
pub(crate) const HTTP_READ_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything mutable, guarded by one lock.
pub(crate) struct SessionState {
    pub cache: StateCache,
    pub ledger: OrderLedger,
    /// Resolved symbol set (wildcard already expanded).
    pub symbols: BTreeSet<String>,
    pub client_order_ids: ClientOrderIdGenerator,
    /// Live connections keyed by composed endpoint URL.
    pub connections: HashMap<String, ConnectionHandle>,
    /// Endpoints that have completed login.
    pub logged_in: HashSet<String>,
    /// Outstanding stream requests awaiting a correlated response.
    pub pending_stream_requests: HashMap<String, StreamRequest>,
    pub backoff: ReconnectBackoff,
    /// Terminal flag; set once by `stop`.
    pub stopped: bool,
}

pub(crate) struct SessionInner<A: ExchangeAdapter> {
    pub adapter: A,
    pub config: SessionConfig,
    pub http: reqwest::Client,
    pub state: Mutex<SessionState>,
    pub tracker: TaskTracker,
    pub shutdown: CancellationToken,
    pub rest_ids: RequestIdSource,
    pub stream_ids: RequestIdSource,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A live trading session against one venue.
///
/// Cloning is cheap; clones share the same state and connections.
///
/// # Example
///
/// ```no_run
/// use omnitrade::config::SessionConfig;
/// use omnitrade::session::Session;
/// use omnitrade::venues::okx::OkxAdapter;
///
/// # #[tokio::main]
/// # async fn main() -> omnitrade::error::Result<()> {
/// let mut config = SessionConfig::for_symbols("BTC-USDT");
/// config.subscribe_bbo = true;
/// config.subscribe_order = true;
/// config.api_key = "key".into();
/// config.api_secret = "secret".into();
/// config.api_passphrase = "passphrase".into();
///
/// let session = Session::new(OkxAdapter::spot(), config)?;
/// session.start().await?;
/// // ... trade ...
/// session.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct Session<A: ExchangeAdapter> {
    inner: Arc<SessionInner<A>>,
}

impl<A: ExchangeAdapter> Clone for Session<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: ExchangeAdapter> Session<A> {
    /// Build a session. Validates the configuration; fails fast on an
    /// invalid record or an instrument type the venue does not recognize.
    pub fn new(adapter: A, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        if !adapter.is_instrument_type_valid(config.instrument_type.as_deref()) {
            return Err(ExchangeError::Config(format!(
                "invalid instrument_type {:?} for exchange {}",
                config.instrument_type,
                adapter.name()
            )));
        }

        let http = reqwest::Client::builder()
            .read_timeout(HTTP_READ_TIMEOUT)
            .build()?;

        let state = SessionState {
            cache: StateCache::new(),
            ledger: OrderLedger::new(),
            symbols: config
                .symbols
                .iter()
                .filter(|s| *s != crate::config::ALL_TRADABLE)
                .cloned()
                .collect(),
            client_order_ids: ClientOrderIdGenerator::new(
                config.client_order_id_sequence_number_padding_length,
            ),
            connections: HashMap::new(),
            logged_in: HashSet::new(),
            pending_stream_requests: HashMap::new(),
            backoff: ReconnectBackoff::default(),
            stopped: false,
        };

        Ok(Self {
            inner: Arc::new(SessionInner {
                adapter,
                config,
                http,
                state: Mutex::new(state),
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
                rest_ids: RequestIdSource::default(),
                stream_ids: RequestIdSource::default(),
            }),
        })
    }

    /// Start the session: initial sync, periodic tasks, stream connections,
    /// historical bootstrap.
    pub async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        let config = &inner.config;
        tracing::info!(venue = inner.adapter.name(), "starting session");

        // Instrument set first: everything downstream needs it, and the
        // wildcard expands against a fresh map.
        if config.rest_market_data_fetch_all_instrument_information_at_start
            || config
                .rest_market_data_fetch_all_instrument_information_period_seconds
                .is_some()
        {
            inner.fetch_instruments().await;
            if config.wants_all_tradable() {
                let mut state = inner.state.lock().await;
                let state = &mut *state;
                state.symbols = state
                    .cache
                    .instruments
                    .iter()
                    .filter(|(_, i)| i.is_open_for_trade == Some(true))
                    .map(|(symbol, _)| symbol.clone())
                    .collect();
                tracing::info!(count = state.symbols.len(), "expanded wildcard symbol set");
            }
        }
        if let Some(period) = config.rest_market_data_fetch_all_instrument_information_period_seconds {
            inner.spawn_periodic(period, |inner| async move {
                inner.fetch_instruments().await;
            });
        }

        if config.subscribe_bbo || config.rest_market_data_fetch_bbo_period_seconds.is_some() {
            inner.fetch_bbo().await;
        }
        if let Some(period) = config.rest_market_data_fetch_bbo_period_seconds {
            inner.spawn_periodic(period, |inner| async move {
                inner.fetch_bbo().await;
            });
        }

        if config.subscribe_order
            || config.rest_account_fetch_open_order_at_start
            || config.rest_account_cancel_open_order_at_start
        {
            inner.fetch_open_orders().await;
            if config.rest_account_cancel_open_order_at_start {
                inner
                    .cancel_orders(CancelFilter::default(), Some(ApiMethod::Rest))
                    .await?;
            }
        }
        if let Some(period) = config.rest_account_check_open_order_period_seconds {
            inner.spawn_periodic(period, |inner| async move {
                inner.check_open_orders().await;
            });
        }
        if let Some(period) = config.rest_account_check_in_flight_order_period_seconds {
            inner.spawn_periodic(period, |inner| async move {
                inner.check_in_flight_orders().await;
            });
        }

        if config.subscribe_position || config.rest_account_fetch_position_period_seconds.is_some() {
            inner.fetch_positions().await;
        }
        if let Some(period) = config.rest_account_fetch_position_period_seconds {
            inner.spawn_periodic(period, |inner| async move {
                inner.fetch_positions().await;
            });
        }

        if config.subscribe_balance || config.rest_account_fetch_balance_period_seconds.is_some() {
            inner.fetch_balances().await;
        }
        if let Some(period) = config.rest_account_fetch_balance_period_seconds {
            inner.spawn_periodic(period, |inner| async move {
                inner.fetch_balances().await;
            });
        }

        inner.spawn_retention_sweepers();

        // Stream endpoints connect in parallel, each in its own task.
        for endpoint in inner.adapter.stream_endpoints(config) {
            let inner_for_task = Arc::clone(inner);
            inner.tracker.spawn(async move {
                inner_for_task.run_stream_endpoint(endpoint).await;
            });
        }

        // Historical backfill: market data and account chains side by side.
        tokio::join!(
            inner.bootstrap_historical_market_data(),
            inner.bootstrap_historical_account_data(),
        );

        inner.spawn_application_heartbeat();
        inner.spawn_idle_timeout_monitor();

        if config.start_wait_seconds > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(config.start_wait_seconds)).await;
        }

        tracing::info!(venue = inner.adapter.name(), "session started");
        Ok(())
    }

    /// Stop the session: no further reconnects, every connection closed,
    /// every task cancelled and awaited. The session is unusable afterwards.
    pub async fn stop(&self) -> Result<()> {
        let inner = &self.inner;
        tracing::info!(venue = inner.adapter.name(), "stopping session");

        {
            let mut state = inner.state.lock().await;
            state.stopped = true;
        }
        inner.shutdown.cancel();

        let handles: Vec<ConnectionHandle> = {
            let state = inner.state.lock().await;
            state.connections.values().cloned().collect()
        };
        for handle in handles {
            handle.close("session stop").await;
        }

        inner.tracker.close();
        inner.tracker.wait().await;

        if inner.config.stop_wait_seconds > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(inner.config.stop_wait_seconds)).await;
        }

        tracing::info!(venue = inner.adapter.name(), "session stopped");
        Ok(())
    }

    // -- order operations -------------------------------------------------

    /// Place an order. The order is observable in the cache as
    /// `CreateInFlight` (with a generated client id when none was given)
    /// before the first network await.
    pub async fn create_order(&self, order: Order) -> Result<Order> {
        self.inner.create_order(order, None).await
    }

    /// Place an order over a specific channel, overriding the configured
    /// preference. The stream path still requires a logged-in trade
    /// endpoint; otherwise the request goes over REST.
    pub async fn create_order_via(&self, order: Order, preference: ApiMethod) -> Result<Order> {
        self.inner.create_order(order, Some(preference)).await
    }

    /// Cancel one order by venue id or client id. Records
    /// `CancelInFlight` before the first network await.
    pub async fn cancel_order(
        &self,
        symbol: &str,
        order_id: Option<&str>,
        client_order_id: Option<&str>,
    ) -> Result<()> {
        self.inner
            .cancel_order(symbol, order_id, client_order_id, None, None)
            .await
    }

    /// Cancel every cancel-eligible order matching the filter.
    pub async fn cancel_orders(&self, filter: CancelFilter) -> Result<()> {
        self.inner.cancel_orders(filter, None).await
    }

    // -- observers ---------------------------------------------------------

    /// The resolved symbol set.
    pub async fn symbols(&self) -> BTreeSet<String> {
        self.inner.state.lock().await.symbols.clone()
    }

    /// All instrument descriptions.
    pub async fn instruments(&self) -> HashMap<String, Instrument> {
        self.inner.state.lock().await.cache.instruments.clone()
    }

    /// One instrument description.
    pub async fn instrument(&self, symbol: &str) -> Option<Instrument> {
        self.inner.state.lock().await.cache.instruments.get(symbol).cloned()
    }

    /// Latest top-of-book for one symbol.
    pub async fn bbo(&self, symbol: &str) -> Option<Bbo> {
        self.inner.state.lock().await.cache.bbos.get(symbol).cloned()
    }

    /// Latest top-of-book for every symbol.
    pub async fn bbos(&self) -> HashMap<String, Bbo> {
        self.inner.state.lock().await.cache.bbos.clone()
    }

    /// Stored trades for one symbol, earliest to latest.
    pub async fn trades(&self, symbol: &str) -> Vec<Trade> {
        self.inner
            .state
            .lock()
            .await
            .cache
            .trades
            .get(symbol)
            .cloned()
            .unwrap_or_default()
    }

    /// Stored candles for one symbol, earliest to latest.
    pub async fn ohlcvs(&self, symbol: &str) -> Vec<Ohlcv> {
        self.inner
            .state
            .lock()
            .await
            .cache
            .ohlcvs
            .get(symbol)
            .cloned()
            .unwrap_or_default()
    }

    /// Tracked orders for one symbol, in creation order.
    pub async fn orders(&self, symbol: &str) -> Vec<Order> {
        self.inner
            .state
            .lock()
            .await
            .ledger
            .orders
            .get(symbol)
            .cloned()
            .unwrap_or_default()
    }

    /// One order, by client id (preferred) or venue id.
    pub async fn order(
        &self,
        symbol: &str,
        order_id: Option<&str>,
        client_order_id: Option<&str>,
    ) -> Option<Order> {
        self.inner
            .state
            .lock()
            .await
            .ledger
            .get(symbol, order_id, client_order_id)
            .map(|(_, order)| order.clone())
    }

    /// Open orders per symbol.
    pub async fn open_orders(&self) -> HashMap<String, Vec<Order>> {
        self.inner.state.lock().await.ledger.open_orders()
    }

    /// In-flight orders per symbol.
    pub async fn in_flight_orders(&self) -> HashMap<String, Vec<Order>> {
        self.inner.state.lock().await.ledger.in_flight_orders()
    }

    /// Stored fills for one symbol, earliest to latest.
    pub async fn fills(&self, symbol: &str) -> Vec<Fill> {
        self.inner
            .state
            .lock()
            .await
            .cache
            .fills
            .get(symbol)
            .cloned()
            .unwrap_or_default()
    }

    /// Open positions per symbol.
    pub async fn positions(&self) -> HashMap<String, Position> {
        self.inner.state.lock().await.cache.positions.clone()
    }

    /// Balances per asset.
    pub async fn balances(&self) -> HashMap<String, Balance> {
        self.inner.state.lock().await.cache.balances.clone()
    }
}

// ---------------------------------------------------------------------------
// Inner: order paths and periodic bodies
// ---------------------------------------------------------------------------

impl<A: ExchangeAdapter> SessionInner<A> {
    pub(crate) async fn create_order(
        self: &Arc<Self>,
        order: Order,
        preference: Option<ApiMethod>,
    ) -> Result<Order> {
        let now = TimePoint::now();
        let prepared = {
            let mut state = self.state.lock().await;
            if state.stopped {
                return Err(ExchangeError::InvalidArgument("session is stopped".into()));
            }
            let mut order = order;
            if order.client_order_id.is_none() {
                order.client_order_id = Some(state.client_order_ids.next_id(now.secs));
            }
            if order.local_update_time_point.is_none() {
                order.local_update_time_point = Some(now);
            }
            order.status = Some(OrderStatus::CreateInFlight);
            state.ledger.append(order.clone());
            order
        };

        match self.trade_stream_handle(preference).await {
            Some(handle) => {
                let request = self
                    .adapter
                    .stream_create_order_request(&prepared, &self.stream_ids)?;
                self.send_stream_request(&handle, request).await?;
                Ok(prepared)
            }
            None => {
                let producer = self
                    .adapter
                    .create_order_request(&prepared, &self.config, &self.rest_ids);
                self.send_request(producer, Duration::ZERO).await?;
                let state = self.state.lock().await;
                Ok(state
                    .ledger
                    .get(&prepared.symbol, None, prepared.client_order_id.as_deref())
                    .map(|(_, order)| order.clone())
                    .unwrap_or(prepared))
            }
        }
    }

    pub(crate) async fn cancel_order(
        self: &Arc<Self>,
        symbol: &str,
        order_id: Option<&str>,
        client_order_id: Option<&str>,
        preference: Option<ApiMethod>,
        local_update_time_point: Option<TimePoint>,
    ) -> Result<()> {
        let now = local_update_time_point.unwrap_or_else(TimePoint::now);
        {
            let mut state = self.state.lock().await;
            if state.stopped {
                return Err(ExchangeError::InvalidArgument("session is stopped".into()));
            }
            state.ledger.replace(symbol, order_id, client_order_id, |order| {
                order.local_update_time_point = Some(now);
                order.status = Some(OrderStatus::CancelInFlight);
            });
        }

        let order_ref = OrderRef {
            symbol: symbol.to_owned(),
            order_id: order_id.map(str::to_owned),
            client_order_id: client_order_id.map(str::to_owned),
        };

        match self.trade_stream_handle(preference).await {
            Some(handle) => {
                let request = self
                    .adapter
                    .stream_cancel_order_request(&order_ref, &self.stream_ids)?;
                self.send_stream_request(&handle, request).await
            }
            None => {
                let producer = self
                    .adapter
                    .cancel_order_request(&order_ref, &self.config, &self.rest_ids);
                self.send_request(producer, Duration::ZERO).await
            }
        }
    }

    pub(crate) async fn cancel_orders(
        self: &Arc<Self>,
        filter: CancelFilter,
        preference: Option<ApiMethod>,
    ) -> Result<()> {
        let now = TimePoint::now();
        let candidates = {
            let state = self.state.lock().await;
            state.ledger.cancel_candidates(&filter)
        };
        for candidate in candidates {
            self.cancel_order(
                &candidate.symbol,
                candidate.order_id.as_deref(),
                candidate.client_order_id.as_deref(),
                preference,
                Some(now),
            )
            .await?;
        }
        Ok(())
    }

    /// The logged-in trade connection, when the effective preference is the
    /// streaming channel. `None` routes the operation over REST.
    async fn trade_stream_handle(
        &self,
        preference: Option<ApiMethod>,
    ) -> Option<ConnectionHandle> {
        let effective = preference.or(self.config.trade_api_method_preference);
        if effective != Some(ApiMethod::Websocket) {
            return None;
        }
        let endpoint = self
            .adapter
            .stream_endpoints(&self.config)
            .into_iter()
            .find(|endpoint| endpoint.supports_trade)?;
        let key = endpoint.key();
        let state = self.state.lock().await;
        if !state.logged_in.contains(&key) {
            return None;
        }
        state.connections.get(&key).cloned()
    }

    // -- fetch wrappers ---------------------------------------------------
    //
    // Periodic bodies log failures and keep going; a background task never
    // lets an error escape unlogged.

    pub(crate) async fn fetch_instruments(self: &Arc<Self>) {
        let producer = self.adapter.fetch_instruments_request(&self.config, &self.rest_ids);
        if let Err(error) = self.send_request(producer, Duration::ZERO).await {
            tracing::error!(%error, "instrument fetch failed");
        }
    }

    pub(crate) async fn fetch_bbo(self: &Arc<Self>) {
        let producer = self.adapter.fetch_bbo_request(&self.config, &self.rest_ids);
        if let Err(error) = self.send_request(producer, Duration::ZERO).await {
            tracing::error!(%error, "bbo fetch failed");
        }
    }

    pub(crate) async fn fetch_open_orders(self: &Arc<Self>) {
        let producer = self.adapter.fetch_open_orders_request(&self.config, &self.rest_ids);
        if let Err(error) = self.send_request(producer, Duration::ZERO).await {
            tracing::error!(%error, "open order fetch failed");
        }
    }

    pub(crate) async fn fetch_positions(self: &Arc<Self>) {
        let producer = self.adapter.fetch_positions_request(&self.config, &self.rest_ids);
        if let Err(error) = self.send_request(producer, Duration::ZERO).await {
            tracing::error!(%error, "position fetch failed");
        }
    }

    pub(crate) async fn fetch_balances(self: &Arc<Self>) {
        let producer = self.adapter.fetch_balances_request(&self.config, &self.rest_ids);
        if let Err(error) = self.send_request(producer, Duration::ZERO).await {
            tracing::error!(%error, "balance fetch failed");
        }
    }

    pub(crate) async fn fetch_order(self: &Arc<Self>, order_ref: OrderRef) {
        let producer = self
            .adapter
            .fetch_order_request(&order_ref, &self.config, &self.rest_ids);
        if let Err(error) = self.send_request(producer, Duration::ZERO).await {
            tracing::error!(%error, symbol = %order_ref.symbol, "order fetch failed");
        }
    }

    /// Corrective sweep over open orders that have not moved past the
    /// staleness threshold.
    pub(crate) async fn check_open_orders(self: &Arc<Self>) {
        let Some(threshold) = self.config.rest_account_check_open_order_threshold_seconds else {
            return;
        };
        let stale = {
            let state = self.state.lock().await;
            state.ledger.stale_open_orders(TimePoint::now(), threshold)
        };
        for order_ref in stale {
            self.fetch_order(order_ref).await;
            tokio::time::sleep(Duration::from_secs_f64(
                self.config.rest_account_send_consecutive_request_delay_seconds,
            ))
            .await;
        }
    }

    /// Corrective sweep over in-flight orders (create/cancel sent, no
    /// acknowledgement) past the staleness threshold.
    pub(crate) async fn check_in_flight_orders(self: &Arc<Self>) {
        let Some(threshold) = self.config.rest_account_check_in_flight_order_threshold_seconds
        else {
            return;
        };
        let stale = {
            let state = self.state.lock().await;
            state.ledger.stale_in_flight_orders(TimePoint::now(), threshold)
        };
        for order_ref in stale {
            self.fetch_order(order_ref).await;
            tokio::time::sleep(Duration::from_secs_f64(
                self.config.rest_account_send_consecutive_request_delay_seconds,
            ))
            .await;
        }
    }

    // -- historical bootstrap ----------------------------------------------

    pub(crate) async fn bootstrap_historical_market_data(self: &Arc<Self>) {
        let symbols = {
            let state = self.state.lock().await;
            state.symbols.clone()
        };
        for symbol in &symbols {
            if self.config.fetch_historical_trade_at_start {
                let producer = self
                    .adapter
                    .historical_trades_request(symbol, &self.config, &self.rest_ids);
                if let Err(error) = self.send_request(producer, Duration::ZERO).await {
                    tracing::error!(%error, %symbol, "historical trade fetch failed");
                }
            }
            if self.config.fetch_historical_ohlcv_at_start {
                let producer = self
                    .adapter
                    .historical_ohlcvs_request(symbol, &self.config, &self.rest_ids);
                if let Err(error) = self.send_request(producer, Duration::ZERO).await {
                    tracing::error!(%error, %symbol, "historical candle fetch failed");
                }
            }
        }
    }

    pub(crate) async fn bootstrap_historical_account_data(self: &Arc<Self>) {
        let symbols = {
            let state = self.state.lock().await;
            state.symbols.clone()
        };
        for symbol in &symbols {
            if self.config.fetch_historical_order_at_start {
                let producer = self
                    .adapter
                    .historical_orders_request(symbol, &self.config, &self.rest_ids);
                if let Err(error) = self.send_request(producer, Duration::ZERO).await {
                    tracing::error!(%error, %symbol, "historical order fetch failed");
                }
            }
            if self.config.fetch_historical_fill_at_start {
                let producer = self
                    .adapter
                    .historical_fills_request(symbol, &self.config, &self.rest_ids);
                if let Err(error) = self.send_request(producer, Duration::ZERO).await {
                    tracing::error!(%error, %symbol, "historical fill fetch failed");
                }
            }
        }
    }

    // -- task plumbing -------------------------------------------------------

    /// Spawn a tracked task that runs `body` every `period_seconds` until
    /// shutdown. The first run happens after one full period.
    pub(crate) fn spawn_periodic<F, Fut>(self: &Arc<Self>, period_seconds: u64, body: F)
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let inner = Arc::clone(self);
        self.tracker.spawn(async move {
            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(period_seconds)) => {
                        body(Arc::clone(&inner)).await;
                    }
                }
            }
        });
    }

    /// Retention sweepers for each domain that is actually populated.
    pub(crate) fn spawn_retention_sweepers(self: &Arc<Self>) {
        let config = &self.config;

        let trade_sweep = config
            .remove_historical_trade_interval_seconds
            .zip(config.keep_historical_trade_seconds)
            .filter(|_| config.subscribe_trade || config.fetch_historical_trade_at_start);
        if let Some((period, keep)) = trade_sweep {
            self.spawn_periodic(period, move |inner| async move {
                inner.state.lock().await.cache.trim_trades(keep);
            });
        }

        let ohlcv_sweep = config
            .remove_historical_ohlcv_interval_seconds
            .zip(config.keep_historical_ohlcv_seconds)
            .filter(|_| config.subscribe_ohlcv || config.fetch_historical_ohlcv_at_start);
        if let Some((period, keep)) = ohlcv_sweep {
            self.spawn_periodic(period, move |inner| async move {
                inner.state.lock().await.cache.trim_ohlcvs(keep);
            });
        }

        let order_sweep = config
            .remove_historical_order_interval_seconds
            .zip(config.keep_historical_order_seconds)
            .filter(|_| config.subscribe_order || config.fetch_historical_order_at_start);
        if let Some((period, keep)) = order_sweep {
            self.spawn_periodic(period, move |inner| async move {
                inner.state.lock().await.ledger.trim(keep);
            });
        }

        let fill_sweep = config
            .remove_historical_fill_interval_seconds
            .zip(config.keep_historical_fill_seconds)
            .filter(|_| config.subscribe_fill || config.fetch_historical_fill_at_start);
        if let Some((period, keep)) = fill_sweep {
            self.spawn_periodic(period, move |inner| async move {
                inner.state.lock().await.cache.trim_fills(keep);
            });
        }
    }
}
