//! The request pipeline for the HTTP channel.
//!
//! One call to [`SessionInner::send_request`] drives a whole pagination
//! chain: produce a request (signing against a fresh time point), execute
//! it, classify and apply the response, then sleep the adapter-chosen delay
//! and reissue the continuation until the adapter returns none. Historical
//! fetches are exactly one such chain walking backwards in time.
//!
//! Handler errors inside a chain are logged and terminate the chain without
//! tearing anything down; transport errors surface to the caller, who
//! decides (periodic tasks log and retry on their next tick, order paths
//! return the error).

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::adapter::{ErrorDirective, ExchangeAdapter, RestTarget};
use crate::error::{ExchangeError, Result};
use crate::session::SessionInner;
use crate::time::TimePoint;
use crate::types::enums::OrderStatus;
use crate::wire::{Continuation, RequestProducer, RestRequest, RestResponse};

impl<A: ExchangeAdapter> SessionInner<A> {
    /// Issue a request and drive its continuation chain to completion.
    pub(crate) async fn send_request(
        self: &Arc<Self>,
        producer: RequestProducer,
        delay: Duration,
    ) -> Result<()> {
        let mut producer = producer;
        let mut delay = delay;
        loop {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let request = producer(TimePoint::now())?;
            tracing::debug!(method = %request.method, url = %request.url(), "rest request");

            let response = self.execute(request).await?;
            tracing::debug!(status = %response.status, "rest response");

            match self.apply_rest_response(response).await {
                Ok(Some(continuation)) => {
                    producer = continuation.producer;
                    delay = continuation.delay;
                }
                Ok(None) => break,
                Err(error) => {
                    tracing::error!(%error, "rest response handling failed");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Execute one request on the shared client and assemble the envelope.
    async fn execute(&self, request: RestRequest) -> Result<RestResponse> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ExchangeError::InvalidArgument(format!("bad header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ExchangeError::InvalidArgument(format!("bad header value: {e}")))?;
            headers.insert(name, value);
        }

        let url = request.url();
        let mut builder = self.http.request(request.method.clone(), &url).headers(headers);
        if let Some(payload) = &request.payload {
            builder = builder.body(payload.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let mut response_headers = BTreeMap::new();
        for (name, value) in response.headers() {
            response_headers.insert(
                name.as_str().to_owned(),
                value.to_str().unwrap_or_default().to_owned(),
            );
        }
        let body = response.text().await.unwrap_or_default();

        RestResponse::assemble(status, body, response_headers, request)
    }

    /// Classify a response, apply it to the cache, and return the
    /// continuation for paginated domains.
    async fn apply_rest_response(
        self: &Arc<Self>,
        response: RestResponse,
    ) -> Result<Option<Continuation>> {
        if !self.adapter.is_rest_response_success(&response) {
            tracing::warn!(
                status = %response.status,
                payload = %response.payload,
                "venue returned an error response"
            );
            let directive = self.adapter.on_rest_error(&response);
            self.apply_error_directive(directive).await;
            return Ok(None);
        }

        let Some(target) = self.adapter.classify_rest_response(&response) else {
            return Ok(None);
        };
        let now = TimePoint::now();

        match target {
            RestTarget::Instruments => {
                let instruments = self.adapter.parse_instruments(&response)?;
                let mut state = self.state.lock().await;
                state.cache.upsert_instruments(instruments);
                Ok(None)
            }

            RestTarget::Bbo => {
                let bbos = self.adapter.parse_bbos(&response)?;
                let mut state = self.state.lock().await;
                let state = &mut *state;
                // Snapshot endpoints typically return every listed symbol;
                // keep only the tracked set.
                for bbo in bbos {
                    if state.symbols.contains(&bbo.symbol) {
                        state.cache.update_bbo(bbo);
                    }
                }
                Ok(None)
            }

            RestTarget::HistoricalTrades => {
                let trades = self.adapter.parse_historical_trades(&response)?;
                {
                    let mut state = self.state.lock().await;
                    state.cache.prepend_historical_trades(
                        trades,
                        self.config.fetch_historical_trade_start_unix_timestamp_seconds,
                        self.config.fetch_historical_trade_end_unix_timestamp_seconds,
                    );
                }
                Ok(self.market_data_continuation(
                    self.adapter
                        .next_historical_trades_request(&response, &self.config, &self.rest_ids),
                ))
            }

            RestTarget::HistoricalOhlcvs => {
                let ohlcvs = self.adapter.parse_historical_ohlcvs(&response)?;
                {
                    let mut state = self.state.lock().await;
                    state.cache.prepend_historical_ohlcvs(
                        ohlcvs,
                        self.config.fetch_historical_ohlcv_start_unix_timestamp_seconds,
                        self.config.fetch_historical_ohlcv_end_unix_timestamp_seconds,
                    );
                }
                Ok(self.market_data_continuation(
                    self.adapter
                        .next_historical_ohlcvs_request(&response, &self.config, &self.rest_ids),
                ))
            }

            RestTarget::CreateOrder => {
                let order = self.adapter.parse_create_order_response(&response)?;
                self.merge_order(order, now).await;
                Ok(None)
            }

            RestTarget::CancelOrder => {
                let order = self.adapter.parse_cancel_order_response(&response)?;
                self.merge_order(order, now).await;
                Ok(None)
            }

            RestTarget::FetchOrder => {
                let order = self.adapter.parse_fetch_order_response(&response)?;
                self.merge_order(order, now).await;
                Ok(None)
            }

            RestTarget::FetchOpenOrders => {
                let orders = self.adapter.parse_open_orders(&response)?;
                {
                    let mut state = self.state.lock().await;
                    let state = &mut *state;
                    for order in orders {
                        state.ledger.update(
                            order,
                            now,
                            self.config.margin_asset.as_deref(),
                            &state.cache.instruments,
                        );
                    }
                }
                Ok(self.account_continuation(
                    self.adapter
                        .next_open_orders_request(&response, &self.config, &self.rest_ids),
                ))
            }

            RestTarget::FetchPositions => {
                let positions = self.adapter.parse_positions(&response)?;
                let mut state = self.state.lock().await;
                state.cache.reconcile_positions(positions);
                Ok(None)
            }

            RestTarget::FetchBalances => {
                let balances = self.adapter.parse_balances(&response)?;
                let mut state = self.state.lock().await;
                state.cache.reconcile_balances(balances);
                Ok(None)
            }

            RestTarget::HistoricalOrders => {
                let orders = self.adapter.parse_historical_orders(&response)?;
                {
                    let mut state = self.state.lock().await;
                    let state = &mut *state;
                    for order in orders {
                        state.ledger.update(
                            order,
                            now,
                            self.config.margin_asset.as_deref(),
                            &state.cache.instruments,
                        );
                    }
                }
                Ok(self.account_continuation(
                    self.adapter
                        .next_historical_orders_request(&response, &self.config, &self.rest_ids),
                ))
            }

            RestTarget::HistoricalFills => {
                let fills = self.adapter.parse_historical_fills(&response)?;
                {
                    let mut state = self.state.lock().await;
                    state.cache.prepend_historical_fills(
                        fills,
                        self.config.fetch_historical_fill_start_unix_timestamp_seconds,
                        self.config.fetch_historical_fill_end_unix_timestamp_seconds,
                    );
                }
                Ok(self.account_continuation(
                    self.adapter
                        .next_historical_fills_request(&response, &self.config, &self.rest_ids),
                ))
            }
        }
    }

    fn market_data_continuation(&self, producer: Option<RequestProducer>) -> Option<Continuation> {
        producer.map(|producer| Continuation {
            producer,
            delay: Duration::from_secs_f64(
                self.config.rest_market_data_send_consecutive_request_delay_seconds,
            ),
        })
    }

    fn account_continuation(&self, producer: Option<RequestProducer>) -> Option<Continuation> {
        producer.map(|producer| Continuation {
            producer,
            delay: Duration::from_secs_f64(
                self.config.rest_account_send_consecutive_request_delay_seconds,
            ),
        })
    }

    /// Merge one order from a response into the ledger.
    pub(crate) async fn merge_order(&self, order: crate::types::account::Order, now: TimePoint) {
        let mut state = self.state.lock().await;
        let state = &mut *state;
        state.ledger.update(
            order,
            now,
            self.config.margin_asset.as_deref(),
            &state.cache.instruments,
        );
    }

    /// Act on an error hook's directive: mark the local order rejected
    /// and/or schedule a corrective fetch.
    ///
    /// Returns an explicitly boxed future (rather than `async fn`) because
    /// this method's call chain loops back through `fetch_order` (spawned
    /// below) and `apply_rest_response`; leaving the return type as an
    /// inferred opaque type creates a cyclic auto-trait (`Send`)
    /// computation that the compiler cannot resolve.
    pub(crate) fn apply_error_directive<'a>(
        self: &'a Arc<Self>,
        directive: ErrorDirective,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if let Some(order_ref) = directive.mark_rejected {
                let now = TimePoint::now();
                let mut state = self.state.lock().await;
                state.ledger.replace(
                    &order_ref.symbol,
                    order_ref.order_id.as_deref(),
                    order_ref.client_order_id.as_deref(),
                    |order| {
                        order.exchange_update_time_point = Some(now);
                        order.local_update_time_point = Some(now);
                        order.status = Some(OrderStatus::Rejected);
                    },
                );
                tracing::warn!(symbol = %order_ref.symbol, "order marked rejected");
            }

            if let Some(order_ref) = directive.fetch_order {
                // Scheduled, not awaited: the directive may arrive from inside a
                // response handler and the fetch is its own chain.
                let inner = Arc::clone(self);
                self.tracker.spawn(async move {
                    inner.fetch_order(order_ref).await;
                });
            }
        })
    }
}
