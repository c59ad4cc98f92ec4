//! Streaming channel: per-endpoint connection loops and frame dispatch.
//!
//! - [`connection`] — socket primitives, writer handle, reconnect backoff.
//!
//! The session maintains one logical connection per `(base URL, path,
//! query)` triple. Each endpoint runs its own task: connect, perform the
//! on-connected protocol (login or market-data subscribe), then read frames
//! until the connection drops, and reconnect with exponential backoff while
//! auto-reconnect is on and the session has not stopped.
//!
//! Inbound frames classify three ways off the adapter-extracted summary:
//! **push** (no request id) feeding the caches, **response-success**
//! (create/cancel acknowledgements, subscribe, login, pong), and
//! **response-error** routed through the adapter's error hook. Frames that
//! fail to deserialize are logged and dropped; the connection stays up.

pub mod connection;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::Message;

use crate::adapter::{ExchangeAdapter, StreamChannel, StreamEndpoint, StreamOp};
use crate::error::Result;
use crate::session::SessionInner;
use crate::time::TimePoint;
use crate::wire::{PayloadSummary, StreamMessage, StreamRequest};
use crate::ws::connection::{
    BACKOFF_RESET_AFTER_SECONDS, ConnectionHandle, IDLE_TIMEOUT_CLOSE_REASON, ReaderHalf,
};

impl<A: ExchangeAdapter> SessionInner<A> {
    /// The lifetime of one endpoint: connect, converse, reconnect.
    pub(crate) async fn run_stream_endpoint(self: Arc<Self>, endpoint: StreamEndpoint) {
        let key = endpoint.key();
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match connection::connect(&endpoint).await {
                Ok((writer, mut reader)) => {
                    tracing::info!(endpoint = %key, "stream connected");
                    let handle = ConnectionHandle::new(key.clone(), writer);
                    {
                        let mut state = self.state.lock().await;
                        state.connections.insert(key.clone(), handle.clone());
                    }

                    if let Err(error) = self.on_connected(&endpoint, &handle).await {
                        tracing::error!(%error, endpoint = %key, "post-connect setup failed");
                    }

                    self.read_frames(&handle, &mut reader).await;

                    {
                        let mut state = self.state.lock().await;
                        state.connections.remove(&key);
                        state.logged_in.remove(&key);
                    }
                    tracing::warn!(endpoint = %key, "stream disconnected");
                }
                Err(error) => {
                    tracing::error!(%error, endpoint = %key, "stream connect failed");
                }
            }

            let reconnect = self.config.websocket_connection_auto_reconnect
                && !self.shutdown.is_cancelled()
                && !self.state.lock().await.stopped;
            if !reconnect {
                break;
            }

            let delay = self.state.lock().await.backoff.next_delay_seconds(&key);
            tracing::warn!(endpoint = %key, delay_seconds = delay, "reconnecting after backoff");
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
            }
        }
    }

    /// Read frames until close/error, interleaving protocol pings.
    async fn read_frames(self: &Arc<Self>, handle: &ConnectionHandle, reader: &mut ReaderHalf) {
        let mut ping_interval = self
            .config
            .websocket_connection_protocol_level_heartbeat_period_seconds
            .map(|period| {
                let mut interval = tokio::time::interval(Duration::from_secs(period));
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                interval
            });

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,

                _ = async {
                    match ping_interval.as_mut() {
                        Some(interval) => { interval.tick().await; }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    if let Err(error) = handle.send_ping().await {
                        tracing::warn!(%error, endpoint = %handle.key, "protocol ping failed");
                        break;
                    }
                }

                frame = reader.next() => match frame {
                    Some(Ok(message)) => {
                        handle.touch(TimePoint::now());
                        match message {
                            Message::Text(text) => {
                                if let Err(error) = self.on_stream_frame(&handle.key, text.as_str()).await {
                                    // Deserialization mismatch: drop the frame,
                                    // keep the connection.
                                    tracing::warn!(%error, endpoint = %handle.key, "stream frame dropped");
                                }
                            }
                            Message::Ping(_) | Message::Pong(_) => {}
                            Message::Close(frame) => {
                                tracing::info!(endpoint = %handle.key, ?frame, "stream closed by peer");
                                break;
                            }
                            _ => {}
                        }
                    }
                    Some(Err(error)) => {
                        tracing::error!(%error, endpoint = %handle.key, "stream read error");
                        break;
                    }
                    None => {
                        tracing::info!(endpoint = %handle.key, "stream ended");
                        break;
                    }
                }
            }
        }
    }

    /// Post-connect protocol: login on gated endpoints, market-data
    /// subscriptions on data endpoints (account subscriptions wait for the
    /// login acknowledgement).
    async fn on_connected(
        self: &Arc<Self>,
        endpoint: &StreamEndpoint,
        handle: &ConnectionHandle,
    ) -> Result<()> {
        if endpoint.requires_login {
            if let Some(request) =
                self.adapter
                    .login_request(TimePoint::now(), &self.config, &self.stream_ids)?
            {
                self.send_stream_request(handle, request).await?;
            }
        }
        if endpoint.carries_market_data {
            self.subscribe_market_data(endpoint, handle).await?;
        }
        Ok(())
    }

    /// Send market-data subscribe frames, chunked by the per-frame symbol
    /// limit with pacing in between.
    async fn subscribe_market_data(
        &self,
        endpoint: &StreamEndpoint,
        handle: &ConnectionHandle,
    ) -> Result<()> {
        let symbols: Vec<String> = {
            let state = self.state.lock().await;
            state.symbols.iter().cloned().collect()
        };
        if symbols.is_empty() {
            return Ok(());
        }

        let limit = self
            .config
            .websocket_market_data_channel_symbols_limit
            .unwrap_or(symbols.len());
        for chunk in symbols.chunks(limit.max(1)) {
            let requests =
                self.adapter
                    .market_data_subscribe_requests(endpoint, chunk, &self.config, &self.stream_ids)?;
            for request in requests {
                self.send_stream_request(handle, request).await?;
            }
            let delay = self
                .config
                .websocket_market_data_channel_send_consecutive_request_delay_seconds;
            if delay > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            }
        }
        Ok(())
    }

    /// Register an outgoing frame in the in-flight map and send it.
    pub(crate) async fn send_stream_request(
        &self,
        handle: &ConnectionHandle,
        request: StreamRequest,
    ) -> Result<()> {
        tracing::debug!(endpoint = %handle.key, id = %request.id, "stream request");
        {
            let mut state = self.state.lock().await;
            state
                .pending_stream_requests
                .insert(request.id.clone(), request.clone());
        }
        handle.send_text(request.payload.clone()).await
    }

    /// Classify and apply one inbound text frame.
    async fn on_stream_frame(self: &Arc<Self>, key: &str, raw: &str) -> Result<()> {
        if self.adapter.is_bare_pong(raw) {
            tracing::trace!(endpoint = %key, "application pong");
            return Ok(());
        }

        let json_payload: serde_json::Value = serde_json::from_str(raw)?;
        let mut message = StreamMessage {
            connection_key: key.to_owned(),
            payload: raw.to_owned(),
            json_payload,
            summary: PayloadSummary::default(),
            request_id: None,
            request: None,
        };
        self.adapter.extract_summary(&mut message);

        if let Some(id) = message.request_id.clone() {
            let mut state = self.state.lock().await;
            message.request = state.pending_stream_requests.remove(&id);
        }

        if self.adapter.is_stream_push(&message) {
            self.dispatch_stream_push(message, TimePoint::now()).await
        } else if self.adapter.is_stream_response_success(&message) {
            self.dispatch_stream_response(message).await
        } else {
            tracing::warn!(payload = %message.payload, "stream response error");
            let directive = self.adapter.on_stream_error(&message);
            self.apply_error_directive(directive).await;
            Ok(())
        }
    }

    /// Route a push frame into the caches it feeds, honoring the configured
    /// subscriptions.
    async fn dispatch_stream_push(&self, message: StreamMessage, now: TimePoint) -> Result<()> {
        for channel in self.adapter.classify_stream_push(&message) {
            match channel {
                StreamChannel::Bbo if self.config.subscribe_bbo => {
                    let bbos = self.adapter.parse_push_bbos(&message)?;
                    let mut state = self.state.lock().await;
                    for bbo in bbos {
                        state.cache.update_bbo(bbo);
                    }
                }
                StreamChannel::Trade if self.config.subscribe_trade => {
                    let trades = self.adapter.parse_push_trades(&message)?;
                    self.state.lock().await.cache.append_live_trades(trades);
                }
                StreamChannel::Ohlcv if self.config.subscribe_ohlcv => {
                    let ohlcvs = self.adapter.parse_push_ohlcvs(&message)?;
                    self.state.lock().await.cache.append_live_ohlcvs(ohlcvs);
                }
                StreamChannel::Order if self.config.subscribe_order => {
                    let orders = self.adapter.parse_push_orders(&message)?;
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
                StreamChannel::Fill if self.config.subscribe_fill => {
                    let fills = self.adapter.parse_push_fills(&message)?;
                    self.state.lock().await.cache.append_live_fills(fills);
                }
                StreamChannel::Position if self.config.subscribe_position => {
                    let positions = self.adapter.parse_push_positions(&message)?;
                    let mut state = self.state.lock().await;
                    for position in positions {
                        state.cache.update_position(position);
                    }
                }
                StreamChannel::Balance if self.config.subscribe_balance => {
                    let balances = self.adapter.parse_push_balances(&message)?;
                    let mut state = self.state.lock().await;
                    for balance in balances {
                        state.cache.update_balance(balance);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Handle a successful correlated response.
    async fn dispatch_stream_response(self: &Arc<Self>, message: StreamMessage) -> Result<()> {
        let key = message.connection_key.clone();
        match self.adapter.classify_stream_response(&message) {
            Some(StreamOp::CreateOrder) => {
                let order = self.adapter.parse_stream_create_order_response(&message)?;
                self.merge_order(order, TimePoint::now()).await;
            }
            Some(StreamOp::CancelOrder) => {
                let order = self.adapter.parse_stream_cancel_order_response(&message)?;
                self.merge_order(order, TimePoint::now()).await;
            }
            Some(StreamOp::Subscribe) => {
                self.schedule_backoff_reset(key);
            }
            Some(StreamOp::Login) => {
                {
                    let mut state = self.state.lock().await;
                    state.logged_in.insert(key.clone());
                }
                tracing::info!(endpoint = %key, "stream logged in");
                self.schedule_backoff_reset(key.clone());

                // Account subscriptions ride the logged-in connection.
                let handle = {
                    let state = self.state.lock().await;
                    state.connections.get(&key).cloned()
                };
                if let Some(handle) = handle {
                    let requests = self
                        .adapter
                        .account_subscribe_requests(&self.config, &self.stream_ids)?;
                    for request in requests {
                        self.send_stream_request(&handle, request).await?;
                    }
                }
            }
            Some(StreamOp::Pong) => {
                tracing::trace!(endpoint = %key, "application pong");
            }
            None => {}
        }
        Ok(())
    }

    /// After an endpoint has been quiet-healthy for the reset window, clear
    /// its reconnect backoff.
    fn schedule_backoff_reset(self: &Arc<Self>, key: String) {
        let inner = Arc::clone(self);
        self.tracker.spawn(async move {
            tokio::select! {
                _ = inner.shutdown.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(BACKOFF_RESET_AFTER_SECONDS)) => {
                    inner.state.lock().await.backoff.reset(&key);
                }
            }
        });
    }

    /// Periodically send the adapter's application ping on every live
    /// connection.
    pub(crate) fn spawn_application_heartbeat(self: &Arc<Self>) {
        let Some(period) = self
            .config
            .websocket_connection_application_level_heartbeat_period_seconds
        else {
            return;
        };
        self.spawn_periodic(period, |inner| async move {
            let handles: Vec<ConnectionHandle> = {
                let state = inner.state.lock().await;
                state.connections.values().cloned().collect()
            };
            for handle in handles {
                if let Some(request) = inner.adapter.application_ping_request(&inner.stream_ids) {
                    if let Err(error) = inner.send_stream_request(&handle, request).await {
                        tracing::warn!(%error, endpoint = %handle.key, "application ping failed");
                    }
                }
            }
        });
    }

    /// Periodically force-close connections that have gone silent past the
    /// heartbeat timeout; the reconnect loop takes over from there.
    pub(crate) fn spawn_idle_timeout_monitor(self: &Arc<Self>) {
        let Some(timeout) = self
            .config
            .websocket_connection_application_level_heartbeat_timeout_seconds
        else {
            return;
        };
        self.spawn_periodic(timeout, move |inner| async move {
            let now = TimePoint::now();
            let handles: Vec<ConnectionHandle> = {
                let state = inner.state.lock().await;
                state.connections.values().cloned().collect()
            };
            for handle in handles {
                if handle.idle_seconds(now).is_some_and(|idle| idle > timeout as f64) {
                    tracing::warn!(endpoint = %handle.key, "idle timeout, closing connection");
                    handle.close(IDLE_TIMEOUT_CLOSE_REASON).await;
                }
            }
        });
    }
}
