//! The per-venue adaptation seam.
//!
//! The session core is written against [`ExchangeAdapter`]; concrete venues
//! are plug-ins implementing it. Every method is pure: builders return
//! request producers that sign against a time point supplied by the request
//! pipeline, classifiers inspect envelopes, converters map deserialized
//! bodies to model entities, and error hooks return a directive the core
//! acts on rather than mutating anything themselves.
//!
//! Methods default to "unsupported" (builders) or "nothing" (classifiers,
//! converters, hooks), so an adapter only implements the seams its venue and
//! configuration actually exercise.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::SessionConfig;
use crate::error::{ExchangeError, Result};
use crate::time::TimePoint;
use crate::types::account::{Balance, Fill, Order, Position};
use crate::types::enums::OrderStatus;
use crate::types::market::{Bbo, Instrument, Ohlcv, Trade};
use crate::wire::{RequestProducer, RestRequest, RestResponse, StreamMessage, StreamRequest};

// ---------------------------------------------------------------------------
// Request ids
// ---------------------------------------------------------------------------

/// Monotone source of request correlation ids, shared between the session
/// and the producers it hands to adapters.
#[derive(Debug, Clone, Default)]
pub struct RequestIdSource(Arc<AtomicU64>);

impl RequestIdSource {
    /// The next id. Ids are unique for the lifetime of the session.
    pub fn next_id(&self) -> String {
        (self.0.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }
}

// ---------------------------------------------------------------------------
// Classification targets
// ---------------------------------------------------------------------------

/// Which domain a REST response belongs to. Adapters classify by request
/// path (and method where paths are shared).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestTarget {
    Instruments,
    Bbo,
    HistoricalTrades,
    HistoricalOhlcvs,
    CreateOrder,
    CancelOrder,
    FetchOrder,
    FetchOpenOrders,
    FetchPositions,
    FetchBalances,
    HistoricalOrders,
    HistoricalFills,
}

/// Which cache a stream push feeds. One frame may feed several (a venue's
/// order channel often carries fill detail too).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamChannel {
    Bbo,
    Trade,
    Ohlcv,
    Order,
    Fill,
    Position,
    Balance,
}

/// Which operation a correlated stream response answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOp {
    CreateOrder,
    CancelOrder,
    Subscribe,
    Login,
    Pong,
}

// ---------------------------------------------------------------------------
// Stream endpoints
// ---------------------------------------------------------------------------

/// One logical subscription endpoint: the `(base_url, path, query)` triple
/// the connection manager maintains a connection for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    pub base_url: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
    /// Whether a login frame must be sent (and acknowledged) after connect.
    pub requires_login: bool,
    /// Whether order operations may be sent over this endpoint once it is
    /// logged in.
    pub supports_trade: bool,
    /// Whether market-data subscribe frames are sent on this endpoint.
    pub carries_market_data: bool,
}

impl StreamEndpoint {
    /// Registry key: the composed URL including query string.
    pub fn key(&self) -> String {
        let query = crate::wire::encode_query(&self.query);
        crate::wire::compose_url(&self.base_url, &crate::wire::path_with_query(&self.path, &query))
    }
}

// ---------------------------------------------------------------------------
// Error directives
// ---------------------------------------------------------------------------

/// Identifies an order by symbol plus venue id and/or client id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderRef {
    pub symbol: String,
    pub order_id: Option<String>,
    pub client_order_id: Option<String>,
}

impl OrderRef {
    pub fn from_order(order: &Order) -> Self {
        Self {
            symbol: order.symbol.clone(),
            order_id: order.order_id.clone(),
            client_order_id: order.client_order_id.clone(),
        }
    }
}

/// What the core should do about a classified failure. Returned by the error
/// hooks; the core performs the corrective fetch and/or marks the local
/// order rejected.
#[derive(Debug, Clone, Default)]
pub struct ErrorDirective {
    /// Schedule a corrective fetch-order for this order.
    pub fetch_order: Option<OrderRef>,
    /// Mark this local order `Rejected` (venue says it does not know it).
    pub mark_rejected: Option<OrderRef>,
}

// ---------------------------------------------------------------------------
// The adapter trait
// ---------------------------------------------------------------------------

/// A request producer that fails with "unsupported operation". The default
/// for builders a venue does not implement.
pub fn unsupported_request(operation: &'static str) -> RequestProducer {
    Box::new(move |_at: TimePoint| {
        Err(ExchangeError::InvalidArgument(format!(
            "unsupported operation: {operation}"
        )))
    })
}

/// Everything the session core needs from a venue.
pub trait ExchangeAdapter: Send + Sync + 'static {
    /// Venue name used in logs, e.g. `"okx"`.
    fn name(&self) -> &str;

    /// Validate the configured market segment. Unknown values abort start.
    fn is_instrument_type_valid(&self, instrument_type: Option<&str>) -> bool {
        let _ = instrument_type;
        true
    }

    /// Map a venue order-state string onto the common progression.
    fn order_status_from_venue(&self, venue_status: &str) -> Option<OrderStatus> {
        let _ = venue_status;
        None
    }

    /// Compose a venue symbol from asset labels, when the venue has a fixed
    /// scheme (e.g. `BTC` + `USDT` → `BTC-USDT`).
    fn symbol_from_assets(&self, base_asset: &str, quote_asset: &str) -> Option<String> {
        let _ = (base_asset, quote_asset);
        None
    }

    /// Venue spelling of a candle interval, e.g. `60` → `"1m"`.
    fn format_ohlcv_interval(&self, interval_seconds: i64) -> String {
        interval_seconds.to_string()
    }

    // -- signing ---------------------------------------------------------

    /// Attach the venue's credential header/query/body set from the
    /// configured credentials. Must be pure apart from mutating `request`,
    /// and must use the supplied time point.
    fn sign_request(&self, request: &mut RestRequest, at: TimePoint, config: &SessionConfig) -> Result<()> {
        let _ = (request, at, config);
        Ok(())
    }

    // -- REST request builders -------------------------------------------

    fn fetch_instruments_request(&self, config: &SessionConfig, ids: &RequestIdSource) -> RequestProducer {
        let _ = (config, ids);
        unsupported_request("fetch instruments")
    }

    fn fetch_bbo_request(&self, config: &SessionConfig, ids: &RequestIdSource) -> RequestProducer {
        let _ = (config, ids);
        unsupported_request("fetch bbo")
    }

    fn historical_trades_request(
        &self,
        symbol: &str,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> RequestProducer {
        let _ = (symbol, config, ids);
        unsupported_request("fetch historical trades")
    }

    fn historical_ohlcvs_request(
        &self,
        symbol: &str,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> RequestProducer {
        let _ = (symbol, config, ids);
        unsupported_request("fetch historical candles")
    }

    fn create_order_request(
        &self,
        order: &Order,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> RequestProducer {
        let _ = (order, config, ids);
        unsupported_request("create order")
    }

    fn cancel_order_request(
        &self,
        order_ref: &OrderRef,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> RequestProducer {
        let _ = (order_ref, config, ids);
        unsupported_request("cancel order")
    }

    fn fetch_order_request(
        &self,
        order_ref: &OrderRef,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> RequestProducer {
        let _ = (order_ref, config, ids);
        unsupported_request("fetch order")
    }

    fn fetch_open_orders_request(&self, config: &SessionConfig, ids: &RequestIdSource) -> RequestProducer {
        let _ = (config, ids);
        unsupported_request("fetch open orders")
    }

    fn fetch_positions_request(&self, config: &SessionConfig, ids: &RequestIdSource) -> RequestProducer {
        let _ = (config, ids);
        unsupported_request("fetch positions")
    }

    fn fetch_balances_request(&self, config: &SessionConfig, ids: &RequestIdSource) -> RequestProducer {
        let _ = (config, ids);
        unsupported_request("fetch balances")
    }

    fn historical_orders_request(
        &self,
        symbol: &str,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> RequestProducer {
        let _ = (symbol, config, ids);
        unsupported_request("fetch historical orders")
    }

    fn historical_fills_request(
        &self,
        symbol: &str,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> RequestProducer {
        let _ = (symbol, config, ids);
        unsupported_request("fetch historical fills")
    }

    // -- REST classification ---------------------------------------------

    /// Success predicate over the whole response. 2xx by default; venues
    /// that tunnel failures inside 2xx bodies tighten this.
    fn is_rest_response_success(&self, response: &RestResponse) -> bool {
        response.status.is_success()
    }

    /// Which domain handler should consume a successful response.
    fn classify_rest_response(&self, response: &RestResponse) -> Option<RestTarget> {
        let _ = response;
        None
    }

    // -- REST converters -------------------------------------------------

    fn parse_instruments(&self, response: &RestResponse) -> Result<Vec<Instrument>> {
        let _ = response;
        Ok(Vec::new())
    }

    fn parse_bbos(&self, response: &RestResponse) -> Result<Vec<Bbo>> {
        let _ = response;
        Ok(Vec::new())
    }

    fn parse_historical_trades(&self, response: &RestResponse) -> Result<Vec<Trade>> {
        let _ = response;
        Ok(Vec::new())
    }

    fn parse_historical_ohlcvs(&self, response: &RestResponse) -> Result<Vec<Ohlcv>> {
        let _ = response;
        Ok(Vec::new())
    }

    fn parse_create_order_response(&self, response: &RestResponse) -> Result<Order> {
        let _ = response;
        Err(ExchangeError::InvalidArgument("unsupported: parse create order".into()))
    }

    fn parse_cancel_order_response(&self, response: &RestResponse) -> Result<Order> {
        let _ = response;
        Err(ExchangeError::InvalidArgument("unsupported: parse cancel order".into()))
    }

    fn parse_fetch_order_response(&self, response: &RestResponse) -> Result<Order> {
        let _ = response;
        Err(ExchangeError::InvalidArgument("unsupported: parse fetch order".into()))
    }

    fn parse_open_orders(&self, response: &RestResponse) -> Result<Vec<Order>> {
        let _ = response;
        Ok(Vec::new())
    }

    fn parse_positions(&self, response: &RestResponse) -> Result<Vec<Position>> {
        let _ = response;
        Ok(Vec::new())
    }

    fn parse_balances(&self, response: &RestResponse) -> Result<Vec<Balance>> {
        let _ = response;
        Ok(Vec::new())
    }

    fn parse_historical_orders(&self, response: &RestResponse) -> Result<Vec<Order>> {
        let _ = response;
        Ok(Vec::new())
    }

    fn parse_historical_fills(&self, response: &RestResponse) -> Result<Vec<Fill>> {
        let _ = response;
        Ok(Vec::new())
    }

    // -- pagination producers --------------------------------------------
    //
    // Return the next request of the chain (walking backwards in time), or
    // `None` to terminate: the window start was reached or the server
    // returned no cursor. Venues with a recent+archive endpoint pair return
    // the archive request at the recent-exhausted boundary.

    fn next_historical_trades_request(
        &self,
        response: &RestResponse,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> Option<RequestProducer> {
        let _ = (response, config, ids);
        None
    }

    fn next_historical_ohlcvs_request(
        &self,
        response: &RestResponse,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> Option<RequestProducer> {
        let _ = (response, config, ids);
        None
    }

    fn next_open_orders_request(
        &self,
        response: &RestResponse,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> Option<RequestProducer> {
        let _ = (response, config, ids);
        None
    }

    fn next_historical_orders_request(
        &self,
        response: &RestResponse,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> Option<RequestProducer> {
        let _ = (response, config, ids);
        None
    }

    fn next_historical_fills_request(
        &self,
        response: &RestResponse,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> Option<RequestProducer> {
        let _ = (response, config, ids);
        None
    }

    // -- error hooks ------------------------------------------------------

    /// Decide what to do about a classified REST failure.
    fn on_rest_error(&self, response: &RestResponse) -> ErrorDirective {
        let _ = response;
        ErrorDirective::default()
    }

    /// Decide what to do about a classified stream response error.
    fn on_stream_error(&self, message: &StreamMessage) -> ErrorDirective {
        let _ = message;
        ErrorDirective::default()
    }

    // -- stream seams ------------------------------------------------------

    /// The subscription endpoints this venue and configuration need.
    fn stream_endpoints(&self, config: &SessionConfig) -> Vec<StreamEndpoint> {
        let _ = config;
        Vec::new()
    }

    /// Whether a raw text frame is the venue's bare application pong. Some
    /// venues answer `ping` with a bare `pong` that is not valid JSON; those
    /// frames are consumed before JSON parsing.
    fn is_bare_pong(&self, raw: &str) -> bool {
        raw == "pong"
    }

    /// Derive the classification summary (and request-correlation id) from a
    /// deserialized frame.
    fn extract_summary(&self, message: &mut StreamMessage);

    /// Whether a frame is push data, as opposed to the answer to an
    /// outgoing request. Venues whose control-plane acknowledgements carry
    /// no request id discriminate on the summary instead.
    fn is_stream_push(&self, message: &StreamMessage) -> bool {
        message.request_id.is_none()
    }

    /// Whether a correlated response indicates success.
    fn is_stream_response_success(&self, message: &StreamMessage) -> bool {
        let _ = message;
        false
    }

    /// Which caches a push frame feeds. Order and fill detail often share a
    /// channel, hence a list.
    fn classify_stream_push(&self, message: &StreamMessage) -> Vec<StreamChannel> {
        let _ = message;
        Vec::new()
    }

    /// Which operation a successful correlated response answers.
    fn classify_stream_response(&self, message: &StreamMessage) -> Option<StreamOp> {
        let _ = message;
        None
    }

    /// The signed login frame for login-gated endpoints.
    fn login_request(
        &self,
        at: TimePoint,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> Result<Option<StreamRequest>> {
        let _ = (at, config, ids);
        Ok(None)
    }

    /// The application-level ping frame, for venues that require one.
    fn application_ping_request(&self, ids: &RequestIdSource) -> Option<StreamRequest> {
        let _ = ids;
        None
    }

    /// Subscribe frames for one chunk of symbols on a market-data endpoint.
    fn market_data_subscribe_requests(
        &self,
        endpoint: &StreamEndpoint,
        symbols: &[String],
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> Result<Vec<StreamRequest>> {
        let _ = (endpoint, symbols, config, ids);
        Ok(Vec::new())
    }

    /// Subscribe frames for the account channels, sent after login.
    fn account_subscribe_requests(
        &self,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> Result<Vec<StreamRequest>> {
        let _ = (config, ids);
        Ok(Vec::new())
    }

    /// Stream-side create-order frame.
    fn stream_create_order_request(&self, order: &Order, ids: &RequestIdSource) -> Result<StreamRequest> {
        let _ = (order, ids);
        Err(ExchangeError::InvalidArgument("unsupported: stream create order".into()))
    }

    /// Stream-side cancel-order frame.
    fn stream_cancel_order_request(
        &self,
        order_ref: &OrderRef,
        ids: &RequestIdSource,
    ) -> Result<StreamRequest> {
        let _ = (order_ref, ids);
        Err(ExchangeError::InvalidArgument("unsupported: stream cancel order".into()))
    }

    // -- stream converters -------------------------------------------------

    fn parse_push_bbos(&self, message: &StreamMessage) -> Result<Vec<Bbo>> {
        let _ = message;
        Ok(Vec::new())
    }

    fn parse_push_trades(&self, message: &StreamMessage) -> Result<Vec<Trade>> {
        let _ = message;
        Ok(Vec::new())
    }

    fn parse_push_ohlcvs(&self, message: &StreamMessage) -> Result<Vec<Ohlcv>> {
        let _ = message;
        Ok(Vec::new())
    }

    fn parse_push_orders(&self, message: &StreamMessage) -> Result<Vec<Order>> {
        let _ = message;
        Ok(Vec::new())
    }

    fn parse_push_fills(&self, message: &StreamMessage) -> Result<Vec<Fill>> {
        let _ = message;
        Ok(Vec::new())
    }

    fn parse_push_positions(&self, message: &StreamMessage) -> Result<Vec<Position>> {
        let _ = message;
        Ok(Vec::new())
    }

    fn parse_push_balances(&self, message: &StreamMessage) -> Result<Vec<Balance>> {
        let _ = message;
        Ok(Vec::new())
    }

    fn parse_stream_create_order_response(&self, message: &StreamMessage) -> Result<Order> {
        let _ = message;
        Err(ExchangeError::InvalidArgument("unsupported: parse stream create order".into()))
    }

    fn parse_stream_cancel_order_response(&self, message: &StreamMessage) -> Result<Order> {
        let _ = message;
        Err(ExchangeError::InvalidArgument("unsupported: parse stream cancel order".into()))
    }
}
