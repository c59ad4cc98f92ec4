//! OKX venue adapter.
//!
//! Implements [`ExchangeAdapter`] for OKX v5: REST paths and WebSocket
//! channels, HMAC-SHA256 request signing, the signed login frame, payload
//! conversion for every domain, and backwards pagination including the
//! recent/archive endpoint pair for historical orders and fills.
//!
//! Demo trading (`is_paper_trading`) switches the stream host and attaches
//! the `x-simulated-trading` header to signed requests.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use base64::prelude::*;
use hmac::{Hmac, Mac};
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use sha2::Sha256;

use crate::adapter::{
    ErrorDirective, ExchangeAdapter, OrderRef, RequestIdSource, RestTarget, StreamChannel,
    StreamEndpoint, StreamOp,
};
use crate::config::SessionConfig;
use crate::error::{ExchangeError, Result};
use crate::numeric::{decimal_to_string, normalize_decimal_string, strip_leading_sign};
use crate::time::TimePoint;
use crate::types::account::{Balance, Fill, Order, Position};
use crate::types::enums::{ApiMethod, MarginType, OrderStatus};
use crate::types::market::{Bbo, Instrument, Ohlcv, Trade};
use crate::wire::{PayloadSummary, RequestProducer, RestRequest, RestResponse, StreamMessage, StreamRequest};

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

const REST_BASE_URL: &str = "https://www.okx.com";
const WS_BASE_URL: &str = "wss://ws.okx.com:8443";
const WS_DEMO_BASE_URL: &str = "wss://wspap.okx.com:8443";

const INSTRUMENTS_PATH: &str = "/api/v5/public/instruments";
const TICKERS_PATH: &str = "/api/v5/market/tickers";
const HISTORY_TRADES_PATH: &str = "/api/v5/market/history-trades";
const HISTORY_CANDLES_PATH: &str = "/api/v5/market/history-candles";
const TRADE_ORDER_PATH: &str = "/api/v5/trade/order";
const CANCEL_ORDER_PATH: &str = "/api/v5/trade/cancel-order";
const ORDERS_PENDING_PATH: &str = "/api/v5/trade/orders-pending";
const POSITIONS_PATH: &str = "/api/v5/account/positions";
const BALANCE_PATH: &str = "/api/v5/account/balance";
const ORDERS_HISTORY_PATH: &str = "/api/v5/trade/orders-history";
const ORDERS_HISTORY_ARCHIVE_PATH: &str = "/api/v5/trade/orders-history-archive";
const FILLS_PATH: &str = "/api/v5/trade/fills";
const FILLS_HISTORY_PATH: &str = "/api/v5/trade/fills-history";

const WS_PUBLIC_PATH: &str = "/ws/v5/public";
const WS_BUSINESS_PATH: &str = "/ws/v5/business";
const WS_PRIVATE_PATH: &str = "/ws/v5/private";

const CHANNEL_BBO: &str = "bbo-tbt";
const CHANNEL_TRADES: &str = "trades";
const CHANNEL_CANDLE_PREFIX: &str = "candle";
const CHANNEL_ORDERS: &str = "orders";
const CHANNEL_POSITIONS: &str = "positions";
const CHANNEL_BALANCE: &str = "balance_and_position";

/// Venue codes that mean "the order does not exist".
const UNKNOWN_ORDER_CODES: [&str; 2] = ["51001", "51603"];

const DEFAULT_BROKER_ID: &str = "9cbc6a17a1fcBCDE";

// ---------------------------------------------------------------------------
// Instrument type
// ---------------------------------------------------------------------------

/// OKX market segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OkxInstrumentType {
    Spot,
    Margin,
    Swap,
    Futures,
    Option,
}

impl OkxInstrumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spot => "SPOT",
            Self::Margin => "MARGIN",
            Self::Swap => "SWAP",
            Self::Futures => "FUTURES",
            Self::Option => "OPTION",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "SPOT" => Some(Self::Spot),
            "MARGIN" => Some(Self::Margin),
            "SWAP" => Some(Self::Swap),
            "FUTURES" => Some(Self::Futures),
            "OPTION" => Some(Self::Option),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Credential set captured into request producers so signing stays pure of
/// the adapter itself.
#[derive(Clone)]
struct OkxSigner {
    api_key: String,
    api_secret: String,
    api_passphrase: String,
    simulated: bool,
}

impl OkxSigner {
    fn from_config(config: &SessionConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            api_passphrase: config.api_passphrase.clone(),
            simulated: config.is_paper_trading,
        }
    }

    fn signature(&self, prehash: &str) -> Result<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| ExchangeError::Signature(e.to_string()))?;
        mac.update(prehash.as_bytes());
        Ok(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Attach the OKX credential headers. The prehash is
    /// `timestamp + method + path?query + body`.
    fn sign(&self, request: &mut RestRequest, at: TimePoint) -> Result<()> {
        let timestamp = at.to_iso8601_millis();
        let prehash = format!(
            "{timestamp}{}{}{}",
            request.method,
            request.path_with_query_string(),
            request.payload.as_deref().unwrap_or("")
        );
        let signature = self.signature(&prehash)?;

        request.headers.insert("CONTENT-TYPE".into(), "application/json".into());
        request.headers.insert("OK-ACCESS-KEY".into(), self.api_key.clone());
        request.headers.insert("OK-ACCESS-TIMESTAMP".into(), timestamp);
        request
            .headers
            .insert("OK-ACCESS-PASSPHRASE".into(), self.api_passphrase.clone());
        request.headers.insert("OK-ACCESS-SIGN".into(), signature);
        if self.simulated {
            request.headers.insert("x-simulated-trading".into(), "1".into());
        }
        Ok(())
    }

    /// The signed login frame argument for the private stream.
    fn login_arg(&self, at: TimePoint) -> Result<Value> {
        let timestamp = at.secs;
        let signature = self.signature(&format!("{timestamp}GET/users/self/verify"))?;
        Ok(json!({
            "apiKey": self.api_key,
            "passphrase": self.api_passphrase,
            "timestamp": timestamp,
            "sign": signature,
        }))
    }
}

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

fn opt_string(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn millis_time_point(value: &Value, key: &str) -> Option<TimePoint> {
    value
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<i64>().ok())
        .map(TimePoint::from_unix_millis)
}

fn int_field(value: &Value, key: &str) -> Option<i64> {
    value.get(key).and_then(Value::as_str).and_then(|s| s.parse().ok())
}

fn data_array(payload: &Value) -> Result<&Vec<Value>> {
    payload
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ExchangeError::InvalidArgument("response has no data array".into()))
}

fn response_data(response: &RestResponse) -> Result<&Vec<Value>> {
    let payload = response
        .json_payload
        .as_ref()
        .ok_or_else(|| ExchangeError::InvalidArgument("response body is not JSON".into()))?;
    data_array(payload)
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Per-instrument metadata remembered from the latest instrument refresh,
/// needed when later payloads must be interpreted against contract terms.
#[derive(Debug, Clone, Default)]
struct InstrumentMeta {
    base_asset: Option<String>,
    quote_asset: Option<String>,
    contract_size: Option<Decimal>,
}

/// The OKX v5 adapter. One instance serves one market segment.
pub struct OkxAdapter {
    instrument_type: OkxInstrumentType,
    broker_id: String,
    /// Contract terms by symbol, refreshed by `parse_instruments`. The one
    /// stated impurity: order and position conversion needs contract size
    /// and base/quote assets.
    instrument_meta: RwLock<HashMap<String, InstrumentMeta>>,
}

impl OkxAdapter {
    pub fn new(instrument_type: OkxInstrumentType) -> Self {
        Self {
            instrument_type,
            broker_id: DEFAULT_BROKER_ID.to_owned(),
            instrument_meta: RwLock::new(HashMap::new()),
        }
    }

    /// Spot market adapter.
    pub fn spot() -> Self {
        Self::new(OkxInstrumentType::Spot)
    }

    /// Perpetual swap adapter.
    pub fn swap() -> Self {
        Self::new(OkxInstrumentType::Swap)
    }

    /// Override the broker tag attached to order payloads.
    pub fn with_broker_id(mut self, broker_id: impl Into<String>) -> Self {
        self.broker_id = broker_id.into();
        self
    }

    fn inst_type(&self) -> &'static str {
        self.instrument_type.as_str()
    }

    fn meta_for(&self, symbol: &str) -> InstrumentMeta {
        self.instrument_meta
            .read()
            .ok()
            .and_then(|meta| meta.get(symbol).cloned())
            .unwrap_or_default()
    }

    fn contract_size_for(&self, symbol: &str) -> Decimal {
        self.meta_for(symbol).contract_size.unwrap_or(Decimal::ONE)
    }

    // -- producer helpers --------------------------------------------------

    fn public_get(ids: &RequestIdSource, path: &'static str, params: BTreeMap<String, String>) -> RequestProducer {
        let ids = ids.clone();
        Box::new(move |_at| {
            Ok(RestRequest::new(ids.next_id(), REST_BASE_URL, Method::GET, path)
                .with_query_params(params))
        })
    }

    fn signed_get(
        signer: OkxSigner,
        ids: &RequestIdSource,
        path: String,
        params: BTreeMap<String, String>,
    ) -> RequestProducer {
        let ids = ids.clone();
        Box::new(move |at| {
            let mut request = RestRequest::new(ids.next_id(), REST_BASE_URL, Method::GET, &path)
                .with_query_params(params);
            signer.sign(&mut request, at)?;
            Ok(request)
        })
    }

    fn signed_post(
        signer: OkxSigner,
        ids: &RequestIdSource,
        path: &'static str,
        payload: Value,
    ) -> RequestProducer {
        let ids = ids.clone();
        Box::new(move |at| {
            let mut request = RestRequest::new(ids.next_id(), REST_BASE_URL, Method::POST, path)
                .with_json_payload(payload)?;
            signer.sign(&mut request, at)?;
            Ok(request)
        })
    }

    // -- payloads -----------------------------------------------------------

    fn create_order_payload(&self, order: &Order) -> Value {
        let ord_type = if order.is_market {
            "market"
        } else if order.is_post_only {
            "post_only"
        } else if order.is_fok {
            "fok"
        } else if order.is_ioc {
            "ioc"
        } else {
            "limit"
        };

        let mut payload = json!({
            "instId": order.symbol,
            "tdMode": order.margin_type.map(MarginType::as_str).unwrap_or("cash"),
            "clOrdId": order.client_order_id,
            "side": if order.is_buy == Some(false) { "sell" } else { "buy" },
            "ordType": ord_type,
            "sz": order.quantity,
            "tag": self.broker_id,
        });
        if let Some(price) = &order.price {
            payload["px"] = json!(price);
        }
        if order.is_reduce_only {
            payload["reduceOnly"] = json!(true);
        }
        if let Some(extra) = &order.extra_params {
            for (key, value) in extra {
                payload[key.as_str()] = value.clone();
            }
        }
        payload
    }

    fn cancel_order_payload(&self, order_ref: &OrderRef) -> Value {
        let mut payload = json!({ "instId": order_ref.symbol });
        if let Some(order_id) = &order_ref.order_id {
            payload["ordId"] = json!(order_id);
        } else {
            payload["clOrdId"] = json!(order_ref.client_order_id);
        }
        payload
    }

    // -- entity conversion ---------------------------------------------------

    fn convert_trade(&self, input: &Value, api_method: ApiMethod, symbol: &str) -> Trade {
        Trade {
            api_method: Some(api_method),
            symbol: symbol.to_owned(),
            exchange_update_time_point: millis_time_point(input, "ts"),
            trade_id: opt_string(input, "tradeId"),
            is_trade_id_monotonic_increase: true,
            price: opt_string(input, "px"),
            size: opt_string(input, "sz"),
            is_buyer_maker: input.get("side").and_then(Value::as_str).map(|side| side == "sell"),
        }
    }

    /// Candle rows are positional arrays:
    /// `[ts, o, h, l, c, vol, volCcy, volCcyQuote, confirm]`.
    fn convert_ohlcv(&self, input: &Value, api_method: ApiMethod, symbol: &str) -> Ohlcv {
        let cell = |index: usize| -> Option<String> {
            input
                .get(index)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        Ohlcv {
            api_method: Some(api_method),
            symbol: symbol.to_owned(),
            start_unix_timestamp_seconds: input
                .get(0)
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<i64>().ok())
                .map(|millis| millis / 1_000),
            open_price: cell(1),
            high_price: cell(2),
            low_price: cell(3),
            close_price: cell(4),
            volume: cell(5),
            quote_volume: cell(7),
        }
    }

    fn convert_order(&self, input: &Value, api_method: ApiMethod, symbol: &str) -> Order {
        let ord_type = input.get("ordType").and_then(Value::as_str).unwrap_or_default();
        let margin_type = match input.get("tdMode").and_then(Value::as_str) {
            Some("isolated") => Some(MarginType::Isolated),
            Some("cross") => Some(MarginType::Cross),
            _ => None,
        };

        let cumulative_filled_quantity = opt_string(input, "accFillSz");
        let cumulative_filled_quote_quantity = match (
            opt_string(input, "avgPx").and_then(|s| s.parse::<Decimal>().ok()),
            cumulative_filled_quantity
                .as_deref()
                .and_then(|s| s.parse::<Decimal>().ok()),
        ) {
            (Some(avg_px), Some(filled)) => Some(decimal_to_string(
                &(avg_px * filled * self.contract_size_for(symbol)),
                false,
            )),
            _ => None,
        };

        Order {
            api_method: Some(api_method),
            symbol: symbol.to_owned(),
            exchange_update_time_point: millis_time_point(input, "uTime"),
            order_id: opt_string(input, "ordId"),
            client_order_id: opt_string(input, "clOrdId"),
            is_buy: input.get("side").and_then(Value::as_str).map(|side| side == "buy"),
            price: opt_string(input, "px"),
            quantity: opt_string(input, "sz"),
            is_market: ord_type == "market",
            is_post_only: ord_type == "post_only",
            is_fok: ord_type == "fok",
            is_ioc: ord_type == "ioc",
            is_reduce_only: input.get("reduceOnly").and_then(Value::as_str) == Some("true"),
            margin_type,
            margin_asset: None,
            extra_params: None,
            cumulative_filled_quantity,
            cumulative_filled_quote_quantity,
            exchange_create_time_point: millis_time_point(input, "cTime"),
            local_update_time_point: None,
            status: input
                .get("state")
                .and_then(Value::as_str)
                .and_then(|state| self.order_status_from_venue(state)),
            extra_data: None,
        }
    }

    fn convert_fill(&self, input: &Value, api_method: ApiMethod, symbol: &str) -> Fill {
        let fee = opt_string(input, "fillFee").or_else(|| opt_string(input, "fee"));
        let fee_asset = opt_string(input, "fillFeeCcy").or_else(|| opt_string(input, "feeCcy"));
        let is_fee_rebate = fee.as_deref().map(|f| !f.starts_with('-'));

        Fill {
            api_method: Some(api_method),
            symbol: symbol.to_owned(),
            exchange_update_time_point: millis_time_point(input, "fillTime"),
            order_id: opt_string(input, "ordId"),
            client_order_id: opt_string(input, "clOrdId"),
            trade_id: opt_string(input, "tradeId"),
            is_trade_id_monotonic_increase: true,
            is_buy: input.get("side").and_then(Value::as_str).map(|side| side == "buy"),
            price: opt_string(input, "fillPx"),
            quantity: opt_string(input, "fillSz"),
            is_maker: input
                .get("execType")
                .and_then(Value::as_str)
                .map(|exec| exec == "M"),
            fee_asset,
            fee_quantity: fee.as_deref().map(|f| strip_leading_sign(f).to_owned()),
            is_fee_rebate,
        }
    }

    fn convert_position(&self, input: &Value, api_method: ApiMethod) -> Position {
        let symbol = opt_string(input, "instId").unwrap_or_default();
        let pos = opt_string(input, "pos").unwrap_or_default();
        let pos_side = input.get("posSide").and_then(Value::as_str).unwrap_or_default();

        // Long/short mode reports the side directly; net mode derives it
        // from the sign (derivatives) or the position currency (margin).
        let is_long = match pos_side {
            "long" => Some(true),
            "short" => Some(false),
            _ => match self.instrument_type {
                OkxInstrumentType::Futures | OkxInstrumentType::Swap | OkxInstrumentType::Option => {
                    Some(!pos.starts_with('-'))
                }
                OkxInstrumentType::Margin => {
                    let meta = self.meta_for(&symbol);
                    let pos_ccy = opt_string(input, "posCcy");
                    match (pos_ccy, meta.base_asset, meta.quote_asset) {
                        (Some(ccy), Some(base), _) if ccy == base => Some(true),
                        (Some(ccy), _, Some(quote)) if ccy == quote => Some(false),
                        _ => None,
                    }
                }
                OkxInstrumentType::Spot => None,
            },
        };

        Position {
            api_method: Some(api_method),
            symbol,
            exchange_update_time_point: millis_time_point(input, "uTime"),
            margin_type: match input.get("mgnMode").and_then(Value::as_str) {
                Some("isolated") => Some(MarginType::Isolated),
                Some("cross") => Some(MarginType::Cross),
                _ => None,
            },
            quantity: Some(strip_leading_sign(&pos).to_owned()),
            is_long,
            entry_price: opt_string(input, "avgPx"),
            mark_price: opt_string(input, "markPx"),
            leverage: opt_string(input, "lever"),
            initial_margin: opt_string(input, "imr"),
            maintenance_margin: opt_string(input, "mmr"),
            unrealized_pnl: opt_string(input, "upl"),
            liquidation_price: opt_string(input, "liqPx"),
        }
    }

    fn convert_balance(&self, input: &Value, api_method: ApiMethod) -> Balance {
        Balance {
            api_method: Some(api_method),
            asset: opt_string(input, "ccy").unwrap_or_default(),
            exchange_update_time_point: millis_time_point(input, "uTime"),
            quantity: opt_string(input, "cashBal"),
        }
    }

    /// Order ref recovered from a create/cancel payload, for the error hook.
    fn order_ref_from_payload(payload: &Value) -> OrderRef {
        OrderRef {
            symbol: opt_string(payload, "instId").unwrap_or_default(),
            order_id: opt_string(payload, "ordId"),
            client_order_id: opt_string(payload, "clOrdId"),
        }
    }
}

impl ExchangeAdapter for OkxAdapter {
    fn name(&self) -> &str {
        "okx"
    }

    fn is_instrument_type_valid(&self, instrument_type: Option<&str>) -> bool {
        match instrument_type {
            None => self.instrument_type == OkxInstrumentType::Spot,
            Some(value) => OkxInstrumentType::parse(value) == Some(self.instrument_type),
        }
    }

    fn order_status_from_venue(&self, venue_status: &str) -> Option<OrderStatus> {
        match venue_status {
            "live" => Some(OrderStatus::New),
            "partially_filled" => Some(OrderStatus::PartiallyFilled),
            "filled" => Some(OrderStatus::Filled),
            "canceled" | "mmp_canceled" => Some(OrderStatus::Canceled),
            _ => None,
        }
    }

    fn symbol_from_assets(&self, base_asset: &str, quote_asset: &str) -> Option<String> {
        Some(format!(
            "{}-{}",
            base_asset.to_uppercase(),
            quote_asset.to_uppercase()
        ))
    }

    fn format_ohlcv_interval(&self, interval_seconds: i64) -> String {
        if interval_seconds < 60 {
            format!("{interval_seconds}s")
        } else if interval_seconds < 3_600 {
            format!("{}m", interval_seconds / 60)
        } else if interval_seconds < 86_400 {
            format!("{}H", interval_seconds / 3_600)
        } else {
            format!("{}D", interval_seconds / 86_400)
        }
    }

    fn sign_request(&self, request: &mut RestRequest, at: TimePoint, config: &SessionConfig) -> Result<()> {
        OkxSigner::from_config(config).sign(request, at)
    }

    // -- request builders ---------------------------------------------------

    fn fetch_instruments_request(&self, _config: &SessionConfig, ids: &RequestIdSource) -> RequestProducer {
        let mut params = BTreeMap::new();
        params.insert("instType".into(), self.inst_type().to_owned());
        Self::public_get(ids, INSTRUMENTS_PATH, params)
    }

    fn fetch_bbo_request(&self, _config: &SessionConfig, ids: &RequestIdSource) -> RequestProducer {
        // Margin trades on spot books.
        let inst_type = if self.instrument_type == OkxInstrumentType::Margin {
            OkxInstrumentType::Spot.as_str()
        } else {
            self.inst_type()
        };
        let mut params = BTreeMap::new();
        params.insert("instType".into(), inst_type.to_owned());
        Self::public_get(ids, TICKERS_PATH, params)
    }

    fn historical_trades_request(
        &self,
        symbol: &str,
        _config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> RequestProducer {
        let mut params = BTreeMap::new();
        params.insert("instId".into(), symbol.to_owned());
        params.insert("type".into(), "1".into());
        Self::public_get(ids, HISTORY_TRADES_PATH, params)
    }

    fn historical_ohlcvs_request(
        &self,
        symbol: &str,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> RequestProducer {
        let interval = config.ohlcv_interval_seconds;
        let end = config
            .fetch_historical_ohlcv_end_unix_timestamp_seconds
            .unwrap_or_else(|| TimePoint::now().secs);
        // Walk backwards from the bucket after the end bound.
        let after_millis = (end / interval * interval + interval) * 1_000;

        let mut params = BTreeMap::new();
        params.insert("instId".into(), symbol.to_owned());
        params.insert("after".into(), after_millis.to_string());
        params.insert("bar".into(), self.format_ohlcv_interval(interval));
        Self::public_get(ids, HISTORY_CANDLES_PATH, params)
    }

    fn create_order_request(
        &self,
        order: &Order,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> RequestProducer {
        Self::signed_post(
            OkxSigner::from_config(config),
            ids,
            TRADE_ORDER_PATH,
            self.create_order_payload(order),
        )
    }

    fn cancel_order_request(
        &self,
        order_ref: &OrderRef,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> RequestProducer {
        Self::signed_post(
            OkxSigner::from_config(config),
            ids,
            CANCEL_ORDER_PATH,
            self.cancel_order_payload(order_ref),
        )
    }

    fn fetch_order_request(
        &self,
        order_ref: &OrderRef,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> RequestProducer {
        let mut params = BTreeMap::new();
        params.insert("instId".into(), order_ref.symbol.clone());
        if let Some(order_id) = &order_ref.order_id {
            params.insert("ordId".into(), order_id.clone());
        } else if let Some(client_order_id) = &order_ref.client_order_id {
            params.insert("clOrdId".into(), client_order_id.clone());
        }
        Self::signed_get(
            OkxSigner::from_config(config),
            ids,
            TRADE_ORDER_PATH.to_owned(),
            params,
        )
    }

    fn fetch_open_orders_request(&self, config: &SessionConfig, ids: &RequestIdSource) -> RequestProducer {
        let mut params = BTreeMap::new();
        params.insert("instType".into(), self.inst_type().to_owned());
        Self::signed_get(
            OkxSigner::from_config(config),
            ids,
            ORDERS_PENDING_PATH.to_owned(),
            params,
        )
    }

    fn fetch_positions_request(&self, config: &SessionConfig, ids: &RequestIdSource) -> RequestProducer {
        let mut params = BTreeMap::new();
        params.insert("instType".into(), self.inst_type().to_owned());
        Self::signed_get(
            OkxSigner::from_config(config),
            ids,
            POSITIONS_PATH.to_owned(),
            params,
        )
    }

    fn fetch_balances_request(&self, config: &SessionConfig, ids: &RequestIdSource) -> RequestProducer {
        Self::signed_get(
            OkxSigner::from_config(config),
            ids,
            BALANCE_PATH.to_owned(),
            BTreeMap::new(),
        )
    }

    fn historical_orders_request(
        &self,
        symbol: &str,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> RequestProducer {
        let mut params = BTreeMap::new();
        params.insert("instType".into(), self.inst_type().to_owned());
        params.insert("instId".into(), symbol.to_owned());
        Self::signed_get(
            OkxSigner::from_config(config),
            ids,
            ORDERS_HISTORY_PATH.to_owned(),
            params,
        )
    }

    fn historical_fills_request(
        &self,
        symbol: &str,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> RequestProducer {
        let mut params = BTreeMap::new();
        params.insert("instType".into(), self.inst_type().to_owned());
        params.insert("instId".into(), symbol.to_owned());
        Self::signed_get(
            OkxSigner::from_config(config),
            ids,
            FILLS_PATH.to_owned(),
            params,
        )
    }

    // -- classification -----------------------------------------------------

    fn is_rest_response_success(&self, response: &RestResponse) -> bool {
        // OKX tunnels failures inside 200 OK bodies; "0" is the only
        // success code.
        response.status.is_success()
            && response
                .json_payload
                .as_ref()
                .and_then(|payload| payload.get("code"))
                .and_then(Value::as_str)
                == Some("0")
    }

    fn classify_rest_response(&self, response: &RestResponse) -> Option<RestTarget> {
        let request = &response.request;
        match request.path.as_str() {
            INSTRUMENTS_PATH => Some(RestTarget::Instruments),
            TICKERS_PATH => Some(RestTarget::Bbo),
            HISTORY_TRADES_PATH => Some(RestTarget::HistoricalTrades),
            HISTORY_CANDLES_PATH => Some(RestTarget::HistoricalOhlcvs),
            TRADE_ORDER_PATH if request.method == Method::POST => Some(RestTarget::CreateOrder),
            TRADE_ORDER_PATH => Some(RestTarget::FetchOrder),
            CANCEL_ORDER_PATH => Some(RestTarget::CancelOrder),
            ORDERS_PENDING_PATH => Some(RestTarget::FetchOpenOrders),
            POSITIONS_PATH => Some(RestTarget::FetchPositions),
            BALANCE_PATH => Some(RestTarget::FetchBalances),
            ORDERS_HISTORY_PATH | ORDERS_HISTORY_ARCHIVE_PATH => Some(RestTarget::HistoricalOrders),
            FILLS_PATH | FILLS_HISTORY_PATH => Some(RestTarget::HistoricalFills),
            _ => None,
        }
    }

    // -- converters -----------------------------------------------------------

    fn parse_instruments(&self, response: &RestResponse) -> Result<Vec<Instrument>> {
        let data = response_data(response)?;
        let instruments: Vec<Instrument> = data
            .iter()
            .map(|x| Instrument {
                api_method: Some(ApiMethod::Rest),
                symbol: opt_string(x, "instId").unwrap_or_default(),
                base_asset: opt_string(x, "baseCcy"),
                quote_asset: opt_string(x, "quoteCcy"),
                order_price_increment: opt_string(x, "tickSz").map(|s| normalize_decimal_string(&s)),
                order_quantity_increment: opt_string(x, "lotSz").map(|s| normalize_decimal_string(&s)),
                order_quantity_min: opt_string(x, "minSz").map(|s| normalize_decimal_string(&s)),
                order_quantity_max: opt_string(x, "maxLmtSz").map(|s| normalize_decimal_string(&s)),
                order_quote_quantity_min: None,
                order_quote_quantity_max: opt_string(x, "maxLmtAmt").map(|s| normalize_decimal_string(&s)),
                margin_asset: opt_string(x, "settleCcy"),
                underlying_symbol: opt_string(x, "uly"),
                contract_size: opt_string(x, "ctVal").map(|s| normalize_decimal_string(&s)),
                contract_multiplier: opt_string(x, "ctMult").map(|s| normalize_decimal_string(&s)),
                expiry_unix_timestamp_seconds: int_field(x, "expTime").map(|millis| millis / 1_000),
                is_open_for_trade: x
                    .get("state")
                    .and_then(Value::as_str)
                    .map(|state| state == "live" || state == "preopen"),
            })
            .collect();

        if let Ok(mut meta) = self.instrument_meta.write() {
            for instrument in &instruments {
                meta.insert(
                    instrument.symbol.clone(),
                    InstrumentMeta {
                        base_asset: instrument.base_asset.clone(),
                        quote_asset: instrument.quote_asset.clone(),
                        contract_size: instrument
                            .contract_size
                            .as_deref()
                            .and_then(|s| s.parse().ok()),
                    },
                );
            }
        }
        Ok(instruments)
    }

    fn parse_bbos(&self, response: &RestResponse) -> Result<Vec<Bbo>> {
        let data = response_data(response)?;
        Ok(data
            .iter()
            .filter_map(|x| {
                let symbol = opt_string(x, "instId")?;
                Some(Bbo {
                    api_method: Some(ApiMethod::Rest),
                    symbol,
                    exchange_update_time_point: millis_time_point(x, "ts"),
                    best_bid_price: opt_string(x, "bidPx"),
                    best_bid_size: opt_string(x, "bidSz"),
                    best_ask_price: opt_string(x, "askPx"),
                    best_ask_size: opt_string(x, "askSz"),
                })
            })
            .collect())
    }

    fn parse_historical_trades(&self, response: &RestResponse) -> Result<Vec<Trade>> {
        let data = response_data(response)?;
        Ok(data
            .iter()
            .filter_map(|x| {
                let symbol = opt_string(x, "instId")?;
                Some(self.convert_trade(x, ApiMethod::Rest, &symbol))
            })
            .collect())
    }

    fn parse_historical_ohlcvs(&self, response: &RestResponse) -> Result<Vec<Ohlcv>> {
        let symbol = response
            .request
            .query_param("instId")
            .ok_or_else(|| ExchangeError::InvalidArgument("candle request has no instId".into()))?;
        let data = response_data(response)?;
        Ok(data
            .iter()
            .map(|x| self.convert_ohlcv(x, ApiMethod::Rest, &symbol))
            .collect())
    }

    fn parse_create_order_response(&self, response: &RestResponse) -> Result<Order> {
        let data = response_data(response)?;
        let x = data
            .first()
            .ok_or_else(|| ExchangeError::InvalidArgument("empty create order response".into()))?;
        let payload = response.request.json_payload.as_ref().ok_or_else(|| {
            ExchangeError::InvalidArgument("create order request has no payload".into())
        })?;
        let ts = millis_time_point(x, "ts");
        Ok(Order {
            api_method: Some(ApiMethod::Rest),
            symbol: opt_string(payload, "instId").unwrap_or_default(),
            exchange_update_time_point: ts,
            order_id: opt_string(x, "ordId"),
            client_order_id: opt_string(payload, "clOrdId"),
            exchange_create_time_point: ts,
            status: Some(OrderStatus::CreateAcknowledged),
            ..Default::default()
        })
    }

    fn parse_cancel_order_response(&self, response: &RestResponse) -> Result<Order> {
        let data = response_data(response)?;
        let x = data
            .first()
            .ok_or_else(|| ExchangeError::InvalidArgument("empty cancel order response".into()))?;
        let payload = response.request.json_payload.as_ref().ok_or_else(|| {
            ExchangeError::InvalidArgument("cancel order request has no payload".into())
        })?;
        Ok(Order {
            api_method: Some(ApiMethod::Rest),
            symbol: opt_string(payload, "instId").unwrap_or_default(),
            exchange_update_time_point: millis_time_point(x, "ts"),
            order_id: opt_string(payload, "ordId"),
            client_order_id: opt_string(payload, "clOrdId"),
            status: Some(OrderStatus::CancelAcknowledged),
            ..Default::default()
        })
    }

    fn parse_fetch_order_response(&self, response: &RestResponse) -> Result<Order> {
        let data = response_data(response)?;
        let x = data
            .first()
            .ok_or_else(|| ExchangeError::InvalidArgument("empty fetch order response".into()))?;
        let symbol = opt_string(x, "instId")
            .ok_or_else(|| ExchangeError::InvalidArgument("order has no instId".into()))?;
        Ok(self.convert_order(x, ApiMethod::Rest, &symbol))
    }

    fn parse_open_orders(&self, response: &RestResponse) -> Result<Vec<Order>> {
        let data = response_data(response)?;
        Ok(data
            .iter()
            .filter_map(|x| {
                let symbol = opt_string(x, "instId")?;
                Some(self.convert_order(x, ApiMethod::Rest, &symbol))
            })
            .collect())
    }

    fn parse_positions(&self, response: &RestResponse) -> Result<Vec<Position>> {
        let data = response_data(response)?;
        Ok(data
            .iter()
            .map(|x| self.convert_position(x, ApiMethod::Rest))
            .collect())
    }

    fn parse_balances(&self, response: &RestResponse) -> Result<Vec<Balance>> {
        let data = response_data(response)?;
        let details = data
            .first()
            .and_then(|x| x.get("details"))
            .and_then(Value::as_array)
            .ok_or_else(|| ExchangeError::InvalidArgument("balance response has no details".into()))?;
        Ok(details
            .iter()
            .map(|x| self.convert_balance(x, ApiMethod::Rest))
            .collect())
    }

    fn parse_historical_orders(&self, response: &RestResponse) -> Result<Vec<Order>> {
        let symbol = response
            .request
            .query_param("instId")
            .ok_or_else(|| ExchangeError::InvalidArgument("order history request has no instId".into()))?;
        let data = response_data(response)?;
        Ok(data
            .iter()
            .map(|x| self.convert_order(x, ApiMethod::Rest, &symbol))
            .collect())
    }

    fn parse_historical_fills(&self, response: &RestResponse) -> Result<Vec<Fill>> {
        let symbol = response
            .request
            .query_param("instId")
            .ok_or_else(|| ExchangeError::InvalidArgument("fill history request has no instId".into()))?;
        let data = response_data(response)?;
        Ok(data
            .iter()
            .map(|x| self.convert_fill(x, ApiMethod::Rest, &symbol))
            .collect())
    }

    // -- pagination -----------------------------------------------------------

    fn next_historical_trades_request(
        &self,
        response: &RestResponse,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> Option<RequestProducer> {
        let data = response.json_payload.as_ref()?.get("data")?.as_array()?;
        let head = data.first()?;
        let tail = data.last()?;

        let head_key = (millis_time_point(head, "ts")?, int_field(head, "tradeId")?);
        let tail_key = (millis_time_point(tail, "ts")?, int_field(tail, "tradeId")?);
        let (earliest_ts, after) = if head_key < tail_key {
            (head_key.0, head_key.1)
        } else {
            (tail_key.0, tail_key.1)
        };

        if let Some(start) = config.fetch_historical_trade_start_unix_timestamp_seconds {
            if earliest_ts.secs < start {
                return None;
            }
        }

        let symbol = opt_string(head, "instId")?;
        let mut params = BTreeMap::new();
        params.insert("instId".into(), symbol);
        params.insert("type".into(), "1".into());
        params.insert("after".into(), after.to_string());
        Some(Self::public_get(ids, HISTORY_TRADES_PATH, params))
    }

    fn next_historical_ohlcvs_request(
        &self,
        response: &RestResponse,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> Option<RequestProducer> {
        let data = response.json_payload.as_ref()?.get("data")?.as_array()?;
        let ts_of = |row: &Value| -> Option<i64> {
            row.get(0).and_then(Value::as_str).and_then(|s| s.parse().ok())
        };
        let head_ts = ts_of(data.first()?)?;
        let tail_ts = ts_of(data.last()?)?;
        let after = head_ts.min(tail_ts);

        if let Some(start) = config.fetch_historical_ohlcv_start_unix_timestamp_seconds {
            if after / 1_000 < start {
                return None;
            }
        }

        let symbol = response.request.query_param("instId")?;
        let mut params = BTreeMap::new();
        params.insert("instId".into(), symbol);
        params.insert("after".into(), after.to_string());
        params.insert(
            "bar".into(),
            self.format_ohlcv_interval(config.ohlcv_interval_seconds),
        );
        Some(Self::public_get(ids, HISTORY_CANDLES_PATH, params))
    }

    fn next_open_orders_request(
        &self,
        response: &RestResponse,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> Option<RequestProducer> {
        let data = response.json_payload.as_ref()?.get("data")?.as_array()?;
        let head_id = opt_string(data.first()?, "ordId")?;
        let tail_id = opt_string(data.last()?, "ordId")?;
        let after = if head_id < tail_id { head_id } else { tail_id };

        let mut params = BTreeMap::new();
        params.insert("instType".into(), self.inst_type().to_owned());
        params.insert("after".into(), after);
        Some(Self::signed_get(
            OkxSigner::from_config(config),
            ids,
            ORDERS_PENDING_PATH.to_owned(),
            params,
        ))
    }

    fn next_historical_orders_request(
        &self,
        response: &RestResponse,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> Option<RequestProducer> {
        let request = &response.request;
        let data = response.json_payload.as_ref()?.get("data")?.as_array()?;

        if let (Some(head), Some(tail)) = (data.first(), data.last()) {
            let head_key = (millis_time_point(head, "cTime")?, int_field(head, "ordId")?);
            let tail_key = (millis_time_point(tail, "cTime")?, int_field(tail, "ordId")?);
            let (earliest_ts, after) = if head_key < tail_key {
                (head_key.0, head_key.1)
            } else {
                (tail_key.0, tail_key.1)
            };

            if let Some(start) = config.fetch_historical_order_start_unix_timestamp_seconds {
                if earliest_ts.secs < start {
                    return None;
                }
            }

            let mut params = BTreeMap::new();
            params.insert("instType".into(), self.inst_type().to_owned());
            params.insert("instId".into(), request.query_param("instId")?);
            params.insert("after".into(), after.to_string());
            return Some(Self::signed_get(
                OkxSigner::from_config(config),
                ids,
                request.path.clone(),
                params,
            ));
        }

        // The recent endpoint ran dry: continue on the archive endpoint.
        if request.path == ORDERS_HISTORY_PATH {
            let mut params = BTreeMap::new();
            params.insert("instType".into(), self.inst_type().to_owned());
            params.insert("instId".into(), request.query_param("instId")?);
            if let Some(after) = request.query_param("after") {
                params.insert("after".into(), after);
            }
            return Some(Self::signed_get(
                OkxSigner::from_config(config),
                ids,
                ORDERS_HISTORY_ARCHIVE_PATH.to_owned(),
                params,
            ));
        }
        None
    }

    fn next_historical_fills_request(
        &self,
        response: &RestResponse,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> Option<RequestProducer> {
        let request = &response.request;
        let data = response.json_payload.as_ref()?.get("data")?.as_array()?;

        if let (Some(head), Some(tail)) = (data.first(), data.last()) {
            let head_key = (millis_time_point(head, "fillTime")?, int_field(head, "billId")?);
            let tail_key = (millis_time_point(tail, "fillTime")?, int_field(tail, "billId")?);
            let (earliest_ts, after) = if head_key < tail_key {
                (head_key.0, head_key.1)
            } else {
                (tail_key.0, tail_key.1)
            };

            if let Some(start) = config.fetch_historical_fill_start_unix_timestamp_seconds {
                if earliest_ts.secs < start {
                    return None;
                }
            }

            let mut params = BTreeMap::new();
            params.insert("instType".into(), self.inst_type().to_owned());
            params.insert("instId".into(), request.query_param("instId")?);
            params.insert("after".into(), after.to_string());
            return Some(Self::signed_get(
                OkxSigner::from_config(config),
                ids,
                request.path.clone(),
                params,
            ));
        }

        if request.path == FILLS_PATH {
            let mut params = BTreeMap::new();
            params.insert("instType".into(), self.inst_type().to_owned());
            params.insert("instId".into(), request.query_param("instId")?);
            if let Some(after) = request.query_param("after") {
                params.insert("after".into(), after);
            }
            return Some(Self::signed_get(
                OkxSigner::from_config(config),
                ids,
                FILLS_HISTORY_PATH.to_owned(),
                params,
            ));
        }
        None
    }

    // -- error hooks ------------------------------------------------------------

    fn on_rest_error(&self, response: &RestResponse) -> ErrorDirective {
        let request = &response.request;
        match self.classify_rest_response(response) {
            Some(RestTarget::CreateOrder) | Some(RestTarget::CancelOrder) => {
                let order_ref = request
                    .json_payload
                    .as_ref()
                    .map(Self::order_ref_from_payload)
                    .unwrap_or_default();
                ErrorDirective {
                    fetch_order: Some(order_ref),
                    mark_rejected: None,
                }
            }
            Some(RestTarget::FetchOrder) => {
                let code = response
                    .json_payload
                    .as_ref()
                    .and_then(|payload| payload.get("code"))
                    .and_then(Value::as_str);
                if response.status == reqwest::StatusCode::OK
                    && code.is_some_and(|c| UNKNOWN_ORDER_CODES.contains(&c))
                {
                    ErrorDirective {
                        fetch_order: None,
                        mark_rejected: Some(OrderRef {
                            symbol: request.query_param("instId").unwrap_or_default(),
                            order_id: request.query_param("ordId"),
                            client_order_id: request.query_param("clOrdId"),
                        }),
                    }
                } else {
                    ErrorDirective::default()
                }
            }
            _ => ErrorDirective::default(),
        }
    }

    fn on_stream_error(&self, message: &StreamMessage) -> ErrorDirective {
        match self.classify_stream_response(message) {
            Some(StreamOp::CreateOrder) | Some(StreamOp::CancelOrder) => {
                let order_ref = message
                    .request
                    .as_ref()
                    .and_then(|request| request.json_payload.as_ref())
                    .and_then(|payload| payload.get("args"))
                    .and_then(|args| args.get(0))
                    .map(Self::order_ref_from_payload)
                    .unwrap_or_default();
                ErrorDirective {
                    fetch_order: Some(order_ref),
                    mark_rejected: None,
                }
            }
            _ => ErrorDirective::default(),
        }
    }

    // -- stream seams --------------------------------------------------------------

    fn stream_endpoints(&self, config: &SessionConfig) -> Vec<StreamEndpoint> {
        let base_url = if config.is_paper_trading {
            WS_DEMO_BASE_URL
        } else {
            WS_BASE_URL
        };
        let mut endpoints = Vec::new();

        if !config.symbols.is_empty() && (config.subscribe_bbo || config.subscribe_trade) {
            endpoints.push(StreamEndpoint {
                base_url: base_url.to_owned(),
                path: WS_PUBLIC_PATH.to_owned(),
                query: BTreeMap::new(),
                requires_login: false,
                supports_trade: false,
                carries_market_data: true,
            });
        }
        // Candles live on the business endpoint.
        if !config.symbols.is_empty() && config.subscribe_ohlcv {
            endpoints.push(StreamEndpoint {
                base_url: base_url.to_owned(),
                path: WS_BUSINESS_PATH.to_owned(),
                query: BTreeMap::new(),
                requires_login: false,
                supports_trade: false,
                carries_market_data: true,
            });
        }
        if config.subscribes_account()
            || config.trade_api_method_preference == Some(ApiMethod::Websocket)
        {
            endpoints.push(StreamEndpoint {
                base_url: base_url.to_owned(),
                path: WS_PRIVATE_PATH.to_owned(),
                query: BTreeMap::new(),
                requires_login: true,
                supports_trade: true,
                carries_market_data: false,
            });
        }
        endpoints
    }

    fn extract_summary(&self, message: &mut StreamMessage) {
        let payload = &message.json_payload;
        message.summary = PayloadSummary {
            event: opt_string(payload, "event"),
            op: opt_string(payload, "op"),
            channel: payload
                .get("arg")
                .and_then(|arg| arg.get("channel"))
                .and_then(Value::as_str)
                .map(str::to_owned),
            code: opt_string(payload, "code"),
        };
        message.request_id = match payload.get("id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
    }

    fn is_stream_push(&self, message: &StreamMessage) -> bool {
        message.summary.event.is_none() && message.summary.op.is_none()
    }

    fn is_stream_response_success(&self, message: &StreamMessage) -> bool {
        let summary = &message.summary;
        summary.event.as_deref().is_some_and(|event| event != "error")
            || summary.code.as_deref() == Some("0")
    }

    fn classify_stream_push(&self, message: &StreamMessage) -> Vec<StreamChannel> {
        let Some(channel) = message.summary.channel.as_deref() else {
            return Vec::new();
        };
        match channel {
            CHANNEL_BBO => vec![StreamChannel::Bbo],
            CHANNEL_TRADES => vec![StreamChannel::Trade],
            CHANNEL_POSITIONS => vec![StreamChannel::Position],
            CHANNEL_BALANCE => vec![StreamChannel::Balance],
            // The orders channel carries fill detail alongside the order
            // update.
            CHANNEL_ORDERS => vec![StreamChannel::Order, StreamChannel::Fill],
            _ if channel.starts_with(CHANNEL_CANDLE_PREFIX) => vec![StreamChannel::Ohlcv],
            _ => Vec::new(),
        }
    }

    fn classify_stream_response(&self, message: &StreamMessage) -> Option<StreamOp> {
        let summary = &message.summary;
        match summary.op.as_deref() {
            Some("order") => return Some(StreamOp::CreateOrder),
            Some("cancel-order") => return Some(StreamOp::CancelOrder),
            _ => {}
        }
        match summary.event.as_deref() {
            Some("subscribe") => Some(StreamOp::Subscribe),
            Some("login") => Some(StreamOp::Login),
            _ => None,
        }
    }

    fn login_request(
        &self,
        at: TimePoint,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> Result<Option<StreamRequest>> {
        let arg = OkxSigner::from_config(config).login_arg(at)?;
        let request = StreamRequest::from_json(ids.next_id(), json!({"op": "login", "args": [arg]}))?;
        Ok(Some(request))
    }

    fn application_ping_request(&self, ids: &RequestIdSource) -> Option<StreamRequest> {
        Some(StreamRequest::from_text(ids.next_id(), "ping"))
    }

    fn market_data_subscribe_requests(
        &self,
        endpoint: &StreamEndpoint,
        symbols: &[String],
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> Result<Vec<StreamRequest>> {
        let mut args = Vec::new();
        if endpoint.path == WS_PUBLIC_PATH {
            for symbol in symbols {
                if config.subscribe_bbo {
                    args.push(json!({"channel": CHANNEL_BBO, "instId": symbol}));
                }
                if config.subscribe_trade {
                    args.push(json!({"channel": CHANNEL_TRADES, "instId": symbol}));
                }
            }
        } else if endpoint.path == WS_BUSINESS_PATH {
            let channel = format!(
                "{CHANNEL_CANDLE_PREFIX}{}",
                self.format_ohlcv_interval(config.ohlcv_interval_seconds)
            );
            for symbol in symbols {
                args.push(json!({"channel": channel, "instId": symbol}));
            }
        }

        if args.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![StreamRequest::from_json(
            ids.next_id(),
            json!({"op": "subscribe", "args": args}),
        )?])
    }

    fn account_subscribe_requests(
        &self,
        config: &SessionConfig,
        ids: &RequestIdSource,
    ) -> Result<Vec<StreamRequest>> {
        let mut args = Vec::new();
        if config.subscribe_order || config.subscribe_fill {
            args.push(json!({"channel": CHANNEL_ORDERS, "instType": self.inst_type()}));
        }
        // Spot accounts have no positions channel.
        if config.subscribe_position && self.instrument_type != OkxInstrumentType::Spot {
            args.push(json!({"channel": CHANNEL_POSITIONS, "instType": self.inst_type()}));
        }
        if config.subscribe_balance {
            args.push(json!({"channel": CHANNEL_BALANCE, "instType": self.inst_type()}));
        }

        if args.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![StreamRequest::from_json(
            ids.next_id(),
            json!({"op": "subscribe", "args": args}),
        )?])
    }

    fn stream_create_order_request(&self, order: &Order, ids: &RequestIdSource) -> Result<StreamRequest> {
        let id = ids.next_id();
        let arg = self.create_order_payload(order);
        StreamRequest::from_json(id.clone(), json!({"id": id, "op": "order", "args": [arg]}))
    }

    fn stream_cancel_order_request(
        &self,
        order_ref: &OrderRef,
        ids: &RequestIdSource,
    ) -> Result<StreamRequest> {
        let id = ids.next_id();
        let arg = self.cancel_order_payload(order_ref);
        StreamRequest::from_json(id.clone(), json!({"id": id, "op": "cancel-order", "args": [arg]}))
    }

    // -- stream converters ----------------------------------------------------------

    fn parse_push_bbos(&self, message: &StreamMessage) -> Result<Vec<Bbo>> {
        let payload = &message.json_payload;
        let symbol = payload
            .get("arg")
            .and_then(|arg| arg.get("instId"))
            .and_then(Value::as_str)
            .ok_or_else(|| ExchangeError::InvalidArgument("bbo push has no instId".into()))?;
        let data = data_array(payload)?;
        Ok(data
            .iter()
            .map(|x| {
                let level = |book: &str, index: usize| -> Option<String> {
                    x.get(book)
                        .and_then(Value::as_array)
                        .and_then(|levels| levels.first())
                        .and_then(|level| level.get(index))
                        .and_then(Value::as_str)
                        .map(str::to_owned)
                };
                Bbo {
                    api_method: Some(ApiMethod::Websocket),
                    symbol: symbol.to_owned(),
                    exchange_update_time_point: millis_time_point(x, "ts"),
                    best_bid_price: level("bids", 0),
                    best_bid_size: level("bids", 1),
                    best_ask_price: level("asks", 0),
                    best_ask_size: level("asks", 1),
                }
            })
            .collect())
    }

    fn parse_push_trades(&self, message: &StreamMessage) -> Result<Vec<Trade>> {
        let payload = &message.json_payload;
        let symbol = payload
            .get("arg")
            .and_then(|arg| arg.get("instId"))
            .and_then(Value::as_str)
            .ok_or_else(|| ExchangeError::InvalidArgument("trade push has no instId".into()))?;
        let data = data_array(payload)?;
        Ok(data
            .iter()
            .map(|x| self.convert_trade(x, ApiMethod::Websocket, symbol))
            .collect())
    }

    fn parse_push_ohlcvs(&self, message: &StreamMessage) -> Result<Vec<Ohlcv>> {
        let payload = &message.json_payload;
        let symbol = payload
            .get("arg")
            .and_then(|arg| arg.get("instId"))
            .and_then(Value::as_str)
            .ok_or_else(|| ExchangeError::InvalidArgument("candle push has no instId".into()))?;
        let data = data_array(payload)?;
        Ok(data
            .iter()
            .map(|x| self.convert_ohlcv(x, ApiMethod::Websocket, symbol))
            .collect())
    }

    fn parse_push_orders(&self, message: &StreamMessage) -> Result<Vec<Order>> {
        let data = data_array(&message.json_payload)?;
        Ok(data
            .iter()
            .filter_map(|x| {
                let symbol = opt_string(x, "instId")?;
                Some(self.convert_order(x, ApiMethod::Websocket, &symbol))
            })
            .collect())
    }

    fn parse_push_fills(&self, message: &StreamMessage) -> Result<Vec<Fill>> {
        let data = data_array(&message.json_payload)?;
        Ok(data
            .iter()
            .filter(|x| opt_string(x, "tradeId").is_some())
            .filter_map(|x| {
                let symbol = opt_string(x, "instId")?;
                Some(self.convert_fill(x, ApiMethod::Websocket, &symbol))
            })
            .collect())
    }

    fn parse_push_positions(&self, message: &StreamMessage) -> Result<Vec<Position>> {
        let data = data_array(&message.json_payload)?;
        Ok(data
            .iter()
            .map(|x| self.convert_position(x, ApiMethod::Websocket))
            .collect())
    }

    fn parse_push_balances(&self, message: &StreamMessage) -> Result<Vec<Balance>> {
        let data = data_array(&message.json_payload)?;
        let bal_data = data
            .first()
            .and_then(|x| x.get("balData"))
            .and_then(Value::as_array)
            .ok_or_else(|| ExchangeError::InvalidArgument("balance push has no balData".into()))?;
        Ok(bal_data
            .iter()
            .map(|x| self.convert_balance(x, ApiMethod::Websocket))
            .collect())
    }

    fn parse_stream_create_order_response(&self, message: &StreamMessage) -> Result<Order> {
        let data = data_array(&message.json_payload)?;
        let x = data
            .first()
            .ok_or_else(|| ExchangeError::InvalidArgument("empty create order response".into()))?;
        let arg = message
            .request
            .as_ref()
            .and_then(|request| request.json_payload.as_ref())
            .and_then(|payload| payload.get("args"))
            .and_then(|args| args.get(0))
            .ok_or_else(|| ExchangeError::InvalidArgument("create order response has no request".into()))?;
        let ts = millis_time_point(x, "ts");
        Ok(Order {
            api_method: Some(ApiMethod::Websocket),
            symbol: opt_string(arg, "instId").unwrap_or_default(),
            exchange_update_time_point: ts,
            order_id: opt_string(x, "ordId"),
            client_order_id: opt_string(arg, "clOrdId"),
            exchange_create_time_point: ts,
            status: Some(OrderStatus::CreateAcknowledged),
            ..Default::default()
        })
    }

    fn parse_stream_cancel_order_response(&self, message: &StreamMessage) -> Result<Order> {
        let data = data_array(&message.json_payload)?;
        let x = data
            .first()
            .ok_or_else(|| ExchangeError::InvalidArgument("empty cancel order response".into()))?;
        let arg = message
            .request
            .as_ref()
            .and_then(|request| request.json_payload.as_ref())
            .and_then(|payload| payload.get("args"))
            .and_then(|args| args.get(0))
            .ok_or_else(|| ExchangeError::InvalidArgument("cancel order response has no request".into()))?;
        Ok(Order {
            api_method: Some(ApiMethod::Websocket),
            symbol: opt_string(arg, "instId").unwrap_or_default(),
            exchange_update_time_point: millis_time_point(x, "ts"),
            order_id: opt_string(arg, "ordId"),
            client_order_id: opt_string(arg, "clOrdId"),
            status: Some(OrderStatus::CancelAcknowledged),
            ..Default::default()
        })
    }
}
