//! OKX adapter tests against canned wire payloads.
//!
//! Exercises classification, conversion, pagination and the error hook with
//! response bodies shaped like the venue's actual JSON. No network.

use std::collections::BTreeMap;

use omnitrade::adapter::{ExchangeAdapter, RequestIdSource, RestTarget, StreamChannel, StreamOp};
use omnitrade::config::SessionConfig;
use omnitrade::time::TimePoint;
use omnitrade::types::enums::{ApiMethod, OrderStatus};
use omnitrade::venues::okx::OkxAdapter;
use omnitrade::wire::{PayloadSummary, RestRequest, RestResponse, StreamMessage};

fn json_headers() -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".into(), "application/json".into());
    headers
}

fn ok_response(request: RestRequest, body: &str) -> RestResponse {
    RestResponse::assemble(reqwest::StatusCode::OK, body.to_owned(), json_headers(), request).unwrap()
}

fn get_request(path: &str, params: &[(&str, &str)]) -> RestRequest {
    let params: BTreeMap<String, String> = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    RestRequest::new("1".into(), "https://www.okx.com", reqwest::Method::GET, path)
        .with_query_params(params)
}

fn stream_message(raw: &str, adapter: &OkxAdapter) -> StreamMessage {
    let mut message = StreamMessage {
        connection_key: "wss://ws.okx.com:8443/ws/v5/public".into(),
        payload: raw.to_owned(),
        json_payload: serde_json::from_str(raw).unwrap(),
        summary: PayloadSummary::default(),
        request_id: None,
        request: None,
    };
    adapter.extract_summary(&mut message);
    message
}

#[test]
fn classifies_responses_by_path_and_method() {
    let adapter = OkxAdapter::spot();

    let tickers = ok_response(
        get_request("/api/v5/market/tickers", &[]),
        r#"{"code":"0","data":[]}"#,
    );
    assert_eq!(adapter.classify_rest_response(&tickers), Some(RestTarget::Bbo));

    let fetch = ok_response(
        get_request("/api/v5/trade/order", &[("instId", "BTC-USDT")]),
        r#"{"code":"0","data":[]}"#,
    );
    assert_eq!(adapter.classify_rest_response(&fetch), Some(RestTarget::FetchOrder));

    let create_request = RestRequest::new(
        "2".into(),
        "https://www.okx.com",
        reqwest::Method::POST,
        "/api/v5/trade/order",
    );
    let create = ok_response(create_request, r#"{"code":"0","data":[]}"#);
    assert_eq!(adapter.classify_rest_response(&create), Some(RestTarget::CreateOrder));
}

#[test]
fn success_requires_code_zero_even_on_200() {
    let adapter = OkxAdapter::spot();
    let tunnelled_failure = ok_response(
        get_request("/api/v5/trade/order", &[("instId", "BTC-USDT")]),
        r#"{"code":"51001","msg":"Instrument ID does not exist","data":[]}"#,
    );
    assert!(!adapter.is_rest_response_success(&tunnelled_failure));

    let success = ok_response(
        get_request("/api/v5/market/tickers", &[]),
        r#"{"code":"0","data":[]}"#,
    );
    assert!(adapter.is_rest_response_success(&success));
}

#[test]
fn parses_instruments_with_normalized_increments() {
    let adapter = OkxAdapter::spot();
    let response = ok_response(
        get_request("/api/v5/public/instruments", &[("instType", "SPOT")]),
        r#"{"code":"0","data":[{
            "instId":"BTC-USDT","baseCcy":"BTC","quoteCcy":"USDT",
            "tickSz":"0.10","lotSz":"0.00000001","minSz":"0.00001",
            "maxLmtSz":"9999999999","maxLmtAmt":"20000000",
            "settleCcy":"","uly":"","ctVal":"","ctMult":"",
            "expTime":"","state":"live"
        }]}"#,
    );

    let instruments = adapter.parse_instruments(&response).unwrap();
    assert_eq!(instruments.len(), 1);
    let instrument = &instruments[0];
    assert_eq!(instrument.symbol, "BTC-USDT");
    // Trailing zeros trimmed.
    assert_eq!(instrument.order_price_increment.as_deref(), Some("0.1"));
    assert_eq!(instrument.is_open_for_trade, Some(true));
    assert!(instrument.margin_asset.is_none());
}

#[test]
fn parses_fetch_order_with_fill_progress() {
    let adapter = OkxAdapter::spot();
    let response = ok_response(
        get_request("/api/v5/trade/order", &[("instId", "BTC-USDT"), ("ordId", "123")]),
        r#"{"code":"0","data":[{
            "instId":"BTC-USDT","ordId":"123","clOrdId":"c1","side":"buy",
            "px":"50000","sz":"0.002","ordType":"limit","reduceOnly":"false",
            "tdMode":"cash","accFillSz":"0.001","avgPx":"50000",
            "cTime":"1700000000000","uTime":"1700000001000","state":"partially_filled"
        }]}"#,
    );

    let order = adapter.parse_fetch_order_response(&response).unwrap();
    assert_eq!(order.order_id.as_deref(), Some("123"));
    assert_eq!(order.client_order_id.as_deref(), Some("c1"));
    assert_eq!(order.status, Some(OrderStatus::PartiallyFilled));
    assert_eq!(order.cumulative_filled_quantity.as_deref(), Some("0.001"));
    // avgPx * accFillSz with unit contract size.
    assert_eq!(order.cumulative_filled_quote_quantity.as_deref(), Some("50.000"));
    assert_eq!(
        order.exchange_update_time_point,
        Some(TimePoint::from_unix_millis(1_700_000_001_000))
    );
    assert_eq!(order.api_method, Some(ApiMethod::Rest));
}

#[test]
fn historical_trade_pagination_walks_backwards() {
    let adapter = OkxAdapter::spot();
    let config = SessionConfig::for_symbols("BTC-USDT");
    let ids = RequestIdSource::default();

    let response = ok_response(
        get_request("/api/v5/market/history-trades", &[("instId", "BTC-USDT"), ("type", "1")]),
        r#"{"code":"0","data":[
            {"instId":"BTC-USDT","tradeId":"52","px":"50001","sz":"0.1","side":"buy","ts":"1700000052000"},
            {"instId":"BTC-USDT","tradeId":"51","px":"50000","sz":"0.2","side":"sell","ts":"1700000051000"},
            {"instId":"BTC-USDT","tradeId":"50","px":"49999","sz":"0.3","side":"buy","ts":"1700000050000"}
        ]}"#,
    );

    let trades = adapter.parse_historical_trades(&response).unwrap();
    assert_eq!(trades.len(), 3);
    assert_eq!(trades[1].is_buyer_maker, Some(true));

    // Next page cursors from the earliest row seen.
    let producer = adapter
        .next_historical_trades_request(&response, &config, &ids)
        .expect("expected a continuation");
    let next = producer(TimePoint::now()).unwrap();
    assert_eq!(next.path, "/api/v5/market/history-trades");
    assert_eq!(next.query_param("after").as_deref(), Some("50"));
    assert_eq!(next.query_param("instId").as_deref(), Some("BTC-USDT"));
}

#[test]
fn pagination_stops_at_window_start() {
    let adapter = OkxAdapter::spot();
    let mut config = SessionConfig::for_symbols("BTC-USDT");
    // Earliest row in the page is older than the window start.
    config.fetch_historical_trade_start_unix_timestamp_seconds = Some(1_700_000_051);
    let ids = RequestIdSource::default();

    let response = ok_response(
        get_request("/api/v5/market/history-trades", &[("instId", "BTC-USDT")]),
        r#"{"code":"0","data":[
            {"instId":"BTC-USDT","tradeId":"51","px":"50000","sz":"0.2","side":"sell","ts":"1700000051000"},
            {"instId":"BTC-USDT","tradeId":"50","px":"49999","sz":"0.3","side":"buy","ts":"1700000050000"}
        ]}"#,
    );

    assert!(
        adapter
            .next_historical_trades_request(&response, &config, &ids)
            .is_none()
    );
}

#[test]
fn exhausted_recent_orders_continue_on_archive_endpoint() {
    let adapter = OkxAdapter::spot();
    let config = SessionConfig::for_symbols("BTC-USDT");
    let ids = RequestIdSource::default();

    let response = ok_response(
        get_request(
            "/api/v5/trade/orders-history",
            &[("instType", "SPOT"), ("instId", "BTC-USDT"), ("after", "41")],
        ),
        r#"{"code":"0","data":[]}"#,
    );

    let producer = adapter
        .next_historical_orders_request(&response, &config, &ids)
        .expect("expected the archive continuation");
    let next = producer(TimePoint::now()).unwrap();
    assert_eq!(next.path, "/api/v5/trade/orders-history-archive");
    assert_eq!(next.query_param("instId").as_deref(), Some("BTC-USDT"));
    // The cursor carries over to the archive phase.
    assert_eq!(next.query_param("after").as_deref(), Some("41"));

    // And the archive itself terminates when dry.
    let archive_response = ok_response(
        get_request(
            "/api/v5/trade/orders-history-archive",
            &[("instType", "SPOT"), ("instId", "BTC-USDT")],
        ),
        r#"{"code":"0","data":[]}"#,
    );
    assert!(
        adapter
            .next_historical_orders_request(&archive_response, &config, &ids)
            .is_none()
    );
}

#[test]
fn unknown_order_code_marks_local_order_rejected() {
    let adapter = OkxAdapter::spot();
    let response = ok_response(
        get_request(
            "/api/v5/trade/order",
            &[("instId", "BTC-USDT"), ("clOrdId", "c1")],
        ),
        r#"{"code":"51603","msg":"Order does not exist","data":[]}"#,
    );
    assert!(!adapter.is_rest_response_success(&response));

    let directive = adapter.on_rest_error(&response);
    let rejected = directive.mark_rejected.expect("expected a rejection directive");
    assert_eq!(rejected.symbol, "BTC-USDT");
    assert_eq!(rejected.client_order_id.as_deref(), Some("c1"));
    assert!(directive.fetch_order.is_none());
}

#[test]
fn failed_create_schedules_corrective_fetch() {
    let adapter = OkxAdapter::spot();
    let request = RestRequest::new(
        "9".into(),
        "https://www.okx.com",
        reqwest::Method::POST,
        "/api/v5/trade/order",
    )
    .with_json_payload(serde_json::json!({
        "instId": "BTC-USDT", "clOrdId": "c9", "side": "buy",
        "ordType": "limit", "px": "50000", "sz": "0.001"
    }))
    .unwrap();
    let response = ok_response(request, r#"{"code":"51008","msg":"insufficient balance","data":[]}"#);

    let directive = adapter.on_rest_error(&response);
    let fetch = directive.fetch_order.expect("expected a corrective fetch");
    assert_eq!(fetch.symbol, "BTC-USDT");
    assert_eq!(fetch.client_order_id.as_deref(), Some("c9"));
}

#[test]
fn push_frames_classify_by_channel() {
    let adapter = OkxAdapter::spot();

    let bbo = stream_message(
        r#"{"arg":{"channel":"bbo-tbt","instId":"BTC-USDT"},
            "data":[{"asks":[["50001","0.5","0","1"]],"bids":[["50000","1.2","0","2"]],"ts":"1700000000000"}]}"#,
        &adapter,
    );
    assert!(adapter.is_stream_push(&bbo));
    assert_eq!(adapter.classify_stream_push(&bbo), vec![StreamChannel::Bbo]);
    let bbos = adapter.parse_push_bbos(&bbo).unwrap();
    assert_eq!(bbos[0].best_bid_price.as_deref(), Some("50000"));
    assert_eq!(bbos[0].best_ask_size.as_deref(), Some("0.5"));

    let candle = stream_message(
        r#"{"arg":{"channel":"candle1m","instId":"BTC-USDT"},
            "data":[["1700000040000","50000","50010","49990","50005","12","600060","600060","0"]]}"#,
        &adapter,
    );
    assert_eq!(adapter.classify_stream_push(&candle), vec![StreamChannel::Ohlcv]);
    let candles = adapter.parse_push_ohlcvs(&candle).unwrap();
    assert_eq!(candles[0].start_unix_timestamp_seconds, Some(1_700_000_040));
    assert_eq!(candles[0].close_price.as_deref(), Some("50005"));
    assert_eq!(candles[0].quote_volume.as_deref(), Some("600060"));
}

#[test]
fn orders_channel_feeds_orders_and_fills() {
    let adapter = OkxAdapter::spot();
    let message = stream_message(
        r#"{"arg":{"channel":"orders","instType":"SPOT"},
            "data":[{
                "instId":"BTC-USDT","ordId":"123","clOrdId":"c1","side":"buy",
                "px":"50000","sz":"0.002","ordType":"limit","reduceOnly":"false",
                "tdMode":"cash","accFillSz":"0.001","avgPx":"50000",
                "fillPx":"50000","fillSz":"0.001","fillTime":"1700000002000",
                "tradeId":"987","execType":"M","fillFee":"-0.05","fillFeeCcy":"USDT",
                "cTime":"1700000000000","uTime":"1700000002000","state":"partially_filled"
            }]}"#,
        &adapter,
    );

    assert_eq!(
        adapter.classify_stream_push(&message),
        vec![StreamChannel::Order, StreamChannel::Fill]
    );

    let orders = adapter.parse_push_orders(&message).unwrap();
    assert_eq!(orders[0].status, Some(OrderStatus::PartiallyFilled));
    assert_eq!(orders[0].api_method, Some(ApiMethod::Websocket));

    let fills = adapter.parse_push_fills(&message).unwrap();
    assert_eq!(fills.len(), 1);
    let fill = &fills[0];
    assert_eq!(fill.trade_id.as_deref(), Some("987"));
    assert_eq!(fill.is_maker, Some(true));
    // Fee carried unsigned with the rebate flag separate.
    assert_eq!(fill.fee_quantity.as_deref(), Some("0.05"));
    assert_eq!(fill.is_fee_rebate, Some(false));
}

#[test]
fn control_frames_are_responses_not_pushes() {
    let adapter = OkxAdapter::spot();

    let subscribe_ack = stream_message(
        r#"{"event":"subscribe","arg":{"channel":"bbo-tbt","instId":"BTC-USDT"}}"#,
        &adapter,
    );
    assert!(!adapter.is_stream_push(&subscribe_ack));
    assert!(adapter.is_stream_response_success(&subscribe_ack));
    assert_eq!(
        adapter.classify_stream_response(&subscribe_ack),
        Some(StreamOp::Subscribe)
    );

    let login_ack = stream_message(r#"{"event":"login","code":"0","msg":""}"#, &adapter);
    assert_eq!(adapter.classify_stream_response(&login_ack), Some(StreamOp::Login));

    let error = stream_message(
        r#"{"event":"error","code":"60012","msg":"Invalid request"}"#,
        &adapter,
    );
    assert!(!adapter.is_stream_push(&error));
    assert!(!adapter.is_stream_response_success(&error));
}

#[test]
fn login_frame_is_signed() {
    let adapter = OkxAdapter::spot();
    let mut config = SessionConfig::for_symbols("BTC-USDT");
    config.api_key = "key".into();
    config.api_secret = "secret".into();
    config.api_passphrase = "passphrase".into();
    let ids = RequestIdSource::default();

    let request = adapter
        .login_request(TimePoint::from_unix_secs(1_700_000_000), &config, &ids)
        .unwrap()
        .expect("okx requires a login frame");
    let payload: serde_json::Value = serde_json::from_str(&request.payload).unwrap();
    assert_eq!(payload["op"], "login");
    let arg = &payload["args"][0];
    assert_eq!(arg["apiKey"], "key");
    assert_eq!(arg["passphrase"], "passphrase");
    assert_eq!(arg["timestamp"], 1_700_000_000_i64);
    // HMAC-SHA256, base64: 44 characters.
    assert_eq!(arg["sign"].as_str().unwrap().len(), 44);
}

#[test]
fn stream_order_requests_embed_the_correlation_id() {
    let adapter = OkxAdapter::spot();
    let ids = RequestIdSource::default();

    let order = omnitrade::types::account::Order {
        symbol: "BTC-USDT".into(),
        client_order_id: Some("c1".into()),
        is_buy: Some(true),
        price: Some("50000".into()),
        quantity: Some("0.001".into()),
        ..Default::default()
    };
    let request = adapter.stream_create_order_request(&order, &ids).unwrap();
    let payload: serde_json::Value = serde_json::from_str(&request.payload).unwrap();
    assert_eq!(payload["id"], request.id);
    assert_eq!(payload["op"], "order");
    assert_eq!(payload["args"][0]["instId"], "BTC-USDT");

    // A response echoing the id correlates back to the request.
    let raw = format!(
        r#"{{"id":"{}","op":"order","code":"0","data":[{{"ordId":"999","ts":"1700000001000"}}]}}"#,
        request.id
    );
    let mut message = stream_message(&raw, &adapter);
    assert_eq!(message.request_id.as_deref(), Some(request.id.as_str()));
    assert!(!adapter.is_stream_push(&message));
    assert!(adapter.is_stream_response_success(&message));

    message.request = Some(request);
    let acknowledged = adapter.parse_stream_create_order_response(&message).unwrap();
    assert_eq!(acknowledged.order_id.as_deref(), Some("999"));
    assert_eq!(acknowledged.client_order_id.as_deref(), Some("c1"));
    assert_eq!(acknowledged.status, Some(OrderStatus::CreateAcknowledged));
}

#[test]
fn bare_pong_is_tolerated_before_json_parsing() {
    let adapter = OkxAdapter::spot();
    assert!(adapter.is_bare_pong("pong"));
    assert!(!adapter.is_bare_pong(r#"{"event":"subscribe"}"#));
}
