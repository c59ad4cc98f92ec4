//! End-to-end reconciliation scenarios: canned wire payloads flow through
//! the OKX adapter into the order ledger and state cache, and the monotone
//! merge rules decide what sticks.
//!
//! These mirror the situations a live session actually faces: REST
//! responses racing stream pushes, historical pages overlapping live data,
//! cancel-all sweeps over mixed order states.

use std::collections::{BTreeMap, HashMap};

use omnitrade::adapter::ExchangeAdapter;
use omnitrade::cache::StateCache;
use omnitrade::orders::{CancelFilter, ClientOrderIdGenerator, OrderLedger};
use omnitrade::time::TimePoint;
use omnitrade::types::account::Order;
use omnitrade::types::enums::OrderStatus;
use omnitrade::types::market::Instrument;
use omnitrade::venues::okx::OkxAdapter;
use omnitrade::wire::{PayloadSummary, RestRequest, RestResponse, StreamMessage};

fn ok_response(request: RestRequest, body: &str) -> RestResponse {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".into(), "application/json".into());
    RestResponse::assemble(reqwest::StatusCode::OK, body.to_owned(), headers, request).unwrap()
}

fn push(raw: &str, adapter: &OkxAdapter) -> StreamMessage {
    let mut message = StreamMessage {
        connection_key: "wss://ws.okx.com:8443/ws/v5/private".into(),
        payload: raw.to_owned(),
        json_payload: serde_json::from_str(raw).unwrap(),
        summary: PayloadSummary::default(),
        request_id: None,
        request: None,
    };
    adapter.extract_summary(&mut message);
    message
}

fn no_instruments() -> HashMap<String, Instrument> {
    HashMap::new()
}

fn local_create(client_order_id: &str, secs: i64) -> Order {
    Order {
        symbol: "BTC-USDT".into(),
        client_order_id: Some(client_order_id.into()),
        is_buy: Some(true),
        price: Some("50000".into()),
        quantity: Some("0.001".into()),
        status: Some(OrderStatus::CreateInFlight),
        local_update_time_point: Some(TimePoint::from_unix_secs(secs)),
        ..Default::default()
    }
}

#[test]
fn optimistic_create_then_wire_acknowledgement_then_push() {
    let adapter = OkxAdapter::spot();
    let mut ledger = OrderLedger::new();

    // Locally stamped before any network activity.
    ledger.append(local_create("c1", 1_000));
    let (_, order) = ledger.get("BTC-USDT", None, Some("c1")).unwrap();
    assert!(order.is_in_flight());

    // REST create acknowledgement, parsed from the wire.
    let create_request = RestRequest::new(
        "1".into(),
        "https://www.okx.com",
        reqwest::Method::POST,
        "/api/v5/trade/order",
    )
    .with_json_payload(serde_json::json!({
        "instId": "BTC-USDT", "clOrdId": "c1", "side": "buy",
        "ordType": "limit", "px": "50000", "sz": "0.001"
    }))
    .unwrap();
    let response = ok_response(
        create_request,
        r#"{"code":"0","data":[{"ordId":"123","clOrdId":"c1","sCode":"0","ts":"1700000001000"}]}"#,
    );
    let acknowledged = adapter.parse_create_order_response(&response).unwrap();
    ledger.update(
        acknowledged,
        TimePoint::from_unix_secs(1_001),
        None,
        &no_instruments(),
    );

    let (_, order) = ledger.get("BTC-USDT", None, Some("c1")).unwrap();
    assert_eq!(order.status, Some(OrderStatus::CreateAcknowledged));
    assert_eq!(order.order_id.as_deref(), Some("123"));
    assert!(order.is_open());
    // The local side, price and quantity survive the merge.
    assert_eq!(order.is_buy, Some(true));
    assert_eq!(order.price.as_deref(), Some("50000"));

    // A later stream push advances the order to NEW.
    let message = push(
        r#"{"arg":{"channel":"orders","instType":"SPOT"},
            "data":[{"instId":"BTC-USDT","ordId":"123","clOrdId":"c1","side":"buy",
                     "px":"50000","sz":"0.001","ordType":"limit","reduceOnly":"false",
                     "tdMode":"cash","accFillSz":"","avgPx":"",
                     "cTime":"1700000001000","uTime":"1700000002000","state":"live"}]}"#,
        &adapter,
    );
    for order in adapter.parse_push_orders(&message).unwrap() {
        ledger.update(order, TimePoint::from_unix_secs(1_002), None, &no_instruments());
    }

    let (_, order) = ledger.get("BTC-USDT", None, Some("c1")).unwrap();
    assert_eq!(order.status, Some(OrderStatus::New));
}

#[test]
fn late_rest_response_does_not_downgrade_stream_state() {
    let adapter = OkxAdapter::spot();
    let mut ledger = OrderLedger::new();
    ledger.append(local_create("c1", 1_000));

    // The stream is faster: a partial fill stamped T2 lands first.
    let fill_push = push(
        r#"{"arg":{"channel":"orders","instType":"SPOT"},
            "data":[{"instId":"BTC-USDT","ordId":"123","clOrdId":"c1","side":"buy",
                     "px":"50000","sz":"0.001","ordType":"limit","reduceOnly":"false",
                     "tdMode":"cash","accFillSz":"0.0005","avgPx":"50000",
                     "cTime":"1700000001000","uTime":"1700000005000","state":"partially_filled"}]}"#,
        &adapter,
    );
    for order in adapter.parse_push_orders(&fill_push).unwrap() {
        ledger.update(order, TimePoint::from_unix_secs(1_005), None, &no_instruments());
    }

    // The REST acknowledgement stamped T1 < T2 arrives afterwards.
    let create_request = RestRequest::new(
        "1".into(),
        "https://www.okx.com",
        reqwest::Method::POST,
        "/api/v5/trade/order",
    )
    .with_json_payload(serde_json::json!({
        "instId": "BTC-USDT", "clOrdId": "c1", "side": "buy",
        "ordType": "limit", "px": "50000", "sz": "0.001"
    }))
    .unwrap();
    let response = ok_response(
        create_request,
        r#"{"code":"0","data":[{"ordId":"123","clOrdId":"c1","sCode":"0","ts":"1700000003000"}]}"#,
    );
    let late = adapter.parse_create_order_response(&response).unwrap();
    ledger.update(late, TimePoint::from_unix_secs(1_006), None, &no_instruments());

    // The older acknowledgement must not win on any axis.
    let (_, order) = ledger.get("BTC-USDT", None, Some("c1")).unwrap();
    assert_eq!(order.status, Some(OrderStatus::PartiallyFilled));
    assert_eq!(order.cumulative_filled_quantity.as_deref(), Some("0.0005"));
}

#[test]
fn fill_progress_only_moves_forward() {
    let adapter = OkxAdapter::spot();
    let mut ledger = OrderLedger::new();
    ledger.append(local_create("c1", 1_000));

    let bigger = push(
        r#"{"arg":{"channel":"orders","instType":"SPOT"},
            "data":[{"instId":"BTC-USDT","ordId":"123","clOrdId":"c1","side":"buy",
                     "px":"50000","sz":"1","ordType":"limit","reduceOnly":"false",
                     "tdMode":"cash","accFillSz":"0.5","avgPx":"50000",
                     "cTime":"1700000001000","uTime":"1700000002000","state":"partially_filled"}]}"#,
        &adapter,
    );
    for order in adapter.parse_push_orders(&bigger).unwrap() {
        ledger.update(order, TimePoint::from_unix_secs(1_002), None, &no_instruments());
    }

    // A replayed frame carrying a smaller fill at the same timestamp and
    // status has nothing that advances; it is dropped whole.
    let smaller = push(
        r#"{"arg":{"channel":"orders","instType":"SPOT"},
            "data":[{"instId":"BTC-USDT","ordId":"123","clOrdId":"c1","side":"buy",
                     "px":"50000","sz":"1","ordType":"limit","reduceOnly":"false",
                     "tdMode":"cash","accFillSz":"0.4","avgPx":"50000",
                     "cTime":"1700000001000","uTime":"1700000002000","state":"partially_filled"}]}"#,
        &adapter,
    );
    for order in adapter.parse_push_orders(&smaller).unwrap() {
        ledger.update(order, TimePoint::from_unix_secs(1_003), None, &no_instruments());
    }

    let (_, order) = ledger.get("BTC-USDT", None, Some("c1")).unwrap();
    assert_eq!(order.cumulative_filled_quantity.as_deref(), Some("0.5"));
}

#[test]
fn historical_page_prepends_without_duplicating_live_trades() {
    let adapter = OkxAdapter::spot();
    let mut cache = StateCache::new();

    // Live trades arrive on the stream first.
    let live = push(
        r#"{"arg":{"channel":"trades","instId":"BTC-USDT"},
            "data":[
                {"instId":"BTC-USDT","tradeId":"50","px":"50000","sz":"0.1","side":"buy","ts":"1700000050000"},
                {"instId":"BTC-USDT","tradeId":"51","px":"50001","sz":"0.1","side":"buy","ts":"1700000051000"},
                {"instId":"BTC-USDT","tradeId":"52","px":"50002","sz":"0.1","side":"sell","ts":"1700000052000"}
            ]}"#,
        &adapter,
    );
    cache.append_live_trades(adapter.parse_push_trades(&live).unwrap());

    // A historical page overlapping the live head: ids 30..=60.
    let rows: Vec<String> = (30..=60)
        .map(|i| {
            format!(
                r#"{{"instId":"BTC-USDT","tradeId":"{i}","px":"49000","sz":"0.1","side":"buy","ts":"{}"}}"#,
                1_700_000_000_000_i64 + i * 1_000
            )
        })
        .collect();
    let body = format!(r#"{{"code":"0","data":[{}]}}"#, rows.join(","));
    let request = RestRequest::new(
        "1".into(),
        "https://www.okx.com",
        reqwest::Method::GET,
        "/api/v5/market/history-trades",
    );
    let response = ok_response(request, &body);
    cache.prepend_historical_trades(adapter.parse_historical_trades(&response).unwrap(), None, None);

    let stored = &cache.trades["BTC-USDT"];
    let ids: Vec<i64> = stored.iter().map(|t| t.trade_id_as_i64()).collect();
    let expected: Vec<i64> = (30..=52).collect();
    // Strictly-earlier items prepended, overlap deduplicated, order kept.
    assert_eq!(ids, expected);
}

#[test]
fn cancel_sweep_targets_only_eligible_orders() {
    let mut ledger = OrderLedger::new();
    for (client_id, status) in [
        ("a", OrderStatus::New),
        ("b", OrderStatus::PartiallyFilled),
        ("c", OrderStatus::CancelAcknowledged),
        ("d", OrderStatus::Filled),
    ] {
        ledger.append(Order {
            symbol: "BTC-USDT".into(),
            client_order_id: Some(client_id.into()),
            status: Some(status),
            local_update_time_point: Some(TimePoint::from_unix_secs(1_000)),
            ..Default::default()
        });
    }

    let candidates = ledger.cancel_candidates(&CancelFilter {
        symbol: Some("BTC-USDT".into()),
        ..Default::default()
    });
    let ids: Vec<&str> = candidates
        .iter()
        .map(|c| c.client_order_id.as_deref().unwrap())
        .collect();
    assert_eq!(ids, vec!["a", "b"]);

    // Stamping the cancels locally makes the survivors in-flight, so a
    // second sweep finds nothing.
    let now = TimePoint::from_unix_secs(1_001);
    for candidate in candidates {
        ledger.replace(
            &candidate.symbol,
            candidate.order_id.as_deref(),
            candidate.client_order_id.as_deref(),
            |order| {
                order.status = Some(OrderStatus::CancelInFlight);
                order.local_update_time_point = Some(now);
            },
        );
    }
    assert!(
        ledger
            .cancel_candidates(&CancelFilter::default())
            .is_empty()
    );
    assert_eq!(ledger.in_flight_orders()["BTC-USDT"].len(), 2);
}

#[test]
fn margin_asset_resolves_through_instrument_map() {
    let adapter = OkxAdapter::spot();
    let mut ledger = OrderLedger::new();
    let mut instruments = HashMap::new();
    instruments.insert(
        "BTC-USDT-SWAP".to_string(),
        Instrument {
            symbol: "BTC-USDT-SWAP".into(),
            margin_asset: Some("USDT".into()),
            ..Default::default()
        },
    );

    ledger.append(Order {
        symbol: "BTC-USDT-SWAP".into(),
        client_order_id: Some("c1".into()),
        status: Some(OrderStatus::CreateInFlight),
        local_update_time_point: Some(TimePoint::from_unix_secs(1_000)),
        ..Default::default()
    });

    let message = push(
        r#"{"arg":{"channel":"orders","instType":"SWAP"},
            "data":[{"instId":"BTC-USDT-SWAP","ordId":"7","clOrdId":"c1","side":"buy",
                     "px":"50000","sz":"1","ordType":"limit","reduceOnly":"false",
                     "tdMode":"cross","accFillSz":"","avgPx":"",
                     "cTime":"1700000001000","uTime":"1700000001000","state":"live"}]}"#,
        &adapter,
    );
    for order in adapter.parse_push_orders(&message).unwrap() {
        ledger.update(order, TimePoint::from_unix_secs(1_001), None, &instruments);
    }

    let (_, order) = ledger.get("BTC-USDT-SWAP", None, Some("c1")).unwrap();
    assert_eq!(order.margin_asset.as_deref(), Some("USDT"));
}

#[test]
fn client_order_ids_are_second_scoped_and_padded() {
    let mut generator = ClientOrderIdGenerator::new(3);
    let first = generator.next_id(1_700_000_000);
    let second = generator.next_id(1_700_000_000);
    let rolled = generator.next_id(1_700_000_001);

    assert_eq!(first, "1700000000000");
    assert_eq!(second, "1700000000001");
    // Counter resets when the second advances.
    assert_eq!(rolled, "1700000001000");
    assert_eq!(first.len(), 10 + 3);
}
