//! Order ledger and lifecycle reconciler.
//!
//! Orders arrive from four sources: local create/cancel calls, create/cancel
//! responses (REST or stream), push updates, and corrective fetches. No
//! global ordering holds across those sources, so the ledger merges under a
//! monotone key: an update applies only when it advances the venue
//! timestamp, the status progression, or the cumulative fill. Everything
//! else is dropped as stale — in particular a create response arriving after
//! the push it acknowledges (the common out-of-order case) cannot downgrade
//! the order.
//!
//! Per symbol, orders are kept in insertion order (creation order). Lookup
//! is a linear scan, fine at per-symbol cardinalities of hundreds.

use std::collections::HashMap;

use crate::adapter::OrderRef;
use crate::time::TimePoint;
use crate::types::account::Order;
use crate::types::market::Instrument;

// ---------------------------------------------------------------------------
// Client order ids
// ---------------------------------------------------------------------------

/// Generates client order ids of the form `<unix seconds><zero-padded
/// counter>`. The counter resets whenever the second advances; the suffix
/// width is configurable.
#[derive(Debug)]
pub struct ClientOrderIdGenerator {
    padding: usize,
    last_secs: Option<i64>,
    sequence: u64,
}

impl ClientOrderIdGenerator {
    pub fn new(padding: usize) -> Self {
        Self {
            padding,
            last_secs: None,
            sequence: 0,
        }
    }

    /// The next id for the given wall-clock second.
    pub fn next_id(&mut self, now_secs: i64) -> String {
        if self.last_secs == Some(now_secs) {
            self.sequence += 1;
        } else {
            self.last_secs = Some(now_secs);
            self.sequence = 0;
        }
        format!("{now_secs}{:0width$}", self.sequence, width = self.padding)
    }
}

// ---------------------------------------------------------------------------
// Cancel filter
// ---------------------------------------------------------------------------

/// Optional narrowing filters for cancel-many.
#[derive(Debug, Clone, Default)]
pub struct CancelFilter {
    /// Restrict to one symbol; `None` means every symbol.
    pub symbol: Option<String>,
    /// Restrict to these venue order ids.
    pub order_ids: Option<Vec<String>>,
    /// Restrict to these client order ids.
    pub client_order_ids: Option<Vec<String>>,
    /// Restrict to orders with this margin asset.
    pub margin_asset: Option<String>,
}

impl CancelFilter {
    fn matches(&self, order: &Order) -> bool {
        let by_order_id = self
            .order_ids
            .as_ref()
            .is_none_or(|ids| order.order_id.as_ref().is_some_and(|id| ids.contains(id)));
        let by_client_id = self.client_order_ids.as_ref().is_none_or(|ids| {
            order
                .client_order_id
                .as_ref()
                .is_some_and(|id| ids.contains(id))
        });
        let by_margin_asset = self
            .margin_asset
            .as_ref()
            .is_none_or(|asset| order.margin_asset.as_deref() == Some(asset.as_str()));
        by_order_id && by_client_id && by_margin_asset
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Per-symbol order lists in creation order, with the monotone merge.
#[derive(Debug, Default)]
pub struct OrderLedger {
    /// Orders per symbol, earliest created first.
    pub orders: HashMap<String, Vec<Order>>,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find an order by client id (preferred when given) or venue id.
    pub fn get(
        &self,
        symbol: &str,
        order_id: Option<&str>,
        client_order_id: Option<&str>,
    ) -> Option<(usize, &Order)> {
        let orders = self.orders.get(symbol)?;
        orders.iter().enumerate().find(|(_, order)| {
            if let Some(client_id) = client_order_id {
                order.client_order_id.as_deref() == Some(client_id)
            } else {
                order.order_id.as_deref() == order_id
            }
        })
    }

    /// Append a new order, recording creation order.
    pub fn append(&mut self, order: Order) {
        self.orders.entry(order.symbol.clone()).or_default().push(order);
    }

    /// Rewrite one order in place (one atomic swap per entity).
    pub fn replace(
        &mut self,
        symbol: &str,
        order_id: Option<&str>,
        client_order_id: Option<&str>,
        rewrite: impl FnOnce(&mut Order),
    ) {
        let index = match self.get(symbol, order_id, client_order_id) {
            Some((index, _)) => index,
            None => return,
        };
        if let Some(orders) = self.orders.get_mut(symbol) {
            let mut updated = orders[index].clone();
            rewrite(&mut updated);
            orders[index] = updated;
        }
    }

    /// Remove one order.
    pub fn remove(&mut self, symbol: &str, order_id: Option<&str>, client_order_id: Option<&str>) {
        let index = match self.get(symbol, order_id, client_order_id) {
            Some((index, _)) => index,
            None => return,
        };
        if let Some(orders) = self.orders.get_mut(symbol) {
            orders.remove(index);
        }
    }

    /// Merge an incoming order under the monotone rules.
    ///
    /// The update applies only if it advances at least one of:
    /// (a) the venue update timestamp, (b) the status progression,
    /// (c) the cumulative filled quantity (strict increase). On merge the
    /// identity fields (symbol, side, flags, client id, extras) are kept
    /// from the existing entry; price/quantity/order-id refresh from the
    /// incoming one; fill counters move only under (c).
    pub fn update(
        &mut self,
        incoming: Order,
        now: TimePoint,
        default_margin_asset: Option<&str>,
        instruments: &HashMap<String, Instrument>,
    ) {
        let found = self
            .get(
                &incoming.symbol,
                incoming.order_id.as_deref(),
                incoming.client_order_id.as_deref(),
            )
            .map(|(index, order)| (index, order.clone()));
        let Some((index, existing)) = found else {
            let mut appended = incoming;
            appended.local_update_time_point = Some(now);
            self.append(appended);
            return;
        };

        let has_fill = match (
            incoming.cumulative_filled_quantity_as_decimal(),
            existing.cumulative_filled_quantity_as_decimal(),
        ) {
            (Some(new), Some(old)) => new > old,
            (Some(_), None) => true,
            (None, _) => false,
        };

        let advances_time = match (incoming.exchange_update_time_point, existing.exchange_update_time_point) {
            (Some(new), Some(old)) => new > old,
            (Some(_), None) => true,
            (None, _) => false,
        };

        let advances_status = match (incoming.status, existing.status) {
            (Some(new), Some(old)) => new > old,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if !(advances_time || advances_status || has_fill) {
            return;
        }

        let order_id = match &incoming.order_id {
            Some(id) if existing.order_id.as_ref() != Some(id) => Some(id.clone()),
            _ => existing.order_id.clone(),
        };
        let price = match &incoming.price {
            Some(price) if existing.price.as_ref() != Some(price) => Some(price.clone()),
            _ => existing.price.clone(),
        };
        let quantity = match &incoming.quantity {
            Some(quantity) if existing.quantity.as_ref() != Some(quantity) => Some(quantity.clone()),
            _ => existing.quantity.clone(),
        };

        let (cumulative_filled_quantity, cumulative_filled_quote_quantity) = if has_fill {
            (
                incoming.cumulative_filled_quantity.clone(),
                incoming.cumulative_filled_quote_quantity.clone(),
            )
        } else {
            (
                existing.cumulative_filled_quantity.clone(),
                existing.cumulative_filled_quote_quantity.clone(),
            )
        };

        let margin_asset = existing
            .margin_asset
            .clone()
            .or_else(|| default_margin_asset.map(str::to_owned))
            .or_else(|| {
                instruments
                    .get(&existing.symbol)
                    .and_then(|instrument| instrument.margin_asset.clone())
            });

        let merged = Order {
            api_method: existing.api_method,
            symbol: existing.symbol.clone(),
            exchange_update_time_point: incoming.exchange_update_time_point,
            order_id,
            client_order_id: existing.client_order_id.clone(),
            is_buy: existing.is_buy,
            price,
            quantity,
            is_market: existing.is_market,
            is_post_only: existing.is_post_only,
            is_fok: existing.is_fok,
            is_ioc: existing.is_ioc,
            is_reduce_only: existing.is_reduce_only,
            margin_type: existing.margin_type,
            margin_asset,
            extra_params: existing.extra_params.clone(),
            cumulative_filled_quantity,
            cumulative_filled_quote_quantity,
            exchange_create_time_point: existing
                .exchange_create_time_point
                .or(incoming.exchange_create_time_point),
            local_update_time_point: incoming.local_update_time_point.or(Some(now)),
            status: incoming.status,
            extra_data: existing.extra_data.clone(),
        };

        if let Some(orders) = self.orders.get_mut(&merged.symbol) {
            orders[index] = merged;
        }
    }

    // -- queries -----------------------------------------------------------

    /// Open orders per symbol (acknowledged, still able to fill).
    pub fn open_orders(&self) -> HashMap<String, Vec<Order>> {
        self.filtered(Order::is_open)
    }

    /// In-flight orders per symbol (no acknowledgement yet).
    pub fn in_flight_orders(&self) -> HashMap<String, Vec<Order>> {
        self.filtered(Order::is_in_flight)
    }

    fn filtered(&self, keep: impl Fn(&Order) -> bool) -> HashMap<String, Vec<Order>> {
        self.orders
            .iter()
            .filter_map(|(symbol, orders)| {
                let matching: Vec<Order> = orders.iter().filter(|o| keep(o)).cloned().collect();
                if matching.is_empty() {
                    None
                } else {
                    Some((symbol.clone(), matching))
                }
            })
            .collect()
    }

    /// Cancel-eligible orders matching the filter, in creation order.
    pub fn cancel_candidates(&self, filter: &CancelFilter) -> Vec<OrderRef> {
        let mut candidates = Vec::new();
        let mut symbols: Vec<&String> = match &filter.symbol {
            Some(symbol) => self.orders.keys().filter(|s| *s == symbol).collect(),
            None => self.orders.keys().collect(),
        };
        symbols.sort();
        for symbol in symbols {
            for order in &self.orders[symbol] {
                if order.is_eligible_to_cancel() && filter.matches(order) {
                    candidates.push(OrderRef::from_order(order));
                }
            }
        }
        candidates
    }

    /// Open orders whose last local touch is older than the threshold.
    /// Candidates for a corrective fetch.
    pub fn stale_open_orders(&self, now: TimePoint, threshold_seconds: i64) -> Vec<OrderRef> {
        self.stale(now, threshold_seconds, Order::is_open)
    }

    /// In-flight orders whose last local touch is older than the threshold.
    pub fn stale_in_flight_orders(&self, now: TimePoint, threshold_seconds: i64) -> Vec<OrderRef> {
        self.stale(now, threshold_seconds, Order::is_in_flight)
    }

    fn stale(
        &self,
        now: TimePoint,
        threshold_seconds: i64,
        state: impl Fn(&Order) -> bool,
    ) -> Vec<OrderRef> {
        let mut found = Vec::new();
        for orders in self.orders.values() {
            for order in orders {
                if state(order)
                    && order
                        .local_update_time_point
                        .is_some_and(|tp| now.seconds_since(tp) > threshold_seconds as f64)
                {
                    found.push(OrderRef::from_order(order));
                }
            }
        }
        found
    }

    // -- retention -----------------------------------------------------------

    /// Drop closed orders older than `keep_seconds`, measured against the
    /// latest closed order's local update per symbol. Open and in-flight
    /// orders are never aged out.
    pub fn trim(&mut self, keep_seconds: i64) {
        for orders in self.orders.values_mut() {
            let latest_closed = orders
                .iter()
                .filter(|o| o.is_closed())
                .filter_map(|o| o.local_update_time_point)
                .max();
            let Some(latest) = latest_closed else { continue };
            let earliest_to_keep = latest.secs - keep_seconds;
            orders.retain(|order| {
                !order.is_closed()
                    || order
                        .local_update_time_point
                        .is_none_or(|tp| tp.secs >= earliest_to_keep)
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::enums::OrderStatus;

    fn no_instruments() -> HashMap<String, Instrument> {
        HashMap::new()
    }

    fn local_create(client_order_id: &str, now: TimePoint) -> Order {
        Order {
            symbol: "BTC-USDT".into(),
            client_order_id: Some(client_order_id.into()),
            is_buy: Some(true),
            price: Some("50000".into()),
            quantity: Some("0.001".into()),
            status: Some(OrderStatus::CreateInFlight),
            local_update_time_point: Some(now),
            ..Default::default()
        }
    }

    #[test]
    fn client_order_id_counter_resets_each_second() {
        let mut generator = ClientOrderIdGenerator::new(3);
        assert_eq!(generator.next_id(1_700_000_000), "1700000000000");
        assert_eq!(generator.next_id(1_700_000_000), "1700000000001");
        assert_eq!(generator.next_id(1_700_000_001), "1700000001000");
        // Suffix length follows the configured padding.
        let mut wide = ClientOrderIdGenerator::new(5);
        assert_eq!(wide.next_id(42), "4200000");
    }

    #[test]
    fn create_then_acknowledge_then_push() {
        // S1: optimistic create, REST acknowledgement, then a NEW push.
        let mut ledger = OrderLedger::new();
        let t0 = TimePoint::from_unix_secs(1_000);
        ledger.append(local_create("c1", t0));

        let (_, order) = ledger.get("BTC-USDT", None, Some("c1")).unwrap();
        assert_eq!(order.status, Some(OrderStatus::CreateInFlight));
        assert!(order.local_update_time_point.is_some());

        let acknowledgement = Order {
            symbol: "BTC-USDT".into(),
            client_order_id: Some("c1".into()),
            order_id: Some("123".into()),
            exchange_update_time_point: Some(TimePoint::from_unix_secs(1_001)),
            status: Some(OrderStatus::CreateAcknowledged),
            ..Default::default()
        };
        ledger.update(acknowledgement, TimePoint::from_unix_secs(1_001), None, &no_instruments());
        let (_, order) = ledger.get("BTC-USDT", None, Some("c1")).unwrap();
        assert_eq!(order.status, Some(OrderStatus::CreateAcknowledged));
        assert_eq!(order.order_id.as_deref(), Some("123"));
        // Identity fields survive the merge.
        assert_eq!(order.is_buy, Some(true));
        assert_eq!(order.price.as_deref(), Some("50000"));

        let push = Order {
            symbol: "BTC-USDT".into(),
            client_order_id: Some("c1".into()),
            order_id: Some("123".into()),
            exchange_update_time_point: Some(TimePoint::from_unix_secs(1_002)),
            status: Some(OrderStatus::New),
            ..Default::default()
        };
        ledger.update(push, TimePoint::from_unix_secs(1_002), None, &no_instruments());
        let (_, order) = ledger.get("BTC-USDT", None, Some("c1")).unwrap();
        assert_eq!(order.status, Some(OrderStatus::New));
    }

    #[test]
    fn late_response_cannot_downgrade_pushed_status() {
        // S2: the PARTIALLY_FILLED push at T2 lands before the create
        // response stamped T1 < T2.
        let mut ledger = OrderLedger::new();
        ledger.append(local_create("c1", TimePoint::from_unix_secs(1_000)));

        let push = Order {
            symbol: "BTC-USDT".into(),
            client_order_id: Some("c1".into()),
            order_id: Some("123".into()),
            exchange_update_time_point: Some(TimePoint::from_unix_secs(1_005)),
            cumulative_filled_quantity: Some("0.0005".into()),
            status: Some(OrderStatus::PartiallyFilled),
            ..Default::default()
        };
        ledger.update(push, TimePoint::from_unix_secs(1_005), None, &no_instruments());

        let late_response = Order {
            symbol: "BTC-USDT".into(),
            client_order_id: Some("c1".into()),
            order_id: Some("123".into()),
            exchange_update_time_point: Some(TimePoint::from_unix_secs(1_003)),
            status: Some(OrderStatus::CreateAcknowledged),
            ..Default::default()
        };
        ledger.update(late_response, TimePoint::from_unix_secs(1_006), None, &no_instruments());

        let (_, order) = ledger.get("BTC-USDT", None, Some("c1")).unwrap();
        assert_eq!(order.status, Some(OrderStatus::PartiallyFilled));
        assert_eq!(order.cumulative_filled_quantity.as_deref(), Some("0.0005"));
    }

    #[test]
    fn cumulative_fill_never_decreases() {
        // S3: a later push carrying a smaller fill is stale and dropped.
        let mut ledger = OrderLedger::new();
        ledger.append(local_create("c1", TimePoint::from_unix_secs(1_000)));

        let first = Order {
            symbol: "BTC-USDT".into(),
            client_order_id: Some("c1".into()),
            exchange_update_time_point: Some(TimePoint::from_unix_secs(1_001)),
            cumulative_filled_quantity: Some("0.5".into()),
            status: Some(OrderStatus::PartiallyFilled),
            ..Default::default()
        };
        ledger.update(first, TimePoint::from_unix_secs(1_001), None, &no_instruments());

        // Same timestamp and status, smaller fill: no predicate fires.
        let stale = Order {
            symbol: "BTC-USDT".into(),
            client_order_id: Some("c1".into()),
            exchange_update_time_point: Some(TimePoint::from_unix_secs(1_001)),
            cumulative_filled_quantity: Some("0.4".into()),
            status: Some(OrderStatus::PartiallyFilled),
            ..Default::default()
        };
        ledger.update(stale, TimePoint::from_unix_secs(1_002), None, &no_instruments());

        let (_, order) = ledger.get("BTC-USDT", None, Some("c1")).unwrap();
        assert_eq!(order.cumulative_filled_quantity.as_deref(), Some("0.5"));
    }

    #[test]
    fn unknown_incoming_order_is_appended() {
        let mut ledger = OrderLedger::new();
        let incoming = Order {
            symbol: "ETH-USDT".into(),
            order_id: Some("777".into()),
            status: Some(OrderStatus::New),
            ..Default::default()
        };
        ledger.update(incoming, TimePoint::from_unix_secs(1_000), None, &no_instruments());
        let (_, order) = ledger.get("ETH-USDT", Some("777"), None).unwrap();
        assert_eq!(order.status, Some(OrderStatus::New));
        assert_eq!(order.local_update_time_point, Some(TimePoint::from_unix_secs(1_000)));
    }

    #[test]
    fn margin_asset_falls_back_to_session_then_instrument() {
        let mut instruments = HashMap::new();
        instruments.insert(
            "BTC-USDT-SWAP".into(),
            Instrument {
                symbol: "BTC-USDT-SWAP".into(),
                margin_asset: Some("USDT".into()),
                ..Default::default()
            },
        );

        let mut ledger = OrderLedger::new();
        ledger.append(Order {
            symbol: "BTC-USDT-SWAP".into(),
            client_order_id: Some("c1".into()),
            status: Some(OrderStatus::CreateInFlight),
            ..Default::default()
        });
        let acknowledgement = Order {
            symbol: "BTC-USDT-SWAP".into(),
            client_order_id: Some("c1".into()),
            exchange_update_time_point: Some(TimePoint::from_unix_secs(1_001)),
            status: Some(OrderStatus::CreateAcknowledged),
            ..Default::default()
        };
        ledger.update(acknowledgement, TimePoint::from_unix_secs(1_001), None, &instruments);
        let (_, order) = ledger.get("BTC-USDT-SWAP", None, Some("c1")).unwrap();
        assert_eq!(order.margin_asset.as_deref(), Some("USDT"));
    }

    #[test]
    fn cancel_candidates_skip_ineligible_orders() {
        // S6: NEW and PARTIALLY_FILLED are canceled; CANCEL_ACKNOWLEDGED and
        // FILLED are skipped.
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
                ..Default::default()
            });
        }

        let filter = CancelFilter {
            symbol: Some("BTC-USDT".into()),
            ..Default::default()
        };
        let candidates = ledger.cancel_candidates(&filter);
        let ids: Vec<&str> = candidates
            .iter()
            .map(|r| r.client_order_id.as_deref().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn cancel_filter_narrows_by_margin_asset() {
        let mut ledger = OrderLedger::new();
        ledger.append(Order {
            symbol: "BTC-USDT".into(),
            client_order_id: Some("a".into()),
            margin_asset: Some("USDT".into()),
            status: Some(OrderStatus::New),
            ..Default::default()
        });
        ledger.append(Order {
            symbol: "BTC-USDT".into(),
            client_order_id: Some("b".into()),
            margin_asset: Some("BTC".into()),
            status: Some(OrderStatus::New),
            ..Default::default()
        });

        let filter = CancelFilter {
            margin_asset: Some("USDT".into()),
            ..Default::default()
        };
        let candidates = ledger.cancel_candidates(&filter);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].client_order_id.as_deref(), Some("a"));
    }

    #[test]
    fn stall_scans_find_old_orders_only() {
        let mut ledger = OrderLedger::new();
        ledger.append(Order {
            symbol: "BTC-USDT".into(),
            client_order_id: Some("fresh".into()),
            status: Some(OrderStatus::CreateInFlight),
            local_update_time_point: Some(TimePoint::from_unix_secs(995)),
            ..Default::default()
        });
        ledger.append(Order {
            symbol: "BTC-USDT".into(),
            client_order_id: Some("stuck".into()),
            status: Some(OrderStatus::CreateInFlight),
            local_update_time_point: Some(TimePoint::from_unix_secs(900)),
            ..Default::default()
        });

        let now = TimePoint::from_unix_secs(1_000);
        let stale = ledger.stale_in_flight_orders(now, 10);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].client_order_id.as_deref(), Some("stuck"));
        assert!(ledger.stale_open_orders(now, 10).is_empty());
    }

    #[test]
    fn retention_drops_only_old_closed_orders() {
        let mut ledger = OrderLedger::new();
        ledger.append(Order {
            symbol: "BTC-USDT".into(),
            client_order_id: Some("old-closed".into()),
            status: Some(OrderStatus::Filled),
            local_update_time_point: Some(TimePoint::from_unix_secs(100)),
            ..Default::default()
        });
        ledger.append(Order {
            symbol: "BTC-USDT".into(),
            client_order_id: Some("old-open".into()),
            status: Some(OrderStatus::New),
            local_update_time_point: Some(TimePoint::from_unix_secs(100)),
            ..Default::default()
        });
        ledger.append(Order {
            symbol: "BTC-USDT".into(),
            client_order_id: Some("new-closed".into()),
            status: Some(OrderStatus::Canceled),
            local_update_time_point: Some(TimePoint::from_unix_secs(500)),
            ..Default::default()
        });

        ledger.trim(300);
        let remaining: Vec<&str> = ledger.orders["BTC-USDT"]
            .iter()
            .map(|o| o.client_order_id.as_deref().unwrap())
            .collect();
        // The open order survives regardless of age; the closed one at 100
        // is outside 500 - 300.
        assert_eq!(remaining, vec!["old-open", "new-closed"]);
    }
}
