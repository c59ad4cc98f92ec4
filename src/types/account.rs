//! Account entities: orders, fills, positions, balances.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::time::TimePoint;
use crate::types::enums::{ApiMethod, MarginType, OrderStatus};

fn parse_opt_decimal(input: &Option<String>) -> Option<Decimal> {
    input.as_deref().and_then(|s| s.parse().ok())
}

fn parse_opt_f64(input: &Option<String>) -> Option<f64> {
    input.as_deref().and_then(|s| s.parse().ok())
}

fn sign(is_positive: Option<bool>) -> f64 {
    if is_positive.unwrap_or(true) { 1.0 } else { -1.0 }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// An order as tracked by the session.
///
/// Created locally in `CreateInFlight`, then merged against acknowledgements,
/// stream pushes and corrective fetches under the reconciler's monotonicity
/// rules. `local_update_time_point` records when this session last touched
/// the entry and drives the stall checks and retention.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    pub api_method: Option<ApiMethod>,
    pub symbol: String,
    /// Venue timestamp of the update that produced this value.
    pub exchange_update_time_point: Option<TimePoint>,
    /// Venue-assigned order id.
    pub order_id: Option<String>,
    /// Caller-generated idempotency key.
    pub client_order_id: Option<String>,
    pub is_buy: Option<bool>,
    pub price: Option<String>,
    pub quantity: Option<String>,

    pub is_market: bool,
    pub is_post_only: bool,
    pub is_fok: bool,
    pub is_ioc: bool,
    pub is_reduce_only: bool,

    pub margin_type: Option<MarginType>,
    pub margin_asset: Option<String>,

    /// Venue-specific extras merged verbatim into the create payload.
    pub extra_params: Option<serde_json::Map<String, Value>>,

    pub cumulative_filled_quantity: Option<String>,
    pub cumulative_filled_quote_quantity: Option<String>,

    /// Venue timestamp of order creation.
    pub exchange_create_time_point: Option<TimePoint>,
    /// When this session last wrote the entry.
    pub local_update_time_point: Option<TimePoint>,
    pub status: Option<OrderStatus>,

    /// Arbitrary user data, preserved across merges.
    pub extra_data: Option<Value>,
}

impl Order {
    pub fn price_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.price)
    }

    pub fn price_as_f64(&self) -> Option<f64> {
        parse_opt_f64(&self.price)
    }

    pub fn quantity_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.quantity)
    }

    pub fn quantity_as_f64(&self) -> Option<f64> {
        parse_opt_f64(&self.quantity)
    }

    /// Quantity with buy = positive, sell = negative.
    pub fn quantity_as_f64_with_sign(&self) -> Option<f64> {
        self.quantity_as_f64().map(|q| sign(self.is_buy) * q)
    }

    pub fn cumulative_filled_quantity_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.cumulative_filled_quantity)
    }

    pub fn cumulative_filled_quantity_as_f64_with_sign(&self) -> Option<f64> {
        parse_opt_f64(&self.cumulative_filled_quantity).map(|q| sign(self.is_buy) * q)
    }

    pub fn cumulative_filled_quote_quantity_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.cumulative_filled_quote_quantity)
    }

    /// Local-only: no venue acknowledgement has been received.
    pub fn is_in_flight(&self) -> bool {
        self.status.is_some_and(OrderStatus::is_in_flight)
    }

    /// Acknowledged and still able to fill.
    pub fn is_open(&self) -> bool {
        self.status.is_some_and(OrderStatus::is_open)
    }

    /// Terminal.
    pub fn is_closed(&self) -> bool {
        self.status.is_some_and(OrderStatus::is_closed)
    }

    pub fn is_canceled(&self) -> bool {
        self.status == Some(OrderStatus::Canceled)
    }

    /// Open and not already cancel-acknowledged.
    pub fn is_eligible_to_cancel(&self) -> bool {
        self.status.is_some_and(OrderStatus::is_eligible_to_cancel)
    }

    pub fn is_partially_or_fully_filled(&self) -> bool {
        matches!(
            self.status,
            Some(OrderStatus::PartiallyFilled) | Some(OrderStatus::Filled)
        )
    }
}

// ---------------------------------------------------------------------------
// Fill
// ---------------------------------------------------------------------------

/// A single execution against an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub api_method: Option<ApiMethod>,
    pub symbol: String,
    pub exchange_update_time_point: Option<TimePoint>,
    pub order_id: Option<String>,
    pub client_order_id: Option<String>,
    pub trade_id: Option<String>,
    /// See [`crate::types::market::Trade::is_trade_id_monotonic_increase`].
    pub is_trade_id_monotonic_increase: bool,
    pub is_buy: Option<bool>,
    pub price: Option<String>,
    pub quantity: Option<String>,
    pub is_maker: Option<bool>,
    pub fee_asset: Option<String>,
    /// Unsigned fee quantity; `is_fee_rebate` carries the direction.
    pub fee_quantity: Option<String>,
    pub is_fee_rebate: Option<bool>,
}

impl Default for Fill {
    fn default() -> Self {
        Self {
            api_method: None,
            symbol: String::new(),
            exchange_update_time_point: None,
            order_id: None,
            client_order_id: None,
            trade_id: None,
            is_trade_id_monotonic_increase: true,
            is_buy: None,
            price: None,
            quantity: None,
            is_maker: None,
            fee_asset: None,
            fee_quantity: None,
            is_fee_rebate: None,
        }
    }
}

impl Fill {
    /// Numeric trade id for the `(timestamp, id)` sort key; zero when the id
    /// is absent or not monotone.
    pub fn trade_id_as_i64(&self) -> i64 {
        if !self.is_trade_id_monotonic_increase {
            return 0;
        }
        self.trade_id
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    pub fn price_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.price)
    }

    pub fn quantity_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.quantity)
    }

    pub fn fee_quantity_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.fee_quantity)
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// An open position. Quantity is stored unsigned with direction in
/// `is_long`; signed projections recombine them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Position {
    pub api_method: Option<ApiMethod>,
    pub symbol: String,
    pub exchange_update_time_point: Option<TimePoint>,
    pub margin_type: Option<MarginType>,
    pub quantity: Option<String>,
    pub is_long: Option<bool>,
    pub entry_price: Option<String>,
    pub mark_price: Option<String>,
    pub leverage: Option<String>,
    pub initial_margin: Option<String>,
    pub maintenance_margin: Option<String>,
    pub unrealized_pnl: Option<String>,
    pub liquidation_price: Option<String>,
}

impl Position {
    pub fn quantity_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.quantity)
    }

    pub fn quantity_as_f64(&self) -> Option<f64> {
        parse_opt_f64(&self.quantity)
    }

    /// Quantity with long = positive, short = negative.
    pub fn quantity_as_f64_with_sign(&self) -> Option<f64> {
        self.quantity_as_f64().map(|q| sign(self.is_long) * q)
    }

    pub fn entry_price_as_f64(&self) -> Option<f64> {
        parse_opt_f64(&self.entry_price)
    }

    pub fn mark_price_as_f64(&self) -> Option<f64> {
        parse_opt_f64(&self.mark_price)
    }

    pub fn unrealized_pnl_as_f64(&self) -> Option<f64> {
        parse_opt_f64(&self.unrealized_pnl)
    }
}

// ---------------------------------------------------------------------------
// Balance
// ---------------------------------------------------------------------------

/// Wallet balance for one asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Balance {
    pub api_method: Option<ApiMethod>,
    /// Asset label, e.g. `USDT`.
    pub asset: String,
    pub exchange_update_time_point: Option<TimePoint>,
    /// Wallet quantity.
    pub quantity: Option<String>,
}

impl Balance {
    pub fn quantity_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.quantity)
    }

    pub fn quantity_as_f64(&self) -> Option<f64> {
        parse_opt_f64(&self.quantity)
    }
}
