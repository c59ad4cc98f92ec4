//! Market-data entities: instruments, top-of-book quotes, trades, candles.
//!
//! Numeric fields are canonical decimal strings exactly as they appeared on
//! the wire; `*_as_decimal` / `*_as_f64` projections parse on demand. Float
//! projections are for display and selector arithmetic only — never for
//! equality or storage.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::time::TimePoint;
use crate::types::enums::ApiMethod;

fn parse_opt_decimal(input: &Option<String>) -> Option<Decimal> {
    input.as_deref().and_then(|s| s.parse().ok())
}

fn parse_opt_f64(input: &Option<String>) -> Option<f64> {
    input.as_deref().and_then(|s| s.parse().ok())
}

// ---------------------------------------------------------------------------
// Instrument
// ---------------------------------------------------------------------------

/// Static description of a tradable instrument.
///
/// Seeded at session start and refreshed periodically; entries are replaced
/// wholesale on refresh and never deleted during a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Instrument {
    /// Channel that produced this snapshot.
    pub api_method: Option<ApiMethod>,
    /// Venue symbol, e.g. `BTC-USDT`.
    pub symbol: String,
    pub base_asset: Option<String>,
    pub quote_asset: Option<String>,
    /// Minimum price increment (tick size).
    pub order_price_increment: Option<String>,
    /// Minimum quantity increment (lot size).
    pub order_quantity_increment: Option<String>,
    pub order_quantity_min: Option<String>,
    pub order_quantity_max: Option<String>,
    pub order_quote_quantity_min: Option<String>,
    pub order_quote_quantity_max: Option<String>,
    /// Settlement/margin asset for derivatives.
    pub margin_asset: Option<String>,
    pub underlying_symbol: Option<String>,
    pub contract_size: Option<String>,
    pub contract_multiplier: Option<String>,
    /// Expiry as seconds since the epoch, for dated contracts.
    pub expiry_unix_timestamp_seconds: Option<i64>,
    pub is_open_for_trade: Option<bool>,
}

impl Instrument {
    pub fn order_price_increment_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.order_price_increment)
    }

    pub fn order_quantity_increment_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.order_quantity_increment)
    }

    pub fn order_quantity_min_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.order_quantity_min)
    }

    pub fn order_quantity_max_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.order_quantity_max)
    }

    pub fn contract_size_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.contract_size)
    }

    pub fn contract_multiplier_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.contract_multiplier)
    }
}

// ---------------------------------------------------------------------------
// Bbo
// ---------------------------------------------------------------------------

/// Best bid and best ask (top of book) for one symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bbo {
    pub api_method: Option<ApiMethod>,
    pub symbol: String,
    /// Venue timestamp of the quote. `None` means "always apply".
    pub exchange_update_time_point: Option<TimePoint>,
    pub best_bid_price: Option<String>,
    pub best_bid_size: Option<String>,
    pub best_ask_price: Option<String>,
    pub best_ask_size: Option<String>,
}

impl Bbo {
    pub fn best_bid_price_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.best_bid_price)
    }

    pub fn best_ask_price_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.best_ask_price)
    }

    pub fn best_bid_price_as_f64(&self) -> Option<f64> {
        parse_opt_f64(&self.best_bid_price)
    }

    pub fn best_ask_price_as_f64(&self) -> Option<f64> {
        parse_opt_f64(&self.best_ask_price)
    }

    pub fn best_bid_size_as_f64(&self) -> Option<f64> {
        parse_opt_f64(&self.best_bid_size)
    }

    pub fn best_ask_size_as_f64(&self) -> Option<f64> {
        parse_opt_f64(&self.best_ask_size)
    }

    /// Midpoint of bid and ask as an exact decimal.
    pub fn mid_price_as_decimal(&self) -> Option<Decimal> {
        match (self.best_bid_price_as_decimal(), self.best_ask_price_as_decimal()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }

    /// Midpoint of bid and ask as a float.
    pub fn mid_price_as_f64(&self) -> Option<f64> {
        match (self.best_bid_price_as_f64(), self.best_ask_price_as_f64()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// A public trade print.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub api_method: Option<ApiMethod>,
    pub symbol: String,
    pub exchange_update_time_point: Option<TimePoint>,
    pub trade_id: Option<String>,
    /// Whether trade ids on this venue increase monotonically; when they do,
    /// the numeric id participates in the sort key.
    pub is_trade_id_monotonic_increase: bool,
    pub price: Option<String>,
    pub size: Option<String>,
    pub is_buyer_maker: Option<bool>,
}

impl Default for Trade {
    fn default() -> Self {
        Self {
            api_method: None,
            symbol: String::new(),
            exchange_update_time_point: None,
            trade_id: None,
            is_trade_id_monotonic_increase: true,
            price: None,
            size: None,
            is_buyer_maker: None,
        }
    }
}

impl Trade {
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

    pub fn size_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.size)
    }

    pub fn price_as_f64(&self) -> Option<f64> {
        parse_opt_f64(&self.price)
    }

    pub fn size_as_f64(&self) -> Option<f64> {
        parse_opt_f64(&self.size)
    }
}

// ---------------------------------------------------------------------------
// Ohlcv
// ---------------------------------------------------------------------------

/// One candle bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ohlcv {
    pub api_method: Option<ApiMethod>,
    pub symbol: String,
    /// Bucket start, whole seconds since the epoch.
    pub start_unix_timestamp_seconds: Option<i64>,
    pub open_price: Option<String>,
    pub high_price: Option<String>,
    pub low_price: Option<String>,
    pub close_price: Option<String>,
    /// Base-asset volume.
    pub volume: Option<String>,
    /// Quote-asset volume.
    pub quote_volume: Option<String>,
}

impl Ohlcv {
    pub fn open_price_as_f64(&self) -> Option<f64> {
        parse_opt_f64(&self.open_price)
    }

    pub fn high_price_as_f64(&self) -> Option<f64> {
        parse_opt_f64(&self.high_price)
    }

    pub fn low_price_as_f64(&self) -> Option<f64> {
        parse_opt_f64(&self.low_price)
    }

    pub fn close_price_as_f64(&self) -> Option<f64> {
        parse_opt_f64(&self.close_price)
    }

    pub fn close_price_as_decimal(&self) -> Option<Decimal> {
        parse_opt_decimal(&self.close_price)
    }

    pub fn volume_as_f64(&self) -> Option<f64> {
        parse_opt_f64(&self.volume)
    }
}
