//! Data model shared by the session core and venue adapters.
//!
//! ## Organization
//!
//! - [`enums`] — Shared enumerations (api method, margin type, order status)
//! - [`market`] — Instrument, BBO, trade, and candle types
//! - [`account`] — Order, fill, position, and balance types
//!
//! All enums are re-exported at the module root via `pub use enums::*`.
//!
//! Entities keep wire numerics as canonical decimal strings and expose
//! `*_as_decimal` / `*_as_f64` projections. Every entity is an immutable
//! value: cache updates swap whole entries rather than mutating fields.

pub mod account;
pub mod enums;
pub mod market;

pub use account::{Balance, Fill, Order, Position};
pub use enums::*;
pub use market::{Bbo, Instrument, Ohlcv, Trade};
