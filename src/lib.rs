//! # omnitrade
//!
//! A unified crypto-exchange trading client. Several venues (each with a
//! request/response HTTP channel and a bidirectional streaming channel) are
//! abstracted behind one contract, so trading strategies see a single,
//! consistent view of instruments, top-of-book quotes, candles, trades,
//! orders, fills, positions and balances.
//!
//! The heart of the crate is the [`session::Session`]: a concurrency-safe
//! state cache synchronized from stream pushes and periodic pulls, a stream
//! connection manager with heartbeats and exponential-backoff reconnect, a
//! request pipeline that drives paginated historical fetches, and an order
//! lifecycle reconciler that merges optimistic local state, stream pushes
//! and pull confirmations under strict monotonicity rules. Venues plug in
//! through [`adapter::ExchangeAdapter`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use omnitrade::config::SessionConfig;
//! use omnitrade::session::Session;
//! use omnitrade::venues::okx::OkxAdapter;
//!
//! #[tokio::main]
//! async fn main() -> omnitrade::error::Result<()> {
//!     let mut config = SessionConfig::for_symbols("BTC-USDT");
//!     config.subscribe_bbo = true;
//!
//!     let session = Session::new(OkxAdapter::spot(), config)?;
//!     session.start().await?;
//!     if let Some(bbo) = session.bbo("BTC-USDT").await {
//!         println!("mid = {:?}", bbo.mid_price_as_decimal());
//!     }
//!     session.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod cache;
pub mod config;
pub mod error;
pub mod numeric;
pub mod orders;
mod rest;
pub mod session;
pub mod time;
pub mod types;
pub mod venues;
pub mod wire;
pub mod ws;

/// Re-export the main session type at crate root for convenience.
pub use session::Session;
/// Re-export the error type and Result alias.
pub use error::{ExchangeError, Result};
/// Re-export the configuration record.
pub use config::SessionConfig;
