//! Concrete venue adapters.
//!
//! Each venue implements [`crate::adapter::ExchangeAdapter`]; the session
//! core is venue-agnostic. Adding a venue means adding a module here — the
//! core does not change.

pub mod okx;

pub use okx::{OkxAdapter, OkxInstrumentType};
