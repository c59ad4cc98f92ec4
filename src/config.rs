//! Session configuration.
//!
//! [`SessionConfig`] is a plain record with defaulted fields, in the style of
//! a keyword-argument constructor: build one with struct-update syntax over
//! [`SessionConfig::default()`], or start from [`SessionConfig::for_symbols`].
//! Validation happens once, when the config is handed to
//! [`Session::new`](crate::session::Session::new).
//!
//! Periods and windows are expressed in seconds under the same names the
//! venue-facing options use; `None` disables the corresponding task.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::{ExchangeError, Result};
use crate::types::enums::ApiMethod;

/// The wildcard symbol set: every instrument that is open for trade.
pub const ALL_TRADABLE: &str = "*";

/// Configuration record for an exchange session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Symbols to track. The single element `"*"` expands at start to every
    /// instrument that is open for trade.
    pub symbols: BTreeSet<String>,
    /// Venue-specific market segment (e.g. `SPOT`, `SWAP`). Validated by the
    /// adapter at start; an unknown value is fatal.
    pub instrument_type: Option<String>,
    /// Session-level default margin asset, used when neither the order nor
    /// the instrument carries one.
    pub margin_asset: Option<String>,

    // -- market data subscriptions --------------------------------------
    pub subscribe_bbo: bool,
    pub subscribe_trade: bool,
    pub subscribe_ohlcv: bool,

    /// Candle bucket width in seconds.
    pub ohlcv_interval_seconds: i64,

    // -- account subscriptions ------------------------------------------
    pub subscribe_order: bool,
    pub subscribe_fill: bool,
    pub subscribe_position: bool,
    pub subscribe_balance: bool,

    // -- historical backfill --------------------------------------------
    pub fetch_historical_trade_at_start: bool,
    pub fetch_historical_trade_start_unix_timestamp_seconds: Option<i64>,
    pub fetch_historical_trade_end_unix_timestamp_seconds: Option<i64>,
    pub fetch_historical_ohlcv_at_start: bool,
    pub fetch_historical_ohlcv_start_unix_timestamp_seconds: Option<i64>,
    pub fetch_historical_ohlcv_end_unix_timestamp_seconds: Option<i64>,
    pub fetch_historical_order_at_start: bool,
    pub fetch_historical_order_start_unix_timestamp_seconds: Option<i64>,
    pub fetch_historical_order_end_unix_timestamp_seconds: Option<i64>,
    pub fetch_historical_fill_at_start: bool,
    pub fetch_historical_fill_start_unix_timestamp_seconds: Option<i64>,
    pub fetch_historical_fill_end_unix_timestamp_seconds: Option<i64>,

    // -- retention -------------------------------------------------------
    pub keep_historical_trade_seconds: Option<i64>,
    pub remove_historical_trade_interval_seconds: Option<u64>,
    pub keep_historical_ohlcv_seconds: Option<i64>,
    pub remove_historical_ohlcv_interval_seconds: Option<u64>,
    pub keep_historical_order_seconds: Option<i64>,
    pub remove_historical_order_interval_seconds: Option<u64>,
    pub keep_historical_fill_seconds: Option<i64>,
    pub remove_historical_fill_interval_seconds: Option<u64>,

    // -- credentials -----------------------------------------------------
    pub is_paper_trading: bool,
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,

    // -- periodic REST sync ----------------------------------------------
    pub rest_market_data_fetch_all_instrument_information_at_start: bool,
    pub rest_market_data_fetch_all_instrument_information_period_seconds: Option<u64>,
    pub rest_market_data_fetch_bbo_period_seconds: Option<u64>,
    pub rest_account_fetch_open_order_at_start: bool,
    /// Cancel every open order during start.
    pub rest_account_cancel_open_order_at_start: bool,
    pub rest_account_check_open_order_period_seconds: Option<u64>,
    pub rest_account_check_open_order_threshold_seconds: Option<i64>,
    pub rest_account_check_in_flight_order_period_seconds: Option<u64>,
    pub rest_account_check_in_flight_order_threshold_seconds: Option<i64>,
    pub rest_account_fetch_position_period_seconds: Option<u64>,
    pub rest_account_fetch_balance_period_seconds: Option<u64>,
    /// Pacing between consecutive paginated market-data requests.
    pub rest_market_data_send_consecutive_request_delay_seconds: f64,
    /// Pacing between consecutive paginated account requests.
    pub rest_account_send_consecutive_request_delay_seconds: f64,

    // -- streaming -------------------------------------------------------
    pub websocket_connection_protocol_level_heartbeat_period_seconds: Option<u64>,
    pub websocket_connection_application_level_heartbeat_period_seconds: Option<u64>,
    pub websocket_connection_application_level_heartbeat_timeout_seconds: Option<u64>,
    pub websocket_connection_auto_reconnect: bool,
    /// Max symbols per subscribe frame.
    pub websocket_market_data_channel_symbols_limit: Option<usize>,
    pub websocket_market_data_channel_send_consecutive_request_delay_seconds: f64,

    /// Preferred channel for order operations when the trade endpoint is
    /// logged in; the REST path is used as fallback regardless.
    pub trade_api_method_preference: Option<ApiMethod>,

    /// Suffix length of the per-second client-order-id counter.
    pub client_order_id_sequence_number_padding_length: usize,

    /// Settle delay after start.
    pub start_wait_seconds: f64,
    /// Settle delay after stop.
    pub stop_wait_seconds: f64,

    /// Arbitrary user data carried by the session.
    pub extra_data: Option<Value>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            symbols: BTreeSet::new(),
            instrument_type: None,
            margin_asset: None,

            subscribe_bbo: false,
            subscribe_trade: false,
            subscribe_ohlcv: false,
            ohlcv_interval_seconds: 60,

            subscribe_order: false,
            subscribe_fill: false,
            subscribe_position: false,
            subscribe_balance: false,

            fetch_historical_trade_at_start: false,
            fetch_historical_trade_start_unix_timestamp_seconds: None,
            fetch_historical_trade_end_unix_timestamp_seconds: None,
            fetch_historical_ohlcv_at_start: false,
            fetch_historical_ohlcv_start_unix_timestamp_seconds: None,
            fetch_historical_ohlcv_end_unix_timestamp_seconds: None,
            fetch_historical_order_at_start: false,
            fetch_historical_order_start_unix_timestamp_seconds: None,
            fetch_historical_order_end_unix_timestamp_seconds: None,
            fetch_historical_fill_at_start: false,
            fetch_historical_fill_start_unix_timestamp_seconds: None,
            fetch_historical_fill_end_unix_timestamp_seconds: None,

            keep_historical_trade_seconds: Some(300),
            remove_historical_trade_interval_seconds: Some(60),
            keep_historical_ohlcv_seconds: Some(300),
            remove_historical_ohlcv_interval_seconds: Some(60),
            keep_historical_order_seconds: Some(300),
            remove_historical_order_interval_seconds: Some(60),
            keep_historical_fill_seconds: Some(300),
            remove_historical_fill_interval_seconds: Some(60),

            is_paper_trading: false,
            api_key: String::new(),
            api_secret: String::new(),
            api_passphrase: String::new(),

            rest_market_data_fetch_all_instrument_information_at_start: true,
            rest_market_data_fetch_all_instrument_information_period_seconds: Some(300),
            rest_market_data_fetch_bbo_period_seconds: Some(300),
            rest_account_fetch_open_order_at_start: true,
            rest_account_cancel_open_order_at_start: false,
            rest_account_check_open_order_period_seconds: Some(60),
            rest_account_check_open_order_threshold_seconds: Some(60),
            rest_account_check_in_flight_order_period_seconds: Some(10),
            rest_account_check_in_flight_order_threshold_seconds: Some(10),
            rest_account_fetch_position_period_seconds: Some(60),
            rest_account_fetch_balance_period_seconds: Some(60),
            rest_market_data_send_consecutive_request_delay_seconds: 0.05,
            rest_account_send_consecutive_request_delay_seconds: 0.05,

            websocket_connection_protocol_level_heartbeat_period_seconds: Some(10),
            websocket_connection_application_level_heartbeat_period_seconds: Some(10),
            websocket_connection_application_level_heartbeat_timeout_seconds: Some(20),
            websocket_connection_auto_reconnect: true,
            websocket_market_data_channel_symbols_limit: Some(50),
            websocket_market_data_channel_send_consecutive_request_delay_seconds: 0.05,

            trade_api_method_preference: Some(ApiMethod::Rest),

            client_order_id_sequence_number_padding_length: 3,

            start_wait_seconds: 1.0,
            stop_wait_seconds: 1.0,

            extra_data: None,
        }
    }
}

impl SessionConfig {
    /// A default config tracking the given symbols. Accepts a
    /// comma-separated string (`"BTC-USDT,ETH-USDT"`) or the wildcard `"*"`.
    pub fn for_symbols(symbols: &str) -> Self {
        Self {
            symbols: symbols
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
            ..Self::default()
        }
    }

    /// Whether the symbol set is the wildcard "all tradable".
    pub fn wants_all_tradable(&self) -> bool {
        self.symbols.contains(ALL_TRADABLE)
    }

    /// Whether any market-data stream is requested.
    pub fn subscribes_market_data(&self) -> bool {
        self.subscribe_bbo || self.subscribe_trade || self.subscribe_ohlcv
    }

    /// Whether any account stream is requested.
    pub fn subscribes_account(&self) -> bool {
        self.subscribe_order || self.subscribe_fill || self.subscribe_position || self.subscribe_balance
    }

    /// Check internal consistency. Called by `Session::new`; failures are
    /// fatal per the error-handling policy.
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(ExchangeError::Config("symbols must not be empty".into()));
        }
        if self.client_order_id_sequence_number_padding_length == 0 {
            return Err(ExchangeError::Config(
                "client_order_id_sequence_number_padding_length must be at least 1".into(),
            ));
        }
        if self.ohlcv_interval_seconds <= 0 {
            return Err(ExchangeError::Config(
                "ohlcv_interval_seconds must be positive".into(),
            ));
        }
        if self.websocket_market_data_channel_symbols_limit == Some(0) {
            return Err(ExchangeError::Config(
                "websocket_market_data_channel_symbols_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_symbols() {
        let config = SessionConfig::for_symbols("BTC-USDT, ETH-USDT ,");
        assert_eq!(config.symbols.len(), 2);
        assert!(config.symbols.contains("BTC-USDT"));
        assert!(config.symbols.contains("ETH-USDT"));
        assert!(!config.wants_all_tradable());
    }

    #[test]
    fn wildcard_is_recognized() {
        let config = SessionConfig::for_symbols("*");
        assert!(config.wants_all_tradable());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_symbols_and_zero_padding() {
        let empty = SessionConfig::default();
        assert!(empty.validate().is_err());

        let mut config = SessionConfig::for_symbols("BTC-USDT");
        config.client_order_id_sequence_number_padding_length = 0;
        assert!(config.validate().is_err());
    }
}
