//! Symbol-keyed state cache for market and account data.
//!
//! Two asynchronous sources feed the cache: stream pushes (live, appended at
//! the tail) and periodic or paginated REST pulls (historical, prepended at
//! the head). The mapping contracts:
//!
//! - **BBO / Position / Balance** — last-write-wins by venue timestamp; a nil
//!   timestamp always applies. Zero-quantity positions and balances are
//!   absent from their maps.
//! - **Trade / Fill** — per symbol, sorted ascending by
//!   `(timestamp, monotone-id-or-zero)`. Historical prepend adds only items
//!   strictly earlier than the current head; live append adds only items
//!   strictly later than the current tail. Duplicates drop out naturally.
//! - **Ohlcv** — same, keyed by bucket start, with one special case: an
//!   incoming candle whose bucket equals the stored tail's replaces the tail
//!   (bucket-in-progress update).
//! - **Retention** — sweeps keep only items within the retention window
//!   measured from the latest stored timestamp.

use std::collections::HashMap;

use crate::time::TimePoint;
use crate::types::account::{Balance, Fill, Position};
use crate::types::market::{Bbo, Instrument, Ohlcv, Trade};

/// Sort key for trades and fills.
type SeqKey = (Option<TimePoint>, i64);

fn trade_key(trade: &Trade) -> SeqKey {
    (trade.exchange_update_time_point, trade.trade_id_as_i64())
}

fn fill_key(fill: &Fill) -> SeqKey {
    (fill.exchange_update_time_point, fill.trade_id_as_i64())
}

/// Append items strictly later than the current tail, preserving order.
fn append_after_tail<T, K: Ord>(list: &mut Vec<T>, incoming: Vec<T>, key: impl Fn(&T) -> K) {
    if list.is_empty() {
        list.extend(incoming);
        return;
    }
    let tail_key = key(&list[list.len() - 1]);
    list.extend(incoming.into_iter().filter(|x| key(x) > tail_key));
}

/// Prepend items strictly earlier than the current head, preserving order.
fn prepend_before_head<T, K: Ord>(list: &mut Vec<T>, incoming: Vec<T>, key: impl Fn(&T) -> K) {
    if list.is_empty() {
        *list = incoming;
        return;
    }
    let head_key = key(&list[0]);
    let earlier: Vec<T> = incoming.into_iter().filter(|x| key(x) < head_key).collect();
    if !earlier.is_empty() {
        list.splice(0..0, earlier);
    }
}

/// Keep items within `[start, end)` seconds, when bounds are set.
fn within_window(secs: Option<i64>, start: Option<i64>, end: Option<i64>) -> bool {
    let Some(secs) = secs else { return true };
    start.is_none_or(|s| secs >= s) && end.is_none_or(|e| secs < e)
}

/// The session's view of the venue, owned by the session actor. All
/// mutation happens between suspension points; observers receive clones.
#[derive(Debug, Default)]
pub struct StateCache {
    /// Instrument descriptions, refreshed wholesale, never deleted.
    pub instruments: HashMap<String, Instrument>,
    /// Latest top-of-book per symbol.
    pub bbos: HashMap<String, Bbo>,
    /// Public trades per symbol, sorted earliest to latest.
    pub trades: HashMap<String, Vec<Trade>>,
    /// Candles per symbol, sorted earliest to latest.
    pub ohlcvs: HashMap<String, Vec<Ohlcv>>,
    /// Own fills per symbol, sorted earliest to latest.
    pub fills: HashMap<String, Vec<Fill>>,
    /// Open positions per symbol; zero-quantity entries are absent.
    pub positions: HashMap<String, Position>,
    /// Balances per asset; zero-quantity entries are absent.
    pub balances: HashMap<String, Balance>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    // -- instruments -----------------------------------------------------

    /// Replace instrument entries from a refresh.
    pub fn upsert_instruments(&mut self, instruments: Vec<Instrument>) {
        for instrument in instruments {
            self.instruments.insert(instrument.symbol.clone(), instrument);
        }
    }

    // -- bbo ---------------------------------------------------------------

    /// Last-write-wins by venue timestamp; a nil timestamp (either side)
    /// always applies.
    pub fn update_bbo(&mut self, bbo: Bbo) {
        let apply = match self.bbos.get(&bbo.symbol) {
            None => true,
            Some(existing) => match (existing.exchange_update_time_point, bbo.exchange_update_time_point) {
                (None, _) | (_, None) => true,
                (Some(old), Some(new)) => old < new,
            },
        };
        if apply {
            self.bbos.insert(bbo.symbol.clone(), bbo);
        }
    }

    // -- trades ------------------------------------------------------------

    /// Live stream append: only trades strictly later than the tail.
    pub fn append_live_trades(&mut self, mut trades: Vec<Trade>) {
        let Some(symbol) = trades.first().map(|t| t.symbol.clone()) else {
            return;
        };
        trades.sort_by_key(trade_key);
        append_after_tail(self.trades.entry(symbol).or_default(), trades, trade_key);
    }

    /// Historical prepend: filter to the backfill window, then add only
    /// trades strictly earlier than the head.
    pub fn prepend_historical_trades(
        &mut self,
        trades: Vec<Trade>,
        window_start_secs: Option<i64>,
        window_end_secs: Option<i64>,
    ) {
        let Some(symbol) = trades.first().map(|t| t.symbol.clone()) else {
            return;
        };
        let mut filtered: Vec<Trade> = trades
            .into_iter()
            .filter(|t| {
                within_window(
                    t.exchange_update_time_point.map(|tp| tp.secs),
                    window_start_secs,
                    window_end_secs,
                )
            })
            .collect();
        filtered.sort_by_key(trade_key);
        prepend_before_head(self.trades.entry(symbol).or_default(), filtered, trade_key);
    }

    // -- ohlcvs ------------------------------------------------------------

    /// Live stream append with bucket replacement: a candle whose bucket
    /// start equals the stored tail's replaces the tail in place.
    pub fn append_live_ohlcvs(&mut self, mut ohlcvs: Vec<Ohlcv>) {
        let Some(symbol) = ohlcvs.first().map(|o| o.symbol.clone()) else {
            return;
        };
        ohlcvs.sort_by_key(|o| o.start_unix_timestamp_seconds);
        let list = self.ohlcvs.entry(symbol).or_default();
        if list.is_empty() {
            *list = ohlcvs;
            return;
        }
        let tail_bucket = list[list.len() - 1].start_unix_timestamp_seconds;
        if ohlcvs[0].start_unix_timestamp_seconds == tail_bucket {
            let last = list.len() - 1;
            list[last] = ohlcvs[0].clone();
        }
        list.extend(
            ohlcvs
                .into_iter()
                .filter(|o| o.start_unix_timestamp_seconds > tail_bucket),
        );
    }

    /// Historical prepend, filtered to the backfill window.
    pub fn prepend_historical_ohlcvs(
        &mut self,
        ohlcvs: Vec<Ohlcv>,
        window_start_secs: Option<i64>,
        window_end_secs: Option<i64>,
    ) {
        let Some(symbol) = ohlcvs.first().map(|o| o.symbol.clone()) else {
            return;
        };
        let mut filtered: Vec<Ohlcv> = ohlcvs
            .into_iter()
            .filter(|o| within_window(o.start_unix_timestamp_seconds, window_start_secs, window_end_secs))
            .collect();
        filtered.sort_by_key(|o| o.start_unix_timestamp_seconds);
        prepend_before_head(self.ohlcvs.entry(symbol).or_default(), filtered, |o| {
            o.start_unix_timestamp_seconds
        });
    }

    // -- fills ---------------------------------------------------------------

    /// Live stream append: only fills strictly later than the tail.
    pub fn append_live_fills(&mut self, mut fills: Vec<Fill>) {
        let Some(symbol) = fills.first().map(|f| f.symbol.clone()) else {
            return;
        };
        fills.sort_by_key(fill_key);
        append_after_tail(self.fills.entry(symbol).or_default(), fills, fill_key);
    }

    /// Historical prepend, filtered to the backfill window.
    pub fn prepend_historical_fills(
        &mut self,
        fills: Vec<Fill>,
        window_start_secs: Option<i64>,
        window_end_secs: Option<i64>,
    ) {
        let Some(symbol) = fills.first().map(|f| f.symbol.clone()) else {
            return;
        };
        let mut filtered: Vec<Fill> = fills
            .into_iter()
            .filter(|f| {
                within_window(
                    f.exchange_update_time_point.map(|tp| tp.secs),
                    window_start_secs,
                    window_end_secs,
                )
            })
            .collect();
        filtered.sort_by_key(fill_key);
        prepend_before_head(self.fills.entry(symbol).or_default(), filtered, fill_key);
    }

    // -- positions -----------------------------------------------------------

    /// Last-write-wins by venue timestamp; zero quantity removes the entry.
    pub fn update_position(&mut self, position: Position) {
        let apply = match self.positions.get(&position.symbol) {
            None => true,
            Some(existing) => match (existing.exchange_update_time_point, position.exchange_update_time_point) {
                (None, _) | (_, None) => true,
                (Some(old), Some(new)) => old < new,
            },
        };
        if apply {
            if position.quantity_as_decimal().is_none_or(|q| q.is_zero()) {
                self.positions.remove(&position.symbol);
            } else {
                self.positions.insert(position.symbol.clone(), position);
            }
        }
    }

    /// Reconcile against a full REST snapshot: apply non-zero entries, then
    /// drop symbols absent from the snapshot.
    pub fn reconcile_positions(&mut self, positions: Vec<Position>) {
        let non_zero: Vec<Position> = positions
            .into_iter()
            .filter(|p| p.quantity_as_decimal().is_some_and(|q| !q.is_zero()))
            .collect();
        let keep: std::collections::HashSet<String> =
            non_zero.iter().map(|p| p.symbol.clone()).collect();
        for position in non_zero {
            self.update_position(position);
        }
        self.positions.retain(|symbol, _| keep.contains(symbol));
    }

    // -- balances ------------------------------------------------------------

    /// Last-write-wins by venue timestamp; zero quantity removes the entry.
    pub fn update_balance(&mut self, balance: Balance) {
        let apply = match self.balances.get(&balance.asset) {
            None => true,
            Some(existing) => match (existing.exchange_update_time_point, balance.exchange_update_time_point) {
                (None, _) | (_, None) => true,
                (Some(old), Some(new)) => old < new,
            },
        };
        if apply {
            if balance.quantity_as_decimal().is_none_or(|q| q.is_zero()) {
                self.balances.remove(&balance.asset);
            } else {
                self.balances.insert(balance.asset.clone(), balance);
            }
        }
    }

    /// Reconcile against a full REST snapshot, as for positions.
    pub fn reconcile_balances(&mut self, balances: Vec<Balance>) {
        let non_zero: Vec<Balance> = balances
            .into_iter()
            .filter(|b| b.quantity_as_decimal().is_some_and(|q| !q.is_zero()))
            .collect();
        let keep: std::collections::HashSet<String> =
            non_zero.iter().map(|b| b.asset.clone()).collect();
        for balance in non_zero {
            self.update_balance(balance);
        }
        self.balances.retain(|asset, _| keep.contains(asset));
    }

    // -- retention -------------------------------------------------------------

    /// Drop trades older than `keep_seconds` before the latest stored trade.
    pub fn trim_trades(&mut self, keep_seconds: i64) {
        for list in self.trades.values_mut() {
            trim_by_secs(list, keep_seconds, |t: &Trade| {
                t.exchange_update_time_point.map(|tp| tp.secs)
            });
        }
    }

    /// Drop candles older than `keep_seconds` before the latest bucket.
    pub fn trim_ohlcvs(&mut self, keep_seconds: i64) {
        for list in self.ohlcvs.values_mut() {
            trim_by_secs(list, keep_seconds, |o: &Ohlcv| o.start_unix_timestamp_seconds);
        }
    }

    /// Drop fills older than `keep_seconds` before the latest stored fill.
    pub fn trim_fills(&mut self, keep_seconds: i64) {
        for list in self.fills.values_mut() {
            trim_by_secs(list, keep_seconds, |f: &Fill| {
                f.exchange_update_time_point.map(|tp| tp.secs)
            });
        }
    }
}

/// Retain only items whose timestamp is within `keep_seconds` of the tail's.
fn trim_by_secs<T>(list: &mut Vec<T>, keep_seconds: i64, secs: impl Fn(&T) -> Option<i64>) {
    let Some(latest) = list.last().and_then(&secs) else {
        return;
    };
    let earliest_to_keep = latest - keep_seconds;
    if list.first().and_then(&secs).is_some_and(|s| s < earliest_to_keep) {
        list.retain(|x| secs(x).is_none_or(|s| s >= earliest_to_keep));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::enums::ApiMethod;

    fn trade(id: i64, secs: i64) -> Trade {
        Trade {
            api_method: Some(ApiMethod::Websocket),
            symbol: "BTC-USDT".into(),
            exchange_update_time_point: Some(TimePoint::new(secs, 0)),
            trade_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    fn candle(bucket: i64, close: &str) -> Ohlcv {
        Ohlcv {
            symbol: "BTC-USDT".into(),
            start_unix_timestamp_seconds: Some(bucket),
            close_price: Some(close.into()),
            ..Default::default()
        }
    }

    fn bbo_at(secs: Option<i64>, bid: &str) -> Bbo {
        Bbo {
            symbol: "BTC-USDT".into(),
            exchange_update_time_point: secs.map(TimePoint::from_unix_secs),
            best_bid_price: Some(bid.into()),
            ..Default::default()
        }
    }

    fn ids(cache: &StateCache) -> Vec<i64> {
        cache.trades["BTC-USDT"]
            .iter()
            .map(Trade::trade_id_as_i64)
            .collect()
    }

    #[test]
    fn historical_prepend_is_gap_safe() {
        let mut cache = StateCache::new();
        cache.append_live_trades(vec![trade(50, 1050), trade(51, 1051), trade(52, 1052)]);

        // Page overlaps the live head; only strictly-earlier items land.
        cache.prepend_historical_trades(
            (30..=60).map(|i| trade(i, 1000 + i)).collect(),
            None,
            None,
        );

        let expected: Vec<i64> = (30..=52).collect();
        assert_eq!(ids(&cache), expected);
    }

    #[test]
    fn live_append_drops_stale_and_duplicate_trades() {
        let mut cache = StateCache::new();
        cache.append_live_trades(vec![trade(10, 1010)]);
        cache.append_live_trades(vec![trade(9, 1009), trade(10, 1010), trade(11, 1011)]);
        assert_eq!(ids(&cache), vec![10, 11]);
    }

    #[test]
    fn historical_prepend_respects_window_bounds() {
        let mut cache = StateCache::new();
        cache.prepend_historical_trades(
            vec![trade(1, 100), trade(2, 200), trade(3, 300)],
            Some(150),
            Some(300),
        );
        assert_eq!(ids(&cache), vec![2]);
    }

    #[test]
    fn replaces_tail_bucket_in_progress() {
        let mut cache = StateCache::new();
        cache.append_live_ohlcvs(vec![candle(60, "100"), candle(120, "101")]);
        // Same bucket as the tail: replaced, not appended.
        cache.append_live_ohlcvs(vec![candle(120, "105")]);
        let list = &cache.ohlcvs["BTC-USDT"];
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].close_price.as_deref(), Some("105"));
        // A newer bucket appends.
        cache.append_live_ohlcvs(vec![candle(180, "110")]);
        assert_eq!(cache.ohlcvs["BTC-USDT"].len(), 3);
        // An older bucket on the live path is ignored.
        cache.append_live_ohlcvs(vec![candle(60, "999")]);
        assert_eq!(cache.ohlcvs["BTC-USDT"].len(), 3);
        assert_eq!(cache.ohlcvs["BTC-USDT"][0].close_price.as_deref(), Some("100"));
    }

    #[test]
    fn bbo_is_last_write_wins_by_timestamp() {
        let mut cache = StateCache::new();
        cache.update_bbo(bbo_at(Some(100), "50000"));
        // Older quote never replaces a newer one.
        cache.update_bbo(bbo_at(Some(90), "49000"));
        assert_eq!(cache.bbos["BTC-USDT"].best_bid_price.as_deref(), Some("50000"));
        // Newer quote replaces.
        cache.update_bbo(bbo_at(Some(110), "50100"));
        assert_eq!(cache.bbos["BTC-USDT"].best_bid_price.as_deref(), Some("50100"));
        // Nil timestamp always applies.
        cache.update_bbo(bbo_at(None, "50200"));
        assert_eq!(cache.bbos["BTC-USDT"].best_bid_price.as_deref(), Some("50200"));
    }

    #[test]
    fn zero_quantity_position_is_removed() {
        let mut cache = StateCache::new();
        let mut position = Position {
            symbol: "BTC-USDT-SWAP".into(),
            quantity: Some("2".into()),
            exchange_update_time_point: Some(TimePoint::from_unix_secs(100)),
            ..Default::default()
        };
        cache.update_position(position.clone());
        assert!(cache.positions.contains_key("BTC-USDT-SWAP"));

        position.quantity = Some("0".into());
        position.exchange_update_time_point = Some(TimePoint::from_unix_secs(101));
        cache.update_position(position);
        assert!(!cache.positions.contains_key("BTC-USDT-SWAP"));
    }

    #[test]
    fn balance_snapshot_reconciles_departed_assets() {
        let mut cache = StateCache::new();
        let usdt = Balance {
            asset: "USDT".into(),
            quantity: Some("1000".into()),
            ..Default::default()
        };
        let btc = Balance {
            asset: "BTC".into(),
            quantity: Some("0.5".into()),
            ..Default::default()
        };
        cache.reconcile_balances(vec![usdt.clone(), btc]);
        assert_eq!(cache.balances.len(), 2);

        // Next snapshot no longer lists BTC.
        cache.reconcile_balances(vec![usdt]);
        assert!(cache.balances.contains_key("USDT"));
        assert!(!cache.balances.contains_key("BTC"));
    }

    #[test]
    fn retention_trims_relative_to_latest() {
        let mut cache = StateCache::new();
        cache.append_live_trades(vec![trade(1, 100), trade(2, 200), trade(3, 400)]);
        cache.trim_trades(150);
        // Cutoff is 400 - 150 = 250: trades at 100 and 200 age out.
        assert_eq!(ids(&cache), vec![3]);
    }
}
