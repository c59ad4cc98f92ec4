//! Nanosecond-resolution time points.
//!
//! Venue timestamps arrive as milliseconds-since-epoch; local timestamps are
//! taken at nanosecond resolution. Both are carried as a `(seconds, nanos)`
//! pair with lexicographic ordering so cross-source comparisons never lose
//! precision to floating point.

use std::ops::Sub;

use chrono::{DateTime, Utc};

const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// A point in time as whole seconds since the Unix epoch plus a nanosecond
/// remainder in `0..1_000_000_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct TimePoint {
    /// Whole seconds since the Unix epoch.
    pub secs: i64,
    /// Nanosecond remainder.
    pub nanos: u32,
}

impl TimePoint {
    /// Construct from a seconds/nanos pair.
    pub const fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            secs: now.timestamp(),
            nanos: now.timestamp_subsec_nanos() % NANOS_PER_SECOND,
        }
    }

    /// Construct from milliseconds since the Unix epoch (the resolution most
    /// venues use on the wire).
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self {
            secs: millis.div_euclid(1_000),
            nanos: (millis.rem_euclid(1_000) * 1_000_000) as u32,
        }
    }

    /// Construct from whole seconds since the Unix epoch.
    pub const fn from_unix_secs(secs: i64) -> Self {
        Self { secs, nanos: 0 }
    }

    /// Milliseconds since the Unix epoch, truncating sub-millisecond detail.
    pub const fn as_unix_millis(&self) -> i64 {
        self.secs * 1_000 + (self.nanos / 1_000_000) as i64
    }

    /// Seconds since the Unix epoch as a float (lossy; display/arithmetic only).
    pub fn as_unix_secs_f64(&self) -> f64 {
        self.secs as f64 + self.nanos as f64 / NANOS_PER_SECOND as f64
    }

    /// Elapsed seconds between `self` and an earlier point.
    pub fn seconds_since(&self, earlier: TimePoint) -> f64 {
        let (secs, nanos) = *self - earlier;
        secs as f64 + nanos as f64 / NANOS_PER_SECOND as f64
    }

    /// ISO-8601 UTC timestamp with millisecond precision, e.g.
    /// `2020-12-08T09:08:57.715Z`. Several venues sign over this exact shape.
    pub fn to_iso8601_millis(&self) -> String {
        let dt = DateTime::<Utc>::from_timestamp(self.secs, self.nanos)
            .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).expect("epoch is valid"));
        dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
    }
}

impl Sub for TimePoint {
    type Output = (i64, i32);

    /// Signed `(seconds, nanos)` delta. The nanos component may be negative;
    /// callers normalize through [`TimePoint::seconds_since`].
    fn sub(self, rhs: Self) -> Self::Output {
        (self.secs - rhs.secs, self.nanos as i32 - rhs.nanos as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_lexicographically() {
        let a = TimePoint::new(10, 999_999_999);
        let b = TimePoint::new(11, 0);
        let c = TimePoint::new(11, 1);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(b, TimePoint::new(11, 0));
    }

    #[test]
    fn converts_unix_millis_both_ways() {
        let tp = TimePoint::from_unix_millis(1_700_000_000_123);
        assert_eq!(tp.secs, 1_700_000_000);
        assert_eq!(tp.nanos, 123_000_000);
        assert_eq!(tp.as_unix_millis(), 1_700_000_000_123);
    }

    #[test]
    fn seconds_since_handles_nanos_borrow() {
        let earlier = TimePoint::new(100, 900_000_000);
        let later = TimePoint::new(101, 100_000_000);
        let elapsed = later.seconds_since(earlier);
        assert!((elapsed - 0.2).abs() < 1e-9);
    }

    #[test]
    fn formats_iso8601_with_millis() {
        let tp = TimePoint::from_unix_millis(1_607_418_537_715);
        assert_eq!(tp.to_iso8601_millis(), "2020-12-08T09:08:57.715Z");
    }
}
