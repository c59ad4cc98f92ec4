//! Decimal rounding and string normalization for wire numerics.
//!
//! Prices and sizes travel as canonical decimal strings. The rounding
//! primitives divide as `f64` to pick the multiple, then multiply back by the
//! increment as a [`Decimal`], so the result is always an exact decimal
//! multiple of the increment.

use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::{ExchangeError, Result};

/// Parse a wire decimal string into a [`Decimal`].
pub fn parse_decimal(input: &str) -> Result<Decimal> {
    Decimal::from_str(input)
        .map_err(|e| ExchangeError::InvalidArgument(format!("bad decimal {input:?}: {e}")))
}

/// Round `input` to the nearest multiple of `increment`, half away from zero.
pub fn round_to_nearest(input: f64, increment: &Decimal) -> Decimal {
    *increment * Decimal::from(divide_selector(input, increment).round() as i64)
}

/// Round `input` up to a multiple of `increment`.
pub fn round_up(input: f64, increment: &Decimal) -> Decimal {
    *increment * Decimal::from(divide_selector(input, increment).ceil() as i64)
}

/// Round `input` down to a multiple of `increment`.
pub fn round_down(input: f64, increment: &Decimal) -> Decimal {
    *increment * Decimal::from(divide_selector(input, increment).floor() as i64)
}

/// Selector quotient, computed in floating point. The quotient only picks
/// which multiple to return; the multiplication back is exact decimal.
fn divide_selector(input: f64, increment: &Decimal) -> f64 {
    input / increment_as_f64(increment)
}

fn increment_as_f64(increment: &Decimal) -> f64 {
    increment.to_f64().unwrap_or(f64::NAN)
}

/// Trim trailing zeros after a decimal point, and the point itself when the
/// fraction vanishes: `"1.2300"` → `"1.23"`, `"5.000"` → `"5"`, `"100"`
/// stays `"100"`. Idempotent.
pub fn normalize_decimal_string(input: &str) -> String {
    if input.contains('.') && input.ends_with('0') {
        let trimmed = input.trim_end_matches('0').trim_end_matches('.');
        trimmed.to_owned()
    } else {
        input.to_owned()
    }
}

/// Render a [`Decimal`] as a plain (non-scientific) string, optionally
/// normalized.
pub fn decimal_to_string(input: &Decimal, normalize: bool) -> String {
    let s = input.to_string();
    if normalize { normalize_decimal_string(&s) } else { s }
}

/// Drop a single leading `-`, if present. Venues report fees and position
/// quantities signed where the model carries sign as a separate flag.
pub fn strip_leading_sign(input: &str) -> &str {
    input.strip_prefix('-').unwrap_or(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        parse_decimal(s).unwrap()
    }

    #[test]
    fn rounds_to_nearest_half_away_from_zero() {
        assert_eq!(round_to_nearest(0.25, &dec("0.1")), dec("0.3"));
        assert_eq!(round_to_nearest(0.24, &dec("0.1")), dec("0.2"));
        assert_eq!(round_to_nearest(-0.25, &dec("0.1")), dec("-0.3"));
        assert_eq!(round_to_nearest(50_012.0, &dec("25")), dec("50000"));
    }

    #[test]
    fn rounds_up_and_down_to_exact_multiples() {
        assert_eq!(round_up(0.21, &dec("0.1")), dec("0.3"));
        assert_eq!(round_down(0.29, &dec("0.1")), dec("0.2"));
        // A value that is already a multiple stays put (0.25 divides
        // exactly in binary, so the selector quotient is a whole number).
        assert_eq!(round_up(0.75, &dec("0.25")), dec("0.75"));
        assert_eq!(round_down(0.75, &dec("0.25")), dec("0.75"));
    }

    #[test]
    fn results_are_exact_decimal_multiples() {
        let inc = dec("0.001");
        let rounded = round_down(0.123456, &inc);
        assert_eq!(rounded, dec("0.123"));
        // No binary-float dust: quotient is a whole number.
        assert_eq!(rounded / inc, dec("123"));
    }

    #[test]
    fn round_down_is_idempotent() {
        let inc = dec("0.25");
        let once = round_down(1.234, &inc);
        assert_eq!(once, dec("1.00"));
        let twice = round_down(once.to_string().parse::<f64>().unwrap(), &inc);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalizes_decimal_strings() {
        assert_eq!(normalize_decimal_string("1.2300"), "1.23");
        assert_eq!(normalize_decimal_string("5.000"), "5");
        assert_eq!(normalize_decimal_string("100"), "100");
        assert_eq!(normalize_decimal_string("0.0001"), "0.0001");
    }

    #[test]
    fn normalize_is_idempotent() {
        for s in ["1.2300", "5.000", "100", "0.010"] {
            let once = normalize_decimal_string(s);
            assert_eq!(normalize_decimal_string(&once), once);
        }
    }

    #[test]
    fn strips_leading_sign_only() {
        assert_eq!(strip_leading_sign("-0.5"), "0.5");
        assert_eq!(strip_leading_sign("0.5"), "0.5");
    }
}
