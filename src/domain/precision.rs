//! Lossless number handling for JSON payloads.
//!
//! Node RPC responses carry amounts and counters that do not fit in an IEEE-754
//! double. `serde_json` is built with `arbitrary_precision`, so every parsed
//! [`Number`] keeps its source digits; the helpers here turn those digits into
//! [`BigInt`] / [`Decimal`] values and back without passing through `f64`.

use std::str::FromStr;

use num_bigint::BigInt;
use rust_decimal::Decimal;
use serde_json::{Number, Value};

use super::error::CodecError;

/// Largest integer a double represents exactly (2^53 - 1)
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

/// Smallest integer a double represents exactly
pub const MIN_SAFE_INTEGER: i64 = -MAX_SAFE_INTEGER;

/// Parse JSON text keeping the exact digits of every number
pub fn parse_lossless(text: &str) -> Result<Value, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::InvalidJson(e.to_string()))
}

/// Serialize a value, emitting numbers exactly as stored
pub fn to_lossless_string(value: &Value) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(|e| CodecError::InvalidJson(e.to_string()))
}

/// Integral part of a number literal, accepting a `.00`-style zero fraction.
fn integral_digits(raw: &str) -> Option<&str> {
    match raw.split_once('.') {
        None if !raw.contains(|c: char| c == 'e' || c == 'E') => Some(raw),
        Some((int_part, frac)) if !frac.is_empty() && frac.bytes().all(|b| b == b'0') => {
            Some(int_part)
        }
        _ => None,
    }
}

/// Whether the number is an integer outside the range a double holds exactly
pub fn is_unsafe_integer(n: &Number) -> bool {
    let raw = n.to_string();
    let Some(digits) = integral_digits(&raw) else {
        return false;
    };
    match BigInt::from_str(digits) {
        Ok(value) => value > BigInt::from(MAX_SAFE_INTEGER) || value < BigInt::from(MIN_SAFE_INTEGER),
        Err(_) => false,
    }
}

/// Convert an integral number beyond the safe range to a [`BigInt`].
///
/// Returns `Ok(None)` for numbers that are safe as plain doubles or that have a
/// non-zero fractional part; such values need no special handling.
pub fn number_to_bigint(n: &Number) -> Result<Option<BigInt>, CodecError> {
    if !is_unsafe_integer(n) {
        return Ok(None);
    }
    let raw = n.to_string();
    let digits = integral_digits(&raw).ok_or_else(|| CodecError::NotAnInteger(raw.clone()))?;
    BigInt::from_str(digits)
        .map(Some)
        .map_err(|_| CodecError::NotAnInteger(raw.clone()))
}

/// Parse any number literal into an exact integer
pub fn number_to_exact_integer(n: &Number) -> Result<BigInt, CodecError> {
    let raw = n.to_string();
    let digits = integral_digits(&raw).ok_or_else(|| CodecError::NotAnInteger(raw.clone()))?;
    BigInt::from_str(digits).map_err(|_| CodecError::NotAnInteger(raw.clone()))
}

/// Convert a number to an exact [`Decimal`], accepting scientific notation
pub fn number_to_decimal(n: &Number) -> Result<Decimal, CodecError> {
    let raw = n.to_string();
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| CodecError::OutOfRange(raw))
}

/// Emit a [`BigInt`] as a bare JSON number (no quoting, no rounding)
pub fn bigint_to_json(value: &BigInt) -> Result<Value, CodecError> {
    let number: Number = serde_json::from_str(&value.to_string())
        .map_err(|e| CodecError::InvalidJson(e.to_string()))?;
    Ok(Value::Number(number))
}

/// Emit a [`Decimal`] as a bare JSON number keeping its scale
pub fn decimal_to_json(value: &Decimal) -> Result<Value, CodecError> {
    let number: Number = serde_json::from_str(&value.to_string())
        .map_err(|e| CodecError::InvalidJson(e.to_string()))?;
    Ok(Value::Number(number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn number(raw: &str) -> Number {
        match parse_lossless(raw).unwrap() {
            Value::Number(n) => n,
            other => panic!("expected number, got {other:?}"),
        }
    }

    #[test]
    fn test_large_integer_survives_parse_and_serialize() {
        let text = r#"{"chainwork":123456789012345678901234567890,"height":12}"#;
        let value = parse_lossless(text).unwrap();
        assert_eq!(to_lossless_string(&value).unwrap(), text);
    }

    #[test]
    fn test_unsafe_integer_detection() {
        assert!(!is_unsafe_integer(&number("9007199254740991")));
        assert!(is_unsafe_integer(&number("9007199254740992")));
        assert!(is_unsafe_integer(&number("-9007199254740992")));
        assert!(!is_unsafe_integer(&number("9007199254740993.5")));
    }

    #[test]
    fn test_number_to_bigint_accepts_zero_fraction() {
        let big = number_to_bigint(&number("21000000000000000.00")).unwrap();
        assert_eq!(big, Some(BigInt::from(21_000_000_000_000_000_i64)));
    }

    #[test]
    fn test_number_to_bigint_ignores_safe_values() {
        assert_eq!(number_to_bigint(&number("42")).unwrap(), None);
        assert_eq!(number_to_bigint(&number("0.5")).unwrap(), None);
    }

    #[test]
    fn test_exact_integer_rejects_fractions() {
        assert_eq!(
            number_to_exact_integer(&number("1.5")),
            Err(CodecError::NotAnInteger("1.5".to_string()))
        );
        assert_eq!(number_to_exact_integer(&number("7")).unwrap(), BigInt::from(7));
    }

    #[test]
    fn test_number_to_decimal_is_exact() {
        assert_eq!(
            number_to_decimal(&number("92233720368.54775807")).unwrap(),
            dec!(92233720368.54775807)
        );
        assert_eq!(number_to_decimal(&number("1e-8")).unwrap(), dec!(0.00000001));
    }

    #[test]
    fn test_bigint_and_decimal_emit_bare_numbers() {
        let big = BigInt::from_str("340282366920938463463374607431768211456").unwrap();
        let json = bigint_to_json(&big).unwrap();
        assert_eq!(
            to_lossless_string(&json).unwrap(),
            "340282366920938463463374607431768211456"
        );

        let json = decimal_to_json(&dec!(1.10)).unwrap();
        assert_eq!(to_lossless_string(&json).unwrap(), "1.10");
    }

    #[test]
    fn test_invalid_json_is_reported() {
        assert!(matches!(parse_lossless("{"), Err(CodecError::InvalidJson(_))));
    }
}
