/*!
Codecs for `money:<CCY>` and `decimal:<N>` attribute types.

Both store an integer count of the smallest representable unit (cents for
money, `10^-scale` units for decimal) as signed base62, so there is zero
precision loss in either direction. The currency code itself lives in the
per-field descriptor, not in the encoded value (spec.md §4.2).
*/

use crate::codec::base62;
use crate::error::{Error, Result};

/// `money:<CCY>`: integer smallest-unit amount (e.g. cents) to base62.
pub fn encode_money(smallest_units: i64) -> String {
    base62::encode_i64(smallest_units)
}

/// Inverse of [`encode_money`].
pub fn decode_money(value: &str) -> Result<i64> {
    base62::decode_i64(value)
}

/// `decimal:<N>`: `round(value * 10^N)` to base62.
pub fn encode_decimal(value: f64, scale: u32) -> Result<String> {
    let factor = 10i64
        .checked_pow(scale)
        .ok_or_else(|| Error::internal("decimal scale too large"))?;
    let scaled = (value * factor as f64).round();
    if !scaled.is_finite() || scaled.abs() > i64::MAX as f64 {
        return Err(Error::internal("decimal value out of representable range"));
    }
    Ok(base62::encode_i64(scaled as i64))
}

/// Inverse of [`encode_decimal`]. Lossy at `scale` decimal digits by
/// construction — this is the one intentionally lossy codec spec.md §8
/// law 1 exempts from exact round-trip.
pub fn decode_decimal(value: &str, scale: u32) -> Result<f64> {
    let factor = 10i64
        .checked_pow(scale)
        .ok_or_else(|| Error::internal("decimal scale too large"))? as f64;
    let scaled = base62::decode_i64(value)?;
    Ok(scaled as f64 / factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_has_zero_precision_loss() {
        let cents = 12_345_678i64;
        let encoded = encode_money(cents);
        assert_eq!(decode_money(&encoded).unwrap(), cents);
    }

    #[test]
    fn decimal_round_trips_within_scale() {
        let value = 19.99;
        let encoded = encode_decimal(value, 2).unwrap();
        let decoded = decode_decimal(&encoded, 2).unwrap();
        assert!((decoded - value).abs() < 1e-9);
    }
}
