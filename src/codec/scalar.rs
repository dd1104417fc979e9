/*!
Codecs for the scalar leaf types: `string`, `number`, `timestamp`, `uuid`.
*/

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::codec::base62;
use crate::error::{Error, Result};

/// `string`: pass-through, subject to a per-field length limit checked by
/// the validator (not here — the codec is total on any string).
pub fn encode_string(value: &str) -> String {
    value.to_string()
}

/// Inverse of [`encode_string`].
pub fn decode_string(value: &str) -> String {
    value.to_string()
}

/// `number`: integers encode as signed base62; floats encode as
/// fixed-point base62 at the field's declared precision. Precision is
/// never inferred at write time (spec.md §4.2).
pub fn encode_number_int(value: i64) -> String {
    base62::encode_i64(value)
}

/// Inverse of [`encode_number_int`].
pub fn decode_number_int(value: &str) -> Result<i64> {
    base62::decode_i64(value)
}

/// Encode a float at `precision` decimal digits of fixed-point scale.
pub fn encode_number_float(value: f64, precision: u32) -> Result<String> {
    let scale = 10i64.pow(precision);
    let scaled = (value * scale as f64).round();
    if !scaled.is_finite() || scaled.abs() > i64::MAX as f64 {
        return Err(Error::internal("number out of representable range"));
    }
    Ok(base62::encode_i64(scaled as i64))
}

/// Inverse of [`encode_number_float`].
pub fn decode_number_float(value: &str, precision: u32) -> Result<f64> {
    let scale = 10i64.pow(precision) as f64;
    let scaled = base62::decode_i64(value)?;
    Ok(scaled as f64 / scale)
}

/// `timestamp`: Unix-milliseconds integer, signed base62. ISO-8601 strings
/// are accepted as an alternate encode input (see [`parse_timestamp_input`]).
pub fn encode_timestamp_millis(millis: i64) -> String {
    base62::encode_i64(millis)
}

/// Inverse of [`encode_timestamp_millis`].
pub fn decode_timestamp_millis(value: &str) -> Result<i64> {
    base62::decode_i64(value)
}

/// Accepts either a Unix-millisecond integer or an ISO-8601 string and
/// normalises to Unix milliseconds, per spec.md §4.2 ("ISO strings accepted
/// on encode").
pub fn parse_timestamp_input(input: &str) -> Result<i64> {
    if let Ok(millis) = input.parse::<i64>() {
        return Ok(millis);
    }
    DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
        .map_err(|err| Error::internal(format!("invalid timestamp `{input}`: {err}")))
}

/// `uuid`: 16 raw bytes, base64-encoded.
pub fn encode_uuid(value: &Uuid) -> String {
    STANDARD.encode(value.as_bytes())
}

/// Inverse of [`encode_uuid`].
pub fn decode_uuid(value: &str) -> Result<Uuid> {
    let bytes = STANDARD
        .decode(value)
        .map_err(|err| Error::internal(format!("invalid uuid base64: {err}")))?;
    Uuid::from_slice(&bytes).map_err(|err| Error::internal(format!("invalid uuid bytes: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_int() {
        for n in [0i64, -1, 42, -42, i64::MAX / 2] {
            assert_eq!(decode_number_int(&encode_number_int(n)).unwrap(), n);
        }
    }

    #[test]
    fn round_trips_float_within_precision() {
        let value = 3.14159;
        let encoded = encode_number_float(value, 4).unwrap();
        let decoded = decode_number_float(&encoded, 4).unwrap();
        assert!((decoded - value).abs() < 1e-4);
    }

    #[test]
    fn round_trips_uuid() {
        let id = Uuid::new_v4();
        let encoded = encode_uuid(&id);
        assert_eq!(encoded.len(), 24);
        assert_eq!(decode_uuid(&encoded).unwrap(), id);
    }

    #[test]
    fn parses_iso_and_millis_timestamps() {
        let millis = parse_timestamp_input("1700000000000").unwrap();
        assert_eq!(millis, 1_700_000_000_000);
        let from_iso = parse_timestamp_input("2023-11-14T22:13:20Z").unwrap();
        assert_eq!(from_iso, 1_700_000_000_000);
    }
}
