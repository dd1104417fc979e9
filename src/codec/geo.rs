/*!
Codecs for `geo:lat:<N>` and `geo:lon:<N>` attribute types.

Each value is normalised into `[0, 2*max]` (where `max` is 90 for latitude,
180 for longitude) so it can be encoded as an unsigned fixed-point base62
number without a sign marker, then scaled back on decode.
*/

use crate::codec::base62;
use crate::error::{Error, Result};

const LAT_MAX: f64 = 90.0;
const LON_MAX: f64 = 180.0;

fn encode_bounded(value: f64, max: f64, precision: u32) -> Result<String> {
    if !(-max..=max).contains(&value) {
        return Err(Error::internal(format!(
            "value {value} out of range [-{max}, {max}]"
        )));
    }
    let factor = 10i64
        .checked_pow(precision)
        .ok_or_else(|| Error::internal("geo precision too large"))? as f64;
    let normalised = (value + max) * factor;
    Ok(base62::encode_u64(normalised.round() as u64))
}

fn decode_bounded(value: &str, max: f64, precision: u32) -> Result<f64> {
    let factor = 10i64
        .checked_pow(precision)
        .ok_or_else(|| Error::internal("geo precision too large"))? as f64;
    let normalised = base62::decode_u64(value)? as f64;
    Ok(normalised / factor - max)
}

/// `geo:lat:<N>`.
pub fn encode_lat(value: f64, precision: u32) -> Result<String> {
    encode_bounded(value, LAT_MAX, precision)
}

/// Inverse of [`encode_lat`].
pub fn decode_lat(value: &str, precision: u32) -> Result<f64> {
    decode_bounded(value, LAT_MAX, precision)
}

/// `geo:lon:<N>`.
pub fn encode_lon(value: f64, precision: u32) -> Result<String> {
    encode_bounded(value, LON_MAX, precision)
}

/// Inverse of [`encode_lon`].
pub fn decode_lon(value: &str, precision: u32) -> Result<f64> {
    decode_bounded(value, LON_MAX, precision)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_lat_and_lon_within_precision() {
        let lat = 51.5074;
        let encoded = encode_lat(lat, 4).unwrap();
        assert!((decode_lat(&encoded, 4).unwrap() - lat).abs() < 1e-3);

        let lon = -0.1278;
        let encoded = encode_lon(lon, 4).unwrap();
        assert!((decode_lon(&encoded, 4).unwrap() - lon).abs() < 1e-3);
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(encode_lat(91.0, 4).is_err());
        assert!(encode_lon(-181.0, 4).is_err());
    }
}
