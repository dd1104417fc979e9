/*!
Codec for `embedding:<D>` attribute type: a fixed-dimension vector of floats,
quantised to fixed-point and batched into one base62-encoded string.

Each component is assumed to lie in `[-1.0, 1.0]` (the normalised range
embedding models typically emit); components are offset into `[0, 2.0]`
then scaled by `10^PRECISION` before being encoded at a fixed character
width so the batch can be split back into its `D` components on decode.
*/

use crate::codec::base62;
use crate::error::{Error, Result};

const PRECISION: u32 = 6;
const COMPONENT_WIDTH: usize = 6;

fn component_range() -> u64 {
    (2.0 * 10f64.powi(PRECISION as i32)).round() as u64
}

/// Encode a `D`-dimensional embedding. Fails if `value.len() != dimension`.
pub fn encode_embedding(value: &[f32], dimension: usize) -> Result<String> {
    if value.len() != dimension {
        return Err(Error::internal(format!(
            "embedding has {} components, expected {dimension}",
            value.len()
        )));
    }
    let scale = 10f64.powi(PRECISION as i32);
    let range = component_range();
    let mut out = String::with_capacity(value.len() * COMPONENT_WIDTH);
    for &component in value {
        let clamped = component.clamp(-1.0, 1.0) as f64;
        let quantised = ((clamped + 1.0) * scale).round() as u64;
        let quantised = quantised.min(range);
        let digits = base62::encode_u64(quantised);
        out.push_str(&"0".repeat(COMPONENT_WIDTH.saturating_sub(digits.len())));
        out.push_str(&digits);
    }
    Ok(out)
}

/// Inverse of [`encode_embedding`].
pub fn decode_embedding(value: &str, dimension: usize) -> Result<Vec<f32>> {
    if value.len() != dimension * COMPONENT_WIDTH {
        return Err(Error::internal(format!(
            "embedding batch has {} chars, expected {} for dimension {dimension}",
            value.len(),
            dimension * COMPONENT_WIDTH
        )));
    }
    let scale = 10f64.powi(PRECISION as i32);
    let mut out = Vec::with_capacity(dimension);
    for chunk in value.as_bytes().chunks(COMPONENT_WIDTH) {
        let digits = std::str::from_utf8(chunk).expect("ascii");
        let quantised = base62::decode_u64(digits.trim_start_matches('0'))
            .or_else(|_| if digits.chars().all(|c| c == '0') { Ok(0) } else { Err(Error::internal("bad embedding component")) })?;
        let component = quantised as f64 / scale - 1.0;
        out.push(component as f32);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_embedding_within_quantisation() {
        let vector = vec![0.5f32, -0.25, 0.0, 1.0, -1.0];
        let encoded = encode_embedding(&vector, vector.len()).unwrap();
        assert_eq!(encoded.len(), vector.len() * COMPONENT_WIDTH);
        let decoded = decode_embedding(&encoded, vector.len()).unwrap();
        for (a, b) in vector.iter().zip(decoded.iter()) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let vector = vec![0.1f32, 0.2];
        assert!(encode_embedding(&vector, 3).is_err());
    }
}
