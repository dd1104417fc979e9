/*!
Codecs for `ip4` and `ip6` attribute types.
*/

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{Error, Result};

/// `ip4`: 4 raw bytes, base64-encoded. Always 8 characters including the
/// `=` padding (4 bytes is not a multiple of 3).
pub fn encode_ip4(addr: &Ipv4Addr) -> String {
    STANDARD.encode(addr.octets())
}

/// Inverse of [`encode_ip4`].
pub fn decode_ip4(value: &str) -> Result<Ipv4Addr> {
    let bytes = STANDARD
        .decode(value)
        .map_err(|err| Error::internal(format!("invalid ip4 base64: {err}")))?;
    let octets: [u8; 4] = bytes
        .try_into()
        .map_err(|_| Error::internal("ip4 payload must be 4 bytes"))?;
    Ok(Ipv4Addr::from(octets))
}

/// `ip6`: 16 raw bytes, base64-encoded, but only for addresses supplied in
/// fully-expanded form (8 groups of 4 hex digits, no `::` compression).
/// Compressed-form input passes through unencoded so the original spelling
/// survives the round trip; a leading `=` distinguishes the two cases on
/// decode, since a compressed ipv6 literal never starts with `=`.
pub fn encode_ip6(input: &str) -> Result<String> {
    if input.contains("::") {
        return Ok(input.to_string());
    }
    let addr = Ipv6Addr::from_str(input)
        .map_err(|err| Error::internal(format!("invalid ip6 address `{input}`: {err}")))?;
    Ok(format!("={}", STANDARD.encode(addr.octets())))
}

/// Inverse of [`encode_ip6`].
pub fn decode_ip6(value: &str) -> Result<String> {
    if let Some(encoded) = value.strip_prefix('=') {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|err| Error::internal(format!("invalid ip6 base64: {err}")))?;
        let octets: [u8; 16] = bytes
            .try_into()
            .map_err(|_| Error::internal("ip6 payload must be 16 bytes"))?;
        Ok(Ipv6Addr::from(octets).to_string())
    } else {
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_ip4() {
        let addr: Ipv4Addr = "192.168.1.1".parse().unwrap();
        let encoded = encode_ip4(&addr);
        assert_eq!(encoded.len(), 8);
        assert_eq!(decode_ip4(&encoded).unwrap(), addr);
    }

    #[test]
    fn encodes_expanded_ip6() {
        let input = "2001:0db8:0000:0000:0000:0000:0000:0001";
        let encoded = encode_ip6(input).unwrap();
        assert!(encoded.starts_with('='));
        let decoded = decode_ip6(&encoded).unwrap();
        let round_tripped: Ipv6Addr = decoded.parse().unwrap();
        let original: Ipv6Addr = input.parse().unwrap();
        assert_eq!(round_tripped, original);
    }

    #[test]
    fn passes_through_compressed_ip6() {
        let input = "2001:db8::1";
        let encoded = encode_ip6(input).unwrap();
        assert_eq!(encoded, input);
        assert_eq!(decode_ip6(&encoded).unwrap(), input);
    }
}
