/*!
Type codecs (spec.md §4.2, component C2).

Each codec is a deterministic, total pair `encode(value) -> String` /
`decode(String) -> value` over its declared domain. [`AttributeType`] is the
closed set of leaf type tags an attribute tree leaf may carry; [`Value`] is
the dynamic variant tree a decoded record value takes, following the
"dynamic objects as records" strategy in spec.md §9 — string-keyed at the
edges, fully typed internally.
*/

pub mod base62;
pub mod composite;
pub mod embedding;
pub mod geo;
pub mod money;
pub mod network;
pub mod scalar;
pub mod secret;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{Error, Result};

/// The closed set of leaf type tags an attribute tree leaf may carry.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    /// `string`, with an optional declared maximum length.
    String {
        /// Maximum length in UTF-8 code points, if declared.
        max_len: Option<usize>,
    },
    /// `number`, integer when `precision` is `None`, fixed-point float
    /// otherwise.
    Number {
        /// Declared decimal precision for floats.
        precision: Option<u32>,
    },
    /// `ip4`.
    Ip4,
    /// `ip6`.
    Ip6,
    /// `money:<CCY>`.
    Money {
        /// ISO 4217-style currency code.
        currency: String,
    },
    /// `decimal:<N>`.
    Decimal {
        /// Declared decimal scale.
        scale: u32,
    },
    /// `geo:lat:<N>`.
    GeoLat {
        /// Declared decimal precision.
        precision: u32,
    },
    /// `geo:lon:<N>`.
    GeoLon {
        /// Declared decimal precision.
        precision: u32,
    },
    /// `embedding:<D>`.
    Embedding {
        /// Declared vector dimension.
        dimension: usize,
    },
    /// `timestamp`.
    Timestamp,
    /// `uuid`.
    Uuid,
    /// `secret`.
    Secret,
    /// `array<T>`.
    Array(Box<AttributeType>),
    /// `object`: an interior node, auto-detected by the schema compiler's
    /// pre-pass (spec.md §9).
    Object,
    /// `dictionary`: replaces frequent leaf values with reserved tokens
    /// before the wrapped type's own encoding runs.
    Dictionary(Box<AttributeType>),
}

lazy_static! {
    static ref MONEY_RE: Regex = Regex::new(r"^money:(?P<ccy>[A-Za-z0-9_]+)$").unwrap();
    static ref DECIMAL_RE: Regex = Regex::new(r"^decimal:(?P<scale>\d+)$").unwrap();
    static ref GEO_LAT_RE: Regex = Regex::new(r"^geo:lat:(?P<p>\d+)$").unwrap();
    static ref GEO_LON_RE: Regex = Regex::new(r"^geo:lon:(?P<p>\d+)$").unwrap();
    static ref EMBEDDING_RE: Regex = Regex::new(r"^embedding:(?P<d>\d+)$").unwrap();
    static ref ARRAY_RE: Regex = Regex::new(r"^array<(?P<inner>.+)>$").unwrap();
    static ref STRING_RE: Regex = Regex::new(r"^string(\|maxlength:(?P<n>\d+))?$").unwrap();
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::String { max_len: None } => write!(f, "string"),
            AttributeType::String { max_len: Some(n) } => write!(f, "string|maxlength:{n}"),
            AttributeType::Number { precision: None } => write!(f, "number"),
            AttributeType::Number { precision: Some(p) } => write!(f, "number:{p}"),
            AttributeType::Ip4 => write!(f, "ip4"),
            AttributeType::Ip6 => write!(f, "ip6"),
            AttributeType::Money { currency } => write!(f, "money:{currency}"),
            AttributeType::Decimal { scale } => write!(f, "decimal:{scale}"),
            AttributeType::GeoLat { precision } => write!(f, "geo:lat:{precision}"),
            AttributeType::GeoLon { precision } => write!(f, "geo:lon:{precision}"),
            AttributeType::Embedding { dimension } => write!(f, "embedding:{dimension}"),
            AttributeType::Timestamp => write!(f, "timestamp"),
            AttributeType::Uuid => write!(f, "uuid"),
            AttributeType::Secret => write!(f, "secret"),
            AttributeType::Array(inner) => write!(f, "array<{inner}>"),
            AttributeType::Object => write!(f, "object"),
            AttributeType::Dictionary(inner) => write!(f, "dictionary<{inner}>"),
        }
    }
}

impl FromStr for AttributeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(caps) = STRING_RE.captures(s) {
            let max_len = caps
                .name("n")
                .map(|m| m.as_str().parse().expect("regex guarantees digits"));
            return Ok(AttributeType::String { max_len });
        }
        if s == "number" {
            return Ok(AttributeType::Number { precision: None });
        }
        if let Some(p) = s.strip_prefix("number:") {
            return Ok(AttributeType::Number {
                precision: Some(p.parse().map_err(|_| invalid(s))?),
            });
        }
        if s == "ip4" {
            return Ok(AttributeType::Ip4);
        }
        if s == "ip6" {
            return Ok(AttributeType::Ip6);
        }
        if let Some(caps) = MONEY_RE.captures(s) {
            return Ok(AttributeType::Money {
                currency: caps["ccy"].to_string(),
            });
        }
        if let Some(caps) = DECIMAL_RE.captures(s) {
            return Ok(AttributeType::Decimal {
                scale: caps["scale"].parse().map_err(|_| invalid(s))?,
            });
        }
        if let Some(caps) = GEO_LAT_RE.captures(s) {
            return Ok(AttributeType::GeoLat {
                precision: caps["p"].parse().map_err(|_| invalid(s))?,
            });
        }
        if let Some(caps) = GEO_LON_RE.captures(s) {
            return Ok(AttributeType::GeoLon {
                precision: caps["p"].parse().map_err(|_| invalid(s))?,
            });
        }
        if let Some(caps) = EMBEDDING_RE.captures(s) {
            return Ok(AttributeType::Embedding {
                dimension: caps["d"].parse().map_err(|_| invalid(s))?,
            });
        }
        if s == "timestamp" {
            return Ok(AttributeType::Timestamp);
        }
        if s == "uuid" {
            return Ok(AttributeType::Uuid);
        }
        if s == "secret" {
            return Ok(AttributeType::Secret);
        }
        if s == "object" {
            return Ok(AttributeType::Object);
        }
        if s == "dictionary" {
            return Ok(AttributeType::Dictionary(Box::new(AttributeType::String {
                max_len: None,
            })));
        }
        if let Some(caps) = ARRAY_RE.captures(s) {
            let inner: AttributeType = caps["inner"].parse()?;
            return Ok(AttributeType::Array(Box::new(inner)));
        }
        Err(invalid(s))
    }
}

fn invalid(s: &str) -> Error {
    Error::internal(format!("unrecognised attribute type `{s}`"))
}

impl Serialize for AttributeType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AttributeType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        AttributeType::from_str(&s).map_err(de::Error::custom)
    }
}

/// The dynamic value tree a decoded record takes. String-keyed objects at
/// the edges for ergonomics; each leaf still knows which [`AttributeType`]
/// produced it via the schema, not via this enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent / JSON `null`.
    Null,
    /// Any boolean, string, or numeric scalar rendered as text.
    String(String),
    /// A 64-bit integer.
    Int(i64),
    /// A 64-bit float.
    Float(f64),
    /// A boolean.
    Bool(bool),
    /// An ordered sequence of values.
    Array(Vec<Value>),
    /// A nested object, dotted-path children included.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Render the value as a `&str` if it is string-shaped.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value as an `i64` if it is integer-shaped.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Render the value as an `f64` if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }
}

/// Encode a leaf [`Value`] to its wire string per `attr_type`.
pub fn encode_leaf(attr_type: &AttributeType, value: &Value) -> Result<String> {
    match attr_type {
        AttributeType::String { .. } => Ok(scalar::encode_string(
            value.as_str().ok_or_else(|| type_mismatch("string"))?,
        )),
        AttributeType::Number { precision: None } => Ok(scalar::encode_number_int(
            value
                .as_i64()
                .ok_or_else(|| type_mismatch("integer number"))?,
        )),
        AttributeType::Number {
            precision: Some(p),
        } => scalar::encode_number_float(
            value.as_f64().ok_or_else(|| type_mismatch("float number"))?,
            *p,
        ),
        AttributeType::Ip4 => {
            let addr = value
                .as_str()
                .ok_or_else(|| type_mismatch("ip4"))?
                .parse()
                .map_err(|_| Error::internal("invalid ipv4 literal"))?;
            Ok(network::encode_ip4(&addr))
        }
        AttributeType::Ip6 => network::encode_ip6(value.as_str().ok_or_else(|| type_mismatch("ip6"))?),
        AttributeType::Money { .. } => Ok(money::encode_money(
            value.as_i64().ok_or_else(|| type_mismatch("money"))?,
        )),
        AttributeType::Decimal { scale } => {
            money::encode_decimal(value.as_f64().ok_or_else(|| type_mismatch("decimal"))?, *scale)
        }
        AttributeType::GeoLat { precision } => {
            geo::encode_lat(value.as_f64().ok_or_else(|| type_mismatch("geo:lat"))?, *precision)
        }
        AttributeType::GeoLon { precision } => {
            geo::encode_lon(value.as_f64().ok_or_else(|| type_mismatch("geo:lon"))?, *precision)
        }
        AttributeType::Embedding { dimension } => {
            let Value::Array(items) = value else {
                return Err(type_mismatch("embedding"));
            };
            let floats: Vec<f32> = items
                .iter()
                .map(|v| v.as_f64().map(|f| f as f32).ok_or_else(|| type_mismatch("embedding component")))
                .collect::<Result<_>>()?;
            embedding::encode_embedding(&floats, *dimension)
        }
        AttributeType::Timestamp => {
            let millis = match value {
                Value::Int(n) => *n,
                Value::String(s) => scalar::parse_timestamp_input(s)?,
                _ => return Err(type_mismatch("timestamp")),
            };
            Ok(scalar::encode_timestamp_millis(millis))
        }
        AttributeType::Uuid => {
            let id: Uuid = value
                .as_str()
                .ok_or_else(|| type_mismatch("uuid"))?
                .parse()
                .map_err(|_| Error::internal("invalid uuid literal"))?;
            Ok(scalar::encode_uuid(&id))
        }
        AttributeType::Secret => Err(Error::internal(
            "secret values must be encrypted via codec::secret::encrypt, not encode_leaf",
        )),
        AttributeType::Array(inner) => {
            let Value::Array(items) = value else {
                return Err(type_mismatch("array"));
            };
            let encoded: Vec<String> = items
                .iter()
                .map(|v| encode_leaf(inner, v))
                .collect::<Result<_>>()?;
            Ok(composite::join_array(&encoded))
        }
        AttributeType::Object => Ok(composite::EMPTY_OBJECT_MARKER.to_string()),
        AttributeType::Dictionary(inner) => {
            if let Some(s) = value.as_str() {
                if let Some(token) = composite::encode_dictionary(s) {
                    return Ok(token);
                }
            }
            encode_leaf(inner, value)
        }
    }
}

/// Decode a wire string back to a [`Value`] per `attr_type`.
pub fn decode_leaf(attr_type: &AttributeType, wire: &str) -> Result<Value> {
    match attr_type {
        AttributeType::String { .. } => Ok(Value::String(scalar::decode_string(wire))),
        AttributeType::Number { precision: None } => {
            Ok(Value::Int(scalar::decode_number_int(wire)?))
        }
        AttributeType::Number {
            precision: Some(p),
        } => Ok(Value::Float(scalar::decode_number_float(wire, *p)?)),
        AttributeType::Ip4 => Ok(Value::String(network::decode_ip4(wire)?.to_string())),
        AttributeType::Ip6 => Ok(Value::String(network::decode_ip6(wire)?)),
        AttributeType::Money { .. } => Ok(Value::Int(money::decode_money(wire)?)),
        AttributeType::Decimal { scale } => Ok(Value::Float(money::decode_decimal(wire, *scale)?)),
        AttributeType::GeoLat { precision } => Ok(Value::Float(geo::decode_lat(wire, *precision)?)),
        AttributeType::GeoLon { precision } => Ok(Value::Float(geo::decode_lon(wire, *precision)?)),
        AttributeType::Embedding { dimension } => {
            let floats = embedding::decode_embedding(wire, *dimension)?;
            Ok(Value::Array(
                floats.into_iter().map(|f| Value::Float(f as f64)).collect(),
            ))
        }
        AttributeType::Timestamp => Ok(Value::Int(scalar::decode_timestamp_millis(wire)?)),
        AttributeType::Uuid => Ok(Value::String(scalar::decode_uuid(wire)?.to_string())),
        AttributeType::Secret => Ok(Value::String(wire.to_string())),
        AttributeType::Array(inner) => {
            let elements = composite::split_array(wire);
            let decoded: Vec<Value> = elements
                .iter()
                .map(|e| decode_leaf(inner, e))
                .collect::<Result<_>>()?;
            Ok(Value::Array(decoded))
        }
        AttributeType::Object => Ok(Value::Object(BTreeMap::new())),
        AttributeType::Dictionary(inner) => {
            if let Some(word) = composite::decode_dictionary(wire) {
                Ok(Value::String(word.to_string()))
            } else {
                decode_leaf(inner, wire)
            }
        }
    }
}

fn type_mismatch(expected: &str) -> Error {
    Error::internal(format!("value does not match declared type `{expected}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_parameterised_types() {
        for s in [
            "string",
            "string|maxlength:2",
            "number",
            "ip4",
            "ip6",
            "money:USD",
            "decimal:2",
            "geo:lat:6",
            "geo:lon:6",
            "embedding:128",
            "timestamp",
            "uuid",
            "secret",
            "object",
            "array<string>",
            "array<money:USD>",
        ] {
            let parsed: AttributeType = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s, "round trip for {s}");
        }
    }

    #[test]
    fn round_trips_string_leaf() {
        let ty = AttributeType::String { max_len: None };
        let value = Value::String("hello".to_string());
        let wire = encode_leaf(&ty, &value).unwrap();
        assert_eq!(decode_leaf(&ty, &wire).unwrap(), value);
    }

    #[test]
    fn round_trips_array_of_numbers() {
        let ty = AttributeType::Array(Box::new(AttributeType::Number { precision: None }));
        let value = Value::Array(vec![Value::Int(1), Value::Int(-2), Value::Int(3)]);
        let wire = encode_leaf(&ty, &value).unwrap();
        assert_eq!(decode_leaf(&ty, &wire).unwrap(), value);
    }

    #[test]
    fn round_trips_dictionary_hit_and_miss() {
        let ty = AttributeType::Dictionary(Box::new(AttributeType::String { max_len: None }));
        let hit = Value::String("active".to_string());
        let wire = encode_leaf(&ty, &hit).unwrap();
        assert_eq!(wire.len(), 2);
        assert_eq!(decode_leaf(&ty, &wire).unwrap(), hit);

        let miss = Value::String("not-in-dictionary".to_string());
        let wire = encode_leaf(&ty, &miss).unwrap();
        assert_eq!(decode_leaf(&ty, &wire).unwrap(), miss);
    }
}
