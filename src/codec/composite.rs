/*!
Codecs for the composite/auxiliary encodings: `array<T>` joining and
escaping, the empty-object marker, and the `dictionary` token substitution.
*/

use lazy_static::lazy_static;
use std::collections::HashMap;

use crate::codec::base62;

/// Literal token an empty array encodes to.
pub const EMPTY_ARRAY_MARKER: &str = "[]";

/// Literal token an empty nested object encodes to, registered as its own
/// entry in the short-key map so it round-trips (spec.md §3).
pub const EMPTY_OBJECT_MARKER: &str = "{}";

const ARRAY_DELIMITER: char = '|';
const ESCAPE_CHAR: char = '\\';

/// Escape `|` and `\` in a single already-encoded array element.
pub fn escape_element(element: &str) -> String {
    let mut out = String::with_capacity(element.len());
    for c in element.chars() {
        if c == ARRAY_DELIMITER || c == ESCAPE_CHAR {
            out.push(ESCAPE_CHAR);
        }
        out.push(c);
    }
    out
}

/// Inverse of [`escape_element`].
pub fn unescape_element(element: &str) -> String {
    let mut out = String::with_capacity(element.len());
    let mut chars = element.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE_CHAR {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Join already-encoded, unescaped element strings into the array wire
/// format, escaping each element and preserving order.
pub fn join_array(elements: &[String]) -> String {
    if elements.is_empty() {
        return EMPTY_ARRAY_MARKER.to_string();
    }
    elements
        .iter()
        .map(|e| escape_element(e))
        .collect::<Vec<_>>()
        .join(&ARRAY_DELIMITER.to_string())
}

/// Split an array wire-format string back into unescaped element strings,
/// in original order.
pub fn split_array(value: &str) -> Vec<String> {
    if value == EMPTY_ARRAY_MARKER {
        return Vec::new();
    }
    let mut elements = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ESCAPE_CHAR {
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c == ARRAY_DELIMITER {
            elements.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    elements.push(current);
    elements
}

lazy_static! {
    /// Frequent leaf values replaced with a single-byte token before other
    /// encoding runs. The token alphabet is `~` followed by a base62 digit,
    /// disjoint from plain string values that happen to start with `~`
    /// only in the sense that such values must escape a leading `~` — in
    /// practice this table only ever matches short closed-vocabulary
    /// tokens (booleans, HTTP verbs, lifecycle states).
    static ref DICTIONARY: Vec<&'static str> = vec![
        "active", "inactive", "pending", "archived", "deleted", "draft",
        "published", "true", "false", "null",
        "GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS",
        "created", "updated", "running", "stopped", "paused",
        "low", "medium", "high", "critical",
        "admin", "user", "guest", "system",
        "en", "en-US", "USD", "EUR",
    ];
    static ref DICTIONARY_INDEX: HashMap<&'static str, usize> = DICTIONARY
        .iter()
        .enumerate()
        .map(|(i, &word)| (word, i))
        .collect();
}

const DICTIONARY_PREFIX: char = '~';

/// If `value` is a dictionary entry, return its reserved token.
pub fn encode_dictionary(value: &str) -> Option<String> {
    DICTIONARY_INDEX
        .get(value)
        .map(|&idx| format!("{DICTIONARY_PREFIX}{}", base62::encode_ordinal(idx as u64)))
}

/// If `value` is a dictionary token, return the original word.
pub fn decode_dictionary(value: &str) -> Option<&'static str> {
    let ordinal = value.strip_prefix(DICTIONARY_PREFIX)?;
    let idx = base62::decode_ordinal(ordinal).ok()? as usize;
    DICTIONARY.get(idx).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_delimiters_and_backslashes() {
        let escaped = escape_element("a|b\\c");
        assert_eq!(escaped, "a\\|b\\\\c");
        assert_eq!(unescape_element(&escaped), "a|b\\c");
    }

    #[test]
    fn round_trips_array_with_embedded_delimiters() {
        let elements = vec!["a|b".to_string(), "c\\d".to_string(), "plain".to_string()];
        let joined = join_array(&elements);
        assert_eq!(split_array(&joined), elements);
    }

    #[test]
    fn empty_array_uses_literal_marker() {
        assert_eq!(join_array(&[]), EMPTY_ARRAY_MARKER);
        assert!(split_array(EMPTY_ARRAY_MARKER).is_empty());
    }

    #[test]
    fn dictionary_round_trips_known_words() {
        let token = encode_dictionary("active").unwrap();
        assert_eq!(decode_dictionary(&token), Some("active"));
        assert!(encode_dictionary("not-in-dictionary").is_none());
    }
}
