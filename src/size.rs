/*!
The byte-size calculator (spec.md §4.4, component C4): computes the exact
byte size a candidate [`Envelope`] will occupy as object user-metadata.

Used twice per write: once as a projection to pick a behavior branch
(spec.md §4.5), and once as a post-condition check after the behavior has
run.
*/

use crate::record::Envelope;

/// Default metadata budget in bytes (spec.md glossary, `METADATA_BUDGET`).
pub const DEFAULT_METADATA_BUDGET: usize = 2047;

/// Fixed per-header overhead accounting for the `x-s3db-` prefix real
/// object-store metadata keys carry, which this crate's compact header map
/// does not itself store (spec.md §4.4, "add a fixed overhead for reserved
/// headers").
const RESERVED_HEADER_PREFIX_LEN: usize = "x-s3db-".len();

/// Compute the exact UTF-8 byte size `envelope` will occupy as object
/// user-metadata: for every entry, `bytes(key) + 1 + bytes(value) + 1`
/// (the `=` and `&` separators), minus one for the absent trailing
/// separator, plus the reserved-header prefix overhead.
pub fn calc_bytes(envelope: &Envelope) -> usize {
    let mut total = 0usize;
    let mut entry_count = 0usize;
    for (key, value) in envelope.metadata_entries() {
        total += key.len() + 1 + value.len() + 1;
        entry_count += 1;
    }
    if entry_count > 0 {
        total -= 1;
    }
    total + envelope.reserved.len() * RESERVED_HEADER_PREFIX_LEN
}

/// Whether `envelope` fits within `budget` bytes.
pub fn fits_within(envelope: &Envelope, budget: usize) -> bool {
    calc_bytes(envelope) <= budget
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn envelope_with(fields: &[(&str, &str)]) -> Envelope {
        let mut envelope = Envelope::new();
        for (k, v) in fields {
            envelope.fields.insert(k.to_string(), v.to_string());
        }
        envelope
    }

    #[test]
    fn single_entry_has_no_trailing_separator() {
        let envelope = envelope_with(&[("a", "b")]);
        // "a" + '=' + "b" + '&' - 1 trailing = 3
        assert_eq!(calc_bytes(&envelope), 3);
    }

    #[test]
    fn empty_envelope_is_zero_bytes() {
        assert_eq!(calc_bytes(&Envelope::new()), 0);
    }

    #[test]
    fn reserved_headers_add_prefix_overhead() {
        let mut envelope = Envelope::new();
        envelope
            .reserved
            .insert("behavior".to_string(), "warn".to_string());
        let without_overhead = "behavior".len() + 1 + "warn".len() + 1 - 1;
        assert_eq!(
            calc_bytes(&envelope),
            without_overhead + RESERVED_HEADER_PREFIX_LEN
        );
    }

    #[test]
    fn respects_default_budget() {
        let small = envelope_with(&[("a", "b")]);
        assert!(fits_within(&small, DEFAULT_METADATA_BUDGET));
    }
}
