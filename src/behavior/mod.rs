/*!
Behaviors (spec.md §4.5, component C5): a closed sum type choosing how a
record is split between S3 metadata and the S3 body. Chosen once per
resource, never per record. The core invokes `prepare_write` → size check →
`finalize_write` on every write, and `prepare_read` → `merge_read` on every
read that needs it.
*/

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::{headers, Envelope};
use crate::size::calc_bytes;

/// The closed set of write/read strategies a resource may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    /// Emit a diagnostic event when oversize; never fails the write.
    Warn,
    /// Fail the write when oversize. Never silently truncates.
    EnforceLimit,
    /// Shorten string leaves, in priority order, until the envelope fits.
    Truncate,
    /// Split into a metadata-resident "hot" subset and a body-resident
    /// "cold" subset.
    Overflow,
    /// Always serialise the full envelope into the body.
    BodyOnly,
}

impl Default for Behavior {
    fn default() -> Self {
        Behavior::Warn
    }
}

/// Inputs `prepare_write` needs beyond the envelope itself.
pub struct WriteContext<'a> {
    /// The metadata budget in bytes.
    pub budget: usize,
    /// Short keys of `string`-typed leaves, in priority order (declaration
    /// order in the flattened schema — lowest-priority, first-dropped,
    /// last). Only consulted by [`Behavior::Truncate`].
    pub string_leaf_short_keys: &'a [String],
}

/// The non-fatal outcome of a `prepare_write` call the caller must surface
/// as an event (spec.md §6, `exceeds_limit`).
#[derive(Debug, Clone, PartialEq)]
pub struct ExceedsLimit {
    /// The envelope's actual encoded size in bytes.
    pub size: usize,
    /// The configured budget in bytes.
    pub budget: usize,
}

impl Behavior {
    /// Run before the size check. May rewrite `envelope` in place (adding
    /// reserved headers, truncating fields, or moving entries to the body).
    /// Returns an [`ExceedsLimit`] diagnostic for [`Behavior::Warn`] when
    /// the envelope is still oversize after this call; every other variant
    /// returns `Ok(None)` and relies on `finalize_write`'s assertion.
    pub fn prepare_write(
        &self,
        envelope: &mut Envelope,
        ctx: &WriteContext<'_>,
    ) -> Result<Option<ExceedsLimit>> {
        envelope
            .reserved
            .insert(headers::BEHAVIOR.to_string(), behavior_tag(*self).to_string());

        match self {
            Behavior::Warn => {
                let size = calc_bytes(envelope);
                if size > ctx.budget {
                    return Ok(Some(ExceedsLimit {
                        size,
                        budget: ctx.budget,
                    }));
                }
                Ok(None)
            }
            Behavior::EnforceLimit => Ok(None),
            Behavior::Truncate => {
                truncate_to_budget(envelope, ctx);
                Ok(None)
            }
            Behavior::Overflow => {
                overflow_to_body(envelope, ctx.budget)?;
                Ok(None)
            }
            Behavior::BodyOnly => {
                move_everything_to_body(envelope)?;
                Ok(None)
            }
        }
    }

    /// Run after the size check. Asserts the post-condition the variant
    /// promises; [`Behavior::EnforceLimit`] and [`Behavior::Truncate`] fail
    /// the whole write rather than silently persisting an oversize object.
    pub fn finalize_write(&self, envelope: &Envelope, budget: usize) -> Result<()> {
        match self {
            Behavior::Warn => Ok(()),
            Behavior::EnforceLimit | Behavior::Truncate => {
                let size = calc_bytes(envelope);
                if size > budget {
                    return Err(Error::MetadataTooLarge { size, budget });
                }
                Ok(())
            }
            Behavior::Overflow => {
                let hot_size = calc_bytes(envelope);
                if hot_size > budget {
                    return Err(Error::MetadataTooLarge {
                        size: hot_size,
                        budget,
                    });
                }
                Ok(())
            }
            Behavior::BodyOnly => Ok(()),
        }
    }

    /// Whether a `get` must fetch the object body to reconstruct the
    /// record, given the reserved headers of the stored envelope.
    pub fn prepare_read(&self, reserved: &BTreeMap<String, String>) -> bool {
        match self {
            Behavior::BodyOnly => true,
            Behavior::Overflow => reserved.get(headers::OVERFLOW).map(String::as_str) == Some("1"),
            _ => false,
        }
    }

    /// Merge a fetched body back into the decoded hot fields. `Overflow`
    /// deep-merges the cold JSON subtree; `BodyOnly` replaces the decoded
    /// fields entirely (they were empty to begin with).
    pub fn merge_read(
        &self,
        hot_fields: &mut BTreeMap<String, String>,
        body: Option<&[u8]>,
    ) -> Result<()> {
        match self {
            Behavior::Overflow => {
                if let Some(bytes) = body {
                    let cold: BTreeMap<String, String> = serde_json::from_slice(bytes)?;
                    for (k, v) in cold {
                        hot_fields.entry(k).or_insert(v);
                    }
                }
                Ok(())
            }
            Behavior::BodyOnly => {
                if let Some(bytes) = body {
                    let all: BTreeMap<String, String> = serde_json::from_slice(bytes)?;
                    *hot_fields = all;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn behavior_tag(behavior: Behavior) -> &'static str {
    match behavior {
        Behavior::Warn => "warn",
        Behavior::EnforceLimit => "enforceLimit",
        Behavior::Truncate => "truncate",
        Behavior::Overflow => "overflow",
        Behavior::BodyOnly => "bodyOnly",
    }
}

/// Iteratively drop/shorten string leaves, lowest priority first, until the
/// envelope fits `ctx.budget` or there is nothing left to shorten. Dropped
/// or shortened short keys are recorded under the `truncated` header.
fn truncate_to_budget(envelope: &mut Envelope, ctx: &WriteContext<'_>) {
    let mut truncated_keys = Vec::new();
    for short_key in ctx.string_leaf_short_keys.iter().rev() {
        if calc_bytes(envelope) <= ctx.budget {
            break;
        }
        let Some(value) = envelope.fields.get_mut(short_key) else {
            continue;
        };
        if value.is_empty() {
            envelope.fields.remove(short_key);
        } else {
            let keep = value.chars().count().saturating_sub(1);
            *value = value.chars().take(keep).collect();
        }
        truncated_keys.push(short_key.clone());
    }
    if !truncated_keys.is_empty() {
        envelope
            .reserved
            .insert(headers::TRUNCATED.to_string(), truncated_keys.join(","));
    }
}

/// Partition `envelope.fields` into a hot subset that fits the budget
/// (reserved headers first, then ascending encoded length) and spill the
/// remainder into the body as JSON.
fn overflow_to_body(envelope: &mut Envelope, budget: usize) -> Result<()> {
    if calc_bytes(envelope) <= budget {
        return Ok(());
    }

    let mut candidates: Vec<(String, String)> = envelope.fields.clone().into_iter().collect();
    candidates.sort_by_key(|(_, v)| v.len());

    let mut hot = BTreeMap::new();
    let mut cold = BTreeMap::new();
    let mut probe = Envelope {
        fields: BTreeMap::new(),
        reserved: envelope.reserved.clone(),
        body: None,
    };
    probe
        .reserved
        .insert(headers::OVERFLOW.to_string(), "1".to_string());

    for (key, value) in candidates {
        probe.fields.insert(key.clone(), value.clone());
        if calc_bytes(&probe) <= budget {
            hot.insert(key, value);
        } else {
            probe.fields.remove(&key);
            cold.insert(key, value);
        }
    }

    envelope.fields = hot;
    envelope.reserved = probe.reserved;
    envelope.body = Some(serde_json::to_vec(&cold)?);
    Ok(())
}

fn move_everything_to_body(envelope: &mut Envelope) -> Result<()> {
    envelope.body = Some(serde_json::to_vec(&envelope.fields)?);
    envelope.fields.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(budget: usize) -> WriteContext<'static> {
        WriteContext {
            budget,
            string_leaf_short_keys: &[],
        }
    }

    #[test]
    fn warn_never_fails_but_reports_oversize() {
        let mut envelope = Envelope::new();
        envelope.fields.insert("0".to_string(), "x".repeat(100));
        let outcome = Behavior::Warn.prepare_write(&mut envelope, &ctx(10)).unwrap();
        assert!(outcome.is_some());
        assert!(Behavior::Warn.finalize_write(&envelope, 10).is_ok());
    }

    #[test]
    fn enforce_limit_fails_closed() {
        let mut envelope = Envelope::new();
        envelope.fields.insert("0".to_string(), "x".repeat(100));
        Behavior::EnforceLimit
            .prepare_write(&mut envelope, &ctx(10))
            .unwrap();
        assert!(matches!(
            Behavior::EnforceLimit.finalize_write(&envelope, 10),
            Err(Error::MetadataTooLarge { .. })
        ));
    }

    #[test]
    fn truncate_shrinks_until_it_fits() {
        let mut envelope = Envelope::new();
        envelope.fields.insert("0".to_string(), "a".repeat(50));
        let leaf_keys = vec!["0".to_string()];
        let ctx = WriteContext {
            budget: 10,
            string_leaf_short_keys: &leaf_keys,
        };
        Behavior::Truncate.prepare_write(&mut envelope, &ctx).unwrap();
        assert!(Behavior::Truncate.finalize_write(&envelope, 10).is_ok());
        assert!(envelope.reserved.contains_key(headers::TRUNCATED));
    }

    #[test]
    fn overflow_spills_cold_fields_to_body_and_reassembles_on_read() {
        let mut envelope = Envelope::new();
        envelope.fields.insert("0".to_string(), "short".to_string());
        envelope.fields.insert("1".to_string(), "x".repeat(500));
        Behavior::Overflow
            .prepare_write(&mut envelope, &ctx(50))
            .unwrap();
        assert!(Behavior::Overflow.finalize_write(&envelope, 50).is_ok());
        assert_eq!(
            envelope.reserved.get(headers::OVERFLOW).map(String::as_str),
            Some("1")
        );
        assert!(Behavior::Overflow.prepare_read(&envelope.reserved));

        let mut hot = envelope.fields.clone();
        Behavior::Overflow
            .merge_read(&mut hot, envelope.body.as_deref())
            .unwrap();
        assert_eq!(hot.get("1").unwrap().len(), 500);
    }

    #[test]
    fn body_only_moves_everything_out_of_metadata() {
        let mut envelope = Envelope::new();
        envelope.fields.insert("0".to_string(), "value".to_string());
        Behavior::BodyOnly
            .prepare_write(&mut envelope, &ctx(10))
            .unwrap();
        assert!(envelope.fields.is_empty());
        assert!(envelope.body.is_some());
        assert!(Behavior::BodyOnly.prepare_read(&envelope.reserved));
    }
}
