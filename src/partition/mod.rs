/*!
The partition engine (spec.md §4.6, component C6): deterministic reference
object keys for O(1) partition scans, computed from a declarative rule set
and kept in sync with the primary object on every mutation.
*/

pub mod engine;
pub mod key;

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::schema::flat_map::FlatEntry;

/// A pure, deterministic transform from a raw field value to a partition
/// segment token (spec.md §3, "Partition").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionRule {
    /// Pass the value through unchanged.
    String,
    /// Truncate to `N` UTF-8 code points.
    StringMaxLength(usize),
    /// Slice an ISO-8601 timestamp to its first `N` characters
    /// (`10` yields `YYYY-MM-DD`).
    DateMaxLength(usize),
    /// Render via the `number` codec.
    Number,
}

impl std::fmt::Display for PartitionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionRule::String => write!(f, "string"),
            PartitionRule::StringMaxLength(n) => write!(f, "string|maxlength:{n}"),
            PartitionRule::DateMaxLength(n) => write!(f, "date|maxlength:{n}"),
            PartitionRule::Number => write!(f, "number"),
        }
    }
}

impl FromStr for PartitionRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "string" => Ok(PartitionRule::String),
            "number" => Ok(PartitionRule::Number),
            _ => {
                let (kind, rest) = s
                    .split_once('|')
                    .ok_or_else(|| Error::PartitionRuleInvalid(s.to_string()))?;
                let n: usize = rest
                    .strip_prefix("maxlength:")
                    .and_then(|n| n.parse().ok())
                    .ok_or_else(|| Error::PartitionRuleInvalid(s.to_string()))?;
                match kind {
                    "string" => Ok(PartitionRule::StringMaxLength(n)),
                    "date" => Ok(PartitionRule::DateMaxLength(n)),
                    _ => Err(Error::PartitionRuleInvalid(s.to_string())),
                }
            }
        }
    }
}

impl Serialize for PartitionRule {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PartitionRule {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PartitionRule::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// One `(field, rule)` pair within a [`PartitionSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionField {
    /// Dotted attribute path the rule applies to.
    pub field: String,
    /// The transform applied to the field's raw value.
    pub rule: PartitionRule,
}

/// A named, declarative partition: one or more `(field, rule)` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSpec {
    /// Partition name, unique within the resource.
    pub name: String,
    /// The fields this partition keys on. Declaration order is irrelevant —
    /// segments are always emitted sorted by field name (spec.md §4.6).
    pub fields: Vec<PartitionField>,
}

impl PartitionSpec {
    /// Build the auto-added `byCreatedDate`/`byUpdatedDate` partitions a
    /// resource gets when `timestamps_enabled` is set (spec.md §3).
    pub fn timestamp_partitions() -> Vec<PartitionSpec> {
        vec![
            PartitionSpec {
                name: "byCreatedDate".to_string(),
                fields: vec![PartitionField {
                    field: "created_at".to_string(),
                    rule: PartitionRule::DateMaxLength(10),
                }],
            },
            PartitionSpec {
                name: "byUpdatedDate".to_string(),
                fields: vec![PartitionField {
                    field: "updated_at".to_string(),
                    rule: PartitionRule::DateMaxLength(10),
                }],
            },
        ]
    }

    /// Validate that every field this partition references exists in the
    /// resource's flattened schema. An unrecognised field is a
    /// configuration error caught at `createResource` time, not a runtime
    /// surprise on the hot path.
    pub fn validate_against(&self, flat_map: &[FlatEntry]) -> Result<()> {
        for field in &self.fields {
            let known = flat_map.iter().any(|e| e.path == field.field)
                || field.field == "created_at"
                || field.field == "updated_at";
            if !known {
                return Err(Error::PartitionRuleInvalid(format!(
                    "partition `{}` references unknown field `{}`",
                    self.name, field.field
                )));
            }
        }
        Ok(())
    }

    /// Fields sorted alphabetically by name, the canonical segment order
    /// (spec.md §4.6).
    pub fn sorted_fields(&self) -> Vec<&PartitionField> {
        let mut fields: Vec<&PartitionField> = self.fields.iter().collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_every_rule_shape() {
        for s in ["string", "string|maxlength:2", "date|maxlength:10", "number"] {
            let rule: PartitionRule = s.parse().unwrap();
            assert_eq!(rule.to_string(), s);
        }
    }

    #[test]
    fn sorted_fields_ignores_declaration_order() {
        let spec = PartitionSpec {
            name: "byRegionDept".to_string(),
            fields: vec![
                PartitionField {
                    field: "region".to_string(),
                    rule: PartitionRule::StringMaxLength(2),
                },
                PartitionField {
                    field: "department".to_string(),
                    rule: PartitionRule::String,
                },
            ],
        };
        let sorted: Vec<&str> = spec.sorted_fields().iter().map(|f| f.field.as_str()).collect();
        assert_eq!(sorted, vec!["department", "region"]);
    }
}
