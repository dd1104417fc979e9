/*!
Object-key construction (spec.md §3, "Object-key grammar", and §4.6,
"Canonical key construction").
*/

use std::collections::BTreeMap;

use crate::codec::{self, AttributeType, Value};
use crate::error::Result;
use crate::partition::{PartitionRule, PartitionSpec};

/// The primary object's key: `resource=<name>/v=<version>/id=<id>`.
pub fn primary_key(resource: &str, version: &str, id: &str) -> String {
    format!("resource={resource}/v={version}/id={id}")
}

/// The catalog document's well-known key, relative to the connection's
/// prefix.
pub fn catalog_key(catalog_path: &str) -> String {
    catalog_path.to_string()
}

/// A key under the plugin storage namespace: `plg/<plugin>/<arbitrary>`.
pub fn plugin_key(plugin: &str, arbitrary: &str) -> String {
    format!("plg/{plugin}/{arbitrary}")
}

/// Apply a partition rule to a raw field value, producing the partition
/// segment token. Pure and deterministic; never fails silently — an
/// unrecognised rule was already caught at `createResource` time by
/// [`PartitionSpec::validate_against`](crate::partition::PartitionSpec::validate_against).
pub fn apply_rule(value: &Value, rule: PartitionRule) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        _ => Ok(Some(apply_rule_to_value(value, rule)?)),
    }
}

fn apply_rule_to_value(value: &Value, rule: PartitionRule) -> Result<String> {
    match rule {
        PartitionRule::String => Ok(string_of(value)),
        PartitionRule::StringMaxLength(n) => {
            Ok(string_of(value).chars().take(n).collect())
        }
        PartitionRule::DateMaxLength(n) => Ok(string_of(value).chars().take(n).collect()),
        PartitionRule::Number => match value {
            Value::Int(i) => codec::encode_leaf(&AttributeType::Number { precision: None }, &Value::Int(*i)),
            Value::Float(f) => codec::encode_leaf(
                &AttributeType::Number { precision: Some(6) },
                &Value::Float(*f),
            ),
            other => Ok(string_of(other)),
        },
    }
}

fn string_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => String::new(),
    }
}

/// Build the canonical reference key for `spec` against `record`, or
/// `None` if any of the partition's fields is null/missing in `record`
/// (spec.md §4.6: "if any token value is null/missing: skip this partition
/// entry").
pub fn partition_reference_key(
    resource: &str,
    spec: &PartitionSpec,
    record: &BTreeMap<String, Value>,
    id: &str,
) -> Result<Option<String>> {
    let mut tokens = Vec::with_capacity(spec.fields.len());
    for field in spec.sorted_fields() {
        let Some(raw) = lookup(record, &field.field) else {
            return Ok(None);
        };
        let Some(token) = apply_rule(raw, field.rule)? else {
            return Ok(None);
        };
        tokens.push(format!("{}={}", field.field, token));
    }
    Ok(Some(format!(
        "resource={resource}/partition={}/{}/id={id}",
        spec.name,
        tokens.join("/")
    )))
}

fn lookup<'a>(record: &'a BTreeMap<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        match current {
            Value::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::PartitionField;

    #[test]
    fn multi_field_partition_is_sorted_alphabetically_and_truncated() {
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
        let mut record = BTreeMap::new();
        record.insert("region".to_string(), Value::String("US-WEST".to_string()));
        record.insert(
            "department".to_string(),
            Value::String("engineering".to_string()),
        );
        let key = partition_reference_key("users", &spec, &record, "abc123")
            .unwrap()
            .unwrap();
        assert_eq!(
            key,
            "resource=users/partition=byRegionDept/department=engineering/region=US/id=abc123"
        );
    }

    #[test]
    fn missing_field_skips_the_partition_entry() {
        let spec = PartitionSpec {
            name: "byRegion".to_string(),
            fields: vec![PartitionField {
                field: "region".to_string(),
                rule: PartitionRule::String,
            }],
        };
        let record = BTreeMap::new();
        assert!(partition_reference_key("users", &spec, &record, "id")
            .unwrap()
            .is_none());
    }

    #[test]
    fn primary_key_matches_grammar() {
        assert_eq!(
            primary_key("users", "abc", "123"),
            "resource=users/v=abc/id=123"
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn field_name_strategy() -> impl Strategy<Value = String> {
            prop_oneof![Just("region"), Just("department"), Just("tier")].prop_map(String::from)
        }

        fn token_value_strategy() -> impl Strategy<Value = String> {
            "[a-zA-Z]{1,8}"
        }

        prop_compose! {
            fn arb_partition_and_record()(
                mut names in prop::collection::vec(field_name_strategy(), 1..=3)
                    .prop_map(|mut v| { v.sort(); v.dedup(); v }),
                values in prop::collection::vec(token_value_strategy(), 3),
            ) -> (Vec<String>, Vec<String>) {
                names.truncate(values.len().min(names.len()));
                (names, values)
            }
        }

        proptest! {
            #[test]
            fn partition_key_is_independent_of_field_declaration_order(
                (names, values) in arb_partition_and_record()
            ) {
                prop_assume!(!names.is_empty());
                let fields: Vec<PartitionField> = names
                    .iter()
                    .zip(values.iter())
                    .map(|(name, _)| PartitionField {
                        field: name.clone(),
                        rule: PartitionRule::String,
                    })
                    .collect();
                let mut record = BTreeMap::new();
                for (name, value) in names.iter().zip(values.iter()) {
                    record.insert(name.clone(), Value::String(value.clone()));
                }

                let forward = PartitionSpec {
                    name: "byFields".to_string(),
                    fields: fields.clone(),
                };
                let mut reversed_fields = fields.clone();
                reversed_fields.reverse();
                let reversed = PartitionSpec {
                    name: "byFields".to_string(),
                    fields: reversed_fields,
                };

                let forward_key = partition_reference_key("users", &forward, &record, "id1").unwrap();
                let reversed_key = partition_reference_key("users", &reversed, &record, "id1").unwrap();
                prop_assert_eq!(forward_key, reversed_key);
            }
        }
    }
}
