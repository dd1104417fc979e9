/*!
The pre-compiled validator (spec.md §4.3): walks a candidate record against
the flat map's leaf type descriptors and produces ordered [`FieldError`]s.
*/

use std::collections::BTreeMap;

use crate::codec::{AttributeType, Value};
use crate::error::Result;
use crate::schema::flat_map::FlatEntry;

/// One validation failure, addressed by dotted path.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    /// Dotted path of the offending leaf.
    pub path: String,
    /// Human-readable description of the violation.
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// A pre-compiled validator over a resource's leaf type descriptors.
#[derive(Debug, Clone)]
pub struct Validator {
    leaves: Vec<FlatEntry>,
}

/// Build a [`Validator`] from a flattened schema. Object entries are
/// skipped — they describe structure, not a checkable value.
pub fn compile(flat_map: &[FlatEntry]) -> Result<Validator> {
    let leaves = flat_map
        .iter()
        .filter(|entry| entry.attr_type != AttributeType::Object)
        .cloned()
        .collect();
    Ok(Validator { leaves })
}

impl Validator {
    /// Validate a record (keyed by top-level attribute name) against every
    /// declared leaf, returning all violations found, in leaf order.
    pub fn validate(&self, record: &BTreeMap<String, Value>) -> Vec<FieldError> {
        let mut errors = Vec::new();
        for leaf in &self.leaves {
            let Some(value) = lookup_path(record, &leaf.path) else {
                continue;
            };
            if let Err(message) = check_leaf(&leaf.attr_type, value) {
                errors.push(FieldError {
                    path: leaf.path.clone(),
                    message,
                });
            }
        }
        errors
    }
}

fn lookup_path<'a>(record: &'a BTreeMap<String, Value>, path: &str) -> Option<&'a Value> {
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

fn check_leaf(attr_type: &AttributeType, value: &Value) -> std::result::Result<(), String> {
    match attr_type {
        AttributeType::String { max_len } => match value {
            Value::String(s) => {
                if let Some(max) = max_len {
                    if s.chars().count() > *max {
                        return Err(format!(
                            "string exceeds declared max length {max}"
                        ));
                    }
                }
                Ok(())
            }
            _ => Err("expected a string".to_string()),
        },
        AttributeType::Number { .. } => match value {
            Value::Int(_) | Value::Float(_) => Ok(()),
            _ => Err("expected a number".to_string()),
        },
        AttributeType::Embedding { dimension } => match value {
            Value::Array(items) if items.len() == *dimension => Ok(()),
            Value::Array(items) => Err(format!(
                "embedding has {} components, expected {dimension}",
                items.len()
            )),
            _ => Err("expected an embedding array".to_string()),
        },
        AttributeType::Array(inner) => match value {
            Value::Array(items) => {
                for item in items {
                    check_leaf(inner, item)?;
                }
                Ok(())
            }
            _ => Err("expected an array".to_string()),
        },
        AttributeType::Dictionary(inner) => check_leaf(inner, value),
        AttributeType::Object => Ok(()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::flat_map::flatten;
    use crate::schema::{AttributeNode, AttributeTree};

    fn tree() -> AttributeTree {
        let mut root: AttributeTree = BTreeMap::new();
        root.insert(
            "region".to_string(),
            AttributeNode::Leaf(AttributeType::String { max_len: Some(2) }),
        );
        root
    }

    #[test]
    fn rejects_string_over_max_length() {
        let validator = compile(&flatten(&tree())).unwrap();
        let mut record = BTreeMap::new();
        record.insert("region".to_string(), Value::String("US-WEST".to_string()));
        let errors = validator.validate(&record);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "region");
    }

    #[test]
    fn accepts_value_within_declared_length() {
        let validator = compile(&flatten(&tree())).unwrap();
        let mut record = BTreeMap::new();
        record.insert("region".to_string(), Value::String("US".to_string()));
        assert!(validator.validate(&record).is_empty());
    }

    #[test]
    fn missing_optional_fields_are_not_errors() {
        let validator = compile(&flatten(&tree())).unwrap();
        let record = BTreeMap::new();
        assert!(validator.validate(&record).is_empty());
    }
}
