/*!
The definition hash: `sha256(stable_json({attributes, behavior, partitions}))`
(spec.md §3, "Definition hash"). Stable JSON means object keys are sorted
recursively regardless of the serializer's native key order, so two
structurally identical schemas always hash identically (spec.md §8 law 6).
*/

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::behavior::Behavior;
use crate::error::Result;
use crate::partition::PartitionSpec;
use crate::schema::AttributeTree;

#[derive(Serialize)]
struct Definition<'a> {
    attributes: &'a AttributeTree,
    behavior: &'a Behavior,
    partitions: &'a [PartitionSpec],
}

/// Recursively sort every JSON object's keys so the resulting value
/// serialises identically regardless of field-declaration or map-insertion
/// order.
fn canonicalize(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<String, serde_json::Value> = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(canonicalize).collect())
        }
        other => other,
    }
}

/// Serialise `{attributes, behavior, partitions}` as stable JSON and hash it.
pub fn definition_hash(
    attributes: &AttributeTree,
    behavior: &Behavior,
    partitions: &[PartitionSpec],
) -> Result<String> {
    let definition = Definition {
        attributes,
        behavior,
        partitions,
    };
    let value = serde_json::to_value(definition)?;
    let canonical = canonicalize(value);
    let bytes = serde_json::to_vec(&canonical)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AttributeType;
    use crate::schema::AttributeNode;

    fn tree_a() -> AttributeTree {
        let mut t = AttributeTree::new();
        t.insert(
            "name".to_string(),
            AttributeNode::Leaf(AttributeType::String { max_len: None }),
        );
        t.insert(
            "age".to_string(),
            AttributeNode::Leaf(AttributeType::Number { precision: None }),
        );
        t
    }

    #[test]
    fn identical_schemas_hash_identically() {
        let h1 = definition_hash(&tree_a(), &Behavior::Warn, &[]).unwrap();
        let h2 = definition_hash(&tree_a(), &Behavior::Warn, &[]).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn different_behaviors_hash_differently() {
        let h1 = definition_hash(&tree_a(), &Behavior::Warn, &[]).unwrap();
        let h2 = definition_hash(&tree_a(), &Behavior::EnforceLimit, &[]).unwrap();
        assert_ne!(h1, h2);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn attr_name_strategy() -> impl Strategy<Value = String> {
            "[a-z]{3,8}"
        }

        prop_compose! {
            fn arb_attribute_names()(names in prop::collection::btree_set(attr_name_strategy(), 1..=6)) -> Vec<String> {
                names.into_iter().collect()
            }
        }

        fn tree_from_names(names: &[String]) -> AttributeTree {
            names
                .iter()
                .map(|n| (n.clone(), AttributeNode::Leaf(AttributeType::String { max_len: None })))
                .collect()
        }

        proptest! {
            #[test]
            fn hash_is_stable_regardless_of_insertion_order(names in arb_attribute_names()) {
                let forward = tree_from_names(&names);
                let mut reversed_names = names.clone();
                reversed_names.reverse();
                let reversed = tree_from_names(&reversed_names);

                let h1 = definition_hash(&forward, &Behavior::Warn, &[]).unwrap();
                let h2 = definition_hash(&reversed, &Behavior::Warn, &[]).unwrap();
                prop_assert_eq!(h1.clone(), h2);
                prop_assert_eq!(h1.len(), 64);
            }
        }
    }
}
