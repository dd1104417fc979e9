/*!
Flattening an [`AttributeTree`](crate::schema::AttributeTree) into a dotted-path
flat map, and deterministic short-key assignment over that flat map
(spec.md §3, "Short-key map").
*/

use std::collections::{BTreeMap, HashMap};

use crate::codec::base62;
use crate::codec::{AttributeType, Value};
use crate::schema::{AttributeNode, AttributeTree};

/// One entry of the flattened schema: a dotted path and the type descriptor
/// it resolves to. Interior paths carry [`AttributeType::Object`].
#[derive(Debug, Clone, PartialEq)]
pub struct FlatEntry {
    /// Dotted path, e.g. `profile.bio`.
    pub path: String,
    /// The resolved type descriptor at this path.
    pub attr_type: AttributeType,
}

/// Flatten an attribute tree into dotted-path entries, interior nodes
/// included as `object` entries so empty-object marker bytes have a
/// registered short key to decode against.
pub fn flatten(tree: &AttributeTree) -> Vec<FlatEntry> {
    let mut out = Vec::new();
    for (name, node) in tree {
        walk(name.clone(), node, &mut out);
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

fn walk(path: String, node: &AttributeNode, out: &mut Vec<FlatEntry>) {
    match node {
        AttributeNode::Leaf(attr_type) => out.push(FlatEntry {
            path,
            attr_type: attr_type.clone(),
        }),
        AttributeNode::Object(children) => {
            out.push(FlatEntry {
                path: path.clone(),
                attr_type: AttributeType::Object,
            });
            for (child_name, child_node) in children {
                walk(format!("{path}.{child_name}"), child_node, out);
            }
        }
    }
}

/// Bidirectional `dotted_path <-> short_key` table, derived deterministically
/// from a sorted flat map: two identical flat maps always assign identical
/// short keys (spec.md §8 law 6).
#[derive(Debug, Clone, Default)]
pub struct ShortKeyTable {
    to_short: HashMap<String, String>,
    from_short: HashMap<String, String>,
}

impl ShortKeyTable {
    /// Look up the short key for a dotted path.
    pub fn to_short(&self, path: &str) -> Option<&str> {
        self.to_short.get(path).map(String::as_str)
    }

    /// Look up the dotted path for a short key.
    pub fn from_short(&self, short_key: &str) -> Option<&str> {
        self.from_short.get(short_key).map(String::as_str)
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.to_short.len()
    }

    /// Whether the table has no registered entries.
    pub fn is_empty(&self) -> bool {
        self.to_short.is_empty()
    }
}

/// Assign short keys to a flat map's entries in sorted-path order. The flat
/// map passed here must already be sorted (as returned by [`flatten`]).
pub fn assign_short_keys(flat_map: &[FlatEntry]) -> ShortKeyTable {
    let mut table = ShortKeyTable::default();
    for (ordinal, entry) in flat_map.iter().enumerate() {
        let short_key = base62::encode_ordinal(ordinal as u64);
        table.to_short.insert(entry.path.clone(), short_key.clone());
        table.from_short.insert(short_key, entry.path.clone());
    }
    table
}

/// Flatten a nested value tree into dotted-path leaves, matching the shape
/// [`flatten`] assigns to the schema. Interior object nodes are walked but
/// not themselves emitted — the schema registers their short key, but a
/// value-tree walk only needs leaves.
pub fn flatten_values(tree: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for (name, value) in tree {
        walk_value(name.clone(), value, &mut out);
    }
    out
}

fn walk_value(path: String, value: &Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(children) if !children.is_empty() => {
            for (child_name, child_value) in children {
                walk_value(format!("{path}.{child_name}"), child_value, out);
            }
        }
        other => {
            out.insert(path, other.clone());
        }
    }
}

/// Inverse of [`flatten_values`]: rebuild a nested value tree from
/// dotted-path leaves.
pub fn unflatten_values(flat: BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    let mut root: BTreeMap<String, Value> = BTreeMap::new();
    for (path, value) in flat {
        let mut segments: Vec<&str> = path.split('.').collect();
        let leaf_name = segments.pop().expect("path is non-empty");
        let mut cursor = &mut root;
        for segment in segments {
            let entry = cursor
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(BTreeMap::new()));
            let Value::Object(children) = entry else {
                unreachable!("interior path segments are always objects");
            };
            cursor = children;
        }
        cursor.insert(leaf_name.to_string(), value);
    }
    root
}
