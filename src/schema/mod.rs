/*!
The schema compiler (spec.md §4.3, component C3).

An [`AttributeTree`] is the user-authored shape of a resource's attributes:
leaves carry an [`AttributeType`](crate::codec::AttributeType), interior
nodes are plain nested maps with no type tag of their own — the compiler's
pre-pass (`flat_map`) rewrites every untagged sub-tree into an explicit
`object` descriptor, per the "magic type auto-detection" design note.

[`compile`] turns an [`AttributeTree`] plus a [`Behavior`](crate::behavior::Behavior)
and a [`PartitionSpec`](crate::partition::PartitionSpec) set into a
[`CompiledSchema`]: the flat map, the short-key tables, the validator, the
definition hash, and the rehydrated hooks. Everything in a [`CompiledSchema`]
is immutable once built, so it is `Send + Sync` for free and safe to share
across threads without synchronisation (spec.md §5).
*/

pub mod flat_map;
pub mod hash;
pub mod hooks;
pub mod validator;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::behavior::Behavior;
use crate::codec::AttributeType;
use crate::error::Result;
use crate::partition::PartitionSpec;
use crate::schema::flat_map::{FlatEntry, ShortKeyTable};
use crate::schema::hooks::HookSet;
use crate::schema::validator::Validator;

/// A node in the user-authored attribute tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeNode {
    /// A typed leaf.
    Leaf(AttributeType),
    /// An untagged interior node, auto-detected as `object` by the compiler.
    Object(BTreeMap<String, AttributeNode>),
}

/// The user-authored attribute tree, keyed by top-level attribute name.
pub type AttributeTree = BTreeMap<String, AttributeNode>;

/// The immutable output of compiling an [`AttributeTree`].
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    /// The original, unflattened tree, preserved verbatim for round-tripping
    /// into the catalog document.
    pub attributes: AttributeTree,
    /// Dotted-path → type descriptor, parents included.
    pub flat_map: Vec<FlatEntry>,
    /// Bidirectional short-key tables derived from `flat_map`.
    pub short_keys: ShortKeyTable,
    /// The pre-compiled validator.
    pub validator: Validator,
    /// `sha256(stable_json({attributes, behavior, partitions}))`.
    pub definition_hash: String,
    /// The resource's chosen behavior.
    pub behavior: Behavior,
    /// The resource's declared partitions.
    pub partitions: Vec<PartitionSpec>,
    /// Rehydrated pre/post operation hooks.
    pub hooks: HookSet,
}

/// Compile an [`AttributeTree`] plus its behavior and partitions into a
/// [`CompiledSchema`]. Two structurally identical schemas compile to
/// identical `definition_hash`es and identical short-key tables (spec.md §8
/// law 6), because `flat_map` is derived from a sorted projection of the
/// tree and short keys are assigned in that sorted order.
///
/// Compilation does not reject a partition whose declared fields are absent
/// from `attributes`: a schema update that drops a field a partition still
/// references must compile (the previous version's records, and the stale
/// partition references themselves, still exist in the store), and is
/// instead caught on the record hot path as an orphaned partition (spec.md
/// §4.6, "Orphan detection"; see [`CompiledSchema::orphaned_partition`]).
pub fn compile(
    attributes: AttributeTree,
    behavior: Behavior,
    partitions: Vec<PartitionSpec>,
    hooks: HookSet,
) -> Result<CompiledSchema> {
    let flat_map = flat_map::flatten(&attributes);
    let short_keys = flat_map::assign_short_keys(&flat_map);
    let validator = validator::compile(&flat_map)?;
    let definition_hash = hash::definition_hash(&attributes, &behavior, &partitions)?;

    Ok(CompiledSchema {
        attributes,
        flat_map,
        short_keys,
        validator,
        definition_hash,
        behavior,
        partitions,
        hooks,
    })
}

impl CompiledSchema {
    /// The first declared partition whose fields are no longer present in
    /// `flat_map`, if any (spec.md §4.6, "Orphan detection"). Cheap: a plain
    /// field-name lookup per declared partition, suitable for the record
    /// hot path rather than the full reference-object scan
    /// `partition::engine::find_orphaned_partitions` performs.
    pub fn orphaned_partition(&self) -> Option<&PartitionSpec> {
        self.partitions
            .iter()
            .find(|spec| spec.validate_against(&self.flat_map).is_err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AttributeType;

    fn sample_tree() -> AttributeTree {
        let mut profile = BTreeMap::new();
        profile.insert(
            "bio".to_string(),
            AttributeNode::Leaf(AttributeType::String { max_len: None }),
        );
        profile.insert(
            "avatar".to_string(),
            AttributeNode::Leaf(AttributeType::String { max_len: None }),
        );

        let mut tree = BTreeMap::new();
        tree.insert(
            "name".to_string(),
            AttributeNode::Leaf(AttributeType::String { max_len: None }),
        );
        tree.insert("profile".to_string(), AttributeNode::Object(profile));
        tree
    }

    #[test]
    fn identical_schemas_compile_to_identical_hashes_and_short_keys() {
        let a = compile(
            sample_tree(),
            Behavior::Warn,
            Vec::new(),
            HookSet::default(),
        )
        .unwrap();
        let b = compile(
            sample_tree(),
            Behavior::Warn,
            Vec::new(),
            HookSet::default(),
        )
        .unwrap();
        assert_eq!(a.definition_hash, b.definition_hash);
        assert_eq!(
            a.short_keys.to_short("name"),
            b.short_keys.to_short("name")
        );
        assert_eq!(
            a.short_keys.to_short("profile.bio"),
            b.short_keys.to_short("profile.bio")
        );
    }

    #[test]
    fn compiling_tolerates_a_partition_field_dropped_from_the_schema() {
        use crate::partition::{PartitionField, PartitionRule};

        let partitions = vec![PartitionSpec {
            name: "byBio".to_string(),
            fields: vec![PartitionField {
                field: "profile.bio".to_string(),
                rule: PartitionRule::String,
            }],
        }];

        // `profile.bio` is present: the partition is not orphaned.
        let present = compile(sample_tree(), Behavior::Warn, partitions.clone(), HookSet::default()).unwrap();
        assert!(present.orphaned_partition().is_none());

        // Drop `profile.bio` from the tree entirely: compiling still
        // succeeds, but the partition is now reported as orphaned.
        let mut tree = sample_tree();
        let AttributeNode::Object(profile) = tree.get_mut("profile").unwrap() else {
            panic!("expected profile to be an object node");
        };
        profile.remove("bio");

        let orphaned = compile(tree, Behavior::Warn, partitions, HookSet::default()).unwrap();
        assert_eq!(orphaned.orphaned_partition().unwrap().name, "byBio");
    }
}
