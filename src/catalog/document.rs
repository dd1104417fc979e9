/*!
The catalog document (spec.md §3 "Catalog document", §6 "Catalog file
format"): a single UTF-8 JSON object at a well-known key holding the format
version, engine version, every resource's version history, and opaque
plugin sub-trees.
*/

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::behavior::Behavior;
use crate::catalog::events::{ResourceDefinitionsDiff, ResourceHashChange};
use crate::catalog::healing;
use crate::error::{Error, Result};
use crate::partition::PartitionSpec;
use crate::schema::hash::definition_hash;
use crate::schema::AttributeTree;
use crate::store::ObjectStoreCapability;

/// The format version this crate writes. Bumped only on a breaking change
/// to the document shape itself.
pub const FORMAT_VERSION: &str = "1";

/// This crate's own version, stamped into every catalog it writes.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One schema version of a resource (spec.md §6, "Each resource entry").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// The attribute tree at this version.
    pub schema: AttributeTree,
    /// The behavior in force at this version.
    pub behavior: Behavior,
    /// The partitions declared at this version.
    pub partitions: Vec<PartitionSpec>,
    /// Whether `created_at`/`updated_at` stamping was enabled.
    pub timestamps: bool,
    /// Whether deletes are logical (tombstoned) at this version.
    pub paranoid: bool,
    /// When this version was allocated.
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// A resource's full version history (spec.md §3, "Catalog document").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    /// The definition hash of the currently active version.
    #[serde(rename = "currentVersion")]
    pub current_version: String,
    /// Every version this resource has ever had, keyed by definition hash.
    pub versions: BTreeMap<String, VersionEntry>,
}

/// The catalog document itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    /// The document format version.
    pub version: String,
    /// The engine version that last wrote this document.
    #[serde(rename = "engineVersion")]
    pub engine_version: String,
    /// Every resource, keyed by name.
    pub resources: BTreeMap<String, ResourceEntry>,
    /// Plugin-owned opaque sub-trees, keyed by plugin name. Never
    /// interpreted by the core.
    pub plugins: BTreeMap<String, serde_json::Value>,
    /// Unknown top-level keys, preserved verbatim on rewrite for
    /// forward-compatibility (spec.md §3).
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

impl CatalogDocument {
    /// A fresh, empty document.
    pub fn empty() -> Self {
        CatalogDocument {
            version: FORMAT_VERSION.to_string(),
            engine_version: ENGINE_VERSION.to_string(),
            resources: BTreeMap::new(),
            plugins: BTreeMap::new(),
            unknown: BTreeMap::new(),
        }
    }
}

/// Validate the invariants spec.md §3 requires of a catalog document.
pub fn validate(document: &CatalogDocument) -> Result<()> {
    for (name, entry) in &document.resources {
        let current = entry.versions.get(&entry.current_version).ok_or_else(|| {
            Error::CatalogCorrupt(format!(
                "resource `{name}`: current_version `{}` has no matching entry in versions",
                entry.current_version
            ))
        })?;

        for (hash, version) in &entry.versions {
            let recomputed = definition_hash(&version.schema, &version.behavior, &version.partitions)?;
            if &recomputed != hash {
                return Err(Error::CatalogCorrupt(format!(
                    "resource `{name}`: version `{hash}` does not match its recomputed definition hash `{recomputed}`"
                )));
            }
        }
        let _ = current;
    }
    Ok(())
}

/// Fetch and parse the catalog document at `key`. On parse failure, runs
/// the bounded self-healing pipeline (spec.md §4.8) after writing a
/// timestamped backup of the broken document; if recovery also fails, the
/// engine refuses to initialise.
#[tracing::instrument(skip(store))]
pub async fn load(store: &dyn ObjectStoreCapability, key: &str) -> Result<CatalogDocument> {
    let raw = match store.get(key).await {
        Ok(object) => object.body,
        Err(Error::NotFound { .. }) => {
            tracing::info!(%key, "no catalog document found, creating an empty one");
            let document = CatalogDocument::empty();
            save(store, key, &document).await?;
            return Ok(document);
        }
        Err(err) => return Err(err),
    };

    match serde_json::from_slice::<CatalogDocument>(&raw) {
        Ok(document) => {
            validate(&document)?;
            Ok(document)
        }
        Err(parse_err) => {
            tracing::warn!(%key, error = %parse_err, "catalog document failed to parse, attempting self-heal");
            let backup_key = format!("{key}.broken.{}", Utc::now().format("%Y%m%dT%H%M%S%.fZ"));
            store.put(&backup_key, &BTreeMap::new(), Some(raw.clone()), None).await?;

            let repaired = healing::repair(std::str::from_utf8(&raw).map_err(|_| {
                Error::CatalogCorrupt(format!("catalog at `{key}` is not valid UTF-8"))
            })?);

            let healed = serde_json::from_str::<CatalogDocument>(&repaired)
                .map_err(|_| {
                    Error::CatalogCorrupt(format!(
                        "catalog at `{key}` failed to parse ({parse_err}) and could not be repaired"
                    ))
                })
                .and_then(|document| {
                    validate(&document)?;
                    Ok(document)
                });
            match &healed {
                Ok(_) => tracing::info!(%key, %backup_key, "catalog document repaired"),
                Err(err) => tracing::error!(%key, %backup_key, %err, "catalog self-heal failed"),
            }
            healed
        }
    }
}

/// Persist `document` as stable-sorted JSON. `BTreeMap` fields already
/// serialise in sorted key order, so this alone satisfies "stable JSON"
/// (spec.md §3) without a separate canonicalisation pass.
pub async fn save(store: &dyn ObjectStoreCapability, key: &str, document: &CatalogDocument) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(document)?;
    store
        .put(key, &BTreeMap::new(), Some(bytes.into()), Some("application/json"))
        .await?;
    Ok(())
}

/// Compare every resource's stored definition hash against the hash
/// recomputed from `desired` (the in-memory configuration the engine was
/// reconnected with), producing a [`ResourceDefinitionsDiff`] (spec.md §4.8,
/// "Change detection").
pub fn detect_changes(
    document: &CatalogDocument,
    desired: &BTreeMap<String, (AttributeTree, Behavior, Vec<PartitionSpec>)>,
) -> Result<ResourceDefinitionsDiff> {
    let mut diff = ResourceDefinitionsDiff::default();

    for (name, (attributes, behavior, partitions)) in desired {
        let recomputed = definition_hash(attributes, behavior, partitions)?;
        match document.resources.get(name) {
            None => diff.new.push(name.clone()),
            Some(entry) if entry.current_version != recomputed => {
                diff.changed.push(ResourceHashChange {
                    name: name.clone(),
                    from: entry.current_version.clone(),
                    to: recomputed,
                });
            }
            Some(_) => {}
        }
    }

    for name in document.resources.keys() {
        if !desired.contains_key(name) {
            diff.removed.push(name.clone());
        }
    }

    Ok(diff)
}

/// Create or version a resource. If `name` does not yet exist, a fresh
/// entry is inserted. If it exists and the computed hash differs from the
/// current version, a new version entry is allocated, marked current, and
/// the previous version remains reachable under `versions` (spec.md §4.8,
/// "Version lifecycle"). Returns `true` when a new version was allocated.
pub fn create_or_update_resource(
    document: &mut CatalogDocument,
    name: &str,
    attributes: AttributeTree,
    behavior: Behavior,
    partitions: Vec<PartitionSpec>,
    timestamps: bool,
    paranoid: bool,
) -> Result<bool> {
    let hash = definition_hash(&attributes, &behavior, &partitions)?;
    let version = VersionEntry {
        schema: attributes,
        behavior,
        partitions,
        timestamps,
        paranoid,
        created_at: Utc::now(),
    };

    match document.resources.get_mut(name) {
        Some(entry) if entry.current_version == hash => Ok(false),
        Some(entry) => {
            entry.versions.insert(hash.clone(), version);
            entry.current_version = hash;
            Ok(true)
        }
        None => {
            let mut versions = BTreeMap::new();
            versions.insert(hash.clone(), version);
            document.resources.insert(
                name.to_string(),
                ResourceEntry {
                    current_version: hash,
                    versions,
                },
            );
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttributeNode;
    use crate::store::memory::MemoryStore;

    fn tree() -> AttributeTree {
        let mut t = AttributeTree::new();
        t.insert(
            "name".to_string(),
            AttributeNode::Leaf(crate::codec::AttributeType::String { max_len: None }),
        );
        t
    }

    #[tokio::test]
    async fn loading_a_missing_catalog_creates_an_empty_one() {
        let store = MemoryStore::new();
        let document = load(&store, "s3db.json").await.unwrap();
        assert!(document.resources.is_empty());
        assert!(store.get("s3db.json").await.is_ok());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = MemoryStore::new();
        let mut document = CatalogDocument::empty();
        create_or_update_resource(&mut document, "users", tree(), Behavior::Warn, vec![], false, false).unwrap();
        save(&store, "s3db.json", &document).await.unwrap();

        let reloaded = load(&store, "s3db.json").await.unwrap();
        assert_eq!(reloaded.resources.len(), 1);
        assert!(validate(&reloaded).is_ok());
    }

    #[test]
    fn new_version_is_allocated_only_when_hash_changes() {
        let mut document = CatalogDocument::empty();
        let changed =
            create_or_update_resource(&mut document, "users", tree(), Behavior::Warn, vec![], false, false).unwrap();
        assert!(changed);
        let unchanged =
            create_or_update_resource(&mut document, "users", tree(), Behavior::Warn, vec![], false, false).unwrap();
        assert!(!unchanged);
        assert_eq!(document.resources["users"].versions.len(), 1);

        let mut t2 = tree();
        t2.insert(
            "age".to_string(),
            AttributeNode::Leaf(crate::codec::AttributeType::Number { precision: None }),
        );
        let changed = create_or_update_resource(&mut document, "users", t2, Behavior::Warn, vec![], false, false).unwrap();
        assert!(changed);
        assert_eq!(document.resources["users"].versions.len(), 2);
    }

    #[test]
    fn detects_changed_resource_definitions() {
        let mut document = CatalogDocument::empty();
        create_or_update_resource(&mut document, "users", tree(), Behavior::Warn, vec![], false, false).unwrap();

        let mut desired = BTreeMap::new();
        let mut t2 = tree();
        t2.insert(
            "age".to_string(),
            AttributeNode::Leaf(crate::codec::AttributeType::Number { precision: None }),
        );
        desired.insert("users".to_string(), (t2, Behavior::Warn, vec![]));

        let diff = detect_changes(&document, &desired).unwrap();
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].name, "users");
    }
}
