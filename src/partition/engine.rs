/*!
Partition reference maintenance (spec.md §4.6): computing the target set of
reference keys for a record, diffing against what is already stored, and
issuing the create/delete operations. Orphan detection and cleanup are
exposed as out-of-band maintenance operations, never on the hot path.
*/

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::codec::Value;
use crate::error::Result;
use crate::partition::key::partition_reference_key;
use crate::partition::PartitionSpec;
use crate::schema::flat_map::FlatEntry;
use crate::store::ObjectStoreCapability;

/// The reserved user-metadata key a reference object stores its primary's
/// id under.
pub const BACK_POINTER_KEY: &str = "primary-id";

/// Compute every reference key `record` should occupy across `specs`.
pub fn target_keys(
    resource: &str,
    specs: &[PartitionSpec],
    record: &BTreeMap<String, Value>,
    id: &str,
) -> Result<BTreeSet<String>> {
    let mut keys = BTreeSet::new();
    for spec in specs {
        if let Some(key) = partition_reference_key(resource, spec, record, id)? {
            keys.insert(key);
        }
    }
    Ok(keys)
}

/// The result of diffing an old reference set against a new one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartitionDiff {
    /// Keys to write that were not present before.
    pub to_create: Vec<String>,
    /// Keys to delete that are no longer part of the target set.
    pub to_delete: Vec<String>,
}

/// Diff two reference-key sets (spec.md §4.6, "On update/patch/replace").
pub fn diff(old: &BTreeSet<String>, new: &BTreeSet<String>) -> PartitionDiff {
    PartitionDiff {
        to_create: new.difference(old).cloned().collect(),
        to_delete: old.difference(new).cloned().collect(),
    }
}

/// Apply a [`PartitionDiff`] to the object store: write empty-body
/// reference objects carrying a back-pointer to `primary_id`, then delete
/// the ones no longer needed.
pub async fn apply(
    store: &dyn ObjectStoreCapability,
    diff: &PartitionDiff,
    primary_id: &str,
) -> Result<()> {
    for key in &diff.to_create {
        let mut metadata = BTreeMap::new();
        metadata.insert(BACK_POINTER_KEY.to_string(), primary_id.to_string());
        store.put(key, &metadata, None, None).await?;
    }
    for key in &diff.to_delete {
        store.delete(key).await?;
    }
    Ok(())
}

/// A reference key found to be orphaned, along with why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrphanReason {
    /// The reference's back-pointer target no longer exists.
    MissingPrimary,
    /// The partition's declared fields are no longer in the schema.
    SchemaFieldRemoved,
}

/// A reference object found to be orphaned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanedReference {
    /// The reference object's key.
    pub key: String,
    /// Why it is considered orphaned.
    pub reason: OrphanReason,
}

/// Scan every reference under `resource`'s partition prefixes and report
/// orphans: references whose primary is missing, or whose partition's
/// fields are no longer in the schema (spec.md §4.6, "Orphan detection").
pub async fn find_orphaned_partitions(
    store: &dyn ObjectStoreCapability,
    resource: &str,
    specs: &[PartitionSpec],
    flat_map: &[FlatEntry],
) -> Result<Vec<OrphanedReference>> {
    let mut orphans = Vec::new();

    for spec in specs {
        let fields_still_valid = spec.validate_against(flat_map).is_ok();
        let prefix = format!("resource={resource}/partition={}/", spec.name);
        let mut continuation = None;
        loop {
            let page = store.list(&prefix, continuation.as_deref()).await?;
            for key in &page.keys {
                if !fields_still_valid {
                    orphans.push(OrphanedReference {
                        key: key.clone(),
                        reason: OrphanReason::SchemaFieldRemoved,
                    });
                    continue;
                }
                let head = store.head(key).await?;
                let primary_id = head.metadata.get(BACK_POINTER_KEY);
                let primary_exists = match primary_id {
                    Some(id) => {
                        let primary_key = format!("resource={resource}/v=");
                        store
                            .list(&primary_key, None)
                            .await
                            .map(|p| p.keys.iter().any(|k| k.ends_with(&format!("/id={id}"))))
                            .unwrap_or(false)
                    }
                    None => false,
                };
                if !primary_exists {
                    orphans.push(OrphanedReference {
                        key: key.clone(),
                        reason: OrphanReason::MissingPrimary,
                    });
                }
            }
            continuation = page.next_continuation;
            if continuation.is_none() {
                break;
            }
        }
    }

    Ok(orphans)
}

/// Delete every reference in `orphans`.
pub async fn remove_orphaned_partitions(
    store: Arc<dyn ObjectStoreCapability>,
    orphans: &[OrphanedReference],
) -> Result<()> {
    for orphan in orphans {
        store.delete(&orphan.key).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{PartitionField, PartitionRule};
    use crate::store::memory::MemoryStore;

    fn spec(name: &str, field: &str) -> PartitionSpec {
        PartitionSpec {
            name: name.to_string(),
            fields: vec![PartitionField {
                field: field.to_string(),
                rule: PartitionRule::String,
            }],
        }
    }

    #[test]
    fn diff_separates_creates_from_deletes() {
        let old: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let new: BTreeSet<String> = ["b", "c"].iter().map(|s| s.to_string()).collect();
        let d = diff(&old, &new);
        assert_eq!(d.to_create, vec!["c".to_string()]);
        assert_eq!(d.to_delete, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn missing_primary_is_reported_as_orphaned() {
        let store = MemoryStore::new();
        let specs = vec![spec("byRegion", "region")];
        let mut record = BTreeMap::new();
        record.insert("region".to_string(), Value::String("US".to_string()));
        let keys = target_keys("users", &specs, &record, "id1").unwrap();
        let created = PartitionDiff {
            to_create: keys.into_iter().collect(),
            to_delete: Vec::new(),
        };
        apply(&store, &created, "id1").await.unwrap();

        let flat_map = vec![FlatEntry {
            path: "region".to_string(),
            attr_type: crate::codec::AttributeType::String { max_len: None },
        }];
        let orphans = find_orphaned_partitions(&store, "users", &specs, &flat_map)
            .await
            .unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].reason, OrphanReason::MissingPrimary);
    }
}
