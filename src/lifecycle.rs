/*!
The record lifecycle (spec.md §4.7, component C7): insert, get, update,
patch, replace, delete, list, and query, composed from the schema,
behavior, partition, and object-store layers.
*/

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::behavior::{Behavior, WriteContext};
use crate::catalog::events::{DeleteMode, Event, EventBus};
use crate::codec::{self, secret, AttributeType, Value};
use crate::error::{Error, Result};
use crate::partition::engine as partition_engine;
use crate::partition::key::{partition_reference_key, primary_key};
use crate::partition::PartitionSpec;
use crate::record::{extended as extended_meta, headers, Body, Envelope, Record};
use crate::schema::flat_map::{flatten_values, unflatten_values};
use crate::schema::hooks::{HookPhase, RehydratedHooks};
use crate::schema::CompiledSchema;
use crate::size::DEFAULT_METADATA_BUDGET;
use crate::store::ObjectStoreCapability;
use tracing::{debug, warn};

/// Maximum number of in-flight primary fetches a `query` fans out at once.
const QUERY_CONCURRENCY: usize = 16;

/// A live, queryable resource: its compiled schema bound to a store and an
/// event bus. Everything here is immutable after construction and safe to
/// share across threads (spec.md §5).
pub struct ResourceHandle {
    /// The resource's unique name.
    pub name: String,
    /// The compiled schema this handle encodes/decodes against.
    pub schema: Arc<CompiledSchema>,
    store: Arc<dyn ObjectStoreCapability>,
    events: Arc<EventBus>,
    /// Whether `created_at`/`updated_at` are stamped and auto-partitions run.
    pub timestamps_enabled: bool,
    /// Whether `delete` tombstones rather than hard-deletes.
    pub paranoid_delete: bool,
    /// Whether partition reference writes are fire-and-forget.
    pub async_partitions: bool,
    /// The metadata budget in bytes.
    pub metadata_budget: usize,
    /// Key material for the `secret` codec, if this schema declares any.
    pub secret_key: Option<secret::AesKeyMaterial>,
    /// Pre/post operation hooks, rehydrated against an embedder-supplied
    /// registry at resource-open time.
    pub hooks: RehydratedHooks,
}

impl ResourceHandle {
    /// Construct a handle over an already-compiled schema.
    pub fn new(
        name: impl Into<String>,
        schema: Arc<CompiledSchema>,
        store: Arc<dyn ObjectStoreCapability>,
        events: Arc<EventBus>,
        timestamps_enabled: bool,
        paranoid_delete: bool,
        async_partitions: bool,
    ) -> Self {
        ResourceHandle {
            name: name.into(),
            schema,
            store,
            events,
            timestamps_enabled,
            paranoid_delete,
            async_partitions,
            metadata_budget: DEFAULT_METADATA_BUDGET,
            secret_key: None,
            hooks: RehydratedHooks::default(),
        }
    }

    fn primary_key(&self, id: &str) -> String {
        primary_key(&self.name, &self.schema.definition_hash, id)
    }

    fn string_leaf_short_keys(&self) -> Vec<String> {
        self.schema
            .flat_map
            .iter()
            .filter(|e| matches!(e.attr_type, AttributeType::String { .. }))
            .filter_map(|e| self.schema.short_keys.to_short(&e.path))
            .map(str::to_string)
            .collect()
    }

    fn encode_fields(&self, flat_values: &BTreeMap<String, Value>) -> Result<BTreeMap<String, String>> {
        let mut fields = BTreeMap::new();
        for entry in &self.schema.flat_map {
            let Some(value) = flat_values.get(&entry.path) else {
                continue;
            };
            let short = self
                .schema
                .short_keys
                .to_short(&entry.path)
                .ok_or_else(|| Error::internal(format!("no short key for `{}`", entry.path)))?;
            let encoded = match &entry.attr_type {
                AttributeType::Object => codec::composite::EMPTY_OBJECT_MARKER.to_string(),
                AttributeType::Secret => {
                    let plain = value
                        .as_str()
                        .ok_or_else(|| Error::internal(format!("`{}` must be a string", entry.path)))?;
                    let key = self.secret_key.as_ref().ok_or_else(|| {
                        Error::internal("schema declares a `secret` field but no key material was configured")
                    })?;
                    secret::encrypt(plain, key)?
                }
                other => codec::encode_leaf(other, value)?,
            };
            fields.insert(short.to_string(), encoded);
        }
        Ok(fields)
    }

    fn decode_fields(&self, fields: &BTreeMap<String, String>) -> Result<BTreeMap<String, Value>> {
        let mut flat = BTreeMap::new();
        for (short, wire) in fields {
            let Some(path) = self.schema.short_keys.from_short(short) else {
                continue;
            };
            let Some(entry) = self.schema.flat_map.iter().find(|e| e.path == path) else {
                continue;
            };
            let decoded = match &entry.attr_type {
                AttributeType::Object => Value::Object(BTreeMap::new()),
                AttributeType::Secret => Value::String(wire.clone()),
                other => codec::decode_leaf(other, wire)?,
            };
            flat.insert(path.to_string(), decoded);
        }
        Ok(unflatten_values(flat))
    }

    fn combined_metadata(envelope: &Envelope) -> BTreeMap<String, String> {
        let mut metadata = envelope.fields.clone();
        metadata.extend(envelope.reserved.clone());
        metadata
    }

    async fn write_envelope(
        &self,
        id: &str,
        attributes: &BTreeMap<String, Value>,
        body: Option<&Body>,
        created_at: chrono::DateTime<Utc>,
        updated_at: chrono::DateTime<Utc>,
    ) -> Result<()> {
        let flat_values = flatten_values(attributes);
        let fields = self.encode_fields(&flat_values)?;

        let mut envelope = Envelope::new();
        envelope.fields = fields;
        envelope
            .reserved
            .insert(headers::SCHEMA_HASH.to_string(), self.schema.definition_hash.clone());
        if self.timestamps_enabled {
            envelope
                .reserved
                .insert(headers::CREATED_AT.to_string(), created_at.to_rfc3339());
            envelope
                .reserved
                .insert(headers::UPDATED_AT.to_string(), updated_at.to_rfc3339());
        }

        if body.is_some() && matches!(self.schema.behavior, Behavior::Overflow | Behavior::BodyOnly) {
            return Err(Error::internal(
                "a literal record body cannot be combined with Overflow/BodyOnly behaviors",
            ));
        }

        let string_leaf_keys = self.string_leaf_short_keys();
        let ctx = WriteContext {
            budget: self.metadata_budget,
            string_leaf_short_keys: &string_leaf_keys,
        };
        let outcome = self.schema.behavior.prepare_write(&mut envelope, &ctx)?;
        self.schema.behavior.finalize_write(&envelope, self.metadata_budget)?;
        if let Some(exceeds) = outcome {
            self.events.publish(Event::ExceedsLimit {
                resource: self.name.clone(),
                id: id.to_string(),
                size: exceeds.size,
                budget: exceeds.budget,
            });
        }

        let (body_bytes, content_type) = if let Some(body) = body {
            envelope
                .reserved
                .insert(headers::MIME.to_string(), body.content_type.clone());
            (Some(body.bytes.clone()), Some(body.content_type.clone()))
        } else {
            let content_type = envelope.reserved.get(headers::MIME).cloned();
            (envelope.body.clone(), content_type)
        };

        let metadata = Self::combined_metadata(&envelope);
        self.store
            .put(&self.primary_key(id), &metadata, body_bytes.map(Bytes::from), content_type.as_deref())
            .await?;
        Ok(())
    }

    async fn apply_partitions(&self, id: &str, old: &BTreeSet<String>, attributes: &BTreeMap<String, Value>) -> Result<BTreeSet<String>> {
        let target = partition_engine::target_keys(&self.name, &self.schema.partitions, attributes, id)?;
        let diff = partition_engine::diff(old, &target);
        let outcome = partition_engine::apply(self.store.as_ref(), &diff, id).await;
        match outcome {
            Ok(()) => Ok(target),
            Err(err) => {
                if self.async_partitions {
                    warn!(resource = %self.name, id = %id, error = %err, "partition reference write failed, continuing");
                    self.events.publish(Event::PartitionReferenceError {
                        resource: self.name.clone(),
                        id: id.to_string(),
                        partition: "unknown".to_string(),
                        cause: err.to_string(),
                    });
                    Ok(target)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn existing_partition_keys(&self, id: &str, attributes: &BTreeMap<String, Value>) -> Result<BTreeSet<String>> {
        let mut keys = BTreeSet::new();
        for spec in &self.schema.partitions {
            if let Some(key) = partition_reference_key(&self.name, spec, attributes, id)? {
                keys.insert(key);
            }
        }
        Ok(keys)
    }

    /// **insert** — validate, encode, run the behavior, write the primary,
    /// write partition references, return the stored record. Blocked with
    /// [`Error::OrphanedPartitionBlocked`] while any declared partition
    /// references a field no longer in the schema.
    #[tracing::instrument(skip(self, record), fields(resource = %self.name, id = %record.id))]
    pub async fn insert(&self, mut record: Record) -> Result<Record> {
        if let Some(orphan) = self.schema.orphaned_partition() {
            return Err(Error::OrphanedPartitionBlocked(orphan.name.clone()));
        }
        self.hooks.run("insert", HookPhase::Pre, &mut record.attributes)?;

        let errors = self.schema.validator.validate(&record.attributes);
        if !errors.is_empty() {
            return Err(Error::ValidationFailed(errors));
        }

        let now = Utc::now();
        self.write_envelope(&record.id, &record.attributes, record.body.as_ref(), now, now)
            .await?;
        self.apply_partitions(&record.id, &BTreeSet::new(), &record.attributes).await?;

        record.definition_hash = self.schema.definition_hash.clone();
        if self.timestamps_enabled {
            record.created_at = Some(now);
            record.updated_at = Some(now);
        }

        self.hooks.run("insert", HookPhase::Post, &mut record.attributes)?;
        self.events.publish(Event::RecordWritten {
            resource: self.name.clone(),
            id: record.id.clone(),
            op: "insert",
            version: self.schema.definition_hash.clone(),
        });
        debug!("record inserted");
        Ok(record)
    }

    /// **get** — read the primary, fetch the body if the behavior requires
    /// it, decode, and return.
    pub async fn get(&self, id: &str) -> Result<Record> {
        let object = self.store.get(&self.primary_key(id)).await?;
        let mut fields = object.head.metadata.clone();
        if self.schema.behavior.prepare_read(&fields) {
            self.schema.behavior.merge_read(&mut fields, Some(&object.body))?;
        }

        let attributes = self.decode_fields(&fields)?;
        let created_at = fields
            .get(headers::CREATED_AT)
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));
        let updated_at = fields
            .get(headers::UPDATED_AT)
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));
        let definition_hash = fields
            .get(headers::SCHEMA_HASH)
            .cloned()
            .unwrap_or_else(|| self.schema.definition_hash.clone());
        let mime_type = object
            .head
            .content_type
            .clone()
            .or_else(|| fields.get(headers::MIME).cloned());

        let mut extended = BTreeMap::new();
        extended.insert(
            extended_meta::CONTENT_LENGTH.to_string(),
            Value::Int(object.head.length as i64),
        );
        extended.insert(
            extended_meta::LAST_MODIFIED.to_string(),
            Value::String(object.head.last_modified.to_rfc3339()),
        );
        extended.insert(
            extended_meta::VERSION_ID.to_string(),
            object.head.version_id.clone().map(Value::String).unwrap_or(Value::Null),
        );
        extended.insert(
            extended_meta::HAS_CONTENT.to_string(),
            Value::Bool(object.head.length > 0),
        );
        extended.insert(
            extended_meta::DEFINITION_HASH.to_string(),
            Value::String(definition_hash.clone()),
        );
        extended.insert(
            extended_meta::MIME_TYPE.to_string(),
            mime_type.map(Value::String).unwrap_or(Value::Null),
        );

        Ok(Record {
            id: id.to_string(),
            attributes,
            body: None,
            definition_hash,
            created_at,
            updated_at,
            deleted_at: None,
            extended,
        })
    }

    /// **update** — fetch current, deep-merge `patch`, re-run the insert
    /// pipeline to the same key. Always merge-semantics.
    #[tracing::instrument(skip(self, patch), fields(resource = %self.name, id = %id))]
    pub async fn update(&self, id: &str, patch: BTreeMap<String, Value>) -> Result<Record> {
        let mut current = self.get(id).await?;
        let old_partition_keys = self.existing_partition_keys(id, &current.attributes).await?;
        deep_merge(&mut current.attributes, patch);
        self.hooks.run("update", HookPhase::Pre, &mut current.attributes)?;

        let errors = self.schema.validator.validate(&current.attributes);
        if !errors.is_empty() {
            return Err(Error::ValidationFailed(errors));
        }

        let now = Utc::now();
        let created_at = current.created_at.unwrap_or(now);
        self.write_envelope(id, &current.attributes, None, created_at, now).await?;
        self.apply_partitions(id, &old_partition_keys, &current.attributes).await?;

        current.updated_at = Some(now);
        current.definition_hash = self.schema.definition_hash.clone();
        self.hooks.run("update", HookPhase::Post, &mut current.attributes)?;

        self.events.publish(Event::RecordWritten {
            resource: self.name.clone(),
            id: id.to_string(),
            op: "update",
            version: self.schema.definition_hash.clone(),
        });
        Ok(current)
    }

    /// **patch** — metadata-only rewrite via `copy`, used when the behavior
    /// never touches the body. Rejects dot-notation patches that would drop
    /// sibling fields of a nested object rather than applying them lossily.
    /// Falls back to [`ResourceHandle::update`] otherwise.
    #[tracing::instrument(skip(self, patch), fields(resource = %self.name, id = %id))]
    pub async fn patch(&self, id: &str, patch: BTreeMap<String, Value>) -> Result<Record> {
        if !matches!(self.schema.behavior, Behavior::Warn | Behavior::EnforceLimit) {
            debug!("patch falling back to full update, behavior touches the body");
            return self.update(id, patch).await;
        }

        let head = self.store.head(&self.primary_key(id)).await?;
        let current_attributes = self.decode_fields(&head.metadata)?;

        for (key, value) in &patch {
            check_no_partial_object_drop(current_attributes.get(key), value, key)?;
        }

        let mut merged = current_attributes.clone();
        deep_merge(&mut merged, patch.clone());

        let errors = self.schema.validator.validate(&merged);
        if !errors.is_empty() {
            return Err(Error::ValidationFailed(errors));
        }

        let flat_patch = flatten_values(&patch);
        let patched_fields = self.encode_fields(&flat_patch)?;

        let mut metadata = head.metadata.clone();
        metadata.extend(patched_fields);
        let now = Utc::now();
        if self.timestamps_enabled {
            metadata.insert(headers::UPDATED_AT.to_string(), now.to_rfc3339());
        }

        let key = self.primary_key(id);
        self.store.copy(&key, &key, Some(&metadata)).await?;

        let old_partition_keys = self.existing_partition_keys(id, &current_attributes).await?;
        self.apply_partitions(id, &old_partition_keys, &merged).await?;

        let created_at = metadata
            .get(headers::CREATED_AT)
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));

        self.events.publish(Event::RecordWritten {
            resource: self.name.clone(),
            id: id.to_string(),
            op: "patch",
            version: self.schema.definition_hash.clone(),
        });

        let mut extended = BTreeMap::new();
        extended.insert(
            extended_meta::CONTENT_LENGTH.to_string(),
            Value::Int(head.length as i64),
        );
        extended.insert(
            extended_meta::LAST_MODIFIED.to_string(),
            Value::String(head.last_modified.to_rfc3339()),
        );
        extended.insert(
            extended_meta::VERSION_ID.to_string(),
            head.version_id.clone().map(Value::String).unwrap_or(Value::Null),
        );
        extended.insert(extended_meta::HAS_CONTENT.to_string(), Value::Bool(head.length > 0));
        extended.insert(
            extended_meta::DEFINITION_HASH.to_string(),
            Value::String(self.schema.definition_hash.clone()),
        );
        extended.insert(
            extended_meta::MIME_TYPE.to_string(),
            head.content_type.clone().map(Value::String).unwrap_or(Value::Null),
        );

        Ok(Record {
            id: id.to_string(),
            attributes: merged,
            body: None,
            definition_hash: self.schema.definition_hash.clone(),
            created_at,
            updated_at: Some(now),
            deleted_at: None,
            extended,
        })
    }

    /// **replace** — a single `put`, no merge; the record must be complete.
    #[tracing::instrument(skip(self, record), fields(resource = %self.name, id = %id))]
    pub async fn replace(&self, id: &str, mut record: Record) -> Result<Record> {
        self.hooks.run("replace", HookPhase::Pre, &mut record.attributes)?;
        let errors = self.schema.validator.validate(&record.attributes);
        if !errors.is_empty() {
            return Err(Error::ValidationFailed(errors));
        }

        let old_partition_keys = match self.get(id).await {
            Ok(previous) => self.existing_partition_keys(id, &previous.attributes).await?,
            Err(Error::NotFound { .. }) => BTreeSet::new(),
            Err(err) => return Err(err),
        };

        let now = Utc::now();
        self.write_envelope(id, &record.attributes, record.body.as_ref(), now, now).await?;
        self.apply_partitions(id, &old_partition_keys, &record.attributes).await?;

        record.id = id.to_string();
        record.definition_hash = self.schema.definition_hash.clone();
        record.updated_at = Some(now);
        self.hooks.run("replace", HookPhase::Post, &mut record.attributes)?;

        self.events.publish(Event::RecordWritten {
            resource: self.name.clone(),
            id: id.to_string(),
            op: "replace",
            version: self.schema.definition_hash.clone(),
        });
        Ok(record)
    }

    /// **delete** — hard-delete, or tombstone under `paranoid_delete`.
    #[tracing::instrument(skip(self), fields(resource = %self.name, id = %id))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut record = self.get(id).await?;
        self.hooks.run("delete", HookPhase::Pre, &mut record.attributes)?;
        let key = self.primary_key(id);

        if self.paranoid_delete {
            let tombstone_key = format!("{key}/deleted");
            let mut metadata = BTreeMap::new();
            metadata.insert(headers::DELETED_AT.to_string(), Utc::now().to_rfc3339());
            self.store.copy(&key, &tombstone_key, Some(&metadata)).await?;
            self.store.delete(&key).await?;
            self.events.publish(Event::RecordDeleted {
                resource: self.name.clone(),
                id: id.to_string(),
                mode: DeleteMode::Soft,
            });
        } else {
            self.store.delete(&key).await?;
            let partition_keys = self.existing_partition_keys(id, &record.attributes).await?;
            for reference in partition_keys {
                self.store.delete(&reference).await?;
            }
            self.events.publish(Event::RecordDeleted {
                resource: self.name.clone(),
                id: id.to_string(),
                mode: DeleteMode::Hard,
            });
        }
        self.hooks.run("delete", HookPhase::Post, &mut record.attributes)?;
        Ok(())
    }

    /// **list** — scan the primary prefix with pagination. Blocked with
    /// [`Error::OrphanedPartitionBlocked`] while any declared partition
    /// references a field no longer in the schema.
    pub async fn list(&self, continuation: Option<&str>) -> Result<(Vec<Record>, Option<String>)> {
        if let Some(orphan) = self.schema.orphaned_partition() {
            return Err(Error::OrphanedPartitionBlocked(orphan.name.clone()));
        }
        let prefix = format!("resource={}/v={}/", self.name, self.schema.definition_hash);
        let page = self.store.list(&prefix, continuation).await?;
        let mut records = Vec::with_capacity(page.keys.len());
        for key in &page.keys {
            let id = key.rsplit("id=").next().unwrap_or_default();
            records.push(self.get(id).await?);
        }
        Ok((records, page.next_continuation))
    }

    /// **query** — partition-scoped list: resolve every reference under a
    /// partition prefix back to its primary, with bounded concurrency.
    pub async fn query(&self, partition_name: &str, values: &BTreeMap<String, Value>) -> Result<Vec<Record>> {
        let spec = self
            .schema
            .partitions
            .iter()
            .find(|p| p.name == partition_name)
            .ok_or_else(|| Error::PartitionRuleInvalid(format!("unknown partition `{partition_name}`")))?;

        let key = partition_reference_key(&self.name, spec, values, "")
            .ok()
            .flatten()
            .ok_or_else(|| Error::PartitionRuleInvalid(format!("`{partition_name}` query is missing required fields")))?;
        let prefix = key.trim_end_matches("id=").to_string();

        let mut ids = Vec::new();
        let mut continuation = None;
        loop {
            let page = self.store.list(&prefix, continuation.as_deref()).await?;
            for reference_key in &page.keys {
                if let Some(id) = reference_key.rsplit("id=").next() {
                    ids.push(id.to_string());
                }
            }
            continuation = page.next_continuation;
            if continuation.is_none() {
                break;
            }
        }

        let results: Vec<Record> = stream::iter(ids)
            .map(|id| async move { self.get(&id).await })
            .buffer_unordered(QUERY_CONCURRENCY)
            .filter_map(|result| async move { result.ok() })
            .collect()
            .await;
        Ok(results)
    }
}

/// Deep-merge `patch` into `attributes` in place: nested objects merge
/// key-wise, everything else overwrites.
fn deep_merge(attributes: &mut BTreeMap<String, Value>, patch: BTreeMap<String, Value>) {
    for (key, patch_value) in patch {
        match (attributes.get_mut(&key), patch_value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, incoming) => {
                attributes.insert(key, incoming);
            }
        }
    }
}

/// Reject a patch that would silently drop sibling fields of a nested
/// object rather than extend it (spec.md §4.7).
fn check_no_partial_object_drop(current: Option<&Value>, patch_value: &Value, path: &str) -> Result<()> {
    let (Some(Value::Object(current_children)), Value::Object(patch_children)) = (current, patch_value) else {
        return Ok(());
    };
    if current_children.is_empty() {
        return Ok(());
    }
    let drops_a_sibling = current_children.keys().any(|k| !patch_children.contains_key(k));
    if drops_a_sibling {
        return Err(Error::PartialObjectPatchRejected(path.to_string()));
    }
    for (child_key, child_value) in patch_children {
        check_no_partial_object_drop(
            current_children.get(child_key),
            child_value,
            &format!("{path}.{child_key}"),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AttributeType;
    use crate::partition::{PartitionField, PartitionRule};
    use crate::schema::{self, hooks::HookSet, AttributeNode, AttributeTree};
    use crate::store::memory::MemoryStore;

    fn handle(behavior: Behavior, partitions: Vec<PartitionSpec>) -> ResourceHandle {
        let mut tree: AttributeTree = BTreeMap::new();
        tree.insert(
            "name".to_string(),
            AttributeNode::Leaf(AttributeType::String { max_len: None }),
        );
        tree.insert(
            "email".to_string(),
            AttributeNode::Leaf(AttributeType::String { max_len: None }),
        );
        tree.insert(
            "region".to_string(),
            AttributeNode::Leaf(AttributeType::String { max_len: Some(2) }),
        );
        let mut profile = BTreeMap::new();
        profile.insert(
            "bio".to_string(),
            AttributeNode::Leaf(AttributeType::String { max_len: None }),
        );
        profile.insert(
            "avatar".to_string(),
            AttributeNode::Leaf(AttributeType::String { max_len: None }),
        );
        tree.insert("profile".to_string(), AttributeNode::Object(profile));

        let compiled = schema::compile(tree, behavior, partitions, HookSet::default()).unwrap();
        ResourceHandle::new(
            "users",
            Arc::new(compiled),
            Arc::new(MemoryStore::new()),
            Arc::new(EventBus::default()),
            true,
            false,
            false,
        )
    }

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    #[tokio::test]
    async fn small_insert_and_get_round_trips() {
        init_tracing();
        let handle = handle(Behavior::Warn, vec![]);
        let record = Record::new(
            attrs(&[("name", "Alice"), ("email", "a@x"), ("region", "US")]),
            String::new(),
        );
        let inserted = handle.insert(record).await.unwrap();
        assert!(inserted.created_at.is_some());

        let fetched = handle.get(&inserted.id).await.unwrap();
        assert_eq!(fetched.attributes.get("name"), Some(&Value::String("Alice".to_string())));
        assert_eq!(fetched.attributes.get("region"), Some(&Value::String("US".to_string())));
        assert_eq!(
            fetched.extended.get(extended_meta::DEFINITION_HASH),
            Some(&Value::String(handle.schema.definition_hash.clone()))
        );
        assert_eq!(fetched.extended.get(extended_meta::HAS_CONTENT), Some(&Value::Bool(false)));
        assert!(fetched.extended.contains_key(extended_meta::LAST_MODIFIED));
    }

    #[tokio::test]
    async fn enforce_limit_rejects_oversize_inserts() {
        let handle = handle(Behavior::EnforceLimit, vec![]);
        let record = Record::new(
            {
                let mut a = attrs(&[("name", "Alice")]);
                a.insert("email".to_string(), Value::String("x".repeat(3000)));
                a.insert("region".to_string(), Value::String("US".to_string()));
                a
            },
            String::new(),
        );
        let result = handle.insert(record).await;
        assert!(matches!(result, Err(Error::MetadataTooLarge { .. })));
    }

    #[tokio::test]
    async fn multi_field_partition_reference_uses_canonical_key() {
        let spec = PartitionSpec {
            name: "byRegionDept".to_string(),
            fields: vec![
                PartitionField {
                    field: "region".to_string(),
                    rule: PartitionRule::StringMaxLength(2),
                },
                PartitionField {
                    field: "profile.bio".to_string(),
                    rule: PartitionRule::String,
                },
            ],
        };
        let handle = handle(Behavior::Warn, vec![spec]);
        let mut profile = BTreeMap::new();
        profile.insert("bio".to_string(), Value::String("engineering".to_string()));
        profile.insert("avatar".to_string(), Value::String("a".to_string()));
        let mut attributes = attrs(&[("name", "Alice"), ("email", "a@x"), ("region", "US-WEST")]);
        attributes.insert("profile".to_string(), Value::Object(profile));

        let record = Record::with_id("rec1", attributes, String::new());
        handle.insert(record).await.unwrap();

        let reference = handle
            .store
            .list("resource=users/partition=byRegionDept/", None)
            .await
            .unwrap();
        assert_eq!(reference.keys.len(), 1);
        assert!(reference.keys[0].contains("profile.bio=engineering"));
        assert!(reference.keys[0].contains("region=US"));
        assert!(reference.keys[0].ends_with("id=rec1"));
    }

    #[tokio::test]
    async fn patch_preserves_siblings_and_update_allows_full_replace() {
        let handle = handle(Behavior::Warn, vec![]);
        let mut profile = BTreeMap::new();
        profile.insert("bio".to_string(), Value::String("b".to_string()));
        profile.insert("avatar".to_string(), Value::String("a".to_string()));
        let mut attributes = attrs(&[("name", "Alice"), ("email", "a@x"), ("region", "US")]);
        attributes.insert("profile".to_string(), Value::Object(profile));
        let record = Record::with_id("rec1", attributes, String::new());
        handle.insert(record).await.unwrap();

        let mut bad_patch_profile = BTreeMap::new();
        bad_patch_profile.insert("bio".to_string(), Value::String("b2".to_string()));
        let mut bad_patch = BTreeMap::new();
        bad_patch.insert("profile".to_string(), Value::Object(bad_patch_profile));
        let result = handle.patch("rec1", bad_patch).await;
        assert!(matches!(result, Err(Error::PartialObjectPatchRejected(_))));

        let mut good_profile = BTreeMap::new();
        good_profile.insert("bio".to_string(), Value::String("b2".to_string()));
        good_profile.insert("avatar".to_string(), Value::String("a".to_string()));
        let mut good_patch = BTreeMap::new();
        good_patch.insert("profile".to_string(), Value::Object(good_profile));
        let updated = handle.update("rec1", good_patch).await.unwrap();
        let Value::Object(profile) = updated.attributes.get("profile").unwrap() else {
            panic!("expected profile to be an object");
        };
        assert_eq!(profile.get("bio"), Some(&Value::String("b2".to_string())));
        assert_eq!(profile.get("avatar"), Some(&Value::String("a".to_string())));
    }

    #[tokio::test]
    async fn insert_and_list_are_blocked_by_an_orphaned_partition() {
        let spec = PartitionSpec {
            name: "byRegion".to_string(),
            fields: vec![PartitionField {
                field: "region".to_string(),
                rule: PartitionRule::String,
            }],
        };

        // A schema with `region` removed, but the partition that was built
        // against it still declared — the state `createResource` leaves
        // behind after a field is dropped out from under a live partition.
        let mut tree: AttributeTree = BTreeMap::new();
        tree.insert(
            "name".to_string(),
            AttributeNode::Leaf(AttributeType::String { max_len: None }),
        );
        let compiled = schema::compile(tree, Behavior::Warn, vec![spec], HookSet::default()).unwrap();
        let handle = ResourceHandle::new(
            "users",
            Arc::new(compiled),
            Arc::new(MemoryStore::new()),
            Arc::new(EventBus::default()),
            true,
            false,
            false,
        );

        let record = Record::new(attrs(&[("name", "Alice")]), String::new());
        let insert_result = handle.insert(record).await;
        assert!(matches!(insert_result, Err(Error::OrphanedPartitionBlocked(name)) if name == "byRegion"));

        let list_result = handle.list(None).await;
        assert!(matches!(list_result, Err(Error::OrphanedPartitionBlocked(name)) if name == "byRegion"));
    }
}
