/*!
The record/resource data model (spec.md §3).

A [`Resource`] owns many [`Record`]s of identical, versioned schema. A
record's attribute values live in a typed [`Value`](crate::codec::Value)
tree (the "dynamic objects as records" strategy, spec.md §9); an optional
binary [`Body`] travels alongside. An [`Envelope`] is the fully-encoded,
wire-ready form of a record: a short-keyed metadata map, an optional body,
and a small set of reserved headers (spec.md §3, "Encoded record envelope").
*/

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::behavior::Behavior;
use crate::codec::Value;
use crate::partition::PartitionSpec;

/// Reserved user-metadata header keys (spec.md §6).
pub mod headers {
    /// The compiled schema's definition hash.
    pub const SCHEMA_HASH: &str = "schema-hash";
    /// The resource's behavior tag.
    pub const BEHAVIOR: &str = "behavior";
    /// Set to `"1"` when cold data has been spilled to the object body.
    pub const OVERFLOW: &str = "overflow";
    /// Comma-joined dotted paths the `Truncate` behavior shortened or dropped.
    pub const TRUNCATED: &str = "truncated";
    /// Server-side creation timestamp, RFC 3339.
    pub const CREATED_AT: &str = "created-at";
    /// Server-side last-update timestamp, RFC 3339.
    pub const UPDATED_AT: &str = "updated-at";
    /// Server-side logical-delete timestamp, RFC 3339, paranoid mode only.
    pub const DELETED_AT: &str = "deleted-at";
    /// The record body's MIME type, when present.
    pub const MIME: &str = "mime";
}

/// Keys of the extended-metadata namespace `get` merges into a returned
/// [`Record`] (spec.md §4.7), sourced from the store's `head`/`get`
/// response rather than anything the schema encodes.
pub mod extended {
    /// Size of the stored object body, in bytes.
    pub const CONTENT_LENGTH: &str = "_content_length";
    /// The store-reported last-modified timestamp, RFC 3339.
    pub const LAST_MODIFIED: &str = "_last_modified";
    /// The store's version identifier for the primary object, if versioning is on.
    pub const VERSION_ID: &str = "_version_id";
    /// Whether the primary object carries a non-empty body.
    pub const HAS_CONTENT: &str = "_has_content";
    /// The schema definition hash the record was encoded under.
    pub const DEFINITION_HASH: &str = "definition_hash";
    /// The body's MIME type, when present.
    pub const MIME_TYPE: &str = "mime_type";
}

/// A record's optional binary payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// Raw bytes.
    pub bytes: Vec<u8>,
    /// The body's MIME type.
    pub content_type: String,
}

/// A record: attribute values conforming to its resource's schema at the
/// version it was written under, plus an optional body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Immutable identifier. A 22-character URL-safe nanoid unless
    /// user-supplied.
    pub id: String,
    /// Attribute values, keyed by top-level attribute name.
    pub attributes: BTreeMap<String, Value>,
    /// Optional binary body.
    pub body: Option<Body>,
    /// Definition hash of the schema version this record was encoded under.
    pub definition_hash: String,
    /// Server-assigned creation timestamp, present once inserted.
    pub created_at: Option<DateTime<Utc>>,
    /// Server-assigned last-update timestamp.
    pub updated_at: Option<DateTime<Utc>>,
    /// Server-assigned logical-delete timestamp, paranoid mode only.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Extended metadata `get` merges in under the [`extended`] namespace:
    /// `_content_length`, `_last_modified`, `_version_id`, `_has_content`,
    /// `definition_hash`, `mime_type`. Empty on a record that has not yet
    /// round-tripped through a `get`.
    pub extended: BTreeMap<String, Value>,
}

impl Record {
    /// Construct a new, not-yet-persisted record with a freshly minted id.
    pub fn new(attributes: BTreeMap<String, Value>, definition_hash: impl Into<String>) -> Self {
        Record {
            id: nanoid::nanoid!(22),
            attributes,
            body: None,
            definition_hash: definition_hash.into(),
            created_at: None,
            updated_at: None,
            deleted_at: None,
            extended: BTreeMap::new(),
        }
    }

    /// Construct a new record with a caller-supplied id.
    pub fn with_id(
        id: impl Into<String>,
        attributes: BTreeMap<String, Value>,
        definition_hash: impl Into<String>,
    ) -> Self {
        Record {
            id: id.into(),
            attributes,
            body: None,
            definition_hash: definition_hash.into(),
            created_at: None,
            updated_at: None,
            deleted_at: None,
            extended: BTreeMap::new(),
        }
    }
}

/// The fully-encoded, wire-ready form of a [`Record`]: a short-keyed
/// metadata map, reserved headers, and an optional body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    /// `short_key -> encoded value`, as produced by the codec layer.
    pub fields: BTreeMap<String, String>,
    /// Reserved header key -> value (see [`headers`]).
    pub reserved: BTreeMap<String, String>,
    /// Cold data spilled to the object body, when the behavior requires it.
    pub body: Option<Vec<u8>>,
}

impl Envelope {
    /// An empty envelope.
    pub fn new() -> Self {
        Envelope::default()
    }

    /// Iterate every metadata entry (fields and reserved headers together),
    /// as the byte-size calculator and the object-store adapter both need.
    pub fn metadata_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .chain(self.reserved.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A collection of records with identical schema at a given version
/// (spec.md §3, "Resource").
#[derive(Debug, Clone)]
pub struct Resource {
    /// Unique resource name within the database.
    pub name: String,
    /// Whether `created_at`/`updated_at` are stamped automatically and the
    /// `byCreatedDate`/`byUpdatedDate` partitions are auto-added.
    pub timestamps_enabled: bool,
    /// Whether `delete` is a logical tombstone rather than a hard delete.
    pub paranoid_delete: bool,
    /// Whether partition reference writes are queued asynchronously.
    pub async_partitions: bool,
    /// The current (latest) compiled schema version.
    pub current: CompiledVersion,
    /// Every schema version this resource has ever had, keyed by its
    /// definition hash.
    pub versions: BTreeMap<String, CompiledVersion>,
}

/// One versioned snapshot of a resource's schema, behavior, and partitions.
#[derive(Debug, Clone)]
pub struct CompiledVersion {
    /// The definition hash identifying this version.
    pub definition_hash: String,
    /// The compiled schema.
    pub schema: std::sync::Arc<crate::schema::CompiledSchema>,
    /// The behavior in force for this version.
    pub behavior: Behavior,
    /// The partitions declared for this version.
    pub partitions: Vec<PartitionSpec>,
    /// When this version was created.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_mints_a_22_char_id() {
        let record = Record::new(BTreeMap::new(), "hash".to_string());
        assert_eq!(record.id.chars().count(), 22);
    }

    #[test]
    fn with_id_preserves_caller_supplied_id() {
        let record = Record::with_id("custom-id", BTreeMap::new(), "hash".to_string());
        assert_eq!(record.id, "custom-id");
    }
}
