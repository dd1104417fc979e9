/*!
The object-store capability (spec.md §4.1, component C1): a narrow
interface the rest of the core depends on, satisfied equally by real S3, a
local in-memory double for tests, or any S3-API-compatible service.
*/

pub mod connection;
pub mod memory;
pub mod s3;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// The result of a `head`/`get`: everything but the body.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectHead {
    /// User-supplied metadata key/value pairs.
    pub metadata: BTreeMap<String, String>,
    /// The object's declared content type, if any.
    pub content_type: Option<String>,
    /// Size of the object body in bytes.
    pub length: usize,
    /// Last-modified timestamp reported by the store.
    pub last_modified: DateTime<Utc>,
    /// The store's version identifier for this object, if versioning is on.
    pub version_id: Option<String>,
}

/// The result of a `get`: a [`ObjectHead`] plus the object's body.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectGet {
    /// The object's head metadata.
    pub head: ObjectHead,
    /// The full object body.
    pub body: Bytes,
}

/// One page of a `list` call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListPage {
    /// Keys found under the queried prefix, in store-determined order.
    pub keys: Vec<String>,
    /// A continuation token for the next page, `None` when exhausted.
    pub next_continuation: Option<String>,
}

/// The narrow object-store contract the storage core depends on. Every
/// method is potentially suspending (network) and carries no internal
/// retry policy — retries are the caller's concern (spec.md §4.1, §5).
#[async_trait]
pub trait ObjectStoreCapability: Send + Sync {
    /// Write `body` (if any) under `key` with `metadata` as user-metadata.
    /// Returns the new object's etag.
    async fn put(
        &self,
        key: &str,
        metadata: &BTreeMap<String, String>,
        body: Option<Bytes>,
        content_type: Option<&str>,
    ) -> Result<String>;

    /// Fetch an object's metadata and body.
    async fn get(&self, key: &str) -> Result<ObjectGet>;

    /// Fetch an object's metadata without its body.
    async fn head(&self, key: &str) -> Result<ObjectHead>;

    /// Copy `src` to `dst`, optionally replacing the metadata map. Used for
    /// metadata-only updates (`patch`), so the body is never re-uploaded.
    async fn copy(
        &self,
        src: &str,
        dst: &str,
        new_metadata: Option<&BTreeMap<String, String>>,
    ) -> Result<()>;

    /// Delete an object. Not an error if the key never existed.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List keys under `prefix`, paginated via an opaque continuation token.
    async fn list(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage>;
}
