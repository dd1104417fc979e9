/*!
A fully self-contained in-memory [`ObjectStoreCapability`], the primary
target for this crate's own tests and for embedders wiring up `memory://`
connection descriptors (spec.md §6).
*/

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use crate::error::{Error, Result};
use crate::store::{ListPage, ObjectGet, ObjectHead, ObjectStoreCapability};

#[derive(Debug, Clone)]
struct StoredObject {
    metadata: BTreeMap<String, String>,
    body: Bytes,
    content_type: Option<String>,
    last_modified: chrono::DateTime<Utc>,
    etag: String,
    version_id: u64,
}

/// An in-process object store double, useful both as a test fixture and as
/// the backend for `memory://` connection descriptors.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    etag_counter: Mutex<u64>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn next_etag(&self) -> String {
        let mut counter = self.etag_counter.lock().expect("memory store mutex poisoned");
        *counter += 1;
        counter.to_string()
    }
}

#[async_trait]
impl ObjectStoreCapability for MemoryStore {
    async fn put(
        &self,
        key: &str,
        metadata: &BTreeMap<String, String>,
        body: Option<Bytes>,
        content_type: Option<&str>,
    ) -> Result<String> {
        let etag = self.next_etag();
        let mut objects = self.objects.lock().expect("memory store mutex poisoned");
        let version_id = objects.get(key).map(|o| o.version_id + 1).unwrap_or(0);
        objects.insert(
            key.to_string(),
            StoredObject {
                metadata: metadata.clone(),
                body: body.unwrap_or_default(),
                content_type: content_type.map(str::to_string),
                last_modified: Utc::now(),
                etag: etag.clone(),
                version_id,
            },
        );
        Ok(etag)
    }

    async fn get(&self, key: &str) -> Result<ObjectGet> {
        let objects = self.objects.lock().expect("memory store mutex poisoned");
        let object = objects
            .get(key)
            .ok_or_else(|| Error::NotFound {
                kind: "object",
                key: key.to_string(),
            })?;
        Ok(ObjectGet {
            head: head_of(key, object),
            body: object.body.clone(),
        })
    }

    async fn head(&self, key: &str) -> Result<ObjectHead> {
        let objects = self.objects.lock().expect("memory store mutex poisoned");
        let object = objects
            .get(key)
            .ok_or_else(|| Error::NotFound {
                kind: "object",
                key: key.to_string(),
            })?;
        Ok(head_of(key, object))
    }

    async fn copy(
        &self,
        src: &str,
        dst: &str,
        new_metadata: Option<&BTreeMap<String, String>>,
    ) -> Result<()> {
        let mut objects = self.objects.lock().expect("memory store mutex poisoned");
        let source = objects
            .get(src)
            .ok_or_else(|| Error::NotFound {
                kind: "object",
                key: src.to_string(),
            })?
            .clone();
        let metadata = new_metadata.cloned().unwrap_or(source.metadata);
        let version_id = objects.get(dst).map(|o| o.version_id + 1).unwrap_or(0);
        objects.insert(
            dst.to_string(),
            StoredObject {
                metadata,
                body: source.body,
                content_type: source.content_type,
                last_modified: Utc::now(),
                etag: source.etag,
                version_id,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut objects = self.objects.lock().expect("memory store mutex poisoned");
        objects.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        let objects = self.objects.lock().expect("memory store mutex poisoned");
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        let start = match continuation {
            Some(token) => keys.iter().position(|k| k == token).map(|i| i + 1).unwrap_or(0),
            None => 0,
        };
        Ok(ListPage {
            keys: keys[start..].to_vec(),
            next_continuation: None,
        })
    }
}

fn head_of(key: &str, object: &StoredObject) -> ObjectHead {
    ObjectHead {
        metadata: object.metadata.clone(),
        content_type: object.content_type.clone(),
        length: object.body.len(),
        last_modified: object.last_modified,
        version_id: Some(format!("{key}#{}", object.version_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips_metadata_and_body() {
        let store = MemoryStore::new();
        let mut metadata = BTreeMap::new();
        metadata.insert("0".to_string(), "hello".to_string());
        store
            .put("k", &metadata, Some(Bytes::from_static(b"body")), Some("text/plain"))
            .await
            .unwrap();
        let got = store.get("k").await.unwrap();
        assert_eq!(got.head.metadata, metadata);
        assert_eq!(got.body, Bytes::from_static(b"body"));
    }

    #[tokio::test]
    async fn get_missing_key_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.get("missing").await, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn copy_rewrites_metadata_without_touching_source() {
        let store = MemoryStore::new();
        let mut metadata = BTreeMap::new();
        metadata.insert("0".to_string(), "a".to_string());
        store.put("src", &metadata, None, None).await.unwrap();

        let mut new_metadata = BTreeMap::new();
        new_metadata.insert("0".to_string(), "b".to_string());
        store.copy("src", "dst", Some(&new_metadata)).await.unwrap();

        assert_eq!(store.head("src").await.unwrap().metadata, metadata);
        assert_eq!(store.head("dst").await.unwrap().metadata, new_metadata);
    }

    #[tokio::test]
    async fn list_filters_by_prefix_and_sorts() {
        let store = MemoryStore::new();
        for key in ["a/2", "a/1", "b/1"] {
            store.put(key, &BTreeMap::new(), None, None).await.unwrap();
        }
        let page = store.list("a/", None).await.unwrap();
        assert_eq!(page.keys, vec!["a/1", "a/2"]);
    }
}
