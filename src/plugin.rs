/*!
The plugin storage namespace (spec.md §4.9, component C9): a key-prefix
isolated scratch space plugins use to persist their own state, reusing the
byte calculator and codecs without any coupling to resource schemas.
*/

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::codec::{self, AttributeType, Value};
use crate::error::{Error, Result};
use crate::partition::key::plugin_key;
use crate::size::{calc_bytes, DEFAULT_METADATA_BUDGET};
use crate::record::Envelope;
use crate::store::ObjectStoreCapability;

/// A plugin's private slice of the object store, keyed under
/// `plg/<plugin>/...` so it can never collide with a resource's primary or
/// partition keys (spec.md §4.9, "Key-prefix isolation").
pub struct PluginNamespace {
    plugin: String,
    store: Arc<dyn ObjectStoreCapability>,
    metadata_budget: usize,
}

impl PluginNamespace {
    /// Open a namespace for `plugin` over `store`.
    pub fn new(plugin: impl Into<String>, store: Arc<dyn ObjectStoreCapability>) -> Self {
        PluginNamespace {
            plugin: plugin.into(),
            store,
            metadata_budget: DEFAULT_METADATA_BUDGET,
        }
    }

    fn key(&self, arbitrary: &str) -> String {
        plugin_key(&self.plugin, arbitrary)
    }

    /// Store an arbitrary set of string-valued fields under `arbitrary`,
    /// encoding each value with the scalar `string` codec so the stored
    /// bytes are consistent with the rest of the engine's wire format.
    pub async fn put(&self, arbitrary: &str, fields: &BTreeMap<String, Value>) -> Result<()> {
        let mut encoded = BTreeMap::new();
        for (key, value) in fields {
            encoded.insert(
                key.clone(),
                codec::encode_leaf(&AttributeType::String { max_len: None }, value)?,
            );
        }

        let envelope = Envelope {
            fields: encoded,
            reserved: BTreeMap::new(),
            body: None,
        };
        let size = calc_bytes(&envelope);
        if size > self.metadata_budget {
            return Err(Error::MetadataTooLarge {
                size,
                budget: self.metadata_budget,
            });
        }

        self.store.put(&self.key(arbitrary), &envelope.fields, None, None).await?;
        Ok(())
    }

    /// Fetch and decode the fields stored under `arbitrary`.
    pub async fn get(&self, arbitrary: &str) -> Result<BTreeMap<String, Value>> {
        let head = self.store.head(&self.key(arbitrary)).await?;
        let mut fields = BTreeMap::new();
        for (key, wire) in &head.metadata {
            fields.insert(
                key.clone(),
                codec::decode_leaf(&AttributeType::String { max_len: None }, wire)?,
            );
        }
        Ok(fields)
    }

    /// Fast metadata-only update: `head` + `copy` with a replaced metadata
    /// map, never re-reading or re-writing a body (spec.md §4.9, "Fast
    /// metadata-only update primitive").
    pub async fn update_fields(&self, arbitrary: &str, patch: &BTreeMap<String, Value>) -> Result<()> {
        let key = self.key(arbitrary);
        let head = self.store.head(&key).await?;
        let mut metadata = head.metadata.clone();
        for (field, value) in patch {
            metadata.insert(
                field.clone(),
                codec::encode_leaf(&AttributeType::String { max_len: None }, value)?,
            );
        }
        self.store.copy(&key, &key, Some(&metadata)).await?;
        Ok(())
    }

    /// Delete the entry stored under `arbitrary`.
    pub async fn delete(&self, arbitrary: &str) -> Result<()> {
        self.store.delete(&self.key(arbitrary)).await
    }

    /// List every key this plugin owns, paginated.
    pub async fn list(&self, continuation: Option<&str>) -> Result<crate::store::ListPage> {
        let prefix = format!("plg/{}/", self.plugin);
        self.store.list(&prefix, continuation).await
    }

    /// Write a raw binary blob under `arbitrary`, bypassing the codec layer
    /// entirely — for plugins that need to store opaque bytes rather than
    /// typed fields.
    pub async fn put_blob(&self, arbitrary: &str, bytes: Bytes, content_type: Option<&str>) -> Result<()> {
        self.store
            .put(&self.key(arbitrary), &BTreeMap::new(), Some(bytes), content_type)
            .await?;
        Ok(())
    }

    /// Fetch a raw binary blob previously written with [`put_blob`](Self::put_blob).
    pub async fn get_blob(&self, arbitrary: &str) -> Result<Bytes> {
        Ok(self.store.get(&self.key(arbitrary)).await?.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn namespace() -> PluginNamespace {
        PluginNamespace::new("search-index", Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn put_then_get_round_trips_fields() {
        let ns = namespace();
        let mut fields = BTreeMap::new();
        fields.insert("cursor".to_string(), Value::String("abc123".to_string()));
        ns.put("state", &fields).await.unwrap();

        let fetched = ns.get("state").await.unwrap();
        assert_eq!(fetched.get("cursor"), Some(&Value::String("abc123".to_string())));
    }

    #[tokio::test]
    async fn update_fields_is_metadata_only_and_preserves_other_keys() {
        let ns = namespace();
        let mut fields = BTreeMap::new();
        fields.insert("cursor".to_string(), Value::String("abc123".to_string()));
        fields.insert("generation".to_string(), Value::String("1".to_string()));
        ns.put("state", &fields).await.unwrap();

        let mut patch = BTreeMap::new();
        patch.insert("cursor".to_string(), Value::String("def456".to_string()));
        ns.update_fields("state", &patch).await.unwrap();

        let fetched = ns.get("state").await.unwrap();
        assert_eq!(fetched.get("cursor"), Some(&Value::String("def456".to_string())));
        assert_eq!(fetched.get("generation"), Some(&Value::String("1".to_string())));
    }

    #[tokio::test]
    async fn keys_are_isolated_under_the_plugin_prefix() {
        let ns = namespace();
        ns.put("state", &BTreeMap::new()).await.unwrap();
        let page = ns.list(None).await.unwrap();
        assert_eq!(page.keys, vec!["plg/search-index/state".to_string()]);
    }

    #[tokio::test]
    async fn blob_round_trips_without_the_codec_layer() {
        let ns = namespace();
        ns.put_blob("snapshot", Bytes::from_static(b"raw-bytes"), Some("application/octet-stream"))
            .await
            .unwrap();
        assert_eq!(ns.get_blob("snapshot").await.unwrap(), Bytes::from_static(b"raw-bytes"));
    }
}
