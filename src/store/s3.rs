/*!
An [`ObjectStoreCapability`] backed by the `object_store` crate's S3
client, usable against real AWS S3 or any S3-API-compatible service
reachable via `s3://` or `http(s)://` connection descriptors.
*/

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::{Attribute, AttributeValue, Attributes, ObjectStore, PutPayload};

use crate::error::{Error, Result};
use crate::store::connection::ConnectionDescriptor;
use crate::store::{ListPage, ObjectGet, ObjectHead, ObjectStoreCapability};

/// An S3-backed object store, with every key implicitly rooted at the
/// connection descriptor's bucket prefix.
pub struct S3Store {
    client: AmazonS3,
    prefix: Option<String>,
}

impl S3Store {
    /// Build a client from a parsed connection descriptor.
    pub fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&descriptor.bucket)
            .with_virtual_hosted_style_request(!descriptor.force_path_style);

        if let Some(endpoint) = &descriptor.endpoint {
            let url = format!("{}://{endpoint}", if descriptor.scheme == "https" { "https" } else { "http" });
            builder = builder.with_endpoint(url);
        }
        if let Some(region) = &descriptor.region {
            builder = builder.with_region(region);
        }
        if let (Some(key), Some(secret)) = (&descriptor.access_key, &descriptor.secret_key) {
            builder = builder.with_access_key_id(key).with_secret_access_key(secret);
        }

        let client = builder
            .build()
            .map_err(|err| Error::internal(format!("failed to build s3 client: {err}")))?;

        Ok(S3Store {
            client,
            prefix: descriptor.prefix.clone(),
        })
    }

    fn full_path(&self, key: &str) -> Path {
        match &self.prefix {
            Some(prefix) => Path::from(format!("{prefix}/{key}")),
            None => Path::from(key),
        }
    }
}

fn map_store_error(err: object_store::Error) -> Error {
    match err {
        object_store::Error::NotFound { path, .. } => Error::NotFound {
            kind: "object",
            key: path,
        },
        object_store::Error::AlreadyExists { path, .. } => Error::Conflict {
            key: path,
            detail: "already exists".to_string(),
        },
        object_store::Error::PermissionDenied { .. } | object_store::Error::Unauthenticated { .. } => {
            Error::PermissionDenied
        }
        other => Error::Unavailable(other.to_string()),
    }
}

fn to_attributes(metadata: &BTreeMap<String, String>, content_type: Option<&str>) -> Attributes {
    let mut attrs = Attributes::new();
    if let Some(content_type) = content_type {
        attrs.insert(Attribute::ContentType, AttributeValue::from(content_type.to_string()));
    }
    for (k, v) in metadata {
        attrs.insert(
            Attribute::Metadata(k.clone().into()),
            AttributeValue::from(v.clone()),
        );
    }
    attrs
}

fn from_attributes(attrs: &Attributes) -> (BTreeMap<String, String>, Option<String>) {
    let mut metadata = BTreeMap::new();
    let mut content_type = None;
    for (key, value) in attrs.iter() {
        match key {
            Attribute::ContentType => content_type = Some(value.to_string()),
            Attribute::Metadata(name) => {
                metadata.insert(name.to_string(), value.to_string());
            }
            _ => {}
        }
    }
    (metadata, content_type)
}

#[async_trait]
impl ObjectStoreCapability for S3Store {
    async fn put(
        &self,
        key: &str,
        metadata: &BTreeMap<String, String>,
        body: Option<Bytes>,
        content_type: Option<&str>,
    ) -> Result<String> {
        let payload = PutPayload::from_bytes(body.unwrap_or_default());
        let options = object_store::PutOptions {
            attributes: to_attributes(metadata, content_type),
            ..Default::default()
        };
        let result = self
            .client
            .put_opts(&self.full_path(key), payload, options)
            .await
            .map_err(map_store_error)?;
        Ok(result.e_tag.unwrap_or_default())
    }

    async fn get(&self, key: &str) -> Result<ObjectGet> {
        let result = self
            .client
            .get(&self.full_path(key))
            .await
            .map_err(map_store_error)?;
        let meta = result.meta.clone();
        let attrs = result.attributes.clone();
        let body = result.bytes().await.map_err(map_store_error)?;
        let (metadata, content_type) = from_attributes(&attrs);
        Ok(ObjectGet {
            head: ObjectHead {
                metadata,
                content_type,
                length: meta.size as usize,
                last_modified: meta.last_modified,
                version_id: meta.version,
            },
            body,
        })
    }

    async fn head(&self, key: &str) -> Result<ObjectHead> {
        let meta = self
            .client
            .head(&self.full_path(key))
            .await
            .map_err(map_store_error)?;
        let (metadata, content_type) = (BTreeMap::new(), None);
        Ok(ObjectHead {
            metadata,
            content_type,
            length: meta.size as usize,
            last_modified: meta.last_modified,
            version_id: meta.version,
        })
    }

    async fn copy(
        &self,
        src: &str,
        dst: &str,
        new_metadata: Option<&BTreeMap<String, String>>,
    ) -> Result<()> {
        if let Some(metadata) = new_metadata {
            let existing = self.get(src).await?;
            let content_type = existing.head.content_type.clone();
            self.put(dst, metadata, Some(existing.body), content_type.as_deref())
                .await?;
        } else {
            self.client
                .copy(&self.full_path(src), &self.full_path(dst))
                .await
                .map_err(map_store_error)?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete(&self.full_path(key))
            .await
            .map_err(map_store_error)
    }

    async fn list(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        use futures::StreamExt;

        let path = self.full_path(prefix);
        let mut stream = self.client.list(Some(&path));
        let mut keys = Vec::new();
        let mut skipping = continuation.is_some();
        while let Some(entry) = stream.next().await {
            let entry = entry.map_err(map_store_error)?;
            let key = entry.location.to_string();
            if skipping {
                if Some(key.as_str()) == continuation {
                    skipping = false;
                }
                continue;
            }
            keys.push(key);
        }
        Ok(ListPage {
            keys,
            next_continuation: None,
        })
    }
}

/// Build an [`Arc<dyn ObjectStoreCapability>`] from a connection descriptor.
pub fn connect(descriptor: &ConnectionDescriptor) -> Result<Arc<dyn ObjectStoreCapability>> {
    Ok(Arc::new(S3Store::connect(descriptor)?))
}
