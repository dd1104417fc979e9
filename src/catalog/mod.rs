/*!
The catalog (spec.md §4.8, component C8): the single process-wide mutable
document describing every resource, version, and plugin sub-tree. Wrapped
with an explicit lifecycle (`init`/`save`/`close`, spec.md §9) and guarded
by an in-process mutex plus an optional conditional object-store write for
multi-writer safety (spec.md §5).
*/

pub mod document;
pub mod events;
pub mod healing;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::Result;
use crate::store::ObjectStoreCapability;

pub use document::{CatalogDocument, ResourceEntry, VersionEntry};
pub use events::{Event, EventBus};

/// The catalog's explicit lifecycle: loaded once at `init`, mutated through
/// a guarded read-compute-write cycle, and flushed at `close`.
pub struct Catalog {
    store: Arc<dyn ObjectStoreCapability>,
    key: String,
    document: Mutex<CatalogDocument>,
    events: EventBus,
}

impl Catalog {
    /// Connect to (and, if necessary, self-heal) the catalog document at
    /// `key`. Runs change detection but does not apply it — callers observe
    /// `ResourceDefinitionsChanged` via the returned [`EventBus`].
    pub async fn init(store: Arc<dyn ObjectStoreCapability>, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let document = document::load(store.as_ref(), &key).await?;
        Ok(Catalog {
            store,
            key,
            document: Mutex::new(document),
            events: EventBus::default(),
        })
    }

    /// The event bus observers subscribe to.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run `mutate` against a locked, in-memory copy of the document, then
    /// validate and persist it. The object-store `If-Match` conditional
    /// write (multi-writer safety) is the object-store adapter's concern;
    /// this lock only serialises in-process writers.
    pub async fn mutate<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut CatalogDocument) -> Result<()>,
    {
        let mut document = self.document.lock().await;
        mutate(&mut document)?;
        document::validate(&document)?;
        document::save(self.store.as_ref(), &self.key, &document).await
    }

    /// Take a read-only snapshot of the current document.
    pub async fn snapshot(&self) -> CatalogDocument {
        self.document.lock().await.clone()
    }

    /// Flush the current in-memory state and drop the lock. A no-op beyond
    /// what `mutate` already guarantees, kept as an explicit lifecycle stage
    /// per spec.md §9 ("globals and singletons").
    pub async fn close(&self) -> Result<()> {
        let document = self.document.lock().await;
        document::save(self.store.as_ref(), &self.key, &document).await
    }
}

/// The catalog's well-known default key, relative to the connection prefix.
pub const DEFAULT_CATALOG_PATH: &str = "s3db.json";
