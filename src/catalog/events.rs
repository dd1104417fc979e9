/*!
Events (spec.md §6, "Events"): a synchronous fan-out subscription surface.
Observers are passed a structured event value; the core does not await
them. Cross-thread observers are expected to queue through their own
bounded channel (spec.md §9).
*/

use std::sync::{Arc, Mutex};

/// A diff describing which resources changed between a catalog's stored
/// definitions and the in-memory configuration it was reconnected with.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceDefinitionsDiff {
    /// Resource names present in-memory but absent from the catalog.
    pub new: Vec<String>,
    /// Resources whose recomputed hash differs from the stored one.
    pub changed: Vec<ResourceHashChange>,
    /// Resource names present in the catalog but absent in-memory.
    pub removed: Vec<String>,
}

/// One resource whose definition hash changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceHashChange {
    /// The resource name.
    pub name: String,
    /// The previously stored definition hash.
    pub from: String,
    /// The newly computed definition hash.
    pub to: String,
}

/// How a delete was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// The primary object and its references were removed outright.
    Hard,
    /// The primary was tombstoned (`paranoid_delete`).
    Soft,
}

/// Every event the engine can emit (spec.md §6).
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Fired once per reconnect when stored and in-memory schemas diverge.
    ResourceDefinitionsChanged(ResourceDefinitionsDiff),
    /// A write's encoded envelope exceeded the metadata budget under `Warn`.
    ExceedsLimit {
        /// The resource the write targeted.
        resource: String,
        /// The record id.
        id: String,
        /// The envelope's actual size in bytes.
        size: usize,
        /// The configured budget in bytes.
        budget: usize,
    },
    /// A record was successfully written.
    RecordWritten {
        /// The resource the write targeted.
        resource: String,
        /// The record id.
        id: String,
        /// `"insert"`, `"update"`, `"patch"`, or `"replace"`.
        op: &'static str,
        /// The resource version the write was encoded under.
        version: String,
    },
    /// A record was deleted.
    RecordDeleted {
        /// The resource the delete targeted.
        resource: String,
        /// The record id.
        id: String,
        /// Hard or soft (paranoid) delete.
        mode: DeleteMode,
    },
    /// A partition reference write failed outside `async_partitions` mode.
    PartitionReferenceError {
        /// The resource the write targeted.
        resource: String,
        /// The record id.
        id: String,
        /// The partition name whose reference write failed.
        partition: String,
        /// A human-readable cause.
        cause: String,
    },
}

type Observer = Box<dyn Fn(&Event) + Send + Sync>;

/// A synchronous fan-out event bus. Observers run inline on the publishing
/// thread; the bus never awaits them, so a slow observer is the observer's
/// problem, not the caller's.
#[derive(Default)]
pub struct EventBus {
    observers: Mutex<Vec<Arc<Observer>>>,
}

impl EventBus {
    /// Register an observer. Returns a handle whose drop does not
    /// unsubscribe — callers who need that should track the index
    /// themselves; this mirrors the "no ambient configuration, explicit
    /// lifecycle" design note rather than adding implicit cleanup.
    pub fn subscribe(&self, observer: impl Fn(&Event) + Send + Sync + 'static) {
        self.observers
            .lock()
            .expect("event bus mutex poisoned")
            .push(Arc::new(Box::new(observer)));
    }

    /// Publish an event to every subscribed observer, in subscription order.
    pub fn publish(&self, event: Event) {
        let observers = self.observers.lock().expect("event bus mutex poisoned").clone();
        for observer in observers {
            observer(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn publishes_to_every_subscriber_in_order() {
        let bus = EventBus::default();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = count.clone();
        bus.subscribe(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = count.clone();
        bus.subscribe(move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        });

        bus.publish(Event::RecordWritten {
            resource: "users".to_string(),
            id: "1".to_string(),
            op: "insert",
            version: "abc".to_string(),
        });

        assert_eq!(count.load(Ordering::SeqCst), 11);
    }
}
