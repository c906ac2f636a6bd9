//! Maps a key to matching registrations; supports cancellation.

use std::sync::{Arc, RwLock};

use crate::key::Key;
use crate::registration::{BoxedConsumer, Registration};
use crate::selector::Selector;

/// Maps keys to matching registrations.
///
/// `select` must return a snapshot: mutation of the registry while a prior
/// snapshot is mid-route must not invalidate that iteration.
pub trait Registry: Send + Sync {
    /// Register `consumer` under `selector`, returning the live registration.
    fn register(
        &self,
        selector: Arc<dyn Selector>,
        consumer: BoxedConsumer,
        cancel_after_use: bool,
        pausable: bool,
    ) -> Arc<Registration>;

    /// Registrations whose selector matches `key`, in registration order,
    /// excluding anything already cancelled.
    fn select(&self, key: &Key) -> Vec<Arc<Registration>>;

    /// True iff `select(key)` would return at least one registration.
    fn responds_to(&self, key: &Key) -> bool {
        self.select(key).iter().any(|r| !r.is_cancelled())
    }
}

/// Default in-memory registry: a flat list scanned linearly on `select`.
///
/// Real selector-matching registries typically cache by key (prefix trees,
/// class hierarchies); this crate's registry concern is out of scope beyond
/// providing a correct, if unindexed, default — matching the role the
/// teacher's `MemoryProvider` plays for `EventProvider`.
#[derive(Default)]
pub struct MemoryRegistry {
    registrations: RwLock<Vec<Arc<Registration>>>,
}

impl MemoryRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop cancelled registrations from the backing store. Not required for
    /// correctness (cancelled registrations are already skipped by the
    /// router) but keeps `select`'s linear scan bounded over a long-running
    /// bus's lifetime.
    pub fn compact(&self) {
        self.registrations.write().unwrap().retain(|r| !r.is_cancelled());
    }
}

impl Registry for MemoryRegistry {
    fn register(
        &self,
        selector: Arc<dyn Selector>,
        consumer: BoxedConsumer,
        cancel_after_use: bool,
        pausable: bool,
    ) -> Arc<Registration> {
        let registration = Registration::new(selector, consumer, cancel_after_use, pausable);
        self.registrations.write().unwrap().push(registration.clone());
        registration
    }

    fn select(&self, key: &Key) -> Vec<Arc<Registration>> {
        self.registrations
            .read()
            .unwrap()
            .iter()
            .filter(|r| !r.is_cancelled() && r.selector().matches(key))
            .cloned()
            .collect()
    }
}
