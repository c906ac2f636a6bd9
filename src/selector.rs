//! Key predicates used to match registrations against dispatch keys.

use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::key::{Headers, Key};

/// A resolver that derives extra headers from the key an event is dispatched on.
pub type HeaderResolver = Arc<dyn Fn(&Key) -> Headers + Send + Sync>;

/// A predicate over dispatch keys, with an optional header resolver.
///
/// The resolver is applied as a decorator at registration time (`EventBus::on`)
/// rather than woven into the router pipeline — simpler, and the one registered
/// consumer is the only thing that ever needs the extra headers.
pub trait Selector: Send + Sync {
    /// Does this selector match the given key?
    fn matches(&self, key: &Key) -> bool;

    /// Header resolver attached to this selector, if any.
    fn header_resolver(&self) -> Option<&HeaderResolver> {
        None
    }
}

/// Matches a single string address exactly.
pub struct AddressSelector {
    address: Key,
    header_resolver: Option<HeaderResolver>,
}

impl AddressSelector {
    /// Select events addressed exactly to `address`.
    pub fn new(address: impl Into<Key>) -> Self {
        Self {
            address: address.into(),
            header_resolver: None,
        }
    }

    /// Attach a header resolver to this selector.
    pub fn with_header_resolver(mut self, resolver: HeaderResolver) -> Self {
        self.header_resolver = Some(resolver);
        self
    }
}

impl Selector for AddressSelector {
    fn matches(&self, key: &Key) -> bool {
        key == &self.address
    }

    fn header_resolver(&self) -> Option<&HeaderResolver> {
        self.header_resolver.as_ref()
    }
}

/// Matches a `Key::Type(TypeId)` for a particular Rust type `T`.
///
/// Used for the bus's error-rerouting path: a consumer failure is rekeyed by
/// the failure's Rust type and delivered to whoever has a `TypeSelector` over
/// that same type.
pub struct TypeSelector {
    type_id: TypeId,
}

impl TypeSelector {
    /// Select events keyed by `Key::of::<T>()`.
    pub fn new<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
        }
    }
}

impl Selector for TypeSelector {
    fn matches(&self, key: &Key) -> bool {
        matches!(key, Key::Type(id) if *id == self.type_id)
    }
}

/// A selector with a unique identity, matching nothing but the synthetic key
/// it mints for itself — backs `send_and_receive`'s one-shot reply plumbing.
pub struct AnonymousSelector {
    id: u64,
}

static ANONYMOUS_COUNTER: AtomicU64 = AtomicU64::new(1);

impl AnonymousSelector {
    /// Mint a fresh anonymous selector with a process-unique identity.
    pub fn new() -> Self {
        Self {
            id: ANONYMOUS_COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// The synthetic key this selector (and only this selector) matches.
    pub fn key(&self) -> Key {
        Key::address(format!("__reply__/{}", self.id))
    }
}

impl Default for AnonymousSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl Selector for AnonymousSelector {
    fn matches(&self, key: &Key) -> bool {
        key == &self.key()
    }
}

impl fmt::Debug for AnonymousSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnonymousSelector({})", self.id)
    }
}
