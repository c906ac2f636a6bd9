//! The event envelope and its type-erased form used internally by the bus
//!
//! Events travel through the registry/router/invoker pipeline carrying a
//! type-erased payload (`AnyEvent`) because a single bus address space mixes
//! domain events with rerouted consumer failures. `ConsumerInvoker::invoke`
//! downcasts back to the concrete payload type a given consumer expects.

use std::any::Any;
use std::sync::{Arc, Weak};

use crate::bus::EventBus;
use crate::error::ReactorError;
use crate::key::{Headers, Key};

/// Callback invoked with a consumer failure when an event carries its own
/// error sink (`Event::error_consumer`).
pub type ErrorConsumer = Arc<dyn Fn(&ReactorError) + Send + Sync>;

/// An event dispatched through the bus.
///
/// `reply_to_observable` being `Some` marks this as what the original
/// specification calls a `ReplyToEvent` — there is no separate Rust type for
/// it, since the only thing that sub-kind adds is that one field.
pub struct Event<T> {
    pub(crate) key: Key,
    pub(crate) headers: Headers,
    pub(crate) data: T,
    pub(crate) reply_to: Option<Key>,
    pub(crate) reply_to_observable: Option<Weak<EventBus>>,
    pub(crate) error_consumer: Option<ErrorConsumer>,
}

impl<T> Event<T> {
    /// Create an event carrying `data`, addressed to `key` at dispatch time.
    pub fn new(key: impl Into<Key>, data: T) -> Self {
        Self {
            key: key.into(),
            headers: Headers::new(),
            data,
            reply_to: None,
            reply_to_observable: None,
            error_consumer: None,
        }
    }

    /// The key this event is currently addressed to.
    ///
    /// A consumer may mutate this mid-dispatch (`set_key`); later stages of
    /// the same routing pass observe the updated value.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Overwrite the dispatch key. Subsequent routing within the same
    /// dispatch (e.g. a completion handler) observes the new key.
    pub fn set_key(&mut self, key: impl Into<Key>) {
        self.key = key.into();
    }

    /// The event's headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable access to headers, used by the header-resolver decorator.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Borrow the payload.
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Consume the event, returning its payload.
    pub fn into_data(self) -> T {
        self.data
    }

    /// The reply-to address, if this event expects a response.
    pub fn reply_to(&self) -> Option<&Key> {
        self.reply_to.as_ref()
    }

    /// Set the reply-to address.
    pub fn set_reply_to(&mut self, key: Key) {
        self.reply_to = Some(key);
    }

    /// The bus replies should be published on, if different from the
    /// receiving bus. `Some` here is the "ReplyToEvent" marker from the
    /// original specification.
    pub fn reply_to_observable(&self) -> Option<Arc<EventBus>> {
        self.reply_to_observable.as_ref().and_then(Weak::upgrade)
    }

    /// True iff this event carries a reply-to observable reference.
    pub fn is_reply_to(&self) -> bool {
        self.reply_to_observable.is_some()
    }

    /// Attach the bus replies to this event must be published on.
    pub fn set_reply_to_observable(&mut self, bus: &Arc<EventBus>) {
        self.reply_to_observable = Some(Arc::downgrade(bus));
    }

    /// Attach a per-event error sink.
    pub fn with_error_consumer(mut self, consumer: ErrorConsumer) -> Self {
        self.error_consumer = Some(consumer);
        self
    }

    /// The per-event error sink, if any.
    pub fn error_consumer(&self) -> Option<&ErrorConsumer> {
        self.error_consumer.as_ref()
    }

    fn map_data<U>(self, data: U) -> Event<U> {
        Event {
            key: self.key,
            headers: self.headers,
            data,
            reply_to: self.reply_to,
            reply_to_observable: self.reply_to_observable,
            error_consumer: self.error_consumer,
        }
    }
}

impl<T: Send + Sync + 'static> Event<T> {
    /// Erase the payload type, producing the form the registry/router operate on.
    pub fn into_any(self) -> AnyEvent {
        let boxed: Box<dyn Any + Send + Sync> = Box::new(self.data);
        self.map_data(boxed)
    }
}

impl<T: Clone> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            headers: self.headers.clone(),
            data: self.data.clone(),
            reply_to: self.reply_to.clone(),
            reply_to_observable: self.reply_to_observable.clone(),
            error_consumer: self.error_consumer.clone(),
        }
    }
}

/// Type-erased event, as stored and routed internally.
pub type AnyEvent = Event<Box<dyn Any + Send + Sync>>;

impl AnyEvent {
    /// Attempt to downcast the payload back to a concrete type.
    ///
    /// On mismatch, the original `AnyEvent` is handed back so the caller can
    /// try another registration's expected type.
    pub fn downcast<T: 'static>(self) -> std::result::Result<Event<T>, AnyEvent> {
        match self.data.downcast::<T>() {
            Ok(data) => Ok(Event {
                key: self.key,
                headers: self.headers,
                data: *data,
                reply_to: self.reply_to,
                reply_to_observable: self.reply_to_observable,
                error_consumer: self.error_consumer,
            }),
            Err(data) => Err(Event {
                key: self.key,
                headers: self.headers,
                data,
                reply_to: self.reply_to,
                reply_to_observable: self.reply_to_observable,
                error_consumer: self.error_consumer,
            }),
        }
    }

    /// Borrow the payload as a concrete type, without consuming the event.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }
}
