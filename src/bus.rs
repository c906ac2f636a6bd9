//! Key-indexed publish/subscribe gateway: the event bus (C6).

use std::marker::PhantomData;
use std::sync::{Arc, OnceLock, RwLock};

use tracing::{error, info_span};
use uuid::Uuid;

use crate::config::BusConfig;
use crate::dispatcher::{Dispatcher, SyncDispatcher};
use crate::error::{panic_message, ReactorError};
use crate::event::{AnyEvent, Event};
use crate::filter::PassThroughFilter;
use crate::invoker::{coerce, ArgumentConvertingConsumerInvoker, InvocationOutcome};
use crate::key::Key;
use crate::registration::Registration;
use crate::registry::{MemoryRegistry, Registry};
use crate::reply::publish_reply;
use crate::router::{ConsumerFilteringRouter, ErrorSink, Router};
use crate::selector::{AnonymousSelector, Selector, TypeSelector};

/// Key-indexed publish/subscribe gateway.
///
/// Dispatches `notify`/`send`/`send_and_receive` through a `Dispatcher` (C1)
/// with a `Router` (C3) as the task body, consulting a `Registry` (C2) for
/// candidates. Identity (`id`) is a lazily-generated, time-ordered UUID
/// unless fixed via `BusConfig`.
pub struct EventBus {
    id: OnceLock<Uuid>,
    fixed_id: Option<Uuid>,
    dispatcher: Arc<dyn Dispatcher>,
    router: Arc<dyn Router>,
    registry: Arc<dyn Registry>,
    uncaught_error_handler: RwLock<Option<Arc<dyn Fn(&ReactorError) + Send + Sync>>>,
}

impl EventBus {
    /// A bus with every default: synchronous dispatcher, pass-through
    /// filter, argument-converting invoker, in-memory registry.
    pub fn new(config: BusConfig) -> Arc<Self> {
        Self::build(config, Arc::new(SyncDispatcher), None, None)
    }

    /// A bus using a caller-supplied dispatcher (e.g. `TokioDispatcher`) but
    /// otherwise default collaborators.
    pub fn with_dispatcher(config: BusConfig, dispatcher: Arc<dyn Dispatcher>) -> Arc<Self> {
        Self::build(config, dispatcher, None, None)
    }

    /// Full control over every collaborator. Each bus holds its own router
    /// instance — there is no process-wide default router singleton.
    pub fn with_components(
        config: BusConfig,
        dispatcher: Arc<dyn Dispatcher>,
        router: Arc<dyn Router>,
        registry: Arc<dyn Registry>,
    ) -> Arc<Self> {
        Self::build(config, dispatcher, Some(router), Some(registry))
    }

    fn build(
        config: BusConfig,
        dispatcher: Arc<dyn Dispatcher>,
        router: Option<Arc<dyn Router>>,
        registry: Option<Arc<dyn Registry>>,
    ) -> Arc<Self> {
        let router = router.unwrap_or_else(|| {
            Arc::new(ConsumerFilteringRouter::new(
                PassThroughFilter,
                ArgumentConvertingConsumerInvoker,
            )) as Arc<dyn Router>
        });
        let registry = registry.unwrap_or_else(|| Arc::new(MemoryRegistry::new()) as Arc<dyn Registry>);

        let bus = Arc::new(Self {
            id: OnceLock::new(),
            fixed_id: config.id,
            dispatcher,
            router,
            registry,
            uncaught_error_handler: RwLock::new(None),
        });
        bus.register_last_resort_sink();
        bus
    }

    /// Install the handler invoked for errors that reach the bus's
    /// last-resort `Throwable`-class consumer (registered at construction).
    pub fn set_uncaught_error_handler(&self, handler: Arc<dyn Fn(&ReactorError) + Send + Sync>) {
        *self.uncaught_error_handler.write().unwrap() = Some(handler);
    }

    /// This bus's identity. Lazily generated (UUIDv7, time-ordered) on first
    /// access if not fixed by `BusConfig`; stable afterwards.
    pub fn id(&self) -> Uuid {
        if let Some(fixed) = self.fixed_id {
            return fixed;
        }
        *self.id.get_or_init(Uuid::now_v7)
    }

    fn register_last_resort_sink(self: &Arc<Self>) {
        let bus = self.clone();
        self.register::<ReactorError, _>(
            Arc::new(TypeSelector::new::<ReactorError>()),
            move |event| {
                let handler = bus.uncaught_error_handler.read().unwrap().clone();
                match handler {
                    Some(handler) => handler(event.data()),
                    None => error!(error = %event.data(), "uncaught failure reached the bus's last-resort sink"),
                }
                InvocationOutcome::Ok
            },
            false,
            false,
        );
    }

    /// Register `consumer` under `selector`. If the selector carries a
    /// header resolver, the event's headers are augmented with the
    /// resolver's output before `consumer` runs. A panicking consumer is
    /// caught and rerouted as a `ConsumerFailure` rather than unwinding
    /// through the dispatcher.
    pub fn on<T, F>(self: &Arc<Self>, selector: Arc<dyn Selector>, consumer: F) -> Arc<Registration>
    where
        T: Send + Sync + 'static,
        F: Fn(&Event<T>) + Send + Sync + 'static,
    {
        self.register::<T, _>(
            selector,
            move |event| {
                consumer(&*event);
                InvocationOutcome::Ok
            },
            false,
            true,
        )
    }

    /// Register a reply-emitting consumer: `f`'s return value is wrapped in
    /// a fresh event and published to the inbound event's `reply_to`, on
    /// whichever bus it names as the reply target (or this bus, if none).
    pub fn receive<T, R, F>(self: &Arc<Self>, selector: Arc<dyn Selector>, f: F) -> Arc<Registration>
    where
        T: Send + Sync + 'static,
        R: Send + Sync + 'static,
        F: Fn(&Event<T>) -> R + Send + Sync + 'static,
    {
        let bus = self.clone();
        self.register::<T, _>(
            selector,
            move |event| {
                let result = f(&*event);
                publish_reply(event, &bus, result);
                InvocationOutcome::Ok
            },
            false,
            true,
        )
    }

    fn register<T, F>(
        self: &Arc<Self>,
        selector: Arc<dyn Selector>,
        f: F,
        cancel_after_use: bool,
        pausable: bool,
    ) -> Arc<Registration>
    where
        T: Send + Sync + 'static,
        F: Fn(&mut Event<T>) -> InvocationOutcome + Send + Sync + 'static,
    {
        let header_resolver = selector.header_resolver().cloned();
        let consumer = coerce::<T, _>(move |event| {
            if let Some(resolver) = &header_resolver {
                let extra = resolver(event.key());
                event.headers_mut().extend(extra);
            }
            let key = event.key().to_string();
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(event))) {
                Ok(outcome) => outcome,
                Err(payload) => InvocationOutcome::Failed(ReactorError::ConsumerFailure {
                    key,
                    reason: panic_message(&payload),
                }),
            }
        });
        self.registry.register(selector, consumer, cancel_after_use, pausable)
    }

    /// Set `event.key := key`, then submit a routing task to the dispatcher.
    /// Returns after enqueue, not after delivery.
    pub fn notify<T: Send + Sync + 'static>(self: &Arc<Self>, key: impl Into<Key>, mut event: Event<T>) {
        event.set_key(key);
        self.dispatch_any(event.into_any());
    }

    /// `notify` with a bare payload, keyed directly.
    pub fn notify_value<T: Send + Sync + 'static>(self: &Arc<Self>, key: impl Into<Key>, data: T) {
        self.notify(key, Event::new(Key::address(""), data));
    }

    /// `notify` with no payload.
    pub fn notify_empty(self: &Arc<Self>, key: impl Into<Key>) {
        self.notify(key, Event::new(Key::address(""), ()));
    }

    fn dispatch_any(self: &Arc<Self>, mut event: AnyEvent) {
        let bus = self.clone();
        let on_error_bus = self.clone();
        self.dispatcher.dispatch(
            Box::new(move || {
                let span = info_span!("bus.accept", key = %event.key());
                let _enter = span.enter();
                bus.accept(&mut event);
            }),
            Some(Box::new(move |err: &ReactorError| on_error_bus.dispatch_error_handler(err))),
        );
    }

    /// The task body: route `event` by its own key. This is what the
    /// dispatcher actually runs for every `notify`.
    pub fn accept(self: &Arc<Self>, event: &mut AnyEvent) {
        let key = event.key().clone();
        let candidates = self.registry.select(&key);
        let bus = self.clone();
        let error_sink: ErrorSink = Arc::new(move |err: &ReactorError| bus.dispatch_error_handler(err));
        self.router.route(&key, event, candidates, None, Some(&error_sink));
    }

    /// Default `dispatch_error_handler`: reroutes a dispatch-level failure as
    /// a fresh event keyed by its own Rust type, so consumers registered on
    /// that error type receive it.
    fn dispatch_error_handler(self: &Arc<Self>, err: &ReactorError) {
        let key = Key::of::<ReactorError>();
        let mut wrapped = Event::new(key.clone(), err.clone()).into_any();
        let candidates = self.registry.select(&key);
        self.router.route(&key, &mut wrapped, candidates, None, None);
    }

    /// `notify(key, ReplyToEvent(event, reply_observable ?? self))`.
    pub fn send<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        key: impl Into<Key>,
        mut event: Event<T>,
        reply_observable: Option<Arc<EventBus>>,
    ) {
        let observable = reply_observable.unwrap_or_else(|| self.clone());
        event.set_reply_to_observable(&observable);
        self.notify(key, event);
    }

    /// Allocate an anonymous selector, register a single-use consumer that
    /// invokes `reply_consumer`, point the event's `reply_to` at it, and
    /// `notify`. The registration is cancelled on first delivery.
    pub fn send_and_receive<T, R, F>(
        self: &Arc<Self>,
        key: impl Into<Key>,
        mut event: Event<T>,
        reply_consumer: F,
    ) -> Arc<Registration>
    where
        T: Send + Sync + 'static,
        R: Send + Sync + 'static,
        F: Fn(&Event<R>) + Send + Sync + 'static,
    {
        let anon = AnonymousSelector::new();
        let reply_key = anon.key();
        let registration = self.register::<R, _>(
            Arc::new(anon),
            move |event| {
                reply_consumer(&*event);
                InvocationOutcome::Ok
            },
            true,
            false,
        );
        event.set_reply_to(reply_key);
        self.notify(key, event);
        registration
    }

    /// Snapshot the current candidate list for `key`. Subsequent
    /// registrations are invisible to the returned `Prepared` consumer — the
    /// snapshot is frozen at `prepare` time, not re-selected per event.
    pub fn prepare(self: &Arc<Self>, key: impl Into<Key>) -> Prepared {
        let key = key.into();
        let candidates = self.registry.select(&key);
        Prepared {
            key,
            candidates,
            bus: self.clone(),
        }
    }

    /// A consumer that, given a batch, dispatches a single task routing
    /// every event in the batch to every currently matching consumer, then
    /// invokes `completion` once.
    pub fn batch_notify<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        key: impl Into<Key>,
        completion: Option<Arc<dyn Fn() + Send + Sync>>,
    ) -> BatchNotifier<T> {
        BatchNotifier {
            key: key.into(),
            bus: self.clone(),
            completion,
            _marker: PhantomData,
        }
    }

    /// Dispatch an opaque task applying `consumer(data)` on this bus's
    /// dispatcher.
    pub fn schedule<D: Send + 'static>(self: &Arc<Self>, consumer: impl FnOnce(D) + Send + 'static, data: D) {
        let bus = self.clone();
        self.dispatcher.dispatch(
            Box::new(move || consumer(data)),
            Some(Box::new(move |err: &ReactorError| bus.dispatch_error_handler(err))),
        );
    }

    /// True iff the registry holds at least one non-cancelled registration
    /// matching `key`.
    pub fn responds_to_key(&self, key: &Key) -> bool {
        self.registry.responds_to(key)
    }
}

/// A frozen candidate snapshot returned by `EventBus::prepare`.
pub struct Prepared {
    key: Key,
    candidates: Vec<Arc<Registration>>,
    bus: Arc<EventBus>,
}

impl Prepared {
    /// Dispatch one event (with `key` set) against exactly the snapshotted
    /// registrations, ignoring anything registered since `prepare` was called.
    pub fn accept<T: Send + Sync + 'static>(&self, data: T) {
        let mut event = Event::new(self.key.clone(), data).into_any();
        let candidates = self.candidates.clone();
        let bus = self.bus.clone();
        let key = self.key.clone();
        self.bus.dispatcher.dispatch(
            Box::new(move || {
                let error_sink: ErrorSink = Arc::new({
                    let bus = bus.clone();
                    move |err: &ReactorError| bus.dispatch_error_handler(err)
                });
                bus.router.route(&key, &mut event, candidates, None, Some(&error_sink));
            }),
            None,
        );
    }
}

/// A consumer returned by `EventBus::batch_notify` that routes an entire
/// batch as one dispatched task.
pub struct BatchNotifier<T> {
    key: Key,
    bus: Arc<EventBus>,
    completion: Option<Arc<dyn Fn() + Send + Sync>>,
    _marker: PhantomData<T>,
}

impl<T: Send + Sync + 'static> BatchNotifier<T> {
    /// Route every event in `batch` to every currently matching consumer,
    /// then invoke the completion callback once.
    pub fn accept(&self, batch: Vec<T>) {
        let bus = self.bus.clone();
        let key = self.key.clone();
        let completion = self.completion.clone();
        self.bus.dispatcher.dispatch(
            Box::new(move || {
                for item in batch {
                    let mut event = Event::new(key.clone(), item).into_any();
                    let candidates = bus.registry.select(&key);
                    let error_sink: ErrorSink = Arc::new({
                        let bus = bus.clone();
                        move |err: &ReactorError| bus.dispatch_error_handler(err)
                    });
                    bus.router.route(&key, &mut event, candidates, None, Some(&error_sink));
                }
                if let Some(completion) = completion {
                    completion();
                }
            }),
            None,
        );
    }
}
