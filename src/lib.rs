//! # reactor-core
//!
//! An in-process reactive event-dispatch runtime: a key-indexed event bus
//! with a pluggable routing/filtering pipeline, and a parallel fan-out stage
//! that splits one element stream into a fixed pool of backpressured lanes.
//!
//! ## Quick start
//!
//! ```rust
//! use reactor_core::{BusConfig, Event, EventBus};
//! use reactor_core::selector::AddressSelector;
//! use std::sync::{Arc, Mutex};
//!
//! let bus = EventBus::new(BusConfig::default());
//! let received = Arc::new(Mutex::new(Vec::new()));
//! let received2 = received.clone();
//!
//! bus.on::<String, _>(Arc::new(AddressSelector::new("events.market.forex")), move |event| {
//!     received2.lock().unwrap().push(event.data().clone());
//! });
//!
//! bus.notify("events.market.forex", Event::new("events.market.forex", "USD/CNY 7.35".to_string()));
//! assert_eq!(*received.lock().unwrap(), vec!["USD/CNY 7.35".to_string()]);
//! ```
//!
//! ## Architecture
//!
//! - [`EventBus`] — accepts `notify`/`send`/`send_and_receive`, dispatching
//!   through a [`dispatcher::Dispatcher`] with a [`router::Router`] as the task body.
//! - [`registry::Registry`] — maps a key to matching [`registration::Registration`]s.
//! - [`parallel::ParallelAction`] — fans an element stream out across `N` lanes,
//!   each a [`parallel::LanePublisher`] honoring demand-based backpressure.

pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod filter;
pub mod invoker;
pub mod key;
pub mod parallel;
pub mod registration;
pub mod registry;
pub mod reply;
pub mod router;
pub mod selector;

pub use bus::{BatchNotifier, EventBus, Prepared};
pub use config::{BusConfig, ParallelConfig};
pub use dispatcher::{Dispatcher, SyncDispatcher, TokioDispatcher};
pub use error::{ReactorError, Result};
pub use event::{AnyEvent, ErrorConsumer, Event};
pub use filter::{Filter, FirstMatchFilter, PassThroughFilter, RandomFilter, RoundRobinFilter};
pub use invoker::{ArgumentConvertingConsumerInvoker, ConsumerInvoker, InvocationOutcome};
pub use key::{Headers, Key};
pub use parallel::{LaneEvent, LanePublisher, MasterSubscriber, ParallelAction, RESERVED_SLOTS};
pub use registration::{BoxedConsumer, Registration, RegistrationState};
pub use registry::{MemoryRegistry, Registry};
pub use router::{ConsumerFilteringRouter, Router};
pub use selector::{AddressSelector, AnonymousSelector, HeaderResolver, Selector, TypeSelector};
