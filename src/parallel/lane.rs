//! Per-lane publisher: wraps a dedicated dispatcher and exposes a
//! single-subscriber Reactive-Streams-style interface.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use crate::dispatcher::Dispatcher;
use crate::error::ReactorError;

/// Downstream consumer of one lane's elements.
pub trait Subscriber<T>: Send + Sync {
    /// Deliver one element.
    fn on_next(&self, item: T);
    /// Deliver a terminal error.
    fn on_error(&self, err: &ReactorError);
    /// Deliver normal completion.
    fn on_complete(&self);
}

/// Message a lane sends back to its parent action.
///
/// A channel, not a weak pointer back-reference: the lane only ever needs to
/// push two kinds of fact upstream (more demand, or "I'm gone"), and a
/// channel carries both without the lane holding any reference to the parent
/// at all.
pub enum LaneEvent {
    /// Lane `index` had its demand increased by `amount`.
    Requested { index: usize, amount: i64 },
    /// Lane `index` was cancelled by its downstream subscriber.
    Cancelled { index: usize },
}

/// One of the `N` parallel publishers owned by a `ParallelAction`.
pub struct LanePublisher<T> {
    index: usize,
    demand: AtomicI64,
    capacity: AtomicI64,
    subscriber: RwLock<Option<Arc<dyn Subscriber<T>>>>,
    dispatcher: Arc<dyn Dispatcher>,
    parent_tx: mpsc::UnboundedSender<LaneEvent>,
}

impl<T: Send + Sync + 'static> LanePublisher<T> {
    /// Build a fresh lane at `index`, backed by `dispatcher`, reporting
    /// demand/cancellation back to the parent through `parent_tx`.
    pub fn new(index: usize, dispatcher: Arc<dyn Dispatcher>, parent_tx: mpsc::UnboundedSender<LaneEvent>) -> Arc<Self> {
        Arc::new(Self {
            index,
            demand: AtomicI64::new(0),
            capacity: AtomicI64::new(0),
            subscriber: RwLock::new(None),
            dispatcher,
            parent_tx,
        })
    }

    /// This lane's index in the parent's lane array.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Attach the single downstream subscriber for this lane.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        *self.subscriber.write().unwrap() = Some(subscriber);
    }

    /// Whether a downstream subscriber is currently attached.
    pub fn has_subscriber(&self) -> bool {
        self.subscriber.read().unwrap().is_some()
    }

    /// Outstanding demand not yet fulfilled by a delivered element.
    pub fn remaining_capacity(&self) -> i64 {
        self.demand.load(Ordering::Acquire)
    }

    /// Set the per-lane capacity budget assigned by the parent's capacity policy.
    pub fn set_capacity(&self, c: i64) {
        self.capacity.store(c, Ordering::Release);
    }

    /// Configured per-lane capacity budget.
    pub fn capacity(&self) -> i64 {
        self.capacity.load(Ordering::Acquire)
    }

    /// Downstream requests `r` more elements: update local demand and notify
    /// the parent so it can pull more from upstream to refill this lane.
    pub fn request(&self, r: i64) {
        self.demand.fetch_add(r, Ordering::AcqRel);
        let _ = self.parent_tx.send(LaneEvent::Requested {
            index: self.index,
            amount: r,
        });
    }

    /// Cancel locally, then tell the parent to clear this lane's slot. This
    /// is the only path by which a lane becomes empty.
    pub fn cancel(&self) {
        *self.subscriber.write().unwrap() = None;
        let _ = self.parent_tx.send(LaneEvent::Cancelled { index: self.index });
    }

    /// Deliver one element, consuming one unit of demand. Dispatched through
    /// this lane's own dispatcher so it never races ahead of prior elements.
    /// A subscriber that panics on this element has the panic routed to
    /// `broadcast_error` instead of merely being logged by the dispatcher.
    pub fn broadcast_next(self: &Arc<Self>, item: T) {
        self.demand.fetch_sub(1, Ordering::AcqRel);
        let subscriber = self.subscriber.read().unwrap().clone();
        let lane = self.clone();
        self.dispatcher.dispatch(
            Box::new(move || {
                if let Some(s) = subscriber {
                    s.on_next(item);
                }
            }),
            Some(Box::new(move |err: &ReactorError| lane.broadcast_error(err.clone()))),
        );
    }

    /// Broadcast a terminal error, dispatched through this lane's dispatcher
    /// so it happens-after every element already in flight on this lane.
    pub fn broadcast_error(self: &Arc<Self>, err: ReactorError) {
        let subscriber = self.subscriber.read().unwrap().clone();
        self.dispatcher.dispatch(
            Box::new(move || {
                if let Some(s) = subscriber {
                    s.on_error(&err);
                }
            }),
            None,
        );
    }

    /// Broadcast normal completion, dispatched through this lane's dispatcher.
    pub fn broadcast_complete(self: &Arc<Self>) {
        let subscriber = self.subscriber.read().unwrap().clone();
        self.dispatcher.dispatch(
            Box::new(move || {
                if let Some(s) = subscriber {
                    s.on_complete();
                }
            }),
            None,
        );
    }
}
