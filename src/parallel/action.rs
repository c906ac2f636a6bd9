//! Fans an upstream element stream out into a fixed pool of lanes, honoring
//! per-lane demand-based backpressure.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::ParallelConfig;
use crate::dispatcher::Dispatcher;
use crate::error::ReactorError;
use crate::parallel::lane::{LaneEvent, LanePublisher, Subscriber};

/// Per-lane guard count subtracted from aggregate capacity before dividing,
/// preventing the master from ever promising more than the dispatcher queues
/// can individually absorb.
pub const RESERVED_SLOTS: i64 = 32;

/// Downstream of the master action itself: receives each lane's publisher as
/// an element, mirroring the upstream `request(r)` protocol.
pub trait MasterSubscriber<T>: Send + Sync {
    /// One lane has been made available to this subscriber.
    fn on_lane(&self, lane: Arc<LanePublisher<T>>);
    /// Every lane has been emitted.
    fn on_complete(&self);
}

/// The fan-out stage itself: owns `N` lanes and a round-robin cursor.
pub struct ParallelAction<T> {
    pool_size: usize,
    lanes: RwLock<Vec<Option<Arc<LanePublisher<T>>>>>,
    round_robin_index: AtomicUsize,
    master_capacity: AtomicI64,
    per_lane_capacity: AtomicI64,
    events_rx: Mutex<mpsc::UnboundedReceiver<LaneEvent>>,
    events_tx: mpsc::UnboundedSender<LaneEvent>,
    master_cursor: AtomicUsize,
    master_subscriber: RwLock<Option<Arc<dyn MasterSubscriber<T>>>>,
}

impl<T: Send + Sync + 'static> ParallelAction<T> {
    /// Build a new action with `config.pool_size` lanes, created eagerly,
    /// each backed by a dispatcher from `dispatcher_for_lane`.
    pub fn new(
        config: ParallelConfig,
        dispatcher_for_lane: impl Fn(usize) -> Arc<dyn Dispatcher>,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let lanes = (0..config.pool_size)
            .map(|i| Some(LanePublisher::new(i, dispatcher_for_lane(i), events_tx.clone())))
            .collect();

        let action = Arc::new(Self {
            pool_size: config.pool_size,
            lanes: RwLock::new(lanes),
            round_robin_index: AtomicUsize::new(0),
            master_capacity: AtomicI64::new(0),
            per_lane_capacity: AtomicI64::new(0),
            events_rx: Mutex::new(events_rx),
            events_tx,
            master_cursor: AtomicUsize::new(0),
            master_subscriber: RwLock::new(None),
        });
        action.capacity(config.capacity, config.reserved_slots);
        action
    }

    /// Number of lanes.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Apply the capacity policy for an aggregate downstream capacity `e`.
    fn capacity(&self, e: i64, reserved_slots: i64) {
        let n = self.pool_size as i64;
        let g = n * reserved_slots;

        let master_capacity = if e < g {
            warn!(aggregate = e, guard = g, "capacity below reservation guard; using aggregate as-is");
            e
        } else {
            e - g + reserved_slots
        };
        self.master_capacity.store(master_capacity, Ordering::Release);

        let mut c = e / n.max(1);
        if c == 0 {
            warn!(aggregate = e, pool_size = self.pool_size, "per-lane capacity rounds to zero; lanes share the full budget");
            c = e;
        }
        self.per_lane_capacity.store(c, Ordering::Release);

        let lanes = self.lanes.read().unwrap();
        for lane in lanes.iter().flatten() {
            lane.set_capacity(c);
        }
    }

    /// Current effective master capacity (after the reservation guard).
    pub fn master_capacity(&self) -> i64 {
        self.master_capacity.load(Ordering::Acquire)
    }

    /// Current per-lane capacity budget.
    pub fn per_lane_capacity(&self) -> i64 {
        self.per_lane_capacity.load(Ordering::Acquire)
    }

    /// Drain pending lane events (demand increases, cancellations). The core
    /// has no thread of its own, so this runs synchronously on whichever
    /// caller thread touches the action next, rather than via a background
    /// task.
    fn drain_lane_events(&self) {
        let mut rx = self.events_rx.lock().unwrap();
        while let Ok(event) = rx.try_recv() {
            match event {
                LaneEvent::Requested { .. } => {
                    // Demand already applied locally by the lane itself;
                    // nothing upstream to pull from in this push-based core.
                }
                LaneEvent::Cancelled { index } => {
                    let mut lanes = self.lanes.write().unwrap();
                    if let Some(slot) = lanes.get_mut(index) {
                        *slot = None;
                    }
                }
            }
        }
    }

    /// Deliver one element to exactly one lane.
    ///
    /// Probes up to `N` lanes starting at the round-robin cursor; delivers to
    /// the first eligible lane (existing, subscribed, demand > 0). If none
    /// had demand but at least one lane existed, falls back to the last
    /// existing lane probed (best-effort delivery under backpressure
    /// exhaustion). If every lane is empty, drops the element.
    pub fn do_next(&self, ev: T) {
        self.drain_lane_events();

        let n = self.pool_size;
        let start = self.round_robin_index.load(Ordering::Acquire);
        let mut last_existing: Option<Arc<LanePublisher<T>>> = None;

        let lanes_snapshot: Vec<Option<Arc<LanePublisher<T>>>> = self.lanes.read().unwrap().clone();

        for probe in 0..n {
            let idx = (start + probe) % n;
            if let Some(lane) = &lanes_snapshot[idx] {
                last_existing = Some(lane.clone());
                if lane.has_subscriber() && lane.remaining_capacity() > 0 {
                    self.round_robin_index.store((idx + 1) % n, Ordering::Release);
                    lane.broadcast_next(ev);
                    return;
                }
            }
            self.round_robin_index.store((idx + 1) % n, Ordering::Release);
        }

        if let Some(lane) = last_existing {
            debug!(lane = lane.index(), "no lane had demand; falling back to last existing lane");
            lane.broadcast_next(ev);
            return;
        }

        debug!("all lanes empty, dropping event");
    }

    /// Propagate a terminal error to every lane.
    pub fn do_error(&self, err: ReactorError) {
        self.drain_lane_events();
        let lanes = self.lanes.read().unwrap();
        for lane in lanes.iter().flatten() {
            lane.broadcast_error(err.clone());
        }
    }

    /// Propagate normal completion to every lane.
    pub fn do_complete(&self) {
        self.drain_lane_events();
        let lanes = self.lanes.read().unwrap();
        for lane in lanes.iter().flatten() {
            lane.broadcast_complete();
        }
    }

    /// Borrow lane `index`, if it still exists.
    pub fn lane(&self, index: usize) -> Option<Arc<LanePublisher<T>>> {
        self.lanes.read().unwrap().get(index).cloned().flatten()
    }

    /// Register the subscriber that receives each lane as an element of the
    /// master stream, then immediately process any already-buffered request.
    pub fn subscribe_master(&self, subscriber: Arc<dyn MasterSubscriber<T>>) {
        *self.master_subscriber.write().unwrap() = Some(subscriber);
    }

    /// Downstream requests `r` more lanes-as-elements: emit lanes
    /// `[cursor, min(cursor + r, N))`, advancing the cursor; signal
    /// completion once the cursor reaches `N`.
    pub fn request_master(&self, r: usize) {
        let subscriber = self.master_subscriber.read().unwrap().clone();
        let Some(subscriber) = subscriber else { return };

        let lanes = self.lanes.read().unwrap();
        let start = self.master_cursor.load(Ordering::Acquire);
        let end = (start + r).min(self.pool_size);
        for idx in start..end {
            if let Some(lane) = &lanes[idx] {
                subscriber.on_lane(lane.clone());
            }
        }
        self.master_cursor.store(end, Ordering::Release);
        if end >= self.pool_size {
            subscriber.on_complete();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::SyncDispatcher;
    use crate::parallel::lane::Subscriber;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::sync::Mutex as StdMutex;

    fn action(pool_size: usize, capacity: i64) -> Arc<ParallelAction<u32>> {
        ParallelAction::new(ParallelConfig::new(pool_size, capacity), |_| Arc::new(SyncDispatcher))
    }

    struct Counting {
        count: StdAtomicUsize,
    }
    impl Subscriber<u32> for Counting {
        fn on_next(&self, _item: u32) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
        fn on_error(&self, _err: &ReactorError) {}
        fn on_complete(&self) {}
    }

    fn subscribe_all(action: &Arc<ParallelAction<u32>>) -> Vec<Arc<Counting>> {
        let mut subs = Vec::new();
        for i in 0..action.pool_size() {
            let sub = Arc::new(Counting {
                count: StdAtomicUsize::new(0),
            });
            let lane = action.lane(i).unwrap();
            lane.subscribe(sub.clone());
            lane.request(i64::MAX / 2);
            subs.push(sub);
        }
        subs
    }

    #[test]
    fn capacity_below_guard_keeps_aggregate() {
        let action = action(4, 10);
        assert_eq!(action.master_capacity(), 10);
    }

    #[test]
    fn capacity_above_guard_subtracts_reservation() {
        let action = action(4, 1024);
        let g = 4 * RESERVED_SLOTS;
        assert_eq!(action.master_capacity(), 1024 - g + RESERVED_SLOTS);
        assert_eq!(action.per_lane_capacity(), 1024 / 4);
    }

    #[test]
    fn zero_per_lane_capacity_falls_back_to_full_budget() {
        let action = action(8, 4);
        assert_eq!(action.per_lane_capacity(), 4);
    }

    #[test]
    fn round_robin_distributes_approximately_evenly() {
        let action = action(4, 1024);
        let subs = subscribe_all(&action);
        for i in 0..1000u32 {
            action.do_next(i);
        }
        let counts: Vec<_> = subs.iter().map(|s| s.count.load(Ordering::SeqCst)).collect();
        assert_eq!(counts.iter().sum::<usize>(), 1000);
        for c in counts {
            assert!((225..=275).contains(&c), "lane count {c} out of fair range");
        }
    }

    #[test]
    fn cancelled_lane_receives_nothing_once_cleared() {
        let action = action(2, 256);
        let subs = subscribe_all(&action);
        action.lane(0).unwrap().cancel();
        for i in 0..10u32 {
            action.do_next(i);
        }
        assert_eq!(subs[0].count.load(Ordering::SeqCst), 0);
        assert_eq!(subs[1].count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn all_lanes_empty_drops_silently() {
        let action = action(1, 64);
        action.lane(0).unwrap().cancel();
        action.do_next(1);
    }

    #[test]
    fn master_subscription_emits_lanes_in_batches_then_completes() {
        let action = action(3, 128);
        struct Collector {
            seen: StdMutex<Vec<usize>>,
            completed: std::sync::atomic::AtomicBool,
        }
        impl MasterSubscriber<u32> for Collector {
            fn on_lane(&self, lane: Arc<LanePublisher<u32>>) {
                self.seen.lock().unwrap().push(lane.index());
            }
            fn on_complete(&self) {
                self.completed.store(true, Ordering::SeqCst);
            }
        }
        let collector = Arc::new(Collector {
            seen: StdMutex::new(Vec::new()),
            completed: std::sync::atomic::AtomicBool::new(false),
        });
        action.subscribe_master(collector.clone());
        action.request_master(2);
        assert_eq!(*collector.seen.lock().unwrap(), vec![0, 1]);
        assert!(!collector.completed.load(Ordering::SeqCst));
        action.request_master(5);
        assert_eq!(*collector.seen.lock().unwrap(), vec![0, 1, 2]);
        assert!(collector.completed.load(Ordering::SeqCst));
    }
}
