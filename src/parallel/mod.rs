//! Parallel fan-out: splits one logical stream into a fixed pool of lanes.

pub mod action;
pub mod lane;

pub use action::{MasterSubscriber, ParallelAction, RESERVED_SLOTS};
pub use lane::{LaneEvent, LanePublisher, Subscriber};
