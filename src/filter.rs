//! Narrowing a candidate registration list by key, order-preserving.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;

use crate::key::Key;
use crate::registration::Registration;

/// Strategy that narrows a registration list by key, preserving order.
pub trait Filter: Send + Sync {
    /// Narrow `candidates` for delivery against `key`.
    fn filter(&self, candidates: Vec<Arc<Registration>>, key: &Key) -> Vec<Arc<Registration>>;
}

/// The default filter: returns every candidate unchanged.
pub struct PassThroughFilter;

impl Filter for PassThroughFilter {
    fn filter(&self, candidates: Vec<Arc<Registration>>, _key: &Key) -> Vec<Arc<Registration>> {
        candidates
    }
}

/// Keeps only the first surviving candidate, dropping the rest.
pub struct FirstMatchFilter;

impl Filter for FirstMatchFilter {
    fn filter(&self, candidates: Vec<Arc<Registration>>, _key: &Key) -> Vec<Arc<Registration>> {
        candidates.into_iter().take(1).collect()
    }
}

/// Picks exactly one candidate, cycling through the list across calls.
pub struct RoundRobinFilter {
    cursor: AtomicUsize,
}

impl RoundRobinFilter {
    /// A fresh round-robin filter starting at index zero.
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for RoundRobinFilter {
    fn filter(&self, candidates: Vec<Arc<Registration>>, _key: &Key) -> Vec<Arc<Registration>> {
        if candidates.is_empty() {
            return candidates;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
        vec![candidates[idx].clone()]
    }
}

/// Picks exactly one candidate at random.
pub struct RandomFilter;

impl Filter for RandomFilter {
    fn filter(&self, candidates: Vec<Arc<Registration>>, _key: &Key) -> Vec<Arc<Registration>> {
        if candidates.is_empty() {
            return candidates;
        }
        let idx = rand::thread_rng().gen_range(0..candidates.len());
        vec![candidates[idx].clone()]
    }
}
