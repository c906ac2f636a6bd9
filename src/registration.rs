//! Live bindings of a selector to a consumer, with lifecycle state.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::event::AnyEvent;
use crate::invoker::InvocationOutcome;
use crate::selector::Selector;

/// Lifecycle state of a `Registration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RegistrationState {
    Active = 0,
    Paused = 1,
    Cancelled = 2,
}

impl RegistrationState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => RegistrationState::Active,
            1 => RegistrationState::Paused,
            _ => RegistrationState::Cancelled,
        }
    }
}

/// A type-erased consumer invoked by the router once a registration survives
/// filtering.
///
/// Takes the fully type-erased event; concrete-typed consumers are adapted
/// into this shape by `ConsumerInvoker` impls (see `invoker.rs`), which
/// downcast the payload before calling the user's closure.
pub type BoxedConsumer = Box<dyn Fn(&mut AnyEvent) -> InvocationOutcome + Send + Sync>;

/// A live binding of a `Selector` to a consumer.
///
/// Shared via `Arc` so the registry and any in-flight dispatch task can hold
/// it concurrently; lifetime is that of the longest holder. Once cancelled,
/// a registration is never delivered to again — state only ever moves
/// forward (`Active`/`Paused` → `Cancelled` is one-way).
pub struct Registration {
    selector: Arc<dyn Selector>,
    consumer: BoxedConsumer,
    state: AtomicU8,
    cancel_after_use: bool,
    pausable: bool,
}

impl Registration {
    /// Build a new, active registration.
    pub fn new(
        selector: Arc<dyn Selector>,
        consumer: BoxedConsumer,
        cancel_after_use: bool,
        pausable: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            selector,
            consumer,
            state: AtomicU8::new(RegistrationState::Active as u8),
            cancel_after_use,
            pausable,
        })
    }

    /// The selector this registration was created with.
    pub fn selector(&self) -> &Arc<dyn Selector> {
        &self.selector
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RegistrationState {
        RegistrationState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True once cancelled; this is permanent.
    pub fn is_cancelled(&self) -> bool {
        self.state() == RegistrationState::Cancelled
    }

    /// True while paused (skipped by routing but not yet removed).
    pub fn is_paused(&self) -> bool {
        self.state() == RegistrationState::Paused
    }

    /// Whether this registration should be cancelled after its first delivery.
    pub fn cancel_after_use(&self) -> bool {
        self.cancel_after_use
    }

    /// Whether this registration can be paused at all.
    pub fn pausable(&self) -> bool {
        self.pausable
    }

    /// Cancel this registration. Idempotent; irreversible.
    pub fn cancel(&self) {
        self.state.store(RegistrationState::Cancelled as u8, Ordering::Release);
    }

    /// Pause delivery without cancelling. A no-op if this registration isn't
    /// pausable, or once cancelled.
    pub fn pause(&self) {
        if !self.pausable {
            return;
        }
        let _ = self.state.compare_exchange(
            RegistrationState::Active as u8,
            RegistrationState::Paused as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Resume a paused registration. A no-op once cancelled.
    pub fn resume(&self) {
        let _ = self.state.compare_exchange(
            RegistrationState::Paused as u8,
            RegistrationState::Active as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Invoke the bound consumer against a type-erased event.
    pub fn invoke(&self, event: &mut AnyEvent) -> InvocationOutcome {
        (self.consumer)(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use crate::selector::AddressSelector;

    fn noop_registration(cancel_after_use: bool) -> Arc<Registration> {
        Registration::new(
            Arc::new(AddressSelector::new("events.a")),
            Box::new(|_event| InvocationOutcome::Ok),
            cancel_after_use,
            true,
        )
    }

    #[test]
    fn starts_active() {
        let reg = noop_registration(false);
        assert_eq!(reg.state(), RegistrationState::Active);
        assert!(!reg.is_cancelled());
    }

    #[test]
    fn cancel_is_permanent() {
        let reg = noop_registration(false);
        reg.cancel();
        reg.resume();
        assert!(reg.is_cancelled());
    }

    #[test]
    fn pause_then_resume_round_trips() {
        let reg = noop_registration(false);
        reg.pause();
        assert!(reg.is_paused());
        reg.resume();
        assert_eq!(reg.state(), RegistrationState::Active);
    }

    #[test]
    fn selector_is_reachable_for_matching() {
        let reg = noop_registration(false);
        assert!(reg.selector().matches(&Key::address("events.a")));
    }

    #[test]
    fn pause_is_a_no_op_when_not_pausable() {
        let reg = Registration::new(
            Arc::new(AddressSelector::new("events.a")),
            Box::new(|_event| InvocationOutcome::Ok),
            false,
            false,
        );
        reg.pause();
        assert_eq!(reg.state(), RegistrationState::Active);
        assert!(!reg.is_paused());
    }
}
