//! Applying one consumer to one event, with payload coercion.

use crate::error::ReactorError;
use crate::event::AnyEvent;

/// Result of invoking a single consumer against a single event.
///
/// `CancelMe` replaces the sentinel-exception "cancel this consumer" protocol
/// spec.md's source material uses — a consumer that wants to unregister
/// itself returns this directly instead of throwing a special error type.
#[derive(Debug)]
pub enum InvocationOutcome {
    /// The consumer ran to completion.
    Ok,
    /// The consumer asks to be cancelled; it will not be invoked again.
    CancelMe,
    /// The consumer failed.
    Failed(ReactorError),
}

/// Strategy for applying one consumer to one type-erased event.
///
/// A `ConsumerInvoker` is stateless and shared across every registration on
/// a bus; the per-registration closure itself carries the logic that varies.
pub trait ConsumerInvoker: Send + Sync {
    /// Invoke `consumer` against `event`, coercing the payload first if the
    /// consumer expects something narrower than the type-erased envelope.
    fn invoke(
        &self,
        consumer: &dyn Fn(&mut AnyEvent) -> InvocationOutcome,
        event: &mut AnyEvent,
    ) -> InvocationOutcome;
}

/// The default invoker: applies the consumer closure directly.
///
/// Payload coercion happens inside the closure itself (see
/// `bus::EventBus::on`, which wraps a `Fn(&Event<T>)` into a
/// `BoxedConsumer` that downcasts before calling the user's function) —
/// this is the "argument converting" step spec.md §4.3 describes, performed
/// once per registration rather than duplicated per invoker call.
pub struct ArgumentConvertingConsumerInvoker;

impl ConsumerInvoker for ArgumentConvertingConsumerInvoker {
    fn invoke(
        &self,
        consumer: &dyn Fn(&mut AnyEvent) -> InvocationOutcome,
        event: &mut AnyEvent,
    ) -> InvocationOutcome {
        consumer(event)
    }
}

/// Build a boxed consumer that downcasts the type-erased payload to `T`
/// before calling `f`, failing closed with `InvocationOutcome::Failed` if the
/// concrete payload doesn't match.
pub fn coerce<T, F>(f: F) -> crate::registration::BoxedConsumer
where
    T: Send + Sync + 'static,
    F: Fn(&mut crate::event::Event<T>) -> InvocationOutcome + Send + Sync + 'static,
{
    Box::new(move |event: &mut AnyEvent| {
        let any = std::mem::replace(event, placeholder_event());
        match any.downcast::<T>() {
            Ok(mut typed) => {
                let outcome = f(&mut typed);
                *event = typed.into_any();
                outcome
            }
            Err(any) => {
                let key = any.key().to_string();
                *event = any;
                InvocationOutcome::Failed(ReactorError::PayloadMismatch {
                    key,
                    expected: std::any::type_name::<T>(),
                })
            }
        }
    })
}

fn placeholder_event() -> AnyEvent {
    crate::event::Event::new(crate::key::Key::address(""), Box::new(()) as Box<dyn std::any::Any + Send + Sync>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    #[test]
    fn coerced_consumer_runs_on_matching_payload() {
        let consumer = coerce::<u32, _>(|event| {
            assert_eq!(*event.data(), 7);
            InvocationOutcome::Ok
        });
        let mut any = Event::new("events.a", 7u32).into_any();
        let outcome = consumer(&mut any);
        assert!(matches!(outcome, InvocationOutcome::Ok));
        assert_eq!(*any.downcast_ref::<u32>().unwrap(), 7);
    }

    #[test]
    fn coerced_consumer_fails_closed_on_mismatch() {
        let consumer = coerce::<String, _>(|_event| InvocationOutcome::Ok);
        let mut any = Event::new("events.a", 7u32).into_any();
        let outcome = consumer(&mut any);
        assert!(matches!(outcome, InvocationOutcome::Failed(ReactorError::PayloadMismatch { .. })));
        // event payload is preserved even on mismatch
        assert_eq!(*any.downcast_ref::<u32>().unwrap(), 7);
    }
}
