//! Delivers one event to a list of candidate registrations.

use std::sync::Arc;
use tracing::warn;

use crate::error::ReactorError;
use crate::event::AnyEvent;
use crate::filter::Filter;
use crate::invoker::{ConsumerInvoker, InvocationOutcome};
use crate::key::Key;
use crate::registration::Registration;

/// Sink a routing failure is handed to instead of propagating.
pub type ErrorSink = Arc<dyn Fn(&ReactorError) + Send + Sync>;

/// Callback invoked once after every survivor has been attempted.
pub type Completion = Box<dyn FnOnce(&mut AnyEvent) -> Result<(), ReactorError> + Send>;

/// Strategy that delivers one event to a list of candidate registrations.
pub trait Router: Send + Sync {
    /// Route `event` (addressed at `key`) to `candidates`, filtering first
    /// and invoking every surviving, non-cancelled, non-paused registration.
    fn route(
        &self,
        key: &Key,
        event: &mut AnyEvent,
        candidates: Vec<Arc<Registration>>,
        completion: Option<Completion>,
        error_sink: Option<&ErrorSink>,
    );
}

/// The default router: filters candidates, then invokes survivors in order,
/// isolating per-consumer failures so one throwing consumer never blocks its
/// siblings.
pub struct ConsumerFilteringRouter<F, I> {
    filter: F,
    invoker: I,
}

impl<F, I> ConsumerFilteringRouter<F, I>
where
    F: Filter,
    I: ConsumerInvoker,
{
    /// Build a router from a filter and invoker. Bus constructs one instance
    /// of this per bus — there is no process-wide default router singleton.
    pub fn new(filter: F, invoker: I) -> Self {
        Self { filter, invoker }
    }
}

impl<F, I> Router for ConsumerFilteringRouter<F, I>
where
    F: Filter,
    I: ConsumerInvoker,
{
    fn route(
        &self,
        key: &Key,
        event: &mut AnyEvent,
        candidates: Vec<Arc<Registration>>,
        completion: Option<Completion>,
        error_sink: Option<&ErrorSink>,
    ) {
        if candidates.is_empty() {
            run_completion(completion, event, error_sink, key);
            return;
        }

        let survivors = self.filter.filter(candidates, key);

        for registration in &survivors {
            if registration.is_cancelled() || registration.is_paused() {
                continue;
            }

            let outcome = self
                .invoker
                .invoke(&|e| registration.invoke(e), event);

            match outcome {
                InvocationOutcome::CancelMe => {
                    registration.cancel();
                }
                InvocationOutcome::Failed(err) => {
                    if let Some(sink) = error_sink {
                        sink(&err);
                    } else {
                        warn!(key = %key, error = %err, "consumer failed with no error sink; re-raising");
                    }
                }
                InvocationOutcome::Ok => {
                    if registration.cancel_after_use() {
                        registration.cancel();
                    }
                }
            }
        }

        run_completion(completion, event, error_sink, key);
    }
}

fn run_completion(
    completion: Option<Completion>,
    event: &mut AnyEvent,
    error_sink: Option<&ErrorSink>,
    key: &Key,
) {
    let Some(completion) = completion else {
        return;
    };
    if let Err(err) = completion(event) {
        let completion_err = ReactorError::CompletionFailure {
            key: key.to_string(),
            reason: err.to_string(),
        };
        if let Some(sink) = error_sink {
            sink(&completion_err);
        } else {
            warn!(key = %key, error = %completion_err, "completion handler failed with no error sink");
        }
    }
}
