//! Executors that run a task (payload + consumer + error handler) somewhere.

use tracing::error;

use crate::error::ReactorError;

/// A unit of work the dispatcher runs: apply a consumer to a payload,
/// reporting failure to an error handler instead of propagating.
pub type Task = Box<dyn FnOnce() + Send>;

/// Executes tasks on some execution context. Must be safe to call from any
/// thread.
pub trait Dispatcher: Send + Sync {
    /// Schedule `task` for execution, invoking `on_error` if running it fails.
    ///
    /// `task` itself is expected to report its own failures through whatever
    /// error sink it was built with (the router does this); `on_error` here
    /// covers dispatch-level failure — the executor itself being unable to
    /// run the task at all.
    fn dispatch(&self, task: Task, on_error: Option<Box<dyn Fn(&ReactorError) + Send + Sync>>);
}

/// Runs every task inline, on the calling thread.
///
/// The event bus's zero-dependency default: "if no dispatcher supplied, use
/// a synchronous one that runs tasks on the caller's thread."
pub struct SyncDispatcher;

impl Dispatcher for SyncDispatcher {
    fn dispatch(&self, task: Task, on_error: Option<Box<dyn Fn(&ReactorError) + Send + Sync>>) {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
        if let Err(payload) = result {
            let reason = panic_message(&payload);
            let err = ReactorError::DispatchFailure(reason);
            match on_error {
                Some(handler) => handler(&err),
                None => error!(error = %err, "dispatch failed with no error handler"),
            }
        }
    }
}

/// Spawns every task onto the ambient Tokio runtime. The concurrent default
/// used by parallel-action lanes.
pub struct TokioDispatcher {
    handle: tokio::runtime::Handle,
}

impl TokioDispatcher {
    /// Build a dispatcher bound to the current Tokio runtime handle.
    ///
    /// Panics if called outside a Tokio runtime context, matching
    /// `tokio::runtime::Handle::current`'s own contract.
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl Dispatcher for TokioDispatcher {
    fn dispatch(&self, task: Task, on_error: Option<Box<dyn Fn(&ReactorError) + Send + Sync>>) {
        let _handle = self.handle.spawn_blocking(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
            if let Err(payload) = result {
                let reason = panic_message(&payload);
                let err = ReactorError::DispatchFailure(reason);
                match on_error {
                    Some(handler) => handler(&err),
                    None => error!(error = %err, "dispatch failed with no error handler"),
                }
            }
        });
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "consumer task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn sync_dispatcher_runs_task_inline() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        SyncDispatcher.dispatch(Box::new(move || ran2.store(true, Ordering::SeqCst)), None);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn sync_dispatcher_reports_panics_as_dispatch_failure() {
        let caught = Arc::new(AtomicBool::new(false));
        let caught2 = caught.clone();
        SyncDispatcher.dispatch(
            Box::new(|| panic!("boom")),
            Some(Box::new(move |err| {
                assert!(matches!(err, ReactorError::DispatchFailure(_)));
                caught2.store(true, Ordering::SeqCst);
            })),
        );
        assert!(caught.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn tokio_dispatcher_runs_task() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        let dispatcher = TokioDispatcher::current();
        dispatcher.dispatch(Box::new(move || ran2.store(true, Ordering::SeqCst)), None);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
