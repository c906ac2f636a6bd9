//! Error types for reactor-core

use thiserror::Error;

/// Errors that can occur while routing or dispatching events
#[derive(Debug, Clone, Error)]
pub enum ReactorError {
    /// A consumer threw while handling an event
    #[error("consumer failed for key '{key}': {reason}")]
    ConsumerFailure { key: String, reason: String },

    /// A completion callback threw after routing finished
    #[error("completion handler failed for key '{key}': {reason}")]
    CompletionFailure { key: String, reason: String },

    /// The dispatcher failed to execute a task
    #[error("dispatch failed: {0}")]
    DispatchFailure(String),

    /// A payload did not match the shape a consumer expected
    #[error("payload coercion failed for key '{key}': expected {expected}")]
    PayloadMismatch { key: String, expected: &'static str },

    /// Configuration or construction error
    #[error("configuration error: {0}")]
    Config(String),

    /// A lock was poisoned by a panicking holder
    #[error("lock poisoned: {0}")]
    Poisoned(String),

    /// Anything that escapes the above — last-resort sink
    #[error("uncaught failure: {0}")]
    Uncaught(String),
}

/// Result type alias for reactor-core operations
pub type Result<T> = std::result::Result<T, ReactorError>;

/// Extract a readable message from a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked with a non-string payload".to_string()
    }
}
