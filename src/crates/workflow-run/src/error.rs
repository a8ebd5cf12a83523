//! Error types for the run layer.
//!
//! The taxonomy is deliberately small. Protocol violations
//! ([`RunError::StreamTaken`]) are reported to the violating caller without
//! disturbing anyone else. Cancellation ([`RunError::Cancelled`]) is
//! expected and recoverable, and is kept distinct from a natural halt so
//! callers never confuse the two. Failures escaping a superstep are the
//! graph's failures; this layer surfaces them without retrying.

use thiserror::Error;

/// Convenience result type using [`RunError`].
pub type Result<T> = std::result::Result<T, RunError>;

/// Errors produced by the run loop, the event stream, and the run facades.
#[derive(Error, Debug)]
pub enum RunError {
    /// A second drain was attempted while one was already active.
    ///
    /// The contract is one watcher, not queued watchers: the existing drain
    /// is unaffected and the new caller fails immediately.
    #[error("an event stream watcher is already active for this run")]
    StreamTaken,

    /// A suspension point was cancelled via its cancellation token.
    ///
    /// Cancelling a drain stops only that drain call; the background loop
    /// keeps running. This is never reported for a natural halt.
    #[error("operation was cancelled")]
    Cancelled,

    /// Input was sent to a run whose loop has terminated permanently.
    #[error("run has already ended")]
    RunEnded,

    /// A superstep failed and the failure escaped the executor graph.
    #[error("superstep execution failed: {0}")]
    Executor(String),

    /// Input could not be delivered to the workflow.
    #[error("failed to deliver input to the workflow: {0}")]
    Send(String),

    /// A typed message could not be serialized for delivery.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RunError {
    /// Whether this error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
