//! Off-thread run loop and event streaming for superstep workflow graphs.
//!
//! This crate turns a synchronous, discrete-step execution engine (a
//! [`SuperStepRunner`] that advances a dataflow graph one batch at a time)
//! into an asynchronously observable, pausable, and resumable run. It owns:
//!
//! - driving repeated supersteps until the graph has no pending work or
//!   issues an explicit halt ([`event_stream::RunEventStream`]),
//! - publishing emitted events to exactly one external observer without
//!   busy-polling ([`coordinator::AsyncCoordinator`]),
//! - discarding stale halt signals across run/resume cycles via an epoch
//!   counter, and
//! - a higher-level facade that buffers all events, tracks an incremental
//!   read bookmark, and exposes resume-with-input semantics ([`Run`]).
//!
//! The executor graph itself, message-type dispatch, durable state, and any
//! HTTP/UI surface are external collaborators reached only through the
//! [`SuperStepRunner`] and [`InputCoordinator`] contracts.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use workflow_run::{InputGate, Run, StreamingRun};
//!
//! # async fn example(runner: Arc<dyn workflow_run::SuperStepRunner>, gate: Arc<InputGate>) -> workflow_run::Result<()> {
//! let streaming = StreamingRun::new(runner, gate);
//! let run = Run::capture_stream(streaming, CancellationToken::new()).await?;
//!
//! for event in run.new_events() {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod error;
pub mod event_stream;
pub mod init_cell;
pub mod run;
pub mod runner;
pub mod status;

pub use coordinator::{AsyncCoordinator, InputGate};
pub use error::{Result, RunError};
pub use event_stream::RunEventStream;
pub use init_cell::InitCell;
pub use run::{Run, StreamingRun};
pub use runner::{EventCallback, InputCoordinator, SubscriptionId, SuperStepRunner};
pub use status::RunStatus;

// Re-exported so embedders and runner implementations share one event
// vocabulary without importing workflow-events directly.
pub use workflow_events::{ExternalRequest, ExternalResponse, WorkflowEvent};
