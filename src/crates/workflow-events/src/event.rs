//! The workflow event family.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::ExternalRequest;

/// An immutable unit of output from a superstep.
///
/// Events are emitted by executors while a superstep runs and delivered to
/// observers in emission order. The run layer never inspects payloads; the
/// only variant with control-flow meaning to it is [`RequestHalt`], which
/// ends the run permanently.
///
/// # Examples
///
/// ```rust
/// use workflow_events::WorkflowEvent;
/// use serde_json::json;
///
/// let event = WorkflowEvent::WorkflowOutput {
///     source_id: "summarizer".to_string(),
///     data: json!("report complete"),
/// };
/// assert!(event.is_output());
/// assert!(!event.is_request_halt());
/// ```
///
/// [`RequestHalt`]: WorkflowEvent::RequestHalt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum WorkflowEvent {
    /// An executor received a message and began handling it.
    ExecutorInvoked {
        /// Identifier of the executor that was invoked.
        executor_id: String,
        /// The message the executor was invoked with.
        message: Value,
    },

    /// An executor finished handling its message.
    ExecutorCompleted {
        /// Identifier of the executor that completed.
        executor_id: String,
    },

    /// An executor failed while handling its message.
    ExecutorFailed {
        /// Identifier of the executor that failed.
        executor_id: String,
        /// Rendered failure description.
        error: String,
    },

    /// A superstep began.
    SuperStepStarted {
        /// Zero-based superstep index within the run.
        step: usize,
    },

    /// A superstep finished and its writes were applied.
    SuperStepCompleted {
        /// Zero-based superstep index within the run.
        step: usize,
    },

    /// An executor published workflow-level output.
    WorkflowOutput {
        /// Identifier of the executor that produced the output.
        source_id: String,
        /// The output payload.
        data: Value,
    },

    /// The workflow surfaced a failure as data rather than a panic.
    WorkflowError {
        /// Rendered failure description.
        error: String,
    },

    /// An executor raised a request that must be answered externally
    /// before the graph can converge.
    RequestInfo {
        /// The outstanding request.
        request: ExternalRequest,
    },

    /// Instructs the run loop to stop driving supersteps permanently.
    ///
    /// This is the only event the run layer interprets. It is still
    /// delivered through the same channel as every other event so that
    /// ordering relative to preceding output is preserved.
    RequestHalt,
}

impl WorkflowEvent {
    /// Whether this event is the permanent-halt instruction.
    pub fn is_request_halt(&self) -> bool {
        matches!(self, Self::RequestHalt)
    }

    /// Whether this event carries workflow-level output.
    pub fn is_output(&self) -> bool {
        matches!(self, Self::WorkflowOutput { .. })
    }

    /// Whether this event is an outstanding external request.
    pub fn is_request(&self) -> bool {
        matches!(self, Self::RequestInfo { .. })
    }
}
