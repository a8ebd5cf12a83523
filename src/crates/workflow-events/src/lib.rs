//! Event and request types shared between superstep executors and the run layer.
//!
//! Everything a running workflow graph emits is a [`WorkflowEvent`]. The run
//! layer treats these values as opaque cargo: it buffers them, orders them,
//! and hands them to an observer, but never interprets their payloads. The
//! single exception is [`WorkflowEvent::RequestHalt`], which the run loop
//! recognizes as the instruction to stop driving supersteps permanently.
//!
//! Human-in-the-loop exchanges are modeled by [`ExternalRequest`] (raised by
//! an executor that needs outside input) and [`ExternalResponse`] (supplied
//! by the caller when resuming the run).

pub mod event;
pub mod request;

pub use event::WorkflowEvent;
pub use request::{ExternalRequest, ExternalResponse};
