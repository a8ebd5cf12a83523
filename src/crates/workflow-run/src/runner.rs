//! Collaborator contracts: the superstep runner and the input gate.
//!
//! The executor graph itself lives behind [`SuperStepRunner`]; this layer
//! only drives it one superstep at a time and listens to the events it
//! raises. Event delivery is explicit callback registration rather than a
//! broadcast channel: the run loop installs its callback before entering
//! the loop and removes it through a drop guard, so a failing loop still
//! detaches its handler.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use workflow_events::{ExternalResponse, WorkflowEvent};

use crate::error::Result;

/// Callback invoked synchronously for every event a superstep raises.
pub type EventCallback = Arc<dyn Fn(WorkflowEvent) + Send + Sync>;

/// Handle identifying one event-callback registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Drives a workflow graph one discrete batch of work at a time.
///
/// Implementations own message routing, type dispatch, and durable state;
/// the run layer only ever asks them to advance, queries their two
/// progress booleans, and feeds them input.
#[async_trait]
pub trait SuperStepRunner: Send + Sync {
    /// Stable identifier for this run, caller-supplied or generated.
    fn run_id(&self) -> &str;

    /// Identifier of the graph's entry executor.
    fn start_executor_id(&self) -> &str;

    /// Whether messages remain queued for a future superstep.
    fn has_unprocessed_messages(&self) -> bool;

    /// Whether any external request is still awaiting its response.
    fn has_unserviced_requests(&self) -> bool;

    /// Deliver a response to an outstanding external request.
    async fn enqueue_response(&self, response: ExternalResponse) -> Result<()>;

    /// Offer a message to the graph's entry executor.
    ///
    /// Returns `false` if the entry executor does not accept the message's
    /// shape; whether that is silently dropped or reported further is the
    /// graph's contract, not the run layer's.
    async fn enqueue_message(&self, message: Value) -> Result<bool>;

    /// Execute one superstep.
    ///
    /// Returns whether the superstep produced further actionable messages.
    /// Events raised during execution are delivered synchronously to every
    /// registered callback, in emission order.
    async fn run_superstep(&self, cancellation: &CancellationToken) -> Result<bool>;

    /// Ask the graph to halt the run permanently.
    ///
    /// The graph acknowledges by raising [`WorkflowEvent::RequestHalt`] and
    /// releasing anyone blocked on its input gate.
    async fn request_end_run(&self) -> Result<()>;

    /// Register a callback for raised events.
    fn subscribe_events(&self, callback: EventCallback) -> SubscriptionId;

    /// Remove a previously registered callback.
    fn unsubscribe_events(&self, id: SubscriptionId);
}

/// Resolves when new input has been made available to the graph.
///
/// Must resolve exactly once per batch of input accepted since the last
/// resolution: never spuriously with no new input, and never missing input
/// that arrived just before the wait began. [`InputGate`] is the stock
/// implementation.
///
/// [`InputGate`]: crate::coordinator::InputGate
#[async_trait]
pub trait InputCoordinator: Send + Sync {
    /// Suspend until new input arrives or the token fires.
    async fn wait_for_next_input(&self, cancellation: &CancellationToken) -> Result<()>;
}

/// Detaches an event callback when dropped.
///
/// The run loop holds one of these for its lifetime so the handler is
/// removed however the loop exits.
pub(crate) struct EventSubscription {
    runner: Arc<dyn SuperStepRunner>,
    id: SubscriptionId,
}

impl EventSubscription {
    pub(crate) fn new(runner: Arc<dyn SuperStepRunner>, id: SubscriptionId) -> Self {
        Self { runner, id }
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.runner.unsubscribe_events(self.id);
    }
}
