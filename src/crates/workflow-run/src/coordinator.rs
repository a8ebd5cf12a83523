//! Async wait/notify coordination primitives.
//!
//! [`AsyncCoordinator`] is the reusable signal both sides of the run lean
//! on: the consumer suspends on it when the event queue is empty, and the
//! run loop suspends on an [`InputGate`] built from it between halt and
//! resume. Marks arriving with no waiter present collapse into a single
//! remembered wakeup, so the producer can mark as often as it likes without
//! queuing notifications, and a waiter that arrives just after a mark still
//! wakes immediately.

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, RunError};
use crate::runner::InputCoordinator;

/// A wait/notify signal with at most one remembered wakeup.
///
/// `mark_coordination_point` never blocks and may be called from any thread
/// any number of times; consecutive marks before a wait collapse into one
/// wakeup. A waiter blocked before or during a mark is guaranteed to
/// observe it. Multiple concurrent waiters are tolerated (one is woken per
/// mark); the system's own usage has exactly one logical waiter at a time.
#[derive(Debug, Default)]
pub struct AsyncCoordinator {
    notify: Notify,
}

impl AsyncCoordinator {
    /// Create an unmarked coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a coordination point, waking one waiter if any is blocked.
    ///
    /// If no waiter is present, a single wakeup is remembered and consumed
    /// by the next call to [`wait_for_coordination`].
    ///
    /// [`wait_for_coordination`]: Self::wait_for_coordination
    pub fn mark_coordination_point(&self) {
        // notify_one stores at most one permit, which is exactly the
        // "no missed wakeup, no unbounded queue" contract.
        self.notify.notify_one();
    }

    /// Suspend until the next coordination point or until cancellation.
    ///
    /// Returns `Err(RunError::Cancelled)` if the token fires first.
    pub async fn wait_for_coordination(&self, cancellation: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = self.notify.notified() => Ok(()),
            _ = cancellation.cancelled() => Err(RunError::Cancelled),
        }
    }
}

/// Concrete input-readiness gate backed by an [`AsyncCoordinator`].
///
/// Runner implementations share one of these with the run loop: every
/// accepted message or response calls [`notify_input`], and the loop's
/// wait between halt and resume resolves exactly once per batch of new
/// input. Input arriving just before the wait begins is not missed.
///
/// [`notify_input`]: Self::notify_input
#[derive(Debug, Default)]
pub struct InputGate {
    coordinator: AsyncCoordinator,
}

impl InputGate {
    /// Create a gate with no pending input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that new input has been accepted by the graph.
    pub fn notify_input(&self) {
        self.coordinator.mark_coordination_point();
    }
}

#[async_trait::async_trait]
impl InputCoordinator for InputGate {
    async fn wait_for_next_input(&self, cancellation: &CancellationToken) -> Result<()> {
        self.coordinator.wait_for_coordination(cancellation).await
    }
}
