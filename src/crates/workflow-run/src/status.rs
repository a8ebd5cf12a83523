//! Run status state machine.

use serde::{Deserialize, Serialize};

/// The current operational state of a workflow run.
///
/// Transitions are driven only by the run loop and the run facade, never by
/// callers directly:
///
/// ```text
/// NotStarted ──► Running ──► Idle ────────┐
///                   ▲   └──► PendingRequests
///                   └────────────┘  (new input)
/// ```
///
/// A halt request ends the loop permanently; the status keeps its last
/// halted value and never re-enters `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// The run loop has not been started yet.
    ///
    /// Kept as an explicit member distinct from `Idle`: a run that has not
    /// begun has produced nothing, while an idle run has halted after
    /// converging.
    NotStarted,

    /// The loop is executing supersteps and may raise events or requests.
    Running,

    /// The run has halted with no outstanding external requests.
    Idle,

    /// The run has halted with at least one unserviced external request.
    PendingRequests,
}

impl RunStatus {
    /// Whether the run is currently halted (either halted state).
    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Idle | Self::PendingRequests)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotStarted => "not-started",
            Self::Running => "running",
            Self::Idle => "idle",
            Self::PendingRequests => "pending-requests",
        };
        f.write_str(name)
    }
}
