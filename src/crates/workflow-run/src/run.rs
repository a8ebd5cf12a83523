//! Run facades: streaming access and the buffering, resumable [`Run`].

use std::sync::Arc;

use futures::{pin_mut, Stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use workflow_events::{ExternalResponse, WorkflowEvent};

use crate::error::{Result, RunError};
use crate::event_stream::RunEventStream;
use crate::runner::{InputCoordinator, SuperStepRunner};
use crate::status::RunStatus;

/// Streaming view over a single workflow run.
///
/// Thin facade over [`RunEventStream`]: it starts the background loop on
/// construction and exposes watch, send, and end-of-run operations without
/// buffering anything itself. For buffered, bookmark-tracked consumption
/// wrap it in a [`Run`].
pub struct StreamingRun {
    stream: RunEventStream,
    runner: Arc<dyn SuperStepRunner>,
}

impl StreamingRun {
    /// Bind to a runner and its input gate and start the run loop.
    pub fn new(runner: Arc<dyn SuperStepRunner>, input: Arc<dyn InputCoordinator>) -> Self {
        let stream = RunEventStream::new(runner.clone(), input);
        stream.start();
        Self { stream, runner }
    }

    /// Unique identifier for the run.
    pub fn run_id(&self) -> &str {
        self.runner.run_id()
    }

    /// Current status as published by the run loop.
    pub fn status(&self) -> RunStatus {
        self.stream.status()
    }

    /// Whether any external request is still awaiting its response.
    pub fn has_unserviced_requests(&self) -> bool {
        self.runner.has_unserviced_requests()
    }

    /// Whether the run has terminated permanently.
    pub fn is_ended(&self) -> bool {
        self.stream.is_ended()
    }

    /// Claim the event stream and watch it until the current cycle halts.
    ///
    /// See [`RunEventStream::take_event_stream`] for the single-watcher and
    /// cancellation contract.
    pub fn watch_stream(
        &self,
        cancellation: CancellationToken,
    ) -> Result<impl Stream<Item = Result<WorkflowEvent>> + Send + 'static> {
        self.stream.take_event_stream(cancellation)
    }

    /// Deliver a response to an outstanding external request.
    pub async fn send_response(&self, response: ExternalResponse) -> Result<()> {
        if self.is_ended() {
            return Err(RunError::RunEnded);
        }
        self.runner.enqueue_response(response).await
    }

    /// Serialize `message` and offer it to the graph's entry executor.
    ///
    /// Returns `false` if the entry executor does not accept the message's
    /// shape; that is the send primitive's contract, not an error here.
    pub async fn try_send_message<T: Serialize>(&self, message: &T) -> Result<bool> {
        let value = serde_json::to_value(message)?;
        self.send_message_untyped(value).await
    }

    /// Offer an untyped message to the graph's entry executor.
    pub async fn send_message_untyped(&self, message: Value) -> Result<bool> {
        if self.is_ended() {
            return Err(RunError::RunEnded);
        }
        self.runner.enqueue_message(message).await
    }

    /// Ask the graph to halt the run permanently.
    pub async fn end_run(&self) -> Result<()> {
        self.runner.request_end_run().await
    }

    /// Stop the background loop and release its resources. Idempotent.
    pub async fn dispose(&self) {
        self.stream.dispose().await
    }
}

/// A workflow run that buffers every event ever seen, tracks an incremental
/// read bookmark, and supports resumption with responses or new messages.
///
/// The buffer is append-only and preserves global arrival order across
/// drain cycles; once appended an event's position never changes. The
/// bookmark is a count into that log, so diagnostics may read
/// [`outgoing_events`] concurrently with a consumer advancing through
/// [`new_events`].
///
/// [`outgoing_events`]: Run::outgoing_events
/// [`new_events`]: Run::new_events
pub struct Run {
    streaming: StreamingRun,
    events: RwLock<Vec<WorkflowEvent>>,
    bookmark: Mutex<usize>,
    status: RwLock<RunStatus>,
}

impl Run {
    /// Wrap a streaming run without draining anything yet.
    pub fn new(streaming: StreamingRun) -> Self {
        Self {
            streaming,
            events: RwLock::new(Vec::new()),
            bookmark: Mutex::new(0),
            status: RwLock::new(RunStatus::NotStarted),
        }
    }

    /// Wrap a streaming run and drive it to its first halt.
    pub async fn capture_stream(
        streaming: StreamingRun,
        cancellation: CancellationToken,
    ) -> Result<Self> {
        let run = Self::new(streaming);
        run.run_to_next_halt(cancellation).await?;
        Ok(run)
    }

    /// Unique identifier for the run.
    pub fn run_id(&self) -> &str {
        self.streaming.run_id()
    }

    /// The underlying streaming view.
    pub fn streaming(&self) -> &StreamingRun {
        &self.streaming
    }

    /// Current status as tracked by this facade.
    pub fn status(&self) -> RunStatus {
        *self.status.read()
    }

    /// Every event emitted by the workflow, from the beginning, in arrival
    /// order. Non-consuming: does not move the bookmark.
    pub fn outgoing_events(&self) -> Vec<WorkflowEvent> {
        self.events.read().clone()
    }

    /// Events emitted since the last call to `new_events`.
    ///
    /// Behaves as a consuming read on a monotonically growing log: the
    /// bookmark advances to the current buffer length atomically with the
    /// read, so two consecutive calls with no intervening events both
    /// return an empty sequence.
    pub fn new_events(&self) -> Vec<WorkflowEvent> {
        let events = self.events.read();
        let mut bookmark = self.bookmark.lock();
        let new = events[*bookmark..].to_vec();
        *bookmark = events.len();
        new
    }

    /// Resume execution with responses to outstanding external requests.
    ///
    /// Each response is fully enqueued, in order, before the next is sent;
    /// the run is then drained to its next halt. Returns whether any event
    /// was observed. Fails with [`RunError::RunEnded`] if the run has
    /// terminated permanently.
    pub async fn resume_with_responses(
        &self,
        responses: impl IntoIterator<Item = ExternalResponse>,
        cancellation: CancellationToken,
    ) -> Result<bool> {
        if self.streaming.is_ended() {
            return Err(RunError::RunEnded);
        }
        for response in responses {
            self.streaming.send_response(response).await?;
        }
        self.run_to_next_halt(cancellation).await
    }

    /// Resume execution with new messages for the graph's entry executor.
    ///
    /// Messages the entry executor rejects are not a hard error at this
    /// layer; acceptance is the send primitive's contract. Fails with
    /// [`RunError::RunEnded`] if the run has terminated permanently.
    pub async fn resume_with_messages<T: Serialize>(
        &self,
        messages: impl IntoIterator<Item = T>,
        cancellation: CancellationToken,
    ) -> Result<bool> {
        if self.streaming.is_ended() {
            return Err(RunError::RunEnded);
        }
        for message in messages {
            let accepted = self.streaming.try_send_message(&message).await?;
            if !accepted {
                tracing::debug!(
                    run_id = %self.run_id(),
                    "entry executor rejected a resume message"
                );
            }
        }
        self.run_to_next_halt(cancellation).await
    }

    /// Terminate the run permanently and capture its trailing events.
    ///
    /// Idempotent: once the run has ended, further calls return `Ok(())`
    /// without draining — after the loop exits nothing marks the output
    /// coordinator again, so a drain would park forever. Subsequent resume
    /// calls fail with [`RunError::RunEnded`].
    pub async fn end_run(&self, cancellation: CancellationToken) -> Result<()> {
        if self.streaming.is_ended() {
            return Ok(());
        }
        self.streaming.end_run().await?;
        self.run_to_next_halt(cancellation).await?;
        Ok(())
    }

    /// Stop the background loop and release its resources. Idempotent.
    pub async fn dispose(&self) {
        self.streaming.dispose().await
    }

    /// Drain the event stream from the current point until the run halts,
    /// appending every observed event to the buffer in order.
    async fn run_to_next_halt(&self, cancellation: CancellationToken) -> Result<bool> {
        let mut had_events = false;
        *self.status.write() = RunStatus::Running;

        let stream = self.streaming.watch_stream(cancellation)?;
        pin_mut!(stream);
        while let Some(item) = stream.next().await {
            let event = item?;
            self.events.write().push(event);
            had_events = true;
        }

        *self.status.write() = if self.streaming.has_unserviced_requests() {
            RunStatus::PendingRequests
        } else {
            RunStatus::Idle
        };

        Ok(had_events)
    }
}
