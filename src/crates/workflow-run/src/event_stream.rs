//! Off-thread run loop and single-consumer event multiplexer.
//!
//! [`RunEventStream`] turns a synchronous superstep runner into an
//! asynchronously observable run. One background task drives supersteps and
//! feeds every raised event into an unbounded queue; one foreground
//! consumer drains that queue through [`take_event_stream`], suspending on
//! an [`AsyncCoordinator`] instead of polling when it catches up.
//!
//! Producer and consumer agree on where a drain cycle ends through
//! epoch-tagged halt sentinels. Each time the loop halts it enqueues a
//! sentinel carrying the current epoch; each time it resumes it increments
//! the epoch. A drainer that meets a sentinel tagged with the current epoch
//! stops (the run genuinely halted); a sentinel from an older epoch belongs
//! to a superseded cycle and is discarded silently. A current-epoch
//! sentinel is likewise discarded while accepted input is still awaiting a
//! superstep, since the halt it marks is already superseded even if the
//! loop has not woken to bump the epoch yet. Sentinels are internal queue
//! items, never surfaced as events.
//!
//! # Architecture
//!
//! ```text
//!   caller input ──► SuperStepRunner ◄── run loop task (one per run)
//!                        │  events               │ halt/resume via
//!                        ▼                       ▼ InputCoordinator
//!                  ┌───────────────────────────────┐
//!                  │  queue: Event | Halt{epoch}   │
//!                  └──────────────┬────────────────┘
//!                                 │ AsyncCoordinator (no busy-poll)
//!                                 ▼
//!                     take_event_stream (single watcher)
//! ```
//!
//! [`take_event_stream`]: RunEventStream::take_event_stream
//! [`AsyncCoordinator`]: crate::coordinator::AsyncCoordinator

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::{FutureExt, Stream};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use workflow_events::WorkflowEvent;

use crate::coordinator::AsyncCoordinator;
use crate::error::{Result, RunError};
use crate::init_cell::InitCell;
use crate::runner::{EventCallback, EventSubscription, InputCoordinator, SuperStepRunner};
use crate::status::RunStatus;

/// Handle to a background task that every racing caller awaits as one.
type SharedTask = Shared<BoxFuture<'static, ()>>;

/// One entry in the producer/consumer queue.
///
/// Halt sentinels are control flow, not data: they end a drain cycle for
/// the tagged epoch and are never exposed to callers.
enum QueueItem {
    Event(WorkflowEvent),
    Halt { epoch: u64 },
}

struct Inner {
    runner: Arc<dyn SuperStepRunner>,
    input: Arc<dyn InputCoordinator>,
    status: RwLock<RunStatus>,
    /// Incremented once per halt-to-resume cycle. Mutated only by the run
    /// loop, read by the drainer; SeqCst so a drainer never sees a stale
    /// epoch next to a fresh sentinel.
    epoch: AtomicU64,
    queue: Mutex<VecDeque<QueueItem>>,
    output: AsyncCoordinator,
    /// Compare-and-swap guard for the single active drain.
    taken: AtomicBool,
    halt_requested: AtomicBool,
    /// Set when the run loop exits permanently.
    ended: AtomicBool,
    end_run: CancellationToken,
}

impl Inner {
    fn push_event(&self, event: WorkflowEvent) {
        self.queue.lock().push_back(QueueItem::Event(event));
    }

    fn notify_halt(&self) {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.queue.lock().push_back(QueueItem::Halt { epoch });
    }

    fn is_terminal(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
            || self.halt_requested.load(Ordering::SeqCst)
            || self.end_run.is_cancelled()
    }
}

/// Releases the single-drain guard however the drain ends.
struct TakenGuard(Arc<Inner>);

impl Drop for TakenGuard {
    fn drop(&mut self) {
        self.0.taken.store(false, Ordering::SeqCst);
    }
}

/// The run-time core: owns the background superstep loop and the
/// single-consumer pull API over everything it emits.
pub struct RunEventStream {
    inner: Arc<Inner>,
    loop_task: InitCell<SharedTask>,
    dispose_task: InitCell<SharedTask>,
}

impl RunEventStream {
    /// Bind a stream to a runner and its input gate. The loop does not run
    /// until [`start`](Self::start) is called.
    pub fn new(runner: Arc<dyn SuperStepRunner>, input: Arc<dyn InputCoordinator>) -> Self {
        Self {
            inner: Arc::new(Inner {
                runner,
                input,
                status: RwLock::new(RunStatus::NotStarted),
                epoch: AtomicU64::new(0),
                queue: Mutex::new(VecDeque::new()),
                output: AsyncCoordinator::new(),
                taken: AtomicBool::new(false),
                halt_requested: AtomicBool::new(false),
                ended: AtomicBool::new(false),
                end_run: CancellationToken::new(),
            }),
            loop_task: InitCell::new(),
            dispose_task: InitCell::new(),
        }
    }

    /// Current status as published by the run loop.
    pub fn status(&self) -> RunStatus {
        *self.inner.status.read()
    }

    /// Whether the loop has terminated permanently (halt request,
    /// end-of-run, or an escaped superstep failure).
    pub fn is_ended(&self) -> bool {
        self.inner.is_terminal()
    }

    /// Spawn the run loop. At most one loop runs per stream; concurrent
    /// and repeated calls are no-ops.
    pub fn start(&self) {
        self.loop_task.init(|| {
            let inner = self.inner.clone();
            let span = tracing::info_span!(
                "workflow.run",
                run_id = %inner.runner.run_id(),
                start_executor_id = %inner.runner.start_executor_id(),
            );
            tokio::spawn(run_loop(inner).instrument(span))
                .map(|joined| {
                    if let Err(error) = joined {
                        if !error.is_cancelled() {
                            tracing::error!(%error, "run loop task failed");
                        }
                    }
                })
                .boxed()
                .shared()
        });
    }

    /// Claim the event stream and drain it until the current cycle halts.
    ///
    /// At most one drain may be active at a time; a concurrent second call
    /// fails immediately with [`RunError::StreamTaken`] and does not affect
    /// the active drain. The claim is released when the returned stream is
    /// dropped, so an abandoned or cancelled drain never wedges the run.
    ///
    /// The stream yields events in emission order. It ends without an error
    /// when the run halts for the drain's current epoch; it yields one
    /// `Err(RunError::Cancelled)` and ends if `cancellation` fires first.
    /// Cancelling a drain does not stop the background loop.
    pub fn take_event_stream(
        &self,
        cancellation: CancellationToken,
    ) -> Result<impl Stream<Item = Result<WorkflowEvent>> + Send + 'static> {
        if self.inner.taken.swap(true, Ordering::SeqCst) {
            return Err(RunError::StreamTaken);
        }

        let inner = self.inner.clone();
        // Built outside the generator and moved in: the guard must release
        // on drop even if the stream is never polled.
        let release = TakenGuard(inner.clone());
        Ok(async_stream::stream! {
            let _release = release;
            loop {
                if cancellation.is_cancelled() {
                    yield Err(RunError::Cancelled);
                    break;
                }
                let item = inner.queue.lock().pop_front();
                match item {
                    Some(QueueItem::Halt { epoch }) => {
                        let current = epoch >= inner.epoch.load(Ordering::SeqCst);
                        let superseded =
                            !inner.is_terminal() && inner.runner.has_unprocessed_messages();
                        if current && !superseded {
                            // The current cycle genuinely halted.
                            break;
                        }
                        // Sentinel from a superseded cycle, or one about to
                        // be superseded: input was already accepted, so the
                        // loop is guaranteed to run again and publish a
                        // fresh sentinel. Skip it.
                    }
                    Some(QueueItem::Event(event)) => {
                        yield Ok(event);
                    }
                    None => {
                        if let Err(error) = inner.output.wait_for_coordination(&cancellation).await {
                            yield Err(error);
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Stop the loop and release its resources.
    ///
    /// Cancels the loop's token, force-publishes a halt sentinel so anyone
    /// draining is released, then awaits the loop task, swallowing
    /// cancellation-induced failures. Idempotent and safe under concurrent
    /// calls; every caller awaits the same dispose sequence.
    pub async fn dispose(&self) {
        self.dispose_task.init(|| {
            let inner = self.inner.clone();
            let loop_task = self.loop_task.get();
            async move {
                inner.end_run.cancel();
                inner.ended.store(true, Ordering::SeqCst);
                inner.notify_halt();
                inner.output.mark_coordination_point();

                if let Some(task) = loop_task {
                    // Join failures were already logged by the shared handle.
                    task.await;
                }
            }
            .boxed()
            .shared()
        });

        if let Some(task) = self.dispose_task.get() {
            task.await;
        }
    }
}

/// The background superstep loop. Exactly one of these runs per stream.
async fn run_loop(inner: Arc<Inner>) {
    let callback: EventCallback = {
        let inner = inner.clone();
        Arc::new(move |event: WorkflowEvent| {
            if event.is_request_halt() {
                inner.halt_requested.store(true, Ordering::SeqCst);
                // Release a blocked drainer now rather than at the end of
                // the outer iteration.
                inner.notify_halt();
            } else {
                inner.push_event(event);
            }
            inner.output.mark_coordination_point();
        })
    };
    let id = inner.runner.subscribe_events(callback);
    let _subscription = EventSubscription::new(inner.runner.clone(), id);

    let cancellation = inner.end_run.clone();

    while !cancellation.is_cancelled() && !inner.halt_requested.load(Ordering::SeqCst) {
        *inner.status.write() = RunStatus::Running;
        tracing::debug!("run cycle started");

        let mut failed = false;
        loop {
            if let Err(error) = inner.runner.run_superstep(&cancellation).await {
                // Superstep failures terminate the run; this layer does
                // not retry executor logic.
                tracing::error!(%error, "superstep failed, ending run");
                inner.push_event(WorkflowEvent::WorkflowError {
                    error: error.to_string(),
                });
                failed = true;
            }
            if failed
                || !inner.runner.has_unprocessed_messages()
                || inner.halt_requested.load(Ordering::SeqCst)
                || cancellation.is_cancelled()
            {
                break;
            }
        }

        let status = if inner.runner.has_unserviced_requests() {
            RunStatus::PendingRequests
        } else {
            RunStatus::Idle
        };
        *inner.status.write() = status;
        tracing::debug!(%status, "run cycle halted");

        inner.notify_halt();
        inner.output.mark_coordination_point();

        if failed {
            break;
        }

        // The wait and the epoch bump are not atomic; a drainer that reads
        // the queue in between simply observes the halt that did happen.
        if inner.input.wait_for_next_input(&cancellation).await.is_err() {
            break;
        }
        inner.epoch.fetch_add(1, Ordering::SeqCst);
    }

    // The loop is done for good. Publish one sentinel at the final epoch so
    // a drainer parked past a now-stale sentinel is still released.
    inner.ended.store(true, Ordering::SeqCst);
    inner.notify_halt();
    inner.output.mark_coordination_point();
    tracing::debug!("run loop exited");
}
