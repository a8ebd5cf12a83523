//! In-memory superstep runner used by the integration tests.
//!
//! `PipelineRunner` is a miniature executor graph: named handlers exchange
//! JSON messages in discrete batches, raise events synchronously to
//! registered callbacks, and can raise external requests that keep the run
//! in `PendingRequests` until answered. It implements the collaborator
//! contracts faithfully enough to exercise every run-layer property
//! without pulling in a real graph engine.

// Each integration test crate compiles its own copy; not every helper is
// used by every suite.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use workflow_run::{
    EventCallback, ExternalRequest, ExternalResponse, InputGate, Result, SubscriptionId,
    SuperStepRunner, WorkflowEvent,
};

/// What one handler invocation produced.
#[derive(Default)]
pub struct StepOutput {
    /// Messages for other executors, delivered in the next superstep.
    pub sends: Vec<(String, Value)>,
    /// Events to raise after the invocation events.
    pub events: Vec<WorkflowEvent>,
    /// External requests to raise; each blocks convergence until answered.
    pub requests: Vec<ExternalRequest>,
}

impl StepOutput {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn send_to(target: &str, message: Value) -> Self {
        Self {
            sends: vec![(target.to_string(), message)],
            ..Self::default()
        }
    }

    pub fn emit(event: WorkflowEvent) -> Self {
        Self {
            events: vec![event],
            ..Self::default()
        }
    }

    pub fn raise(request: ExternalRequest) -> Self {
        Self {
            requests: vec![request],
            ..Self::default()
        }
    }
}

pub type Handler = Arc<dyn Fn(Value) -> StepOutput + Send + Sync>;

#[derive(Default)]
struct Inbox {
    messages: VecDeque<(String, Value)>,
}

/// Minimal in-memory executor graph driven one batch at a time.
///
/// Entry-point messages must be JSON strings; anything else is rejected by
/// `enqueue_message` (returning `false`), mirroring a typed entry port.
pub struct PipelineRunner {
    run_id: String,
    start_executor: String,
    handlers: HashMap<String, Handler>,
    inbox: Mutex<Inbox>,
    unserviced: Mutex<HashMap<String, (String, ExternalRequest)>>,
    subscribers: Mutex<HashMap<u64, EventCallback>>,
    next_subscription: AtomicU64,
    step: AtomicUsize,
    gate: Arc<InputGate>,
}

impl PipelineRunner {
    pub fn new(start_executor: &str) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            start_executor: start_executor.to_string(),
            handlers: HashMap::new(),
            inbox: Mutex::new(Inbox::default()),
            unserviced: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(0),
            step: AtomicUsize::new(0),
            gate: Arc::new(InputGate::new()),
        }
    }

    pub fn with_handler(
        mut self,
        name: &str,
        handler: impl Fn(Value) -> StepOutput + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(name.to_string(), Arc::new(handler));
        self
    }

    /// The input gate this runner notifies; pass it to the run layer.
    pub fn gate(&self) -> Arc<InputGate> {
        self.gate.clone()
    }

    /// Requests raised but not yet answered.
    pub fn pending_requests(&self) -> Vec<ExternalRequest> {
        self.unserviced
            .lock()
            .values()
            .map(|(_, request)| request.clone())
            .collect()
    }

    fn raise(&self, event: WorkflowEvent) {
        let subscribers: Vec<EventCallback> = self.subscribers.lock().values().cloned().collect();
        for callback in subscribers {
            callback(event.clone());
        }
    }
}

#[async_trait]
impl SuperStepRunner for PipelineRunner {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn start_executor_id(&self) -> &str {
        &self.start_executor
    }

    fn has_unprocessed_messages(&self) -> bool {
        !self.inbox.lock().messages.is_empty()
    }

    fn has_unserviced_requests(&self) -> bool {
        !self.unserviced.lock().is_empty()
    }

    async fn enqueue_response(&self, response: ExternalResponse) -> Result<()> {
        if let Some((executor_id, _request)) = self.unserviced.lock().remove(&response.request_id)
        {
            self.inbox
                .lock()
                .messages
                .push_back((executor_id, response.data));
        }
        self.gate.notify_input();
        Ok(())
    }

    async fn enqueue_message(&self, message: Value) -> Result<bool> {
        let accepted = message.is_string();
        if accepted {
            self.inbox
                .lock()
                .messages
                .push_back((self.start_executor.clone(), message));
        }
        // The gate resolves for the attempt either way so a resumed run
        // can re-converge instead of leaving its drainer parked.
        self.gate.notify_input();
        Ok(accepted)
    }

    async fn run_superstep(&self, _cancellation: &CancellationToken) -> Result<bool> {
        let batch: Vec<(String, Value)> = {
            let mut inbox = self.inbox.lock();
            inbox.messages.drain(..).collect()
        };
        if batch.is_empty() {
            return Ok(false);
        }

        let step = self.step.fetch_add(1, Ordering::SeqCst);
        self.raise(WorkflowEvent::SuperStepStarted { step });

        let mut outgoing: Vec<(String, Value)> = Vec::new();
        for (executor_id, message) in batch {
            self.raise(WorkflowEvent::ExecutorInvoked {
                executor_id: executor_id.clone(),
                message: message.clone(),
            });

            let handler = self
                .handlers
                .get(&executor_id)
                .unwrap_or_else(|| panic!("no handler registered for '{executor_id}'"))
                .clone();
            let output = handler(message);

            for event in output.events {
                self.raise(event);
            }
            for request in output.requests {
                self.raise(WorkflowEvent::RequestInfo {
                    request: request.clone(),
                });
                self.unserviced
                    .lock()
                    .insert(request.request_id.clone(), (executor_id.clone(), request));
            }
            outgoing.extend(output.sends);

            self.raise(WorkflowEvent::ExecutorCompleted { executor_id });
        }

        self.inbox.lock().messages.extend(outgoing);
        self.raise(WorkflowEvent::SuperStepCompleted { step });

        Ok(self.has_unprocessed_messages())
    }

    async fn request_end_run(&self) -> Result<()> {
        self.raise(WorkflowEvent::RequestHalt);
        self.gate.notify_input();
        Ok(())
    }

    fn subscribe_events(&self, callback: EventCallback) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().insert(id, callback);
        SubscriptionId(id)
    }

    fn unsubscribe_events(&self, id: SubscriptionId) {
        self.subscribers.lock().remove(&id.0);
    }
}

/// Two-executor pipeline: `uppercase` shouts its input at `finish`, which
/// appends a completion marker and publishes workflow output.
pub fn uppercase_pipeline() -> PipelineRunner {
    PipelineRunner::new("uppercase")
        .with_handler("uppercase", |message| {
            let text = message.as_str().unwrap_or_default().to_uppercase();
            StepOutput::send_to("finish", Value::String(text))
        })
        .with_handler("finish", |message| {
            let text = format!("{}!", message.as_str().unwrap_or_default());
            StepOutput::emit(WorkflowEvent::WorkflowOutput {
                source_id: "finish".to_string(),
                data: Value::String(text),
            })
        })
}

/// Single-executor pipeline that raises an approval request for string
/// input and publishes output once the response comes back.
pub fn approval_pipeline() -> PipelineRunner {
    PipelineRunner::new("approval").with_handler("approval", |message| {
        if message.is_string() {
            StepOutput::raise(ExternalRequest::new("approval", message))
        } else {
            StepOutput::emit(WorkflowEvent::WorkflowOutput {
                source_id: "approval".to_string(),
                data: message,
            })
        }
    })
}

/// Count every event the runner raises from this point on.
pub fn count_events(runner: &PipelineRunner) -> Arc<AtomicUsize> {
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = counter.clone();
    runner.subscribe_events(Arc::new(move |_event| {
        seen.fetch_add(1, Ordering::SeqCst);
    }));
    counter
}

/// Consume a drain to its natural end, failing the test on any error or if
/// it does not terminate.
pub async fn drain_all(
    stream: impl Stream<Item = Result<WorkflowEvent>>,
) -> Vec<WorkflowEvent> {
    tokio::time::timeout(Duration::from_secs(5), async move {
        futures::pin_mut!(stream);
        let mut events = Vec::new();
        while let Some(item) = stream.next().await {
            events.push(item.expect("drain yielded an error"));
        }
        events
    })
    .await
    .expect("drain did not terminate")
}

/// Poll `condition` until it holds or five seconds elapse.
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within timeout");
}
