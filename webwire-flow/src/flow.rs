//! The control flow: a cooperative, single-owner scheduler that runs
//! queued tasks strictly in order, one frame at a time.

use crate::error::{CancellationError, FlowError};
use crate::promise::{PromiseHandle, Resolver};
use crate::state::{FlowShared, FlowState, Outcome, Step, TaskBody};
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, oneshot, Notify};
use tracing::debug;
use webwire_core::value::is_truthy;
use webwire_core::TaskId;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What a task body hands back to the scheduler.
pub enum TaskReturn {
    /// The task's final value.
    Done(Value),
    /// Block the task until the given promise settles, then adopt its
    /// result. The promise may belong to another flow.
    Await(PromiseHandle),
    /// Run the future off-thread and adopt its result. The task stays
    /// blocked (and its frame open) until the future completes.
    Future(BoxFuture<'static, Result<Value, FlowError>>),
}

impl TaskReturn {
    /// A task with nothing to report.
    pub fn unit() -> Self {
        TaskReturn::Done(Value::Null)
    }
}

impl fmt::Debug for TaskReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskReturn::Done(value) => f.debug_tuple("Done").field(value).finish(),
            TaskReturn::Await(handle) => f.debug_tuple("Await").field(&handle.id()).finish(),
            TaskReturn::Future(_) => f.write_str("Future(..)"),
        }
    }
}

/// Lifecycle notifications emitted by the driver.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// A driving turn finished with no unhandled rejections.
    Idle,
    /// A driving turn finished with rejections nobody observed.
    Uncaught(FlowError),
    /// The flow was reset; all in-flight work was cancelled.
    Reset,
}

/// Handle to a scheduler instance. Cheap to clone; all clones share the
/// same task queue.
#[derive(Clone)]
pub struct ControlFlow {
    pub(crate) shared: Arc<FlowShared>,
}

impl ControlFlow {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        ControlFlow {
            shared: Arc::new(FlowShared {
                state: Mutex::new(FlowState::new()),
                notify: Notify::new(),
                events,
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<FlowShared>) -> Self {
        ControlFlow { shared }
    }

    /// Schedule a task. Called from outside a running task it queues at
    /// the end of the top-level frame; called from inside a task body it
    /// queues in that task's child frame, which must drain before the
    /// enclosing task settles.
    pub fn execute<F>(&self, label: impl Into<String>, body: F) -> PromiseHandle
    where
        F: FnOnce(&ControlFlow) -> Result<TaskReturn, FlowError> + Send + 'static,
    {
        let label = label.into();
        let id = {
            let mut state = self.shared.lock();
            let frame = state.target_frame();
            let body: TaskBody = Box::new(body);
            let (task, promise) = state.create_task(label.clone(), body, frame);
            debug!(task = %task, label = %label, "scheduled");
            promise
        };
        self.shared.poke();
        PromiseHandle {
            shared: self.shared.clone(),
            id,
        }
    }

    /// A fresh externally-settled promise and its resolver.
    pub fn promise(&self) -> (PromiseHandle, Resolver) {
        let id = {
            let mut state = self.shared.lock();
            state.create_promise(None)
        };
        let handle = PromiseHandle {
            shared: self.shared.clone(),
            id,
        };
        let resolver = Resolver {
            shared: self.shared.clone(),
            id,
        };
        (handle, resolver)
    }

    /// Executor-style constructor: `init` receives the resolver and may
    /// settle it immediately or stash it for later.
    pub fn promise_with<F>(&self, init: F) -> PromiseHandle
    where
        F: FnOnce(Resolver),
    {
        let (handle, resolver) = self.promise();
        init(resolver);
        handle
    }

    /// A promise already fulfilled with `value`.
    pub fn fulfilled(&self, value: Value) -> PromiseHandle {
        let id = {
            let mut state = self.shared.lock();
            state.create_settled_promise(Ok(value))
        };
        PromiseHandle {
            shared: self.shared.clone(),
            id,
        }
    }

    /// A promise already rejected with `err`. The rejection counts as
    /// observed only once something attaches to it.
    pub fn rejected(&self, err: FlowError) -> PromiseHandle {
        let id = {
            let mut state = self.shared.lock();
            state.create_settled_promise(Err(err))
        };
        PromiseHandle {
            shared: self.shared.clone(),
            id,
        }
    }

    /// True when no scheduled task remains unsettled.
    pub fn is_idle(&self) -> bool {
        let state = self.shared.lock();
        state.tasks.values().all(|task| task.settled)
    }

    /// Lifecycle event stream ([`FlowEvent`]).
    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.shared.events.subscribe()
    }

    /// Drive queued work until the flow goes idle. Returns the unhandled
    /// rejections of the turn as an error, if any. Concurrent callers
    /// share one driver; the others wait on its outcome.
    pub async fn run_until_idle(&self) -> Result<(), FlowError> {
        let mut rx = self.shared.events.subscribe();
        let wait_for_driver = {
            let mut state = self.shared.lock();
            if state.driver_active {
                true
            } else {
                state.driver_active = true;
                false
            }
        };
        if wait_for_driver {
            loop {
                match rx.recv().await {
                    Ok(FlowEvent::Idle) | Ok(FlowEvent::Reset) => return Ok(()),
                    Ok(FlowEvent::Uncaught(err)) => return Err(err),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
        }
        self.drive().await
    }

    async fn drive(&self) -> Result<(), FlowError> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let step = {
                let mut state = self.shared.lock();
                state.pick_next()
            };
            match step {
                Step::Run { task, label, body } => {
                    let span = tracing::debug_span!("task", id = %task, label = %label);
                    let ret = {
                        let _guard = span.enter();
                        body(self)
                    };
                    self.finish_body(task, ret);
                }
                Step::Park => notified.await,
                Step::Finish => {
                    let (result, event) = {
                        let mut state = self.shared.lock();
                        let mut unhandled = state.take_unhandled();
                        state.driver_active = false;
                        if unhandled.is_empty() {
                            (Ok(()), FlowEvent::Idle)
                        } else {
                            let err = if unhandled.len() == 1 {
                                unhandled.remove(0)
                            } else {
                                FlowError::MultipleUnhandled(unhandled)
                            };
                            (Err(err.clone()), FlowEvent::Uncaught(err))
                        }
                    };
                    self.shared.emit(event);
                    return result;
                }
            }
        }
    }

    /// Record what a finished body produced. The outcome is applied only
    /// once the task's child frame has drained (see `pick_next`).
    fn finish_body(&self, task: TaskId, ret: Result<TaskReturn, FlowError>) {
        let mut state = self.shared.lock();
        state.current = None;
        let outcome = match ret {
            Err(err) => Outcome::Err(err),
            Ok(TaskReturn::Done(value)) => Outcome::Value(value),
            Ok(TaskReturn::Await(handle)) => {
                if handle.same_flow(&self.shared) {
                    state.mark_observed(handle.id());
                    Outcome::Await(handle.id())
                } else {
                    // Bridge a foreign promise through a channel; neither
                    // flow ever holds the other's lock.
                    let internal = state.create_promise(None);
                    if let Some(rec) = state.tasks.get_mut(&task) {
                        rec.outcome = Some(Outcome::Await(internal));
                    }
                    drop(state);
                    let rx = handle.subscribe_result();
                    self.spawn_settler(task, internal, async move {
                        match rx.await {
                            Ok(result) => result,
                            Err(_) => Err(FlowError::custom("source flow dropped the promise")),
                        }
                    });
                    return;
                }
            }
            Ok(TaskReturn::Future(fut)) => {
                let internal = state.create_promise(None);
                if let Some(rec) = state.tasks.get_mut(&task) {
                    rec.outcome = Some(Outcome::Await(internal));
                }
                drop(state);
                self.spawn_settler(task, internal, fut);
                return;
            }
        };
        if let Some(rec) = state.tasks.get_mut(&task) {
            rec.outcome = Some(outcome);
        }
    }

    fn spawn_settler<F>(&self, task: TaskId, promise: webwire_core::PromiseId, fut: F)
    where
        F: std::future::Future<Output = Result<Value, FlowError>> + Send + 'static,
    {
        let shared = self.shared.clone();
        let join = tokio::spawn(async move {
            let result = fut.await;
            {
                let mut state = shared.lock();
                state.settle_promise(promise, result);
            }
            shared.poke();
        });
        let mut state = self.shared.lock();
        match state.tasks.get_mut(&task) {
            Some(rec) if !rec.settled => {
                rec.abort = Some(join.abort_handle());
                rec.settler = Some(promise);
            }
            // The task settled while the lock was released; the stillborn
            // settler must not reject an orphaned promise later.
            _ => {
                join.abort();
                state.settle_promise(
                    promise,
                    Err(FlowError::Cancelled(CancellationError::new(
                        "task settled before its future completed",
                    ))),
                );
            }
        }
    }

    /// Drive the flow until `handle` settles and return its result. Also
    /// works for promises settled externally while the flow is idle.
    pub async fn run_until_settled(&self, handle: &PromiseHandle) -> Result<Value, FlowError> {
        let flow = if handle.same_flow(&self.shared) {
            self.clone()
        } else {
            handle.flow()
        };
        let mut rx = handle.subscribe_result();
        loop {
            match rx.try_recv() {
                Ok(result) => return result,
                Err(oneshot::error::TryRecvError::Empty) => {}
                Err(oneshot::error::TryRecvError::Closed) => {
                    return Err(FlowError::custom("promise was dropped without settling"));
                }
            }
            let notified = flow.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Err(err) = flow.run_until_idle().await {
                // The unhandled rejection may be this very promise.
                if let Ok(result) = rx.try_recv() {
                    return result;
                }
                return Err(err);
            }
            if let Ok(result) = rx.try_recv() {
                return result;
            }
            notified.await;
        }
    }

    /// Repeatedly evaluate `condition` as a scheduled task until it yields
    /// a truthy value. A zero or absent timeout polls indefinitely; a zero
    /// or absent interval polls every 10ms.
    pub async fn wait<F>(
        &self,
        condition: F,
        timeout: Option<Duration>,
        interval: Option<Duration>,
    ) -> Result<Value, FlowError>
    where
        F: FnMut(&ControlFlow) -> Result<TaskReturn, FlowError> + Send + 'static,
    {
        self.wait_with_message(condition, timeout, interval, None)
            .await
    }

    /// Like [`wait`](Self::wait), with a caller-supplied message prefixed
    /// to the timeout error.
    pub async fn wait_with_message<F>(
        &self,
        condition: F,
        timeout: Option<Duration>,
        interval: Option<Duration>,
        message: Option<&str>,
    ) -> Result<Value, FlowError>
    where
        F: FnMut(&ControlFlow) -> Result<TaskReturn, FlowError> + Send + 'static,
    {
        let interval = match interval {
            Some(interval) if !interval.is_zero() => interval,
            _ => WAIT_POLL_INTERVAL,
        };
        let started = Instant::now();
        let condition = Arc::new(Mutex::new(condition));
        loop {
            let condition = condition.clone();
            let poll = self.execute("<wait condition>", move |flow| {
                let mut guard = match condition.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                (&mut *guard)(flow)
            });
            let value = self.run_until_settled(&poll).await?;
            if is_truthy(&value) {
                return Ok(value);
            }
            if let Some(limit) = timeout {
                if !limit.is_zero() && started.elapsed() >= limit {
                    let elapsed = started.elapsed().as_millis();
                    let text = match message {
                        Some(message) => {
                            format!("{message}\nWait timed out after {elapsed}ms")
                        }
                        None => format!("Wait timed out after {elapsed}ms"),
                    };
                    return Err(FlowError::WaitTimeout { message: text });
                }
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Cancel all in-flight work and start over with an empty queue. The
    /// resulting cancellations are never reported as unhandled.
    pub fn reset(&self) {
        {
            let mut state = self.shared.lock();
            state.reset();
        }
        self.shared.emit(FlowEvent::Reset);
        self.shared.poke();
    }
}

impl Default for ControlFlow {
    fn default() -> Self {
        ControlFlow::new()
    }
}

impl fmt::Debug for ControlFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlFlow")
            .field("idle", &self.is_idle())
            .finish()
    }
}
