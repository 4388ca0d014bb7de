// Internal scheduler state: the task/frame/promise graph and every
// mutation on it. All methods run under the flow's single mutex; user
// code (task bodies, callbacks) is never invoked while it is held.

use crate::error::{CancellationError, DiscardedTaskError, FlowError};
use crate::flow::{ControlFlow, FlowEvent, TaskReturn};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{broadcast, oneshot, Notify};
use tokio::task::AbortHandle;
use tracing::{trace, warn};
use webwire_core::ids::IdAllocator;
use webwire_core::{FrameId, PromiseId, TaskId};

pub(crate) type TaskBody =
    Box<dyn FnOnce(&ControlFlow) -> Result<TaskReturn, FlowError> + Send>;

/// Callback attached via `then`, invoked with the parent's fulfillment value.
pub type OnFulfilled =
    Box<dyn FnOnce(Value, &ControlFlow) -> Result<TaskReturn, FlowError> + Send>;

/// Callback attached via `then`/`catch`, invoked with the parent's rejection.
pub type OnRejected =
    Box<dyn FnOnce(FlowError, &ControlFlow) -> Result<TaskReturn, FlowError> + Send>;

/// State shared between the scheduler loop and every handle it hands out.
pub(crate) struct FlowShared {
    pub(crate) state: Mutex<FlowState>,
    pub(crate) notify: Notify,
    pub(crate) events: broadcast::Sender<FlowEvent>,
}

impl FlowShared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, FlowState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Wake the driver loop and any parked settlement waiters.
    pub(crate) fn poke(&self) {
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub(crate) fn emit(&self, event: FlowEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(FlowError),
}

pub(crate) enum Waiter {
    /// A task blocked awaiting this promise's settlement.
    Task(TaskId),
    /// A `then`-derived child; its callbacks live on the child record.
    Chain(PromiseId),
    /// Settle the given promise with the same result (recursive resolution).
    Resolve(PromiseId),
    /// External observer (async `resolved()` / cross-flow bridge).
    Channel(oneshot::Sender<Result<Value, FlowError>>),
}

pub(crate) struct Callbacks {
    pub(crate) on_ok: Option<OnFulfilled>,
    pub(crate) on_err: Option<OnRejected>,
}

pub(crate) struct PromiseRec {
    pub(crate) state: PromiseState,
    pub(crate) waiters: Vec<Waiter>,
    /// The promise this one is waiting on, for upward cancellation.
    pub(crate) upstream: Option<PromiseId>,
    /// The task whose result this promise is, if any.
    pub(crate) task: Option<TaskId>,
    /// Pending `then` callbacks (only on chain-derived promises).
    pub(crate) callbacks: Option<Callbacks>,
}

/// What a finished task body left behind, applied once the task's child
/// frame has drained.
pub(crate) enum Outcome {
    Value(Value),
    Err(FlowError),
    Await(PromiseId),
}

pub(crate) struct TaskRec {
    pub(crate) label: String,
    pub(crate) frame: FrameId,
    pub(crate) promise: PromiseId,
    pub(crate) body: Option<TaskBody>,
    pub(crate) child_frame: Option<FrameId>,
    pub(crate) outcome: Option<Outcome>,
    pub(crate) settled: bool,
    pub(crate) abort: Option<AbortHandle>,
    /// Internal promise an off-thread settler will settle, if one is in
    /// flight for this task.
    pub(crate) settler: Option<PromiseId>,
}

pub(crate) struct FrameRec {
    pub(crate) owner: Option<TaskId>,
    pub(crate) queue: VecDeque<TaskId>,
    pub(crate) members: Vec<TaskId>,
    /// The task from this frame currently running, draining or blocked.
    pub(crate) active: Option<TaskId>,
    pub(crate) failed: bool,
}

impl FrameRec {
    fn new(owner: Option<TaskId>) -> Self {
        FrameRec {
            owner,
            queue: VecDeque::new(),
            members: Vec::new(),
            active: None,
            failed: false,
        }
    }
}

/// What the driver loop should do next.
pub(crate) enum Step {
    Run {
        task: TaskId,
        label: String,
        body: TaskBody,
    },
    /// Blocked on an externally-settled promise; park until poked.
    Park,
    /// No queued or in-flight work remains.
    Finish,
}

pub(crate) struct FlowState {
    task_ids: IdAllocator,
    frame_ids: IdAllocator,
    promise_ids: IdAllocator,
    pub(crate) tasks: HashMap<TaskId, TaskRec>,
    pub(crate) frames: HashMap<FrameId, FrameRec>,
    pub(crate) promises: HashMap<PromiseId, PromiseRec>,
    pub(crate) root: FrameId,
    /// Task whose body is executing right now, if any.
    pub(crate) current: Option<TaskId>,
    pub(crate) driver_active: bool,
    /// Unobserved rejections, in the order they occurred.
    pub(crate) unhandled: Vec<PromiseId>,
    resetting: bool,
}

impl FlowState {
    pub(crate) fn new() -> Self {
        let frame_ids = IdAllocator::new();
        let root = FrameId::new(frame_ids.allocate());
        let mut frames = HashMap::new();
        frames.insert(root, FrameRec::new(None));

        FlowState {
            task_ids: IdAllocator::new(),
            frame_ids,
            promise_ids: IdAllocator::new(),
            tasks: HashMap::new(),
            frames,
            promises: HashMap::new(),
            root,
            current: None,
            driver_active: false,
            unhandled: Vec::new(),
            resetting: false,
        }
    }

    pub(crate) fn create_promise(&mut self, task: Option<TaskId>) -> PromiseId {
        let id = PromiseId::new(self.promise_ids.allocate());
        self.promises.insert(
            id,
            PromiseRec {
                state: PromiseState::Pending,
                waiters: Vec::new(),
                upstream: None,
                task,
                callbacks: None,
            },
        );
        id
    }

    pub(crate) fn create_settled_promise(
        &mut self,
        result: Result<Value, FlowError>,
    ) -> PromiseId {
        let id = PromiseId::new(self.promise_ids.allocate());
        let state = match result {
            Ok(value) => PromiseState::Fulfilled(value),
            Err(err) => PromiseState::Rejected(err),
        };
        self.promises.insert(
            id,
            PromiseRec {
                state,
                waiters: Vec::new(),
                upstream: None,
                task: None,
                callbacks: None,
            },
        );
        id
    }

    /// The frame new work lands in: the running task's child frame when a
    /// body scheduled it, the root otherwise.
    pub(crate) fn target_frame(&mut self) -> FrameId {
        match self.current {
            Some(task) => self.child_frame_of(task),
            None => self.root,
        }
    }

    fn child_frame_of(&mut self, task: TaskId) -> FrameId {
        if let Some(existing) = self.tasks.get(&task).and_then(|t| t.child_frame) {
            return existing;
        }
        let id = FrameId::new(self.frame_ids.allocate());
        self.frames.insert(id, FrameRec::new(Some(task)));
        if let Some(rec) = self.tasks.get_mut(&task) {
            rec.child_frame = Some(id);
        }
        id
    }

    pub(crate) fn create_task(
        &mut self,
        label: String,
        body: TaskBody,
        frame: FrameId,
    ) -> (TaskId, PromiseId) {
        let id = TaskId::new(self.task_ids.allocate());
        let promise = self.create_promise(Some(id));
        self.tasks.insert(
            id,
            TaskRec {
                label,
                frame,
                promise,
                body: Some(body),
                child_frame: None,
                outcome: None,
                settled: false,
                abort: None,
                settler: None,
            },
        );
        if let Some(rec) = self.frames.get_mut(&frame) {
            rec.queue.push_back(id);
            rec.members.push(id);
        }
        trace!(task = %id, frame = %frame, "task scheduled");
        (id, promise)
    }

    /// The deepest frame along the active-task chain from the root.
    fn innermost_frame(&self) -> FrameId {
        let mut frame = self.root;
        loop {
            let Some(rec) = self.frames.get(&frame) else {
                return self.root;
            };
            let descend = rec.active.and_then(|active| {
                let task = self.tasks.get(&active)?;
                if task.settled {
                    None
                } else {
                    task.child_frame
                }
            });
            match descend {
                Some(child) => frame = child,
                None => return frame,
            }
        }
    }

    pub(crate) fn pick_next(&mut self) -> Step {
        loop {
            let frame = self.innermost_frame();
            let active = self.frames.get(&frame).and_then(|f| f.active);

            if let Some(task) = active {
                let settled = self.tasks.get(&task).map(|t| t.settled).unwrap_or(true);
                if settled {
                    if let Some(rec) = self.frames.get_mut(&frame) {
                        rec.active = None;
                    }
                    continue;
                }
                // Innermost means this task has no (undrained) child frame;
                // apply its stored outcome, or park if it is blocked.
                if self.tasks.get(&task).map(|t| t.outcome.is_some()) == Some(true) {
                    self.apply_outcome(task);
                    continue;
                }
                return Step::Park;
            }

            // No active task here: pop the next runnable entry.
            loop {
                let next = self
                    .frames
                    .get_mut(&frame)
                    .and_then(|f| f.queue.pop_front());
                match next {
                    Some(task) => {
                        let rec = match self.tasks.get_mut(&task) {
                            Some(rec) if !rec.settled => rec,
                            // Cancelled or discarded before it ran.
                            _ => continue,
                        };
                        let Some(body) = rec.body.take() else {
                            continue;
                        };
                        let label = rec.label.clone();
                        if let Some(frec) = self.frames.get_mut(&frame) {
                            frec.active = Some(task);
                        }
                        self.current = Some(task);
                        return Step::Run { task, label, body };
                    }
                    None => break,
                }
            }

            // Frame drained. For the root that means the turn is over; a
            // child frame hands control back to its owning task.
            if frame == self.root {
                return Step::Finish;
            }
            let owner = self.frames.get(&frame).and_then(|f| f.owner);
            match owner {
                Some(owner) if !self.task_settled(owner) => {
                    if self.tasks.get(&owner).map(|t| t.outcome.is_some()) == Some(true) {
                        self.apply_outcome(owner);
                        continue;
                    }
                    // Owner still awaits an external settlement.
                    return Step::Park;
                }
                _ => continue,
            }
        }
    }

    fn task_settled(&self, task: TaskId) -> bool {
        self.tasks.get(&task).map(|t| t.settled).unwrap_or(true)
    }

    /// Apply a finished body's outcome. Only called once the task's child
    /// frame (if any) has fully drained.
    fn apply_outcome(&mut self, task: TaskId) {
        let Some(outcome) = self.tasks.get_mut(&task).and_then(|t| t.outcome.take()) else {
            return;
        };
        if self.task_settled(task) {
            return;
        }
        match outcome {
            Outcome::Value(value) => self.task_fulfilled(task, value),
            Outcome::Err(err) => self.task_rejected(task, err),
            Outcome::Await(promise) => {
                let state = self
                    .promises
                    .get(&promise)
                    .map(|p| p.state.clone())
                    .unwrap_or(PromiseState::Pending);
                match state {
                    PromiseState::Fulfilled(value) => self.task_fulfilled(task, value),
                    PromiseState::Rejected(err) => self.task_rejected(task, err),
                    PromiseState::Pending => {
                        let task_promise = self.tasks.get(&task).map(|t| t.promise);
                        if let Some(rec) = self.promises.get_mut(&promise) {
                            rec.waiters.push(Waiter::Task(task));
                        }
                        if let Some(tp) = task_promise {
                            if let Some(rec) = self.promises.get_mut(&tp) {
                                rec.upstream = Some(promise);
                            }
                        }
                        trace!(task = %task, promise = %promise, "task blocked");
                    }
                }
            }
        }
    }

    /// Abort an off-thread settler whose task settled by other means and
    /// disown its promise; a late settlement must not surface anywhere.
    fn detach_settler(&mut self, task: TaskId) {
        let Some((abort, settler)) = self
            .tasks
            .get_mut(&task)
            .map(|rec| (rec.abort.take(), rec.settler.take()))
        else {
            return;
        };
        if let Some(abort) = abort {
            abort.abort();
        }
        if let Some(settler) = settler {
            self.settle_promise(
                settler,
                Err(FlowError::Cancelled(CancellationError::new(
                    "task settled before its future completed",
                ))),
            );
        }
    }

    fn task_fulfilled(&mut self, task: TaskId, value: Value) {
        let Some(rec) = self.tasks.get_mut(&task) else {
            return;
        };
        rec.settled = true;
        let promise = rec.promise;
        trace!(task = %task, "task fulfilled");
        self.detach_settler(task);
        self.settle_promise(promise, Ok(value));
    }

    pub(crate) fn task_rejected(&mut self, task: TaskId, err: FlowError) {
        let Some(rec) = self.tasks.get_mut(&task) else {
            return;
        };
        rec.settled = true;
        let promise = rec.promise;
        let frame = rec.frame;
        trace!(task = %task, error = %err, "task rejected");
        self.detach_settler(task);

        let observed = self
            .promises
            .get(&promise)
            .map(|p| !p.waiters.is_empty())
            .unwrap_or(false);
        self.settle_promise(promise, Err(err.clone()));

        // An unobserved real failure poisons the whole frame: queued
        // siblings are discarded, in-flight ones cancelled, and the
        // rejection bubbles to the frame's owner.
        if !observed && !err.is_cancellation() {
            self.fail_frame(task, frame, err);
        }
    }

    fn fail_frame(&mut self, origin: TaskId, frame: FrameId, err: FlowError) {
        let Some(rec) = self.frames.get_mut(&frame) else {
            return;
        };
        rec.failed = true;
        rec.queue.clear();
        let members = rec.members.clone();
        let owner = rec.owner;

        for member in members {
            if member == origin || self.task_settled(member) {
                continue;
            }
            let never_ran = self
                .tasks
                .get(&member)
                .map(|t| t.body.is_some())
                .unwrap_or(false);
            if never_ran {
                self.discard_task(member, &err);
            } else {
                let promise = self.tasks.get(&member).map(|t| t.promise);
                if let Some(promise) = promise {
                    self.cancel_promise(promise, err.to_string());
                }
            }
        }

        match owner {
            Some(owner) if !self.task_settled(owner) => {
                // The bubbled rejection stands in for the origin's own, so
                // the origin is never reported separately.
                if let Some(promise) = self.tasks.get(&origin).map(|t| t.promise) {
                    self.mark_observed(promise);
                }
                // Same error, bubbled unchanged; the owner's own frame gets
                // the same treatment if nobody observes it there either.
                if let Some(rec) = self.tasks.get_mut(&owner) {
                    rec.outcome = None;
                }
                self.task_rejected(owner, err);
            }
            _ => {}
        }
    }

    /// Discard a queued task that never ran, without running its body.
    fn discard_task(&mut self, task: TaskId, cause: &FlowError) {
        let Some(rec) = self.tasks.get_mut(&task) else {
            return;
        };
        rec.body = None;
        rec.settled = true;
        let promise = rec.promise;
        let err = FlowError::Discarded(DiscardedTaskError::new(format!(
            "a sibling task failed: {}",
            cause
        )));
        self.settle_promise(promise, Err(err));
    }

    pub(crate) fn settle_promise(&mut self, promise: PromiseId, result: Result<Value, FlowError>) {
        let Some(rec) = self.promises.get_mut(&promise) else {
            return;
        };
        if rec.state != PromiseState::Pending {
            return;
        }
        rec.state = match &result {
            Ok(value) => PromiseState::Fulfilled(value.clone()),
            Err(err) => PromiseState::Rejected(err.clone()),
        };
        rec.upstream = None;
        let waiters = std::mem::take(&mut rec.waiters);
        let unobserved = waiters.is_empty();

        for waiter in waiters {
            match waiter {
                Waiter::Task(task) => match result.clone() {
                    Ok(value) => {
                        if !self.task_settled(task) {
                            self.task_fulfilled(task, value);
                        }
                    }
                    Err(err) => {
                        if !self.task_settled(task) {
                            self.task_rejected(task, err);
                        }
                    }
                },
                Waiter::Chain(child) => self.run_chain(child, result.clone()),
                Waiter::Resolve(target) => self.settle_promise(target, result.clone()),
                Waiter::Channel(tx) => {
                    let _ = tx.send(result.clone());
                }
            }
        }

        if let Err(err) = &result {
            if unobserved && !err.is_cancellation() {
                warn!(promise = %promise, error = %err, "unobserved rejection");
                self.unhandled.push(promise);
            }
        }
    }

    /// Deliver a parent's settlement to a `then`-derived child: run the
    /// matching callback as a task with precedence, or pass through.
    pub(crate) fn run_chain(&mut self, child: PromiseId, result: Result<Value, FlowError>) {
        let callbacks = self
            .promises
            .get_mut(&child)
            .and_then(|rec| rec.callbacks.take());
        let Some(callbacks) = callbacks else {
            self.settle_promise(child, result);
            return;
        };
        if self.resetting {
            self.settle_promise(child, result);
            return;
        }

        // Missing handler for the settled side means pass-through.
        let body: TaskBody = match result {
            Ok(value) => match callbacks.on_ok {
                Some(cb) => Box::new(move |flow: &ControlFlow| cb(value, flow)),
                None => {
                    self.settle_promise(child, Ok(value));
                    return;
                }
            },
            Err(err) => match callbacks.on_err {
                Some(cb) => Box::new(move |flow: &ControlFlow| cb(err, flow)),
                None => {
                    self.settle_promise(child, Err(err));
                    return;
                }
            },
        };
        self.insert_callback_task(child, body);
    }

    fn insert_callback_task(&mut self, child: PromiseId, body: TaskBody) {
        let frame = self.innermost_frame();
        let id = TaskId::new(self.task_ids.allocate());
        self.tasks.insert(
            id,
            TaskRec {
                label: "<promise callback>".to_string(),
                frame,
                promise: child,
                body: Some(body),
                child_frame: None,
                outcome: None,
                settled: false,
                abort: None,
                settler: None,
            },
        );
        if let Some(rec) = self.promises.get_mut(&child) {
            rec.task = Some(id);
        }
        if let Some(rec) = self.frames.get_mut(&frame) {
            // Callbacks of a settled promise take precedence over the
            // frame's remaining queued siblings.
            if self.current.is_some() || rec.active.is_some() || frame != self.root {
                rec.queue.push_front(id);
            } else {
                rec.queue.push_back(id);
            }
            rec.members.push(id);
        }
    }

    /// Explicit or cascading cancellation of a pending promise; settled
    /// promises ignore it. Walks the ownership graph: downstream waiters
    /// receive the rejection, and an upstream source with no remaining
    /// observers is cancelled too.
    pub(crate) fn cancel_promise(&mut self, promise: PromiseId, reason: String) {
        let Some(rec) = self.promises.get(&promise) else {
            return;
        };
        if rec.state != PromiseState::Pending {
            return;
        }
        let upstream = rec.upstream;
        let task = rec.task;

        if let Some(task) = task {
            if let Some(trec) = self.tasks.get_mut(&task) {
                trec.body = None;
                trec.settled = true;
                trec.outcome = None;
                let frame = trec.frame;
                let child_frame = trec.child_frame;
                self.detach_settler(task);
                if let Some(frec) = self.frames.get_mut(&frame) {
                    if frec.active == Some(task) {
                        frec.active = None;
                    }
                }
                if let Some(child_frame) = child_frame {
                    self.discard_frame(child_frame, &reason);
                }
            }
        }

        self.settle_promise(
            promise,
            Err(FlowError::Cancelled(CancellationError::new(reason.clone()))),
        );

        if let Some(upstream) = upstream {
            self.drop_observer(upstream, promise, &reason);
        }
    }

    /// Unregister `dependent` from `promise`'s waiters; if nothing else
    /// observes the promise, the whole chain above it is cancelled.
    fn drop_observer(&mut self, promise: PromiseId, dependent: PromiseId, reason: &str) {
        let dependent_task = self.promises.get(&dependent).and_then(|p| p.task);
        let Some(rec) = self.promises.get_mut(&promise) else {
            return;
        };
        if rec.state != PromiseState::Pending {
            return;
        }
        rec.waiters.retain(|waiter| match waiter {
            Waiter::Chain(child) | Waiter::Resolve(child) => *child != dependent,
            Waiter::Task(task) => Some(*task) != dependent_task,
            Waiter::Channel(_) => true,
        });
        if rec.waiters.is_empty() {
            self.cancel_promise(promise, reason.to_string());
        }
    }

    /// Cancel every unsettled task of a frame (and its descendants).
    fn discard_frame(&mut self, frame: FrameId, reason: &str) {
        let members = self
            .frames
            .get_mut(&frame)
            .map(|rec| {
                rec.queue.clear();
                rec.active = None;
                rec.members.clone()
            })
            .unwrap_or_default();
        for member in members {
            if self.task_settled(member) {
                continue;
            }
            let promise = self.tasks.get(&member).map(|t| t.promise);
            if let Some(promise) = promise {
                self.cancel_promise(promise, reason.to_string());
            }
        }
    }

    /// Attach an external observer; settled promises deliver immediately.
    pub(crate) fn attach_channel(
        &mut self,
        promise: PromiseId,
    ) -> oneshot::Receiver<Result<Value, FlowError>> {
        let (tx, rx) = oneshot::channel();
        self.mark_observed(promise);
        match self.promises.get_mut(&promise) {
            Some(rec) => match rec.state.clone() {
                PromiseState::Pending => rec.waiters.push(Waiter::Channel(tx)),
                PromiseState::Fulfilled(value) => {
                    let _ = tx.send(Ok(value));
                }
                PromiseState::Rejected(err) => {
                    let _ = tx.send(Err(err));
                }
            },
            None => {
                let _ = tx.send(Err(FlowError::Cancelled(CancellationError::new(
                    "flow was reset",
                ))));
            }
        }
        rx
    }

    pub(crate) fn mark_observed(&mut self, promise: PromiseId) {
        self.unhandled.retain(|p| *p != promise);
    }

    /// Rejections still unobserved at the end of the turn, in order.
    pub(crate) fn take_unhandled(&mut self) -> Vec<FlowError> {
        let ids = std::mem::take(&mut self.unhandled);
        ids.iter()
            .filter_map(|id| match self.promises.get(id).map(|p| &p.state) {
                Some(PromiseState::Rejected(err)) => Some(err.clone()),
                _ => None,
            })
            .collect()
    }

    /// Cancel everything in flight and start from a fresh root frame.
    pub(crate) fn reset(&mut self) {
        self.resetting = true;
        for rec in self.tasks.values_mut() {
            rec.body = None;
            rec.settled = true;
            if let Some(abort) = rec.abort.take() {
                abort.abort();
            }
        }
        let pending: Vec<PromiseId> = self
            .promises
            .iter()
            .filter(|(_, rec)| rec.state == PromiseState::Pending)
            .map(|(id, _)| *id)
            .collect();
        for promise in pending {
            self.settle_promise(
                promise,
                Err(FlowError::Cancelled(CancellationError::new(
                    "flow was reset",
                ))),
            );
        }
        self.tasks.clear();
        self.frames.clear();
        self.unhandled.clear();
        self.current = None;
        let root = FrameId::new(self.frame_ids.allocate());
        self.frames.insert(root, FrameRec::new(None));
        self.root = root;
        self.resetting = false;
    }
}
