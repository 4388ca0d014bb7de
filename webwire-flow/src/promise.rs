//! Handles to scheduled results. A [`PromiseHandle`] observes (and may
//! cancel) a settlement; a [`Resolver`] produces one.

use crate::error::FlowError;
use crate::flow::{ControlFlow, TaskReturn};
use crate::state::{Callbacks, FlowShared, OnFulfilled, OnRejected, PromiseState, Waiter};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use webwire_core::PromiseId;

/// Observable side of a scheduled result.
///
/// Cheap to clone; every clone refers to the same underlying promise.
pub struct PromiseHandle {
    pub(crate) shared: Arc<FlowShared>,
    pub(crate) id: PromiseId,
}

/// Snapshot of a promise's settlement state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseStatus {
    Pending,
    Fulfilled,
    Rejected,
}

impl PromiseHandle {
    pub fn id(&self) -> PromiseId {
        self.id
    }

    /// The flow this promise belongs to.
    pub fn flow(&self) -> ControlFlow {
        ControlFlow::from_shared(self.shared.clone())
    }

    pub(crate) fn same_flow(&self, other: &Arc<FlowShared>) -> bool {
        Arc::ptr_eq(&self.shared, other)
    }

    pub fn status(&self) -> PromiseStatus {
        let state = self.shared.lock();
        match state.promises.get(&self.id).map(|p| &p.state) {
            Some(PromiseState::Pending) => PromiseStatus::Pending,
            Some(PromiseState::Fulfilled(_)) => PromiseStatus::Fulfilled,
            Some(PromiseState::Rejected(_)) | None => PromiseStatus::Rejected,
        }
    }

    /// The fulfillment value, if the promise has fulfilled.
    pub fn value(&self) -> Option<Value> {
        let state = self.shared.lock();
        match state.promises.get(&self.id).map(|p| &p.state) {
            Some(PromiseState::Fulfilled(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// The rejection error, if the promise has rejected.
    pub fn error(&self) -> Option<FlowError> {
        let state = self.shared.lock();
        match state.promises.get(&self.id).map(|p| &p.state) {
            Some(PromiseState::Rejected(err)) => Some(err.clone()),
            _ => None,
        }
    }

    /// Chain callbacks onto this promise. The returned handle settles with
    /// the callback's own outcome; a missing callback for the side that
    /// settles passes the settlement through unchanged.
    ///
    /// Attaching any callback counts as observing the promise, so a
    /// rejection routed here is no longer reported as unhandled.
    pub fn then(
        &self,
        on_ok: Option<OnFulfilled>,
        on_err: Option<OnRejected>,
    ) -> PromiseHandle {
        let child = {
            let mut state = self.shared.lock();
            state.mark_observed(self.id);
            let child = state.create_promise(None);
            if let Some(rec) = state.promises.get_mut(&child) {
                rec.callbacks = Some(Callbacks { on_ok, on_err });
                rec.upstream = Some(self.id);
            }
            let parent_state = state
                .promises
                .get(&self.id)
                .map(|p| p.state.clone())
                .unwrap_or(PromiseState::Pending);
            match parent_state {
                PromiseState::Pending => {
                    if let Some(rec) = state.promises.get_mut(&self.id) {
                        rec.waiters.push(Waiter::Chain(child));
                    }
                }
                PromiseState::Fulfilled(value) => state.run_chain(child, Ok(value)),
                PromiseState::Rejected(err) => state.run_chain(child, Err(err)),
            }
            child
        };
        self.shared.poke();
        PromiseHandle {
            shared: self.shared.clone(),
            id: child,
        }
    }

    /// Shorthand for `then(Some(..), None)` over a plain value transform.
    pub fn map<F>(&self, f: F) -> PromiseHandle
    where
        F: FnOnce(Value) -> Result<Value, FlowError> + Send + 'static,
    {
        self.then(
            Some(Box::new(move |value, _flow| f(value).map(TaskReturn::Done))),
            None,
        )
    }

    /// Shorthand for `then(None, Some(..))`: recover from a rejection.
    pub fn catch<F>(&self, f: F) -> PromiseHandle
    where
        F: FnOnce(FlowError, &ControlFlow) -> Result<TaskReturn, FlowError> + Send + 'static,
    {
        self.then(None, Some(Box::new(f)))
    }

    /// Cancel the promise with the given reason. Settled promises are
    /// unaffected. Cancellation propagates down to dependents and, when
    /// this was the last observer, up to the source.
    pub fn cancel(&self, reason: impl Into<String>) {
        {
            let mut state = self.shared.lock();
            state.cancel_promise(self.id, reason.into());
        }
        self.shared.poke();
    }

    /// Register a settlement receiver without driving the flow.
    pub(crate) fn subscribe_result(&self) -> oneshot::Receiver<Result<Value, FlowError>> {
        let mut state = self.shared.lock();
        state.attach_channel(self.id)
    }

    /// Drive the owning flow until this promise settles, then return its
    /// result. This is the bridge from the scheduled world into async code.
    pub async fn resolved(&self) -> Result<Value, FlowError> {
        self.flow().run_until_settled(self).await
    }
}

impl Clone for PromiseHandle {
    fn clone(&self) -> Self {
        PromiseHandle {
            shared: self.shared.clone(),
            id: self.id,
        }
    }
}

impl fmt::Debug for PromiseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseHandle")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

/// Producer side of a promise obtained from [`ControlFlow::promise`].
///
/// The first settlement wins; later calls are no-ops.
#[derive(Clone)]
pub struct Resolver {
    pub(crate) shared: Arc<FlowShared>,
    pub(crate) id: PromiseId,
}

impl Resolver {
    pub fn fulfill(&self, value: Value) {
        {
            let mut state = self.shared.lock();
            state.settle_promise(self.id, Ok(value));
        }
        self.shared.poke();
    }

    pub fn reject(&self, err: FlowError) {
        {
            let mut state = self.shared.lock();
            state.settle_promise(self.id, Err(err));
        }
        self.shared.poke();
    }

    /// Tie this promise's fate to another promise: it settles with the same
    /// result once `source` does. Works across flows.
    pub fn resolve_with(&self, source: &PromiseHandle) {
        if source.same_flow(&self.shared) {
            {
                let mut state = self.shared.lock();
                let source_state = state
                    .promises
                    .get(&source.id)
                    .map(|p| p.state.clone())
                    .unwrap_or(PromiseState::Pending);
                match source_state {
                    PromiseState::Pending => {
                        if let Some(rec) = state.promises.get_mut(&source.id) {
                            rec.waiters.push(Waiter::Resolve(self.id));
                        }
                        if let Some(rec) = state.promises.get_mut(&self.id) {
                            rec.upstream = Some(source.id);
                        }
                    }
                    PromiseState::Fulfilled(value) => state.settle_promise(self.id, Ok(value)),
                    PromiseState::Rejected(err) => {
                        state.mark_observed(source.id);
                        state.settle_promise(self.id, Err(err));
                    }
                }
            }
            self.shared.poke();
            return;
        }

        // Cross-flow: bridge through a channel so neither flow holds the
        // other's lock.
        let rx = source.subscribe_result();
        let resolver = self.clone();
        tokio::spawn(async move {
            let result = match rx.await {
                Ok(result) => result,
                Err(_) => Err(FlowError::custom("source flow dropped the promise")),
            };
            match result {
                Ok(value) => resolver.fulfill(value),
                Err(err) => resolver.reject(err),
            }
        });
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").field("id", &self.id).finish()
    }
}
