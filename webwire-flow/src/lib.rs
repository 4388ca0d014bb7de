//! Cooperative command scheduler.
//!
//! A [`ControlFlow`] runs tasks strictly in scheduling order, one at a
//! time. Tasks scheduled from inside a running task land in that task's
//! child frame and must drain before the parent settles; an unobserved
//! failure cancels the rest of its frame. [`PromiseHandle`] observes
//! results and bridges them into async code via
//! [`resolved`](PromiseHandle::resolved).

pub mod error;
pub mod flow;
pub mod promise;
mod state;

pub use error::{CancellationError, DiscardedTaskError, FlowError};
pub use flow::{ControlFlow, FlowEvent, TaskReturn};
pub use promise::{PromiseHandle, PromiseStatus, Resolver};
pub use state::{OnFulfilled, OnRejected};
