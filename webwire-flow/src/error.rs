// Scheduling error taxonomy. All variants are Clone because a single
// failure fans out to every task and promise it cancels.

use webwire_core::WebDriverError;

/// A pending task or promise was cancelled before normal settlement.
/// Carries the caller-supplied reason verbatim.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("promise was cancelled: {reason}")]
pub struct CancellationError {
    pub reason: String,
}

impl CancellationError {
    pub fn new(reason: impl Into<String>) -> Self {
        CancellationError {
            reason: reason.into(),
        }
    }
}

/// A queued task was discarded, never running its body, because an
/// earlier task in its frame failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("task was discarded: {reason}")]
pub struct DiscardedTaskError {
    pub reason: String,
}

impl DiscardedTaskError {
    pub fn new(reason: impl Into<String>) -> Self {
        DiscardedTaskError {
            reason: reason.into(),
        }
    }
}

/// The rejection payload carried through promise chains.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Cancelled(#[from] CancellationError),

    #[error(transparent)]
    Discarded(#[from] DiscardedTaskError),

    /// `wait` deadline expired. The message always embeds
    /// `Wait timed out after {n}ms`.
    #[error("{message}")]
    WaitTimeout { message: String },

    #[error(transparent)]
    Wire(#[from] WebDriverError),

    #[error("{0}")]
    Custom(String),

    /// Several rejections reached the end of a turn unobserved; original
    /// order is preserved.
    #[error("{} unhandled rejection(s)", .0.len())]
    MultipleUnhandled(Vec<FlowError>),
}

impl FlowError {
    pub fn custom(message: impl Into<String>) -> Self {
        FlowError::Custom(message.into())
    }

    /// Whether this error is a cancellation artifact rather than a real
    /// failure; cancellations are never reported as unhandled rejections.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FlowError::Cancelled(_) | FlowError::Discarded(_))
    }
}
