use thiserror::Error;

/// Veto returned by a listener from its `modifying` phase.
///
/// A rejection aborts the whole modification: the backing store and every
/// index are left exactly as they were before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("modification rejected: {reason}")]
pub struct Rejection {
    reason: String,
}

impl Rejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Failure reported by a listener from its `modified` phase.
///
/// The change is already committed when this is raised, so the dispatcher
/// only logs it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("listener failed after commit: {message}")]
pub struct ListenerError {
    message: String,
}

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Forward and inverse indexes disagree outside a suspend bracket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("collection invariant violated: {message}")]
pub struct InvariantViolation {
    message: String,
}

impl InvariantViolation {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("view `{view}` is stale: its container changed through another path")]
    StaleView { view: &'static str },
    #[error("index {index} out of bounds for length {len}")]
    OutOfBounds { index: usize, len: usize },
    #[error("key out of the view's range")]
    KeyOutOfRange,
    #[error("no such element")]
    NoSuchElement,
    #[error("illegal state: {0}")]
    IllegalState(&'static str),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error("value is already mapped by another key")]
    Conflict,
    #[error(transparent)]
    InvariantViolation(#[from] InvariantViolation),
}

impl CollectionError {
    /// `true` for errors a caller can recover from by re-deriving the view.
    pub fn is_stale(&self) -> bool {
        matches!(self, CollectionError::StaleView { .. })
    }
}
