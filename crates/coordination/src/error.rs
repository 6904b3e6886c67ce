use std::time::Duration;

use thiserror::Error;

use shepherd_state::StateError;

/// Errors from coordination primitives.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// The lock exists and belongs to someone else. An expected outcome.
    #[error("lock held: {0}")]
    LockHeld(String),

    /// A lock or tracker slot this caller held now belongs to someone else,
    /// or was reclaimed after its TTL lapsed.
    #[error("exclusion lost: {0}")]
    Lost(String),

    #[error("timed out after {waited:?} waiting for {key}")]
    Timeout { key: String, waited: Duration },

    #[error(transparent)]
    State(#[from] StateError),
}

impl CoordinationError {
    /// Whether this is the non-exceptional "somebody else holds it" outcome.
    #[must_use]
    pub fn is_lock_held(&self) -> bool {
        matches!(self, Self::LockHeld(_))
    }

    /// Whether a held lock or slot was taken away from the caller.
    #[must_use]
    pub fn is_lost(&self) -> bool {
        matches!(self, Self::Lost(_))
    }
}
