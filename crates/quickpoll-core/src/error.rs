//! Error types shared by the store, the voting engine and the service.

use quickpoll_protocol::PollId;
use thiserror::Error;

use crate::broadcaster::BroadcastError;

/// Errors surfaced to callers of poll operations.
///
/// `Validation`, `NotFound`, `Expired` and `InvalidChoice` are terminal:
/// retrying the same request yields the same error, and none of them leaves
/// any trace in the store.
#[derive(Debug, Error)]
pub enum PollError {
    /// Malformed creation input.
    #[error("Invalid poll: {0}")]
    Validation(String),

    /// No poll has this id.
    #[error("Poll not found: {0}")]
    NotFound(PollId),

    /// The poll stopped accepting votes.
    #[error("Poll {0} has expired")]
    Expired(PollId),

    /// Choice index outside `0..choices`.
    #[error("Invalid choice {index}: poll has {choices} choices")]
    InvalidChoice {
        /// Requested index.
        index: i64,
        /// Number of choices in the poll.
        choices: usize,
    },

    /// Live-update membership failure.
    #[error(transparent)]
    Subscription(#[from] BroadcastError),

    /// Backend failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl PollError {
    /// Stable machine-readable name of the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            PollError::Validation(_) => "validation",
            PollError::NotFound(_) => "not_found",
            PollError::Expired(_) => "expired",
            PollError::InvalidChoice { .. } => "invalid_choice",
            PollError::Subscription(_) => "subscription",
            PollError::Storage(_) => "storage",
        }
    }
}

impl From<sqlx::Error> for PollError {
    fn from(error: sqlx::Error) -> Self {
        PollError::Storage(error.to_string())
    }
}
