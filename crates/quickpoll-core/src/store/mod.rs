//! Durable keyed collection of polls, choices and votes.
//!
//! The store is the source of truth. Everything else reads it through the
//! [`PollStore`] trait; no component keeps its own copy of poll state.
//!
//! Two backends are provided:
//!
//! - [`MemoryStore`] - process-local, per-poll locking
//! - [`SqliteStore`] - table-backed via `sqlx`, survives restarts

use async_trait::async_trait;
use quickpoll_protocol::PollId;

use crate::error::PollError;
use crate::model::{Poll, Vote};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage contract for polls.
///
/// Implementations only grow: nothing is updated in place or deleted.
#[async_trait]
pub trait PollStore: Send + Sync {
    /// Create a poll and all of its choices, atomically.
    ///
    /// The poll gets the next id, `created_at = now` and
    /// `expires_at = now + lifetime`. Choices keep the order of `choice_labels`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `choice_labels` is empty.
    async fn create_poll(&self, question: &str, choice_labels: &[String])
        -> Result<Poll, PollError>;

    /// Load a poll with its choices and votes.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no poll has this id.
    async fn get_poll(&self, id: PollId) -> Result<Poll, PollError>;

    /// All polls, most recently created first.
    async fn list_polls(&self) -> Result<Vec<Poll>, PollError>;

    /// Record a vote against the choice at `choice_index`.
    ///
    /// This is a storage primitive: it does not look at expiry. Appends to
    /// the same poll are serialized; appends to different polls are not
    /// ordered with respect to each other.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown poll and `InvalidChoice` if the
    /// index does not name one of the poll's choices.
    async fn append_vote(
        &self,
        poll_id: PollId,
        choice_index: usize,
        voter: &str,
    ) -> Result<Vote, PollError>;

    /// Backend name (e.g., "memory", "sqlite").
    fn name(&self) -> &'static str;
}
