//! Voting engine: the gatekeeper between a vote request and the store.

use quickpoll_protocol::{PollId, PollSnapshot};
use std::sync::Arc;
use tracing::debug;

use crate::aggregator::PollAggregator;
use crate::clock::Clock;
use crate::error::PollError;
use crate::store::PollStore;

/// Validates votes and applies them to the store.
#[derive(Clone)]
pub struct VotingEngine {
    store: Arc<dyn PollStore>,
    clock: Arc<dyn Clock>,
    aggregator: PollAggregator,
}

impl VotingEngine {
    /// Create an engine over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn PollStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            aggregator: PollAggregator::new(Arc::clone(&clock)),
            clock,
        }
    }

    /// Cast a vote and return the poll's fresh snapshot.
    ///
    /// Checks run in order: the poll exists, it has not expired
    /// (`now < expires_at`), and `choice_index` names one of its choices.
    /// Only then is the vote appended.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Expired` or `InvalidChoice`; in each case the
    /// store is left untouched.
    pub async fn cast_vote(
        &self,
        poll_id: PollId,
        choice_index: i64,
        voter: &str,
    ) -> Result<PollSnapshot, PollError> {
        let poll = self.store.get_poll(poll_id).await?;

        if poll.is_expired_at(self.clock.now()) {
            debug!(poll = poll_id, "Rejected vote on expired poll");
            return Err(PollError::Expired(poll_id));
        }

        let index = poll.resolve_choice(choice_index)?;
        let vote = self.store.append_vote(poll_id, index, voter).await?;
        debug!(poll = poll_id, choice = index, vote = vote.id, "Vote accepted");

        let poll = self.store.get_poll(poll_id).await?;
        Ok(self.aggregator.snapshot(&poll))
    }
}
