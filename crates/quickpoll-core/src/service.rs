//! Poll service: the operations exposed to transports.
//!
//! Wires the store, voting engine, aggregator and broadcaster together. A
//! successful vote is published to the poll's topic before the caller gets
//! its snapshot back; publishing cannot fail the vote.

use quickpoll_protocol::{PollId, PollSnapshot};
use std::sync::Arc;
use tracing::{debug, info};

use crate::aggregator::PollAggregator;
use crate::broadcaster::Broadcaster;
use crate::clock::{Clock, SystemClock};
use crate::engine::VotingEngine;
use crate::error::PollError;
use crate::store::PollStore;

/// Facade over the polling core.
pub struct PollService {
    store: Arc<dyn PollStore>,
    engine: VotingEngine,
    aggregator: PollAggregator,
    broadcaster: Arc<Broadcaster>,
}

impl PollService {
    /// Create a service on the wall clock.
    #[must_use]
    pub fn new(store: Arc<dyn PollStore>, broadcaster: Arc<Broadcaster>) -> Self {
        Self::with_clock(store, broadcaster, Arc::new(SystemClock))
    }

    /// Create a service reading time from `clock`.
    ///
    /// The store should share the same clock so that creation times and
    /// expiry checks agree.
    #[must_use]
    pub fn with_clock(
        store: Arc<dyn PollStore>,
        broadcaster: Arc<Broadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(backend = store.name(), "Creating poll service");
        Self {
            engine: VotingEngine::new(Arc::clone(&store), Arc::clone(&clock)),
            aggregator: PollAggregator::new(clock),
            store,
            broadcaster,
        }
    }

    /// The broadcaster carrying live updates.
    #[must_use]
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Create a poll.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `choices` is empty.
    pub async fn create_poll(
        &self,
        question: &str,
        choices: &[String],
    ) -> Result<PollSnapshot, PollError> {
        let poll = self.store.create_poll(question, choices).await?;
        info!(poll = poll.id, choices = poll.choices.len(), "Poll created");
        Ok(self.aggregator.snapshot(&poll))
    }

    /// All polls, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend fails.
    pub async fn list_polls(&self) -> Result<Vec<PollSnapshot>, PollError> {
        let polls = self.store.list_polls().await?;
        Ok(self.aggregator.snapshot_all(&polls))
    }

    /// A single poll.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no poll has this id.
    pub async fn get_poll(&self, id: PollId) -> Result<PollSnapshot, PollError> {
        let poll = self.store.get_poll(id).await?;
        Ok(self.aggregator.snapshot(&poll))
    }

    /// Cast a vote and push the new snapshot to the poll's subscribers.
    ///
    /// The voter label is stored exactly as given.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Expired` or `InvalidChoice` from the voting engine.
    pub async fn cast_vote(
        &self,
        poll_id: PollId,
        choice: i64,
        voter: &str,
    ) -> Result<PollSnapshot, PollError> {
        let snapshot = self.engine.cast_vote(poll_id, choice, voter).await?;
        let recipients = self.broadcaster.publish(poll_id, snapshot.clone());
        debug!(poll = poll_id, recipients, "Broadcast vote");

        Ok(snapshot)
    }

    /// Join a poll's live updates on behalf of a connection.
    ///
    /// Returns `true` if the connection was not already a member.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown poll, or `Subscription` if the
    /// broadcaster refuses the membership.
    pub async fn join(&self, connection_id: &str, poll_id: PollId) -> Result<bool, PollError> {
        self.store.get_poll(poll_id).await?;
        Ok(self.broadcaster.subscribe(connection_id, poll_id)?)
    }

    /// Leave a poll's live updates.
    ///
    /// # Errors
    ///
    /// Returns `Subscription` if the connection was not a member.
    pub fn leave(&self, connection_id: &str, poll_id: PollId) -> Result<(), PollError> {
        Ok(self.broadcaster.unsubscribe(connection_id, poll_id)?)
    }
}
