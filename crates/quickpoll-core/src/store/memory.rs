//! In-memory poll store.
//!
//! Each poll lives behind its own lock, so votes on one poll never wait for
//! writers of another.

use async_trait::async_trait;
use dashmap::DashMap;
use quickpoll_protocol::PollId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::PollStore;
use crate::clock::{Clock, SystemClock};
use crate::error::PollError;
use crate::model::{default_poll_lifetime, validate_new_poll, Choice, Poll, Vote};

/// Process-local [`PollStore`].
pub struct MemoryStore {
    /// Polls indexed by id.
    polls: DashMap<PollId, Arc<RwLock<Poll>>>,
    next_poll_id: AtomicU64,
    next_choice_id: AtomicU64,
    next_vote_id: AtomicU64,
    clock: Arc<dyn Clock>,
    lifetime: chrono::Duration,
}

impl MemoryStore {
    /// Create an empty store using the wall clock and the default lifetime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            polls: DashMap::new(),
            next_poll_id: AtomicU64::new(1),
            next_choice_id: AtomicU64::new(1),
            next_vote_id: AtomicU64::new(1),
            clock,
            lifetime: default_poll_lifetime(),
        }
    }

    /// Override how long new polls accept votes.
    #[must_use]
    pub fn with_lifetime(mut self, lifetime: chrono::Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Number of stored polls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.polls.len()
    }

    /// Whether the store holds no polls.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }

    /// Clone the handle of a poll out of the map so no shard lock is held
    /// while waiting on the poll's own lock.
    fn handle(&self, id: PollId) -> Result<Arc<RwLock<Poll>>, PollError> {
        self.polls
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(PollError::NotFound(id))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn create_poll(
        &self,
        question: &str,
        choice_labels: &[String],
    ) -> Result<Poll, PollError> {
        validate_new_poll(choice_labels)?;

        let id = self.next_poll_id.fetch_add(1, Ordering::SeqCst);
        let created_at = self.clock.now();
        let choices = choice_labels
            .iter()
            .map(|label| Choice {
                id: self.next_choice_id.fetch_add(1, Ordering::SeqCst),
                poll_id: id,
                label: label.clone(),
                votes: Vec::new(),
            })
            .collect();

        let poll = Poll {
            id,
            question: question.to_string(),
            created_at,
            expires_at: created_at + self.lifetime,
            choices,
        };

        // The poll becomes visible only once fully built.
        self.polls.insert(id, Arc::new(RwLock::new(poll.clone())));
        debug!(poll = id, choices = poll.choices.len(), "Stored poll");

        Ok(poll)
    }

    async fn get_poll(&self, id: PollId) -> Result<Poll, PollError> {
        let handle = self.handle(id)?;
        let poll = handle.read().await;
        Ok(poll.clone())
    }

    async fn list_polls(&self) -> Result<Vec<Poll>, PollError> {
        let handles: Vec<_> = self
            .polls
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut polls = Vec::with_capacity(handles.len());
        for handle in handles {
            polls.push(handle.read().await.clone());
        }
        polls.sort_by(|a, b| b.id.cmp(&a.id));

        Ok(polls)
    }

    async fn append_vote(
        &self,
        poll_id: PollId,
        choice_index: usize,
        voter: &str,
    ) -> Result<Vote, PollError> {
        let handle = self.handle(poll_id)?;
        let mut poll = handle.write().await;

        let choice_count = poll.choices.len();
        let choice = poll
            .choices
            .get_mut(choice_index)
            .ok_or(PollError::InvalidChoice {
                index: i64::try_from(choice_index).unwrap_or(i64::MAX),
                choices: choice_count,
            })?;

        let vote = Vote {
            id: self.next_vote_id.fetch_add(1, Ordering::SeqCst),
            poll_id,
            choice_id: choice.id,
            voter: voter.to_string(),
            created_at: self.clock.now(),
        };
        choice.votes.push(vote.clone());

        trace!(poll = poll_id, choice = choice_index, vote = vote.id, "Appended vote");
        Ok(vote)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_create_preserves_choice_order() {
        let store = MemoryStore::new();
        let poll = store
            .create_poll("Pick", &labels(&["c", "a", "b"]))
            .await
            .unwrap();

        let stored = store.get_poll(poll.id).await.unwrap();
        let order: Vec<_> = stored.choices.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
        assert!(stored.choices.iter().all(|c| c.poll_id == poll.id));
    }

    #[tokio::test]
    async fn test_create_sets_one_day_expiry() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = MemoryStore::with_clock(clock.clone());

        let poll = store.create_poll("Q", &labels(&["x"])).await.unwrap();
        assert_eq!(poll.created_at, clock.now());
        assert_eq!(poll.expires_at, clock.now() + chrono::Duration::days(1));
    }

    #[tokio::test]
    async fn test_create_rejects_empty_choices() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.create_poll("Q", &[]).await,
            Err(PollError::Validation(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_ids_increase_and_list_is_newest_first() {
        let store = MemoryStore::new();
        let first = store.create_poll("one", &labels(&["x"])).await.unwrap();
        let second = store.create_poll("two", &labels(&["x"])).await.unwrap();
        let third = store.create_poll("three", &labels(&["x"])).await.unwrap();

        assert_eq!(first.id, 1);
        assert!(first.id < second.id && second.id < third.id);

        let ids: Vec<_> = store
            .list_polls()
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
    }

    #[tokio::test]
    async fn test_get_unknown_poll() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_poll(42).await,
            Err(PollError::NotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_append_links_vote_to_choice() {
        let store = MemoryStore::new();
        let poll = store
            .create_poll("Color?", &labels(&["Red", "Blue"]))
            .await
            .unwrap();

        let vote = store.append_vote(poll.id, 1, "alice").await.unwrap();
        assert_eq!(vote.poll_id, poll.id);
        assert_eq!(vote.choice_id, poll.choices[1].id);

        let stored = store.get_poll(poll.id).await.unwrap();
        assert!(stored.choices[0].votes.is_empty());
        assert_eq!(stored.choices[1].votes, vec![vote]);
    }

    #[tokio::test]
    async fn test_append_out_of_range_leaves_poll_untouched() {
        let store = MemoryStore::new();
        let poll = store.create_poll("Q", &labels(&["a", "b"])).await.unwrap();

        assert!(matches!(
            store.append_vote(poll.id, 2, "bob").await,
            Err(PollError::InvalidChoice { index: 2, choices: 2 })
        ));
        assert!(matches!(
            store.append_vote(99, 0, "bob").await,
            Err(PollError::NotFound(99))
        ));
        assert_eq!(store.get_poll(poll.id).await.unwrap(), poll);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let poll = store
            .create_poll("Q", &labels(&["a", "b", "c", "d"]))
            .await
            .unwrap();
        let poll_id = poll.id;

        let mut handles = Vec::new();
        for i in 0..200usize {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .append_vote(poll_id, i % 4, &format!("voter-{}", i))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.get_poll(poll_id).await.unwrap();
        assert_eq!(stored.total_votes(), 200);
        assert!(stored.choices.iter().all(|c| c.votes.len() == 50));
    }
}
