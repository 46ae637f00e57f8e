//! Turns stored polls into vote-count snapshots.

use chrono::{DateTime, Utc};
use quickpoll_protocol::{ChoiceSnapshot, PollSnapshot};
use std::sync::Arc;

use crate::clock::Clock;
use crate::model::Poll;

/// Builds [`PollSnapshot`]s against a clock.
///
/// `is_expired` is evaluated on every call and never stored.
#[derive(Debug, Clone)]
pub struct PollAggregator {
    clock: Arc<dyn Clock>,
}

impl PollAggregator {
    /// Create an aggregator reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Snapshot of `poll` as of now.
    #[must_use]
    pub fn snapshot(&self, poll: &Poll) -> PollSnapshot {
        snapshot_at(poll, self.clock.now())
    }

    /// Snapshots of several polls, sharing one reading of the clock.
    #[must_use]
    pub fn snapshot_all(&self, polls: &[Poll]) -> Vec<PollSnapshot> {
        let now = self.clock.now();
        polls.iter().map(|poll| snapshot_at(poll, now)).collect()
    }
}

/// Snapshot of `poll` as of `now`.
#[must_use]
pub fn snapshot_at(poll: &Poll, now: DateTime<Utc>) -> PollSnapshot {
    PollSnapshot {
        id: poll.id,
        question: poll.question.clone(),
        created_at: poll.created_at,
        expires_at: poll.expires_at,
        is_expired: poll.is_expired_at(now),
        choices: poll
            .choices
            .iter()
            .map(|choice| ChoiceSnapshot {
                id: choice.id,
                label: choice.label.clone(),
                vote_count: choice.votes.len() as u64,
                voter_labels: choice.votes.iter().map(|v| v.voter.clone()).collect(),
            })
            .collect(),
    }
}
