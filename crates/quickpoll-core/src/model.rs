//! Stored entities: polls, their choices, and the votes cast against them.

use chrono::{DateTime, Utc};
use quickpoll_protocol::{ChoiceId, PollId};

use crate::error::PollError;

/// A vote identifier.
pub type VoteId = u64;

/// How long a poll accepts votes by default, in seconds (one day).
pub const DEFAULT_POLL_LIFETIME_SECS: i64 = 86_400;

/// Default voting window of a new poll.
#[must_use]
pub fn default_poll_lifetime() -> chrono::Duration {
    chrono::Duration::seconds(DEFAULT_POLL_LIFETIME_SECS)
}

/// A poll and everything cast against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poll {
    pub id: PollId,
    pub question: String,
    pub created_at: DateTime<Utc>,
    /// Exclusive upper bound of the voting window.
    pub expires_at: DateTime<Utc>,
    /// Fixed at creation; the position is the public choice index.
    pub choices: Vec<Choice>,
}

impl Poll {
    /// Whether the poll no longer accepts votes at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Resolve a public choice index, rejecting anything outside the range.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChoice` if `index` is negative or past the last choice.
    pub fn resolve_choice(&self, index: i64) -> Result<usize, PollError> {
        usize::try_from(index)
            .ok()
            .filter(|i| *i < self.choices.len())
            .ok_or(PollError::InvalidChoice {
                index,
                choices: self.choices.len(),
            })
    }

    /// Total votes across every choice.
    #[must_use]
    pub fn total_votes(&self) -> usize {
        self.choices.iter().map(|c| c.votes.len()).sum()
    }
}

/// One answer option of a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub id: ChoiceId,
    /// Back-reference to the owning poll.
    pub poll_id: PollId,
    pub label: String,
    /// Votes in the order they were cast.
    pub votes: Vec<Vote>,
}

/// A single vote. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub id: VoteId,
    pub poll_id: PollId,
    pub choice_id: ChoiceId,
    pub voter: String,
    pub created_at: DateTime<Utc>,
}

/// Check creation input before anything is written.
///
/// # Errors
///
/// Returns `Validation` if no choices were supplied.
pub fn validate_new_poll(choice_labels: &[String]) -> Result<(), PollError> {
    if choice_labels.is_empty() {
        return Err(PollError::Validation(
            "a poll needs at least one choice".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn poll_with_choices(n: usize) -> Poll {
        let now = Utc::now();
        Poll {
            id: 1,
            question: "Q".to_string(),
            created_at: now,
            expires_at: now + default_poll_lifetime(),
            choices: (0..n)
                .map(|i| Choice {
                    id: i as u64 + 1,
                    poll_id: 1,
                    label: format!("choice-{}", i),
                    votes: Vec::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_expiry_is_exclusive_upper_bound() {
        let poll = poll_with_choices(1);
        assert!(!poll.is_expired_at(poll.created_at));
        assert!(!poll.is_expired_at(poll.expires_at - Duration::microseconds(1)));
        assert!(poll.is_expired_at(poll.expires_at));
        assert!(poll.is_expired_at(poll.expires_at + Duration::days(3)));
    }

    #[test]
    fn test_resolve_choice() {
        let poll = poll_with_choices(2);
        assert_eq!(poll.resolve_choice(0).unwrap(), 0);
        assert_eq!(poll.resolve_choice(1).unwrap(), 1);
        assert!(matches!(
            poll.resolve_choice(2),
            Err(PollError::InvalidChoice { index: 2, choices: 2 })
        ));
        assert!(matches!(
            poll.resolve_choice(-1),
            Err(PollError::InvalidChoice { index: -1, .. })
        ));
    }

    #[test]
    fn test_validate_new_poll() {
        assert!(matches!(
            validate_new_poll(&[]),
            Err(PollError::Validation(_))
        ));
        assert!(validate_new_poll(&["Yes".to_string()]).is_ok());
    }
}
