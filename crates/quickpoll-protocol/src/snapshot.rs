//! Read-only poll views exchanged with clients.
//!
//! A snapshot is what the HTTP API returns and what subscribers receive
//! whenever a poll's vote state changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A poll identifier. Also the topic name for live updates.
pub type PollId = u64;

/// A choice identifier.
pub type ChoiceId = u64;

/// Aggregated view of a single poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSnapshot {
    /// Poll identifier.
    pub id: PollId,
    /// The question being asked.
    pub question: String,
    /// When the poll was created.
    pub created_at: DateTime<Utc>,
    /// First instant at which the poll no longer accepts votes.
    pub expires_at: DateTime<Utc>,
    /// Whether the poll was expired when this snapshot was built.
    pub is_expired: bool,
    /// Choices in creation order; the position is the choice index.
    pub choices: Vec<ChoiceSnapshot>,
}

/// Aggregated view of a single choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceSnapshot {
    /// Choice identifier.
    pub id: ChoiceId,
    /// Display label.
    pub label: String,
    /// Number of votes cast for this choice.
    #[serde(rename = "votes")]
    pub vote_count: u64,
    /// Voter labels in the order the votes were cast.
    #[serde(rename = "voters")]
    pub voter_labels: Vec<String>,
}

impl PollSnapshot {
    /// Total number of votes across all choices.
    #[must_use]
    pub fn total_votes(&self) -> u64 {
        self.choices.iter().map(|c| c.vote_count).sum()
    }

    /// Vote counts in choice-index order.
    #[must_use]
    pub fn vote_counts(&self) -> Vec<u64> {
        self.choices.iter().map(|c| c.vote_count).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> PollSnapshot {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        PollSnapshot {
            id: 7,
            question: "Color?".to_string(),
            created_at,
            expires_at: created_at + chrono::Duration::days(1),
            is_expired: false,
            choices: vec![
                ChoiceSnapshot {
                    id: 1,
                    label: "Red".to_string(),
                    vote_count: 2,
                    voter_labels: vec!["alice".to_string(), "alice".to_string()],
                },
                ChoiceSnapshot {
                    id: 2,
                    label: "Blue".to_string(),
                    vote_count: 1,
                    voter_labels: vec!["bob".to_string()],
                },
            ],
        }
    }

    #[test]
    fn test_totals() {
        let snapshot = sample();
        assert_eq!(snapshot.total_votes(), 3);
        assert_eq!(snapshot.vote_counts(), vec![2, 1]);
    }

    #[test]
    fn test_json_field_names() {
        let snapshot = sample();
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["is_expired"], false);
        assert_eq!(value["choices"][0]["votes"], 2);
        assert_eq!(value["choices"][1]["voters"][0], "bob");

        let expires_at: DateTime<Utc> = value["expires_at"].as_str().unwrap().parse().unwrap();
        assert_eq!(expires_at, snapshot.expires_at);
    }
}
