//! Live-update fan-out for polls.
//!
//! Every poll id is a topic. A connection registers once with
//! [`Broadcaster::connect`] and gets its own unbounded delivery queue, then
//! joins any number of topics. Publishing pushes the update into the queue of
//! every member, so nothing is dropped for a connection that is still
//! registered when `publish` runs.

use dashmap::DashMap;
use quickpoll_protocol::{PollId, PollSnapshot};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// A connection identifier.
pub type ConnectionId = String;

/// Broadcaster errors.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// The connection never registered, or already disconnected.
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    /// The connection is not a member of the topic.
    #[error("Connection {connection} is not subscribed to poll {poll_id}")]
    NotSubscribed {
        connection: String,
        poll_id: PollId,
    },

    /// Maximum subscriptions reached.
    #[error("Maximum subscriptions reached")]
    MaxSubscriptionsReached,
}

/// An update delivered to topic members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollUpdate {
    /// Topic the update was published on.
    pub poll_id: PollId,
    /// Snapshot taken right after the change.
    pub poll: PollSnapshot,
}

/// Receiving half of a connection's delivery queue.
pub type UpdateReceiver = mpsc::UnboundedReceiver<Arc<PollUpdate>>;

/// Broadcaster configuration.
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// Maximum topics a single connection may join.
    pub max_subscriptions_per_connection: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            max_subscriptions_per_connection: 100,
        }
    }
}

/// A registered connection.
struct ConnectionEntry {
    sender: mpsc::UnboundedSender<Arc<PollUpdate>>,
    topics: HashSet<PollId>,
}

/// Topic membership and delivery.
///
/// Lock order is always `connections` before `topics`; `publish` holds at
/// most one of them at a time.
pub struct Broadcaster {
    /// Members of each topic.
    topics: DashMap<PollId, HashSet<ConnectionId>>,
    /// Registered connections and the topics they joined.
    connections: DashMap<ConnectionId, ConnectionEntry>,
    config: BroadcasterConfig,
}

impl Broadcaster {
    /// Create a broadcaster with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BroadcasterConfig::default())
    }

    /// Create a broadcaster with custom configuration.
    #[must_use]
    pub fn with_config(config: BroadcasterConfig) -> Self {
        info!("Creating broadcaster with config: {:?}", config);
        Self {
            topics: DashMap::new(),
            connections: DashMap::new(),
            config,
        }
    }

    /// Register a connection and return its delivery queue.
    ///
    /// Registering an id again replaces the previous queue and drops its
    /// memberships.
    pub fn connect(&self, connection_id: &str) -> UpdateReceiver {
        self.disconnect(connection_id);

        let (sender, receiver) = mpsc::unbounded_channel();
        self.connections.insert(
            connection_id.to_string(),
            ConnectionEntry {
                sender,
                topics: HashSet::new(),
            },
        );

        debug!(connection = %connection_id, "Connection registered");
        receiver
    }

    /// Join a poll's topic.
    ///
    /// Joining is idempotent. Returns `true` if the connection was not a
    /// member before.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is not registered or has reached
    /// its subscription limit.
    pub fn subscribe(&self, connection_id: &str, poll_id: PollId) -> Result<bool, BroadcastError> {
        let mut conn = self
            .connections
            .get_mut(connection_id)
            .ok_or_else(|| BroadcastError::UnknownConnection(connection_id.to_string()))?;

        if conn.topics.contains(&poll_id) {
            trace!(connection = %connection_id, poll = poll_id, "Already subscribed");
            return Ok(false);
        }

        if conn.topics.len() >= self.config.max_subscriptions_per_connection {
            return Err(BroadcastError::MaxSubscriptionsReached);
        }

        conn.topics.insert(poll_id);
        let mut members = self.topics.entry(poll_id).or_default();
        members.insert(connection_id.to_string());

        debug!(
            poll = poll_id,
            connection = %connection_id,
            subscribers = members.len(),
            "Subscribed"
        );

        Ok(true)
    }

    /// Leave a single topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is not a member of the topic.
    pub fn unsubscribe(&self, connection_id: &str, poll_id: PollId) -> Result<(), BroadcastError> {
        let removed = self
            .connections
            .get_mut(connection_id)
            .map(|mut conn| conn.topics.remove(&poll_id))
            .unwrap_or(false);

        if !removed {
            return Err(BroadcastError::NotSubscribed {
                connection: connection_id.to_string(),
                poll_id,
            });
        }

        self.remove_member(poll_id, connection_id);
        debug!(poll = poll_id, connection = %connection_id, "Unsubscribed");

        Ok(())
    }

    /// Leave every topic, keeping the connection registered.
    pub fn unsubscribe_all(&self, connection_id: &str) {
        let topics = self
            .connections
            .get_mut(connection_id)
            .map(|mut conn| std::mem::take(&mut conn.topics))
            .unwrap_or_default();

        for poll_id in &topics {
            self.remove_member(*poll_id, connection_id);
        }

        debug!(connection = %connection_id, topics = topics.len(), "Unsubscribed from all polls");
    }

    /// Forget a connection entirely. Its queue is closed.
    pub fn disconnect(&self, connection_id: &str) {
        if let Some((_, conn)) = self.connections.remove(connection_id) {
            for poll_id in &conn.topics {
                self.remove_member(*poll_id, connection_id);
            }
            debug!(connection = %connection_id, "Connection removed");
        }
    }

    /// Deliver a snapshot to every member of the poll's topic.
    ///
    /// Returns the number of connections the update was queued for. Members
    /// whose queue has been closed are dropped.
    pub fn publish(&self, poll_id: PollId, poll: PollSnapshot) -> usize {
        let members: Vec<ConnectionId> = match self.topics.get(&poll_id) {
            Some(members) => members.iter().cloned().collect(),
            None => {
                trace!(poll = poll_id, "Publish to poll without subscribers");
                return 0;
            }
        };

        let update = Arc::new(PollUpdate { poll_id, poll });
        let mut delivered = 0;
        let mut dead = Vec::new();

        for member in members {
            let sent = self
                .connections
                .get(&member)
                .map(|conn| conn.sender.send(Arc::clone(&update)).is_ok())
                .unwrap_or(false);

            if sent {
                delivered += 1;
            } else {
                dead.push(member);
            }
        }

        for member in dead {
            warn!(poll = poll_id, connection = %member, "Dropping unreachable subscriber");
            self.disconnect(&member);
            self.remove_member(poll_id, &member);
        }

        trace!(poll = poll_id, recipients = delivered, "Published update");
        delivered
    }

    /// Number of members of a poll's topic.
    #[must_use]
    pub fn subscriber_count(&self, poll_id: PollId) -> usize {
        self.topics.get(&poll_id).map(|m| m.len()).unwrap_or(0)
    }

    /// Whether a connection is a member of a poll's topic.
    #[must_use]
    pub fn is_subscribed(&self, connection_id: &str, poll_id: PollId) -> bool {
        self.connections
            .get(connection_id)
            .map(|conn| conn.topics.contains(&poll_id))
            .unwrap_or(false)
    }

    /// Polls a connection is subscribed to.
    #[must_use]
    pub fn connection_topics(&self, connection_id: &str) -> Vec<PollId> {
        self.connections
            .get(connection_id)
            .map(|conn| conn.topics.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Get broadcaster statistics.
    #[must_use]
    pub fn stats(&self) -> BroadcasterStats {
        BroadcasterStats {
            topic_count: self.topics.len(),
            connection_count: self.connections.len(),
            total_subscriptions: self.topics.iter().map(|m| m.len()).sum(),
        }
    }

    /// Remove a member from a topic, deleting the topic once empty.
    fn remove_member(&self, poll_id: PollId, connection_id: &str) {
        if let Some(mut members) = self.topics.get_mut(&poll_id) {
            members.remove(connection_id);
            if members.is_empty() {
                drop(members); // Release the shard lock
                self.topics.remove_if(&poll_id, |_, m| m.is_empty());
            }
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Broadcaster statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcasterStats {
    /// Number of polls with at least one subscriber.
    pub topic_count: usize,
    /// Number of registered connections.
    pub connection_count: usize,
    /// Total number of subscriptions.
    pub total_subscriptions: usize,
}
