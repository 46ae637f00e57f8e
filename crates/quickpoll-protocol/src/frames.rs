//! Frame types for the QuickPoll realtime protocol.
//!
//! Clients join and leave poll topics; the server acknowledges requests and
//! pushes a [`Frame::PollUpdate`] whenever a joined poll receives a vote.

use serde::{Deserialize, Serialize};

use crate::snapshot::{PollId, PollSnapshot};

/// Current protocol version, announced in [`Frame::Connected`].
pub const PROTOCOL_VERSION: u8 = 1;

/// Error codes carried by [`Frame::Error`].
pub mod codes {
    /// The frame could not be decoded or is not valid from a client.
    pub const BAD_FRAME: u16 = 400;
    /// The referenced poll does not exist.
    pub const POLL_NOT_FOUND: u16 = 404;
    /// The connection is not a member of the topic.
    pub const NOT_SUBSCRIBED: u16 = 409;
    /// The connection reached its subscription limit.
    pub const SUBSCRIPTION_LIMIT: u16 = 429;
    /// Unexpected server-side failure.
    pub const INTERNAL: u16 = 500;
}

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Join,
    Leave,
    PollUpdate,
    Ack,
    Error,
    Ping,
    Pong,
    Connected,
}

impl FrameType {
    /// Wire name of the frame type (the `type` tag).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FrameType::Join => "join",
            FrameType::Leave => "leave",
            FrameType::PollUpdate => "poll_update",
            FrameType::Ack => "ack",
            FrameType::Error => "error",
            FrameType::Ping => "ping",
            FrameType::Pong => "pong",
            FrameType::Connected => "connected",
        }
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Join a poll's topic to receive live updates.
    Join {
        /// Request ID for acknowledgment.
        id: u64,
        /// Poll to follow.
        poll_id: PollId,
    },

    /// Leave a poll's topic.
    Leave {
        /// Request ID for acknowledgment.
        id: u64,
        /// Poll to stop following.
        poll_id: PollId,
    },

    /// Fresh snapshot of a poll after a vote.
    PollUpdate {
        /// Poll the update belongs to.
        poll_id: PollId,
        /// Current state of the poll.
        poll: PollSnapshot,
    },

    /// Acknowledgment of a request.
    Ack {
        /// ID of the acknowledged request.
        id: u64,
    },

    /// Error response.
    Error {
        /// ID of the failed request (0 if not applicable).
        id: u64,
        /// Error code, see [`codes`].
        code: u16,
        /// Human-readable error message.
        message: String,
    },

    /// Keepalive ping.
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Sent by the server once the connection is established.
    Connected {
        /// Unique connection identifier.
        connection_id: String,
        /// Protocol version spoken by the server.
        version: u8,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Join { .. } => FrameType::Join,
            Frame::Leave { .. } => FrameType::Leave,
            Frame::PollUpdate { .. } => FrameType::PollUpdate,
            Frame::Ack { .. } => FrameType::Ack,
            Frame::Error { .. } => FrameType::Error,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
            Frame::Connected { .. } => FrameType::Connected,
        }
    }

    /// Whether a client is allowed to send this frame.
    #[must_use]
    pub fn is_client_frame(&self) -> bool {
        matches!(
            self,
            Frame::Join { .. } | Frame::Leave { .. } | Frame::Ping { .. } | Frame::Pong { .. }
        )
    }

    /// Create a new Join frame.
    #[must_use]
    pub fn join(id: u64, poll_id: PollId) -> Self {
        Frame::Join { id, poll_id }
    }

    /// Create a new Leave frame.
    #[must_use]
    pub fn leave(id: u64, poll_id: PollId) -> Self {
        Frame::Leave { id, poll_id }
    }

    /// Create a new PollUpdate frame.
    #[must_use]
    pub fn poll_update(poll: PollSnapshot) -> Self {
        Frame::PollUpdate {
            poll_id: poll.id,
            poll,
        }
    }

    /// Create a new Ack frame.
    #[must_use]
    pub fn ack(id: u64) -> Self {
        Frame::Ack { id }
    }

    /// Create a new Error frame.
    #[must_use]
    pub fn error(id: u64, code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            id,
            code,
            message: message.into(),
        }
    }

    /// Create a new Ping frame.
    #[must_use]
    pub fn ping() -> Self {
        Frame::Ping { timestamp: None }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }

    /// Create a new Connected frame.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            version: PROTOCOL_VERSION,
        }
    }
}
