//! # quickpoll-core
//!
//! The real-time aggregation engine behind QuickPoll.
//!
//! - **Store** - Durable source of truth for polls, choices and votes
//! - **Aggregator** - Builds vote-count snapshots on demand
//! - **Engine** - Validates votes (existence, expiry, choice range)
//! - **Broadcaster** - Pushes snapshots to viewers of a poll
//! - **Service** - The operations transports call
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Service   │────▶│   Engine    │────▶│    Store    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                   │
//!        ▼                   ▼
//! ┌─────────────┐     ┌─────────────┐
//! │ Broadcaster │◀────│ Aggregator  │
//! └─────────────┘     └─────────────┘
//! ```

pub mod aggregator;
pub mod broadcaster;
pub mod clock;
pub mod engine;
pub mod error;
pub mod model;
pub mod service;
pub mod store;

pub use aggregator::PollAggregator;
pub use broadcaster::{
    BroadcastError, Broadcaster, BroadcasterConfig, BroadcasterStats, PollUpdate, UpdateReceiver,
};
pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use engine::VotingEngine;
pub use error::PollError;
pub use model::{Choice, Poll, Vote};
pub use service::PollService;
pub use store::{MemoryStore, PollStore, SqliteStore};
