//! # quickpoll-protocol
//!
//! Wire types for the QuickPoll realtime polling service.
//!
//! This crate defines what travels between clients and the server:
//!
//! - `PollSnapshot` - Aggregated, read-only view of a poll
//! - `Join` / `Leave` - Topic membership for live updates
//! - `PollUpdate` - Pushed to members after every vote
//! - `Ack` / `Error` - Acknowledgments and errors
//!
//! ## Example
//!
//! ```rust
//! use quickpoll_protocol::{codec, Frame};
//!
//! let frame = Frame::join(1, 42);
//!
//! let text = codec::encode_json(&frame).unwrap();
//! assert_eq!(codec::decode_json(&text).unwrap(), frame);
//!
//! let encoded = codec::encode(&frame).unwrap();
//! assert_eq!(codec::decode(&encoded).unwrap(), frame);
//! ```

pub mod codec;
pub mod frames;
pub mod snapshot;

pub use codec::{decode, encode, Encoding, ProtocolError};
pub use frames::{codes, Frame, FrameType, PROTOCOL_VERSION};
pub use snapshot::{ChoiceId, ChoiceSnapshot, PollId, PollSnapshot};
