//! Core data types flowing through the feed engine.
//!
//! ## Architecture
//!
//! - [`RawFrame`] is one line read from the upstream link, tagged with its
//!   arrival time and link session
//! - [`Packet`] is the normalized, immutable record built from a frame and
//!   shared as `Arc<Packet>` from then on
//! - [`ConnectionState`] is the whole-value snapshot published by the
//!   connection manager on every transition
//! - [`Callsign`] is a validated, uppercase station identifier
//!
//! ## Usage Example
//!
//! ```rust
//! use aprsfeed::types::{PacketKind, RawFrame};
//! use aprsfeed::normalize::normalize;
//! use std::time::SystemTime;
//!
//! let frame = RawFrame::new("N0CALL>APRS,TCPIP*:>On the air", SystemTime::UNIX_EPOCH, 1);
//! let packet = normalize(&frame).unwrap();
//!
//! assert_eq!(packet.source.as_str(), "N0CALL");
//! assert_eq!(packet.kind(), PacketKind::Status);
//! ```

mod callsign;
mod frame;
mod packet;
mod position;
mod state;
mod update_rate;

// Re-export all public types
pub use callsign::{Callsign, MAX_CALLSIGN_LEN};
pub use frame::RawFrame;
pub use packet::{MessageKind, Packet, PacketKind, Payload};
pub use position::{Position, cardinal};
pub use state::{ConnectionState, ConnectionStatus};
pub use update_rate::UpdateRate;
