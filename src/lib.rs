//! Live APRS packet feed engine.
//!
//! aprsfeed keeps a connection to an APRS-IS server alive, turns the raw
//! TNC2 lines it receives into typed packets, keeps a bounded and strictly
//! ordered feed of the packets that pass a user-editable filter, and runs
//! operator-to-station chat with delivery tracking on top of it.
//!
//! # Features
//!
//! - **Resilient link**: login handshake, heartbeat probing and capped
//!   exponential backoff with cancellable waits
//! - **Ordered feed**: gap-free sequence numbers, FIFO eviction and
//!   resumable cursors for renderers that fall behind
//! - **Filter language**: `from=`, `to=`, `type=`, `text~` and friends,
//!   combined with `and`/`or`/`not`
//! - **Chat**: message numbers, acks, timeouts and manual resend
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use aprsfeed::{Callsign, Session, SessionConfig, UpdateRate};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     aprsfeed::logging::init("aprsfeed=info");
//!
//!     let mut config = SessionConfig::new(Callsign::parse("N0CALL-9")?);
//!     config.initial_filter = "type=message,status".into();
//!     let session = Session::connect(config)?;
//!
//!     let mut updates = session.feed_updates(UpdateRate::Max(4));
//!     while let Some(head) = updates.next().await {
//!         for entry in session.feed().latest(1) {
//!             println!("#{head}: {}", entry.packet.raw);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Pipeline stages
pub mod connection;
pub mod driver;
pub mod feed;
pub mod filter;
pub mod normalize;

// Link layer
pub mod transport;
pub mod transports;

// Host-facing surface
pub mod chat;
pub mod logging;
pub mod session;
pub mod stream;

// Core exports
pub use config::SessionConfig;
pub use error::*;
pub use session::Session;
pub use types::*;

pub use chat::{ChatEvent, ChatSession, DeliveryStatus, MessageId};
pub use connection::ConnectionHandle;
pub use driver::PipelineStats;
pub use feed::{FeedCursor, FeedEntry, FeedEvent, LiveFeed};
pub use filter::FilterPredicate;
pub use transport::{Link, Transport};
