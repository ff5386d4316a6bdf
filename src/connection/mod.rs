//! Connection manager: lifecycle of the upstream APRS-IS link.
//!
//! [`ConnectionManager::connect`] spawns a supervisor task that owns the
//! [`Link`](crate::transport::Link) and walks the state machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Reconnecting -> Connected ...
//!                                   |              |
//!                          disconnect()      non-retryable error or
//!                                   v        max_retries exhausted
//!                             Disconnected         v
//!                                               Failed
//! ```
//!
//! Every transition is published as a whole [`ConnectionState`] value, both
//! on a `watch` channel (latest value) and a `broadcast` channel (every
//! transition). Lines read from the link are forwarded in arrival order as
//! [`RawFrame`](crate::types::RawFrame)s.
//!
//! While connected, a link that stays silent for the heartbeat idle window is
//! probed; only if nothing at all arrives within the probe timeout is it
//! declared lost. Reconnection uses capped exponential backoff, and
//! cancellation resolves any in-flight backoff promptly.
//!
//! [`ConnectionState`]: crate::types::ConnectionState

mod backoff;
mod login;
mod manager;


pub use backoff::Backoff;
pub use login::LoginResponse;
pub use manager::{ConnectionChannels, ConnectionHandle, ConnectionManager, LinkSettings};

use crate::Result;

/// Outbound side of the link as seen by the chat session.
#[async_trait::async_trait]
pub trait Outbound: Send + Sync + 'static {
    /// Send one line, failing with [`FeedError::Send`](crate::FeedError::Send)
    /// when it cannot be handed to a connected link.
    async fn send_line(&self, line: String) -> Result<()>;
}
