//! Chat session: operator-to-station messaging over APRS.
//!
//! Outbound text is sent as an APRS message with a message number, which
//! the peer echoes back in an `ack`. Inbound traffic reaches the session
//! through [`ChatSession::observe`], which sees every normalized packet
//! regardless of the feed's view filter.
//!
//! Delivery states of an outbound message:
//!
//! ```text
//! Pending --ack--> Acked
//!    |  \--rej / send error--> Failed --resend--> Pending
//!    \--ack timeout--> TimedOut --resend--> Pending
//! ```
//!
//! A late ack still moves a timed out message to `Acked`.

mod session;
mod thread;

pub use session::{ChatEvent, ChatSession};
pub use thread::{ChatMessage, ChatThread, DeliveryStatus, Direction, MessageId};
