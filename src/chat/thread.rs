//! Conversation threads and their messages

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::types::Callsign;

/// APRS message number (1-5 letters or digits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for MessageId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for MessageId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Delivery state of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Sent, waiting for the peer's ack
    Pending,
    /// The peer acknowledged the message number
    Acked,
    /// No ack within the timeout; eligible for manual resend
    TimedOut,
    /// The send failed or the peer rejected the message
    Failed,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Acked => "acked",
            DeliveryStatus::TimedOut => "timed out",
            DeliveryStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// One message in a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub direction: Direction,
    pub text: String,
    /// Message number, if one was sent or received
    pub msg_id: Option<MessageId>,
    /// Delivery state; always `Some` for outbound messages, `None` for inbound
    pub status: Option<DeliveryStatus>,
    /// When the message was sent or received
    pub timestamp: SystemTime,
}

impl ChatMessage {
    pub(crate) fn outbound(text: &str, msg_id: MessageId) -> Self {
        Self {
            direction: Direction::Outbound,
            text: text.to_string(),
            msg_id: Some(msg_id),
            status: Some(DeliveryStatus::Pending),
            timestamp: SystemTime::now(),
        }
    }

    pub(crate) fn inbound(text: &str, msg_id: Option<MessageId>, timestamp: SystemTime) -> Self {
        Self { direction: Direction::Inbound, text: text.to_string(), msg_id, status: None, timestamp }
    }
}

/// Ordered conversation with one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatThread {
    pub peer: Callsign,
    pub messages: Vec<ChatMessage>,
}

impl ChatThread {
    pub(crate) fn new(peer: Callsign) -> Self {
        Self { peer, messages: Vec::new() }
    }

    /// Our outbound message with this number.
    pub fn outbound(&self, msg_id: &str) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.direction == Direction::Outbound && m.msg_id.as_ref().is_some_and(|id| id == msg_id))
    }

    pub(crate) fn outbound_mut(&mut self, msg_id: &str) -> Option<&mut ChatMessage> {
        self.messages
            .iter_mut()
            .rev()
            .find(|m| m.direction == Direction::Outbound && m.msg_id.as_ref().is_some_and(|id| id == msg_id))
    }

    /// Whether this exact inbound message was already recorded (a retransmission).
    pub(crate) fn has_inbound(&self, text: &str, msg_id: &MessageId) -> bool {
        self.messages.iter().rev().any(|m| {
            m.direction == Direction::Inbound && m.msg_id.as_ref() == Some(msg_id) && m.text == text
        })
    }

    /// Time of the newest message.
    pub fn last_activity(&self) -> Option<SystemTime> {
        self.messages.last().map(|m| m.timestamp)
    }

    /// Outbound messages still waiting for an ack.
    pub fn pending(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(|m| m.status == Some(DeliveryStatus::Pending))
    }
}
