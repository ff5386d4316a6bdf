//! Normalized packet types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use super::{Callsign, Position};

/// Coarse packet classification used by filters and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketKind {
    /// Position report (with or without timestamp)
    Position,
    /// Addressed message, ack or reject
    Message,
    /// Status report
    Status,
    /// Telemetry report
    Telemetry,
    /// Anything else (objects, weather, third-party, unknown)
    Other,
}

impl PacketKind {
    /// All kinds, in display order.
    pub const ALL: [PacketKind; 5] = [
        PacketKind::Position,
        PacketKind::Message,
        PacketKind::Status,
        PacketKind::Telemetry,
        PacketKind::Other,
    ];

    /// Lowercase name as used in filter expressions.
    pub const fn name(self) -> &'static str {
        match self {
            PacketKind::Position => "position",
            PacketKind::Message => "message",
            PacketKind::Status => "status",
            PacketKind::Telemetry => "telemetry",
            PacketKind::Other => "other",
        }
    }

    /// Look up a kind by its filter name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an addressed message packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Free text, optionally requesting an ack via a message number
    Text,
    /// Acknowledgement of a previously sent message number
    Ack,
    /// Rejection of a previously sent message number
    Reject,
}

/// Type-specific payload fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Position {
        position: Position,
        /// Free text after the position and symbol
        comment: String,
        /// Whether the station accepts messages (`=`/`@` data type)
        messaging: bool,
    },
    Message {
        addressee: Callsign,
        kind: MessageKind,
        /// Message text (empty for acks and rejects)
        text: String,
        /// Message number: the requested ack id for text, the referenced id for acks
        msg_id: Option<String>,
    },
    Status {
        text: String,
    },
    Telemetry {
        sequence: String,
        values: Vec<f64>,
        bits: Option<String>,
    },
    Other {
        /// APRS data type identifier (first payload character)
        data_type: Option<char>,
        text: String,
    },
}

impl Payload {
    /// The coarse classification of this payload.
    pub fn kind(&self) -> PacketKind {
        match self {
            Payload::Position { .. } => PacketKind::Position,
            Payload::Message { .. } => PacketKind::Message,
            Payload::Status { .. } => PacketKind::Status,
            Payload::Telemetry { .. } => PacketKind::Telemetry,
            Payload::Other { .. } => PacketKind::Other,
        }
    }

    /// Human-readable text carried by the payload, used for free-text search.
    pub fn text(&self) -> &str {
        match self {
            Payload::Position { comment, .. } => comment,
            Payload::Message { text, .. } => text,
            Payload::Status { text } => text,
            Payload::Telemetry { sequence, .. } => sequence,
            Payload::Other { text, .. } => text,
        }
    }
}

/// A normalized APRS packet.
///
/// Packets are built once by the normalizer and shared as `Arc<Packet>`
/// afterwards; nothing in the crate mutates one after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Originating station
    pub source: Callsign,

    /// Destination field of the frame (usually a software/device tocall)
    pub destination: String,

    /// Digipeater / q-construct path, in order
    pub path: Vec<String>,

    /// Decoded payload
    pub payload: Payload,

    /// Arrival time of the raw frame
    pub received_at: SystemTime,

    /// The raw frame text, kept for debugging views
    #[serde(with = "arc_str")]
    pub raw: Arc<str>,
}

impl Packet {
    /// Coarse packet type.
    pub fn kind(&self) -> PacketKind {
        self.payload.kind()
    }

    /// The station this packet is addressed to.
    ///
    /// For messages this is the addressee inside the payload, otherwise the
    /// frame's destination field.
    pub fn addressee(&self) -> &str {
        match &self.payload {
            Payload::Message { addressee, .. } => addressee.as_str(),
            _ => &self.destination,
        }
    }

    /// Position carried by the packet, if any.
    pub fn position(&self) -> Option<&Position> {
        match &self.payload {
            Payload::Position { position, .. } => Some(position),
            _ => None,
        }
    }

    /// Body of the frame after the first `:` (used for duplicate detection).
    pub fn information(&self) -> &str {
        self.raw.split_once(':').map(|(_, info)| info).unwrap_or("")
    }
}

mod arc_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S: Serializer>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Arc<str>, D::Error> {
        String::deserialize(deserializer).map(Arc::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in PacketKind::ALL {
            assert_eq!(PacketKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(PacketKind::from_name("MESSAGE"), Some(PacketKind::Message));
        assert_eq!(PacketKind::from_name("weather"), None);
    }

    #[test]
    fn addressee_prefers_message_target() {
        let packet = Packet {
            source: Callsign::parse("K1ABC").unwrap(),
            destination: "APRS".into(),
            path: vec!["TCPIP*".into()],
            payload: Payload::Message {
                addressee: Callsign::parse("N0CALL").unwrap(),
                kind: MessageKind::Text,
                text: "hello".into(),
                msg_id: Some("1".into()),
            },
            received_at: SystemTime::UNIX_EPOCH,
            raw: Arc::from("K1ABC>APRS,TCPIP*::N0CALL   :hello{1"),
        };

        assert_eq!(packet.addressee(), "N0CALL");
        assert_eq!(packet.kind(), PacketKind::Message);
        assert_eq!(packet.information(), ":N0CALL   :hello{1");
    }
}
