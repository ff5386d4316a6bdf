//! Raw inbound frame type

use std::sync::Arc;
use std::time::SystemTime;

/// One raw line received from the upstream link.
///
/// This is the unit handed from the connection manager to the normalizer.
/// It is transient: the pipeline drops it once a [`Packet`](super::Packet) has
/// been produced (the packet keeps a shared reference to the text for
/// debugging).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Frame text without the line terminator (shared via Arc)
    pub data: Arc<str>,

    /// Wall-clock time the frame was read from the link
    pub arrival: SystemTime,

    /// Identifier of the link session that produced the frame
    pub connection_id: u64,
}

impl RawFrame {
    /// Create a new raw frame
    pub fn new(data: impl Into<Arc<str>>, arrival: SystemTime, connection_id: u64) -> Self {
        Self { data: data.into(), arrival, connection_id }
    }

    /// Build a frame from bytes read off the wire.
    ///
    /// APRS-IS is nominally ASCII but in practice carries Latin-1 and UTF-8
    /// payloads; invalid sequences are replaced rather than rejected.
    pub fn from_bytes(bytes: &[u8], arrival: SystemTime, connection_id: u64) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let text = text.trim_end_matches(['\r', '\n']);
        Self::new(text, arrival, connection_id)
    }

    /// Whether this is an APRS-IS server comment (`#` line) rather than a packet.
    pub fn is_server_comment(&self) -> bool {
        self.data.starts_with('#')
    }
}
