//! Connection lifecycle state

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Lifecycle phase of the upstream link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// Idle; no link and no attempt in progress
    Disconnected,
    /// First connection attempt in progress
    Connecting,
    /// Link up and (if configured) logged in
    Connected,
    /// Link lost or attempt failed; waiting out backoff or retrying
    Reconnecting,
    /// Gave up; only an explicit reconnect leaves this state
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot of the connection manager's state.
///
/// Published as a whole value on every transition; readers never see a
/// half-updated state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Display form of the most recent connection error, if any
    pub last_error: Option<Arc<str>>,
    /// Failed attempts since the last successful connect
    pub retry_count: u32,
    /// Identifier of the current (or last) link session
    pub connection_id: u64,
    /// `host:port` of the upstream server
    pub endpoint: Arc<str>,
}

impl ConnectionState {
    /// Initial state before the manager starts.
    pub fn disconnected(endpoint: impl Into<Arc<str>>) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            last_error: None,
            retry_count: 0,
            connection_id: 0,
            endpoint: endpoint.into(),
        }
    }

    /// Whether outbound traffic can currently be sent.
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Header-style summary, e.g. `APRS-IS : rotate.aprs2.net:14580`.
    pub fn summary(&self) -> String {
        match self.status {
            ConnectionStatus::Connected => format!("APRS-IS : {}", self.endpoint),
            ConnectionStatus::Reconnecting => {
                format!("Connection Lost (retry {})", self.retry_count)
            }
            status => format!("{status} : {}", self.endpoint),
        }
    }
}
