//! Session configuration.
//!
//! The host resolves a [`SessionConfig`] (typically from YAML) and hands it to
//! [`Session::start`](crate::Session::start). Durations are stored as plain
//! millisecond counts so the file format stays obvious; accessors return
//! [`Duration`]s.
//!
//! ```rust
//! use aprsfeed::SessionConfig;
//!
//! let config = SessionConfig::from_yaml_str(r#"
//! endpoint:
//!   host: rotate.aprs2.net
//!   port: 14580
//! operator: N0CALL-9
//! login:
//!   callsign: N0CALL-9
//!   passcode: "-1"
//!   server_filter: r/42.36/-71.06/50
//! initial_filter: type=message,status
//! "#).unwrap();
//!
//! assert_eq!(config.endpoint.address(), "rotate.aprs2.net:14580");
//! assert_eq!(config.feed.capacity, 20_000);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::types::{Callsign, Position};
use crate::{FeedError, Result};

/// Upstream server address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    #[serde(default = "Endpoint::default_port")]
    pub port: u16,
}

impl Endpoint {
    fn default_port() -> u16 {
        14580
    }

    /// `host:port` form.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self { host: "rotate.aprs2.net".to_string(), port: Self::default_port() }
    }
}

/// APRS-IS login credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginConfig {
    pub callsign: Callsign,
    /// APRS-IS passcode; `-1` logs in receive-only
    #[serde(default = "LoginConfig::default_passcode")]
    pub passcode: String,
    /// Server-side filter sent with the login line (e.g. `r/lat/lon/km`)
    #[serde(default)]
    pub server_filter: Option<String>,
    #[serde(default = "LoginConfig::default_software")]
    pub software: String,
    #[serde(default = "LoginConfig::default_version")]
    pub version: String,
}

impl LoginConfig {
    fn default_passcode() -> String {
        "-1".to_string()
    }

    fn default_software() -> String {
        env!("CARGO_PKG_NAME").to_string()
    }

    fn default_version() -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    /// Login credentials with default software identification.
    pub fn new(callsign: Callsign, passcode: impl Into<String>) -> Self {
        Self {
            callsign,
            passcode: passcode.into(),
            server_filter: None,
            software: Self::default_software(),
            version: Self::default_version(),
        }
    }
}

/// Live feed buffer sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Maximum retained feed entries
    pub capacity: usize,
    /// Maximum retained unfiltered packets for rebuilds; 0 disables rebuilds
    pub raw_log_capacity: usize,
    /// Window for dropping duplicate copies of the same packet; 0 disables
    pub dedup_window_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { capacity: 20_000, raw_log_capacity: 50_000, dedup_window_ms: 30_000 }
    }
}

impl FeedConfig {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }
}

/// Reconnection backoff policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    /// Give up (state `Failed`) after this many consecutive failures; unlimited when unset
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self { initial_backoff_ms: 1_000, max_backoff_ms: 60_000, multiplier: 2.0, max_retries: None }
    }
}

impl ReconnectConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Idle detection on an established link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Silence after which the link is probed. APRS-IS servers send a
    /// keepalive comment every 20 seconds.
    pub idle_window_ms: u64,
    /// How long to wait for any traffic after a probe before declaring loss
    pub probe_timeout_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { idle_window_ms: 60_000, probe_timeout_ms: 15_000 }
    }
}

impl HeartbeatConfig {
    pub fn idle_window(&self) -> Duration {
        Duration::from_millis(self.idle_window_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Chat session behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Time a sent message waits for an ack before it is marked timed out
    pub ack_timeout_ms: u64,
    /// Acknowledge inbound messages that carry a message number
    pub auto_ack: bool,
    /// Destination (software tocall) used for outbound packets
    pub tocall: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { ack_timeout_ms: 30_000, auto_ack: true, tocall: "APZFED".to_string() }
    }
}

impl ChatConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Complete configuration for one feed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub endpoint: Endpoint,
    /// Operator callsign: messages addressed here are chat traffic
    pub operator: Callsign,
    #[serde(default)]
    pub login: Option<LoginConfig>,
    /// Operator location for distance/bearing display
    #[serde(default)]
    pub location: Option<Location>,
    /// Filter expression installed at start-up
    #[serde(default)]
    pub initial_filter: String,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default = "SessionConfig::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "SessionConfig::default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Capacity of each event broadcast channel
    #[serde(default = "SessionConfig::default_event_capacity")]
    pub event_capacity: usize,
}

/// Fixed operator location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// As a position, for distance and bearing calculations.
    pub fn position(&self) -> Position {
        Position {
            latitude: self.latitude,
            longitude: self.longitude,
            symbol_table: '/',
            symbol_code: '-',
        }
    }
}

impl SessionConfig {
    fn default_connect_timeout_ms() -> u64 {
        10_000
    }

    fn default_send_timeout_ms() -> u64 {
        5_000
    }

    fn default_event_capacity() -> usize {
        1_024
    }

    /// Configuration with defaults for everything but the operator.
    pub fn new(operator: Callsign) -> Self {
        Self {
            endpoint: Endpoint::default(),
            operator,
            login: None,
            location: None,
            initial_filter: String::new(),
            feed: FeedConfig::default(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            chat: ChatConfig::default(),
            connect_timeout_ms: Self::default_connect_timeout_ms(),
            send_timeout_ms: Self::default_send_timeout_ms(),
            event_capacity: Self::default_event_capacity(),
        }
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| FeedError::config(format!("invalid configuration YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| FeedError::config_file(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.host.trim().is_empty() {
            return Err(FeedError::config("endpoint.host must not be empty"));
        }
        if self.feed.capacity == 0 {
            return Err(FeedError::config("feed.capacity must be at least 1"));
        }
        if self.reconnect.initial_backoff_ms == 0 {
            return Err(FeedError::config("reconnect.initial_backoff_ms must be positive"));
        }
        if self.reconnect.max_backoff_ms < self.reconnect.initial_backoff_ms {
            return Err(FeedError::config(
                "reconnect.max_backoff_ms must not be below reconnect.initial_backoff_ms",
            ));
        }
        if !self.reconnect.multiplier.is_finite() || self.reconnect.multiplier < 1.0 {
            return Err(FeedError::config("reconnect.multiplier must be at least 1.0"));
        }
        if self.heartbeat.idle_window_ms == 0 || self.heartbeat.probe_timeout_ms == 0 {
            return Err(FeedError::config("heartbeat windows must be positive"));
        }
        if self.chat.ack_timeout_ms == 0 {
            return Err(FeedError::config("chat.ack_timeout_ms must be positive"));
        }
        if self.chat.tocall.is_empty()
            || self.chat.tocall.len() > 6
            || !self.chat.tocall.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(FeedError::config("chat.tocall must be 1-6 letters or digits"));
        }
        if self.event_capacity == 0 {
            return Err(FeedError::config("event_capacity must be at least 1"));
        }
        crate::filter::compile(&self.initial_filter)?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn minimal_yaml_uses_defaults() -> Result<()> {
        let config = SessionConfig::from_yaml_str("operator: n0call").context("parse")?;
        assert_eq!(config.operator.as_str(), "N0CALL");
        assert_eq!(config.endpoint, Endpoint::default());
        assert_eq!(config.feed, FeedConfig::default());
        assert_eq!(config.chat.ack_timeout(), Duration::from_secs(30));
        assert!(config.login.is_none());
        Ok(())
    }

    #[test]
    fn full_yaml_round_trips() -> Result<()> {
        let yaml = r#"
endpoint: { host: localhost, port: 10152 }
operator: N0CALL-9
login: { callsign: N0CALL-9, passcode: "12345", server_filter: "b/K1ABC*" }
location: { latitude: 42.36, longitude: -71.06 }
initial_filter: type=message
feed: { capacity: 3, raw_log_capacity: 0, dedup_window_ms: 0 }
reconnect: { initial_backoff_ms: 10, max_backoff_ms: 80, multiplier: 2.0, max_retries: 5 }
heartbeat: { idle_window_ms: 100, probe_timeout_ms: 50 }
chat: { ack_timeout_ms: 30, auto_ack: false, tocall: APZTST }
"#;
        let config = SessionConfig::from_yaml_str(yaml)?;
        let login = config.login.clone().context("login present")?;
        assert_eq!(login.passcode, "12345");
        assert_eq!(login.software, "aprsfeed");
        assert_eq!(config.reconnect.max_retries, Some(5));

        let again = serde_yaml_ng::to_string(&config)?;
        assert_eq!(SessionConfig::from_yaml_str(&again)?, config);
        Ok(())
    }

    #[test]
    fn validation_rejects_bad_values() {
        let cases = [
            "operator: N0CALL\nfeed: { capacity: 0 }",
            "operator: N0CALL\nreconnect: { initial_backoff_ms: 100, max_backoff_ms: 10 }",
            "operator: N0CALL\nreconnect: { multiplier: 0.5 }",
            "operator: N0CALL\nchat: { tocall: \"TOO-LONG-TOCALL\" }",
            "operator: N0CALL\ninitial_filter: \"frm=x\"",
            "operator: \"not a call\"",
        ];

        for yaml in cases {
            assert!(SessionConfig::from_yaml_str(yaml).is_err(), "should reject: {yaml}");
        }
    }

    #[test]
    fn missing_file_reports_path() {
        let err = SessionConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, FeedError::ConfigFile { .. }));
        assert!(err.to_string().contains("/definitely/not/here.yaml"));
    }
}
