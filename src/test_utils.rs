//! Test utilities: a scripted in-memory transport and packet helpers
//!
//! [`ScriptedTransport`] plays the part of an APRS-IS server. Each call to
//! `connect` consumes the next scripted outcome: a refusal, or an accepted
//! link whose server side ([`ServerEnd`]) the test drives by pushing lines,
//! closing or failing it, and inspecting what the client wrote.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;
use tokio::sync::mpsc;

use crate::config::SessionConfig;
use crate::normalize::normalize;
use crate::transport::{Link, Transport};
use crate::types::{Callsign, Packet, RawFrame};
use crate::{FeedError, Result};

enum Outcome {
    Refuse(String),
    Accept(ScriptedLink),
}

#[derive(Default)]
struct Script {
    outcomes: VecDeque<Outcome>,
    attempts: usize,
}

/// In-memory transport following a script of connection outcomes.
///
/// Once the script runs out, every further attempt is refused.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a refused connection attempt.
    pub fn refuse(&self, reason: impl Into<String>) {
        self.script().outcomes.push_back(Outcome::Refuse(reason.into()));
    }

    /// Queue an accepted connection, returning the server side of the link.
    pub fn accept(&self) -> ServerEnd {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (written_tx, written_rx) = mpsc::unbounded_channel();
        let link = ScriptedLink { inbound: inbound_rx, written: written_tx, closed: false };
        self.script().outcomes.push_back(Outcome::Accept(link));
        ServerEnd { inbound: inbound_tx, written: written_rx }
    }

    /// Connection attempts made so far.
    pub fn attempts(&self) -> usize {
        self.script().attempts
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self) -> Result<Box<dyn Link>> {
        let outcome = {
            let mut script = self.script();
            script.attempts += 1;
            script.outcomes.pop_front()
        };
        match outcome {
            Some(Outcome::Accept(link)) => Ok(Box::new(link)),
            Some(Outcome::Refuse(reason)) => Err(FeedError::connection_failed(reason)),
            None => Err(FeedError::connection_failed("connection refused (script exhausted)")),
        }
    }

    fn endpoint(&self) -> String {
        "scripted:14580".to_string()
    }
}

enum Inbound {
    Line(String),
    Close,
    Fail(String),
}

struct ScriptedLink {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    written: mpsc::UnboundedSender<String>,
    closed: bool,
}

#[async_trait::async_trait]
impl Link for ScriptedLink {
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.closed {
            return Ok(None);
        }
        match self.inbound.recv().await {
            Some(Inbound::Line(line)) => Ok(Some(line.into_bytes())),
            Some(Inbound::Fail(reason)) => Err(FeedError::connection_failed(reason)),
            Some(Inbound::Close) | None => {
                self.closed = true;
                Ok(None)
            }
        }
    }

    async fn write_frame(&mut self, line: &str) -> Result<()> {
        if self.closed {
            return Err(FeedError::send_failed("link closed"));
        }
        let _ = self.written.send(line.to_string());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Server side of an accepted scripted link.
///
/// Dropping it closes the link from the server's end.
pub struct ServerEnd {
    inbound: mpsc::UnboundedSender<Inbound>,
    written: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    /// Deliver a line to the client.
    pub fn send_line(&self, line: impl Into<String>) {
        let _ = self.inbound.send(Inbound::Line(line.into()));
    }

    /// Close the link cleanly (the client reads end of stream).
    pub fn close(&self) {
        let _ = self.inbound.send(Inbound::Close);
    }

    /// Make the client's next read fail.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.inbound.send(Inbound::Fail(reason.into()));
    }

    /// Next line written by the client.
    pub async fn next_written(&mut self) -> Option<String> {
        self.written.recv().await
    }

    /// Lines written by the client so far and not yet taken.
    pub fn drain_written(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.written.try_recv() {
            lines.push(line);
        }
        lines
    }
}

/// A raw frame arriving at the Unix epoch on connection 1.
pub fn frame(line: &str) -> RawFrame {
    RawFrame::new(line, SystemTime::UNIX_EPOCH, 1)
}

/// Normalize a line that is known to be valid.
pub fn packet(line: &str) -> Arc<Packet> {
    match normalize(&frame(line)) {
        Ok(packet) => Arc::new(packet),
        Err(e) => panic!("test packet {line:?} does not normalize: {e}"),
    }
}

/// Parse a callsign that is known to be valid.
pub fn callsign(raw: &str) -> Callsign {
    match Callsign::parse(raw) {
        Ok(callsign) => callsign,
        Err(e) => panic!("test callsign {raw:?} is invalid: {e}"),
    }
}

/// Session configuration with short timers, suited to paused-clock tests.
pub fn test_config(operator: &str) -> SessionConfig {
    let mut config = SessionConfig::new(callsign(operator));
    config.feed.capacity = 100;
    config.feed.raw_log_capacity = 1_000;
    config.reconnect.initial_backoff_ms = 100;
    config.reconnect.max_backoff_ms = 1_000;
    config.heartbeat.idle_window_ms = 60_000;
    config.heartbeat.probe_timeout_ms = 5_000;
    config.chat.ack_timeout_ms = 30;
    config.connect_timeout_ms = 1_000;
    config.send_timeout_ms = 1_000;
    config.event_capacity = 256;
    config
}
