//! The host-facing entry point: one running feed session.

use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tracing::info;

use crate::chat::{ChatEvent, ChatSession, MessageId};
use crate::config::SessionConfig;
use crate::connection::{ConnectionChannels, ConnectionHandle, ConnectionManager, LinkSettings};
use crate::driver::{Driver, PipelineHandle, PipelineStats};
use crate::feed::{FeedEvent, LiveFeed, RebuildReport};
use crate::filter::{FilterPredicate, FilterSlot, compile};
use crate::stream::CoalesceExt;
use crate::transport::Transport;
use crate::transports::TcpTransport;
use crate::types::{Callsign, ConnectionState, Packet, UpdateRate};
use crate::Result;

/// A connected feed: connection manager, ingestion pipeline, live feed and
/// chat session wired together.
///
/// Renderers read through [`feed`](Self::feed) and the event streams; they
/// change core state only through the command methods here.
///
/// ```no_run
/// use aprsfeed::{Session, SessionConfig, UpdateRate};
/// use futures::StreamExt;
///
/// # async fn run() -> aprsfeed::Result<()> {
/// let config = SessionConfig::load("aprsfeed.yaml")?;
/// let session = Session::connect(config)?;
/// let mut updates = session.feed_updates(UpdateRate::Max(10));
///
/// let mut seen = 0;
/// while let Some(head) = updates.next().await {
///     for entry in session.feed().read(seen, 100) {
///         println!("{:>6} {}", entry.seq, entry.packet.raw);
///     }
///     seen = head;
/// }
/// # Ok(())
/// # }
/// ```
pub struct Session {
    config: SessionConfig,
    connection: ConnectionHandle,
    feed: Arc<LiveFeed>,
    chat: ChatSession,
    pipeline: Option<PipelineHandle>,
}

impl Session {
    /// Connect to the configured APRS-IS endpoint over TCP.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(config: SessionConfig) -> Result<Self> {
        let transport = TcpTransport::new(config.endpoint.clone());
        Self::start(config, Arc::new(transport))
    }

    /// Start a session over any transport.
    pub fn start(config: SessionConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let filter = FilterSlot::new(compile(&config.initial_filter)?);
        let feed = Arc::new(LiveFeed::with_filter(&config.feed, filter, config.event_capacity));

        let ConnectionChannels { handle, frames } =
            ConnectionManager::connect(transport, LinkSettings::from(&config));
        let chat = ChatSession::new(
            config.operator.clone(),
            config.chat.clone(),
            Arc::new(handle.clone()),
            config.event_capacity,
        )?;
        let pipeline = Driver::spawn(frames, Arc::clone(&feed), chat.clone(), config.feed.dedup_window());

        info!(operator = %config.operator, endpoint = %handle.state().endpoint, "Session started");
        Ok(Self { config, connection: handle, feed, chat, pipeline: Some(pipeline) })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // Connection

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Every connection state transition, in order. A subscriber that falls
    /// behind skips the transitions it missed.
    pub fn state_changes(&self) -> BoxStream<'static, ConnectionState> {
        BroadcastStream::new(self.connection.subscribe())
            .filter_map(|state| async move { state.ok() })
            .boxed()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    pub async fn reconnect(&self) {
        self.connection.reconnect().await;
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// Replace the APRS-IS server-side filter. See
    /// [`ConnectionHandle::set_server_filter`].
    pub async fn set_server_filter(&self, filter: Option<String>) {
        self.connection.set_server_filter(filter).await;
    }

    // Feed

    pub fn feed(&self) -> &Arc<LiveFeed> {
        &self.feed
    }

    /// Latest head sequence, at most once per `rate` interval.
    ///
    /// Yields the current head immediately, then whenever it moves. The
    /// stream may be created on any thread but must be polled inside a Tokio
    /// runtime.
    pub fn feed_updates(&self, rate: UpdateRate) -> BoxStream<'static, u64> {
        let heads = WatchStream::new(self.feed.watch_head());
        match rate.interval() {
            Some(period) => heads.coalesce(period).boxed(),
            None => heads.boxed(),
        }
    }

    pub fn feed_events(&self) -> broadcast::Receiver<FeedEvent> {
        self.feed.subscribe()
    }

    /// Install a new view filter for future packets.
    pub fn set_filter(&self, expression: &str) -> Result<Arc<FilterPredicate>> {
        self.feed.set_filter(expression)
    }

    /// Install a filter and rebuild the feed from the raw log.
    pub fn reapply_filter(&self, expression: &str) -> Result<RebuildReport> {
        self.feed.reapply_filter(expression)
    }

    pub fn current_filter(&self) -> Arc<FilterPredicate> {
        self.feed.filter().current()
    }

    pub fn stats(&self) -> PipelineStats {
        self.pipeline.as_ref().map(PipelineHandle::stats).unwrap_or_default()
    }

    /// Distance in km and bearing in degrees from the operator location to
    /// the packet's position, when both are known.
    pub fn distance_and_bearing(&self, packet: &Packet) -> Option<(f64, f64)> {
        let home = self.config.location?.position();
        let there = packet.position()?;
        Some((home.distance_km(there), home.bearing_deg(there)))
    }

    // Chat

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    pub fn chat_events(&self) -> broadcast::Receiver<ChatEvent> {
        self.chat.subscribe()
    }

    pub async fn send_message(&self, peer: &str, text: &str) -> Result<MessageId> {
        let peer = Callsign::parse(peer)?;
        self.chat.send_message(&peer, text).await
    }

    pub async fn resend(&self, peer: &str, msg_id: &str) -> Result<()> {
        let peer = Callsign::parse(peer)?;
        self.chat.resend(&peer, msg_id).await
    }

    /// Returns `true` if the thread did not exist yet.
    pub fn open_thread(&self, peer: &str) -> Result<bool> {
        Ok(self.chat.open_thread(&Callsign::parse(peer)?))
    }

    /// Stop everything: pending ack timers, the pipeline and the link.
    pub async fn shutdown(mut self) {
        self.chat.shutdown();
        self.connection.shutdown().await;
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.shutdown().await;
        }
        info!("Session stopped");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // The pipeline holds a chat clone, which holds the connection handle
        self.chat.shutdown();
        self.connection.stop();
        if let Some(pipeline) = &self.pipeline {
            pipeline.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Location;
    use crate::test_utils::{ScriptedTransport, packet, test_config};

    #[tokio::test]
    async fn distance_and_bearing_need_a_home_location() {
        let mut config = test_config("N0CALL");
        let session = Session::start(config.clone(), Arc::new(ScriptedTransport::new())).unwrap();
        let mobile = packet("W1AW>APRS:!4130.00N/07200.00W>");
        assert!(session.distance_and_bearing(&mobile).is_none());
        session.shutdown().await;

        config.location = Some(Location { latitude: 41.0, longitude: -72.0 });
        let session = Session::start(config, Arc::new(ScriptedTransport::new())).unwrap();
        let (km, bearing) = session.distance_and_bearing(&mobile).unwrap();
        assert!((km - 55.6).abs() < 0.5, "{km}");
        assert!(bearing.abs() < 0.01 || (bearing - 360.0).abs() < 0.01, "{bearing}");
        assert!(session.distance_and_bearing(&packet("W1AW>APRS:>no position")).is_none());
    }

    #[test]
    fn feed_updates_can_be_created_off_the_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let session = runtime
            .block_on(async { Session::start(test_config("N0CALL"), Arc::new(ScriptedTransport::new())) })
            .unwrap();

        // A renderer thread that is not inside the runtime
        let mut updates = session.feed_updates(UpdateRate::Max(10));
        assert_eq!(runtime.block_on(updates.next()), Some(0));
        runtime.block_on(session.shutdown());
    }

    #[tokio::test]
    async fn open_thread_validates_the_callsign() {
        let session = Session::start(test_config("N0CALL"), Arc::new(ScriptedTransport::new())).unwrap();
        assert!(session.open_thread("w1aw").unwrap());
        assert!(!session.open_thread("W1AW").unwrap());
        assert!(session.open_thread("").is_err());
        assert!(session.chat().thread(&Callsign::parse("W1AW").unwrap()).unwrap().messages.is_empty());
    }
}
