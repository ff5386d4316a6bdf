//! Connection supervisor task and its handle

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::backoff::Backoff;
use super::login;
use super::Outbound;
use crate::config::{HeartbeatConfig, LoginConfig, ReconnectConfig, SessionConfig};
use crate::transport::{Link, Transport};
use crate::types::{ConnectionState, ConnectionStatus, RawFrame};
use crate::{FeedError, Result};

/// Line written to probe a silent link. Servers ignore client comments.
const PROBE_LINE: &str = "# keepalive";

/// Everything the supervisor needs from the session configuration.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub login: Option<LoginConfig>,
    pub reconnect: ReconnectConfig,
    pub heartbeat: HeartbeatConfig,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
    /// Capacity of the raw frame channel towards the pipeline
    pub frame_capacity: usize,
    pub event_capacity: usize,
}

impl From<&SessionConfig> for LinkSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            login: config.login.clone(),
            reconnect: config.reconnect.clone(),
            heartbeat: config.heartbeat.clone(),
            connect_timeout: config.connect_timeout(),
            send_timeout: config.send_timeout(),
            frame_capacity: config.event_capacity,
            event_capacity: config.event_capacity,
        }
    }
}

enum Command {
    Send { line: String, reply: oneshot::Sender<Result<()>> },
    Reconnect,
    Disconnect,
    ServerFilter(Option<String>),
}

/// Result of connecting the manager
pub struct ConnectionChannels {
    /// Command and state handle
    pub handle: ConnectionHandle,
    /// Every line read from the link, in arrival order
    pub frames: mpsc::Receiver<RawFrame>,
}

/// Owns the lifecycle of the upstream link.
pub struct ConnectionManager;

impl ConnectionManager {
    /// Spawn the supervisor task and start connecting immediately.
    pub fn connect(transport: Arc<dyn Transport>, settings: LinkSettings) -> ConnectionChannels {
        let endpoint = transport.endpoint();
        let (state_tx, state_rx) = watch::channel(ConnectionState::disconnected(endpoint.as_str()));
        let (transitions, _) = broadcast::channel(settings.event_capacity.max(1));
        let (command_tx, command_rx) = mpsc::channel(64);
        let (frame_tx, frame_rx) = mpsc::channel(settings.frame_capacity.max(1));
        let cancel = CancellationToken::new();

        let supervisor = Supervisor {
            transport,
            backoff: Backoff::new(&settings.reconnect),
            server_filter: settings.login.as_ref().and_then(|l| l.server_filter.clone()),
            settings: settings.clone(),
            state_tx,
            transitions: transitions.clone(),
            commands: command_rx,
            frames: frame_tx,
            cancel: cancel.clone(),
            endpoint: Arc::from(endpoint.as_str()),
            retry_count: 0,
            last_error: None,
            connection_id: 0,
        };
        let task = tokio::spawn(supervisor.run());

        let handle = ConnectionHandle {
            shared: Arc::new(Shared {
                commands: command_tx,
                state: state_rx,
                transitions,
                cancel,
                send_timeout: settings.send_timeout,
                task: Mutex::new(Some(task)),
            }),
        };
        ConnectionChannels { handle, frames: frame_rx }
    }
}

struct Shared {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
    cancel: CancellationToken,
    send_timeout: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        debug!("Dropping connection handle");
        self.cancel.cancel();
    }
}

/// Cloneable command/query handle to the connection manager.
///
/// Dropping the last clone stops the supervisor.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    /// Current state snapshot.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    /// Watch the latest state (intermediate states may be coalesced).
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.clone()
    }

    /// Every state transition, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.shared.transitions.subscribe()
    }

    /// Write one line to the link.
    ///
    /// Fails with [`FeedError::Send`] unless the link is connected, or if the
    /// write is not confirmed within the send timeout.
    pub async fn send(&self, line: impl Into<String>) -> Result<()> {
        let state = self.state();
        if !state.is_connected() {
            return Err(FeedError::send_failed(format!("not connected ({})", state.status)));
        }

        let wait = self.shared.send_timeout;
        let (reply, confirmed) = oneshot::channel();
        let command = Command::Send { line: line.into(), reply };
        let outcome = timeout(wait, async {
            self.shared
                .commands
                .send(command)
                .await
                .map_err(|_| FeedError::send_failed("connection manager stopped"))?;
            confirmed.await.map_err(|_| FeedError::send_failed("connection manager stopped"))?
        })
        .await;

        outcome.unwrap_or_else(|_| {
            Err(FeedError::send_failed(format!("write not confirmed within {wait:?}")))
        })
    }

    /// Drop the current link (if any) and connect again immediately.
    ///
    /// Resets the retry count and backoff; this is the way out of `Failed`.
    pub async fn reconnect(&self) {
        self.command(Command::Reconnect).await;
    }

    /// Close the link and stay `Disconnected` until [`reconnect`](Self::reconnect).
    pub async fn disconnect(&self) {
        self.command(Command::Disconnect).await;
    }

    /// Replace the server-side filter used for future logins; sent
    /// immediately when connected. `None` clears it.
    pub async fn set_server_filter(&self, filter: Option<String>) {
        self.command(Command::ServerFilter(filter)).await;
    }

    async fn command(&self, command: Command) {
        if self.shared.commands.send(command).await.is_err() {
            debug!("Connection manager already stopped");
        }
    }

    /// Ask the supervisor to stop without waiting for it.
    pub fn stop(&self) {
        self.shared.cancel.cancel();
    }

    /// Stop the supervisor and wait for it to finish.
    pub async fn shutdown(&self) {
        self.stop();
        let task = self.shared.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Connection supervisor ended abnormally: {}", e);
            }
        }
    }
}

#[async_trait::async_trait]
impl Outbound for ConnectionHandle {
    async fn send_line(&self, line: String) -> Result<()> {
        self.send(line).await
    }
}

/// What to do next
enum Phase {
    Connect,
    Wait(Duration),
    Idle,
    Stop,
}

/// Why a connected session ended
enum SessionEnd {
    Lost(FeedError),
    Reconnect,
    Disconnect,
    Stop,
}

struct Supervisor {
    transport: Arc<dyn Transport>,
    settings: LinkSettings,
    backoff: Backoff,
    server_filter: Option<String>,
    state_tx: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
    commands: mpsc::Receiver<Command>,
    frames: mpsc::Sender<RawFrame>,
    cancel: CancellationToken,
    endpoint: Arc<str>,
    retry_count: u32,
    last_error: Option<Arc<str>>,
    connection_id: u64,
}

impl Supervisor {
    async fn run(mut self) {
        info!(endpoint = %self.endpoint, "Connection supervisor started");
        let mut phase = Phase::Connect;
        loop {
            phase = match phase {
                Phase::Connect => self.attempt().await,
                Phase::Wait(delay) => self.wait(delay).await,
                Phase::Idle => self.idle().await,
                Phase::Stop => break,
            };
        }
        self.publish(ConnectionStatus::Disconnected);
        info!(endpoint = %self.endpoint, "Connection supervisor stopped");
    }

    fn publish(&self, status: ConnectionStatus) {
        let state = ConnectionState {
            status,
            last_error: self.last_error.clone(),
            retry_count: self.retry_count,
            connection_id: self.connection_id,
            endpoint: Arc::clone(&self.endpoint),
        };
        if *self.state_tx.borrow() == state {
            return;
        }
        debug!(status = %state.status, retry = state.retry_count, "Connection state changed");
        self.state_tx.send_replace(state.clone());
        let _ = self.transitions.send(state);
    }

    fn reset_retries(&mut self) {
        self.retry_count = 0;
        self.backoff.reset();
    }

    async fn attempt(&mut self) -> Phase {
        if self.retry_count == 0 {
            self.publish(ConnectionStatus::Connecting);
        }

        let cancel = self.cancel.clone();
        let opened = tokio::select! {
            _ = cancel.cancelled() => return Phase::Stop,
            opened = self.open_link() => opened,
        };

        match opened {
            Ok(mut link) => {
                self.last_error = None;
                self.reset_retries();
                self.publish(ConnectionStatus::Connected);
                info!(connection_id = self.connection_id, endpoint = %self.endpoint, "Connected");

                let end = self.session(link.as_mut()).await;
                if let Err(e) = link.close().await {
                    trace!("Error closing link: {}", e);
                }
                match end {
                    SessionEnd::Lost(e) => {
                        warn!(connection_id = self.connection_id, error = %e, "Connection lost");
                        self.fail(e)
                    }
                    SessionEnd::Reconnect => {
                        info!("Reconnect requested");
                        Phase::Connect
                    }
                    SessionEnd::Disconnect => {
                        info!("Disconnect requested");
                        self.publish(ConnectionStatus::Disconnected);
                        Phase::Idle
                    }
                    SessionEnd::Stop => Phase::Stop,
                }
            }
            Err(e) => {
                warn!(retry = self.retry_count + 1, error = %e, "Connection attempt failed");
                self.fail(e)
            }
        }
    }

    /// Record a failure and decide between retrying and giving up.
    fn fail(&mut self, cause: FeedError) -> Phase {
        self.last_error = Some(Arc::from(cause.to_string()));
        self.retry_count = self.retry_count.saturating_add(1);

        let exhausted = self.settings.reconnect.max_retries.is_some_and(|max| self.retry_count >= max);
        if !cause.is_retryable() || exhausted {
            error!(retry = self.retry_count, error = %cause, "Giving up on connection");
            self.publish(ConnectionStatus::Failed);
            return Phase::Idle;
        }

        self.publish(ConnectionStatus::Reconnecting);
        let delay = self.backoff.next_delay();
        debug!(retry = self.retry_count, delay_ms = delay.as_millis() as u64, "Backing off");
        Phase::Wait(delay)
    }

    async fn open_link(&mut self) -> Result<Box<dyn Link>> {
        let wait = self.settings.connect_timeout;
        let mut link = timeout(wait, self.transport.connect())
            .await
            .map_err(|_| FeedError::Timeout { duration: wait })??;
        self.connection_id += 1;

        if let Some(credentials) = &self.settings.login {
            let logged_in =
                login::handshake(link.as_mut(), credentials, self.server_filter.as_deref(), wait).await;
            if let Err(e) = logged_in {
                let _ = link.close().await;
                return Err(e);
            }
        }
        Ok(link)
    }

    /// Pump one connected link until it ends.
    async fn session(&mut self, link: &mut dyn Link) -> SessionEnd {
        let idle_window = self.settings.heartbeat.idle_window();
        let probe_timeout = self.settings.heartbeat.probe_timeout();
        let mut idle_deadline = Instant::now() + idle_window;
        let mut probe_deadline: Option<Instant> = None;

        loop {
            let deadline = probe_deadline.unwrap_or(idle_deadline);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return SessionEnd::Stop,
                command = self.commands.recv() => match command {
                    Some(Command::Send { line, reply }) if reply.is_closed() => {
                        debug!(line = %line, "Dropping send abandoned by its caller");
                    }
                    Some(Command::Send { line, reply }) => {
                        let written = link.write_frame(&line).await;
                        match written {
                            Ok(()) => {
                                trace!(line = %line, "Line sent");
                                let _ = reply.send(Ok(()));
                            }
                            Err(e) => {
                                let _ = reply.send(Err(FeedError::send_failed(e.to_string())));
                                return SessionEnd::Lost(e);
                            }
                        }
                    }
                    Some(Command::ServerFilter(filter)) => {
                        self.server_filter = filter;
                        if let Some(filter) = &self.server_filter {
                            info!(filter = %filter, "Updating server filter");
                            if let Err(e) = link.write_frame(&format!("#filter {filter}")).await {
                                return SessionEnd::Lost(e);
                            }
                        }
                    }
                    Some(Command::Reconnect) => return SessionEnd::Reconnect,
                    Some(Command::Disconnect) => return SessionEnd::Disconnect,
                    None => return SessionEnd::Stop,
                },
                read = link.read_frame() => match read {
                    Ok(Some(bytes)) => {
                        idle_deadline = Instant::now() + idle_window;
                        probe_deadline = None;
                        let frame = RawFrame::from_bytes(&bytes, SystemTime::now(), self.connection_id);
                        if self.frames.send(frame).await.is_err() {
                            debug!("Frame receiver dropped, stopping");
                            return SessionEnd::Stop;
                        }
                    }
                    Ok(None) => {
                        return SessionEnd::Lost(FeedError::connection_failed("server closed the connection"));
                    }
                    Err(e) => return SessionEnd::Lost(e),
                },
                _ = sleep_until(deadline) => {
                    if probe_deadline.is_some() {
                        return SessionEnd::Lost(FeedError::Timeout { duration: idle_window + probe_timeout });
                    }
                    debug!(idle_ms = idle_window.as_millis() as u64, "Link idle, probing");
                    if let Err(e) = link.write_frame(PROBE_LINE).await {
                        return SessionEnd::Lost(e);
                    }
                    probe_deadline = Some(Instant::now() + probe_timeout);
                }
            }
        }
    }

    /// Sit out a backoff delay, still answering commands.
    async fn wait(&mut self, delay: Duration) -> Phase {
        let timer = sleep(delay);
        tokio::pin!(timer);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Phase::Stop,
                command = self.commands.recv() => {
                    if let Some(phase) = self.offline_command(command) {
                        return phase;
                    }
                }
                _ = &mut timer => return Phase::Connect,
            }
        }
    }

    /// `Disconnected` or `Failed`: wait for an explicit reconnect.
    async fn idle(&mut self) -> Phase {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Phase::Stop,
                command = self.commands.recv() => {
                    if let Some(phase) = self.offline_command(command) {
                        return phase;
                    }
                }
            }
        }
    }

    /// Handle a command while no link is up. Returns the next phase if the
    /// command changes it.
    fn offline_command(&mut self, command: Option<Command>) -> Option<Phase> {
        match command {
            Some(Command::Send { reply, .. }) => {
                let _ = reply.send(Err(FeedError::send_failed("not connected")));
                None
            }
            Some(Command::ServerFilter(filter)) => {
                self.server_filter = filter;
                None
            }
            Some(Command::Reconnect) => {
                info!("Reconnect requested");
                self.reset_retries();
                Some(Phase::Connect)
            }
            Some(Command::Disconnect) => {
                self.reset_retries();
                self.publish(ConnectionStatus::Disconnected);
                Some(Phase::Idle)
            }
            None => Some(Phase::Stop),
        }
    }
}
