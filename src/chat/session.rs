//! Chat session: outbound messages, acks, timeouts and inbound threading

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::thread::{ChatMessage, ChatThread, DeliveryStatus, MessageId};
use crate::config::ChatConfig;
use crate::connection::Outbound;
use crate::filter::{FilterPredicate, compile};
use crate::normalize::{encode_ack, encode_text, validate_text};
use crate::types::{Callsign, MessageKind, Packet, Payload};
use crate::{FeedError, Result};

/// Largest message number handed out before wrapping.
const MAX_MSG_NUMBER: u32 = 99_999;

/// Changes to chat state, for renderers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A thread was created, explicitly or by first contact
    ThreadOpened { peer: Callsign },
    /// An outbound message was recorded as pending
    MessageSent { peer: Callsign, msg_id: MessageId },
    /// An outbound message changed delivery status
    StatusChanged { peer: Callsign, msg_id: MessageId, status: DeliveryStatus },
    /// A message from a peer was appended to its thread
    MessageReceived { peer: Callsign, msg_id: Option<MessageId> },
}

#[derive(Default)]
struct ChatState {
    threads: BTreeMap<Callsign, ChatThread>,
    next_number: u32,
    /// Ack timers of pending messages, keyed by peer and message number
    timers: HashMap<(Callsign, MessageId), CancellationToken>,
}

impl ChatState {
    fn thread_mut(&mut self, peer: &Callsign, opened: &mut bool) -> &mut ChatThread {
        self.threads.entry(peer.clone()).or_insert_with(|| {
            *opened = true;
            ChatThread::new(peer.clone())
        })
    }

    /// Next message number not currently awaiting an ack.
    fn allocate_id(&mut self) -> MessageId {
        loop {
            self.next_number = if self.next_number >= MAX_MSG_NUMBER { 1 } else { self.next_number + 1 };
            let id = MessageId::new(self.next_number.to_string());
            let in_use = self.timers.keys().any(|(_, pending)| *pending == id);
            if !in_use {
                return id;
            }
        }
    }
}

struct Inner {
    operator: Callsign,
    config: ChatConfig,
    outbound: Arc<dyn Outbound>,
    /// Packets addressed to the operator, independent of the view filter
    addressed_to_operator: FilterPredicate,
    state: Mutex<ChatState>,
    events: broadcast::Sender<ChatEvent>,
    cancel: CancellationToken,
}

/// Message composition, delivery tracking and conversation threads.
///
/// Clones share the same session. Outbound messages carry a message number;
/// each waits for the peer's ack up to the configured timeout and then
/// becomes [`DeliveryStatus::TimedOut`]. Nothing is ever resent
/// automatically; see [`resend`](Self::resend).
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<Inner>,
}

impl ChatSession {
    pub fn new(
        operator: Callsign,
        config: ChatConfig,
        outbound: Arc<dyn Outbound>,
        event_capacity: usize,
    ) -> Result<Self> {
        let addressed_to_operator = compile(&format!("type=message and to=\"{operator}\""))?;
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Ok(Self {
            inner: Arc::new(Inner {
                operator,
                config,
                outbound,
                addressed_to_operator,
                state: Mutex::new(ChatState::default()),
                events,
                cancel: CancellationToken::new(),
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, ChatState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.inner.events.send(event);
    }

    pub fn operator(&self) -> &Callsign {
        &self.inner.operator
    }

    /// The full outbound line for a text message.
    fn message_line(&self, peer: &Callsign, text: &str, msg_id: &MessageId) -> Result<String> {
        let info = encode_text(peer, text, msg_id.as_str())?;
        Ok(format!("{}>{},TCPIP*:{}", self.inner.operator, self.inner.config.tocall, info))
    }

    /// Send `text` to `peer`, requesting an ack.
    ///
    /// The message is recorded as pending before it is handed to the link.
    /// If the link refuses it (e.g. while disconnected) the message is marked
    /// failed and the send error is returned.
    pub async fn send_message(&self, peer: &Callsign, text: &str) -> Result<MessageId> {
        validate_text(text)?;

        let (msg_id, opened) = {
            let mut state = self.state();
            let msg_id = state.allocate_id();
            let mut opened = false;
            state.thread_mut(peer, &mut opened).messages.push(ChatMessage::outbound(text, msg_id.clone()));
            (msg_id, opened)
        };
        if opened {
            self.emit(ChatEvent::ThreadOpened { peer: peer.clone() });
        }
        self.emit(ChatEvent::MessageSent { peer: peer.clone(), msg_id: msg_id.clone() });
        info!(peer = %peer, msg_id = %msg_id, "Sending message");

        self.transmit(peer, text, &msg_id).await?;
        Ok(msg_id)
    }

    /// Re-send a timed out or failed message under its original number.
    pub async fn resend(&self, peer: &Callsign, msg_id: &str) -> Result<()> {
        let (text, msg_id) = {
            let mut state = self.state();
            let message = state
                .threads
                .get_mut(peer)
                .and_then(|thread| thread.outbound_mut(msg_id))
                .ok_or_else(|| FeedError::UnknownMessage {
                    peer: peer.to_string(),
                    msg_id: msg_id.to_string(),
                })?;
            match message.status {
                Some(DeliveryStatus::TimedOut | DeliveryStatus::Failed) => {}
                other => {
                    return Err(FeedError::invalid_message(format!(
                        "message {msg_id} to {peer} is {}, only timed out or failed messages can be resent",
                        other.unwrap_or(DeliveryStatus::Pending)
                    )));
                }
            }
            message.status = Some(DeliveryStatus::Pending);
            message.timestamp = std::time::SystemTime::now();
            let id = message.msg_id.clone().unwrap_or_else(|| MessageId::new(msg_id));
            (message.text.clone(), id)
        };
        self.emit(ChatEvent::StatusChanged {
            peer: peer.clone(),
            msg_id: msg_id.clone(),
            status: DeliveryStatus::Pending,
        });
        info!(peer = %peer, msg_id = %msg_id, "Resending message");

        self.transmit(peer, &text, &msg_id).await
    }

    /// Hand a pending message to the link and start its ack timer.
    async fn transmit(&self, peer: &Callsign, text: &str, msg_id: &MessageId) -> Result<()> {
        let sent = match self.message_line(peer, text, msg_id) {
            Ok(line) => self.inner.outbound.send_line(line).await,
            Err(e) => Err(e),
        };

        if let Err(e) = sent {
            warn!(peer = %peer, msg_id = %msg_id, error = %e, "Message send failed");
            self.transition(peer, msg_id, &[DeliveryStatus::Pending], DeliveryStatus::Failed);
            return Err(match e {
                FeedError::Send { .. } => e,
                other => FeedError::send_failed(other.to_string()),
            });
        }

        self.start_timer(peer, msg_id);
        Ok(())
    }

    fn start_timer(&self, peer: &Callsign, msg_id: &MessageId) {
        let token = self.inner.cancel.child_token();
        {
            let mut state = self.state();
            // Only start if still pending (an ack may already have come back)
            let pending = state
                .threads
                .get(peer)
                .and_then(|t| t.outbound(msg_id.as_str()))
                .is_some_and(|m| m.status == Some(DeliveryStatus::Pending));
            if !pending {
                return;
            }
            if let Some(previous) = state.timers.insert((peer.clone(), msg_id.clone()), token.clone()) {
                previous.cancel();
            }
        }

        let session = Arc::downgrade(&self.inner);
        let timeout = self.inner.config.ack_timeout();
        let (peer, msg_id) = (peer.clone(), msg_id.clone());
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => Self::ack_timed_out(session, &peer, &msg_id),
            }
        });
    }

    fn ack_timed_out(session: Weak<Inner>, peer: &Callsign, msg_id: &MessageId) {
        let Some(inner) = session.upgrade() else { return };
        let session = ChatSession { inner };
        if session.transition(peer, msg_id, &[DeliveryStatus::Pending], DeliveryStatus::TimedOut) {
            info!(peer = %peer, msg_id = %msg_id, "No ack received, message timed out");
        }
    }

    /// Move an outbound message to `to` if its status is one of `from`.
    fn transition(
        &self,
        peer: &Callsign,
        msg_id: &MessageId,
        from: &[DeliveryStatus],
        to: DeliveryStatus,
    ) -> bool {
        let changed = {
            let mut state = self.state();
            let changed = match state.threads.get_mut(peer).and_then(|t| t.outbound_mut(msg_id.as_str())) {
                Some(message) if message.status.is_some_and(|s| from.contains(&s)) => {
                    message.status = Some(to);
                    true
                }
                _ => false,
            };
            if changed && to != DeliveryStatus::Pending {
                if let Some(timer) = state.timers.remove(&(peer.clone(), msg_id.clone())) {
                    timer.cancel();
                }
            }
            changed
        };

        if changed {
            debug!(peer = %peer, msg_id = %msg_id, status = %to, "Message status changed");
            self.emit(ChatEvent::StatusChanged { peer: peer.clone(), msg_id: msg_id.clone(), status: to });
        }
        changed
    }

    /// Feed a normalized packet to the session.
    ///
    /// Only messages addressed to the operator are considered: acks and
    /// rejects update the referenced outbound message, anything else is
    /// appended to the sender's thread (acknowledged if it carries a number).
    pub fn observe(&self, packet: &Packet) {
        if !self.inner.addressed_to_operator.matches(packet) || packet.source == self.inner.operator {
            return;
        }
        let Payload::Message { kind, text, msg_id, .. } = &packet.payload else {
            return;
        };
        let peer = &packet.source;
        let msg_id = msg_id.as_deref().map(MessageId::new);

        match (kind, msg_id) {
            (MessageKind::Ack, Some(id)) => {
                // A send reported as failed may still have reached the air
                let from = [DeliveryStatus::Pending, DeliveryStatus::TimedOut, DeliveryStatus::Failed];
                if !self.transition(peer, &id, &from, DeliveryStatus::Acked) {
                    trace!(peer = %peer, msg_id = %id, "Ack for unknown or settled message");
                }
            }
            (MessageKind::Reject, Some(id)) => {
                let from = [DeliveryStatus::Pending, DeliveryStatus::TimedOut];
                if self.transition(peer, &id, &from, DeliveryStatus::Failed) {
                    warn!(peer = %peer, msg_id = %id, "Message rejected by peer");
                }
            }
            (MessageKind::Text, msg_id) => self.receive(peer, text, msg_id, packet),
            (_, None) => trace!(peer = %peer, "Ack or reject without message number"),
        }
    }

    fn receive(&self, peer: &Callsign, text: &str, msg_id: Option<MessageId>, packet: &Packet) {
        let (opened, appended) = {
            let mut state = self.state();
            let mut opened = false;
            let thread = state.thread_mut(peer, &mut opened);
            let repeat = msg_id.as_ref().is_some_and(|id| thread.has_inbound(text, id));
            if !repeat {
                thread.messages.push(ChatMessage::inbound(text, msg_id.clone(), packet.received_at));
            }
            (opened, !repeat)
        };

        if opened {
            info!(peer = %peer, "New chat thread");
            self.emit(ChatEvent::ThreadOpened { peer: peer.clone() });
        }
        if appended {
            debug!(peer = %peer, msg_id = ?msg_id, "Message received");
            self.emit(ChatEvent::MessageReceived { peer: peer.clone(), msg_id: msg_id.clone() });
        } else {
            trace!(peer = %peer, msg_id = ?msg_id, "Retransmitted message, not appended");
        }

        if let Some(id) = msg_id.filter(|_| self.inner.config.auto_ack) {
            self.send_ack(peer, &id);
        }
    }

    /// Acknowledge an inbound message number without blocking the caller.
    fn send_ack(&self, peer: &Callsign, msg_id: &MessageId) {
        let line = format!(
            "{}>{},TCPIP*:{}",
            self.inner.operator,
            self.inner.config.tocall,
            encode_ack(peer, msg_id.as_str())
        );
        let outbound = Arc::clone(&self.inner.outbound);
        let (peer, msg_id) = (peer.clone(), msg_id.clone());
        tokio::spawn(async move {
            match outbound.send_line(line).await {
                Ok(()) => trace!(peer = %peer, msg_id = %msg_id, "Ack sent"),
                Err(e) => debug!(peer = %peer, msg_id = %msg_id, error = %e, "Ack not sent"),
            }
        });
    }

    /// Create an empty thread for `peer`. Returns `false` if it already existed.
    pub fn open_thread(&self, peer: &Callsign) -> bool {
        let mut opened = false;
        self.state().thread_mut(peer, &mut opened);
        if opened {
            self.emit(ChatEvent::ThreadOpened { peer: peer.clone() });
        }
        opened
    }

    /// Snapshot of one thread.
    pub fn thread(&self, peer: &Callsign) -> Option<ChatThread> {
        self.state().threads.get(peer).cloned()
    }

    /// Snapshot of all threads, ordered by peer callsign.
    pub fn threads(&self) -> Vec<ChatThread> {
        self.state().threads.values().cloned().collect()
    }

    /// Peers with an open thread.
    pub fn peers(&self) -> Vec<Callsign> {
        self.state().threads.keys().cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.inner.events.subscribe()
    }

    /// Stop all ack timers. Pending messages stay pending.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.state().timers.clear();
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("operator", &self.inner.operator)
            .field("threads", &self.state().threads.len())
            .finish()
    }
}
