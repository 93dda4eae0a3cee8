use std::fmt;
use std::future;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use url::Url;
use uuid::Uuid;

use crate::common::{ChatMessage, Identity, Observable, SenderRole, SessionCommand};
use crate::config::AppConfig;
use crate::error::{SessionError, TransportError};
use crate::history::MessageLog;

use super::codec;
use super::frame::{Command, Frame};
use super::transport::{StompLink, build_transport};

/// Node of the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

type Handshake = JoinHandle<Result<StompLink, TransportError>>;

struct PendingConnect {
    identity: Identity,
    reply: oneshot::Sender<Result<(), SessionError>>,
    handshake: Handshake,
}

struct ActiveSession {
    identity: Identity,
    link: StompLink,
    subscription_id: String,
    ticker: Option<Interval>,
}

enum Phase {
    Disconnected,
    Connecting(PendingConnect),
    Connected(ActiveSession),
}

enum Wakeup {
    Handshake(Result<Result<StompLink, TransportError>, JoinError>),
    Inbound(Option<Result<Frame, TransportError>>),
    Tick,
}

/// Single task that owns the transport and serialises every transition.
///
/// Commands from the facade and frames from the broker are handled one at a
/// time; the message log and the `connected` channel are only written here.
pub struct StompClient {
    config: AppConfig,
    url: Url,
    command_receiver: mpsc::UnboundedReceiver<SessionCommand>,
    history: MessageLog,
    connected: Observable<bool>,
    phase: Phase,
}

impl StompClient {
    pub fn new(
        config: AppConfig,
        url: Url,
        command_receiver: mpsc::UnboundedReceiver<SessionCommand>,
        history: MessageLog,
        connected: Observable<bool>,
    ) -> Self {
        Self {
            config,
            url,
            command_receiver,
            history,
            connected,
            phase: Phase::Disconnected,
        }
    }

    fn state(&self) -> ConnectionState {
        match self.phase {
            Phase::Disconnected => ConnectionState::Disconnected,
            Phase::Connecting(_) => ConnectionState::Connecting,
            Phase::Connected(_) => ConnectionState::Connected,
        }
    }

    pub async fn run(mut self) {
        log::info!("Session task started for {}", self.url);

        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => break,
                    }
                }
                wakeup = next_wakeup(&mut self.phase) => {
                    self.handle_wakeup(wakeup).await;
                }
            }
        }

        // Facade is gone; leave the room on the way out.
        self.disconnect().await;
        log::info!("Session task stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect { identity, reply } => self.begin_connect(identity, reply),
            SessionCommand::SendMessage {
                content,
                sender,
                role,
            } => self.send_chat(&content, sender, role).await,
            SessionCommand::Disconnect => self.disconnect().await,
        }
    }

    async fn handle_wakeup(&mut self, wakeup: Wakeup) {
        match wakeup {
            Wakeup::Handshake(outcome) => {
                let pending = match std::mem::replace(&mut self.phase, Phase::Disconnected) {
                    Phase::Connecting(pending) => pending,
                    other => {
                        self.phase = other;
                        return;
                    }
                };
                match outcome {
                    Ok(Ok(link)) => self.establish(pending, link).await,
                    Ok(Err(err)) => self.fail_connect(pending.reply, err.to_string()),
                    Err(err) => {
                        self.fail_connect(pending.reply, format!("handshake task failed: {err}"))
                    }
                }
            }
            Wakeup::Inbound(Some(Ok(frame))) => self.handle_frame(frame),
            Wakeup::Inbound(Some(Err(TransportError::Frame(err)))) => {
                log::warn!("Dropping unparseable STOMP frame: {err}");
            }
            Wakeup::Inbound(Some(Err(err))) => self.transport_lost(&err.to_string()),
            Wakeup::Inbound(None) => self.transport_lost("connection closed by broker"),
            Wakeup::Tick => self.service_heartbeat().await,
        }
    }

    fn begin_connect(
        &mut self,
        identity: Identity,
        reply: oneshot::Sender<Result<(), SessionError>>,
    ) {
        if !matches!(self.phase, Phase::Disconnected) {
            log::warn!(
                "Ignoring connect for {}: session is {}",
                identity.display_name(),
                self.state()
            );
            let _ = reply.send(Err(SessionError::AlreadyActive));
            return;
        }

        log::info!(
            "Connecting to {} as {} ({})",
            self.url,
            identity.display_name(),
            identity.role()
        );

        let url = self.url.clone();
        let heartbeat_ms = self.config.heartbeat_ms;
        let limit = self.config.connect_timeout();
        let handshake = tokio::spawn(async move {
            match tokio::time::timeout(limit, build_transport(&url, heartbeat_ms)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(limit)),
            }
        });

        self.phase = Phase::Connecting(PendingConnect {
            identity,
            reply,
            handshake,
        });
    }

    /// Subscribe, announce, and only then report the session as connected.
    async fn establish(&mut self, pending: PendingConnect, mut link: StompLink) {
        let PendingConnect {
            identity, reply, ..
        } = pending;

        let subscription_id = format!("sub-{}", Uuid::new_v4());
        let subscribe = Frame::new(Command::Subscribe)
            .with_header("id", subscription_id.as_str())
            .with_header("destination", self.config.topic.as_str())
            .with_header("ack", "auto");
        let join = envelope_frame(&self.config.join_destination, &ChatMessage::join(&identity));

        let announced = async {
            link.send(&subscribe).await?;
            link.send(&join).await
        }
        .await;

        if let Err(err) = announced {
            link.close().await;
            self.fail_connect(reply, format!("failed to join {}: {err}", self.config.topic));
            return;
        }

        let ticker = link.heartbeat().tick().map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        log::info!(
            "{} ({}) joined {}",
            identity.display_name(),
            identity.role(),
            self.config.topic
        );
        self.phase = Phase::Connected(ActiveSession {
            identity,
            link,
            subscription_id,
            ticker,
        });
        self.connected.publish(true);
        let _ = reply.send(Ok(()));
    }

    fn fail_connect(&mut self, reply: oneshot::Sender<Result<(), SessionError>>, reason: String) {
        log::warn!("Connection to {} failed: {reason}", self.url);
        self.connected.publish(false);
        let _ = reply.send(Err(SessionError::ConnectionFailed(reason)));
    }

    async fn send_chat(&mut self, content: &str, sender: String, role: SenderRole) {
        let state = self.state();
        let Phase::Connected(active) = &mut self.phase else {
            log::debug!("Ignoring message while {state}");
            return;
        };

        let content = content.trim();
        if content.is_empty() {
            log::debug!("Ignoring blank message from {sender}");
            return;
        }

        let message = ChatMessage::chat(content, sender, role, Utc::now());
        let frame = envelope_frame(&self.config.send_destination, &message);
        let sent = active.link.send(&frame).await;
        if let Err(err) = sent {
            self.transport_lost(&format!("failed to send message: {err}"));
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        match frame.command {
            Command::Message => {
                if let Phase::Connected(active) = &self.phase {
                    if !is_for_subscription(&frame, &active.subscription_id) {
                        log::debug!("Ignoring MESSAGE for another subscription");
                        return;
                    }
                }
                ingest(&mut self.history, &frame);
            }
            Command::Receipt => {
                log::debug!("Receipt {}", frame.header("receipt-id").unwrap_or("?"));
            }
            Command::Error => {
                let reason = frame.header("message").unwrap_or(frame.body.as_str());
                self.transport_lost(&format!("broker error: {reason}"));
            }
            other => log::debug!("Ignoring unexpected {other} frame"),
        }
    }

    async fn service_heartbeat(&mut self) {
        let Phase::Connected(active) = &mut self.phase else {
            return;
        };
        let heartbeat = active.link.heartbeat();

        let silent = heartbeat
            .incoming
            .is_some_and(|expected| active.link.idle_for() > expected * 2);
        if silent {
            self.transport_lost("broker heart-beats stopped");
            return;
        }

        if heartbeat.outgoing.is_some() {
            let sent = active.link.send_heartbeat().await;
            if let Err(err) = sent {
                self.transport_lost(&format!("failed to send heart-beat: {err}"));
            }
        }
    }

    /// Abrupt end of a connected session: no LEAVE is attempted.
    fn transport_lost(&mut self, reason: &str) {
        if let Phase::Connected(active) = std::mem::replace(&mut self.phase, Phase::Disconnected) {
            log::warn!(
                "Lost connection for {}: {reason}",
                active.identity.display_name()
            );
        }
        self.connected.publish(false);
        self.apply_history_policy();
    }

    async fn disconnect(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Disconnected) {
            Phase::Disconnected => log::debug!("Disconnect requested while already disconnected"),
            Phase::Connecting(pending) => {
                pending.handshake.abort();
                log::info!(
                    "Connection attempt for {} cancelled",
                    pending.identity.display_name()
                );
                self.connected.publish(false);
                let _ = pending.reply.send(Err(SessionError::Cancelled));
            }
            Phase::Connected(active) => self.leave(active).await,
        }
    }

    /// LEAVE, then DISCONNECT with a receipt, then close once the broker has
    /// acknowledged (or the wait times out).
    async fn leave(&mut self, active: ActiveSession) {
        let ActiveSession {
            identity,
            mut link,
            subscription_id,
            ..
        } = active;

        let leave = envelope_frame(&self.config.join_destination, &ChatMessage::leave(&identity));
        if let Err(err) = link.send(&leave).await {
            log::warn!("Could not announce departure of {}: {err}", identity.display_name());
            self.connected.publish(false);
            self.apply_history_policy();
            return;
        }
        self.connected.publish(false);

        let receipt = format!("disconnect-{}", Uuid::new_v4());
        let disconnect = Frame::new(Command::Disconnect).with_header("receipt", receipt.as_str());
        match link.send(&disconnect).await {
            Ok(()) => {
                let limit = self.config.leave_timeout();
                let history = &mut self.history;
                let acknowledged = tokio::time::timeout(limit, async {
                    while let Some(next) = link.next_frame().await {
                        match next {
                            Ok(frame)
                                if frame.command == Command::Receipt
                                    && frame.header("receipt-id") == Some(receipt.as_str()) =>
                            {
                                return true;
                            }
                            Ok(frame)
                                if frame.command == Command::Message
                                    && is_for_subscription(&frame, &subscription_id) =>
                            {
                                ingest(history, &frame);
                            }
                            Ok(_) => {}
                            Err(TransportError::Frame(err)) => {
                                log::warn!("Dropping unparseable STOMP frame: {err}");
                            }
                            Err(err) => {
                                log::debug!("Transport ended while awaiting receipt: {err}");
                                return false;
                            }
                        }
                    }
                    false
                })
                .await;

                match acknowledged {
                    Ok(true) => log::debug!("Broker acknowledged disconnect"),
                    Ok(false) => log::warn!("Connection ended before the disconnect receipt"),
                    Err(_) => log::warn!("No disconnect receipt within {limit:?}"),
                }
            }
            Err(err) => log::warn!("Could not send DISCONNECT: {err}"),
        }

        link.close().await;
        log::info!("{} left {}", identity.display_name(), self.config.topic);
        self.apply_history_policy();
    }

    fn apply_history_policy(&mut self) {
        if self.config.clear_history_on_disconnect {
            self.history.clear();
        }
    }
}

async fn next_wakeup(phase: &mut Phase) -> Wakeup {
    match phase {
        Phase::Disconnected => future::pending().await,
        Phase::Connecting(pending) => Wakeup::Handshake((&mut pending.handshake).await),
        Phase::Connected(active) => {
            let ActiveSession { link, ticker, .. } = active;
            tokio::select! {
                inbound = link.next_frame() => Wakeup::Inbound(inbound),
                _ = tick(ticker) => Wakeup::Tick,
            }
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending().await,
    }
}

fn envelope_frame(destination: &str, message: &ChatMessage) -> Frame {
    Frame::new(Command::Send)
        .with_header("destination", destination)
        .with_header("content-type", "application/json")
        .with_body(codec::encode(message))
}

// Brokers that omit the header get the benefit of the doubt.
fn is_for_subscription(frame: &Frame, subscription_id: &str) -> bool {
    frame
        .header("subscription")
        .is_none_or(|id| id == subscription_id)
}

fn ingest(history: &mut MessageLog, frame: &Frame) {
    match codec::decode(frame.body.as_bytes()) {
        Ok(message) => history.append(message),
        Err(err) => log::warn!(
            "Dropping inbound frame from {}: {err}",
            frame.header("destination").unwrap_or("unknown destination")
        ),
    }
}
