//! Public entry point used by presentation layers.
//!
//! [`ChatSession`] forwards the three user intents to the connection task and
//! exposes two observable channels: the latest message-log snapshot and the
//! latest connected flag. Both are written only by the connection task, so
//! they never disagree with the state machine.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::common::{ChatMessage, Identity, Observable, SenderRole, SessionCommand, Subscription};
use crate::config::AppConfig;
use crate::error::SessionError;
use crate::history::MessageLog;
use crate::network::StompClient;

pub struct ChatSession {
    // Unbounded so a queued `disconnect` can never be dropped.
    command_sender: mpsc::UnboundedSender<SessionCommand>,
    messages: Observable<Vec<ChatMessage>>,
    connected: Observable<bool>,
    task: JoinHandle<()>,
}

impl ChatSession {
    /// Validate the endpoint and start the connection task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: AppConfig) -> Result<Self, SessionError> {
        let url = config.websocket_url()?;
        let (command_sender, command_receiver) = mpsc::unbounded_channel();

        let history = MessageLog::new();
        let messages = history.channel();
        let connected = Observable::new(false);

        let client = StompClient::new(config, url, command_receiver, history, connected.clone());
        let task = tokio::spawn(client.run());

        Ok(Self {
            command_sender,
            messages,
            connected,
            task,
        })
    }

    /// Join the shared topic as `name`.
    ///
    /// Resolves once the topic subscription exists and the JOIN announcement
    /// has been sent. A blank name fails with
    /// [`SessionError::InvalidIdentity`] before any network activity.
    pub async fn connect(&self, name: &str, role: SenderRole) -> Result<(), SessionError> {
        let identity = Identity::new(name, role)?;
        let (reply, outcome) = oneshot::channel();

        self.command_sender
            .send(SessionCommand::Connect { identity, reply })
            .map_err(|_| SessionError::Closed)?;

        outcome.await.map_err(|_| SessionError::Closed)?
    }

    /// Fire-and-forget. Ignored unless connected, or if `content` is blank.
    pub fn send_message(&self, content: &str, sender: &str, role: SenderRole) {
        self.dispatch(SessionCommand::SendMessage {
            content: content.to_string(),
            sender: sender.to_string(),
            role,
        });
    }

    /// Leave the topic, or cancel a pending `connect`.
    pub fn disconnect(&self) {
        self.dispatch(SessionCommand::Disconnect);
    }

    /// Leave if still connected and wait until the connection task has
    /// finished, including the DISCONNECT receipt and the socket close.
    pub async fn shutdown(self) {
        let Self {
            command_sender,
            task,
            ..
        } = self;
        drop(command_sender);
        if let Err(err) = task.await {
            log::warn!("Session task ended abnormally: {err}");
        }
    }

    pub fn messages(&self) -> Subscription<Vec<ChatMessage>> {
        self.messages.subscribe()
    }

    pub fn connected(&self) -> Subscription<bool> {
        self.connected.subscribe()
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.get()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }

    fn dispatch(&self, command: SessionCommand) {
        if self.command_sender.send(command).is_err() {
            log::warn!("Session task is gone; command dropped");
        }
    }
}
