use tokio::sync::oneshot;

use super::types::{Identity, SenderRole};
use crate::error::SessionError;

/// Intents the session facade forwards to the connection actor.
#[derive(Debug)]
pub enum SessionCommand {
    /// Open the transport and join the topic; `reply` resolves once the
    /// session is connected or the attempt has failed.
    Connect {
        identity: Identity,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    SendMessage {
        content: String,
        sender: String,
        role: SenderRole,
    },
    Disconnect,
}
