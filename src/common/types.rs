use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Kind of event carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Join,
    Leave,
    Chat,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Join => "JOIN",
            MessageKind::Leave => "LEAVE",
            MessageKind::Chat => "CHAT",
        }
    }
}

/// Role of a participant. Display only; never used for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderRole {
    Client,
    Support,
}

impl SenderRole {
    pub fn as_str(self) -> &'static str {
        match self {
            SenderRole::Client => "CLIENT",
            SenderRole::Support => "SUPPORT",
        }
    }
}

impl fmt::Display for SenderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a session speaks as. The name is trimmed and never blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    display_name: String,
    role: SenderRole,
}

impl Identity {
    pub fn new(display_name: &str, role: SenderRole) -> Result<Self, SessionError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(SessionError::InvalidIdentity);
        }
        Ok(Self {
            display_name: display_name.to_string(),
            role,
        })
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn role(&self) -> SenderRole {
        self.role
    }
}

/// One protocol-visible chat event.
///
/// Fields are private so that `kind` and `sender_role` cannot change once a
/// message exists; build messages with the constructors below or by decoding
/// an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    id: Option<String>,
    kind: MessageKind,
    sender: String,
    sender_role: SenderRole,
    content: String,
    timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn new(
        id: Option<String>,
        kind: MessageKind,
        sender: impl Into<String>,
        sender_role: SenderRole,
        content: impl Into<String>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            kind,
            sender: sender.into(),
            sender_role,
            content: content.into(),
            timestamp,
        }
    }

    /// Arrival announcement sent right after the topic subscription exists.
    pub fn join(identity: &Identity) -> Self {
        let name = identity.display_name();
        Self::new(
            None,
            MessageKind::Join,
            name,
            identity.role(),
            format!("{name} joined the chat as {}", identity.role()),
            None,
        )
    }

    /// Departure announcement sent before the transport is torn down.
    pub fn leave(identity: &Identity) -> Self {
        let name = identity.display_name();
        Self::new(
            None,
            MessageKind::Leave,
            name,
            identity.role(),
            format!("{name} left the chat."),
            None,
        )
    }

    pub fn chat(
        content: impl Into<String>,
        sender: impl Into<String>,
        sender_role: SenderRole,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            None,
            MessageKind::Chat,
            sender,
            sender_role,
            content,
            Some(timestamp),
        )
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn sender_role(&self) -> SenderRole {
        self.sender_role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_trims_and_rejects_blank_names() {
        let identity = Identity::new("  Alice ", SenderRole::Support).unwrap();
        assert_eq!(identity.display_name(), "Alice");
        assert_eq!(identity.role(), SenderRole::Support);

        assert!(matches!(
            Identity::new(" \t\n", SenderRole::Client),
            Err(SessionError::InvalidIdentity)
        ));
        assert!(matches!(
            Identity::new("", SenderRole::Client),
            Err(SessionError::InvalidIdentity)
        ));
    }

    #[test]
    fn announcements_mention_name_and_role() {
        let identity = Identity::new("Bob", SenderRole::Client).unwrap();

        let join = ChatMessage::join(&identity);
        assert_eq!(join.kind(), MessageKind::Join);
        assert_eq!(join.sender(), "Bob");
        assert!(join.content().contains("Bob"));
        assert!(join.content().contains("CLIENT"));
        assert!(join.timestamp().is_none());

        let leave = ChatMessage::leave(&identity);
        assert_eq!(leave.kind(), MessageKind::Leave);
        assert_eq!(leave.sender_role(), SenderRole::Client);
        assert!(leave.content().contains("Bob"));
    }
}
