use crate::common::{ChatMessage, Observable};

/// Receipt-ordered chat history for one session.
///
/// Every change publishes exactly one full snapshot on [`MessageLog::channel`].
/// Messages are never deduplicated or reordered.
pub struct MessageLog {
    messages: Vec<ChatMessage>,
    channel: Observable<Vec<ChatMessage>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            channel: Observable::new(Vec::new()),
        }
    }

    /// Handle readers subscribe to; it outlives moves of the log itself.
    pub fn channel(&self) -> Observable<Vec<ChatMessage>> {
        self.channel.clone()
    }

    pub fn append(&mut self, message: ChatMessage) {
        log::debug!(
            "Appending {} from {} ({} in history)",
            message.kind().as_str(),
            message.sender(),
            self.messages.len() + 1
        );
        self.messages.push(message);
        self.channel.publish(self.messages.clone());
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.channel.publish(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::common::SenderRole;

    fn chat(content: &str, second: u32) -> ChatMessage {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, second).unwrap();
        ChatMessage::chat(content, "Alice", SenderRole::Client, at)
    }

    #[test]
    fn snapshot_keeps_call_order_not_timestamp_order() {
        let mut log = MessageLog::new();
        let late = chat("late", 50);
        let early = chat("early", 5);
        log.append(late.clone());
        log.append(early.clone());

        assert_eq!(log.snapshot(), vec![late, early]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn identical_messages_are_both_kept() {
        let mut log = MessageLog::new();
        log.append(chat("same", 1));
        log.append(chat("same", 1));

        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0], snapshot[1]);
    }

    #[test]
    fn each_change_publishes_one_full_snapshot() {
        let mut log = MessageLog::new();
        let mut updates = log.channel().subscribe();
        assert_eq!(updates.try_recv(), Some(Vec::new()));

        log.append(chat("one", 1));
        log.append(chat("two", 2));
        log.clear();

        let first = updates.try_recv().unwrap();
        assert_eq!(first.len(), 1);
        let second = updates.try_recv().unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].content(), "one");
        assert_eq!(second[1].content(), "two");
        assert_eq!(updates.try_recv(), Some(Vec::new()));
        assert_eq!(updates.try_recv(), None);
        assert!(log.is_empty());
    }
}
