//! Live message listener
//!
//! A listener owns the subscription to one conversation's message feed.
//! Incoming messages are folded into the session list with
//! [`fold_message`]: duplicates are dropped and the list stays sorted by
//! `sent_at` whatever order the feed delivers in.

use crate::model::Message;
use tokio::task::JoinHandle;

/// Merge a delivered message into an ordered, deduplicated list
///
/// Returns `false` (and leaves the list untouched) when a message with the
/// same ID is already present.
pub fn fold_message(messages: &mut Vec<Message>, message: Message) -> bool {
    if messages.iter().any(|m| m.id == message.id) {
        return false;
    }
    // Insert after every entry with the same timestamp so ties keep arrival order
    let position = messages.partition_point(|m| m.sent_at <= message.sent_at);
    messages.insert(position, message);
    true
}

/// Handle to a running listener task, bound to one conversation
///
/// Dropping the handle cancels the subscription.
#[derive(Debug)]
pub struct ListenerHandle {
    conversation_id: String,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Wrap a spawned listener task
    pub fn new(conversation_id: String, task: JoinHandle<()>) -> Self {
        Self {
            conversation_id,
            task,
        }
    }

    /// Conversation this listener is subscribed to
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Check whether the listener task is still running
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Tear down the subscription
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, sent_at: i64) -> Message {
        Message::new(id, "c1", "u1", "hello", sent_at)
    }

    #[test]
    fn test_fold_rejects_duplicate_id() {
        let mut messages = Vec::new();
        assert!(fold_message(&mut messages, msg("m1", 10)));
        assert!(!fold_message(&mut messages, msg("m1", 10)));
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_fold_sorts_out_of_order_delivery() {
        let mut messages = Vec::new();
        fold_message(&mut messages, msg("m2", 20));
        fold_message(&mut messages, msg("m1", 10));
        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[test]
    fn test_fold_equal_timestamps_keep_arrival_order() {
        let mut messages = Vec::new();
        fold_message(&mut messages, msg("a", 5));
        fold_message(&mut messages, msg("b", 5));
        fold_message(&mut messages, msg("c", 1));
        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
