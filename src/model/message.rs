//! Message structures

use serde::{Deserialize, Serialize};

/// A message belonging to a durable conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Globally unique message ID, assigned by the message store
    pub id: String,
    /// Durable conversation this message belongs to
    pub conversation_id: String,
    /// Sender user ID
    pub sender_id: String,
    /// Message text (never blank)
    pub content: String,
    /// Server timestamp (Unix milliseconds)
    pub sent_at: i64,
}

impl Message {
    /// Create a new message
    pub fn new(
        id: impl Into<String>,
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
        sent_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            sent_at,
        }
    }
}
