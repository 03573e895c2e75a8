//! Conversation identity and directory summaries

use serde::{Deserialize, Serialize};

/// Identity of a conversation that exists only on the client
///
/// A placeholder is used when a user picks a recipient with no prior
/// history. It is never persisted and never gets a listener; it is replaced
/// by the durable ID once the first message has round-tripped.
pub const NEW_CONVERSATION_ID: &str = "new";

/// Conversation kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationType {
    /// Direct conversation between two users
    #[default]
    OneToOne,
    /// Class or group conversation
    Group,
}

impl ConversationType {
    /// Derive the type from the recipient chosen when a chat is opened.
    ///
    /// Group chats are opened without a single recipient.
    pub fn from_recipient(recipient_id: &str) -> Self {
        if recipient_id.is_empty() {
            Self::Group
        } else {
            Self::OneToOne
        }
    }
}

/// A conversation as seen by one viewing user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Durable ID, or [`NEW_CONVERSATION_ID`] for a placeholder
    pub id: String,
    /// Conversation kind
    pub conversation_type: ConversationType,
    /// Participant user IDs (at least two)
    pub participants: Vec<String>,
    /// Timestamp of the latest message (Unix milliseconds)
    pub last_message_at: Option<i64>,
    /// Unread messages for the viewing user
    pub unread_count: u32,
}

impl Conversation {
    /// Check whether the given user takes part in this conversation
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// The other participant of a one-to-one conversation
    pub fn counterpart(&self, user_id: &str) -> Option<&str> {
        if self.conversation_type != ConversationType::OneToOne {
            return None;
        }
        self.participants
            .iter()
            .find(|p| p.as_str() != user_id)
            .map(String::as_str)
    }
}

/// Directory entry for one conversation, from the viewing user's perspective
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Durable conversation ID
    pub conversation_id: String,
    /// The other participant of a one-to-one conversation; `None` for groups
    pub participant_user_id: Option<String>,
    /// Conversation kind
    pub conversation_type: ConversationType,
    /// Unread messages for the viewing user
    pub unread_count: u32,
    /// Content of the latest message
    pub last_message: Option<String>,
    /// Timestamp of the latest message (Unix milliseconds)
    pub last_message_at: Option<i64>,
}

/// Check whether an ID is the placeholder sentinel
pub fn is_placeholder_id(conversation_id: &str) -> bool {
    conversation_id == NEW_CONVERSATION_ID
}

/// Check whether a listener may be attached to this ID
pub fn is_durable_id(conversation_id: &str) -> bool {
    !conversation_id.trim().is_empty() && !is_placeholder_id(conversation_id)
}
