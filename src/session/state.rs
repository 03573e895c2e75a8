//! Chat session state and UI events

use crate::model::{is_durable_id, ConversationType, Message};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// State of one open conversation view
///
/// Owned by the session; the UI only ever sees clones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSessionState {
    /// Durable conversation ID, the "new" placeholder, or empty before load
    pub conversation_id: String,
    /// Recipient of a one-to-one conversation; empty for groups
    pub recipient_id: String,
    /// Recipient display name, denormalized for the header
    pub recipient_name: String,
    /// Signed-in user
    pub current_user_id: String,
    /// Messages sorted ascending by `sent_at`, unique by `id`
    pub messages: Vec<Message>,
    /// Pending compose buffer
    pub message_input: String,
    /// A send is in flight
    pub is_sending: bool,
    /// Conversation kind, fixed at load
    pub conversation_type: ConversationType,
    /// Sender display names (group conversations only)
    pub sender_names: HashMap<String, String>,
}

impl ChatSessionState {
    /// Check whether the session has been loaded
    pub fn is_loaded(&self) -> bool {
        !self.current_user_id.is_empty()
    }

    /// Check whether a read receipt may be sent for this state
    pub fn can_mark_read(&self) -> bool {
        !self.current_user_id.trim().is_empty() && is_durable_id(&self.conversation_id)
    }

    /// Display name for a sender, falling back to the raw ID
    pub fn sender_display_name<'a>(&'a self, sender_id: &'a str) -> &'a str {
        self.sender_names
            .get(sender_id)
            .map(String::as_str)
            .unwrap_or(sender_id)
    }
}

/// Notifications delivered to the UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The observed message list changed
    MessagesUpdated,
    /// Input was rejected before anything was sent
    ValidationFailed(String),
    /// The message store reported a failure (message verbatim)
    SendFailed(String),
    /// A message was accepted by the store
    MessageSent,
    /// The placeholder was replaced by a durable conversation ID
    ConversationResolved(String),
}
