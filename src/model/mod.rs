//! Conversation data model
//!
//! The types the engine folds, reconciles and surfaces to the UI:
//! - `conversation` - Conversation identity, type and directory summaries
//! - `message` - Messages as delivered by the live stream
//! - `user` - User records used for display-name lookup

pub mod conversation;
pub mod message;
pub mod user;

pub use conversation::{
    is_durable_id, is_placeholder_id, Conversation, ConversationSummary, ConversationType,
    NEW_CONVERSATION_ID,
};
pub use message::Message;
pub use user::User;
