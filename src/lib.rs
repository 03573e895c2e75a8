//! Chatsync - real-time conversation synchronization engine
//!
//! This library provides the chat core of the school messaging client:
//! live message listeners per conversation, deduplicated and time-ordered
//! message folding, reconciliation of the "new" conversation placeholder
//! with the server-assigned conversation, and debounced read receipts.
//! Everything outside the engine (identity, directory, message store,
//! read receipts, user lookup) is reached through the traits in [`services`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod identity;
pub mod memory;
pub mod model;
pub mod services;
pub mod session;
pub mod settings;

pub use identity::IdentityCell;
pub use model::{
    Conversation, ConversationSummary, ConversationType, Message, User, NEW_CONVERSATION_ID,
};
pub use services::{ServiceResult, Services};
pub use session::{ChatEvent, ChatSession, ChatSessionState};
pub use settings::SyncSettings;

/// Result type alias for chatsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for chatsync operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input rejected before any collaborator was called
    #[error("Validation error: {0}")]
    Validation(String),

    /// The message store refused or failed the send
    #[error("Send failed: {0}")]
    Send(String),

    /// The current user could not be resolved
    #[error("Identity error: {0}")]
    Identity(String),

    /// Transient error reported by a live message stream
    #[error("Stream error: {0}")]
    Stream(String),

    /// Settings could not be read or written
    #[error("Settings error: {0}")]
    Settings(String),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

/// Initialize the chatsync library with logging
pub fn init() {
    tracing_subscriber::fmt::init();
}

#[cfg(test)]
mod tests;
