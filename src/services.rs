//! Collaborator interfaces
//!
//! The engine never talks to the document store directly. Every external
//! dependency is one of the traits below, each returning a stream the way the
//! backing store delivers results:
//! - `IdentityResolver` - the caller's user ID
//! - `ConversationDirectory` - conversation summaries for a user
//! - `MessageSource` - live message feed for one conversation
//! - `MessageSender` - compose-and-send
//! - `ReadReceiptService` - mark a conversation read
//! - `UserDirectory` - display-name lookup

use crate::{
    model::{ConversationSummary, Message, User},
    Result,
};
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of a collaborator call as emitted on its result stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceResult<T> {
    /// Request in flight
    Loading,
    /// Request completed
    Success(T),
    /// Request failed with a user-presentable message
    Error(String),
}

impl<T> ServiceResult<T> {
    /// Check whether this is an intermediate `Loading` emission
    pub fn is_loading(&self) -> bool {
        matches!(self, ServiceResult::Loading)
    }

    /// Convert a settled result into `Option`, dropping the error message
    pub fn success(self) -> Option<T> {
        match self {
            ServiceResult::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Convert into a std `Result`; `Loading` counts as a failure
    pub fn into_result(self) -> std::result::Result<T, String> {
        match self {
            ServiceResult::Success(value) => Ok(value),
            ServiceResult::Error(message) => Err(message),
            ServiceResult::Loading => Err("request still loading".to_string()),
        }
    }
}

/// Request passed to the message store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    /// Sending user
    pub sender_id: String,
    /// Recipient of a one-to-one conversation; empty for groups
    pub recipient_id: String,
    /// Message text
    pub content: String,
    /// Durable target conversation; `None` asks the store to create or find one
    pub conversation_id: Option<String>,
}

/// Supplies the current user ID
pub trait IdentityResolver: Send + Sync {
    /// Distinct-until-changed stream of the current user ID, empty until resolved
    fn current_user_id(&self) -> BoxStream<'static, String>;
}

/// Lists a user's conversations with aggregate metadata
pub trait ConversationDirectory: Send + Sync {
    /// Stream of directory snapshots for `user_id`
    fn list(&self, user_id: &str) -> BoxStream<'static, ServiceResult<Vec<ConversationSummary>>>;
}

/// Live message feed for a conversation
pub trait MessageSource: Send + Sync {
    /// At-least-once, unordered feed; `Err` items are transient
    fn stream(&self, conversation_id: &str) -> BoxStream<'static, Result<Message>>;
}

/// Accepts compose-and-send requests
pub trait MessageSender: Send + Sync {
    /// Send a message
    fn send(&self, request: SendRequest) -> BoxStream<'static, ServiceResult<()>>;
}

/// Marks conversations read
pub trait ReadReceiptService: Send + Sync {
    /// Mark every message of `conversation_id` read for `user_id`
    fn mark(&self, conversation_id: &str, user_id: &str) -> BoxStream<'static, ServiceResult<()>>;
}

/// Looks up users for display
pub trait UserDirectory: Send + Sync {
    /// Fetch a user record; `Success(None)` when unknown
    fn display_name(&self, user_id: &str) -> BoxStream<'static, ServiceResult<Option<User>>>;
}

/// The set of collaborators a chat session depends on
#[derive(Clone)]
pub struct Services {
    /// Current user
    pub identity: Arc<dyn IdentityResolver>,
    /// Conversation directory
    pub conversations: Arc<dyn ConversationDirectory>,
    /// Live message feed
    pub messages: Arc<dyn MessageSource>,
    /// Message store
    pub sender: Arc<dyn MessageSender>,
    /// Read receipts
    pub read_receipts: Arc<dyn ReadReceiptService>,
    /// User lookup
    pub users: Arc<dyn UserDirectory>,
}

/// Resolve a result stream to its first non-`Loading` emission
///
/// A stream that ends before settling yields `ServiceResult::Error`.
pub async fn first_settled<T>(
    mut stream: BoxStream<'static, ServiceResult<T>>,
) -> ServiceResult<T> {
    while let Some(item) = stream.next().await {
        if !item.is_loading() {
            return item;
        }
    }
    ServiceResult::Error("no response".to_string())
}
