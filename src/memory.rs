//! In-memory collaborator backend
//!
//! Implements every service trait on top of a process-local store that
//! behaves like the remote document database: durable conversations with
//! participants, messages with monotonically assigned timestamps, per-user
//! read marks, and live subscribers per conversation. Fault knobs let callers
//! simulate failed sends, directory propagation lag, redelivery and stream
//! errors.

use crate::{
    identity::IdentityCell,
    model::{Conversation, ConversationSummary, ConversationType, Message, User},
    services::{
        ConversationDirectory, MessageSender, MessageSource, ReadReceiptService, SendRequest,
        ServiceResult, Services, UserDirectory,
    },
    Error, Result,
};
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};
use uuid::Uuid;

type Subscriber = mpsc::UnboundedSender<Result<Message>>;

#[derive(Default)]
struct Store {
    users: HashMap<String, User>,
    conversations: Vec<Conversation>,
    messages: HashMap<String, Vec<Message>>,
    read_marks: HashMap<(String, String), i64>,
    subscribers: HashMap<String, Vec<Subscriber>>,
    hidden: HashSet<String>,
    last_sent_at: i64,
    directory_lag: bool,
    send_failure: Option<String>,
    read_receipt_failure: Option<String>,
    name_lookup_failure: Option<String>,
    send_calls: usize,
    mark_calls: Vec<(String, String)>,
    name_lookups: Vec<String>,
}

impl Store {
    fn next_timestamp(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis().max(self.last_sent_at + 1);
        self.last_sent_at = now;
        now
    }

    fn find_direct(&self, a: &str, b: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| {
            c.conversation_type == ConversationType::OneToOne
                && c.has_participant(a)
                && c.has_participant(b)
        })
    }

    fn insert_conversation(
        &mut self,
        conversation_type: ConversationType,
        participants: Vec<String>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        self.conversations.push(Conversation {
            id: id.clone(),
            conversation_type,
            participants,
            last_message_at: None,
            unread_count: 0,
        });
        if self.directory_lag {
            self.hidden.insert(id.clone());
        }
        id
    }

    fn append(&mut self, conversation_id: &str, sender_id: &str, content: &str) -> Message {
        let message = Message::new(
            Uuid::new_v4().to_string(),
            conversation_id,
            sender_id,
            content,
            self.next_timestamp(),
        );
        let conversation = self.conversations.iter_mut().find(|c| c.id == conversation_id);
        if let Some(conversation) = conversation {
            conversation.last_message_at = Some(message.sent_at);
        }
        self.messages
            .entry(conversation_id.to_string())
            .or_default()
            .push(message.clone());
        // Senders have read their own messages
        self.read_marks
            .insert((conversation_id.to_string(), sender_id.to_string()), message.sent_at);
        self.broadcast(conversation_id, Ok(message.clone()));
        message
    }

    fn broadcast(&mut self, conversation_id: &str, item: Result<Message>) {
        if let Some(subscribers) = self.subscribers.get_mut(conversation_id) {
            subscribers.retain(|tx| {
                let copy = match &item {
                    Ok(message) => Ok(message.clone()),
                    Err(e) => Err(Error::Stream(e.to_string())),
                };
                tx.send(copy).is_ok()
            });
        }
    }

    fn unread_for(&self, conversation_id: &str, user_id: &str) -> u32 {
        let mark = self
            .read_marks
            .get(&(conversation_id.to_string(), user_id.to_string()))
            .copied()
            .unwrap_or(i64::MIN);
        self.messages
            .get(conversation_id)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| m.sender_id != user_id && m.sent_at > mark)
                    .count() as u32
            })
            .unwrap_or(0)
    }

    fn summaries_for(&self, user_id: &str) -> Vec<ConversationSummary> {
        let mut summaries: Vec<ConversationSummary> = self
            .conversations
            .iter()
            .filter(|c| c.has_participant(user_id) && !self.hidden.contains(&c.id))
            .map(|c| {
                let last = self.messages.get(&c.id).and_then(|m| m.last());
                ConversationSummary {
                    conversation_id: c.id.clone(),
                    participant_user_id: c.counterpart(user_id).map(str::to_string),
                    conversation_type: c.conversation_type,
                    unread_count: self.unread_for(&c.id, user_id),
                    last_message: last.map(|m| m.content.clone()),
                    last_message_at: last.map(|m| m.sent_at),
                }
            })
            .collect();
        summaries.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        summaries
    }
}

/// Process-local implementation of every chat collaborator
///
/// # Example
/// ```rust,no_run
/// use chatsync::memory::MemoryBackend;
/// use chatsync::{ChatSession, IdentityCell, SyncSettings};
/// use std::sync::Arc;
///
/// # async fn example() -> chatsync::Result<()> {
/// let backend = Arc::new(MemoryBackend::new());
/// backend.add_user("t1", "Ms. Rivera");
/// backend.add_user("s1", "Sam");
///
/// let identity = Arc::new(IdentityCell::with_user("t1"));
/// let session = ChatSession::new(backend.services(identity), SyncSettings::default());
/// session.load("new", "s1", "Sam").await?;
/// session.send("Welcome to class!").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MemoryBackend {
    store: Mutex<Store>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Bundle this backend with an identity cell into a `Services` set
    pub fn services(self: &Arc<Self>, identity: Arc<IdentityCell>) -> Services {
        Services {
            identity,
            conversations: self.clone(),
            messages: self.clone(),
            sender: self.clone(),
            read_receipts: self.clone(),
            users: self.clone(),
        }
    }

    /// Register a user
    pub fn add_user(&self, user_id: &str, display_name: &str) {
        self.store
            .lock()
            .users
            .insert(user_id.to_string(), User::new(user_id, display_name));
    }

    /// Create a durable conversation and return its ID
    pub fn create_conversation(
        &self,
        conversation_type: ConversationType,
        participants: &[&str],
    ) -> String {
        let participants = participants.iter().map(|p| p.to_string()).collect();
        self.store.lock().insert_conversation(conversation_type, participants)
    }

    /// Store a message as if `sender_id` had sent it from another device
    pub fn post_message(&self, conversation_id: &str, sender_id: &str, content: &str) -> Message {
        self.store.lock().append(conversation_id, sender_id, content)
    }

    /// Push a message to live subscribers without storing it
    pub fn deliver_raw(&self, conversation_id: &str, message: Message) {
        self.store.lock().broadcast(conversation_id, Ok(message));
    }

    /// Push a transient error to live subscribers
    pub fn deliver_error(&self, conversation_id: &str, reason: &str) {
        self.store
            .lock()
            .broadcast(conversation_id, Err(Error::Stream(reason.to_string())));
    }

    /// Hide newly created conversations from the directory until `publish_pending`
    pub fn set_directory_lag(&self, lag: bool) {
        self.store.lock().directory_lag = lag;
    }

    /// Make every hidden conversation visible in the directory
    pub fn publish_pending(&self) {
        self.store.lock().hidden.clear();
    }

    /// Fail every send with `reason` (or stop failing with `None`)
    pub fn set_send_failure(&self, reason: Option<&str>) {
        self.store.lock().send_failure = reason.map(str::to_string);
    }

    /// Fail every read receipt with `reason` (or stop failing with `None`)
    pub fn set_read_receipt_failure(&self, reason: Option<&str>) {
        self.store.lock().read_receipt_failure = reason.map(str::to_string);
    }

    /// Fail every name lookup with `reason` (or stop failing with `None`)
    pub fn set_name_lookup_failure(&self, reason: Option<&str>) {
        self.store.lock().name_lookup_failure = reason.map(str::to_string);
    }

    /// Live subscriptions to a conversation
    pub fn active_listeners(&self, conversation_id: &str) -> usize {
        self.store
            .lock()
            .subscribers
            .get(conversation_id)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Live subscriptions across all conversations
    pub fn total_active_listeners(&self) -> usize {
        self.store
            .lock()
            .subscribers
            .values()
            .flatten()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    /// Stored messages of a conversation
    pub fn messages(&self, conversation_id: &str) -> Vec<Message> {
        self.store
            .lock()
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of conversations (including hidden ones)
    pub fn conversation_count(&self) -> usize {
        self.store.lock().conversations.len()
    }

    /// Unread messages of a conversation for a user
    pub fn unread_count(&self, conversation_id: &str, user_id: &str) -> u32 {
        self.store.lock().unread_for(conversation_id, user_id)
    }

    /// Number of send requests received
    pub fn send_calls(&self) -> usize {
        self.store.lock().send_calls
    }

    /// Read-receipt requests received, in order
    pub fn mark_calls(&self) -> Vec<(String, String)> {
        self.store.lock().mark_calls.clone()
    }

    /// Name lookups received, in order
    pub fn name_lookups(&self) -> Vec<String> {
        self.store.lock().name_lookups.clone()
    }
}

impl ConversationDirectory for MemoryBackend {
    fn list(&self, user_id: &str) -> BoxStream<'static, ServiceResult<Vec<ConversationSummary>>> {
        let summaries = self.store.lock().summaries_for(user_id);
        stream::iter(vec![ServiceResult::Loading, ServiceResult::Success(summaries)]).boxed()
    }
}

impl MessageSource for MemoryBackend {
    fn stream(&self, conversation_id: &str) -> BoxStream<'static, Result<Message>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut store = self.store.lock();
        for message in store.messages.get(conversation_id).into_iter().flatten() {
            // The receiver is alive, this cannot fail
            let _ = tx.send(Ok(message.clone()));
        }
        store
            .subscribers
            .entry(conversation_id.to_string())
            .or_default()
            .push(tx);
        debug!("New subscriber for conversation {}", conversation_id);
        UnboundedReceiverStream::new(rx).boxed()
    }
}

impl MessageSender for MemoryBackend {
    fn send(&self, request: SendRequest) -> BoxStream<'static, ServiceResult<()>> {
        let mut store = self.store.lock();
        store.send_calls += 1;

        let outcome = if let Some(reason) = store.send_failure.clone() {
            ServiceResult::Error(reason)
        } else {
            let conversation_id = match &request.conversation_id {
                Some(id) if store.conversations.iter().any(|c| &c.id == id) => Some(id.clone()),
                Some(_) => None,
                None => {
                    let existing = store
                        .find_direct(&request.sender_id, &request.recipient_id)
                        .map(|c| c.id.clone());
                    Some(existing.unwrap_or_else(|| {
                        let participants =
                            vec![request.sender_id.clone(), request.recipient_id.clone()];
                        let id =
                            store.insert_conversation(ConversationType::OneToOne, participants);
                        info!("Created conversation {} for first message", id);
                        id
                    }))
                }
            };
            match conversation_id {
                Some(id) => {
                    store.append(&id, &request.sender_id, &request.content);
                    ServiceResult::Success(())
                }
                None => ServiceResult::Error("Conversation not found".to_string()),
            }
        };

        stream::iter(vec![ServiceResult::Loading, outcome]).boxed()
    }
}

impl ReadReceiptService for MemoryBackend {
    fn mark(&self, conversation_id: &str, user_id: &str) -> BoxStream<'static, ServiceResult<()>> {
        let mut store = self.store.lock();
        store
            .mark_calls
            .push((conversation_id.to_string(), user_id.to_string()));

        let outcome = match store.read_receipt_failure.clone() {
            Some(reason) => ServiceResult::Error(reason),
            None => {
                let latest = store
                    .messages
                    .get(conversation_id)
                    .and_then(|m| m.iter().map(|m| m.sent_at).max())
                    .unwrap_or(0);
                store
                    .read_marks
                    .insert((conversation_id.to_string(), user_id.to_string()), latest);
                ServiceResult::Success(())
            }
        };
        stream::once(async move { outcome }).boxed()
    }
}

impl UserDirectory for MemoryBackend {
    fn display_name(&self, user_id: &str) -> BoxStream<'static, ServiceResult<Option<User>>> {
        let mut store = self.store.lock();
        store.name_lookups.push(user_id.to_string());

        let outcome = match store.name_lookup_failure.clone() {
            Some(reason) => ServiceResult::Error(reason),
            None => ServiceResult::Success(store.users.get(user_id).cloned()),
        };
        stream::iter(vec![ServiceResult::Loading, outcome]).boxed()
    }
}
