//! Conversation synchronization engine
//!
//! A [`ChatSession`] backs one open conversation view. It owns:
//! - at most one live message listener (`listener`)
//! - at most one pending read-receipt timer (`debounce`)
//! - at most one pending post-send refresh or reconciliation (`reconcile`)
//!
//! All of them are cancelled when the session switches conversation, is
//! closed, or is dropped.

pub mod debounce;
pub mod listener;
pub mod reconcile;
pub mod state;

pub use debounce::Debouncer;
pub use listener::{fold_message, ListenerHandle};
pub use state::{ChatEvent, ChatSessionState};

use crate::{
    identity::wait_for_user_id,
    model::{is_durable_id, is_placeholder_id, ConversationType, Message},
    services::{first_settled, SendRequest, ServiceResult, Services},
    settings::SyncSettings,
    Error, Result,
};
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Callback type for session notifications
pub type EventHandler = Arc<dyn Fn(ChatEvent) + Send + Sync>;

/// Real-time synchronization engine for one conversation view
///
/// Every method that starts background work must be called from within a
/// Tokio runtime.
///
/// # Example
/// ```rust,no_run
/// use chatsync::{ChatSession, Services, SyncSettings};
///
/// # async fn example(services: Services) -> chatsync::Result<()> {
/// let session = ChatSession::new(services, SyncSettings::default());
/// session.set_event_handler(|event| println!("{:?}", event));
///
/// // Open a chat with a user we have never talked to
/// session.load("new", "student_7", "Sam").await?;
/// session.send("Hi Sam, your homework is due Friday").await?;
///
/// // Later, once the first message has round-tripped
/// println!("Now bound to {}", session.conversation_id());
/// # Ok(())
/// # }
/// ```
pub struct ChatSession {
    inner: Arc<Inner>,
}

struct Inner {
    services: Services,
    settings: SyncSettings,
    state: Mutex<ChatSessionState>,
    /// Bumped whenever the session is torn down; background work started
    /// under an older epoch must not touch the state
    epoch: AtomicU64,
    listener: Mutex<Option<ListenerHandle>>,
    read_receipts: Debouncer,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    reconcile_task: Mutex<Option<JoinHandle<()>>>,
    name_lookups: Mutex<HashSet<String>>,
    event_handler: Mutex<Option<EventHandler>>,
}

impl ChatSession {
    /// Create an empty session
    pub fn new(services: Services, settings: SyncSettings) -> Self {
        let read_receipts = Debouncer::new(settings.read_receipt_debounce());
        Self {
            inner: Arc::new(Inner {
                services,
                settings,
                state: Mutex::new(ChatSessionState::default()),
                epoch: AtomicU64::new(0),
                listener: Mutex::new(None),
                read_receipts,
                refresh_task: Mutex::new(None),
                reconcile_task: Mutex::new(None),
                name_lookups: Mutex::new(HashSet::new()),
                event_handler: Mutex::new(None),
            }),
        }
    }

    /// Set the notification callback
    ///
    /// The handler is invoked from whichever task produced the event and
    /// must not block.
    pub fn set_event_handler<F>(&self, handler: F)
    where
        F: Fn(ChatEvent) + Send + Sync + 'static,
    {
        *self.inner.event_handler.lock() = Some(Arc::new(handler));
    }

    /// Snapshot of the session state
    pub fn state(&self) -> ChatSessionState {
        self.inner.state.lock().clone()
    }

    /// Snapshot of the observed message list
    pub fn messages(&self) -> Vec<Message> {
        self.inner.state.lock().messages.clone()
    }

    /// Currently bound conversation ID
    pub fn conversation_id(&self) -> String {
        self.inner.state.lock().conversation_id.clone()
    }

    /// Conversation the live listener is subscribed to, if any
    pub fn active_listener(&self) -> Option<String> {
        self.inner
            .listener
            .lock()
            .as_ref()
            .filter(|handle| handle.is_active())
            .map(|handle| handle.conversation_id().to_string())
    }

    /// Display name for a sender, falling back to the raw ID
    pub fn sender_display_name(&self, sender_id: &str) -> String {
        self.inner
            .state
            .lock()
            .sender_display_name(sender_id)
            .to_string()
    }

    /// Open a conversation
    ///
    /// Waits for the signed-in user, derives the conversation type from
    /// `recipient_id` (empty means group), and for a durable ID attaches the
    /// live listener and schedules a read receipt. The "new" placeholder only
    /// gets a listener after its first message has been sent.
    pub async fn load(
        &self,
        conversation_id: &str,
        recipient_id: &str,
        recipient_name: &str,
    ) -> Result<()> {
        if conversation_id.trim().is_empty() {
            return Err(Error::Validation("Conversation ID is required".to_string()));
        }

        let user_id = wait_for_user_id(self.inner.services.identity.as_ref())
            .await
            .ok_or_else(|| Error::Identity("Identity stream ended before sign-in".to_string()))?;

        let switching = {
            let state = self.inner.state.lock();
            state.conversation_id != conversation_id || state.recipient_id != recipient_id
        };
        if switching {
            self.inner.teardown();
        }

        {
            let mut state = self.inner.state.lock();
            state.conversation_id = conversation_id.to_string();
            state.recipient_id = recipient_id.to_string();
            state.recipient_name = recipient_name.to_string();
            state.current_user_id = user_id;
            state.conversation_type = ConversationType::from_recipient(recipient_id);
        }

        info!(
            "Loaded conversation {} ({:?})",
            conversation_id,
            ConversationType::from_recipient(recipient_id)
        );

        if !is_placeholder_id(conversation_id) {
            self.inner.start_listener(conversation_id)?;
            self.inner.schedule_mark_as_read(self.inner.current_epoch());
        }

        Ok(())
    }

    /// Attach the live listener to `conversation_id`
    ///
    /// Any previous listener is cancelled first. Re-attaching to the same
    /// conversation keeps the current message list; attaching to another one
    /// clears it. The placeholder ID is rejected.
    pub fn start_listener(&self, conversation_id: &str) -> Result<()> {
        self.inner.start_listener(conversation_id)
    }

    /// Replace the compose buffer
    pub fn set_message_input(&self, text: impl Into<String>) {
        self.inner.state.lock().message_input = text.into();
    }

    /// Send the compose buffer
    pub async fn send_input(&self) -> Result<()> {
        let content = self.inner.state.lock().message_input.clone();
        self.send(&content).await
    }

    /// Send a message in the current conversation
    ///
    /// Blank content, an unloaded session, or a placeholder without a
    /// recipient are rejected before the store is called. A store failure is
    /// reported verbatim and never retried. On success the compose buffer is
    /// cleared and either the placeholder is reconciled with its durable
    /// conversation or the listener is refreshed.
    pub async fn send(&self, content: &str) -> Result<()> {
        self.inner.send(content).await
    }

    /// Schedule a debounced read receipt for the current conversation
    pub fn mark_as_read(&self) {
        self.inner.schedule_mark_as_read(self.inner.current_epoch());
    }

    /// Check whether a read receipt is waiting to be sent
    pub fn has_pending_read_receipt(&self) -> bool {
        self.inner.read_receipts.is_pending()
    }

    /// Close the view: cancel all background work and reset the state
    pub fn close(&self) {
        info!("Closing conversation {}", self.conversation_id());
        self.inner.teardown();
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl Inner {
    fn emit(&self, event: ChatEvent) {
        let handler = self.event_handler.lock().clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn reject(&self, reason: &str) -> Error {
        debug!("Rejected input: {}", reason);
        self.emit(ChatEvent::ValidationFailed(reason.to_string()));
        Error::Validation(reason.to_string())
    }

    fn teardown(&self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.cancel();
        }
        self.read_receipts.cancel();
        if let Some(task) = self.refresh_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.reconcile_task.lock().take() {
            task.abort();
        }
        self.name_lookups.lock().clear();

        let mut state = self.state.lock();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *state = ChatSessionState::default();
    }

    fn start_listener(self: &Arc<Self>, conversation_id: &str) -> Result<()> {
        if !is_durable_id(conversation_id) {
            return Err(Error::Validation(format!(
                "Cannot listen to conversation '{}'",
                conversation_id
            )));
        }

        let mut slot = self.listener.lock();
        let previous = slot.take();
        let same_conversation = previous
            .as_ref()
            .is_some_and(|handle| handle.conversation_id() == conversation_id);
        if let Some(handle) = previous {
            handle.cancel();
        }
        {
            let mut state = self.state.lock();
            state.conversation_id = conversation_id.to_string();
            if !same_conversation {
                state.messages.clear();
            }
        }

        let stream = self.services.messages.stream(conversation_id);
        let inner = Arc::clone(self);
        let id = conversation_id.to_string();
        let task = tokio::spawn(async move { inner.run_listener(id, stream).await });
        *slot = Some(ListenerHandle::new(conversation_id.to_string(), task));

        debug!(
            "Listening to conversation {} (refresh: {})",
            conversation_id, same_conversation
        );
        Ok(())
    }

    async fn run_listener(
        self: Arc<Self>,
        conversation_id: String,
        mut stream: BoxStream<'static, Result<Message>>,
    ) {
        while let Some(item) = stream.next().await {
            match item {
                Ok(message) => self.on_message(&conversation_id, message),
                Err(e) => warn!("Message stream for {} reported: {}", conversation_id, e),
            }
        }
        debug!("Message stream for {} ended", conversation_id);
    }

    fn on_message(self: &Arc<Self>, conversation_id: &str, message: Message) {
        let (epoch, lookup) = {
            let mut state = self.state.lock();
            if state.conversation_id != conversation_id {
                return;
            }
            let sender_id = message.sender_id.clone();
            if !fold_message(&mut state.messages, message) {
                return;
            }
            let needs_name = state.conversation_type == ConversationType::Group
                && !state.sender_names.contains_key(&sender_id);
            // Teardown bumps the epoch under this lock
            (self.current_epoch(), needs_name.then_some(sender_id))
        };

        if let Some(sender_id) = lookup {
            self.lookup_sender_name(sender_id, epoch);
        }
        self.emit(ChatEvent::MessagesUpdated);
        self.schedule_mark_as_read(epoch);
    }

    fn lookup_sender_name(self: &Arc<Self>, sender_id: String, epoch: u64) {
        if self.current_epoch() != epoch || !self.name_lookups.lock().insert(sender_id.clone()) {
            return;
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let result = first_settled(inner.services.users.display_name(&sender_id)).await;
            inner.name_lookups.lock().remove(&sender_id);

            match result.into_result() {
                Ok(Some(user)) => {
                    {
                        let mut state = inner.state.lock();
                        if inner.current_epoch() != epoch {
                            return;
                        }
                        state.sender_names.insert(sender_id, user.display_name);
                    }
                    inner.emit(ChatEvent::MessagesUpdated);
                }
                Ok(None) => debug!("No user record for sender {}", sender_id),
                Err(e) => warn!("Name lookup for {} failed: {}", sender_id, e),
            }
        });
    }

    /// Arm the read-receipt timer on behalf of the session generation `epoch`
    fn schedule_mark_as_read(self: &Arc<Self>, epoch: u64) {
        // Holding the state lock keeps teardown from bumping the epoch in between
        let _state = self.state.lock();
        if self.current_epoch() != epoch {
            return;
        }
        let inner = Arc::clone(self);
        self.read_receipts
            .schedule(async move { inner.fire_read_receipt(epoch).await });
    }

    async fn fire_read_receipt(&self, epoch: u64) {
        let (conversation_id, user_id) = {
            let state = self.state.lock();
            if self.current_epoch() != epoch {
                debug!("Dropping read receipt armed by a closed session");
                return;
            }
            if !state.can_mark_read() {
                debug!("Skipping read receipt for '{}'", state.conversation_id);
                return;
            }
            (state.conversation_id.clone(), state.current_user_id.clone())
        };

        let request = self.services.read_receipts.mark(&conversation_id, &user_id);
        let result = first_settled(request).await;
        match result.into_result() {
            Ok(()) => debug!("Marked conversation {} read", conversation_id),
            Err(e) => warn!("Failed to mark conversation {} read: {}", conversation_id, e),
        }
    }

    async fn send(self: &Arc<Self>, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(self.reject("Message cannot be empty"));
        }

        let prepared = {
            let mut state = self.state.lock();
            let placeholder = is_placeholder_id(&state.conversation_id);
            if !state.is_loaded() {
                Err("Conversation is not loaded")
            } else if placeholder && state.recipient_id.is_empty() {
                Err("Choose a recipient before sending")
            } else {
                state.is_sending = true;
                Ok(SendRequest {
                    sender_id: state.current_user_id.clone(),
                    recipient_id: state.recipient_id.clone(),
                    content: content.to_string(),
                    conversation_id: (!placeholder).then(|| state.conversation_id.clone()),
                })
            }
        };
        let request = prepared.map_err(|reason| self.reject(reason))?;
        let epoch = self.current_epoch();

        let result = first_settled(self.services.sender.send(request.clone())).await;

        let still_current = {
            let mut state = self.state.lock();
            let current = self.current_epoch() == epoch;
            if current {
                state.is_sending = false;
                if matches!(result, ServiceResult::Success(())) {
                    state.message_input.clear();
                }
            }
            current
        };

        match result.into_result() {
            Ok(()) => {
                info!("Message sent by {}", request.sender_id);
                self.emit(ChatEvent::MessageSent);
                if !still_current {
                    debug!("Session changed while sending; skipping follow-up");
                    return Ok(());
                }
                match request.conversation_id {
                    None => self.schedule_reconcile(epoch, request.sender_id, request.recipient_id),
                    Some(conversation_id) => self.schedule_refresh(epoch, conversation_id),
                }
                Ok(())
            }
            Err(message) => {
                warn!("Send failed: {}", message);
                self.emit(ChatEvent::SendFailed(message.clone()));
                Err(Error::Send(message))
            }
        }
    }

    fn schedule_refresh(self: &Arc<Self>, epoch: u64, conversation_id: String) {
        let inner = Arc::clone(self);
        let delay = self.settings.refresh_delay();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let current = {
                let state = inner.state.lock();
                inner.current_epoch() == epoch && state.conversation_id == conversation_id
            };
            if !current {
                return;
            }
            if let Err(e) = inner.start_listener(&conversation_id) {
                warn!("Listener refresh for {} failed: {}", conversation_id, e);
            }
        });
        if let Some(previous) = self.refresh_task.lock().replace(task) {
            previous.abort();
        }
    }

    fn schedule_reconcile(self: &Arc<Self>, epoch: u64, user_id: String, recipient_id: String) {
        let inner = Arc::clone(self);
        let task = tokio::spawn(async move { inner.reconcile(epoch, user_id, recipient_id).await });
        if let Some(previous) = self.reconcile_task.lock().replace(task) {
            previous.abort();
        }
    }

    async fn reconcile(self: Arc<Self>, epoch: u64, user_id: String, recipient_id: String) {
        let attempts = self.settings.reconcile_attempts.max(1);
        for attempt in 0..attempts {
            tokio::time::sleep(self.settings.reconcile_delay(attempt)).await;
            if !self.awaiting_reconcile(epoch, &recipient_id) {
                debug!("Conversation with {} already resolved", recipient_id);
                return;
            }
            let found = reconcile::resolve_conversation_id(
                self.services.conversations.as_ref(),
                &user_id,
                &recipient_id,
            )
            .await;
            if let Some(conversation_id) = found {
                self.rebind(epoch, &recipient_id, conversation_id);
                return;
            }
        }
        info!(
            "Conversation with {} not in directory yet; keeping placeholder",
            recipient_id
        );
    }

    fn awaiting_reconcile(&self, epoch: u64, recipient_id: &str) -> bool {
        let state = self.state.lock();
        self.current_epoch() == epoch
            && is_placeholder_id(&state.conversation_id)
            && state.recipient_id == recipient_id
    }

    fn rebind(self: &Arc<Self>, epoch: u64, recipient_id: &str, conversation_id: String) {
        {
            let mut state = self.state.lock();
            if self.current_epoch() != epoch
                || !is_placeholder_id(&state.conversation_id)
                || state.recipient_id != recipient_id
            {
                return;
            }
            state.conversation_id = conversation_id.clone();
        }

        info!("Resolved new conversation with {} to {}", recipient_id, conversation_id);
        if let Err(e) = self.start_listener(&conversation_id) {
            warn!("Could not attach listener to {}: {}", conversation_id, e);
            return;
        }
        self.emit(ChatEvent::ConversationResolved(conversation_id));
    }
}
