//! Shared test helpers for session tests

use crate::memory::MemoryBackend;
use crate::{ChatEvent, ChatSession, IdentityCell, Message, SyncSettings};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A session wired to a fresh in-memory backend
pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub identity: Arc<IdentityCell>,
    pub session: ChatSession,
    events: Arc<Mutex<Vec<ChatEvent>>>,
}

impl Harness {
    /// Events received so far, in order
    pub fn events(&self) -> Vec<ChatEvent> {
        self.events.lock().clone()
    }

    /// Events other than `MessagesUpdated`
    pub fn notices(&self) -> Vec<ChatEvent> {
        self.events()
            .into_iter()
            .filter(|e| *e != ChatEvent::MessagesUpdated)
            .collect()
    }

    /// IDs of the observed message list
    pub fn message_ids(&self) -> Vec<String> {
        self.session.messages().into_iter().map(|m| m.id).collect()
    }
}

/// Timings used by the tests (virtual time, so only their ratios matter)
pub fn test_settings() -> SyncSettings {
    SyncSettings {
        read_receipt_debounce_ms: 500,
        reconcile_delay_ms: 200,
        reconcile_attempts: 1,
        refresh_delay_ms: 100,
    }
}

/// Harness signed in as `user_id`, with users u1, u2 and u3 registered
pub fn create_harness(user_id: &str) -> Harness {
    create_harness_with_settings(user_id, test_settings())
}

/// Harness with custom settings
pub fn create_harness_with_settings(user_id: &str, settings: SyncSettings) -> Harness {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_user("u1", "Ada");
    backend.add_user("u2", "Bea");
    backend.add_user("u3", "Cal");

    let identity = Arc::new(IdentityCell::with_user(user_id));
    let session = ChatSession::new(backend.services(identity.clone()), settings);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    session.set_event_handler(move |event| sink.lock().push(event));

    Harness {
        backend,
        identity,
        session,
        events,
    }
}

/// Let background tasks run for `ms` of (virtual) time
pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Build a message for raw delivery
pub fn msg(id: &str, conversation_id: &str, sender_id: &str, sent_at: i64) -> Message {
    Message::new(id, conversation_id, sender_id, format!("content of {}", id), sent_at)
}
