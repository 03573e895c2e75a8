use super::helpers::{create_harness, create_harness_with_settings, settle, test_settings};
use crate::model::{ConversationSummary, ConversationType};
use crate::services::{ConversationDirectory, ServiceResult};
use crate::{ChatEvent, ChatSession, Error, SyncSettings, NEW_CONVERSATION_ID};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

/// Directory that always answers with one fixed conversation
struct StaticDirectory {
    summary: ConversationSummary,
}

impl ConversationDirectory for StaticDirectory {
    fn list(&self, _user_id: &str) -> BoxStream<'static, ServiceResult<Vec<ConversationSummary>>> {
        let snapshot = vec![self.summary.clone()];
        stream::iter(vec![ServiceResult::Loading, ServiceResult::Success(snapshot)]).boxed()
    }
}

/// Directory that only ever fails
struct BrokenDirectory;

impl ConversationDirectory for BrokenDirectory {
    fn list(&self, _user_id: &str) -> BoxStream<'static, ServiceResult<Vec<ConversationSummary>>> {
        stream::iter(vec![ServiceResult::Error("permission denied".to_string())]).boxed()
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_message_resolves_placeholder_to_directory_id() {
    let h = create_harness("u1");
    let directory = Arc::new(StaticDirectory {
        summary: ConversationSummary {
            conversation_id: "c1".to_string(),
            participant_user_id: Some("u2".to_string()),
            conversation_type: ConversationType::OneToOne,
            unread_count: 0,
            last_message: Some("hi".to_string()),
            last_message_at: None,
        },
    });
    let services = crate::Services {
        conversations: directory,
        ..h.backend.services(h.identity.clone())
    };
    let session = ChatSession::new(services, test_settings());

    session.load(NEW_CONVERSATION_ID, "u2", "Bea").await.expect("load failed");
    assert_eq!(session.active_listener(), None);

    assert_ok!(session.send("hi").await);
    assert_eq!(session.conversation_id(), NEW_CONVERSATION_ID);

    settle(300).await;

    assert_eq!(session.conversation_id(), "c1");
    assert_eq!(session.active_listener(), Some("c1".to_string()));
    assert_eq!(h.backend.active_listeners("c1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_first_message_round_trip_with_backend() {
    let h = create_harness("u1");
    h.session.load(NEW_CONVERSATION_ID, "u2", "Bea").await.expect("load failed");
    h.session.set_message_input("hi");

    assert_ok!(h.session.send_input().await);
    assert_eq!(h.session.state().message_input, "");
    assert!(!h.session.state().is_sending);

    settle(300).await;

    let conversation_id = h.session.conversation_id();
    assert_ne!(conversation_id, NEW_CONVERSATION_ID);
    assert_eq!(h.backend.conversation_count(), 1);
    assert_eq!(h.backend.active_listeners(&conversation_id), 1);

    let contents: Vec<_> = h.session.messages().into_iter().map(|m| m.content).collect();
    assert_eq!(contents, vec!["hi"]);
    assert_eq!(
        h.notices(),
        vec![
            ChatEvent::MessageSent,
            ChatEvent::ConversationResolved(conversation_id)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_second_send_before_reconcile_resolves_once() {
    let h = create_harness("u1");
    h.session.load(NEW_CONVERSATION_ID, "u2", "Bea").await.expect("load failed");

    assert_ok!(h.session.send("hi").await);
    settle(50).await;
    assert_ok!(h.session.send("are you there?").await);

    settle(500).await;

    let resolved = h
        .events()
        .into_iter()
        .filter(|e| matches!(e, ChatEvent::ConversationResolved(_)))
        .count();
    assert_eq!(resolved, 1);
    assert_eq!(h.backend.conversation_count(), 1);
    assert_eq!(h.backend.total_active_listeners(), 1);
    assert_eq!(h.session.messages().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reconcile_miss_keeps_placeholder_silently() {
    let h = create_harness("u1");
    h.backend.set_directory_lag(true);
    h.session.load(NEW_CONVERSATION_ID, "u2", "Bea").await.expect("load failed");

    assert_ok!(h.session.send("hi").await);
    settle(1000).await;

    assert_eq!(h.session.conversation_id(), NEW_CONVERSATION_ID);
    assert_eq!(h.session.active_listener(), None);
    assert_eq!(h.notices(), vec![ChatEvent::MessageSent]);

    // The next send retries resolution once the directory has caught up
    h.backend.publish_pending();
    assert_ok!(h.session.send("hello?").await);
    settle(300).await;

    assert_ne!(h.session.conversation_id(), NEW_CONVERSATION_ID);
    assert_eq!(h.backend.conversation_count(), 1);
    assert_eq!(h.session.messages().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_directory_error_is_not_surfaced() {
    let h = create_harness("u1");
    let services = crate::Services {
        conversations: Arc::new(BrokenDirectory),
        ..h.backend.services(h.identity.clone())
    };
    let session = ChatSession::new(services, test_settings());
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    session.set_event_handler(move |e| sink.lock().push(e));

    session.load(NEW_CONVERSATION_ID, "u2", "Bea").await.expect("load failed");
    assert_ok!(session.send("hi").await);
    settle(1000).await;

    assert_eq!(session.conversation_id(), NEW_CONVERSATION_ID);
    assert_eq!(*events.lock(), vec![ChatEvent::MessageSent]);
}

#[tokio::test(start_paused = true)]
async fn test_reconcile_retries_with_backoff_when_configured() {
    let settings = SyncSettings {
        reconcile_attempts: 3,
        ..test_settings()
    };
    let h = create_harness_with_settings("u1", settings);
    h.backend.set_directory_lag(true);
    h.session.load(NEW_CONVERSATION_ID, "u2", "Bea").await.expect("load failed");

    assert_ok!(h.session.send("hi").await);

    // First attempt at 200ms misses
    settle(300).await;
    assert_eq!(h.session.conversation_id(), NEW_CONVERSATION_ID);

    // Second attempt at 200 + 400ms finds it
    h.backend.publish_pending();
    settle(400).await;
    assert_ne!(h.session.conversation_id(), NEW_CONVERSATION_ID);
}

#[tokio::test(start_paused = true)]
async fn test_blank_message_is_rejected_without_store_call() {
    let h = create_harness("u1");
    let c1 = h.backend.create_conversation(ConversationType::OneToOne, &["u1", "u2"]);
    h.session.load(&c1, "u2", "Bea").await.expect("load failed");

    let empty = h.session.send("").await;
    assert!(matches!(empty, Err(Error::Validation(_))));
    let spaces = h.session.send("   \n").await;
    assert!(matches!(spaces, Err(Error::Validation(_))));

    assert_eq!(h.backend.send_calls(), 0);
    let rejections = h
        .notices()
        .into_iter()
        .filter(|e| matches!(e, ChatEvent::ValidationFailed(_)))
        .count();
    assert_eq!(rejections, 2);
}

#[tokio::test(start_paused = true)]
async fn test_content_is_sent_as_typed() {
    let h = create_harness("u1");
    let c1 = h.backend.create_conversation(ConversationType::OneToOne, &["u1", "u2"]);
    h.session.load(&c1, "u2", "Bea").await.expect("load failed");

    h.session.set_message_input("  - bring a pencil\n  - bring a ruler\n");
    h.session.send_input().await.expect("send failed");

    let stored = h.backend.messages(&c1);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content, "  - bring a pencil\n  - bring a ruler\n");
    assert_eq!(h.session.state().message_input, "");
}

#[tokio::test(start_paused = true)]
async fn test_new_conversation_without_recipient_is_rejected() {
    let h = create_harness("u1");
    h.session.load(NEW_CONVERSATION_ID, "", "").await.expect("load failed");

    let result = h.session.send("hello").await;

    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(h.backend.send_calls(), 0);
    assert!(!h.session.state().is_sending);
}

#[tokio::test(start_paused = true)]
async fn test_send_before_load_is_rejected() {
    let h = create_harness("u1");
    assert_err!(h.session.send("hello").await);
    assert_eq!(h.backend.send_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_is_surfaced_verbatim() {
    let h = create_harness("u1");
    let c1 = h.backend.create_conversation(ConversationType::OneToOne, &["u1", "u2"]);
    h.session.load(&c1, "u2", "Bea").await.expect("load failed");
    h.backend.set_send_failure(Some("Network unavailable"));
    h.session.set_message_input("hello");

    let result = h.session.send_input().await;

    match result {
        Err(Error::Send(message)) => assert_eq!(message, "Network unavailable"),
        other => panic!("expected send error, got {:?}", other),
    }
    let state = h.session.state();
    assert!(!state.is_sending);
    assert_eq!(state.message_input, "hello");
    assert_eq!(h.backend.send_calls(), 1);
    assert_eq!(
        h.notices(),
        vec![ChatEvent::SendFailed("Network unavailable".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_send_in_existing_conversation_refreshes_listener() {
    let h = create_harness("u1");
    let c1 = h.backend.create_conversation(ConversationType::OneToOne, &["u1", "u2"]);
    h.backend.post_message(&c1, "u2", "morning");
    h.session.load(&c1, "u2", "Bea").await.expect("load failed");
    settle(10).await;

    assert_ok!(h.session.send("  good morning  ").await);
    settle(200).await;

    let stored = h.backend.messages(&c1);
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].content, "good morning");
    assert_eq!(stored[1].conversation_id, c1);

    // Replay after the refresh is deduplicated against the live copy
    assert_eq!(h.session.messages().len(), 2);
    assert_eq!(h.backend.total_active_listeners(), 1);
    assert_eq!(h.session.conversation_id(), c1);
}
