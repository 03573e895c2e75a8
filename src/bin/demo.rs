//! Chatsync demo
//!
//! Runs a chat session against the in-memory backend: a teacher opens a
//! chat with a student they have never messaged, sends the first message,
//! and the session picks up the durable conversation and the student's reply.
//!
//! Usage: `chatsync-demo [settings.json]`

use chatsync::memory::MemoryBackend;
use chatsync::{ChatEvent, ChatSession, IdentityCell, SyncSettings};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chatsync::init();

    let settings = match std::env::args().nth(1) {
        Some(path) => SyncSettings::load(path)?,
        None => SyncSettings::default(),
    };

    let backend = Arc::new(MemoryBackend::new());
    backend.add_user("teacher_1", "Ms. Rivera");
    backend.add_user("student_7", "Sam Patel");

    let identity = Arc::new(IdentityCell::new());
    let session = ChatSession::new(backend.services(identity.clone()), settings.clone());
    session.set_event_handler(|event| match event {
        ChatEvent::MessagesUpdated => {}
        other => println!("event: {:?}", other),
    });

    // Sign-in completes after the chat screen has been opened
    let signer = identity.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        signer.set("teacher_1");
    });

    session.load("new", "student_7", "Sam Patel").await?;
    session.set_message_input("Hi Sam, the field trip form is due Friday.");
    session.send_input().await?;

    let settle =
        settings.reconcile_delay(settings.reconcile_attempts) + settings.read_receipt_debounce();
    tokio::time::sleep(settle).await;

    let conversation_id = session.conversation_id();
    println!("conversation: {}", conversation_id);

    backend.post_message(&conversation_id, "student_7", "Thanks, I'll bring it tomorrow!");
    tokio::time::sleep(settings.read_receipt_debounce() * 2).await;

    for message in session.messages() {
        println!(
            "[{}] {}: {}",
            message.sent_at,
            session.sender_display_name(&message.sender_id),
            message.content
        );
    }
    println!(
        "unread for teacher: {}",
        backend.unread_count(&conversation_id, "teacher_1")
    );

    session.close();
    Ok(())
}
