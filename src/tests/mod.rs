// Test modules for chatsync
// Session behaviour is exercised end to end against the in-memory backend

mod helpers;
mod send_tests;
