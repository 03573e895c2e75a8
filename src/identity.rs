//! Current-user identity
//!
//! A single-writer, multi-reader cell holding the signed-in user's ID.
//! Readers subscribe to a distinct-until-changed stream that starts with
//! the cached value; the engine waits on it for the first non-empty ID.

use crate::services::IdentityResolver;
use futures::stream::{BoxStream, StreamExt};
use std::future;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

/// Shared, observable holder of the current user ID
///
/// # Example
/// ```rust,no_run
/// use chatsync::IdentityCell;
///
/// let identity = IdentityCell::new();
/// assert_eq!(identity.current(), "");
///
/// identity.set("teacher_42");
/// assert_eq!(identity.current(), "teacher_42");
/// ```
#[derive(Debug)]
pub struct IdentityCell {
    sender: watch::Sender<String>,
}

impl IdentityCell {
    /// Create an unresolved cell (empty user ID)
    pub fn new() -> Self {
        let (sender, _) = watch::channel(String::new());
        Self { sender }
    }

    /// Create a cell that is already resolved
    pub fn with_user(user_id: impl Into<String>) -> Self {
        let (sender, _) = watch::channel(user_id.into());
        Self { sender }
    }

    /// Publish a new user ID
    ///
    /// Returns `false` when the value is unchanged; subscribers are not woken.
    pub fn set(&self, user_id: impl Into<String>) -> bool {
        let user_id = user_id.into();
        let changed = self.sender.send_if_modified(|current| {
            if *current == user_id {
                false
            } else {
                *current = user_id;
                true
            }
        });
        if changed {
            debug!("Identity changed");
        }
        changed
    }

    /// Clear the user ID (signed out)
    pub fn clear(&self) -> bool {
        self.set(String::new())
    }

    /// Current cached value
    pub fn current(&self) -> String {
        self.sender.borrow().clone()
    }
}

impl Default for IdentityCell {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityResolver for IdentityCell {
    fn current_user_id(&self) -> BoxStream<'static, String> {
        WatchStream::new(self.sender.subscribe()).boxed()
    }
}

/// Wait for the first non-blank user ID
///
/// Returns `None` if the resolver's stream ends without producing one.
pub async fn wait_for_user_id(identity: &dyn IdentityResolver) -> Option<String> {
    identity
        .current_user_id()
        .filter(|user_id| future::ready(!user_id.trim().is_empty()))
        .next()
        .await
}
