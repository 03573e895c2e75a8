//! User records

use serde::{Deserialize, Serialize};

/// A user as returned by the user directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User ID
    pub user_id: String,
    /// Human-readable name
    pub display_name: String,
}

impl User {
    /// Create a new user record
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}
