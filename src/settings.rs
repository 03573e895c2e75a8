//! Engine timing settings

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing configuration for chat sessions
///
/// Settings are stored in JSON format and can be loaded/saved from disk.
/// Missing fields fall back to their defaults.
///
/// # Example
/// ```rust,no_run
/// use chatsync::SyncSettings;
///
/// // Load settings (returns default if file doesn't exist)
/// let mut settings = SyncSettings::load("chatsync.json").expect("Failed to load");
///
/// settings.read_receipt_debounce_ms = 250;
/// settings.save("chatsync.json").expect("Failed to save");
///
/// println!("Debounce: {:?}", settings.read_receipt_debounce());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Quiet period before a read receipt is sent, in milliseconds
    pub read_receipt_debounce_ms: u64,
    /// Wait before looking up a freshly created conversation, in milliseconds
    pub reconcile_delay_ms: u64,
    /// Directory lookups made to resolve a new conversation (at least 1)
    pub reconcile_attempts: u32,
    /// Wait before refreshing the listener after a send, in milliseconds
    pub refresh_delay_ms: u64,
}

impl SyncSettings {
    /// Load settings from a JSON file
    ///
    /// # Arguments
    /// * `path` - Path to the settings file
    ///
    /// # Returns
    /// The loaded settings, or default settings if file doesn't exist
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Settings(format!("Failed to read settings: {}", e)))?;

        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut settings: Self = serde_json::from_str(&data)
            .map_err(|e| Error::Settings(format!("Failed to parse settings: {}", e)))?;
        settings.normalize();

        Ok(settings)
    }

    /// Save settings to a JSON file, creating parent directories
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Settings(format!("Failed to create settings directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(self)?;

        std::fs::write(path, json)
            .map_err(|e| Error::Settings(format!("Failed to write settings: {}", e)))?;

        Ok(())
    }

    /// Read-receipt debounce window
    pub fn read_receipt_debounce(&self) -> Duration {
        Duration::from_millis(self.read_receipt_debounce_ms)
    }

    /// Delay before the given reconciliation attempt (0-based), doubling each time
    pub fn reconcile_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(self.reconcile_delay_ms.saturating_mul(factor))
    }

    /// Delay before a post-send listener refresh
    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    // A zero attempt count would make reconciliation a no-op
    fn normalize(&mut self) {
        self.reconcile_attempts = self.reconcile_attempts.max(1);
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            read_receipt_debounce_ms: 500,
            reconcile_delay_ms: 500,
            reconcile_attempts: 1,
            refresh_delay_ms: 300,
        }
    }
}
