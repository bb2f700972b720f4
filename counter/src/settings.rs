//! Settings store interface for the counting configuration.
//!
//! The engine reads two values: an `enabled` flag and the raw definitions
//! text. Both live in whatever configuration system hosts this crate (an
//! editor's settings store, a config service); [`SettingsStore`] is the
//! narrow interface the engine consumes.
//!
//! # Propagation caveat
//!
//! A change notification from [`SettingsStore::subscribe`] may be observed
//! before a caching store implementation has propagated the new value to
//! its own read path. The engine is robust to this: it epoch-stamps its
//! definition cache and bumps the epoch in the notification handler before
//! recomputing, so a fresh read is forced rather than a stale memo reused
//! (see [`crate::cache`]).

use std::sync::RwLock;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Capacity of the settings change-notification channel.
pub const SETTINGS_CHANNEL_CAPACITY: usize = 64;

/// Errors that can occur reading the settings store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// The store could not serve a read.
    #[error("settings store unavailable: {0}")]
    Unavailable(String),
}

/// Read access to the counting configuration.
///
/// Reads are expected to be cheap; the engine calls them from its worker
/// task during recompute. Implementations backed by remote stores should
/// cache internally and rely on the engine's epoch mechanism for
/// invalidation ordering.
pub trait SettingsStore: Send + Sync {
    /// Whether counting is enabled at all.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Unavailable`] if the store cannot serve the
    /// read; the engine then aborts the recompute and keeps the previously
    /// published result.
    fn is_enabled(&self) -> Result<bool, SettingsError>;

    /// The raw definitions text, one definition per line.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Unavailable`] if the store cannot serve the
    /// read.
    fn definitions_text(&self) -> Result<String, SettingsError>;

    /// Subscribes to configuration changes.
    ///
    /// Fires whenever either value changes. See the module docs for the
    /// propagation caveat.
    fn subscribe(&self) -> broadcast::Receiver<()>;
}

/// In-memory [`SettingsStore`] implementation.
///
/// Counting starts enabled with empty definitions text, which the engine
/// surfaces as "no data" until definitions are configured.
///
/// # Example
///
/// ```rust
/// use tallymark_counter::settings::{MemorySettingsStore, SettingsStore};
///
/// let settings = MemorySettingsStore::new();
/// settings.set_definitions("Bug\nTodo");
/// assert_eq!(settings.definitions_text().unwrap(), "Bug\nTodo");
/// assert!(settings.is_enabled().unwrap());
/// ```
#[derive(Debug)]
pub struct MemorySettingsStore {
    values: RwLock<Values>,
    changes: broadcast::Sender<()>,
}

#[derive(Debug)]
struct Values {
    enabled: bool,
    definitions_text: String,
}

impl MemorySettingsStore {
    /// Creates a store with counting enabled and no definitions.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(SETTINGS_CHANNEL_CAPACITY);
        Self {
            values: RwLock::new(Values {
                enabled: true,
                definitions_text: String::new(),
            }),
            changes,
        }
    }

    /// Sets the enabled flag and notifies subscribers.
    pub fn set_enabled(&self, enabled: bool) {
        {
            let mut values = self.values.write().unwrap_or_else(|p| p.into_inner());
            values.enabled = enabled;
        }
        debug!(enabled, "Counting toggled");
        self.notify();
    }

    /// Replaces the definitions text and notifies subscribers.
    pub fn set_definitions(&self, text: impl Into<String>) {
        {
            let mut values = self.values.write().unwrap_or_else(|p| p.into_inner());
            values.definitions_text = text.into();
        }
        debug!("Definitions text replaced");
        self.notify();
    }

    fn notify(&self) {
        match self.changes.send(()) {
            Ok(receivers) => trace!(receivers, "Settings change delivered"),
            Err(_) => trace!("Settings change dropped, no subscribers"),
        }
    }
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn is_enabled(&self) -> Result<bool, SettingsError> {
        Ok(self
            .values
            .read()
            .map_err(|_| SettingsError::Unavailable("values lock poisoned".to_string()))?
            .enabled)
    }

    fn definitions_text(&self) -> Result<String, SettingsError> {
        Ok(self
            .values
            .read()
            .map_err(|_| SettingsError::Unavailable("values lock poisoned".to_string()))?
            .definitions_text
            .clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}
