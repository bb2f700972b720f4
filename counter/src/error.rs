//! Error types for the Tallymark Counter.
//!
//! Each module that can fail defines its own error type; this module
//! aggregates them for callers that want a single error surface.

use thiserror::Error;

use tallymark_index::IndexError;

use crate::consumers::DeliveryError;
use crate::engine::EngineStopped;
use crate::settings::SettingsError;

/// Errors that can occur during counter operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    /// The settings store could not serve a read.
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    /// The marker index could not produce a snapshot.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// A consumer failed to handle a delivered result.
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// The engine was already shut down.
    #[error("engine error: {0}")]
    Stopped(#[from] EngineStopped),
}

/// A specialized `Result` type for counter operations.
pub type Result<T> = std::result::Result<T, CounterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_error_display() {
        let err: CounterError = SettingsError::Unavailable("offline".to_string()).into();
        assert_eq!(
            err.to_string(),
            "settings error: settings store unavailable: offline"
        );
    }

    #[test]
    fn index_error_display() {
        let err: CounterError = IndexError::Unavailable("lock poisoned".to_string()).into();
        assert_eq!(
            err.to_string(),
            "index error: marker index unavailable: lock poisoned"
        );
    }

    #[test]
    fn delivery_error_display() {
        let err: CounterError = DeliveryError("render queue gone".to_string()).into();
        assert_eq!(
            err.to_string(),
            "delivery error: consumer rejected update: render queue gone"
        );
    }

    #[test]
    fn stopped_error_display() {
        let err: CounterError = EngineStopped.into();
        assert_eq!(err.to_string(), "engine error: count engine stopped");
    }

    #[test]
    fn error_source_chain() {
        use std::error::Error;

        let err: CounterError = SettingsError::Unavailable("offline".to_string()).into();
        assert!(err.source().is_some());
    }
}
