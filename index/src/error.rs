//! Error types for the Tallymark Index.

use thiserror::Error;

/// Errors that can occur during index operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// The index could not produce a consistent snapshot.
    ///
    /// Raised when the backing store is unavailable, for example because a
    /// writer panicked while holding the table lock.
    #[error("marker index unavailable: {0}")]
    Unavailable(String),
}

/// A specialized `Result` type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;
