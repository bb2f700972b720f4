//! Tallymark Index - in-memory marker occurrence store.
//!
//! This crate owns the marker data model and the index that tracks which
//! marker occurrences (TODO/BUG style annotations) are currently known for
//! each source file. It is the source of truth that the counting engine in
//! `tallymark-counter` reads from.
//!
//! # Overview
//!
//! Marker extraction itself happens upstream (an editor plugin, a language
//! analysis pass); whatever extracts markers pushes per-file results into a
//! [`MemoryMarkerIndex`]. The index notifies subscribers with batches of
//! changed file identifiers and hands out consistent whole-index snapshots
//! on demand.
//!
//! # Modules
//!
//! - [`types`]: Marker data model (`FileId`, `MarkerOccurrence`, snapshots,
//!   change batches)
//! - [`store`]: The [`MarkerIndex`] interface and its in-memory
//!   implementation
//! - [`error`]: Error types for index operations

pub mod error;
pub mod store;
pub mod types;

pub use error::{IndexError, Result};
pub use store::{MarkerIndex, MemoryMarkerIndex, CHANGE_CHANNEL_CAPACITY};
pub use types::{FileChangeBatch, FileId, MarkerOccurrence, MarkerSnapshot};
