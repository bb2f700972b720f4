//! The marker index: tracked files, change notifications, snapshots.
//!
//! # Architecture
//!
//! [`MarkerIndex`] is the interface the counting engine consumes: a change
//! subscription delivering [`FileChangeBatch`] values, a read-locked
//! [`snapshot`](MarkerIndex::snapshot) of every tracked file, and a
//! [`is_valid`](MarkerIndex::is_valid) query so receivers can filter change
//! batches that reference files removed since the update was reported.
//!
//! [`MemoryMarkerIndex`] is the in-memory reference implementation: a
//! `RwLock` file table plus a broadcast channel for change batches. Writers
//! (the marker extractor) call the mutators; any number of readers
//! subscribe. The table lock is held only while copying data in or out,
//! never across notification delivery.
//!
//! # Example
//!
//! ```rust
//! use tallymark_index::{FileId, MarkerIndex, MarkerOccurrence, MemoryMarkerIndex};
//!
//! let index = MemoryMarkerIndex::new();
//! let file = FileId::from("src/main.rs");
//! index.update_file(
//!     file.clone(),
//!     vec![MarkerOccurrence::new("Todo", file.clone(), 10, 4)],
//! );
//!
//! let snapshot = index.snapshot().unwrap();
//! assert_eq!(snapshot.marker_count(), 1);
//! assert!(index.is_valid(&file));
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::error::{IndexError, Result};
use crate::types::{FileChangeBatch, FileId, MarkerOccurrence, MarkerSnapshot};

/// Capacity of the change-notification channel.
///
/// Slow subscribers that fall further behind than this receive a lag error
/// on their next receive attempt instead of stalling writers.
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Read access to the set of currently known marker occurrences.
///
/// Implementations are the source of truth for marker data. The counting
/// engine only ever reads: it subscribes to change batches, checks batch
/// entries for validity, and pulls whole-index snapshots.
pub trait MarkerIndex: Send + Sync {
    /// Subscribes to change notifications.
    ///
    /// Each received batch lists the files whose markers changed in one
    /// update report. Batches observed after a file was removed may
    /// reference files that are no longer valid.
    fn subscribe(&self) -> broadcast::Receiver<FileChangeBatch>;

    /// Returns a consistent snapshot of every tracked file.
    ///
    /// The implementation acquires a shared read lock for the duration of
    /// the copy only; the returned snapshot is immutable and detached from
    /// later index mutations.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Unavailable`] if the backing store cannot be
    /// read.
    fn snapshot(&self) -> Result<MarkerSnapshot>;

    /// Returns `true` if the file is currently tracked and consistent.
    fn is_valid(&self, file: &FileId) -> bool;
}

/// In-memory [`MarkerIndex`] implementation.
///
/// # Thread Safety
///
/// The file table uses interior mutability behind a `RwLock`; mutators and
/// readers can be called from any thread or task. Change notifications go
/// out on a tokio broadcast channel after the table lock is released.
#[derive(Debug)]
pub struct MemoryMarkerIndex {
    /// Markers per tracked file. Presence in the table is what
    /// [`MarkerIndex::is_valid`] reports.
    files: RwLock<HashMap<FileId, Vec<MarkerOccurrence>>>,

    /// Broadcast sender for change batches.
    changes: broadcast::Sender<FileChangeBatch>,
}

impl MemoryMarkerIndex {
    /// Creates an empty index with the default notification capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(CHANGE_CHANNEL_CAPACITY)
    }

    /// Creates an empty index with a custom notification channel capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        Self {
            files: RwLock::new(HashMap::new()),
            changes,
        }
    }

    /// Replaces the markers tracked for one file and notifies subscribers.
    ///
    /// An empty `markers` list keeps the file tracked with zero markers;
    /// use [`remove_file`](Self::remove_file) to stop tracking it.
    pub fn update_file(&self, file: FileId, markers: Vec<MarkerOccurrence>) {
        self.update_files(vec![(file, markers)]);
    }

    /// Replaces the markers for several files as one update report.
    ///
    /// Subscribers receive a single batch naming every file in the report.
    pub fn update_files(&self, updates: Vec<(FileId, Vec<MarkerOccurrence>)>) {
        if updates.is_empty() {
            return;
        }

        let batch = FileChangeBatch::new(updates.iter().map(|(file, _)| file.clone()).collect());
        {
            let mut table = match self.files.write() {
                Ok(table) => table,
                Err(poisoned) => {
                    warn!("file table lock poisoned, recovering");
                    poisoned.into_inner()
                }
            };
            for (file, markers) in updates {
                trace!(file = %file, markers = markers.len(), "Updating tracked file");
                table.insert(file, markers);
            }
        }
        self.notify(batch);
    }

    /// Stops tracking a file and notifies subscribers.
    ///
    /// The notification batch references a file that is no longer valid;
    /// receivers that filter on validity will discard it and recount on the
    /// next valid trigger instead.
    pub fn remove_file(&self, file: &FileId) {
        let removed = {
            let mut table = match self.files.write() {
                Ok(table) => table,
                Err(poisoned) => {
                    warn!("file table lock poisoned, recovering");
                    poisoned.into_inner()
                }
            };
            table.remove(file).is_some()
        };

        if removed {
            debug!(file = %file, "File removed from index");
            self.notify(FileChangeBatch::single(file.clone()));
        }
    }

    /// Returns the number of currently tracked files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.read().map(|table| table.len()).unwrap_or(0)
    }

    /// Returns the current number of change subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    fn notify(&self, batch: FileChangeBatch) {
        match self.changes.send(batch) {
            Ok(receivers) => trace!(receivers, "Change batch delivered"),
            // No active subscribers; nothing is waiting on updates.
            Err(_) => trace!("Change batch dropped, no subscribers"),
        }
    }
}

impl Default for MemoryMarkerIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerIndex for MemoryMarkerIndex {
    fn subscribe(&self) -> broadcast::Receiver<FileChangeBatch> {
        let rx = self.changes.subscribe();
        debug!(
            subscriber_count = self.subscriber_count(),
            "New index subscriber"
        );
        rx
    }

    fn snapshot(&self) -> Result<MarkerSnapshot> {
        let table = self
            .files
            .read()
            .map_err(|_| IndexError::Unavailable("file table lock poisoned".to_string()))?;
        Ok(MarkerSnapshot::new(table.clone()))
    }

    fn is_valid(&self, file: &FileId) -> bool {
        self.files
            .read()
            .map(|table| table.contains_key(file))
            .unwrap_or(false)
    }
}
