//! Marker data model shared between the index and its consumers.
//!
//! All types serialize to camelCase JSON so downstream consumers (editor
//! integrations, dashboards) can forward them unchanged.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier for a tracked source file.
///
/// The index does not interpret the contents; callers typically use a
/// project-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Creates a file identifier from anything string-like.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for FileId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A single marker annotation found in source content.
///
/// Occurrences are produced by whatever extracts markers from file text and
/// are treated as immutable by everything downstream. `title` and
/// `condition` are stored as extracted; matching against pattern
/// definitions trims both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerOccurrence {
    /// Marker title, e.g. `Todo` or `Bug`.
    pub title: String,

    /// Optional condition label, e.g. the `Important` in `Todo[Important]`.
    pub condition: Option<String>,

    /// File the marker was found in.
    pub file: FileId,

    /// 1-based line number of the marker.
    pub line: u32,

    /// 1-based column of the marker start.
    pub column: u32,
}

impl MarkerOccurrence {
    /// Creates an unconditional marker occurrence.
    #[must_use]
    pub fn new(title: impl Into<String>, file: FileId, line: u32, column: u32) -> Self {
        Self {
            title: title.into(),
            condition: None,
            file,
            line,
            column,
        }
    }

    /// Creates a marker occurrence carrying a condition label.
    #[must_use]
    pub fn with_condition(
        title: impl Into<String>,
        condition: impl Into<String>,
        file: FileId,
        line: u32,
        column: u32,
    ) -> Self {
        Self {
            title: title.into(),
            condition: Some(condition.into()),
            file,
            line,
            column,
        }
    }
}

/// A consistent view of every tracked file and its marker occurrences.
///
/// Snapshots are cloned out of the index under a read lock and are immutable
/// afterwards; later index mutations never show through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerSnapshot {
    files: HashMap<FileId, Vec<MarkerOccurrence>>,
}

impl MarkerSnapshot {
    /// Creates a snapshot from a file table.
    #[must_use]
    pub fn new(files: HashMap<FileId, Vec<MarkerOccurrence>>) -> Self {
        Self { files }
    }

    /// Returns the number of tracked files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Returns the total number of marker occurrences across all files.
    #[must_use]
    pub fn marker_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// Returns `true` if the snapshot tracks no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterates over every marker occurrence in the snapshot.
    ///
    /// File order is unspecified; counting does not depend on it.
    pub fn markers(&self) -> impl Iterator<Item = &MarkerOccurrence> {
        self.files.values().flatten()
    }

    /// Returns the markers tracked for one file, if any.
    #[must_use]
    pub fn file_markers(&self, file: &FileId) -> Option<&[MarkerOccurrence]> {
        self.files.get(file).map(Vec::as_slice)
    }
}

/// A batch of changed-file identifiers delivered to index subscribers.
///
/// One batch corresponds to one update report from the marker extractor. A
/// batch may reference files that were removed between the update and the
/// notification being observed; receivers check validity against the index
/// before acting on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChangeBatch {
    /// Identifiers of the files whose markers changed.
    pub files: Vec<FileId>,
}

impl FileChangeBatch {
    /// Creates a batch from a list of changed files.
    #[must_use]
    pub fn new(files: Vec<FileId>) -> Self {
        Self { files }
    }

    /// Creates a batch for a single changed file.
    #[must_use]
    pub fn single(file: FileId) -> Self {
        Self { files: vec![file] }
    }

    /// Returns `true` if the batch names no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
