//! Count accumulation over a marker snapshot.
//!
//! Given the ordered definition list and a full marker snapshot,
//! [`accumulate`] produces one [`MarkerCount`] per definition, in
//! definition order. Definitions are independent counters rather than a
//! partition: a single marker may increment several definitions (a plain
//! `Todo` definition counts every Todo, a `Todo[Important]` definition only
//! those carrying that condition, and one `Todo[Important]` marker
//! increments both).
//!
//! Accumulation is deterministic and side-effect-free; it can run from any
//! thread given immutable inputs. Complexity is O(markers × definitions),
//! which is fine at interactive scale (thousands of markers, tens of
//! definitions).

use serde::{Deserialize, Serialize};
use tallymark_index::{MarkerOccurrence, MarkerSnapshot};

use crate::definitions::PatternDefinition;

/// The number of markers matching one pattern definition.
///
/// Recreated fresh on every recompute; never mutated after publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerCount {
    /// The definition this count was computed for.
    pub definition: PatternDefinition,

    /// How many markers in the snapshot matched it.
    pub count: usize,
}

/// A published counting result.
///
/// `NoData` means counting is disabled or no definitions are configured;
/// consumers render it as "nothing to show", distinct from a definition
/// list whose counts are all zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "counts")]
pub enum CountsUpdate {
    /// Counting is disabled or zero definitions are configured.
    NoData,

    /// One entry per configured definition, in configuration order.
    Counts(Vec<MarkerCount>),
}

impl CountsUpdate {
    /// Returns the count entries, or `None` for [`CountsUpdate::NoData`].
    #[must_use]
    pub fn counts(&self) -> Option<&[MarkerCount]> {
        match self {
            Self::NoData => None,
            Self::Counts(counts) => Some(counts),
        }
    }
}

/// Returns `true` if the marker matches the definition.
///
/// Titles compare for exact, case-sensitive equality after trimming; an
/// unconditional definition matches any condition, a conditional one only
/// its exact (trimmed, case-sensitive) condition.
fn matches(definition: &PatternDefinition, marker: &MarkerOccurrence) -> bool {
    if definition.title() != marker.title.trim() {
        return false;
    }
    match definition.condition() {
        None => true,
        Some(condition) => marker.condition.as_deref().map(str::trim) == Some(condition),
    }
}

/// Counts the markers in `snapshot` against each definition.
///
/// Returns one entry per definition, in the order supplied, each starting
/// from zero.
///
/// # Examples
///
/// ```rust
/// use tallymark_counter::counts::accumulate;
/// use tallymark_counter::definitions::parse_definitions;
/// use tallymark_index::{FileId, MarkerOccurrence, MarkerSnapshot};
/// use std::collections::HashMap;
///
/// let definitions = parse_definitions("Bug\nTodo");
/// let file = FileId::from("a.rs");
/// let mut files = HashMap::new();
/// files.insert(
///     file.clone(),
///     vec![
///         MarkerOccurrence::new("Bug", file.clone(), 1, 1),
///         MarkerOccurrence::new("Todo", file.clone(), 2, 1),
///     ],
/// );
///
/// let counts = accumulate(&definitions, &MarkerSnapshot::new(files));
/// assert_eq!(counts[0].count, 1);
/// assert_eq!(counts[1].count, 1);
/// ```
#[must_use]
pub fn accumulate(
    definitions: &[PatternDefinition],
    snapshot: &MarkerSnapshot,
) -> Vec<MarkerCount> {
    let mut counts: Vec<MarkerCount> = definitions
        .iter()
        .map(|definition| MarkerCount {
            definition: definition.clone(),
            count: 0,
        })
        .collect();

    for marker in snapshot.markers() {
        for entry in &mut counts {
            if matches(&entry.definition, marker) {
                entry.count += 1;
            }
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tallymark_index::FileId;

    use super::*;
    use crate::definitions::parse_definitions;

    fn snapshot(markers: Vec<MarkerOccurrence>) -> MarkerSnapshot {
        let mut files: HashMap<FileId, Vec<MarkerOccurrence>> = HashMap::new();
        for marker in markers {
            files.entry(marker.file.clone()).or_default().push(marker);
        }
        MarkerSnapshot::new(files)
    }

    fn plain(title: &str, file: &str, line: u32) -> MarkerOccurrence {
        MarkerOccurrence::new(title, FileId::from(file), line, 1)
    }

    fn conditional(title: &str, condition: &str, file: &str, line: u32) -> MarkerOccurrence {
        MarkerOccurrence::with_condition(title, condition, FileId::from(file), line, 1)
    }

    #[test]
    fn counts_follow_definition_order() {
        let definitions = parse_definitions("Bug\nTodo");
        let counts = accumulate(
            &definitions,
            &snapshot(vec![
                plain("Todo", "a.rs", 1),
                plain("Bug", "a.rs", 2),
                plain("Todo", "b.rs", 1),
            ]),
        );

        assert_eq!(
            counts
                .iter()
                .map(|c| (c.definition.to_string(), c.count))
                .collect::<Vec<_>>(),
            [("Bug".to_string(), 1), ("Todo".to_string(), 2)]
        );
    }

    #[test]
    fn unmatched_definitions_stay_zero() {
        let definitions = parse_definitions("Hack");
        let counts = accumulate(&definitions, &snapshot(vec![plain("Todo", "a.rs", 1)]));
        assert_eq!(counts[0].count, 0);
    }

    #[test]
    fn title_match_is_case_sensitive() {
        let definitions = parse_definitions("Todo");
        let counts = accumulate(&definitions, &snapshot(vec![plain("TODO", "a.rs", 1)]));
        assert_eq!(counts[0].count, 0);
    }

    #[test]
    fn marker_whitespace_is_trimmed_for_matching() {
        let definitions = parse_definitions("Todo");
        let counts = accumulate(
            &definitions,
            &snapshot(vec![plain(" Todo ", "a.rs", 1)]),
        );
        assert_eq!(counts[0].count, 1);
    }

    #[test]
    fn unconditional_definition_matches_any_condition() {
        let definitions = parse_definitions("Todo");
        let counts = accumulate(
            &definitions,
            &snapshot(vec![
                plain("Todo", "a.rs", 1),
                conditional("Todo", "Important", "a.rs", 2),
            ]),
        );
        assert_eq!(counts[0].count, 2);
    }

    #[test]
    fn conditional_definition_needs_exact_condition() {
        let definitions = parse_definitions("Todo [Important]");
        let counts = accumulate(
            &definitions,
            &snapshot(vec![
                plain("Todo", "a.rs", 1),
                conditional("Todo", "Important", "a.rs", 2),
                conditional("Todo", "important", "a.rs", 3),
            ]),
        );
        assert_eq!(counts[0].count, 1);
    }

    #[test]
    fn one_marker_can_increment_several_definitions() {
        let definitions = parse_definitions("Todo\nTodo [Important]");
        let counts = accumulate(
            &definitions,
            &snapshot(vec![conditional("Todo", "Important", "a.rs", 1)]),
        );
        assert_eq!(counts[0].count, 1);
        assert_eq!(counts[1].count, 1);
    }

    #[test]
    fn empty_title_definition_never_matches() {
        let definitions = parse_definitions("[Important]");
        let counts = accumulate(
            &definitions,
            &snapshot(vec![conditional("Todo", "Important", "a.rs", 1)]),
        );
        assert_eq!(counts[0].count, 0);
    }

    #[test]
    fn empty_snapshot_yields_all_zero() {
        let definitions = parse_definitions("Bug\nTodo");
        let counts = accumulate(&definitions, &MarkerSnapshot::default());
        assert!(counts.iter().all(|c| c.count == 0));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn mixed_titles_count_independently() {
        let definitions = parse_definitions("Bug\nTodo");
        let markers = vec![
            plain("Bug", "a.rs", 1),
            plain("Bug", "a.rs", 2),
            plain("Todo", "a.rs", 3),
            plain("Todo", "b.rs", 1),
            plain("Todo", "b.rs", 2),
            plain("Todo", "b.rs", 3),
            plain("Todo", "b.rs", 4),
        ];
        let counts = accumulate(&definitions, &snapshot(markers));
        assert_eq!(
            counts
                .iter()
                .map(|c| (c.definition.to_string(), c.count))
                .collect::<Vec<_>>(),
            [("Bug".to_string(), 2), ("Todo".to_string(), 5)]
        );
    }

    #[test]
    fn counts_update_accessor() {
        assert!(CountsUpdate::NoData.counts().is_none());
        let update = CountsUpdate::Counts(vec![]);
        assert_eq!(update.counts(), Some(&[][..]));
    }
}
