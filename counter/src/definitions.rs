//! Pattern definitions and the definitions-text parser.
//!
//! Users configure which markers to count as free text, one definition per
//! line: a title optionally followed by a bracketed condition, e.g.
//!
//! ```text
//! Bug
//! Todo
//! Todo [Important]
//! ```
//!
//! Parsing is best effort by design: there is no malformed-line error
//! state, every non-blank line yields exactly one definition.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A user-configured counting rule: a marker title plus an optional
/// condition label.
///
/// Definitions are immutable once constructed and are created only by
/// [`parse_definitions`]. A definition without a condition matches every
/// occurrence of its title regardless of the occurrence's condition; a
/// definition with a condition matches only occurrences carrying exactly
/// that condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternDefinition {
    title: String,
    condition: Option<String>,
}

impl PatternDefinition {
    /// Creates a definition with trimmed title and condition.
    #[must_use]
    pub fn new(title: impl Into<String>, condition: Option<&str>) -> Self {
        Self {
            title: title.into().trim().to_string(),
            condition: condition.map(|c| c.trim().to_string()),
        }
    }

    /// The marker title this definition counts.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The condition label, if this definition is conditional.
    #[must_use]
    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }
}

impl fmt::Display for PatternDefinition {
    /// Formats as `title` or `title[condition]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.condition {
            Some(condition) => write!(f, "{}[{}]", self.title, condition),
            None => f.write_str(&self.title),
        }
    }
}

/// Parses a definitions-text blob into an ordered definition list.
///
/// One definition per non-blank line, in source order. Leading and trailing
/// whitespace is trimmed; a trailing `[...]` suffix (split at the last
/// opening bracket) becomes the condition. Lines containing only whitespace
/// yield nothing. A line like `[Important]` yields an empty title, which is
/// kept: such a definition simply never matches anything.
///
/// # Examples
///
/// ```rust
/// use tallymark_counter::definitions::parse_definitions;
///
/// let defs = parse_definitions("Bug\nTodo\n Todo  [Important] ");
/// assert_eq!(defs.len(), 3);
/// assert_eq!(defs[2].to_string(), "Todo[Important]");
/// ```
#[must_use]
pub fn parse_definitions(text: &str) -> Vec<PatternDefinition> {
    text.lines().filter_map(parse_line).collect()
}

/// Parses one line into a definition, or `None` for blank lines.
fn parse_line(line: &str) -> Option<PatternDefinition> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(body) = line.strip_suffix(']') {
        if let Some(open) = body.rfind('[') {
            let title = &body[..open];
            let condition = &body[open + 1..];
            return Some(PatternDefinition::new(title, Some(condition)));
        }
    }

    Some(PatternDefinition::new(line, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_definition_per_non_blank_line_in_order() {
        let defs = parse_definitions("Bug\nTodo\nNote");
        assert_eq!(
            defs.iter().map(ToString::to_string).collect::<Vec<_>>(),
            ["Bug", "Todo", "Note"]
        );
    }

    #[test]
    fn blank_and_whitespace_lines_yield_nothing() {
        let defs = parse_definitions("Bug\n\n   \n\t\nTodo");
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].title(), "Bug");
        assert_eq!(defs[1].title(), "Todo");
    }

    #[test]
    fn empty_input_yields_empty_list() {
        assert!(parse_definitions("").is_empty());
        assert!(parse_definitions("   \n \n").is_empty());
    }

    #[test]
    fn trailing_bracket_suffix_becomes_condition() {
        let defs = parse_definitions(" Todo  [Important] ");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].title(), "Todo");
        assert_eq!(defs[0].condition(), Some("Important"));
        assert_eq!(defs[0].to_string(), "Todo[Important]");
    }

    #[test]
    fn split_happens_at_last_bracket_suffix() {
        let defs = parse_definitions("Todo [a] [b]");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].title(), "Todo [a]");
        assert_eq!(defs[0].condition(), Some("b"));
    }

    #[test]
    fn unterminated_bracket_stays_in_title() {
        let defs = parse_definitions("Todo [oops");
        assert_eq!(defs[0].title(), "Todo [oops");
        assert_eq!(defs[0].condition(), None);
    }

    #[test]
    fn empty_condition_brackets() {
        let defs = parse_definitions("Todo []");
        assert_eq!(defs[0].title(), "Todo");
        assert_eq!(defs[0].condition(), Some(""));
        assert_eq!(defs[0].to_string(), "Todo[]");
    }

    #[test]
    fn condition_only_line_keeps_empty_title() {
        let defs = parse_definitions("[Important]");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].title(), "");
        assert_eq!(defs[0].condition(), Some("Important"));
    }

    #[test]
    fn condition_whitespace_is_trimmed() {
        let defs = parse_definitions("Todo [ Important ]");
        assert_eq!(defs[0].condition(), Some("Important"));
    }

    #[test]
    fn unconditional_display_is_title_alone() {
        let defs = parse_definitions("Bug");
        assert_eq!(defs[0].to_string(), "Bug");
    }
}
