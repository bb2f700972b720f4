//! Epoch-keyed cache of parsed pattern definitions.
//!
//! Parsing the definitions text on every recompute would be wasted work:
//! most triggers are file changes that leave the configuration untouched.
//! [`DefinitionCache`] memoizes the parsed definition list keyed by an
//! opaque epoch token supplied by the caller. The engine advances the epoch
//! in its configuration-change handler *before* it enqueues the recompute
//! trigger; by the time the recompute reads the cache, the memoized entry
//! no longer matches and a fresh store read is forced. This closes the
//! window where a change notification outruns value propagation inside the
//! settings store (see [`crate::settings`]).
//!
//! The memo is published with a single atomic swap so concurrent readers
//! can never observe a half-updated epoch/value pair.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{debug, trace};

use crate::definitions::{parse_definitions, PatternDefinition};
use crate::settings::{SettingsError, SettingsStore};

/// Cached parse result for one configuration epoch.
#[derive(Debug)]
struct Memo {
    epoch: u64,
    definitions: Option<Arc<Vec<PatternDefinition>>>,
}

/// Memoizing reader for the configured pattern definitions.
pub struct DefinitionCache {
    settings: Arc<dyn SettingsStore>,
    memo: ArcSwapOption<Memo>,
}

impl DefinitionCache {
    /// Creates an empty cache reading from the given settings store.
    #[must_use]
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            settings,
            memo: ArcSwapOption::const_empty(),
        }
    }

    /// Returns the definitions for the given configuration epoch.
    ///
    /// `None` means counting is disabled. An enabled store whose text
    /// parses to zero definitions returns `Some` with an empty list; the
    /// engine collapses both cases to "no data" at the consumer boundary.
    ///
    /// Repeated calls with the same epoch serve the memoized value without
    /// touching the store. A new epoch forces a re-read and re-parse.
    ///
    /// # Errors
    ///
    /// Propagates [`SettingsError`] from the store; the memo keeps its
    /// previous entry in that case, so a later retry re-reads.
    pub fn get(&self, epoch: u64) -> Result<Option<Arc<Vec<PatternDefinition>>>, SettingsError> {
        if let Some(memo) = self.memo.load_full() {
            if memo.epoch == epoch {
                trace!(epoch, "Definition cache hit");
                return Ok(memo.definitions.clone());
            }
        }

        let definitions = self.read_and_parse()?;
        debug!(
            epoch,
            definitions = definitions.as_ref().map_or(0, |defs| defs.len()),
            enabled = definitions.is_some(),
            "Definition cache refreshed"
        );
        self.memo.store(Some(Arc::new(Memo {
            epoch,
            definitions: definitions.clone(),
        })));
        Ok(definitions)
    }

    fn read_and_parse(&self) -> Result<Option<Arc<Vec<PatternDefinition>>>, SettingsError> {
        if !self.settings.is_enabled()? {
            return Ok(None);
        }
        let text = self.settings.definitions_text()?;
        Ok(Some(Arc::new(parse_definitions(&text))))
    }
}
