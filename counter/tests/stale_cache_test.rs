//! Regression test for the stale-cache window around settings changes.
//!
//! A settings change notification can be observed before a caching read
//! path serves the new value. The engine closes the window by advancing the
//! definition-cache epoch in the notification handler, before the recompute
//! trigger is enqueued: the recompute that follows must re-read instead of
//! reusing the memo taken just before the notification.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;

use tallymark_counter::cache::DefinitionCache;
use tallymark_counter::consumers::{CountConsumer, DeliveryError};
use tallymark_counter::counts::CountsUpdate;
use tallymark_counter::engine::CountEngine;
use tallymark_counter::settings::{MemorySettingsStore, SettingsStore};
use tallymark_index::{FileId, MarkerOccurrence, MemoryMarkerIndex};

const WAIT: Duration = Duration::from_secs(5);

struct ChannelConsumer {
    tx: UnboundedSender<CountsUpdate>,
}

impl ChannelConsumer {
    fn new() -> (Arc<Self>, UnboundedReceiver<CountsUpdate>) {
        let (tx, rx) = unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl CountConsumer for ChannelConsumer {
    fn deliver(&self, update: &CountsUpdate) -> Result<(), DeliveryError> {
        self.tx
            .send(update.clone())
            .map_err(|_| DeliveryError("test receiver gone".to_string()))
    }
}

fn definition_titles(update: &CountsUpdate) -> Vec<String> {
    update
        .counts()
        .expect("expected counts")
        .iter()
        .map(|entry| entry.definition.to_string())
        .collect()
}

/// The memoized value must never survive a settings-change notification:
/// the recompute triggered by the change reflects the new definitions even
/// though a memo for the old ones was taken a moment earlier.
#[tokio::test]
async fn settings_change_recomputes_against_fresh_definitions() {
    let index = Arc::new(MemoryMarkerIndex::new());
    let file = FileId::from("src/sample.rs");
    index.update_file(
        file.clone(),
        vec![
            MarkerOccurrence::new("Old", file.clone(), 1, 1),
            MarkerOccurrence::new("New", file.clone(), 2, 1),
        ],
    );

    let settings = Arc::new(MemorySettingsStore::new());
    settings.set_definitions("Old");

    let engine = CountEngine::new(index, Arc::clone(&settings) as Arc<dyn SettingsStore>);
    let (consumer, mut rx) = ChannelConsumer::new();
    let registration = engine.register(&consumer);

    // Prime the memo with the old definitions.
    registration.request_refresh().await.unwrap();
    let primed = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(definition_titles(&primed), ["Old"]);

    // The change handler advances the epoch before triggering, so the
    // recompute re-reads rather than serving the memoized "Old" parse.
    settings.set_definitions("New");
    let updated = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(definition_titles(&updated), ["New"]);

    engine.shutdown().await;
}

/// Same property at the cache level: the memo is keyed by epoch, and only
/// an epoch advance forces a re-read.
#[test]
fn cache_serves_memo_until_epoch_advances() {
    let settings = Arc::new(MemorySettingsStore::new());
    settings.set_definitions("Old");
    let cache = DefinitionCache::new(Arc::clone(&settings) as Arc<dyn SettingsStore>);

    let primed = cache.get(0).unwrap().unwrap();
    assert_eq!(primed[0].title(), "Old");

    // The store already serves the new value, but epoch 0 is memoized:
    // without an epoch advance the cache intentionally stays stale.
    settings.set_definitions("New");
    let stale = cache.get(0).unwrap().unwrap();
    assert_eq!(stale[0].title(), "Old");

    let fresh = cache.get(1).unwrap().unwrap();
    assert_eq!(fresh[0].title(), "New");
}
