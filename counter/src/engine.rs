//! The recompute trigger hub.
//!
//! [`CountEngine`] ties the pieces together: it subscribes to the three
//! notification sources (marker index change batches, settings changes,
//! consumer refresh requests), reconciles them against the definition
//! cache, recounts, and fans the result out to registered consumers.
//!
//! # Architecture
//!
//! All three sources feed one bounded mpsc channel drained by a single
//! worker task, so at most one recompute pipeline runs at a time. Triggers
//! that arrive while a recompute is in flight queue up and are coalesced
//! into the next cycle; none are silently dropped, and the final published
//! state always reflects the latest inputs.
//!
//! - File-change batches are checked at notification time: a batch naming
//!   any file the index no longer considers valid is discarded whole (the
//!   previous counts stay published until the next valid trigger).
//! - Settings-change notifications advance the definition-cache epoch
//!   *before* the recompute trigger is enqueued. A caching settings store
//!   may notify before its own read path serves the new value; the epoch
//!   bump forces a fresh read instead of reusing a memo taken the moment
//!   before the notification.
//! - Refresh requests arrive through the [`RefreshHandle`] each consumer
//!   receives at registration.
//!
//! A recompute either publishes a complete result (`NoData` when counting
//! is disabled or no definitions are configured, ordered counts otherwise)
//! or aborts on a collaborator failure, logging it and leaving the
//! previously published result in place.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tallymark_counter::consumers::{CountConsumer, DeliveryError};
//! use tallymark_counter::counts::CountsUpdate;
//! use tallymark_counter::engine::CountEngine;
//! use tallymark_counter::settings::MemorySettingsStore;
//! use tallymark_index::MemoryMarkerIndex;
//!
//! struct Printer;
//!
//! impl CountConsumer for Printer {
//!     fn deliver(&self, update: &CountsUpdate) -> Result<(), DeliveryError> {
//!         println!("{update:?}");
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() {
//! let index = Arc::new(MemoryMarkerIndex::new());
//! let settings = Arc::new(MemorySettingsStore::new());
//! settings.set_definitions("Bug\nTodo");
//!
//! let engine = CountEngine::new(index, settings);
//! let printer = Arc::new(Printer);
//! let registration = engine.register(&printer);
//! registration.request_refresh().await.unwrap();
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwapOption;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use tallymark_index::{FileChangeBatch, MarkerIndex};

use crate::cache::DefinitionCache;
use crate::consumers::{ConsumerId, ConsumerRegistry, CountConsumer};
use crate::counts::{accumulate, CountsUpdate};
use crate::settings::SettingsStore;

/// Capacity of the trigger channel.
///
/// Senders await free capacity rather than dropping, so this only bounds
/// memory, not correctness.
const TRIGGER_CHANNEL_CAPACITY: usize = 64;

/// The engine has been shut down; no further recomputes will run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("count engine stopped")]
pub struct EngineStopped;

/// One recompute request from any of the three sources.
#[derive(Debug)]
enum Trigger {
    /// A validated batch of changed files.
    FilesChanged(FileChangeBatch),

    /// The settings changed; the cache epoch was already advanced.
    ConfigChanged,

    /// A consumer asked for a recompute.
    Refresh,

    /// Change notifications were missed (lagging subscriber); recount.
    CatchUp,

    /// Stop the worker, discarding anything still queued.
    Shutdown,
}

/// Handle for requesting a recompute, handed out at registration.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    trigger_tx: mpsc::Sender<Trigger>,
}

impl RefreshHandle {
    /// Requests a recompute.
    ///
    /// Every request is observed: either it triggers its own recompute or
    /// it coalesces into one that also covers later requests.
    ///
    /// # Errors
    ///
    /// Returns [`EngineStopped`] after the engine was shut down.
    pub async fn request_refresh(&self) -> Result<(), EngineStopped> {
        self.trigger_tx
            .send(Trigger::Refresh)
            .await
            .map_err(|_| EngineStopped)
    }
}

/// A consumer's registration with the engine.
///
/// Dropping the registration does not unregister the consumer; call
/// [`CountEngine::unregister`] with [`id`](Self::id) on teardown.
#[derive(Debug, Clone)]
pub struct ConsumerRegistration {
    id: ConsumerId,
    refresh: RefreshHandle,
}

impl ConsumerRegistration {
    /// The id to pass to [`CountEngine::unregister`].
    #[must_use]
    pub fn id(&self) -> ConsumerId {
        self.id
    }

    /// Returns a clonable refresh handle.
    #[must_use]
    pub fn refresh_handle(&self) -> RefreshHandle {
        self.refresh.clone()
    }

    /// Requests a recompute on behalf of this consumer.
    ///
    /// # Errors
    ///
    /// Returns [`EngineStopped`] after the engine was shut down.
    pub async fn request_refresh(&self) -> Result<(), EngineStopped> {
        self.refresh.request_refresh().await
    }
}

/// Observable engine counters.
#[derive(Debug, Default)]
struct EngineStats {
    /// Triggers processed by the worker (all kinds except shutdown).
    triggers: AtomicU64,

    /// Refresh requests processed.
    refreshes: AtomicU64,

    /// Recomputes that ran to completion and published a result.
    recomputes: AtomicU64,

    /// Change batches discarded because they referenced invalid files.
    dropped_batches: AtomicU64,
}

struct EngineInner {
    index: Arc<dyn MarkerIndex>,
    cache: DefinitionCache,
    epoch: AtomicU64,
    registry: ConsumerRegistry,
    last_published: ArcSwapOption<CountsUpdate>,
    stats: EngineStats,
}

impl EngineInner {
    /// Runs one recompute cycle and publishes the result.
    ///
    /// Collaborator failures abort the cycle: the previously published
    /// result stays in place and the condition is logged.
    fn recompute(&self) {
        let epoch = self.epoch.load(Ordering::SeqCst);

        let definitions = match self.cache.get(epoch) {
            Ok(definitions) => definitions,
            Err(error) => {
                warn!(error = %error, "Settings unavailable, keeping previous counts");
                return;
            }
        };

        let update = match definitions {
            Some(definitions) if !definitions.is_empty() => {
                let snapshot = match self.index.snapshot() {
                    Ok(snapshot) => snapshot,
                    Err(error) => {
                        warn!(error = %error, "Marker index unavailable, keeping previous counts");
                        return;
                    }
                };
                trace!(
                    definitions = definitions.len(),
                    files = snapshot.file_count(),
                    markers = snapshot.marker_count(),
                    "Recounting markers"
                );
                CountsUpdate::Counts(accumulate(&definitions, &snapshot))
            }
            _ => CountsUpdate::NoData,
        };

        let update = Arc::new(update);
        self.last_published.store(Some(Arc::clone(&update)));
        let delivered = self.registry.deliver(&update);
        self.stats.recomputes.fetch_add(1, Ordering::SeqCst);
        debug!(epoch, delivered, "Recompute published");
    }
}

/// The reactive marker-count engine.
///
/// See the [module docs](self) for the architecture. Create with
/// [`new`](Self::new) inside a tokio runtime, register consumers, and call
/// [`shutdown`](Self::shutdown) on teardown. There is no recompute at
/// construction; the first published result follows the first trigger.
pub struct CountEngine {
    inner: Arc<EngineInner>,
    trigger_tx: mpsc::Sender<Trigger>,
    worker: Mutex<Option<JoinHandle<()>>>,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
}

impl CountEngine {
    /// Creates the engine and starts its background tasks.
    ///
    /// Subscriptions to the index and settings store are taken before this
    /// returns, so no change fired afterwards is missed.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new(index: Arc<dyn MarkerIndex>, settings: Arc<dyn SettingsStore>) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_CHANNEL_CAPACITY);

        let inner = Arc::new(EngineInner {
            cache: DefinitionCache::new(Arc::clone(&settings)),
            index: Arc::clone(&index),
            epoch: AtomicU64::new(0),
            registry: ConsumerRegistry::new(),
            last_published: ArcSwapOption::const_empty(),
            stats: EngineStats::default(),
        });

        // Subscribe before spawning so nothing slips between construction
        // and the forwarder loops starting.
        let index_rx = index.subscribe();
        let settings_rx = settings.subscribe();

        let forwarders = vec![
            tokio::spawn(forward_file_changes(
                index_rx,
                Arc::clone(&inner),
                trigger_tx.clone(),
            )),
            tokio::spawn(forward_settings_changes(
                settings_rx,
                Arc::clone(&inner),
                trigger_tx.clone(),
            )),
        ];

        let worker = tokio::spawn(run_worker(trigger_rx, Arc::clone(&inner)));

        info!("Count engine started");

        Self {
            inner,
            trigger_tx,
            worker: Mutex::new(Some(worker)),
            forwarders: Mutex::new(forwarders),
        }
    }

    /// Registers a consumer and returns its registration.
    ///
    /// The engine keeps only a weak reference to the consumer. Every
    /// published result is delivered to all registered consumers exactly
    /// once per trigger, in registration order.
    pub fn register<C>(&self, consumer: &Arc<C>) -> ConsumerRegistration
    where
        C: CountConsumer + 'static,
    {
        let id = self.inner.registry.register(consumer);
        ConsumerRegistration {
            id,
            refresh: RefreshHandle {
                trigger_tx: self.trigger_tx.clone(),
            },
        }
    }

    /// Removes a consumer registration.
    pub fn unregister(&self, id: ConsumerId) {
        self.inner.registry.unregister(id);
    }

    /// The most recently published result, if any trigger has fired yet.
    #[must_use]
    pub fn last_result(&self) -> Option<Arc<CountsUpdate>> {
        self.inner.last_published.load_full()
    }

    /// Number of triggers the worker has processed.
    #[must_use]
    pub fn trigger_count(&self) -> u64 {
        self.inner.stats.triggers.load(Ordering::SeqCst)
    }

    /// Number of refresh requests processed.
    #[must_use]
    pub fn refresh_request_count(&self) -> u64 {
        self.inner.stats.refreshes.load(Ordering::SeqCst)
    }

    /// Number of recomputes that published a result.
    #[must_use]
    pub fn recompute_count(&self) -> u64 {
        self.inner.stats.recomputes.load(Ordering::SeqCst)
    }

    /// Number of change batches discarded for referencing invalid files.
    #[must_use]
    pub fn dropped_batch_count(&self) -> u64 {
        self.inner.stats.dropped_batches.load(Ordering::SeqCst)
    }

    /// Stops the engine.
    ///
    /// Detaches the index and settings subscriptions, discards queued
    /// triggers, and waits for the worker to finish any recompute already
    /// in flight. Refresh handles fail with [`EngineStopped`] afterwards.
    pub async fn shutdown(&self) {
        for handle in self.forwarders.lock().unwrap_or_else(|p| p.into_inner()).drain(..) {
            handle.abort();
        }

        let _ = self.trigger_tx.send(Trigger::Shutdown).await;

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }

        info!("Count engine stopped");
    }
}

impl Drop for CountEngine {
    fn drop(&mut self) {
        for handle in self.forwarders.lock().unwrap_or_else(|p| p.into_inner()).drain(..) {
            handle.abort();
        }
        if let Some(worker) = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take() {
            worker.abort();
        }
    }
}

/// Forwards validated file-change batches into the trigger channel.
///
/// A batch referencing any file the index no longer considers valid is
/// discarded whole: no recompute runs for it, and the previously published
/// counts stay in place.
async fn forward_file_changes(
    mut rx: tokio::sync::broadcast::Receiver<FileChangeBatch>,
    inner: Arc<EngineInner>,
    trigger_tx: mpsc::Sender<Trigger>,
) {
    loop {
        match rx.recv().await {
            Ok(batch) => {
                if batch.files.iter().all(|file| inner.index.is_valid(file)) {
                    if trigger_tx.send(Trigger::FilesChanged(batch)).await.is_err() {
                        break;
                    }
                } else {
                    inner.stats.dropped_batches.fetch_add(1, Ordering::SeqCst);
                    debug!(
                        files = batch.files.len(),
                        "Discarding change batch with invalid file references"
                    );
                }
            }
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "Missed file-change notifications, forcing recount");
                if trigger_tx.send(Trigger::CatchUp).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("File-change forwarder stopped");
}

/// Forwards settings-change notifications, bumping the cache epoch first.
///
/// The epoch advance must happen before the trigger is enqueued so the
/// recompute that follows can never serve a memo taken before the change.
async fn forward_settings_changes(
    mut rx: tokio::sync::broadcast::Receiver<()>,
    inner: Arc<EngineInner>,
    trigger_tx: mpsc::Sender<Trigger>,
) {
    loop {
        match rx.recv().await {
            Ok(()) => {
                inner.epoch.fetch_add(1, Ordering::SeqCst);
                if trigger_tx.send(Trigger::ConfigChanged).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "Missed settings notifications, invalidating cache");
                inner.epoch.fetch_add(1, Ordering::SeqCst);
                if trigger_tx.send(Trigger::ConfigChanged).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("Settings forwarder stopped");
}

/// Drains the trigger channel, one recompute per coalesced group.
async fn run_worker(mut rx: mpsc::Receiver<Trigger>, inner: Arc<EngineInner>) {
    'outer: while let Some(trigger) = rx.recv().await {
        if matches!(trigger, Trigger::Shutdown) {
            break;
        }
        record_trigger(&inner, &trigger);

        // Coalesce whatever queued up while we were idle or recomputing;
        // one recount covers them all since it reads the latest state.
        let mut coalesced = 0_u64;
        while let Ok(next) = rx.try_recv() {
            if matches!(next, Trigger::Shutdown) {
                break 'outer;
            }
            record_trigger(&inner, &next);
            coalesced += 1;
        }
        if coalesced > 0 {
            debug!(coalesced, "Coalesced queued triggers into one recompute");
        }

        inner.recompute();
    }
    debug!("Trigger worker stopped");
}

fn record_trigger(inner: &EngineInner, trigger: &Trigger) {
    inner.stats.triggers.fetch_add(1, Ordering::SeqCst);
    match trigger {
        Trigger::FilesChanged(batch) => {
            trace!(files = batch.files.len(), "File-change trigger");
        }
        Trigger::ConfigChanged => trace!("Configuration-change trigger"),
        Trigger::Refresh => {
            inner.stats.refreshes.fetch_add(1, Ordering::SeqCst);
            trace!("Refresh trigger");
        }
        Trigger::CatchUp => trace!("Catch-up trigger"),
        Trigger::Shutdown => {}
    }
}
