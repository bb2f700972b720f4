//! Consumer registry and result fan-out.
//!
//! Anything that wants to render or forward counting results implements
//! [`CountConsumer`] and registers with the [`ConsumerRegistry`]. Every
//! recompute delivers the full [`CountsUpdate`] to every registered
//! consumer, synchronously and in registration order. No diffing is done on
//! this side; consumers that only care about changes deduplicate
//! themselves.
//!
//! # Lifetime
//!
//! The registry holds weak references: registering does not keep a consumer
//! alive, and a consumer that was dropped without unregistering is pruned
//! on the next delivery. Well-behaved consumers still call
//! [`unregister`](ConsumerRegistry::unregister) on teardown.
//!
//! # Failure isolation
//!
//! A delivery failure in one consumer is logged and does not prevent
//! delivery to the remaining consumers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, Weak};

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::counts::CountsUpdate;

/// Error a consumer can return when it fails to handle a delivered result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("consumer rejected update: {0}")]
pub struct DeliveryError(pub String);

/// A receiver of counting results.
///
/// Delivery happens on the engine's worker task; implementations should
/// hand the update off (to a channel, a render queue) rather than block.
pub trait CountConsumer: Send + Sync {
    /// Handles one published result.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if the update could not be handled; the
    /// failure is logged and delivery continues with other consumers.
    fn deliver(&self, update: &CountsUpdate) -> Result<(), DeliveryError>;
}

/// Identifier handed out at registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(u64);

/// Ordered registry of count consumers.
///
/// # Thread Safety
///
/// Registration and delivery can happen from different tasks; the
/// registration list sits behind a `RwLock` that is held only while
/// iterating, never across consumer callbacks' awaits (delivery is fully
/// synchronous).
pub struct ConsumerRegistry {
    entries: RwLock<Vec<Entry>>,
    next_id: AtomicU64,
}

struct Entry {
    id: ConsumerId,
    consumer: Weak<dyn CountConsumer>,
}

impl ConsumerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a consumer and returns its id.
    ///
    /// The registry keeps only a weak reference; the caller retains
    /// ownership of the consumer.
    pub fn register<C>(&self, consumer: &std::sync::Arc<C>) -> ConsumerId
    where
        C: CountConsumer + 'static,
    {
        let consumer: std::sync::Arc<dyn CountConsumer> = consumer.clone();
        let weak: Weak<dyn CountConsumer> = std::sync::Arc::downgrade(&consumer);
        let id = ConsumerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.push(Entry { id, consumer: weak });
        debug!(consumers = entries.len(), "Consumer registered");
        id
    }

    /// Removes a registration.
    ///
    /// Unknown ids are ignored, which makes teardown idempotent.
    pub fn unregister(&self, id: ConsumerId) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        if entries.len() < before {
            debug!(consumers = entries.len(), "Consumer unregistered");
        }
    }

    /// Returns the number of live registrations.
    ///
    /// Registrations whose consumer has been dropped still count until the
    /// next delivery prunes them.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Returns `true` if no consumers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers one result to every registered consumer in order.
    ///
    /// Dropped consumers are pruned; failing consumers are logged and
    /// skipped. Returns the number of consumers that received the update.
    pub fn deliver(&self, update: &CountsUpdate) -> usize {
        // Snapshot the registration list so consumer callbacks run without
        // the registry lock held.
        let entries: Vec<(ConsumerId, Weak<dyn CountConsumer>)> = {
            let entries = match self.entries.read() {
                Ok(entries) => entries,
                Err(poisoned) => poisoned.into_inner(),
            };
            entries
                .iter()
                .map(|entry| (entry.id, entry.consumer.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut dead = Vec::new();

        for (id, consumer) in entries {
            let Some(consumer) = consumer.upgrade() else {
                dead.push(id);
                continue;
            };
            match consumer.deliver(update) {
                Ok(()) => {
                    delivered += 1;
                    trace!(id = id.0, "Update delivered");
                }
                Err(error) => {
                    warn!(id = id.0, error = %error, "Consumer failed to handle update");
                }
            }
        }

        if !dead.is_empty() {
            let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
            entries.retain(|entry| !dead.contains(&entry.id));
            debug!(
                pruned = dead.len(),
                consumers = entries.len(),
                "Pruned dropped consumers"
            );
        }

        delivered
    }
}

impl Default for ConsumerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
