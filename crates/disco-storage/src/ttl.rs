use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use disco_types::Clock;

use crate::traits::LocalStore;

/// Periodically evicts expired entries and aged-out tombstones from a
/// [`LocalStore`].
///
/// Expired entries are already invisible to readers; the sweep only bounds
/// memory and disk usage.
pub struct ExpirySweep<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    tombstone_max_age: Duration,
}

impl<S: LocalStore> ExpirySweep<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        tombstone_max_age: Duration,
    ) -> Self {
        ExpirySweep { store, clock, interval, tombstone_max_age }
    }

    /// One pass over the store. Returns the number of entries removed.
    pub async fn sweep_once(&self) -> usize {
        let now = self.clock.now_ms();
        let max_age_ms = self.tombstone_max_age.as_millis() as u64;
        match self.store.remove_expired(now, max_age_ms).await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::debug!(removed, "expiry sweep evicted entries");
                }
                removed
            }
            Err(e) => {
                tracing::warn!(error = %e, "expiry sweep failed");
                0
            }
        }
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }
    }
}
