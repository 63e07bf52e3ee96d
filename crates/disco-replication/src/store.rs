use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::{mpsc, watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use disco_storage::{ExpirySweep, LocalStore};
use disco_types::{Clock, DiscoError, Entry, NodeId, PeerEndpoint};

use crate::remote::{PeerSource, RemoteStore};
use crate::resolver::resolve;
use crate::ReplicatedStore;

/// Number of key-hashed write locks per store.
const LOCK_STRIPES: usize = 64;

/// Tunables for one [`DistributedStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How often one random peer is pulled and merged.
    pub anti_entropy_interval: Duration,
    /// Upper bound on a single push or pull.
    pub peer_timeout: Duration,
    /// Maximum entries per outbound push.
    pub max_batch_size: usize,
    /// Outbound queue capacity; writes beyond it are left to anti-entropy.
    pub queue_size: usize,
    /// Tombstones older than this are physically removed.
    pub tombstone_max_age: Duration,
    /// Interval of the expiry/tombstone sweep.
    pub gc_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            anti_entropy_interval: Duration::from_secs(60),
            peer_timeout: Duration::from_secs(5),
            max_batch_size: 1000,
            queue_size: 1000,
            tombstone_max_age: Duration::from_secs(24 * 60 * 60),
            gc_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Result of reconciling a batch of peer entries.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Entries that won and were written locally.
    pub applied: usize,
    /// Entries that lost to the local copy, or arrived already expired.
    pub ignored: usize,
    /// Structurally invalid entries.
    pub rejected: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeerHealth {
    Reachable,
    Unreachable,
}

// ---------------------------------------------------------------------------
// Shared state, owned jointly by the store handle and its background tasks
// ---------------------------------------------------------------------------

struct Shared<S, R, P> {
    name: String,
    node_id: NodeId,
    local: Arc<S>,
    remote: Arc<R>,
    peers: Arc<P>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
    stripes: Box<[Mutex<()>]>,
    health: std::sync::Mutex<HashMap<PeerEndpoint, PeerHealth>>,
}

impl<S: LocalStore, R: RemoteStore, P: PeerSource> Shared<S, R, P> {
    /// Serialises read-resolve-write cycles on the same key.
    async fn lock_key(&self, key: &[u8]) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.stripes.len();
        self.stripes[idx].lock().await
    }

    async fn merge_entries(&self, entries: Vec<Entry>) -> Result<MergeOutcome, DiscoError> {
        let mut outcome = MergeOutcome::default();
        let now = self.clock.now_ms();

        for entry in entries {
            if let Err(e) = entry.validate() {
                tracing::warn!(store = %self.name, error = %e, "rejecting malformed entry");
                outcome.rejected += 1;
                continue;
            }
            if !entry.is_tombstone() && entry.is_expired(now) {
                outcome.ignored += 1;
                continue;
            }

            let _guard = self.lock_key(&entry.key).await;
            let existing = self.local.get(&entry.key).await?;
            let winner = resolve(existing.as_ref(), &entry);
            if existing.as_ref() == Some(&winner) {
                outcome.ignored += 1;
                continue;
            }
            self.local.put(winner).await?;
            outcome.applied += 1;
        }
        Ok(outcome)
    }

    async fn sync_with(&self, peer: &PeerEndpoint) -> Result<MergeOutcome, DiscoError> {
        let pulled =
            tokio::time::timeout(self.config.peer_timeout, self.remote.pull_all(&self.name, peer))
                .await
                .map_err(|_| DiscoError::Timeout)
                .and_then(|r| r);
        self.record_peer(peer, pulled.is_ok());
        self.merge_entries(pulled?).await
    }

    async fn anti_entropy_round(&self) -> Option<MergeOutcome> {
        let peer = self.peers.current_peers().choose(&mut rand::thread_rng())?.clone();
        match self.sync_with(&peer).await {
            Ok(outcome) => {
                tracing::debug!(
                    store = %self.name,
                    %peer,
                    applied = outcome.applied,
                    ignored = outcome.ignored,
                    rejected = outcome.rejected,
                    "anti-entropy round complete"
                );
                Some(outcome)
            }
            Err(e) => {
                tracing::debug!(store = %self.name, %peer, error = %e, "anti-entropy pull failed");
                None
            }
        }
    }

    /// Push `batch` to every current peer without waiting for any of them.
    fn fan_out(self: &Arc<Self>, batch: Arc<[Entry]>) {
        for peer in self.peers.current_peers() {
            let shared = self.clone();
            let batch = batch.clone();
            tokio::spawn(async move {
                let push = shared.remote.push(&shared.name, batch.to_vec(), &peer);
                let result = tokio::time::timeout(shared.config.peer_timeout, push)
                    .await
                    .map_err(|_| DiscoError::Timeout)
                    .and_then(|r| r);
                if let Err(ref e) = result {
                    tracing::debug!(
                        store = %shared.name,
                        %peer,
                        entries = batch.len(),
                        error = %e,
                        "push failed"
                    );
                }
                shared.record_peer(&peer, result.is_ok());
            });
        }
    }

    /// Log reachability transitions; no state beyond "try again next cycle".
    fn record_peer(&self, peer: &PeerEndpoint, ok: bool) {
        let next = if ok { PeerHealth::Reachable } else { PeerHealth::Unreachable };
        let prev = self
            .health
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(peer.clone(), next);
        match (prev, next) {
            (Some(PeerHealth::Unreachable), PeerHealth::Reachable) => {
                tracing::info!(store = %self.name, %peer, "peer reachable again");
            }
            (Some(PeerHealth::Reachable) | None, PeerHealth::Unreachable) => {
                tracing::warn!(store = %self.name, %peer, "peer unreachable");
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

async fn run_replicator<S: LocalStore, R: RemoteStore, P: PeerSource>(
    shared: Arc<Shared<S, R, P>>,
    mut outbound: mpsc::Receiver<Entry>,
    mut shutdown: watch::Receiver<bool>,
) {
    let limit = shared.config.max_batch_size.max(1);
    let mut buf = Vec::with_capacity(limit);
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            received = outbound.recv_many(&mut buf, limit) => {
                if received == 0 {
                    break;
                }
                let batch: Arc<[Entry]> = std::mem::take(&mut buf).into();
                shared.fan_out(batch);
            }
        }
    }
}

async fn run_anti_entropy<S: LocalStore, R: RemoteStore, P: PeerSource>(
    shared: Arc<Shared<S, R, P>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(shared.config.anti_entropy_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                shared.anti_entropy_round().await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DistributedStore
// ---------------------------------------------------------------------------

/// One named store replicated peer-to-peer.
///
/// Writes are committed to the local engine and acknowledged before any peer
/// is contacted. Propagation is a best-effort push per write plus a periodic
/// anti-entropy pull from one random peer, which is what guarantees
/// convergence.
pub struct DistributedStore<S, R, P> {
    shared: Arc<Shared<S, R, P>>,
    outbound: mpsc::Sender<Entry>,
    shutdown: watch::Sender<bool>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl<S: LocalStore, R: RemoteStore, P: PeerSource> DistributedStore<S, R, P> {
    /// Build the store and spawn its replicator, anti-entropy and expiry
    /// tasks on the current tokio runtime.
    pub fn start(
        name: impl Into<String>,
        node_id: impl Into<NodeId>,
        local: Arc<S>,
        remote: Arc<R>,
        peers: Arc<P>,
        clock: Arc<dyn Clock>,
        config: StoreConfig,
    ) -> Arc<Self> {
        let shared = Arc::new(Shared {
            name: name.into(),
            node_id: node_id.into(),
            local,
            remote,
            peers,
            clock,
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            health: std::sync::Mutex::new(HashMap::new()),
            config,
        });

        let (outbound_tx, outbound_rx) = mpsc::channel(shared.config.queue_size.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sweep = ExpirySweep::new(
            shared.local.clone(),
            shared.clock.clone(),
            shared.config.gc_interval,
            shared.config.tombstone_max_age,
        );
        let tasks = vec![
            tokio::spawn(run_replicator(shared.clone(), outbound_rx, shutdown_rx.clone())),
            tokio::spawn(run_anti_entropy(shared.clone(), shutdown_rx.clone())),
            tokio::spawn(sweep.run(shutdown_rx)),
        ];

        tracing::info!(store = %shared.name, node_id = %shared.node_id, "distributed store started");

        Arc::new(DistributedStore {
            shared,
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            tasks: std::sync::Mutex::new(tasks),
        })
    }

    /// Signal every background task to stop and wait for them to exit.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let handles = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!(store = %self.shared.name, "distributed store stopped");
    }

    /// Pull `peer`'s full state and merge it, outside the regular schedule.
    pub async fn sync_with(&self, peer: &PeerEndpoint) -> Result<MergeOutcome, DiscoError> {
        self.shared.sync_with(peer).await
    }

    /// Run one anti-entropy round now. `None` if there was no peer or the
    /// pull failed.
    pub async fn anti_entropy_round(&self) -> Option<MergeOutcome> {
        self.shared.anti_entropy_round().await
    }

    /// Local read-resolve-write. Returns the stored entry and its predecessor.
    async fn write(
        &self,
        key: &[u8],
        value: Option<Vec<u8>>,
        max_age: Option<Duration>,
    ) -> Result<(Entry, Option<Entry>), DiscoError> {
        let shared = &self.shared;
        let (winner, entry, previous) = {
            let _guard = shared.lock_key(key).await;
            let previous = shared.local.get(key).await?;
            let now = shared.clock.now_ms();
            // Stay ahead of whatever is known locally under both the version
            // and the timestamp rule. Versions are floored at the wall clock so
            // a volatile node restarting under the same id still outranks the
            // entries it wrote before the restart.
            let floor = u64::try_from(now).unwrap_or(0);
            let entry = Entry {
                key: key.to_vec(),
                value,
                version: previous.as_ref().map_or(1, |p| p.version.saturating_add(1)).max(floor),
                origin: shared.node_id.clone(),
                timestamp_ms: previous
                    .as_ref()
                    .map_or(now, |p| now.max(p.timestamp_ms.saturating_add(1))),
                max_age_ms: max_age.map(|d| d.as_millis() as u64),
            };
            let winner = resolve(previous.as_ref(), &entry);
            shared.local.put(winner.clone()).await?;
            (winner, entry, previous)
        };

        if winner == entry {
            self.enqueue(entry);
        }
        Ok((winner, previous))
    }

    fn enqueue(&self, entry: Entry) {
        match self.outbound.try_send(entry) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(entry)) => {
                tracing::warn!(
                    store = %self.shared.name,
                    key = %String::from_utf8_lossy(&entry.key),
                    "replication queue full, leaving entry to anti-entropy"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(store = %self.shared.name, "replicator stopped, not queueing");
            }
        }
    }
}

impl<S: LocalStore, R: RemoteStore, P: PeerSource> ReplicatedStore for DistributedStore<S, R, P> {
    fn name(&self) -> &str {
        &self.shared.name
    }

    async fn put(
        &self,
        key: &[u8],
        value: Vec<u8>,
        max_age: Option<Duration>,
    ) -> Result<Entry, DiscoError> {
        self.write(key, Some(value), max_age).await.map(|(entry, _)| entry)
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, DiscoError> {
        let (_, previous) = self.write(key, None, None).await?;
        let now = self.shared.clock.now_ms();
        Ok(previous.is_some_and(|p| p.is_live(now)))
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Entry>, DiscoError> {
        let now = self.shared.clock.now_ms();
        Ok(self.shared.local.get(key).await?.filter(|e| e.is_live(now)))
    }

    async fn get_all(&self) -> Result<Vec<Entry>, DiscoError> {
        let now = self.shared.clock.now_ms();
        let mut entries = self.shared.local.get_all().await?;
        entries.retain(|e| e.is_live(now));
        Ok(entries)
    }

    async fn merge(&self, entries: Vec<Entry>) -> Result<MergeOutcome, DiscoError> {
        self.shared.merge_entries(entries).await
    }

    async fn snapshot(&self) -> Result<Vec<Entry>, DiscoError> {
        self.shared.local.get_all().await
    }
}

impl<S, R, P> Drop for DistributedStore<S, R, P> {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
