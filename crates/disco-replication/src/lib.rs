pub mod remote;
pub mod resolver;
pub mod store;

use std::future::Future;
use std::time::Duration;

use disco_types::{DiscoError, Entry};

pub use remote::{PeerSource, RemoteStore, StaticPeers};
pub use store::{DistributedStore, MergeOutcome, StoreConfig};

// ---------------------------------------------------------------------------
// ReplicatedStore trait
// Uses RPITIT (Return Position Impl Trait In Trait, stable since Rust 1.75).
// The explicit `+ Send` bound on each future lets generic callers such as the
// typed views and the gRPC services `.await` across thread boundaries.
// ---------------------------------------------------------------------------

pub trait ReplicatedStore: Send + Sync + 'static {
    /// Name of the store on the wire, e.g. `"dynamic"`.
    fn name(&self) -> &str;

    /// Write `value` under `key` locally and schedule propagation.
    /// Returns the entry as stored.
    fn put(
        &self,
        key: &[u8],
        value: Vec<u8>,
        max_age: Option<Duration>,
    ) -> impl Future<Output = Result<Entry, DiscoError>> + Send;

    /// Write a tombstone for `key`. Returns whether a live entry existed.
    fn delete(&self, key: &[u8]) -> impl Future<Output = Result<bool, DiscoError>> + Send;

    /// Live entry for `key`; tombstones and expired entries read as `None`.
    fn get(&self, key: &[u8]) -> impl Future<Output = Result<Option<Entry>, DiscoError>> + Send;

    /// Every live entry.
    fn get_all(&self) -> impl Future<Output = Result<Vec<Entry>, DiscoError>> + Send;

    /// Reconcile a batch received from a peer.
    fn merge(
        &self,
        entries: Vec<Entry>,
    ) -> impl Future<Output = Result<MergeOutcome, DiscoError>> + Send;

    /// Full local state, tombstones included, for anti-entropy pulls.
    fn snapshot(&self) -> impl Future<Output = Result<Vec<Entry>, DiscoError>> + Send;
}
