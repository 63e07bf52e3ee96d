use std::future::Future;

use disco_types::{DiscoError, Entry};

/// A single node's copy of one named store.
///
/// Methods use RPITIT (`-> impl Future + Send`) so that generic callers can
/// hold the futures across `.await` points on a multi-threaded runtime.
///
/// Engines store exactly what they are given: conflict resolution and
/// filtering of tombstones/expired entries happen in the replication layer.
pub trait LocalStore: Send + Sync + 'static {
    /// Insert or overwrite the entry stored under `entry.key`.
    ///
    /// Durable engines must not return before the write is on disk.
    fn put(&self, entry: Entry) -> impl Future<Output = Result<(), DiscoError>> + Send;

    /// Return the raw stored entry for `key`, tombstones included.
    fn get(&self, key: &[u8]) -> impl Future<Output = Result<Option<Entry>, DiscoError>> + Send;

    /// Return every stored entry, tombstones included, in no particular order.
    fn get_all(&self) -> impl Future<Output = Result<Vec<Entry>, DiscoError>> + Send;

    /// Physically remove `key`. Returns whether anything was stored.
    fn delete(&self, key: &[u8]) -> impl Future<Output = Result<bool, DiscoError>> + Send;

    /// Remove live entries whose TTL has elapsed at `now_ms`, and tombstones
    /// older than `tombstone_max_age_ms`. Returns the number removed.
    fn remove_expired(
        &self,
        now_ms: i64,
        tombstone_max_age_ms: u64,
    ) -> impl Future<Output = Result<usize, DiscoError>> + Send;
}

/// Shared eviction predicate for [`LocalStore::remove_expired`].
pub fn is_collectable(entry: &Entry, now_ms: i64, tombstone_max_age_ms: u64) -> bool {
    if entry.is_tombstone() {
        let age = now_ms.saturating_sub(entry.timestamp_ms);
        age >= 0 && age as u64 >= tombstone_max_age_ms
    } else {
        entry.is_expired(now_ms)
    }
}
