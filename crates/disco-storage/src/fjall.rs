use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use disco_types::{DiscoError, Entry};

use crate::traits::{is_collectable, LocalStore};

fn encode<T: serde::Serialize>(val: &T) -> Result<Vec<u8>, DiscoError> {
    bincode::serde::encode_to_vec(val, bincode::config::standard())
        .map_err(|e| DiscoError::Storage(e.to_string()))
}

fn decode<T: for<'de> serde::Deserialize<'de>>(bytes: &[u8]) -> Result<T, DiscoError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(v, _)| v)
        .map_err(|e| DiscoError::Storage(e.to_string()))
}

fn fjall_err(e: fjall::Error) -> DiscoError {
    DiscoError::Storage(e.to_string())
}

fn join_err(e: tokio::task::JoinError) -> DiscoError {
    DiscoError::Storage(e.to_string())
}

/// Undecodable rows count as collectable; they would otherwise fail every
/// `get_all`.
fn collectable_row(bytes: &[u8], now_ms: i64, tombstone_max_age_ms: u64) -> bool {
    decode::<Entry>(bytes).map_or(true, |entry| is_collectable(&entry, now_ms, tombstone_max_age_ms))
}

// ---------------------------------------------------------------------------
// FjallStore, the shared database handle
// ---------------------------------------------------------------------------

/// Shared storage handle for one named store.
pub struct FjallStore {
    pub db: fjall::Database,
    /// `entry.key` → bincode(Entry)
    pub entries: fjall::Keyspace,
    /// Serializes mutations so the sweep never removes a row rewritten
    /// after it was selected.
    writes: Mutex<()>,
}

impl FjallStore {
    /// Open (or create) a `FjallStore` at `path`.
    pub fn open(path: &Path) -> Result<Arc<Self>, DiscoError> {
        let db = fjall::Database::builder(path).open().map_err(fjall_err)?;
        let entries =
            db.keyspace("entries", fjall::KeyspaceCreateOptions::default).map_err(fjall_err)?;
        Ok(Arc::new(FjallStore { db, entries, writes: Mutex::new(()) }))
    }

    fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Keys that are collectable or undecodable at `now_ms`.
    fn sweep_candidates(
        &self,
        now_ms: i64,
        tombstone_max_age_ms: u64,
    ) -> Result<Vec<Vec<u8>>, DiscoError> {
        let mut candidates = Vec::new();
        for guard in self.entries.iter() {
            let (k, v) = guard.into_inner().map_err(fjall_err)?;
            if collectable_row(&v, now_ms, tombstone_max_age_ms) {
                candidates.push(k.to_vec());
            }
        }
        Ok(candidates)
    }

    /// Remove the candidates that are still collectable, re-reading each one
    /// under the write lock.
    fn remove_candidates(
        &self,
        candidates: Vec<Vec<u8>>,
        now_ms: i64,
        tombstone_max_age_ms: u64,
    ) -> Result<usize, DiscoError> {
        if candidates.is_empty() {
            return Ok(0);
        }
        let _writes = self.write_lock();
        let mut batch = self.db.batch();
        let mut removed = 0;
        for k in candidates {
            let still = match self.entries.get(&k).map_err(fjall_err)? {
                Some(v) => match decode::<Entry>(&v) {
                    Ok(entry) => is_collectable(&entry, now_ms, tombstone_max_age_ms),
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping undecodable entry");
                        true
                    }
                },
                None => false,
            };
            if still {
                batch.remove(&self.entries, k);
                removed += 1;
            }
        }
        if removed == 0 {
            return Ok(0);
        }
        batch.commit().map_err(fjall_err)?;
        self.sync()?;
        Ok(removed)
    }

    /// Flush the journal to disk before acknowledging a write.
    fn sync(&self) -> Result<(), DiscoError> {
        self.db.persist(fjall::PersistMode::SyncAll).map_err(fjall_err)
    }
}

// ---------------------------------------------------------------------------
// PersistentStore
// ---------------------------------------------------------------------------

/// Durable `LocalStore` backed by fjall. Used for the static store.
///
/// All blocking I/O is wrapped in `tokio::task::spawn_blocking`.
pub struct PersistentStore(pub Arc<FjallStore>);

impl PersistentStore {
    pub fn open(path: &Path) -> Result<Self, DiscoError> {
        FjallStore::open(path).map(PersistentStore)
    }
}

impl LocalStore for PersistentStore {
    async fn put(&self, entry: Entry) -> Result<(), DiscoError> {
        let store = self.0.clone();
        tokio::task::spawn_blocking(move || -> Result<(), DiscoError> {
            let bytes = encode(&entry)?;
            let _writes = store.write_lock();
            store.entries.insert(entry.key.as_slice(), bytes).map_err(fjall_err)?;
            store.sync()
        })
        .await
        .map_err(join_err)?
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Entry>, DiscoError> {
        let store = self.0.clone();
        let key = key.to_vec();
        tokio::task::spawn_blocking(move || -> Result<Option<Entry>, DiscoError> {
            match store.entries.get(&key).map_err(fjall_err)? {
                Some(b) => Ok(Some(decode::<Entry>(&b)?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(join_err)?
    }

    async fn get_all(&self) -> Result<Vec<Entry>, DiscoError> {
        let store = self.0.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Entry>, DiscoError> {
            store
                .entries
                .iter()
                .map(|g| g.into_inner().map_err(fjall_err).and_then(|(_, v)| decode::<Entry>(&v)))
                .collect()
        })
        .await
        .map_err(join_err)?
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, DiscoError> {
        let store = self.0.clone();
        let key = key.to_vec();
        tokio::task::spawn_blocking(move || -> Result<bool, DiscoError> {
            let _writes = store.write_lock();
            let found = store.entries.get(&key).map_err(fjall_err)?.is_some();
            if found {
                store.entries.remove(key).map_err(fjall_err)?;
                store.sync()?;
            }
            Ok(found)
        })
        .await
        .map_err(join_err)?
    }

    async fn remove_expired(
        &self,
        now_ms: i64,
        tombstone_max_age_ms: u64,
    ) -> Result<usize, DiscoError> {
        let store = self.0.clone();
        tokio::task::spawn_blocking(move || -> Result<usize, DiscoError> {
            let candidates = store.sweep_candidates(now_ms, tombstone_max_age_ms)?;
            store.remove_candidates(candidates, now_ms, tombstone_max_age_ms)
        })
        .await
        .map_err(join_err)?
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(key: &str, value: Option<&str>, timestamp_ms: i64) -> Entry {
        Entry {
            key: key.as_bytes().to_vec(),
            value: value.map(|v| v.as_bytes().to_vec()),
            version: 1,
            origin: "n1".into(),
            timestamp_ms,
            max_age_ms: None,
        }
    }

    #[tokio::test]
    async fn put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();

        assert!(store.get(b"a").await.unwrap().is_none());
        store.put(make_entry("a", Some("1"), 10)).await.unwrap();
        let e = store.get(b"a").await.unwrap().unwrap();
        assert_eq!(e, make_entry("a", Some("1"), 10));

        assert!(store.delete(b"a").await.unwrap());
        assert!(!store.delete(b"a").await.unwrap());
        assert!(store.get(b"a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_all_returns_every_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();
        for i in 0..5 {
            store.put(make_entry(&format!("k{i}"), Some("v"), i)).await.unwrap();
        }
        store.put(make_entry("gone", None, 0)).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(all.iter().filter(|e| e.is_tombstone()).count(), 1);
    }

    #[tokio::test]
    async fn durability_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PersistentStore::open(dir.path()).unwrap();
            store.put(make_entry("x", Some("persist"), 42)).await.unwrap();
        }
        let store = PersistentStore::open(dir.path()).unwrap();
        let e = store.get(b"x").await.unwrap().unwrap();
        assert_eq!(e.value.as_deref(), Some(&b"persist"[..]));
        assert_eq!(e.timestamp_ms, 42);
    }

    #[tokio::test]
    async fn remove_expired_drops_old_tombstones_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();
        store.put(make_entry("live", Some("v"), 0)).await.unwrap();
        store.put(make_entry("old", None, 0)).await.unwrap();
        store.put(make_entry("fresh", None, 900)).await.unwrap();

        assert_eq!(store.remove_expired(1_000, 500).await.unwrap(), 1);
        assert!(store.get(b"old").await.unwrap().is_none());
        assert!(store.get(b"fresh").await.unwrap().is_some());
        assert!(store.get(b"live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sweep_keeps_rows_rewritten_after_selection() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();
        store.put(make_entry("old", None, 0)).await.unwrap();
        store.put(make_entry("gone", None, 0)).await.unwrap();

        let candidates = store.0.sweep_candidates(1_000, 500).unwrap();
        assert_eq!(candidates.len(), 2);

        // A newer tombstone lands between selection and removal.
        store.put(make_entry("old", None, 950)).await.unwrap();
        assert_eq!(store.0.remove_candidates(candidates, 1_000, 500).unwrap(), 1);

        assert_eq!(store.get(b"old").await.unwrap().unwrap().timestamp_ms, 950);
        assert!(store.get(b"gone").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_puts() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PersistentStore::open(dir.path()).unwrap());

        let mut handles = Vec::new();
        for i in 0i64..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.put(make_entry(&format!("k{i}"), Some("v"), i)).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        for i in 0i64..20 {
            let e = store.get(format!("k{i}").as_bytes()).await.unwrap().unwrap();
            assert_eq!(e.timestamp_ms, i);
        }
    }
}
