use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use disco_types::{DiscoError, Entry};

use crate::traits::{is_collectable, LocalStore};

/// Volatile `LocalStore` backed by a `HashMap`.
///
/// Contents are lost on restart. Used for the dynamic store, where a crashed
/// node's announcements age out instead of being retracted.
pub struct InMemoryStore {
    inner: Arc<RwLock<HashMap<Vec<u8>, Entry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore { inner: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore for InMemoryStore {
    async fn put(&self, entry: Entry) -> Result<(), DiscoError> {
        self.inner.write().await.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Entry>, DiscoError> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Entry>, DiscoError> {
        Ok(self.inner.read().await.values().cloned().collect())
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, DiscoError> {
        Ok(self.inner.write().await.remove(key).is_some())
    }

    async fn remove_expired(
        &self,
        now_ms: i64,
        tombstone_max_age_ms: u64,
    ) -> Result<usize, DiscoError> {
        let mut g = self.inner.write().await;
        let before = g.len();
        g.retain(|_, e| !is_collectable(e, now_ms, tombstone_max_age_ms));
        Ok(before - g.len())
    }
}
