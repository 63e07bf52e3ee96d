//! Service-registry views over replicated stores.
//!
//! [`DynamicStore`] holds announcements from running nodes and lets them
//! expire; [`StaticStore`] holds manually registered services durably.

pub mod dynamic;
pub mod service;
pub mod static_store;

pub use dynamic::DynamicStore;
pub use service::{
    placeholder_location, DynamicAnnouncement, DynamicServiceAnnouncement, Service,
    StaticAnnouncement,
};
pub use static_store::StaticStore;

/// Name of the replicated store backing [`DynamicStore`].
pub const DYNAMIC_STORE: &str = "dynamic";
/// Name of the replicated store backing [`StaticStore`].
pub const STATIC_STORE: &str = "static";

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::sync::Arc;

    use disco_replication::{DistributedStore, RemoteStore, StaticPeers, StoreConfig};
    use disco_storage::{InMemoryStore, PersistentStore};
    use disco_types::{Clock, DiscoError, Entry, PeerEndpoint, SystemClock};

    /// Transport for single-node tests; there are never any peers to call.
    pub struct NoRemote;

    impl RemoteStore for NoRemote {
        async fn push(&self, _: &str, _: Vec<Entry>, peer: &PeerEndpoint) -> Result<(), DiscoError> {
            Err(DiscoError::Transport(format!("no transport to {peer}")))
        }

        async fn pull_all(&self, _: &str, peer: &PeerEndpoint) -> Result<Vec<Entry>, DiscoError> {
            Err(DiscoError::Transport(format!("no transport to {peer}")))
        }
    }

    pub type TestStore = DistributedStore<InMemoryStore, NoRemote, StaticPeers>;
    pub type DurableTestStore = DistributedStore<PersistentStore, NoRemote, StaticPeers>;

    pub fn local_store(name: &str, clock: Arc<dyn Clock>) -> Arc<TestStore> {
        DistributedStore::start(
            name,
            "test-node",
            Arc::new(InMemoryStore::new()),
            Arc::new(NoRemote),
            Arc::new(StaticPeers::default()),
            clock,
            StoreConfig::default(),
        )
    }

    pub fn durable_store(path: &Path) -> Arc<DurableTestStore> {
        DistributedStore::start(
            super::STATIC_STORE,
            "test-node",
            Arc::new(PersistentStore::open(path).unwrap()),
            Arc::new(NoRemote),
            Arc::new(StaticPeers::default()),
            Arc::new(SystemClock),
            StoreConfig::default(),
        )
    }
}
