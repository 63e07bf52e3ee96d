use std::future::Future;
use std::sync::RwLock;

use disco_types::{DiscoError, Entry, PeerEndpoint};

/// Network transport to other nodes' copies of a named store.
///
/// Both calls are best-effort; the caller applies its own timeout and never
/// retries within a cycle.
pub trait RemoteStore: Send + Sync + 'static {
    /// Deliver `entries` to `peer`'s copy of `store`.
    fn push(
        &self,
        store: &str,
        entries: Vec<Entry>,
        peer: &PeerEndpoint,
    ) -> impl Future<Output = Result<(), DiscoError>> + Send;

    /// Fetch every entry, tombstones included, that `peer` holds for `store`.
    fn pull_all(
        &self,
        store: &str,
        peer: &PeerEndpoint,
    ) -> impl Future<Output = Result<Vec<Entry>, DiscoError>> + Send;
}

/// Supplies the replication peers currently known to this node.
///
/// The set may be empty and may change between calls.
pub trait PeerSource: Send + Sync + 'static {
    fn current_peers(&self) -> Vec<PeerEndpoint>;
}

/// A peer list that only changes when explicitly replaced.
#[derive(Debug, Default)]
pub struct StaticPeers {
    peers: RwLock<Vec<PeerEndpoint>>,
}

impl StaticPeers {
    pub fn new(peers: Vec<PeerEndpoint>) -> Self {
        StaticPeers { peers: RwLock::new(peers) }
    }

    pub fn replace(&self, peers: Vec<PeerEndpoint>) {
        *self.peers.write().unwrap_or_else(|e| e.into_inner()) = peers;
    }
}

impl PeerSource for StaticPeers {
    fn current_peers(&self) -> Vec<PeerEndpoint> {
        self.peers.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_peers_can_be_replaced() {
        let peers = StaticPeers::default();
        assert!(peers.current_peers().is_empty());

        peers.replace(vec!["http://a:1".into(), "http://b:1".into()]);
        assert_eq!(peers.current_peers().len(), 2);

        peers.replace(vec!["http://c:1".into()]);
        assert_eq!(peers.current_peers(), vec!["http://c:1".to_string()]);
    }
}
