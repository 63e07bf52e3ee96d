use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use disco_proto::v1::{
    replication_service_client::ReplicationServiceClient, PullAllRequest, PushRequest,
};
use disco_replication::RemoteStore;
use disco_types::{DiscoError, Entry, PeerEndpoint};
use tonic::transport::{Channel, Endpoint};

use crate::convert::{entry_from_proto, entry_to_proto};

/// [`RemoteStore`] over the `ReplicationService` gRPC API.
///
/// Keeps one lazily connected channel per peer; a channel reconnects on its
/// own after the peer comes back.
pub struct GrpcRemoteStore {
    connect_timeout: Duration,
    channels: Mutex<HashMap<PeerEndpoint, Channel>>,
}

impl GrpcRemoteStore {
    pub fn new(connect_timeout: Duration) -> Self {
        GrpcRemoteStore { connect_timeout, channels: Mutex::new(HashMap::new()) }
    }

    fn client(&self, peer: &PeerEndpoint) -> Result<ReplicationServiceClient<Channel>, DiscoError> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(channel) = channels.get(peer) {
            return Ok(ReplicationServiceClient::new(channel.clone()));
        }
        let channel = Endpoint::from_shared(peer.clone())
            .map_err(|e| DiscoError::InvalidArgument(format!("peer endpoint '{peer}': {e}")))?
            .connect_timeout(self.connect_timeout)
            .connect_lazy();
        channels.insert(peer.clone(), channel.clone());
        Ok(ReplicationServiceClient::new(channel))
    }
}

fn transport_err(peer: &PeerEndpoint, status: tonic::Status) -> DiscoError {
    DiscoError::Transport(format!("{peer}: {}", status.message()))
}

impl RemoteStore for GrpcRemoteStore {
    async fn push(
        &self,
        store: &str,
        entries: Vec<Entry>,
        peer: &PeerEndpoint,
    ) -> Result<(), DiscoError> {
        let mut client = self.client(peer)?;
        let resp = client
            .push(PushRequest {
                store: store.to_string(),
                entries: entries.into_iter().map(entry_to_proto).collect(),
            })
            .await
            .map_err(|s| transport_err(peer, s))?
            .into_inner();
        if resp.rejected > 0 {
            tracing::warn!(%peer, store, rejected = resp.rejected, "peer rejected pushed entries");
        }
        Ok(())
    }

    async fn pull_all(&self, store: &str, peer: &PeerEndpoint) -> Result<Vec<Entry>, DiscoError> {
        let mut client = self.client(peer)?;
        let resp = client
            .pull_all(PullAllRequest { store: store.to_string() })
            .await
            .map_err(|s| transport_err(peer, s))?
            .into_inner();
        Ok(resp.entries.into_iter().map(entry_from_proto).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_endpoint_is_invalid_argument() {
        let remote = GrpcRemoteStore::new(Duration::from_millis(100));
        let err = remote.pull_all("dynamic", &"not a uri".to_string()).await.unwrap_err();
        assert!(matches!(err, DiscoError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn unreachable_peer_is_transport_error() {
        // Reserve a port, then free it so nothing is listening there.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let remote = GrpcRemoteStore::new(Duration::from_millis(100));
        let err = remote.push("dynamic", vec![], &peer).await.unwrap_err();
        assert!(matches!(err, DiscoError::Transport(_)));
        assert_eq!(remote.channels.lock().unwrap().len(), 1);
    }
}
