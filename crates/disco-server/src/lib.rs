mod convert;
mod discovery_service;
pub mod monitor;
mod remote;
mod replication_service;

use std::future::Future;
use std::net::SocketAddr;

use disco_proto::v1::{
    discovery_service_server::DiscoveryServiceServer,
    replication_service_server::ReplicationServiceServer,
};
use disco_replication::ReplicatedStore;
use tonic_reflection::server::Builder as ReflectionBuilder;

pub use discovery_service::DiscoveryServiceImpl;
pub use monitor::{DiscoveryEventType, DiscoveryStats};
pub use remote::GrpcRemoteStore;
pub use replication_service::ReplicationServiceImpl;

/// Serve the announcement and query API until `shutdown` resolves.
pub async fn serve_client<Dy, St>(
    addr: SocketAddr,
    discovery: DiscoveryServiceImpl<Dy, St>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()>
where
    Dy: ReplicatedStore,
    St: ReplicatedStore,
{
    let reflection = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(disco_proto::FILE_DESCRIPTOR_SET)
        .build_v1()?;
    tracing::info!(%addr, "client gRPC server starting");
    tonic::transport::Server::builder()
        .add_service(DiscoveryServiceServer::new(discovery))
        .add_service(reflection)
        .serve_with_shutdown(addr, shutdown)
        .await
        .map_err(Into::into)
}

/// Serve peer replication until `shutdown` resolves.
pub async fn serve_cluster<Dy, St>(
    addr: SocketAddr,
    replication: ReplicationServiceImpl<Dy, St>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()>
where
    Dy: ReplicatedStore,
    St: ReplicatedStore,
{
    let reflection = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(disco_proto::FILE_DESCRIPTOR_SET)
        .build_v1()?;
    tracing::info!(%addr, "cluster gRPC server starting");
    tonic::transport::Server::builder()
        .add_service(ReplicationServiceServer::new(replication))
        .add_service(reflection)
        .serve_with_shutdown(addr, shutdown)
        .await
        .map_err(Into::into)
}
