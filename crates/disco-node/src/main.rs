use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use tokio::sync::watch;

use disco_registry::{DynamicStore, StaticStore, DYNAMIC_STORE, STATIC_STORE};
use disco_replication::{DistributedStore, StaticPeers, StoreConfig};
use disco_server::{
    serve_client, serve_cluster, DiscoveryServiceImpl, DiscoveryStats, GrpcRemoteStore,
    ReplicationServiceImpl,
};
use disco_storage::{InMemoryStore, PersistentStore};
use disco_types::{Clock, SystemClock};

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

#[derive(clap::Parser, Debug)]
#[command(name = "disco-node", about = "Service discovery node")]
struct Cli {
    /// Stable identity of this node; a random one is generated when absent.
    #[arg(long)]
    node_id: Option<String>,
    #[arg(long, default_value = "0.0.0.0:17000")]
    client_addr: String,
    #[arg(long, default_value = "0.0.0.0:17001")]
    cluster_addr: String,
    /// Cluster address of a replication peer, e.g. http://10.0.0.2:17001. Repeatable.
    #[arg(long = "peer")]
    peers: Vec<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `static_store.data_dir`.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct NodeConfig {
    environment: String,
}

#[derive(Debug, Deserialize)]
struct DynamicConfig {
    max_age_ms: u64,
    sweep_interval_ms: u64,
}

#[derive(Debug, Deserialize)]
struct StaticStoreConfig {
    data_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ReplicationConfig {
    anti_entropy_interval_ms: u64,
    peer_timeout_ms: u64,
    max_batch_size: usize,
    queue_size: usize,
    tombstone_max_age_ms: u64,
    gc_interval_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ObservabilityConfig {
    log_level: String,
    log_format: String,
}

#[derive(Debug, Deserialize)]
struct Config {
    node: NodeConfig,
    dynamic: DynamicConfig,
    static_store: StaticStoreConfig,
    replication: ReplicationConfig,
    observability: ObservabilityConfig,
}

impl ReplicationConfig {
    fn store_config(&self, gc_interval_ms: u64) -> StoreConfig {
        StoreConfig {
            anti_entropy_interval: Duration::from_millis(self.anti_entropy_interval_ms),
            peer_timeout: Duration::from_millis(self.peer_timeout_ms),
            max_batch_size: self.max_batch_size,
            queue_size: self.queue_size,
            tombstone_max_age: Duration::from_millis(self.tombstone_max_age_ms),
            gc_interval: Duration::from_millis(gc_interval_ms),
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    let mut figment = Figment::new().merge(Toml::string(DEFAULT_CONFIG));
    if let Some(path) = path {
        figment = figment.merge(Toml::file_exact(path));
    }
    figment
        .merge(Env::prefixed("DISCOVERY_").split("__"))
        .extract()
        .context("failed to load configuration")
}

fn shutdown_signal(mut rx: watch::Receiver<bool>) -> impl std::future::Future<Output = ()> {
    async move {
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;

    let log_format = config.observability.log_format.as_str();
    match log_format {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(&config.observability.log_level)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(&config.observability.log_level)
                .init();
        }
    }

    let node_id = cli.node_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let data_dir = cli.data_dir.clone().unwrap_or_else(|| config.static_store.data_dir.clone());

    tracing::info!(
        %node_id,
        environment = %config.node.environment,
        client_addr = %cli.client_addr,
        cluster_addr = %cli.cluster_addr,
        peers = cli.peers.len(),
        "node starting"
    );

    let client_addr: SocketAddr = cli
        .client_addr
        .parse()
        .with_context(|| format!("invalid client_addr: {}", cli.client_addr))?;
    let cluster_addr: SocketAddr = cli
        .cluster_addr
        .parse()
        .with_context(|| format!("invalid cluster_addr: {}", cli.cluster_addr))?;

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
    let durable = PersistentStore::open(&data_dir)
        .with_context(|| format!("failed to open static store at {}", data_dir.display()))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let peers = Arc::new(StaticPeers::new(cli.peers.clone()));
    let remote = Arc::new(GrpcRemoteStore::new(Duration::from_millis(
        config.replication.peer_timeout_ms,
    )));

    let dynamic_store = DistributedStore::start(
        DYNAMIC_STORE,
        node_id.clone(),
        Arc::new(InMemoryStore::new()),
        remote.clone(),
        peers.clone(),
        clock.clone(),
        config.replication.store_config(config.dynamic.sweep_interval_ms),
    );
    let static_store = DistributedStore::start(
        STATIC_STORE,
        node_id.clone(),
        Arc::new(durable),
        remote,
        peers,
        clock,
        config.replication.store_config(config.replication.gc_interval_ms),
    );

    let discovery = DiscoveryServiceImpl::new(
        config.node.environment.clone(),
        Arc::new(DynamicStore::new(
            dynamic_store.clone(),
            Duration::from_millis(config.dynamic.max_age_ms),
        )),
        Arc::new(StaticStore::new(static_store.clone())),
        Arc::new(DiscoveryStats::new()),
    );
    let replication = ReplicationServiceImpl::new(dynamic_store.clone(), static_store.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signal"),
        }
        let _ = shutdown_tx.send(true);
    });

    let served = tokio::try_join!(
        serve_client(client_addr, discovery, shutdown_signal(shutdown_rx.clone())),
        serve_cluster(cluster_addr, replication, shutdown_signal(shutdown_rx)),
    );

    dynamic_store.shutdown().await;
    static_store.shutdown().await;
    served?;

    tracing::info!("node stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads() {
        let config = load_config(None).unwrap();
        assert_eq!(config.node.environment, "development");
        assert_eq!(config.dynamic.max_age_ms, 30_000);
        assert!(!DEFAULT_CONFIG.contains("pool"));
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "[node]\nenvironment = \"prod\"\n").unwrap();
        let config = load_config(Some(path.as_path())).unwrap();
        assert_eq!(config.node.environment, "prod");
        assert_eq!(config.replication.queue_size, 1000);
    }
}
