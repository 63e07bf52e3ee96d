use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use disco_replication::ReplicatedStore;
use disco_types::DiscoError;

use crate::service::{decode, encode, DynamicAnnouncement, Service};

/// Services announced by running nodes. Every entry carries the configured
/// TTL, so a node that stops re-announcing disappears on its own.
pub struct DynamicStore<D> {
    store: Arc<D>,
    max_age: Duration,
}

impl<D: ReplicatedStore> DynamicStore<D> {
    pub fn new(store: Arc<D>, max_age: Duration) -> Self {
        DynamicStore { store, max_age }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Record `announcement` as the complete set of services offered by
    /// `node_id`. Services the node announced before but left out now are
    /// deleted.
    pub async fn put(
        &self,
        node_id: Uuid,
        announcement: &DynamicAnnouncement,
    ) -> Result<Vec<Service>, DiscoError> {
        announcement.validate()?;
        let services = announcement.to_services(node_id);

        let announced: HashSet<Uuid> = services.iter().map(|s| s.id).collect();
        for stale in self.services_of(node_id).await? {
            if !announced.contains(&stale.id) {
                self.store.delete(stale.id.to_string().as_bytes()).await?;
            }
        }

        for service in &services {
            self.store
                .put(service.id.to_string().as_bytes(), encode(service)?, Some(self.max_age))
                .await?;
        }
        tracing::debug!(%node_id, services = services.len(), "dynamic announcement stored");
        Ok(services)
    }

    /// Remove every service of `node_id`. Returns whether any was live.
    pub async fn delete(&self, node_id: Uuid) -> Result<bool, DiscoError> {
        let mut removed = false;
        for service in self.services_of(node_id).await? {
            removed |= self.store.delete(service.id.to_string().as_bytes()).await?;
        }
        Ok(removed)
    }

    pub async fn get_all(&self) -> Result<Vec<Service>, DiscoError> {
        let entries = self.store.get_all().await?;
        Ok(entries
            .into_iter()
            .filter_map(|e| {
                let value = e.value?;
                match decode(&value) {
                    Ok(s) => Some(s),
                    Err(err) => {
                        tracing::warn!(
                            key = %String::from_utf8_lossy(&e.key),
                            error = %err,
                            "skipping undecodable dynamic service"
                        );
                        None
                    }
                }
            })
            .collect())
    }

    pub async fn get(&self, service_type: &str) -> Result<Vec<Service>, DiscoError> {
        let mut all = self.get_all().await?;
        all.retain(|s| s.matches(service_type, None));
        Ok(all)
    }

    pub async fn get_pool(&self, service_type: &str, pool: &str) -> Result<Vec<Service>, DiscoError> {
        let mut all = self.get_all().await?;
        all.retain(|s| s.matches(service_type, Some(pool)));
        Ok(all)
    }

    async fn services_of(&self, node_id: Uuid) -> Result<Vec<Service>, DiscoError> {
        let mut all = self.get_all().await?;
        all.retain(|s| s.node_id == Some(node_id));
        Ok(all)
    }
}
