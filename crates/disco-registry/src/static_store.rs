use std::sync::Arc;

use uuid::Uuid;

use disco_replication::ReplicatedStore;
use disco_types::DiscoError;

use crate::service::{decode, encode, Service};

/// Manually registered services. Entries never expire and are expected to
/// be backed by the durable engine.
pub struct StaticStore<D> {
    store: Arc<D>,
}

impl<D: ReplicatedStore> StaticStore<D> {
    pub fn new(store: Arc<D>) -> Self {
        StaticStore { store }
    }

    pub async fn put(&self, service: &Service) -> Result<(), DiscoError> {
        self.store.put(service.id.to_string().as_bytes(), encode(service)?, None).await?;
        tracing::debug!(id = %service.id, service_type = %service.service_type, "static service stored");
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, DiscoError> {
        self.store.delete(id.to_string().as_bytes()).await
    }

    pub async fn get_all(&self) -> Result<Vec<Service>, DiscoError> {
        let mut services = Vec::new();
        for entry in self.store.get_all().await? {
            let Some(value) = entry.value else { continue };
            match decode(&value) {
                Ok(service) => services.push(service),
                Err(e) => tracing::warn!(
                    key = %String::from_utf8_lossy(&entry.key),
                    error = %e,
                    "skipping undecodable static service"
                ),
            }
        }
        Ok(services)
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
}
