use std::sync::Arc;

use disco_proto::v1::{
    discovery_service_server::DiscoveryService, AnnounceDynamicRequest, AnnounceDynamicResponse,
    AnnounceStaticRequest, AnnounceStaticResponse, DeleteDynamicRequest, DeleteDynamicResponse,
    DeleteStaticRequest, DeleteStaticResponse, ListStaticRequest, ListStaticResponse,
    QueryServicesRequest, QueryServicesResponse,
};
use disco_registry::{
    DynamicAnnouncement, DynamicServiceAnnouncement, DynamicStore, Service, StaticAnnouncement,
    StaticStore,
};
use disco_replication::ReplicatedStore;
use tonic::{Request, Response, Status};

use crate::convert::{disco_to_status, parse_uuid, service_to_proto};
use crate::monitor::{monitored, DiscoveryEventType, DiscoveryStats};

pub struct DiscoveryServiceImpl<Dy, St> {
    environment: String,
    dynamic: Arc<DynamicStore<Dy>>,
    statics: Arc<StaticStore<St>>,
    stats: Arc<DiscoveryStats>,
}

impl<Dy: ReplicatedStore, St: ReplicatedStore> DiscoveryServiceImpl<Dy, St> {
    pub fn new(
        environment: impl Into<String>,
        dynamic: Arc<DynamicStore<Dy>>,
        statics: Arc<StaticStore<St>>,
        stats: Arc<DiscoveryStats>,
    ) -> Self {
        DiscoveryServiceImpl { environment: environment.into(), dynamic, statics, stats }
    }

    fn check_environment(&self, provided: &str) -> Result<(), Status> {
        if provided != self.environment {
            return Err(Status::invalid_argument(format!(
                "environment mismatch: expected '{}', provided '{provided}'",
                self.environment
            )));
        }
        Ok(())
    }

    async fn query(&self, service_type: Option<&str>, pool: Option<&str>) -> Result<Vec<Service>, Status> {
        let (dynamic, statics) = match (service_type, pool) {
            (Some(t), Some(p)) => (self.dynamic.get_pool(t, p).await, self.statics.get_pool(t, p).await),
            (Some(t), None) => (self.dynamic.get(t).await, self.statics.get(t).await),
            (None, _) => (self.dynamic.get_all().await, self.statics.get_all().await),
        };
        let mut services = dynamic.map_err(disco_to_status)?;
        services.extend(statics.map_err(disco_to_status)?);
        if let (None, Some(p)) = (service_type, pool) {
            services.retain(|s| s.pool == p);
        }
        Ok(services)
    }
}

#[tonic::async_trait]
impl<Dy: ReplicatedStore, St: ReplicatedStore> DiscoveryService for DiscoveryServiceImpl<Dy, St> {
    async fn announce_dynamic(
        &self,
        request: Request<AnnounceDynamicRequest>,
    ) -> Result<Response<AnnounceDynamicResponse>, Status> {
        monitored(DiscoveryEventType::DynamicAnnouncement, &self.stats, async {
            let req = request.into_inner();
            let node_id = parse_uuid("node_id", &req.node_id)?;
            self.check_environment(&req.environment)?;

            let services = req
                .services
                .into_iter()
                .map(|s| -> Result<DynamicServiceAnnouncement, Status> {
                    Ok(DynamicServiceAnnouncement {
                        id: parse_uuid("service id", &s.id)?,
                        service_type: s.r#type,
                        properties: s.properties.into_iter().collect(),
                    })
                })
                .collect::<Result<Vec<_>, Status>>()?;
            let announcement = DynamicAnnouncement {
                environment: req.environment,
                pool: req.pool,
                location: req.location,
                services,
            };

            let stored = self.dynamic.put(node_id, &announcement).await.map_err(disco_to_status)?;
            Ok(Response::new(AnnounceDynamicResponse {
                services: stored.into_iter().map(service_to_proto).collect(),
            }))
        })
        .await
    }

    async fn delete_dynamic(
        &self,
        request: Request<DeleteDynamicRequest>,
    ) -> Result<Response<DeleteDynamicResponse>, Status> {
        monitored(DiscoveryEventType::DynamicAnnouncementDelete, &self.stats, async {
            let node_id = parse_uuid("node_id", &request.get_ref().node_id)?;
            if !self.dynamic.delete(node_id).await.map_err(disco_to_status)? {
                return Err(Status::not_found(format!("no announcement for node {node_id}")));
            }
            Ok(Response::new(DeleteDynamicResponse {}))
        })
        .await
    }

    async fn announce_static(
        &self,
        request: Request<AnnounceStaticRequest>,
    ) -> Result<Response<AnnounceStaticResponse>, Status> {
        monitored(DiscoveryEventType::StaticAnnouncement, &self.stats, async {
            let req = request.into_inner();
            self.check_environment(&req.environment)?;
            let announcement = StaticAnnouncement {
                environment: req.environment,
                service_type: req.r#type,
                pool: req.pool,
                location: req.location,
                properties: req.properties.into_iter().collect(),
            };
            announcement.validate().map_err(disco_to_status)?;

            let service = announcement.into_service();
            self.statics.put(&service).await.map_err(disco_to_status)?;
            Ok(Response::new(AnnounceStaticResponse { service: Some(service_to_proto(service)) }))
        })
        .await
    }

    async fn list_static(
        &self,
        _request: Request<ListStaticRequest>,
    ) -> Result<Response<ListStaticResponse>, Status> {
        monitored(DiscoveryEventType::StaticAnnouncementList, &self.stats, async {
            let services = self.statics.get_all().await.map_err(disco_to_status)?;
            Ok(Response::new(ListStaticResponse {
                environment: self.environment.clone(),
                services: services.into_iter().map(service_to_proto).collect(),
            }))
        })
        .await
    }

    async fn delete_static(
        &self,
        request: Request<DeleteStaticRequest>,
    ) -> Result<Response<DeleteStaticResponse>, Status> {
        monitored(DiscoveryEventType::StaticAnnouncementDelete, &self.stats, async {
            let id = parse_uuid("id", &request.get_ref().id)?;
            let found = self.statics.delete(id).await.map_err(disco_to_status)?;
            Ok(Response::new(DeleteStaticResponse { found }))
        })
        .await
    }

    async fn query_services(
        &self,
        request: Request<QueryServicesRequest>,
    ) -> Result<Response<QueryServicesResponse>, Status> {
        monitored(DiscoveryEventType::ServiceQuery, &self.stats, async {
            let req = request.into_inner();
            let service_type = req.r#type.as_deref().filter(|t| !t.is_empty());
            let pool = req.pool.as_deref().filter(|p| !p.is_empty());
            let services = self.query(service_type, pool).await?;
            Ok(Response::new(QueryServicesResponse {
                environment: self.environment.clone(),
                services: services.into_iter().map(service_to_proto).collect(),
            }))
        })
        .await
    }
}
