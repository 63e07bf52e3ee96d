use std::sync::Arc;

use disco_proto::v1::{
    replication_service_server::ReplicationService, PullAllRequest, PullAllResponse, PushRequest,
    PushResponse,
};
use disco_replication::ReplicatedStore;
use tonic::{Request, Response, Status};

use crate::convert::{disco_to_status, entry_from_proto, entry_to_proto};

/// Receives pushes and serves pulls for this node's replicated stores.
pub struct ReplicationServiceImpl<Dy, St> {
    dynamic: Arc<Dy>,
    statics: Arc<St>,
}

impl<Dy: ReplicatedStore, St: ReplicatedStore> ReplicationServiceImpl<Dy, St> {
    pub fn new(dynamic: Arc<Dy>, statics: Arc<St>) -> Self {
        ReplicationServiceImpl { dynamic, statics }
    }
}

async fn push_into<S: ReplicatedStore>(store: &S, req: PushRequest) -> Result<PushResponse, Status> {
    let entries = req.entries.into_iter().map(entry_from_proto).collect();
    let outcome = store.merge(entries).await.map_err(disco_to_status)?;
    tracing::trace!(
        store = store.name(),
        applied = outcome.applied,
        ignored = outcome.ignored,
        rejected = outcome.rejected,
        "push merged"
    );
    Ok(PushResponse {
        accepted: (outcome.applied + outcome.ignored) as u32,
        rejected: outcome.rejected as u32,
    })
}

async fn pull_from<S: ReplicatedStore>(store: &S) -> Result<PullAllResponse, Status> {
    let entries = store.snapshot().await.map_err(disco_to_status)?;
    Ok(PullAllResponse { entries: entries.into_iter().map(entry_to_proto).collect() })
}

fn unknown_store(name: &str) -> Status {
    Status::not_found(format!("unknown store '{name}'"))
}

#[tonic::async_trait]
impl<Dy: ReplicatedStore, St: ReplicatedStore> ReplicationService for ReplicationServiceImpl<Dy, St> {
    async fn push(&self, request: Request<PushRequest>) -> Result<Response<PushResponse>, Status> {
        let req = request.into_inner();
        let resp = if req.store == self.dynamic.name() {
            push_into(self.dynamic.as_ref(), req).await?
        } else if req.store == self.statics.name() {
            push_into(self.statics.as_ref(), req).await?
        } else {
            return Err(unknown_store(&req.store));
        };
        Ok(Response::new(resp))
    }

    async fn pull_all(
        &self,
        request: Request<PullAllRequest>,
    ) -> Result<Response<PullAllResponse>, Status> {
        let req = request.into_inner();
        let resp = if req.store == self.dynamic.name() {
            pull_from(self.dynamic.as_ref()).await?
        } else if req.store == self.statics.name() {
            pull_from(self.statics.as_ref()).await?
        } else {
            return Err(unknown_store(&req.store));
        };
        Ok(Response::new(resp))
    }
}
