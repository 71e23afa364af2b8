use std::net::SocketAddr;
use std::sync::Arc;
use tonic::{transport::Server, Request, Response, Status};
use tracing::{error, info};

use crate::catalog::OwnerScope;
use crate::engine::NlqEngine;
use crate::error::NlqError;
use crate::proto::nlq::{
    nlq_service_server::{NlqService, NlqServiceServer},
    AskRequest, AskResponse, ClearConversationRequest, ClearConversationResponse,
    DeleteDatasetRequest, DeleteDatasetResponse, GetConversationRequest,
    GetConversationResponse, HealthCheckRequest, HealthCheckResponse, ListDatasetsRequest,
    ListDatasetsResponse, RenameDatasetRequest, RenameDatasetResponse, UploadDatasetRequest,
    UploadDatasetResponse,
};

pub struct GrpcServer {
    engine: Arc<NlqEngine>,
}

impl GrpcServer {
    pub fn new(engine: Arc<NlqEngine>) -> Self {
        Self { engine }
    }

    pub async fn start(&self, addr: SocketAddr) -> Result<(), NlqError> {
        info!("Starting gRPC server on {}", addr);

        let nlq_service = NlqServiceImpl {
            engine: self.engine.clone(),
        };

        Server::builder()
            .add_service(NlqServiceServer::new(nlq_service))
            .serve(addr)
            .await?;

        Ok(())
    }
}

struct NlqServiceImpl {
    engine: Arc<NlqEngine>,
}

fn optional_id(dataset_id: &str) -> Option<&str> {
    let trimmed = dataset_id.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[tonic::async_trait]
impl NlqService for NlqServiceImpl {
    async fn upload_dataset(
        &self,
        request: Request<UploadDatasetRequest>,
    ) -> Result<Response<UploadDatasetResponse>, Status> {
        let req = request.into_inner();
        info!(
            "gRPC: Received upload_dataset request for '{}' ({} bytes)",
            req.filename,
            req.content.len()
        );

        let owner = OwnerScope::from_owner_id(&req.owner_id);
        match self
            .engine
            .upload_dataset(&owner, &req.filename, &req.content)
            .await
        {
            Ok(dataset) => {
                info!("gRPC: Uploaded dataset '{}'", dataset.id);
                Ok(Response::new(UploadDatasetResponse {
                    dataset: Some(dataset.into()),
                }))
            }
            Err(e) => {
                error!("gRPC: Failed to upload '{}': {}", req.filename, e);
                Err(Status::from(e))
            }
        }
    }

    async fn ask(&self, request: Request<AskRequest>) -> Result<Response<AskResponse>, Status> {
        let req = request.into_inner();
        info!(
            "gRPC: Received ask request for dataset '{}': {}",
            req.dataset_id, req.query
        );

        let owner = OwnerScope::from_owner_id(&req.owner_id);
        match self
            .engine
            .ask(&owner, optional_id(&req.dataset_id), &req.query)
            .await
        {
            Ok(reply) => Ok(Response::new(reply.into())),
            Err(e) => {
                error!("gRPC: Ask failed for dataset '{}': {}", req.dataset_id, e);
                Err(Status::from(e))
            }
        }
    }

    async fn list_datasets(
        &self,
        request: Request<ListDatasetsRequest>,
    ) -> Result<Response<ListDatasetsResponse>, Status> {
        info!("gRPC: Received list_datasets request");

        let owner = OwnerScope::from_owner_id(&request.into_inner().owner_id);
        let (datasets, groups) = self.engine.list_datasets(&owner).await.map_err(|e| {
            error!("gRPC: Failed to list datasets: {}", e);
            Status::from(e)
        })?;

        let response = ListDatasetsResponse {
            datasets: datasets.into_iter().map(|d| d.into()).collect(),
            groups: groups.into_iter().map(|g| g.into()).collect(),
        };

        info!("gRPC: Returning {} datasets", response.datasets.len());
        Ok(Response::new(response))
    }

    async fn get_conversation(
        &self,
        request: Request<GetConversationRequest>,
    ) -> Result<Response<GetConversationResponse>, Status> {
        let req = request.into_inner();
        info!(
            "gRPC: Received get_conversation request for dataset '{}'",
            req.dataset_id
        );

        let owner = OwnerScope::from_owner_id(&req.owner_id);
        let view = self
            .engine
            .conversation(&owner, optional_id(&req.dataset_id))
            .await
            .map_err(|e| {
                error!("gRPC: Failed to load conversation: {}", e);
                Status::from(e)
            })?;

        Ok(Response::new(GetConversationResponse {
            selected: view.selected.map(|d| d.into()),
            entries: view.entries.into_iter().map(|e| e.into()).collect(),
        }))
    }

    async fn clear_conversation(
        &self,
        request: Request<ClearConversationRequest>,
    ) -> Result<Response<ClearConversationResponse>, Status> {
        let req = request.into_inner();
        info!(
            "gRPC: Received clear_conversation request for dataset '{}'",
            req.dataset_id
        );

        let owner = OwnerScope::from_owner_id(&req.owner_id);
        match self
            .engine
            .clear_conversation(&owner, &req.dataset_id)
            .await
        {
            Ok(deleted) => Ok(Response::new(ClearConversationResponse { deleted })),
            Err(e) => {
                error!(
                    "gRPC: Failed to clear conversation of '{}': {}",
                    req.dataset_id, e
                );
                Err(Status::from(e))
            }
        }
    }

    async fn rename_dataset(
        &self,
        request: Request<RenameDatasetRequest>,
    ) -> Result<Response<RenameDatasetResponse>, Status> {
        let req = request.into_inner();
        info!(
            "gRPC: Received rename_dataset request for '{}' to '{}'",
            req.dataset_id, req.new_name
        );

        if req.new_name.trim().is_empty() {
            return Ok(Response::new(RenameDatasetResponse {
                success: false,
                message: "New name is required".to_string(),
                dataset: None,
            }));
        }

        let owner = OwnerScope::from_owner_id(&req.owner_id);
        match self
            .engine
            .rename_dataset(&owner, &req.dataset_id, &req.new_name)
            .await
        {
            Ok(dataset) => Ok(Response::new(RenameDatasetResponse {
                success: true,
                message: format!("Table renamed to '{}'", dataset.name),
                dataset: Some(dataset.into()),
            })),
            Err(e @ NlqError::DatasetNotFound { .. }) => Err(Status::from(e)),
            Err(e) => {
                error!("gRPC: Failed to rename '{}': {}", req.dataset_id, e);
                Ok(Response::new(RenameDatasetResponse {
                    success: false,
                    message: format!("Error renaming table: {}", e),
                    dataset: None,
                }))
            }
        }
    }

    async fn delete_dataset(
        &self,
        request: Request<DeleteDatasetRequest>,
    ) -> Result<Response<DeleteDatasetResponse>, Status> {
        let req = request.into_inner();
        info!(
            "gRPC: Received delete_dataset request for '{}'",
            req.dataset_id
        );

        let owner = OwnerScope::from_owner_id(&req.owner_id);
        match self.engine.delete_dataset(&owner, &req.dataset_id).await {
            Ok(()) => Ok(Response::new(DeleteDatasetResponse {
                success: true,
                message: format!("Dataset '{}' deleted", req.dataset_id),
            })),
            Err(e @ NlqError::DatasetNotFound { .. }) => Err(Status::from(e)),
            Err(e) => {
                error!("gRPC: Failed to delete '{}': {}", req.dataset_id, e);
                Ok(Response::new(DeleteDatasetResponse {
                    success: false,
                    message: format!("Failed to delete dataset: {}", e),
                }))
            }
        }
    }

    async fn health_check(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        info!("gRPC: Received health_check request");

        match self.engine.health_check().await {
            Ok(_) => {
                info!("gRPC: Health check passed");
                Ok(Response::new(HealthCheckResponse {
                    status: "healthy".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                }))
            }
            Err(e) => {
                error!("gRPC: Health check failed: {}", e);
                Err(Status::internal("Health check failed"))
            }
        }
    }
}
