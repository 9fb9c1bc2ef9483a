//! `reqwest` implementation of [`StorageApi`]

use async_trait::async_trait;
use lis_engine::api::{
    paths, AddTestsRequest, AddTestsResponse, AliquotResponse, AliquotSubmission, AssignmentReceipt,
    AssignmentRequest, CanDeleteResponse, CancelTestRequest, CancelTestResponse, CascadeSummary, MoveRequest,
    MovementReceipt, NodeFilter, StorageApi,
};
use lis_engine::{ApiError, EngineConfig, EngineError, ServerMessage};
use lis_model::{LocationType, NodeId, StorageBox, StorageNode};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Storage backend reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpStorageApi {
    client: Client,
    config: EngineConfig,
}

impl HttpStorageApi {
    /// Build a client with the configured timeout
    ///
    /// # Errors
    /// `EngineError::Config` if the configuration is invalid or the client
    /// cannot be constructed
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| EngineError::Config(format!("http client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn send(&self, request: RequestBuilder, method: &'static str, path: &str) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        tracing::debug!(method, path, status = status.as_u16(), "storage api response");
        if status.is_success() {
            Ok(response)
        } else {
            Err(error_from(response).await)
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(String, String)]) -> Result<T, ApiError> {
        let request = self.client.get(self.config.endpoint(path)).query(query);
        decode(self.send(request, "GET", path).await?).await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.client.post(self.config.endpoint(path)).json(body);
        decode(self.send(request, "POST", path).await?).await
    }
}

fn transport(error: reqwest::Error) -> ApiError {
    if error.is_decode() {
        ApiError::Decode(error.to_string())
    } else {
        ApiError::Transport(error.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await.map_err(transport)?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Error bodies are `{message?, error?}`; anything else carries no text
fn parse_body(text: &str) -> ServerMessage {
    if text.trim().is_empty() {
        return ServerMessage::empty();
    }
    serde_json::from_str(text).unwrap_or_else(|_| ServerMessage::empty())
}

async fn error_from(response: Response) -> ApiError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body = parse_body(&text);
    match status {
        StatusCode::BAD_REQUEST => ApiError::BadRequest(body),
        StatusCode::FORBIDDEN => ApiError::Forbidden(body),
        StatusCode::NOT_FOUND => ApiError::NotFound(body),
        StatusCode::CONFLICT => ApiError::Conflict(body),
        other => ApiError::Server {
            status: other.as_u16(),
            body,
        },
    }
}

#[async_trait]
impl StorageApi for HttpStorageApi {
    async fn list_nodes(&self, kind: LocationType, filter: &NodeFilter) -> Result<Vec<StorageNode>, ApiError> {
        let mut nodes: Vec<StorageNode> = self.get(&paths::listing(kind), &filter.query_pairs()).await?;
        for node in &mut nodes {
            node.location_type.get_or_insert(kind);
        }
        Ok(nodes)
    }

    async fn list_boxes(&self, rack_id: &NodeId) -> Result<Vec<StorageBox>, ApiError> {
        let filter = NodeFilter::children_of(LocationType::Rack, rack_id.clone());
        self.get(&paths::listing(LocationType::Box), &filter.query_pairs()).await
    }

    async fn get_box(&self, box_id: &NodeId) -> Result<StorageBox, ApiError> {
        self.get(&paths::node(LocationType::Box, box_id), &[]).await
    }

    async fn can_delete(&self, kind: LocationType, id: &NodeId) -> Result<CanDeleteResponse, ApiError> {
        let path = paths::can_delete(kind, id);
        let response = self
            .client
            .get(self.config.endpoint(&path))
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::CONFLICT {
            let text = response.text().await.map_err(transport)?;
            let mut answer: CanDeleteResponse = serde_json::from_str(&text).unwrap_or_default();
            answer.can_delete = Some(false);
            tracing::debug!(%kind, %id, reason = answer.reason(), "deletion constrained");
            return Ok(answer);
        }
        if !response.status().is_success() {
            return Err(error_from(response).await);
        }
        decode(response).await
    }

    async fn cascade_delete_summary(&self, kind: LocationType, id: &NodeId) -> Result<CascadeSummary, ApiError> {
        self.get(&paths::cascade_summary(kind, id), &[]).await
    }

    async fn delete_location(&self, kind: LocationType, id: &NodeId) -> Result<(), ApiError> {
        let path = paths::node(kind, id);
        let request = self.client.delete(self.config.endpoint(&path));
        self.send(request, "DELETE", &path).await?;
        Ok(())
    }

    async fn create_aliquots(&self, submission: &AliquotSubmission) -> Result<AliquotResponse, ApiError> {
        self.post(paths::ALIQUOT, submission).await
    }

    async fn assign_sample(&self, request: &AssignmentRequest) -> Result<AssignmentReceipt, ApiError> {
        self.post(paths::ASSIGN, request).await
    }

    async fn move_sample(&self, request: &MoveRequest) -> Result<MovementReceipt, ApiError> {
        self.post(paths::MOVE, request).await
    }

    async fn add_tests(&self, request: &AddTestsRequest) -> Result<AddTestsResponse, ApiError> {
        self.post(paths::ADD_TESTS, request).await
    }

    async fn cancel_test(&self, request: &CancelTestRequest) -> Result<CancelTestResponse, ApiError> {
        self.post(paths::CANCEL_TEST, request).await
    }
}
