//! REST collaborator contract
//!
//! The engine never talks HTTP itself. Every network effect goes through
//! [`StorageApi`], so the workflows can be driven against the `reqwest` client,
//! an in-memory double or a mock.

use crate::error::ApiError;
use async_trait::async_trait;
use lis_model::{LocationType, NodeId, SampleItem, SampleItemId, StorageBox, StorageNode};
use serde::{Deserialize, Serialize};

/// Endpoint paths relative to the API prefix
pub mod paths {
    use lis_model::{LocationType, NodeId};

    /// `/storage/{plural}`
    #[must_use]
    pub fn listing(kind: LocationType) -> String {
        format!("/storage/{}", kind.plural())
    }

    /// `/storage/{plural}/{id}`
    #[must_use]
    pub fn node(kind: LocationType, id: &NodeId) -> String {
        format!("/storage/{}/{}", kind.plural(), id)
    }

    /// `/storage/{plural}/{id}/can-delete`
    #[must_use]
    pub fn can_delete(kind: LocationType, id: &NodeId) -> String {
        format!("{}/can-delete", node(kind, id))
    }

    /// `/storage/{plural}/{id}/cascade-delete-summary`
    #[must_use]
    pub fn cascade_summary(kind: LocationType, id: &NodeId) -> String {
        format!("{}/cascade-delete-summary", node(kind, id))
    }

    /// Box assignment
    pub const ASSIGN: &str = "/storage/sample-items/assign";
    /// Sample movement
    pub const MOVE: &str = "/storage/sample-items/move";
    /// Aliquot creation
    pub const ALIQUOT: &str = "/sample-management/aliquot";
    /// Bulk test addition
    pub const ADD_TESTS: &str = "/sample-management/add-tests";
    /// Test cancellation
    pub const CANCEL_TEST: &str = "/sample-management/cancel-test";
}

/// Query filters for a node listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    /// Restrict to children of this node
    pub parent: Option<(LocationType, NodeId)>,
    /// Restrict to active (`true`) or inactive (`false`) nodes
    pub active: Option<bool>,
}

impl NodeFilter {
    /// No filtering
    #[inline]
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Children of `parent`
    #[must_use]
    pub fn children_of(kind: LocationType, parent: impl Into<NodeId>) -> Self {
        Self {
            parent: Some((kind, parent.into())),
            active: None,
        }
    }

    /// With active flag
    #[inline]
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    /// Query-string pairs (`roomId=1`, `active=true`)
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some((kind, id)) = &self.parent {
            pairs.push((format!("{}Id", kind.as_str()), id.to_string()));
        }
        if let Some(active) = self.active {
            pairs.push(("active".to_string(), active.to_string()));
        }
        pairs
    }
}

/// `can-delete` answer, with a 409 body folded in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanDeleteResponse {
    /// Omitted by some location endpoints on a plain 200
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_delete: Option<bool>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CanDeleteResponse {
    /// Unconstrained answer
    #[must_use]
    pub fn deletable(is_admin: bool) -> Self {
        Self {
            can_delete: Some(true),
            is_admin,
            error: None,
            message: None,
        }
    }

    /// Constrained answer carrying the server's explanation
    #[must_use]
    pub fn blocked(is_admin: bool, message: impl Into<String>) -> Self {
        Self {
            can_delete: Some(false),
            is_admin,
            error: None,
            message: Some(message.into()),
        }
    }

    /// True when the node has dependants
    ///
    /// A box needs an explicit `canDelete: true`. The other levels are
    /// blocked by an explicit `false` or by a constraint body.
    #[must_use]
    pub fn is_blocked(&self, kind: LocationType) -> bool {
        if kind == LocationType::Box {
            return self.can_delete != Some(true);
        }
        self.can_delete == Some(false) || self.error.is_some() || self.reason().is_some()
    }

    /// Constraint text: `message`, then `error`
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.message
            .as_deref()
            .filter(|m| !m.is_empty())
            .or(self.error.as_deref().filter(|e| !e.is_empty()))
    }
}

/// Downstream impact of a cascade delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeSummary {
    pub child_location_count: u32,
    pub child_location_type: String,
    pub sample_count: u32,
}

impl CascadeSummary {
    /// "This will delete 3 device(s) and unassign 12 sample(s)."
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "This will delete {} {}(s) and unassign {} sample(s).",
            self.child_location_count, self.child_location_type, self.sample_count
        )
    }
}

/// Body of `POST /sample-management/aliquot`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliquotSubmission {
    pub parent_sample_item_id: SampleItemId,
    pub quantity_to_transfer: f64,
    pub number_of_aliquots: u32,
    pub notes: Option<String>,
}

/// Answer of the aliquot endpoint
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliquotResponse {
    #[serde(default)]
    pub aliquots: Vec<SampleItem>,
    /// Older servers answer a single-aliquot request with one object
    #[serde(default)]
    pub aliquot: Option<SampleItem>,
    #[serde(default)]
    pub aliquot_count: Option<u32>,
    #[serde(default)]
    pub quantity_per_aliquot: Option<f64>,
    #[serde(default)]
    pub parent_updated_remaining_quantity: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AliquotResponse {
    /// Every created aliquot, whichever shape the server used
    #[must_use]
    pub fn created(&self) -> Vec<&SampleItem> {
        self.aliquots.iter().chain(self.aliquot.iter()).collect()
    }
}

/// Body of `POST /storage/sample-items/assign`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRequest {
    /// Sample item id, external id or accession number
    pub sample_item_id: String,
    pub location_id: NodeId,
    pub location_type: LocationType,
    pub position_coordinate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Successful assignment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentReceipt {
    #[serde(default)]
    pub assignment_id: Option<String>,
    #[serde(default)]
    pub hierarchical_path: Option<String>,
}

/// Body of `POST /storage/sample-items/move`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub sample_item_id: String,
    pub location_id: NodeId,
    pub location_type: LocationType,
    pub position_coordinate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Successful move
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementReceipt {
    #[serde(default)]
    pub movement_id: Option<String>,
    #[serde(default)]
    pub hierarchical_path: Option<String>,
}

/// Body of `POST /sample-management/add-tests`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTestsRequest {
    pub sample_item_ids: Vec<SampleItemId>,
    pub test_ids: Vec<String>,
}

/// Per-sample outcome of a bulk test addition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAdditionResult {
    pub sample_item_id: SampleItemId,
    #[serde(default)]
    pub sample_item_external_id: Option<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub added_test_ids: Vec<String>,
    #[serde(default)]
    pub skipped_test_ids: Vec<String>,
}

impl TestAdditionResult {
    /// Refusal for one sample; no tests were added
    #[must_use]
    pub fn failed(sample_item_id: SampleItemId, message: impl Into<String>) -> Self {
        Self {
            sample_item_id,
            sample_item_external_id: None,
            success: false,
            message: Some(message.into()),
            added_test_ids: Vec::new(),
            skipped_test_ids: Vec::new(),
        }
    }
}

/// Answer of the add-tests endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTestsResponse {
    #[serde(default)]
    pub success_count: u32,
    #[serde(default)]
    pub results: Vec<TestAdditionResult>,
}

/// Body of `POST /sample-management/cancel-test`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTestRequest {
    pub analysis_id: String,
    pub sample_item_id: SampleItemId,
}

/// Answer of the cancel-test endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTestResponse {
    #[serde(default)]
    pub analysis_id: Option<String>,
    #[serde(default)]
    pub test_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// REST backend as seen by the engine
///
/// Implementations map HTTP outcomes onto [`ApiError`]; a 409 from
/// `can-delete` is *not* an error and must be folded into a
/// [`CanDeleteResponse`] with `can_delete = Some(false)`.
#[async_trait]
pub trait StorageApi: Send + Sync {
    /// `GET /storage/{plural}?{filters}`
    async fn list_nodes(&self, kind: LocationType, filter: &NodeFilter) -> Result<Vec<StorageNode>, ApiError>;

    /// `GET /storage/boxes?rackId={id}`
    async fn list_boxes(&self, rack_id: &NodeId) -> Result<Vec<StorageBox>, ApiError>;

    /// `GET /storage/boxes/{id}`
    async fn get_box(&self, box_id: &NodeId) -> Result<StorageBox, ApiError>;

    /// `GET /storage/{plural}/{id}/can-delete`
    async fn can_delete(&self, kind: LocationType, id: &NodeId) -> Result<CanDeleteResponse, ApiError>;

    /// `GET /storage/{plural}/{id}/cascade-delete-summary`
    async fn cascade_delete_summary(&self, kind: LocationType, id: &NodeId) -> Result<CascadeSummary, ApiError>;

    /// `DELETE /storage/{plural}/{id}`
    async fn delete_location(&self, kind: LocationType, id: &NodeId) -> Result<(), ApiError>;

    /// `POST /sample-management/aliquot`
    async fn create_aliquots(&self, submission: &AliquotSubmission) -> Result<AliquotResponse, ApiError>;

    /// `POST /storage/sample-items/assign`
    async fn assign_sample(&self, request: &AssignmentRequest) -> Result<AssignmentReceipt, ApiError>;

    /// `POST /storage/sample-items/move`
    async fn move_sample(&self, request: &MoveRequest) -> Result<MovementReceipt, ApiError>;

    /// `POST /sample-management/add-tests`
    async fn add_tests(&self, request: &AddTestsRequest) -> Result<AddTestsResponse, ApiError>;

    /// `POST /sample-management/cancel-test`
    async fn cancel_test(&self, request: &CancelTestRequest) -> Result<CancelTestResponse, ApiError>;
}
