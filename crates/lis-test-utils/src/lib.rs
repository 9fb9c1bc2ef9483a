//! Testing utilities for the LIS workspace
//!
//! Shared fixtures and [`InMemoryStorage`], a `StorageApi` double that keeps
//! the server-side rules the engine relies on: occupied coordinates conflict,
//! constrained deletes are refused for non-admins, aliquots are divided with
//! six-decimal rounding.

#![allow(missing_docs)]

use async_trait::async_trait;
use lis_engine::api::{
    AddTestsRequest, AddTestsResponse, AliquotResponse, AliquotSubmission, AssignmentReceipt,
    AssignmentRequest, CanDeleteResponse, CancelTestRequest, CancelTestResponse, CascadeSummary,
    MoveRequest, MovementReceipt, NodeFilter, StorageApi, TestAdditionResult,
};
use lis_engine::{Actor, ApiError, EngineConfig, ServerMessage};
use lis_model::{
    LocationType, NodeId, OccupiedSlot, OrderedTest, PositionSchema, SampleItem, SampleItemId,
    StorageBox, StorageNode, StorageTree, TreeKey,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Operation names accepted by [`InMemoryStorage::fail_next`]
pub mod ops {
    pub const LIST_NODES: &str = "list_nodes";
    pub const LIST_BOXES: &str = "list_boxes";
    pub const GET_BOX: &str = "get_box";
    pub const CAN_DELETE: &str = "can_delete";
    pub const CASCADE_SUMMARY: &str = "cascade_delete_summary";
    pub const DELETE: &str = "delete_location";
    pub const ALIQUOT: &str = "create_aliquots";
    pub const ASSIGN: &str = "assign_sample";
    pub const MOVE: &str = "move_sample";
    pub const ADD_TESTS: &str = "add_tests";
    pub const CANCEL_TEST: &str = "cancel_test";
}

#[derive(Debug, Default)]
struct State {
    tree: StorageTree,
    boxes: BTreeMap<NodeId, StorageBox>,
    samples: BTreeMap<SampleItemId, SampleItem>,
    placements: HashMap<SampleItemId, (NodeId, String)>,
    failures: HashMap<&'static str, ApiError>,
    calls: Vec<String>,
}

impl State {
    fn record(&mut self, op: &'static str, detail: String) -> Result<(), ApiError> {
        self.calls.push(format!("{op} {detail}"));
        match self.failures.remove(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn resolve_sample(&self, identifier: &str) -> Result<SampleItemId, ApiError> {
        let id = SampleItemId::from(identifier);
        if self.samples.contains_key(&id) {
            return Ok(id);
        }
        self.samples
            .values()
            .find(|s| s.external_id == identifier)
            .map(|s| s.id.clone())
            .ok_or_else(|| ApiError::BadRequest(ServerMessage::new(format!("Sample item not found: {identifier}"))))
    }

    fn check_free(&self, box_id: &NodeId, coordinate: &str) -> Result<(), ApiError> {
        let storage_box = self
            .boxes
            .get(box_id)
            .ok_or_else(|| ApiError::NotFound(ServerMessage::new(format!("Box not found: {box_id}"))))?;
        if !lis_engine::grid::labels(storage_box).iter().any(|l| l == coordinate) {
            return Err(ApiError::BadRequest(ServerMessage::new(format!(
                "Invalid position {coordinate} for box {}",
                storage_box.node.display_name()
            ))));
        }
        if storage_box.occupied_coordinates.contains_key(coordinate) {
            return Err(ApiError::Conflict(ServerMessage::new(format!(
                "Position {coordinate} is already occupied in {}",
                storage_box.node.display_name()
            ))));
        }
        Ok(())
    }

    fn place(&mut self, sample: &SampleItemId, box_id: &NodeId, coordinate: &str) -> Option<String> {
        let external_id = self.samples.get(sample).map(|s| s.external_id.clone());
        let storage_box = self.boxes.get_mut(box_id)?;
        storage_box.occupied_coordinates.insert(
            coordinate.to_string(),
            OccupiedSlot {
                sample_item_id: Some(sample.clone()),
                external_id,
            },
        );
        sync_count(storage_box);
        self.placements
            .insert(sample.clone(), (box_id.clone(), coordinate.to_string()));
        self.tree
            .hierarchical_path(&TreeKey::new(LocationType::Box, box_id.clone()))
            .map(|path| format!("{path} > Position {coordinate}"))
    }

    fn unplace(&mut self, sample: &SampleItemId) {
        if let Some((box_id, coordinate)) = self.placements.remove(sample) {
            if let Some(storage_box) = self.boxes.get_mut(&box_id) {
                storage_box.occupied_coordinates.remove(&coordinate);
                sync_count(storage_box);
            }
        }
    }

    fn dependants(&self, kind: LocationType, id: &NodeId) -> (usize, u32) {
        let key = TreeKey::new(kind, id.clone());
        let children = self.tree.children_of(&key).len();
        let samples = self
            .tree
            .descendants_inclusive(&key)
            .iter()
            .filter(|k| k.kind == LocationType::Box)
            .filter_map(|k| self.boxes.get(&k.id))
            .map(|b| u32::try_from(b.occupied_coordinates.len()).unwrap_or(u32::MAX))
            .sum();
        (children, samples)
    }
}

fn sync_count(storage_box: &mut StorageBox) {
    storage_box.node.occupied_count = u32::try_from(storage_box.occupied_coordinates.len()).unwrap_or(u32::MAX);
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// In-memory `StorageApi` double
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: RwLock<State>,
    admin: bool,
}

impl InMemoryStorage {
    /// Empty backend answering as a non-admin session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer as an admin session
    #[must_use]
    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    /// Add a room, device, shelf or rack
    pub fn insert_node(&self, kind: LocationType, node: StorageNode) {
        self.state.write().tree.insert(kind, node);
    }

    /// Add a box; its occupied coordinates become placements
    pub fn insert_box(&self, storage_box: StorageBox) {
        let mut state = self.state.write();
        state.tree.insert(LocationType::Box, storage_box.node.clone());
        for (coordinate, slot) in &storage_box.occupied_coordinates {
            if let Some(sample) = &slot.sample_item_id {
                state
                    .placements
                    .insert(sample.clone(), (storage_box.id().clone(), coordinate.clone()));
            }
        }
        state.boxes.insert(storage_box.id().clone(), storage_box);
    }

    /// Add a sample item
    pub fn insert_sample(&self, sample: SampleItem) {
        self.state.write().samples.insert(sample.id.clone(), sample);
    }

    /// Make the next call of `op` fail with `err`
    pub fn fail_next(&self, op: &'static str, err: ApiError) {
        self.state.write().failures.insert(op, err);
    }

    /// Every call received, as `"op detail"` lines
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state.read().calls.clone()
    }

    /// Current copy of a box
    #[must_use]
    pub fn box_snapshot(&self, id: &NodeId) -> Option<StorageBox> {
        self.state.read().boxes.get(id).cloned()
    }

    /// Current copy of a sample
    #[must_use]
    pub fn sample(&self, id: &SampleItemId) -> Option<SampleItem> {
        self.state.read().samples.get(id).cloned()
    }

    /// Every sample, in id order
    #[must_use]
    pub fn samples(&self) -> Vec<SampleItem> {
        self.state.read().samples.values().cloned().collect()
    }

    /// Box and coordinate a sample sits in
    #[must_use]
    pub fn placement(&self, id: &SampleItemId) -> Option<(NodeId, String)> {
        self.state.read().placements.get(id).cloned()
    }

    /// Whether a node still exists
    #[must_use]
    pub fn contains(&self, kind: LocationType, id: &NodeId) -> bool {
        self.state.read().tree.get(&TreeKey::new(kind, id.clone())).is_some()
    }
}

#[async_trait]
impl StorageApi for InMemoryStorage {
    async fn list_nodes(&self, kind: LocationType, filter: &NodeFilter) -> Result<Vec<StorageNode>, ApiError> {
        let mut state = self.state.write();
        state.record(ops::LIST_NODES, kind.plural().to_string())?;
        let nodes = state
            .tree
            .of_kind(kind)
            .filter(|(key, node)| {
                let parent_ok = filter.parent.as_ref().map_or(true, |(parent_kind, parent_id)| {
                    state.tree.parent_of(key) == Some(TreeKey::new(*parent_kind, parent_id.clone()))
                });
                parent_ok && filter.active.map_or(true, |a| node.active == a)
            })
            .map(|(key, node)| match state.boxes.get(&key.id).filter(|_| kind == LocationType::Box) {
                Some(b) => b.node.clone(),
                None => node.clone(),
            })
            .collect();
        Ok(nodes)
    }

    async fn list_boxes(&self, rack_id: &NodeId) -> Result<Vec<StorageBox>, ApiError> {
        let mut state = self.state.write();
        state.record(ops::LIST_BOXES, rack_id.to_string())?;
        Ok(state
            .boxes
            .values()
            .filter(|b| b.node.parent_id.as_ref() == Some(rack_id))
            .cloned()
            .collect())
    }

    async fn get_box(&self, box_id: &NodeId) -> Result<StorageBox, ApiError> {
        let mut state = self.state.write();
        state.record(ops::GET_BOX, box_id.to_string())?;
        state
            .boxes
            .get(box_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(ServerMessage::new(format!("Box not found: {box_id}"))))
    }

    async fn can_delete(&self, kind: LocationType, id: &NodeId) -> Result<CanDeleteResponse, ApiError> {
        let mut state = self.state.write();
        state.record(ops::CAN_DELETE, format!("{}/{id}", kind.plural()))?;
        if state.tree.get(&TreeKey::new(kind, id.clone())).is_none() {
            return Err(ApiError::NotFound(ServerMessage::new(format!("{kind} not found: {id}"))));
        }

        if kind == LocationType::Box {
            let occupied = state.boxes.get(id).map_or(0, |b| b.occupied_coordinates.len());
            return Ok(if occupied > 0 {
                CanDeleteResponse::blocked(false, format!("Cannot delete box: contains {occupied} sample(s)"))
            } else {
                CanDeleteResponse::deletable(false)
            });
        }

        let (children, _) = state.dependants(kind, id);
        if children > 0 {
            let child = kind.child().map_or("location", LocationType::as_str);
            let mut response = CanDeleteResponse::blocked(
                self.admin,
                format!("Cannot delete {kind}: contains {children} {child}(s)"),
            );
            response.error = Some(format!("Cannot delete {kind}"));
            Ok(response)
        } else {
            Ok(CanDeleteResponse::deletable(self.admin))
        }
    }

    async fn cascade_delete_summary(&self, kind: LocationType, id: &NodeId) -> Result<CascadeSummary, ApiError> {
        let mut state = self.state.write();
        state.record(ops::CASCADE_SUMMARY, format!("{}/{id}", kind.plural()))?;
        if !self.admin {
            return Err(ApiError::Forbidden(ServerMessage::new(
                "Only Global Administrators can view cascade summaries",
            )));
        }
        let (children, samples) = state.dependants(kind, id);
        Ok(CascadeSummary {
            child_location_count: u32::try_from(children).unwrap_or(u32::MAX),
            child_location_type: kind.child().map_or("location", LocationType::as_str).to_string(),
            sample_count: samples,
        })
    }

    async fn delete_location(&self, kind: LocationType, id: &NodeId) -> Result<(), ApiError> {
        let mut state = self.state.write();
        state.record(ops::DELETE, format!("{}/{id}", kind.plural()))?;
        let key = TreeKey::new(kind, id.clone());
        if state.tree.get(&key).is_none() {
            return Err(ApiError::NotFound(ServerMessage::new(format!("{kind} not found: {id}"))));
        }
        let (children, samples) = state.dependants(kind, id);
        if (children > 0 || samples > 0) && !self.admin {
            return Err(ApiError::Conflict(ServerMessage {
                message: Some(format!("Cannot delete {kind}: {children} child location(s), {samples} sample(s)")),
                error: Some(format!("Cannot delete {kind}")),
            }));
        }

        let doomed = state.tree.descendants_inclusive(&key);
        for box_key in doomed.iter().filter(|k| k.kind == LocationType::Box) {
            if let Some(storage_box) = state.boxes.remove(&box_key.id) {
                for slot in storage_box.occupied_coordinates.values() {
                    if let Some(sample) = &slot.sample_item_id {
                        state.placements.remove(sample);
                    }
                }
            }
        }
        state.tree.remove_subtree(&key);
        Ok(())
    }

    async fn create_aliquots(&self, submission: &AliquotSubmission) -> Result<AliquotResponse, ApiError> {
        let mut state = self.state.write();
        state.record(ops::ALIQUOT, submission.parent_sample_item_id.to_string())?;
        let parent = state
            .samples
            .get(&submission.parent_sample_item_id)
            .cloned()
            .ok_or_else(|| ApiError::BadRequest(ServerMessage::new("Parent sample item not found")))?;

        let remaining = parent.effective_remaining_quantity.unwrap_or(0.0);
        if submission.quantity_to_transfer > remaining {
            return Err(ApiError::BadRequest(ServerMessage::new(format!(
                "Quantity to transfer ({}) exceeds remaining quantity ({remaining})",
                submission.quantity_to_transfer
            ))));
        }
        if submission.number_of_aliquots == 0 {
            return Err(ApiError::BadRequest(ServerMessage::new("Number of aliquots must be at least 1")));
        }

        let per_aliquot = round6(submission.quantity_to_transfer / f64::from(submission.number_of_aliquots));
        let existing = state
            .samples
            .values()
            .filter(|s| s.parent_sample_item_id.as_ref() == Some(&parent.id))
            .count();

        let mut aliquots = Vec::new();
        for n in 1..=submission.number_of_aliquots {
            let mut aliquot = SampleItem::new(
                uuid::Uuid::new_v4().to_string(),
                format!("{}.{}", parent.external_id, existing + n as usize),
                per_aliquot,
            )
            .aliquot_of(parent.id.clone());
            aliquot.unit_of_measure = parent.unit_of_measure.clone();
            aliquot.sample_type_id = parent.sample_type_id.clone();
            aliquot.nesting_level = parent.nesting_level + 1;
            state.samples.insert(aliquot.id.clone(), aliquot.clone());
            aliquots.push(aliquot);
        }

        let updated = round6(remaining - submission.quantity_to_transfer);
        if let Some(stored) = state.samples.get_mut(&parent.id) {
            *stored = stored.clone().with_remaining(Some(updated));
        }

        Ok(AliquotResponse {
            aliquot_count: Some(submission.number_of_aliquots),
            quantity_per_aliquot: Some(per_aliquot),
            parent_updated_remaining_quantity: Some(updated),
            message: Some(format!("Created {} aliquot(s)", aliquots.len())),
            aliquots,
            aliquot: None,
        })
    }

    async fn assign_sample(&self, request: &AssignmentRequest) -> Result<AssignmentReceipt, ApiError> {
        let mut state = self.state.write();
        state.record(
            ops::ASSIGN,
            format!("{} -> {}/{}", request.sample_item_id, request.location_id, request.position_coordinate),
        )?;
        let sample = state.resolve_sample(&request.sample_item_id)?;
        if state.placements.contains_key(&sample) {
            return Err(ApiError::BadRequest(ServerMessage::new(format!(
                "Sample {} is already assigned; use move instead",
                request.sample_item_id
            ))));
        }
        state.check_free(&request.location_id, &request.position_coordinate)?;
        let path = state.place(&sample, &request.location_id, &request.position_coordinate);
        Ok(AssignmentReceipt {
            assignment_id: Some(uuid::Uuid::new_v4().to_string()),
            hierarchical_path: path,
        })
    }

    async fn move_sample(&self, request: &MoveRequest) -> Result<MovementReceipt, ApiError> {
        let mut state = self.state.write();
        state.record(
            ops::MOVE,
            format!("{} -> {}/{}", request.sample_item_id, request.location_id, request.position_coordinate),
        )?;
        let sample = state.resolve_sample(&request.sample_item_id)?;
        if !state.placements.contains_key(&sample) {
            return Err(ApiError::BadRequest(ServerMessage::new(format!(
                "Sample {} has no current location",
                request.sample_item_id
            ))));
        }
        state.check_free(&request.location_id, &request.position_coordinate)?;
        state.unplace(&sample);
        let path = state.place(&sample, &request.location_id, &request.position_coordinate);
        Ok(MovementReceipt {
            movement_id: Some(uuid::Uuid::new_v4().to_string()),
            hierarchical_path: path,
        })
    }

    async fn add_tests(&self, request: &AddTestsRequest) -> Result<AddTestsResponse, ApiError> {
        let mut state = self.state.write();
        state.record(ops::ADD_TESTS, format!("{} sample(s)", request.sample_item_ids.len()))?;
        let mut response = AddTestsResponse::default();
        for id in &request.sample_item_ids {
            let result = match state.samples.get_mut(id) {
                Some(sample) if sample.has_remaining_quantity => {
                    let mut added = Vec::new();
                    let mut skipped = Vec::new();
                    for test in &request.test_ids {
                        if sample.ordered_tests.iter().any(|t| &t.test_name == test) {
                            skipped.push(test.clone());
                        } else {
                            sample.ordered_tests.push(OrderedTest {
                                analysis_id: Some(uuid::Uuid::new_v4().to_string()),
                                test_name: test.clone(),
                                status: Some("NotStarted".to_string()),
                            });
                            added.push(test.clone());
                        }
                    }
                    TestAdditionResult {
                        sample_item_id: id.clone(),
                        sample_item_external_id: Some(sample.external_id.clone()),
                        success: true,
                        message: None,
                        added_test_ids: added,
                        skipped_test_ids: skipped,
                    }
                }
                Some(sample) => TestAdditionResult {
                    sample_item_external_id: Some(sample.external_id.clone()),
                    ..TestAdditionResult::failed(id.clone(), "Sample has no remaining quantity")
                },
                None => TestAdditionResult::failed(id.clone(), "Sample item not found"),
            };
            if result.success {
                response.success_count += 1;
            }
            response.results.push(result);
        }
        Ok(response)
    }

    async fn cancel_test(&self, request: &CancelTestRequest) -> Result<CancelTestResponse, ApiError> {
        let mut state = self.state.write();
        state.record(ops::CANCEL_TEST, format!("{}/{}", request.sample_item_id, request.analysis_id))?;
        let test = state
            .samples
            .get_mut(&request.sample_item_id)
            .and_then(|s| {
                s.ordered_tests
                    .iter_mut()
                    .find(|t| t.analysis_id.as_deref() == Some(request.analysis_id.as_str()))
            })
            .ok_or_else(|| ApiError::BadRequest(ServerMessage::new("Analysis not found for sample item")))?;
        if test.status.as_deref() == Some("Finalized") {
            return Err(ApiError::BadRequest(ServerMessage::new("Finalized tests cannot be cancelled")));
        }
        test.status = Some("Canceled".to_string());
        Ok(CancelTestResponse {
            analysis_id: Some(request.analysis_id.clone()),
            test_name: Some(test.test_name.clone()),
            status: test.status.clone(),
            message: Some("Test cancelled".to_string()),
        })
    }
}

/// Box 9 in rack 3: 5×10, letter-number, `C4` holds sample 101
#[must_use]
pub fn fixture_box() -> StorageBox {
    let storage_box = StorageBox::new(9u64, "Box 9", 5, 10)
        .with_schema(PositionSchema::LetterNumber)
        .with_occupied("C4", "101", "EXT-101");
    in_rack(storage_box, 3u64)
}

/// Attach a box to a rack
#[must_use]
pub fn in_rack(mut storage_box: StorageBox, rack: impl Into<NodeId>) -> StorageBox {
    storage_box.node.parent_id = Some(rack.into());
    storage_box
}

/// Sample `102`/`EXT-102`, 10 mL, unplaced
#[must_use]
pub fn fixture_sample() -> SampleItem {
    SampleItem::new("102", "EXT-102", 10.0).with_unit("mL")
}

/// Backend seeded with a small hierarchy
///
/// ```text
/// room 1 "Main Lab"
/// └─ device 5 "Freezer A" (limit 50)
///    └─ shelf 20 "Shelf 1"
///       └─ rack 3 "Rack 3"
///          ├─ box 9  "Box 9"  5×10 letter-number, C4 = sample 101
///          └─ box 10 "Box 10" 9×9 number-number, empty
/// room 2 "Annex" (no children)
/// samples 101 (placed), 102 (10 mL), 103 (nothing remaining)
/// ```
#[must_use]
pub fn seeded_storage(admin: bool) -> InMemoryStorage {
    let storage = InMemoryStorage::new().with_admin(admin);
    storage.insert_node(LocationType::Room, StorageNode::new(1u64, "Main Lab"));
    storage.insert_node(LocationType::Room, StorageNode::new(2u64, "Annex"));
    storage.insert_node(
        LocationType::Device,
        StorageNode::new(5u64, "Freezer A").with_parent(1u64).with_capacity_limit(50),
    );
    storage.insert_node(LocationType::Shelf, StorageNode::new(20u64, "Shelf 1").with_parent(5u64));
    storage.insert_node(LocationType::Rack, StorageNode::new(3u64, "Rack 3").with_parent(20u64));
    storage.insert_box(fixture_box());
    storage.insert_box(in_rack(
        StorageBox::new(10u64, "Box 10", 9, 9).with_schema(PositionSchema::NumberNumber),
        3u64,
    ));
    storage.insert_sample(SampleItem::new("101", "EXT-101", 2.0));
    storage.insert_sample(fixture_sample());
    storage.insert_sample(SampleItem::new("103", "EXT-103", 5.0).with_remaining(Some(0.0)));
    storage
}

/// Configuration pointing at `base_url`
#[must_use]
pub fn test_config(base_url: &str) -> EngineConfig {
    EngineConfig::new().with_base_url(base_url).with_timeout_secs(5)
}

/// Actor holding the global admin role
#[must_use]
pub fn admin_actor() -> Actor {
    Actor::with_roles(["Global Administrator"])
}

/// Actor without admin roles
#[must_use]
pub fn technician_actor() -> Actor {
    Actor::with_roles(["Technician"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_backend_conflicts_on_occupied_coordinate() {
        let storage = seeded_storage(false);
        let err = storage
            .assign_sample(&AssignmentRequest {
                sample_item_id: "EXT-102".into(),
                location_id: NodeId::from(9u64),
                location_type: LocationType::Box,
                position_coordinate: "C4".into(),
                notes: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn aliquots_round_to_six_decimals() {
        let storage = seeded_storage(false);
        let response = storage
            .create_aliquots(&AliquotSubmission {
                parent_sample_item_id: "102".into(),
                quantity_to_transfer: 10.0,
                number_of_aliquots: 3,
                notes: None,
            })
            .await
            .unwrap();
        assert_eq!(response.quantity_per_aliquot, Some(3.333_333));
        assert_eq!(response.aliquots[0].external_id, "EXT-102.1");
        assert_eq!(response.parent_updated_remaining_quantity, Some(0.0));
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let storage = seeded_storage(false);
        storage.fail_next(ops::GET_BOX, ApiError::Transport("reset".into()));
        assert!(storage.get_box(&NodeId::from(9u64)).await.is_err());
        assert!(storage.get_box(&NodeId::from(9u64)).await.is_ok());
        assert_eq!(storage.calls().len(), 2);
    }
}
