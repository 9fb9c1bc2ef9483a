//! Box grid coordinates and sample placement
//!
//! - Pure labelling: `A1`..`E10` (letter-number) or `1-1`..`5-10` (number-number)
//! - [`PlacementSession`]: rack → box → coordinate selection with the reset rules
//! - [`BoxGridAssigner`]: assignment and movement through [`StorageApi`]
//!
//! Occupancy is never mutated locally. After every outcome that may have
//! changed the box, it is re-fetched from the server.

use crate::api::{AssignmentReceipt, AssignmentRequest, MoveRequest, MovementReceipt, StorageApi};
use crate::error::{ApiError, EngineError, GridError};
use crate::scope::ViewScope;
use lis_model::{LocationType, NodeId, PositionSchema, StorageBox};
use std::sync::Arc;

/// Message shown when a failed placement carries no server text
pub const PLACEMENT_FALLBACK_MESSAGE: &str = "Unknown error";

/// Row letters: `A`..`Z`, then `AA`, `AB`, ...
#[must_use]
pub fn letter(row: u32) -> String {
    let mut n = u64::from(row) + 1;
    let mut out = Vec::new();
    while n > 0 {
        n -= 1;
        out.push(b'A' + u8::try_from(n % 26).unwrap_or(0));
        n /= 26;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Label of the zero-based `(row, col)` cell
#[must_use]
pub fn coordinate_label(schema: PositionSchema, row: u32, col: u32) -> String {
    match schema {
        PositionSchema::LetterNumber => format!("{}{}", letter(row), u64::from(col) + 1),
        PositionSchema::NumberNumber => format!("{}-{}", u64::from(row) + 1, u64::from(col) + 1),
    }
}

/// Every label of a box, row-major
#[must_use]
pub fn labels(storage_box: &StorageBox) -> Vec<String> {
    let schema = storage_box.schema();
    let (rows, cols) = (storage_box.rows(), storage_box.columns());
    (0..rows)
        .flat_map(|r| (0..cols).map(move |c| coordinate_label(schema, r, c)))
        .collect()
}

/// Zero-based `(row, col)` of a label, if it is well-formed
#[must_use]
pub fn parse_coordinate(schema: PositionSchema, label: &str) -> Option<(u32, u32)> {
    let label = label.trim();
    match schema {
        PositionSchema::LetterNumber => {
            let split = label.find(|c: char| !c.is_ascii_alphabetic())?;
            let (letters, digits) = label.split_at(split);
            if letters.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let mut row: u64 = 0;
            for b in letters.to_ascii_uppercase().bytes() {
                row = row.checked_mul(26)?.checked_add(u64::from(b - b'A') + 1)?;
            }
            let col: u64 = digits.parse().ok()?;
            Some((u32::try_from(row - 1).ok()?, u32::try_from(col.checked_sub(1)?).ok()?))
        }
        PositionSchema::NumberNumber => {
            let (r, c) = label.split_once('-')?;
            let row: u32 = r.trim().parse().ok()?;
            let col: u32 = c.trim().parse().ok()?;
            Some((row.checked_sub(1)?, col.checked_sub(1)?))
        }
    }
}

/// Whether a coordinate holds a sample
#[must_use]
pub fn is_occupied(storage_box: &StorageBox, coordinate: &str) -> bool {
    storage_box.occupied_coordinates.contains_key(coordinate.trim())
        || canonical(storage_box, coordinate)
            .is_some_and(|c| storage_box.occupied_coordinates.contains_key(&c))
}

fn canonical(storage_box: &StorageBox, coordinate: &str) -> Option<String> {
    let schema = storage_box.schema();
    let (row, col) = parse_coordinate(schema, coordinate)?;
    (row < storage_box.rows() && col < storage_box.columns()).then(|| coordinate_label(schema, row, col))
}

/// Accept a click on `coordinate`, returning its canonical label
///
/// # Errors
/// - `GridError::Occupied` when a sample is already there
/// - `GridError::UnknownCoordinate` when the label is not in the grid
pub fn select_coordinate(storage_box: &StorageBox, coordinate: &str) -> Result<String, GridError> {
    if is_occupied(storage_box, coordinate) {
        return Err(GridError::Occupied {
            coordinate: canonical(storage_box, coordinate).unwrap_or_else(|| coordinate.trim().to_string()),
        });
    }
    canonical(storage_box, coordinate).ok_or_else(|| GridError::UnknownCoordinate {
        coordinate: coordinate.trim().to_string(),
    })
}

/// Where a placement session stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlacementPhase {
    NoRackSelected,
    RackSelected,
    BoxSelected,
    CoordinateSelected,
    Assigning,
    AssignedOrFailed,
}

/// Outcome of the last placement attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementStatus {
    /// Sample placed
    Success {
        coordinate: String,
        box_label: String,
        hierarchical_path: Option<String>,
    },
    /// Server message, verbatim
    Failed { message: String },
}

/// Validated placement target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementTarget {
    pub sample_item_id: String,
    pub box_id: NodeId,
    pub coordinate: String,
    pub notes: Option<String>,
}

impl PlacementTarget {
    /// Assignment body
    #[must_use]
    pub fn to_assignment(&self) -> AssignmentRequest {
        AssignmentRequest {
            sample_item_id: self.sample_item_id.clone(),
            location_id: self.box_id.clone(),
            location_type: LocationType::Box,
            position_coordinate: self.coordinate.clone(),
            notes: self.notes.clone(),
        }
    }

    /// Movement body
    #[must_use]
    pub fn to_move(&self, reason: Option<String>) -> MoveRequest {
        MoveRequest {
            sample_item_id: self.sample_item_id.clone(),
            location_id: self.box_id.clone(),
            location_type: LocationType::Box,
            position_coordinate: self.coordinate.clone(),
            reason,
            notes: self.notes.clone(),
        }
    }
}

/// Selection state of the box-grid placement view
#[derive(Debug, Clone, Default)]
pub struct PlacementSession {
    rack: Option<NodeId>,
    boxes: Vec<StorageBox>,
    selected_box: Option<StorageBox>,
    coordinate: Option<String>,
    sample: String,
    notes: String,
    in_flight: bool,
    box_stale: bool,
    status: Option<PlacementStatus>,
}

impl PlacementSession {
    /// Empty session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> PlacementPhase {
        if self.in_flight {
            PlacementPhase::Assigning
        } else if self.status.is_some() {
            PlacementPhase::AssignedOrFailed
        } else if self.coordinate.is_some() {
            PlacementPhase::CoordinateSelected
        } else if self.selected_box.is_some() {
            PlacementPhase::BoxSelected
        } else if self.rack.is_some() {
            PlacementPhase::RackSelected
        } else {
            PlacementPhase::NoRackSelected
        }
    }

    /// Select (or clear) a rack; resets box, coordinate and loaded boxes
    pub fn select_rack(&mut self, rack: Option<NodeId>) {
        self.rack = rack;
        self.boxes.clear();
        self.selected_box = None;
        self.coordinate = None;
        self.box_stale = false;
        self.status = None;
    }

    /// Boxes listed for the selected rack
    pub fn set_boxes(&mut self, boxes: Vec<StorageBox>) {
        self.boxes = boxes;
    }

    /// Select a box of the current rack; resets only the coordinate
    ///
    /// # Errors
    /// - `GridError::NoRackSelected` without a rack
    /// - `GridError::BoxNotInRack` if the box was not listed for the rack
    pub fn select_box(&mut self, box_id: &NodeId) -> Result<(), GridError> {
        let rack = self.rack.as_ref().ok_or(GridError::NoRackSelected)?;
        let found = self
            .boxes
            .iter()
            .find(|b| b.id() == box_id)
            .cloned()
            .ok_or_else(|| GridError::BoxNotInRack {
                box_id: box_id.to_string(),
                rack_id: rack.to_string(),
            })?;
        self.selected_box = Some(found);
        self.coordinate = None;
        self.box_stale = false;
        self.status = None;
        Ok(())
    }

    /// Clear the box; resets the coordinate
    pub fn clear_box(&mut self) {
        self.selected_box = None;
        self.coordinate = None;
        self.box_stale = false;
    }

    /// Click on a grid cell
    ///
    /// On error the selection is left exactly as it was.
    ///
    /// # Errors
    /// `GridError::NoBoxSelected`, `GridError::Occupied` or
    /// `GridError::UnknownCoordinate`
    pub fn select_coordinate(&mut self, coordinate: &str) -> Result<&str, GridError> {
        let storage_box = self.selected_box.as_ref().ok_or(GridError::NoBoxSelected)?;
        let label = select_coordinate(storage_box, coordinate)?;
        self.status = None;
        Ok(self.coordinate.insert(label).as_str())
    }

    /// Sample identifier (id, external id or accession)
    pub fn set_sample(&mut self, sample: impl Into<String>) {
        self.sample = sample.into();
    }

    /// Free-text notes
    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = notes.into();
    }

    /// Build the request target and enter `Assigning`
    ///
    /// # Errors
    /// The first missing precondition; nothing changes on error
    pub fn begin(&mut self) -> Result<PlacementTarget, GridError> {
        if self.in_flight {
            return Err(GridError::AssignmentInFlight);
        }
        let storage_box = self.selected_box.as_ref().ok_or(GridError::NoBoxSelected)?;
        if self.box_stale {
            return Err(GridError::StaleOccupancy);
        }
        let sample = self.sample.trim();
        if sample.is_empty() {
            return Err(GridError::MissingSample);
        }
        let coordinate = self.coordinate.clone().ok_or(GridError::MissingCoordinate)?;
        let notes = Some(self.notes.trim()).filter(|n| !n.is_empty()).map(str::to_string);

        let target = PlacementTarget {
            sample_item_id: sample.to_string(),
            box_id: storage_box.id().clone(),
            coordinate,
            notes,
        };
        self.in_flight = true;
        self.status = None;
        Ok(target)
    }

    /// Record a successful placement; clears sample, notes and coordinate
    pub fn finish_success(&mut self, coordinate: String, hierarchical_path: Option<String>) {
        let box_label = self
            .selected_box
            .as_ref()
            .map(|b| b.node.display_name().to_string())
            .unwrap_or_default();
        self.in_flight = false;
        self.sample.clear();
        self.notes.clear();
        self.coordinate = None;
        self.status = Some(PlacementStatus::Success {
            coordinate,
            box_label,
            hierarchical_path,
        });
    }

    /// Record a failed placement; the selection is kept for a manual retry
    pub fn finish_failure(&mut self, message: impl Into<String>) {
        self.in_flight = false;
        self.status = Some(PlacementStatus::Failed {
            message: message.into(),
        });
    }

    /// Drop an in-flight attempt whose answer will never be applied
    pub fn abandon(&mut self) {
        self.in_flight = false;
    }

    /// Cached occupancy can no longer be trusted
    pub fn mark_stale(&mut self) {
        self.box_stale = true;
    }

    /// Apply an authoritative copy of a box
    ///
    /// Clears the stale flag, and the coordinate if it is now occupied.
    pub fn refresh_box(&mut self, fresh: StorageBox) {
        if let Some(listed) = self.boxes.iter_mut().find(|b| b.id() == fresh.id()) {
            *listed = fresh.clone();
        }
        if self.selected_box.as_ref().is_some_and(|b| b.id() == fresh.id()) {
            if self.coordinate.as_deref().is_some_and(|c| is_occupied(&fresh, c)) {
                self.coordinate = None;
            }
            self.selected_box = Some(fresh);
            self.box_stale = false;
        }
    }

    /// Selected rack
    #[must_use]
    pub fn rack(&self) -> Option<&NodeId> {
        self.rack.as_ref()
    }

    /// Boxes of the selected rack
    #[must_use]
    pub fn boxes(&self) -> &[StorageBox] {
        &self.boxes
    }

    /// Selected box
    #[must_use]
    pub fn selected_box(&self) -> Option<&StorageBox> {
        self.selected_box.as_ref()
    }

    /// Selected coordinate
    #[must_use]
    pub fn coordinate(&self) -> Option<&str> {
        self.coordinate.as_deref()
    }

    /// Sample identifier as typed
    #[must_use]
    pub fn sample(&self) -> &str {
        &self.sample
    }

    /// Last outcome
    #[must_use]
    pub fn status(&self) -> Option<&PlacementStatus> {
        self.status.as_ref()
    }

    /// Whether occupancy must be re-fetched before placing
    #[must_use]
    pub fn is_box_stale(&self) -> bool {
        self.box_stale
    }
}

/// Async driver for a [`PlacementSession`]
pub struct BoxGridAssigner {
    api: Arc<dyn StorageApi>,
    scope: ViewScope,
}

impl BoxGridAssigner {
    /// Create an assigner bound to a view scope
    #[must_use]
    pub fn new(api: Arc<dyn StorageApi>, scope: ViewScope) -> Self {
        Self { api, scope }
    }

    /// Select a rack and load its boxes
    ///
    /// # Errors
    /// `EngineError::Api` if the listing fails, `EngineError::Stale` if the
    /// view moved on
    pub async fn load_rack(&self, session: &mut PlacementSession, rack_id: NodeId) -> Result<usize, EngineError> {
        session.select_rack(Some(rack_id.clone()));
        let ticket = self.scope.ticket();
        let boxes = self.api.list_boxes(&rack_id).await?;
        let boxes = ticket.accept(boxes)?;
        tracing::debug!(rack = %rack_id, boxes = boxes.len(), "loaded rack");
        let count = boxes.len();
        session.set_boxes(boxes);
        Ok(count)
    }

    /// Re-fetch the selected box
    ///
    /// # Errors
    /// `EngineError::Grid(NoBoxSelected)`, `EngineError::Api` or `EngineError::Stale`
    pub async fn refresh(&self, session: &mut PlacementSession) -> Result<(), EngineError> {
        let box_id = session
            .selected_box()
            .map(|b| b.id().clone())
            .ok_or(GridError::NoBoxSelected)?;
        let ticket = self.scope.ticket();
        let fresh = self.api.get_box(&box_id).await?;
        session.refresh_box(ticket.accept(fresh)?);
        Ok(())
    }

    /// Assign the session's sample to the selected coordinate
    ///
    /// # Errors
    /// - `EngineError::Grid` when a precondition is missing (nothing is sent)
    /// - `EngineError::Api` with the server's rejection; conflicts leave the
    ///   box marked stale until it is re-fetched
    /// - `EngineError::Stale` if the view moved on
    pub async fn assign(&self, session: &mut PlacementSession) -> Result<AssignmentReceipt, EngineError> {
        let target = session.begin()?;
        let ticket = self.scope.ticket();
        let result = self.api.assign_sample(&target.to_assignment()).await;
        if !ticket.is_current() {
            session.abandon();
            return Err(EngineError::Stale);
        }

        match result {
            Ok(receipt) => {
                tracing::info!(
                    sample = %target.sample_item_id,
                    box_id = %target.box_id,
                    coordinate = %target.coordinate,
                    "sample assigned"
                );
                session.finish_success(target.coordinate.clone(), receipt.hierarchical_path.clone());
                self.refetch_after_write(session).await;
                Ok(receipt)
            }
            Err(e) => Err(self.fail(session, &target, e).await),
        }
    }

    /// Move an already-placed sample to the selected coordinate
    ///
    /// # Errors
    /// Same as [`BoxGridAssigner::assign`]
    pub async fn move_sample(
        &self,
        session: &mut PlacementSession,
        reason: Option<String>,
    ) -> Result<MovementReceipt, EngineError> {
        let target = session.begin()?;
        let ticket = self.scope.ticket();
        let result = self.api.move_sample(&target.to_move(reason)).await;
        if !ticket.is_current() {
            session.abandon();
            return Err(EngineError::Stale);
        }

        match result {
            Ok(receipt) => {
                tracing::info!(
                    sample = %target.sample_item_id,
                    box_id = %target.box_id,
                    coordinate = %target.coordinate,
                    "sample moved"
                );
                session.finish_success(target.coordinate.clone(), receipt.hierarchical_path.clone());
                self.refetch_after_write(session).await;
                Ok(receipt)
            }
            Err(e) => Err(self.fail(session, &target, e).await),
        }
    }

    async fn fail(&self, session: &mut PlacementSession, target: &PlacementTarget, error: ApiError) -> EngineError {
        tracing::warn!(
            sample = %target.sample_item_id,
            box_id = %target.box_id,
            coordinate = %target.coordinate,
            error = %error,
            "placement rejected"
        );
        session.finish_failure(error.user_message(PLACEMENT_FALLBACK_MESSAGE));
        let error = EngineError::from(error);
        if error.invalidates_snapshot() {
            session.mark_stale();
            self.refetch_after_write(session).await;
        }
        error
    }

    async fn refetch_after_write(&self, session: &mut PlacementSession) {
        if let Err(e) = self.refresh(session).await {
            tracing::warn!(error = %e, "box re-fetch failed; occupancy marked stale");
            session.mark_stale();
        }
    }
}
