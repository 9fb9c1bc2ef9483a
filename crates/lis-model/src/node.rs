//! Storage nodes and boxes

use crate::de::{default_true, null_as_default, null_as_true};
use crate::error::ModelError;
use crate::location::{LocationType, NodeId, SampleItemId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Capacity classification reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityKind {
    /// Explicit `capacityLimit`
    Manual,
    /// Derived from grid dimensions or children
    Calculated,
}

/// A node in the storage hierarchy (room, device, shelf, rack or box)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageNode {
    pub id: NodeId,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub location_type: Option<LocationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default = "default_true", deserialize_with = "null_as_true")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub occupied_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<u32>,
    #[serde(default)]
    pub capacity_type: Option<CapacityKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_capacity: Option<u32>,
}

impl StorageNode {
    /// Create a bare node with no capacity information
    #[must_use]
    pub fn new(id: impl Into<NodeId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location_type: None,
            name: None,
            label: Some(label.into()),
            code: None,
            active: true,
            parent_id: None,
            occupied_count: 0,
            capacity_limit: None,
            rows: None,
            columns: None,
            capacity_type: None,
            total_capacity: None,
        }
    }

    /// With location type
    #[must_use]
    pub fn with_type(mut self, location_type: LocationType) -> Self {
        self.location_type = Some(location_type);
        self
    }

    /// With parent id
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<NodeId>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    /// With manual capacity limit
    #[must_use]
    pub fn with_capacity_limit(mut self, limit: u32) -> Self {
        self.capacity_limit = Some(limit);
        self.capacity_type = Some(CapacityKind::Manual);
        self
    }

    /// With grid dimensions
    #[must_use]
    pub fn with_grid(mut self, rows: u32, columns: u32) -> Self {
        self.rows = Some(rows);
        self.columns = Some(columns);
        self
    }

    /// With occupied count
    #[must_use]
    pub fn with_occupied(mut self, occupied: u32) -> Self {
        self.occupied_count = occupied;
        self
    }

    /// Human-facing name: label, then name, then code
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.label
            .as_deref()
            .or(self.name.as_deref())
            .or(self.code.as_deref())
            .unwrap_or("Location")
    }

    /// Grid dimensions when both are positive
    #[inline]
    #[must_use]
    pub fn grid(&self) -> Option<(u32, u32)> {
        match (self.rows, self.columns) {
            (Some(r), Some(c)) if r > 0 && c > 0 => Some((r, c)),
            _ => None,
        }
    }
}

/// Coordinate labelling scheme for a box grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PositionSchema {
    /// `A1`, `A2`, ..., `B1`
    #[default]
    LetterNumber,
    /// `1-1`, `1-2`, ..., `2-1`
    NumberNumber,
}

impl PositionSchema {
    /// Wire name of the schema hint
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PositionSchema::LetterNumber => "letter-number",
            PositionSchema::NumberNumber => "number-number",
        }
    }
}

impl fmt::Display for PositionSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionSchema {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "letter-number" => Ok(PositionSchema::LetterNumber),
            "number-number" => Ok(PositionSchema::NumberNumber),
            _ => Err(ModelError::UnknownPositionSchema(s.to_string())),
        }
    }
}

impl Serialize for PositionSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PositionSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Sample occupying one box coordinate
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupiedSlot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_item_id: Option<SampleItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl OccupiedSlot {
    /// Tooltip text: external id, else sample item id
    #[must_use]
    pub fn describe(&self) -> Option<&str> {
        self.external_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.sample_item_id.as_ref().map(SampleItemId::as_str))
    }
}

/// A box: the leaf capacity node holding a coordinate grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageBox {
    #[serde(flatten)]
    pub node: StorageNode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_schema_hint: Option<PositionSchema>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub occupied_coordinates: BTreeMap<String, OccupiedSlot>,
}

impl StorageBox {
    /// Create an empty box with the given grid
    #[must_use]
    pub fn new(id: impl Into<NodeId>, label: impl Into<String>, rows: u32, columns: u32) -> Self {
        Self {
            node: StorageNode::new(id, label)
                .with_type(LocationType::Box)
                .with_grid(rows, columns),
            position_schema_hint: None,
            occupied_coordinates: BTreeMap::new(),
        }
    }

    /// With explicit position schema
    #[must_use]
    pub fn with_schema(mut self, schema: PositionSchema) -> Self {
        self.position_schema_hint = Some(schema);
        self
    }

    /// With an occupied coordinate
    #[must_use]
    pub fn with_occupied(
        mut self,
        coordinate: impl Into<String>,
        sample_item_id: impl Into<SampleItemId>,
        external_id: impl Into<String>,
    ) -> Self {
        self.occupied_coordinates.insert(
            coordinate.into(),
            OccupiedSlot {
                sample_item_id: Some(sample_item_id.into()),
                external_id: Some(external_id.into()),
            },
        );
        self.node.occupied_count = u32::try_from(self.occupied_coordinates.len()).unwrap_or(u32::MAX);
        self
    }

    /// Box id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.node.id
    }

    /// Effective schema (absent hint means letter-number)
    #[inline]
    #[must_use]
    pub fn schema(&self) -> PositionSchema {
        self.position_schema_hint.unwrap_or_default()
    }

    /// Rows (0 when unknown)
    #[inline]
    #[must_use]
    pub fn rows(&self) -> u32 {
        self.node.rows.unwrap_or(0)
    }

    /// Columns (0 when unknown)
    #[inline]
    #[must_use]
    pub fn columns(&self) -> u32 {
        self.node.columns.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_prefers_label() {
        let mut node = StorageNode::new(1u64, "Rack 1");
        node.name = Some("ignored".into());
        assert_eq!(node.display_name(), "Rack 1");
        node.label = None;
        assert_eq!(node.display_name(), "ignored");
    }

    #[test]
    fn grid_requires_positive_dimensions() {
        assert_eq!(StorageNode::new(1u64, "r").with_grid(0, 5).grid(), None);
        assert_eq!(StorageNode::new(1u64, "r").with_grid(2, 5).grid(), Some((2, 5)));
    }

    #[test]
    fn schema_defaults_to_letter_number() {
        let b = StorageBox::new(1u64, "Box", 9, 9);
        assert_eq!(b.schema(), PositionSchema::LetterNumber);
    }

    #[test]
    fn slot_description_falls_back_to_sample_id() {
        let slot = OccupiedSlot {
            sample_item_id: Some("55".into()),
            external_id: Some(String::new()),
        };
        assert_eq!(slot.describe(), Some("55"));
    }
}
