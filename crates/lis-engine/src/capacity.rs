//! Capacity classification and occupancy
//!
//! Capacity is resolved in a fixed order:
//! 1. A positive manual `capacityLimit` (ignored on racks)
//! 2. Grid dimensions, `rows × columns`
//! 3. A server-computed `totalCapacity` on nodes the server marks calculated
//! 4. Otherwise undetermined
//!
//! Undetermined capacity has no percentage. It renders "N/A", never 0%.

use lis_model::{CapacityKind, LocationType, StorageNode, StorageTree, TreeKey};
use std::fmt;

/// Percentage at which occupancy becomes a warning
pub const WARNING_THRESHOLD: u8 = 70;
/// Percentage at which occupancy becomes critical
pub const CRITICAL_THRESHOLD: u8 = 90;

/// How a node's capacity was determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapacityClass {
    /// Explicit limit set by an operator
    Manual,
    /// Derived from dimensions or the child rollup
    Calculated,
    /// Not derivable
    Undetermined,
}

impl From<CapacityKind> for CapacityClass {
    fn from(kind: CapacityKind) -> Self {
        match kind {
            CapacityKind::Manual => Self::Manual,
            CapacityKind::Calculated => Self::Calculated,
        }
    }
}

/// Occupancy severity band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    /// Below 70%
    Ok,
    /// 70% to 89%
    Warning,
    /// 90% and above
    Critical,
}

impl Severity {
    /// Band for a percentage
    #[must_use]
    pub fn from_pct(pct: u8) -> Self {
        if pct >= CRITICAL_THRESHOLD {
            Self::Critical
        } else if pct >= WARNING_THRESHOLD {
            Self::Warning
        } else {
            Self::Ok
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Critical => "critical",
        })
    }
}

/// Result of classifying one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityReport {
    pub class: CapacityClass,
    pub capacity: Option<u32>,
    pub occupied: u32,
    pub occupancy_pct: Option<u8>,
}

impl CapacityReport {
    fn determined(class: CapacityClass, capacity: u32, occupied: u32) -> Self {
        Self {
            class,
            capacity: Some(capacity),
            occupied,
            occupancy_pct: occupancy_percent(occupied, capacity),
        }
    }

    fn undetermined(occupied: u32) -> Self {
        Self {
            class: CapacityClass::Undetermined,
            capacity: None,
            occupied,
            occupancy_pct: None,
        }
    }

    /// Severity band, `None` when capacity is undetermined
    #[must_use]
    pub fn severity(&self) -> Option<Severity> {
        self.occupancy_pct.map(Severity::from_pct)
    }

    /// `"12/50 (24%)"` or `"N/A"`
    #[must_use]
    pub fn label(&self) -> String {
        occupancy_label(self.occupied, self.capacity)
    }
}

/// `round(100 × occupied / capacity)`, capped at 100; `None` for zero capacity
#[must_use]
pub fn occupancy_percent(occupied: u32, capacity: u32) -> Option<u8> {
    if capacity == 0 {
        return None;
    }
    let occ = u64::from(occupied);
    let cap = u64::from(capacity);
    let pct = ((200 * occ + cap) / (2 * cap)).min(100);
    u8::try_from(pct).ok()
}

/// Render occupancy for display
#[must_use]
pub fn occupancy_label(occupied: u32, capacity: Option<u32>) -> String {
    match capacity.and_then(|cap| occupancy_percent(occupied, cap).map(|pct| (cap, pct))) {
        Some((cap, pct)) => format!("{occupied}/{cap} ({pct}%)"),
        None => "N/A".to_string(),
    }
}

/// Classify a node using its own fields
#[must_use]
pub fn classify(node: &StorageNode) -> CapacityReport {
    let occupied = node.occupied_count;
    let is_rack = node.location_type == Some(LocationType::Rack);

    if !is_rack {
        if let Some(limit) = node.capacity_limit.filter(|&l| l > 0) {
            return CapacityReport::determined(CapacityClass::Manual, limit, occupied);
        }
    }

    if let Some((rows, columns)) = node.grid() {
        return CapacityReport::determined(CapacityClass::Calculated, rows.saturating_mul(columns), occupied);
    }

    if node.capacity_type == Some(CapacityKind::Calculated) {
        if let Some(total) = node.total_capacity.filter(|&t| t > 0) {
            return CapacityReport::determined(CapacityClass::Calculated, total, occupied);
        }
    }

    CapacityReport::undetermined(occupied)
}

/// Classify a node from its position in a loaded hierarchy
///
/// Falls back to [`rollup_capacity`] when the node's own fields leave the
/// capacity undetermined.
#[must_use]
pub fn classify_in_tree(tree: &StorageTree, key: &TreeKey) -> Option<CapacityReport> {
    let node = tree.get(key)?;
    let own = classify(node);
    if own.class != CapacityClass::Undetermined {
        return Some(own);
    }
    Some(match rollup_capacity(tree, key) {
        Some(capacity) => CapacityReport::determined(CapacityClass::Calculated, capacity, node.occupied_count),
        None => own,
    })
}

/// Two-tier capacity rollup over a loaded hierarchy
///
/// - A manual limit wins (except on racks)
/// - Boxes use their grid
/// - Racks use their own grid, else the sum of their boxes' grids
/// - Shelves sum the grids of every box in their racks
/// - Rooms and devices sum their children; any undetermined child, or no
///   children at all, makes the parent undetermined
#[must_use]
pub fn rollup_capacity(tree: &StorageTree, key: &TreeKey) -> Option<u32> {
    let node = tree.get(key)?;

    if key.kind != LocationType::Rack {
        if let Some(limit) = node.capacity_limit.filter(|&l| l > 0) {
            return Some(limit);
        }
    }

    match key.kind {
        LocationType::Box => node.grid().map(|(r, c)| r.saturating_mul(c)),
        LocationType::Rack => node
            .grid()
            .map(|(r, c)| r.saturating_mul(c))
            .or_else(|| positive(box_grid_total(tree, key))),
        LocationType::Shelf => positive(
            tree.children_of(key)
                .iter()
                .map(|rack| box_grid_total(tree, rack))
                .fold(0u32, u32::saturating_add),
        ),
        LocationType::Room | LocationType::Device => {
            let children = tree.children_of(key);
            if children.is_empty() {
                return None;
            }
            children
                .iter()
                .map(|child| rollup_capacity(tree, child))
                .try_fold(0u32, |acc, cap| cap.map(|c| acc.saturating_add(c)))
        }
    }
}

fn box_grid_total(tree: &StorageTree, rack: &TreeKey) -> u32 {
    tree.children_of(rack)
        .iter()
        .filter_map(|b| tree.get(b))
        .filter_map(StorageNode::grid)
        .map(|(r, c)| r.saturating_mul(c))
        .fold(0u32, u32::saturating_add)
}

fn positive(total: u32) -> Option<u32> {
    (total > 0).then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_limit_wins() {
        let node = StorageNode::new(1u64, "Freezer")
            .with_type(LocationType::Device)
            .with_capacity_limit(50)
            .with_grid(2, 2)
            .with_occupied(12);
        let report = classify(&node);
        assert_eq!(report.class, CapacityClass::Manual);
        assert_eq!(report.capacity, Some(50));
        assert_eq!(report.occupancy_pct, Some(24));
        assert_eq!(report.label(), "12/50 (24%)");
    }

    #[test]
    fn rack_ignores_limit() {
        let rack = StorageNode::new(3u64, "R3")
            .with_type(LocationType::Rack)
            .with_capacity_limit(500)
            .with_grid(4, 5);
        let report = classify(&rack);
        assert_eq!(report.class, CapacityClass::Calculated);
        assert_eq!(report.capacity, Some(20));
    }

    #[test]
    fn undetermined_is_never_zero_percent() {
        let node = StorageNode::new(1u64, "Room").with_type(LocationType::Room).with_occupied(0);
        let report = classify(&node);
        assert_eq!(report.class, CapacityClass::Undetermined);
        assert_eq!(report.occupancy_pct, None);
        assert_eq!(report.severity(), None);
        assert_eq!(report.label(), "N/A");
    }

    #[test]
    fn server_total_used_when_calculated() {
        let mut node = StorageNode::new(1u64, "Shelf").with_type(LocationType::Shelf).with_occupied(10);
        node.capacity_type = Some(CapacityKind::Calculated);
        node.total_capacity = Some(40);
        assert_eq!(classify(&node).occupancy_pct, Some(25));
    }

    #[test]
    fn percentage_rounds_half_up_and_caps() {
        assert_eq!(occupancy_percent(1, 3), Some(33));
        assert_eq!(occupancy_percent(2, 3), Some(67));
        assert_eq!(occupancy_percent(1, 200), Some(1));
        assert_eq!(occupancy_percent(1, 8), Some(13));
        assert_eq!(occupancy_percent(12, 10), Some(100));
        assert_eq!(occupancy_percent(5, 0), None);
    }

    #[test]
    fn severity_bands() {
        assert_eq!(Severity::from_pct(69), Severity::Ok);
        assert_eq!(Severity::from_pct(70), Severity::Warning);
        assert_eq!(Severity::from_pct(89), Severity::Warning);
        assert_eq!(Severity::from_pct(90), Severity::Critical);
    }

    fn tree() -> StorageTree {
        let mut tree = StorageTree::new();
        tree.insert(LocationType::Room, StorageNode::new(1u64, "Lab"));
        tree.insert(LocationType::Device, StorageNode::new(2u64, "Freezer").with_parent(1u64));
        tree.insert(LocationType::Shelf, StorageNode::new(3u64, "Top").with_parent(2u64));
        tree.insert(LocationType::Rack, StorageNode::new(4u64, "R1").with_parent(3u64));
        tree.insert(LocationType::Box, StorageNode::new(5u64, "B1").with_parent(4u64).with_grid(9, 9));
        tree.insert(LocationType::Box, StorageNode::new(6u64, "B2").with_parent(4u64).with_grid(5, 10));
        tree
    }

    #[test]
    fn rollup_sums_boxes_through_racks() {
        let tree = tree();
        assert_eq!(rollup_capacity(&tree, &TreeKey::new(LocationType::Rack, 4u64)), Some(131));
        assert_eq!(rollup_capacity(&tree, &TreeKey::new(LocationType::Shelf, 3u64)), Some(131));
        assert_eq!(rollup_capacity(&tree, &TreeKey::new(LocationType::Room, 1u64)), Some(131));
    }

    #[test]
    fn rollup_undetermined_child_poisons_parent() {
        let mut tree = tree();
        tree.insert(LocationType::Shelf, StorageNode::new(7u64, "Empty").with_parent(2u64));
        assert_eq!(rollup_capacity(&tree, &TreeKey::new(LocationType::Device, 2u64)), None);

        tree.get_mut(&TreeKey::new(LocationType::Shelf, 7u64))
            .unwrap()
            .capacity_limit = Some(19);
        assert_eq!(rollup_capacity(&tree, &TreeKey::new(LocationType::Device, 2u64)), Some(150));
    }

    #[test]
    fn room_without_children_is_undetermined() {
        let mut tree = StorageTree::new();
        tree.insert(LocationType::Room, StorageNode::new(1u64, "Bare"));
        let key = TreeKey::new(LocationType::Room, 1u64);
        assert_eq!(rollup_capacity(&tree, &key), None);
        assert_eq!(classify_in_tree(&tree, &key).unwrap().label(), "N/A");
    }
}
