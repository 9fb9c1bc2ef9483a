//! Sample items and aliquot hierarchy
//!
//! `effective_remaining_quantity` is derived exactly once, while the server
//! payload is deserialized: `remainingQuantity ?? quantity`. Views never
//! recompute the fallback.

use crate::de::null_as_default;
use crate::error::ModelError;
use crate::location::SampleItemId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A test ordered against a sample item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedTest {
    #[serde(default)]
    pub analysis_id: Option<String>,
    #[serde(default)]
    pub test_name: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Wire shape of a sample item, before derived fields are computed
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SampleItemWire {
    id: SampleItemId,
    #[serde(default, deserialize_with = "null_as_default")]
    external_id: String,
    #[serde(default)]
    sample_type_id: Option<String>,
    #[serde(default)]
    quantity: Option<f64>,
    #[serde(default)]
    unit_of_measure: Option<String>,
    #[serde(default)]
    remaining_quantity: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    is_aliquot: bool,
    #[serde(default, alias = "parentId")]
    parent_sample_item_id: Option<SampleItemId>,
    #[serde(default, deserialize_with = "null_as_default")]
    nesting_level: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    ordered_tests: Vec<OrderedTest>,
}

/// A physical sample item (possibly an aliquot of another)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "SampleItemWire")]
pub struct SampleItem {
    pub id: SampleItemId,
    pub external_id: String,
    pub sample_type_id: Option<String>,
    pub quantity: Option<f64>,
    pub unit_of_measure: Option<String>,
    pub remaining_quantity: Option<f64>,
    pub effective_remaining_quantity: Option<f64>,
    pub has_remaining_quantity: bool,
    pub is_aliquot: bool,
    pub parent_sample_item_id: Option<SampleItemId>,
    pub nesting_level: u32,
    pub ordered_tests: Vec<OrderedTest>,
}

impl From<SampleItemWire> for SampleItem {
    fn from(wire: SampleItemWire) -> Self {
        let effective = wire.remaining_quantity.or(wire.quantity);
        Self {
            id: wire.id,
            external_id: wire.external_id,
            sample_type_id: wire.sample_type_id,
            quantity: wire.quantity,
            unit_of_measure: wire.unit_of_measure,
            remaining_quantity: wire.remaining_quantity,
            effective_remaining_quantity: effective,
            has_remaining_quantity: effective.is_some_and(|q| q > 0.0),
            is_aliquot: wire.is_aliquot,
            parent_sample_item_id: wire.parent_sample_item_id,
            nesting_level: wire.nesting_level,
            ordered_tests: wire.ordered_tests,
        }
    }
}

impl SampleItem {
    /// Create a non-aliquot sample item with the given quantity
    #[must_use]
    pub fn new(id: impl Into<SampleItemId>, external_id: impl Into<String>, quantity: f64) -> Self {
        SampleItemWire {
            id: id.into(),
            external_id: external_id.into(),
            sample_type_id: None,
            quantity: Some(quantity),
            unit_of_measure: None,
            remaining_quantity: None,
            is_aliquot: false,
            parent_sample_item_id: None,
            nesting_level: 0,
            ordered_tests: Vec::new(),
        }
        .into()
    }

    /// With tracked remaining quantity (re-derives the effective value)
    #[must_use]
    pub fn with_remaining(mut self, remaining: Option<f64>) -> Self {
        self.remaining_quantity = remaining;
        self.effective_remaining_quantity = remaining.or(self.quantity);
        self.has_remaining_quantity = self.effective_remaining_quantity.is_some_and(|q| q > 0.0);
        self
    }

    /// Mark as aliquot of `parent`
    #[must_use]
    pub fn aliquot_of(mut self, parent: impl Into<SampleItemId>) -> Self {
        self.is_aliquot = true;
        self.parent_sample_item_id = Some(parent.into());
        self
    }

    /// With unit of measure
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit_of_measure = Some(unit.into());
        self
    }
}

/// Validated aliquot tree over one result set
#[derive(Debug, Clone, Default)]
pub struct SampleHierarchy {
    items: Vec<SampleItem>,
    index: HashMap<SampleItemId, usize>,
}

impl SampleHierarchy {
    /// Index a result set, verifying parents and recomputing nesting levels
    ///
    /// # Errors
    /// - `ModelError::OrphanAliquot` if a parent is not in the set
    /// - `ModelError::CyclicAliquot` if a parent chain loops
    pub fn build(mut items: Vec<SampleItem>) -> Result<Self, ModelError> {
        let index: HashMap<SampleItemId, usize> = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id.clone(), i))
            .collect();

        let mut levels = Vec::with_capacity(items.len());
        for item in &items {
            let mut depth = 0u32;
            let mut cursor = item;
            while let Some(parent_id) = &cursor.parent_sample_item_id {
                let Some(&parent_idx) = index.get(parent_id) else {
                    return Err(ModelError::OrphanAliquot {
                        aliquot: cursor.id.clone(),
                        parent: parent_id.clone(),
                    });
                };
                depth += 1;
                if depth as usize > items.len() {
                    return Err(ModelError::CyclicAliquot(item.id.clone()));
                }
                cursor = &items[parent_idx];
            }
            levels.push(depth);
        }

        for (item, level) in items.iter_mut().zip(levels) {
            item.nesting_level = level;
        }

        Ok(Self { items, index })
    }

    /// Look up an item
    #[must_use]
    pub fn get(&self, id: &SampleItemId) -> Option<&SampleItem> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    /// Direct aliquots of `id`, in result-set order
    pub fn children<'a>(&'a self, id: &'a SampleItemId) -> impl Iterator<Item = &'a SampleItem> + 'a {
        self.items
            .iter()
            .filter(move |item| item.parent_sample_item_id.as_ref() == Some(id))
    }

    /// Items in display order: each parent followed by its aliquots, depth first
    #[must_use]
    pub fn display_order(&self) -> Vec<&SampleItem> {
        let mut out = Vec::with_capacity(self.items.len());
        for root in self.items.iter().filter(|i| i.parent_sample_item_id.is_none()) {
            self.push_subtree(root, &mut out);
        }
        out
    }

    fn push_subtree<'a>(&'a self, item: &'a SampleItem, out: &mut Vec<&'a SampleItem>) {
        out.push(item);
        for child in self.children(&item.id) {
            self.push_subtree(child, out);
        }
    }

    /// All items in result-set order
    #[inline]
    #[must_use]
    pub fn items(&self) -> &[SampleItem] {
        &self.items
    }

    /// Number of items
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the result set is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_remaining_falls_back_to_quantity() {
        let item: SampleItem =
            serde_json::from_str(r#"{"id":"1","externalId":"S-1","quantity":5.0,"remainingQuantity":null}"#)
                .unwrap();
        assert_eq!(item.effective_remaining_quantity, Some(5.0));
        assert!(item.has_remaining_quantity);
    }

    #[test]
    fn tracked_zero_remaining_has_no_remaining() {
        let item = SampleItem::new("1", "S-1", 5.0).with_remaining(Some(0.0));
        assert_eq!(item.effective_remaining_quantity, Some(0.0));
        assert!(!item.has_remaining_quantity);
    }

    #[test]
    fn hierarchy_computes_nesting() {
        let items = vec![
            SampleItem::new("1", "S-1", 10.0),
            SampleItem::new("2", "S-1.1", 2.0).aliquot_of("1"),
            SampleItem::new("3", "S-1.1.1", 1.0).aliquot_of("2"),
        ];
        let tree = SampleHierarchy::build(items).unwrap();
        let levels: Vec<u32> = tree.items().iter().map(|i| i.nesting_level).collect();
        assert_eq!(levels, vec![0, 1, 2]);
    }

    #[test]
    fn hierarchy_rejects_orphans() {
        let items = vec![SampleItem::new("2", "S-1.1", 2.0).aliquot_of("1")];
        assert!(matches!(
            SampleHierarchy::build(items),
            Err(ModelError::OrphanAliquot { .. })
        ));
    }

    #[test]
    fn hierarchy_rejects_cycles() {
        let items = vec![
            SampleItem::new("1", "A", 1.0).aliquot_of("2"),
            SampleItem::new("2", "B", 1.0).aliquot_of("1"),
        ];
        assert!(matches!(
            SampleHierarchy::build(items),
            Err(ModelError::CyclicAliquot(_))
        ));
    }

    #[test]
    fn display_order_is_depth_first() {
        let items = vec![
            SampleItem::new("1", "S-1", 10.0),
            SampleItem::new("9", "S-9", 10.0),
            SampleItem::new("2", "S-1.1", 2.0).aliquot_of("1"),
        ];
        let tree = SampleHierarchy::build(items).unwrap();
        let ids: Vec<&str> = tree.display_order().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "9"]);
    }
}
