//! Hierarchy index over storage nodes
//!
//! Node ids are only unique within one location type, so the tree is keyed
//! by `(LocationType, NodeId)`.

use crate::error::ModelError;
use crate::location::{LocationType, NodeId};
use crate::node::StorageNode;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Key of a node in the hierarchy
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TreeKey {
    pub kind: LocationType,
    pub id: NodeId,
}

impl TreeKey {
    /// Create key
    #[inline]
    #[must_use]
    pub fn new(kind: LocationType, id: impl Into<NodeId>) -> Self {
        Self { kind, id: id.into() }
    }
}

impl fmt::Display for TreeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// In-memory hierarchy of rooms, devices, shelves, racks and boxes
#[derive(Debug, Clone, Default)]
pub struct StorageTree {
    nodes: BTreeMap<TreeKey, StorageNode>,
    children: BTreeMap<TreeKey, BTreeSet<TreeKey>>,
}

impl StorageTree {
    /// Create empty tree
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node
    ///
    /// The parent does not have to be present yet; call [`StorageTree::validate`]
    /// once all listings are loaded.
    pub fn insert(&mut self, kind: LocationType, mut node: StorageNode) -> TreeKey {
        node.location_type = Some(kind);
        let key = TreeKey::new(kind, node.id.clone());

        if let Some(previous) = self.nodes.get(&key) {
            if let Some(old_parent) = Self::parent_key_of(kind, previous) {
                if let Some(siblings) = self.children.get_mut(&old_parent) {
                    siblings.remove(&key);
                }
            }
        }

        if let Some(parent) = Self::parent_key_of(kind, &node) {
            self.children.entry(parent).or_default().insert(key.clone());
        }
        self.nodes.insert(key.clone(), node);
        key
    }

    /// Remove a node and every descendant, returning how many were removed
    pub fn remove_subtree(&mut self, key: &TreeKey) -> usize {
        let doomed = self.descendants_inclusive(key);
        if let Some(parent) = self.parent_of(key) {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.remove(key);
            }
        }
        for k in &doomed {
            self.nodes.remove(k);
            self.children.remove(k);
        }
        doomed.len()
    }

    /// Look up a node
    #[must_use]
    pub fn get(&self, key: &TreeKey) -> Option<&StorageNode> {
        self.nodes.get(key)
    }

    /// Mutable lookup
    pub fn get_mut(&mut self, key: &TreeKey) -> Option<&mut StorageNode> {
        self.nodes.get_mut(key)
    }

    /// Parent key, when the node has one
    #[must_use]
    pub fn parent_of(&self, key: &TreeKey) -> Option<TreeKey> {
        self.nodes
            .get(key)
            .and_then(|node| Self::parent_key_of(key.kind, node))
    }

    /// Direct children
    #[must_use]
    pub fn children_of(&self, key: &TreeKey) -> Vec<TreeKey> {
        self.children
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The node and everything beneath it (the downward-inclusive filter set)
    #[must_use]
    pub fn descendants_inclusive(&self, key: &TreeKey) -> Vec<TreeKey> {
        let mut out = Vec::new();
        if !self.nodes.contains_key(key) {
            return out;
        }
        let mut stack = vec![key.clone()];
        while let Some(current) = stack.pop() {
            if let Some(kids) = self.children.get(&current) {
                stack.extend(kids.iter().rev().cloned());
            }
            out.push(current);
        }
        out
    }

    /// Whether `candidate` lies at or beneath `filter`
    #[must_use]
    pub fn matches_filter(&self, filter: &TreeKey, candidate: &TreeKey) -> bool {
        if filter == candidate {
            return self.nodes.contains_key(candidate);
        }
        self.ancestors(candidate).iter().any(|a| a == filter)
    }

    /// Ancestors from the direct parent up to the room
    #[must_use]
    pub fn ancestors(&self, key: &TreeKey) -> Vec<TreeKey> {
        let mut out = Vec::new();
        let mut cursor = self.parent_of(key);
        while let Some(parent) = cursor {
            if !self.nodes.contains_key(&parent) || out.len() > LocationType::ALL.len() {
                break;
            }
            cursor = self.parent_of(&parent);
            out.push(parent);
        }
        out
    }

    /// `Room > Device > Shelf > Rack > Box` style path
    #[must_use]
    pub fn hierarchical_path(&self, key: &TreeKey) -> Option<String> {
        let node = self.nodes.get(key)?;
        let mut parts: Vec<&str> = self
            .ancestors(key)
            .iter()
            .filter_map(|k| self.nodes.get(k))
            .map(StorageNode::display_name)
            .collect();
        parts.reverse();
        parts.push(node.display_name());
        Some(parts.join(" > "))
    }

    /// Nodes of one level
    pub fn of_kind(&self, kind: LocationType) -> impl Iterator<Item = (&TreeKey, &StorageNode)> {
        self.nodes.iter().filter(move |(k, _)| k.kind == kind)
    }

    /// Check every non-room node has its parent indexed
    ///
    /// # Errors
    /// `ModelError::MissingParent` naming the first dangling node
    pub fn validate(&self) -> Result<(), ModelError> {
        for (key, node) in &self.nodes {
            if let Some(parent) = Self::parent_key_of(key.kind, node) {
                if !self.nodes.contains_key(&parent) {
                    return Err(ModelError::MissingParent {
                        kind: key.kind.to_string(),
                        id: key.id.to_string(),
                        parent: parent.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Number of indexed nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when nothing is indexed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn parent_key_of(kind: LocationType, node: &StorageNode) -> Option<TreeKey> {
        match (kind.parent(), &node.parent_id) {
            (Some(parent_kind), Some(parent_id)) => Some(TreeKey::new(parent_kind, parent_id.clone())),
            _ => None,
        }
    }
}
