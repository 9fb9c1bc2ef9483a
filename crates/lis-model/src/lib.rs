//! LIS Model - storage hierarchy and sample items
//!
//! Transient, request-scoped copies of server-owned entities:
//! - Storage nodes (Room → Device → Shelf → Rack → Box) and their capacity fields
//! - Boxes with position schema and occupied coordinates
//! - Sample items with the derived `effective_remaining_quantity`
//! - A hierarchy index used for downward-inclusive location filters
//!
//! # Example
//!
//! ```rust
//! use lis_model::{LocationType, StorageNode};
//!
//! let shelf: StorageNode = serde_json::from_str(
//!     r#"{"id": 20, "label": "Shelf A", "occupiedCount": 3, "capacityLimit": 10}"#,
//! ).unwrap();
//!
//! assert_eq!(shelf.id.as_str(), "20");
//! assert_eq!(LocationType::Shelf.plural(), "shelves");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod location;
pub mod node;
pub mod sample;
pub mod tree;

mod de;

pub use error::ModelError;
pub use location::{LocationType, NodeId, SampleItemId};
pub use node::{CapacityKind, OccupiedSlot, PositionSchema, StorageBox, StorageNode};
pub use sample::{OrderedTest, SampleHierarchy, SampleItem};
pub use tree::{StorageTree, TreeKey};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
