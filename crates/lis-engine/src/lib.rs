//! LIS Engine - storage placement rules
//!
//! Decision logic behind the storage and sample-management screens:
//! - Capacity classification, occupancy percentage and the hierarchical rollup
//! - Volume-conserving aliquot splits
//! - Box-grid coordinate selection, assignment and movement
//! - Constraint-checked deletion with an admin cascade path
//!
//! Every network effect goes through the [`StorageApi`] trait; the pure parts
//! (`classify`, `validate`, `select_coordinate`, the deletion state machine)
//! never touch it.
//!
//! # Example
//!
//! ```rust
//! use lis_engine::aliquot::{preview, AliquotForm};
//! use lis_engine::capacity::classify;
//! use lis_model::{LocationType, SampleItem, StorageNode};
//!
//! let freezer = StorageNode::new(5u64, "Freezer A")
//!     .with_type(LocationType::Device)
//!     .with_capacity_limit(50)
//!     .with_occupied(12);
//! assert_eq!(classify(&freezer).label(), "12/50 (24%)");
//!
//! let parent = SampleItem::new("1", "S-1", 10.0);
//! assert_eq!(preview(&parent, &AliquotForm::new("10", 3)).unwrap(), "3.333");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod aliquot;
pub mod api;
pub mod capacity;
pub mod config;
pub mod deletion;
pub mod error;
pub mod grid;
pub mod sample_ops;
pub mod scope;

pub use aliquot::{AliquotForm, AliquotPlan, AliquotRequest, AliquotSplit, AliquotSplitter};
pub use api::{
    AddTestsRequest, AddTestsResponse, AliquotResponse, AliquotSubmission, AssignmentReceipt,
    AssignmentRequest, CanDeleteResponse, CancelTestRequest, CancelTestResponse, CascadeSummary,
    MoveRequest, MovementReceipt, NodeFilter, StorageApi, TestAdditionResult,
};
pub use capacity::{classify, CapacityClass, CapacityReport, Severity};
pub use config::{Actor, EngineConfig};
pub use deletion::{
    CheckFailurePolicy, DeletionAction, DeletionEvent, DeletionGuard, DeletionOutcome, DeletionPhase,
    DeletionState, DeletionWorkflow,
};
pub use error::{
    AliquotValidationError, ApiError, DeletionError, EngineError, ErrorClass, GridError, ServerMessage,
    VolumeDiscrepancy,
};
pub use grid::{BoxGridAssigner, PlacementPhase, PlacementSession, PlacementStatus, PlacementTarget};
pub use sample_ops::{partition_eligible, Eligibility, SampleOperations};
pub use scope::{ScopeTicket, ViewScope};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the engine
    pub use crate::{
        Actor, AliquotForm, AliquotSplitter, BoxGridAssigner, CapacityReport, DeletionEvent,
        DeletionGuard, DeletionWorkflow, EngineConfig, EngineError, PlacementSession, SampleOperations,
        StorageApi, ViewScope,
    };
    pub use lis_model::{LocationType, NodeId, SampleItem, StorageBox, StorageNode};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod flow_tests {
    use super::*;
    use lis_model::{LocationType, NodeId, SampleItem, StorageBox};

    #[test]
    fn placement_flow_without_network() {
        let mut session = PlacementSession::new();
        session.select_rack(Some(NodeId::from(3u64)));
        session.set_boxes(vec![StorageBox::new(9u64, "Box 9", 5, 10).with_occupied("C4", "1", "EXT-1")]);
        session.select_box(&NodeId::from(9u64)).unwrap();

        assert_eq!(
            session.select_coordinate("C4"),
            Err(GridError::Occupied { coordinate: "C4".into() })
        );
        assert_eq!(session.coordinate(), None);
        assert_eq!(session.phase(), PlacementPhase::BoxSelected);
    }

    #[test]
    fn admin_role_drives_deletion_guard() {
        let config = EngineConfig::default();
        let actor = Actor::with_roles(["Global Administrator"]);
        let guard = DeletionGuard::new(LocationType::Room, 1u64, actor.is_admin(&config));
        assert_eq!(guard.phase(), DeletionPhase::Idle);
    }

    #[test]
    fn aliquot_errors_are_local() {
        let parent = SampleItem::new("1", "S-1", 1.0);
        let err = EngineError::from(aliquot::validate(&parent, &AliquotForm::new("", 2)).unwrap_err());
        assert!(err.is_local());
        assert!(!err.is_retryable());
    }
}
