//! Property tests for the pure engine rules

use lis_engine::aliquot::{self, AliquotForm};
use lis_engine::api::CanDeleteResponse;
use lis_engine::capacity::{classify, occupancy_percent};
use lis_engine::grid::{self, letter};
use lis_engine::{CapacityClass, DeletionEvent, DeletionGuard, DeletionPhase, PlacementSession};
use lis_model::{LocationType, NodeId, SampleItem, StorageBox, StorageNode};
use proptest::prelude::*;
use std::collections::HashSet;

fn deletion_event() -> impl Strategy<Value = DeletionEvent> {
    prop_oneof![
        Just(DeletionEvent::Open),
        any::<bool>().prop_map(|admin| DeletionEvent::CheckCompleted(CanDeleteResponse::blocked(
            admin,
            "Cannot delete room: contains 2 device(s)"
        ))),
        any::<bool>().prop_map(|admin| DeletionEvent::CheckCompleted(CanDeleteResponse::deletable(admin))),
        Just(DeletionEvent::CheckFailed("timeout".into())),
        Just(DeletionEvent::SummaryRequested),
        Just(DeletionEvent::SummaryFailed),
        any::<bool>().prop_map(DeletionEvent::Acknowledge),
        Just(DeletionEvent::Confirm),
        Just(DeletionEvent::DeleteStarted),
        Just(DeletionEvent::DeleteSucceeded),
        Just(DeletionEvent::DeleteFailed),
        Just(DeletionEvent::DeleteConflict("constraint".into())),
        Just(DeletionEvent::Cancel),
    ]
}

proptest! {
    #[test]
    fn test_grid_labels_are_unique(rows in 1u32..30, cols in 1u32..30) {
        let storage_box = StorageBox::new(1u64, "Box", rows, cols);
        let labels = grid::labels(&storage_box);

        prop_assert_eq!(labels.len(), (rows * cols) as usize);
        prop_assert_eq!(labels.iter().collect::<HashSet<_>>().len(), labels.len());
        prop_assert_eq!(labels.first().map(String::as_str), Some("A1"));
        let expected_last = format!("{}{}", letter(rows - 1), cols);
        prop_assert_eq!(labels.last(), Some(&expected_last));
    }

    #[test]
    fn test_every_label_parses_back(rows in 1u32..30, cols in 1u32..12) {
        let storage_box = StorageBox::new(1u64, "Box", rows, cols);
        for label in grid::labels(&storage_box) {
            prop_assert_eq!(grid::select_coordinate(&storage_box, &label.to_lowercase()), Ok(label));
        }
    }

    #[test]
    fn test_split_conserves_quantity(thousandths in 1u32..1_000_000, count in 1i64..=100) {
        let quantity = f64::from(thousandths) / 1000.0;
        let parent = SampleItem::new("1", "S-1", quantity);
        let form = AliquotForm::new(quantity.to_string(), count);

        if let Ok(request) = aliquot::validate(&parent, &form) {
            let plan = aliquot::compute(&request);
            let total = plan.quantity_per_aliquot * count as f64;
            prop_assert!((total - quantity).abs() < 1e-6);
            prop_assert!(plan.quantity_per_aliquot >= aliquot::MIN_QUANTITY_PER_ALIQUOT);
        }
    }

    #[test]
    fn test_undetermined_capacity_has_no_percentage(occupied in 0u32..10_000) {
        let node = StorageNode::new(7u64, "Shelf").with_type(LocationType::Shelf).with_occupied(occupied);
        let report = classify(&node);
        prop_assert_eq!(report.class, CapacityClass::Undetermined);
        prop_assert_eq!(report.occupancy_pct, None);
        prop_assert_eq!(report.label(), "N/A");
    }

    #[test]
    fn test_percentage_is_capped(occupied in 0u32..100_000, capacity in 1u32..10_000) {
        let pct = occupancy_percent(occupied, capacity).unwrap();
        prop_assert!(pct <= 100);
        if occupied >= capacity {
            prop_assert_eq!(pct, 100);
        }
    }

    #[test]
    fn test_occupied_click_keeps_selection(row in 0u32..5, col in 0u32..10) {
        let occupied = format!("{}{}", letter(row), col + 1);
        let storage_box = StorageBox::new(9u64, "Box 9", 5, 10).with_occupied(occupied.as_str(), "1", "EXT-1");
        let mut session = PlacementSession::new();
        session.select_rack(Some(NodeId::from(3u64)));
        session.set_boxes(vec![storage_box]);
        session.select_box(&NodeId::from(9u64)).unwrap();

        let free = if occupied == "A1" { "B1" } else { "A1" };
        session.select_coordinate(free).unwrap();
        prop_assert!(session.select_coordinate(&occupied).is_err());
        prop_assert_eq!(session.coordinate(), Some(free));
    }

    #[test]
    fn test_non_admin_never_deletes_blocked_node(
        events in proptest::collection::vec(deletion_event(), 0..40)
    ) {
        let mut guard = DeletionGuard::new(LocationType::Room, 1u64, false);
        let mut blocked_since_check = false;
        for event in events {
            let before = guard.phase();
            let blocked_answer = matches!(
                &event,
                DeletionEvent::CheckCompleted(r) if r.is_blocked(LocationType::Room)
            );
            if guard.apply(event).is_err() {
                prop_assert_eq!(guard.phase(), before);
                continue;
            }
            match guard.phase() {
                DeletionPhase::CheckingConstraints => blocked_since_check = false,
                DeletionPhase::Blocked if before == DeletionPhase::CheckingConstraints => {
                    blocked_since_check = blocked_answer;
                }
                _ => {}
            }
            prop_assert!(guard.phase() != DeletionPhase::FetchingCascadeSummary);
            prop_assert!(guard.phase() != DeletionPhase::CascadeConfirmable);
            if blocked_since_check {
                prop_assert!(guard.phase() != DeletionPhase::Deleting);
            }
        }
    }
}
