use lis_model::{
    CapacityKind, LocationType, PositionSchema, SampleHierarchy, SampleItem, StorageBox, StorageNode,
    StorageTree, TreeKey,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[test]
fn test_device_listing_parses_capacity_fields() {
    let json = r#"[
        {"id": 5, "name": "Freezer A", "code": "FRZ-A", "active": true, "parentId": 1,
         "occupiedCount": 12, "capacityLimit": 50, "capacityType": "manual"},
        {"id": 6, "name": "Freezer B", "occupiedCount": null, "capacityType": null},
        {"id": 7, "name": "Freezer C", "occupiedCount": 3, "totalCapacity": 40, "capacityType": "calculated"}
    ]"#;

    let devices: Vec<StorageNode> = serde_json::from_str(json).unwrap();

    assert_eq!(devices[0].capacity_limit, Some(50));
    assert_eq!(devices[0].capacity_type, Some(CapacityKind::Manual));
    assert_eq!(devices[1].occupied_count, 0);
    assert_eq!(devices[1].capacity_type, None);
    assert!(devices[1].active);
    assert_eq!(devices[2].total_capacity, Some(40));
}

#[test]
fn test_box_payload_with_occupied_coordinates() {
    let json = r#"{
        "id": 9, "label": "Box 9", "type": "box", "rows": 5, "columns": 10,
        "positionSchemaHint": "letter-number", "parentId": 3, "occupiedCount": 2,
        "occupiedCoordinates": {
            "C4": {"sampleItemId": "101", "externalId": "EXT-101"},
            "A1": {"sampleItemId": "102"}
        }
    }"#;

    let b: StorageBox = serde_json::from_str(json).unwrap();

    assert_eq!(b.node.location_type, Some(LocationType::Box));
    assert_eq!(b.schema(), PositionSchema::LetterNumber);
    assert_eq!(b.rows(), 5);
    assert_eq!(b.occupied_coordinates.len(), 2);
    assert_eq!(b.occupied_coordinates["C4"].describe(), Some("EXT-101"));
    assert_eq!(b.occupied_coordinates["A1"].describe(), Some("102"));
}

#[test]
fn test_box_without_hint_or_occupancy() {
    let b: StorageBox =
        serde_json::from_str(r#"{"id": "b-1", "label": "Loose", "rows": 2, "columns": 2, "occupiedCoordinates": null}"#)
            .unwrap();
    assert_eq!(b.schema(), PositionSchema::LetterNumber);
    assert!(b.occupied_coordinates.is_empty());
}

#[test]
fn test_unknown_schema_hint_is_rejected() {
    let res: Result<StorageBox, _> =
        serde_json::from_str(r#"{"id": 1, "rows": 2, "columns": 2, "positionSchemaHint": "spiral"}"#);
    assert!(res.is_err());
}

#[test]
fn test_sample_result_set_builds_hierarchy() {
    let json = r#"[
        {"id": "10", "externalId": "S-10", "quantity": 5.0, "remainingQuantity": 2.5, "unitOfMeasure": "mL",
         "orderedTests": [{"analysisId": "a1", "testName": "CBC", "status": "NotStarted"}]},
        {"id": "11", "externalId": "S-10.1", "quantity": 1.25, "isAliquot": true, "parentId": "10"},
        {"id": "12", "externalId": "S-10.2", "quantity": 1.25, "remainingQuantity": 0, "isAliquot": true,
         "parentSampleItemId": "10"}
    ]"#;

    let items: Vec<SampleItem> = serde_json::from_str(json).unwrap();
    assert_eq!(items[0].effective_remaining_quantity, Some(2.5));
    assert_eq!(items[1].effective_remaining_quantity, Some(1.25));
    assert!(!items[2].has_remaining_quantity);
    assert_eq!(items[0].ordered_tests[0].test_name, "CBC");

    let tree = SampleHierarchy::build(items).unwrap();
    assert_eq!(tree.len(), 3);
    assert_eq!(tree.children(&"10".into()).count(), 2);
    assert!(tree.items().iter().skip(1).all(|i| i.nesting_level == 1));
}

#[test]
fn test_filter_matches_descendants_only() {
    let mut tree = StorageTree::new();
    tree.insert(LocationType::Room, StorageNode::new(1u64, "Main Lab"));
    tree.insert(LocationType::Room, StorageNode::new(2u64, "Annex"));
    tree.insert(LocationType::Device, StorageNode::new(10u64, "Fridge").with_parent(1u64));
    tree.insert(LocationType::Device, StorageNode::new(11u64, "Cabinet").with_parent(2u64));
    tree.validate().unwrap();

    let main_lab = TreeKey::new(LocationType::Room, 1u64);
    assert!(tree.matches_filter(&main_lab, &main_lab));
    assert!(tree.matches_filter(&main_lab, &TreeKey::new(LocationType::Device, 10u64)));
    assert!(!tree.matches_filter(&main_lab, &TreeKey::new(LocationType::Device, 11u64)));
}

proptest! {
    #[test]
    fn prop_parse_accepts_every_rendering(idx in 0usize..5, upper in any::<bool>(), plural in any::<bool>()) {
        let kind = LocationType::ALL[idx];
        let name = if plural { kind.plural() } else { kind.as_str() };
        let name = if upper { name.to_ascii_uppercase() } else { name.to_string() };
        prop_assert_eq!(name.parse::<LocationType>().unwrap(), kind);
    }
}
