use gqc_artifact::{
    Artifact, ArtifactKind, CachePolicy, FieldSelection, ListPosition, MutationOperation,
    PaginateDirection, PaginateMethod, RefetchSpec, RefetchUpdate, SubscriptionSelection,
    document_hash,
};
use serde_json::json;

fn all_items_artifact() -> Artifact {
    let raw = "query AllItems { allItems { id completed } }";

    let mut item_fields = SubscriptionSelection::default();
    item_fields
        .fields
        .insert("id".to_string(), FieldSelection::new("ID", "id"));
    item_fields.fields.insert(
        "completed".to_string(),
        FieldSelection::new("Boolean", "completed"),
    );

    let mut selection = SubscriptionSelection::default();
    selection.fields.insert(
        "allItems".to_string(),
        FieldSelection::new("TodoItem", "allItems")
            .with_list("All_Items", "TodoItem")
            .with_selection(item_fields),
    );

    Artifact {
        name: "AllItems".to_string(),
        kind: ArtifactKind::Query,
        hash: document_hash(raw),
        raw: raw.to_string(),
        root_type: "Query".to_string(),
        selection,
        input: None,
        refetch: None,
        policy: Some(CachePolicy::CacheOrNetwork),
        partial: false,
    }
}

#[test]
fn artifact_round_trips_through_json() {
    let artifact = all_items_artifact();
    let serialized = serde_json::to_string(&artifact).unwrap();
    let parsed: Artifact = serde_json::from_str(&serialized).unwrap();
    assert_eq!(parsed, artifact);
}

#[test]
fn artifact_serializes_wire_field_names() {
    let artifact = all_items_artifact();
    let value = serde_json::to_value(&artifact).unwrap();

    assert_eq!(value["kind"], json!("HoudiniQuery"));
    assert_eq!(value["rootType"], json!("Query"));
    assert_eq!(value["policy"], json!("CacheOrNetwork"));

    let all_items = &value["selection"]["fields"]["allItems"];
    assert_eq!(all_items["type"], json!("TodoItem"));
    assert_eq!(all_items["keyRaw"], json!("allItems"));
    assert_eq!(all_items["list"]["name"], json!("All_Items"));
    assert_eq!(all_items["list"]["type"], json!("TodoItem"));

    // Empty markers stay off the wire.
    assert!(all_items.get("operations").is_none());
    assert!(all_items.get("nullable").is_none());
    assert!(value.get("refetch").is_none());
    assert!(value.get("partial").is_none());
}

#[test]
fn operations_serialize_with_their_guards() {
    let operation = MutationOperation::insert("All_Items")
        .with_position(ListPosition::Last)
        .with_when(gqc_artifact::WhenFilter::must_not(
            [("completed".to_string(), json!(true))].into_iter().collect(),
        ));

    let value = serde_json::to_value(&operation).unwrap();
    assert_eq!(value["action"], json!("insert"));
    assert_eq!(value["list"], json!("All_Items"));
    assert_eq!(value["position"], json!("last"));
    assert_eq!(value["when"]["must_not"]["completed"], json!(true));

    let parsed: MutationOperation = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, operation);
}

#[test]
fn refetch_spec_round_trips() {
    let refetch = RefetchSpec {
        update: RefetchUpdate::Append,
        path: vec!["user".to_string(), "friends".to_string()],
        method: PaginateMethod::Cursor,
        page_size: 10,
        embedded: true,
        target_type: "User".to_string(),
        direction: PaginateDirection::Forward,
    };

    let value = serde_json::to_value(&refetch).unwrap();
    assert_eq!(value["method"], json!("cursor"));
    assert_eq!(value["pageSize"], json!(10));
    assert_eq!(value["targetType"], json!("User"));

    let parsed: RefetchSpec = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, refetch);
}
