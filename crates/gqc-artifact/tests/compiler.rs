use gqc_artifact::{
    ArgumentValue, FieldNode, InlineFragmentNode, SchemaField, SchemaInfo, compile,
};

fn friends_schema() -> SchemaInfo {
    SchemaInfo::new()
        .with_object("Query", vec![("friends", SchemaField::new("Friend"))])
        .with_interface(
            "Friend",
            vec![
                ("id", SchemaField::new("ID")),
                ("name", SchemaField::new("String")),
            ],
            vec!["Cat", "Ghost"],
        )
        .with_object(
            "Cat",
            vec![
                ("id", SchemaField::new("ID")),
                ("name", SchemaField::new("String")),
                ("meowVolume", SchemaField::new("Int")),
            ],
        )
        .with_object(
            "Ghost",
            vec![
                ("id", SchemaField::new("ID")),
                ("name", SchemaField::new("String")),
                ("spookLevel", SchemaField::new("Int")),
            ],
        )
}

#[test]
fn abstract_merge_keeps_shared_and_branch_fields() {
    // Two fragments on disjoint implementing types plus one shared field at
    // the interface level: each merged branch must contain both.
    let schema = friends_schema();
    let compiled = compile(
        &[FieldNode::new("friends")
            .with_selections(vec![
                FieldNode::new("name").into(),
                InlineFragmentNode::new("Cat", vec![FieldNode::new("meowVolume").into()]).into(),
                InlineFragmentNode::new("Ghost", vec![FieldNode::new("spookLevel").into()])
                    .into(),
            ])
            .into()],
        "Query",
        &schema,
    )
    .unwrap();

    let friends = compiled.fields.get("friends").unwrap();
    assert!(friends.is_abstract);
    let selection = friends.selection.as_ref().unwrap();

    let cat = selection.fields_for(Some("Cat"));
    assert!(cat.contains_key("name"), "Cat branch lost the shared field");
    assert!(cat.contains_key("meowVolume"));
    assert!(!cat.contains_key("spookLevel"));

    let ghost = selection.fields_for(Some("Ghost"));
    assert!(ghost.contains_key("name"), "Ghost branch lost the shared field");
    assert!(ghost.contains_key("spookLevel"));
    assert!(!ghost.contains_key("meowVolume"));
}

#[test]
fn type_map_routes_concrete_types_to_abstract_branches() {
    let schema = SchemaInfo::new()
        .with_object("Query", vec![("entities", SchemaField::new("Entity"))])
        .with_union("Entity", vec!["User", "Ghost"])
        .with_interface(
            "Friend",
            vec![("name", SchemaField::new("String"))],
            vec!["User", "Ghost", "Cat"],
        )
        .with_object(
            "User",
            vec![
                ("id", SchemaField::new("ID")),
                ("name", SchemaField::new("String")),
                ("email", SchemaField::new("String")),
            ],
        )
        .with_object(
            "Ghost",
            vec![
                ("id", SchemaField::new("ID")),
                ("name", SchemaField::new("String")),
            ],
        )
        .with_object(
            "Cat",
            vec![
                ("id", SchemaField::new("ID")),
                ("name", SchemaField::new("String")),
            ],
        );

    let compiled = compile(
        &[FieldNode::new("entities")
            .with_selections(vec![
                InlineFragmentNode::new("Friend", vec![FieldNode::new("name").into()]).into(),
            ])
            .into()],
        "Query",
        &schema,
    )
    .unwrap();

    let selection = compiled
        .fields
        .get("entities")
        .unwrap()
        .selection
        .as_ref()
        .unwrap();
    let abstract_fields = selection.abstract_fields.as_ref().unwrap();

    // Only the union members route; Cat is possible under Friend but can
    // never appear under Entity.
    assert_eq!(
        abstract_fields.type_map.get("User"),
        Some(&"Friend".to_string())
    );
    assert_eq!(
        abstract_fields.type_map.get("Ghost"),
        Some(&"Friend".to_string())
    );
    assert!(!abstract_fields.type_map.contains_key("Cat"));

    assert!(selection.fields_for(Some("User")).contains_key("name"));
    assert!(selection.fields_for(Some("Ghost")).contains_key("name"));
}

#[test]
fn direct_branch_absorbs_overlapping_abstract_claim() {
    let schema = SchemaInfo::new()
        .with_object("Query", vec![("entities", SchemaField::new("Entity"))])
        .with_union("Entity", vec!["User", "Ghost"])
        .with_interface(
            "Friend",
            vec![("name", SchemaField::new("String"))],
            vec!["User", "Ghost"],
        )
        .with_object(
            "User",
            vec![
                ("id", SchemaField::new("ID")),
                ("name", SchemaField::new("String")),
                ("email", SchemaField::new("String")),
            ],
        )
        .with_object(
            "Ghost",
            vec![
                ("id", SchemaField::new("ID")),
                ("name", SchemaField::new("String")),
            ],
        );

    // Whichever order the branches are written in, User must resolve to a
    // single field map carrying both the interface and concrete fields.
    for flipped in [false, true] {
        let mut branches = vec![
            InlineFragmentNode::new("Friend", vec![FieldNode::new("name").into()]).into(),
            InlineFragmentNode::new("User", vec![FieldNode::new("email").into()]).into(),
        ];
        if flipped {
            branches.reverse();
        }

        let compiled = compile(
            &[FieldNode::new("entities").with_selections(branches).into()],
            "Query",
            &schema,
        )
        .unwrap();

        let selection = compiled
            .fields
            .get("entities")
            .unwrap()
            .selection
            .as_ref()
            .unwrap();

        let user = selection.fields_for(Some("User"));
        assert!(user.contains_key("name"), "flipped={flipped}");
        assert!(user.contains_key("email"), "flipped={flipped}");

        let ghost = selection.fields_for(Some("Ghost"));
        assert!(ghost.contains_key("name"), "flipped={flipped}");
        assert!(!ghost.contains_key("email"), "flipped={flipped}");
    }
}

#[test]
fn impossible_branches_are_dropped() {
    let schema = SchemaInfo::new()
        .with_object("Query", vec![("friends", SchemaField::new("Friend"))])
        .with_interface(
            "Friend",
            vec![("name", SchemaField::new("String"))],
            vec!["Cat"],
        )
        .with_object(
            "Cat",
            vec![
                ("id", SchemaField::new("ID")),
                ("name", SchemaField::new("String")),
            ],
        )
        .with_object(
            "Dog",
            vec![
                ("id", SchemaField::new("ID")),
                ("barkVolume", SchemaField::new("Int")),
            ],
        );

    let compiled = compile(
        &[FieldNode::new("friends")
            .with_selections(vec![
                FieldNode::new("name").into(),
                InlineFragmentNode::new("Dog", vec![FieldNode::new("barkVolume").into()]).into(),
            ])
            .into()],
        "Query",
        &schema,
    )
    .unwrap();

    let selection = compiled
        .fields
        .get("friends")
        .unwrap()
        .selection
        .as_ref()
        .unwrap();
    assert!(selection.abstract_fields.is_none());
}

#[test]
fn arguments_become_filters_and_key_placeholders() {
    let schema = SchemaInfo::new()
        .with_object("Query", vec![("filteredItems", SchemaField::new("TodoItem"))])
        .with_object(
            "TodoItem",
            vec![
                ("id", SchemaField::new("ID")),
                ("completed", SchemaField::new("Boolean")),
            ],
        );

    let compiled = compile(
        &[FieldNode::new("filteredItems")
            .with_argument("completed", ArgumentValue::Variable("completed".to_string()))
            .with_list("Filtered_Items", "TodoItem")
            .with_selections(vec![
                FieldNode::new("id").into(),
                FieldNode::new("completed").into(),
            ])
            .into()],
        "Query",
        &schema,
    )
    .unwrap();

    let field = compiled.fields.get("filteredItems").unwrap();
    assert_eq!(field.key_raw, "filteredItems(completed: $completed)");
    assert!(field.filters.as_ref().unwrap().contains_key("completed"));
    assert_eq!(field.list.as_ref().unwrap().name, "Filtered_Items");

    // Identity fields are flagged on the element selection.
    let sub = field.selection.as_ref().unwrap();
    assert!(sub.fields.get("id").unwrap().visible);
    assert!(!sub.fields.get("completed").unwrap().visible);
}
