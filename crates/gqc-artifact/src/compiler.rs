//! Selection compiler.
//!
//! Turns a fragment-flattened document selection plus schema type information
//! into a [`SubscriptionSelection`]: concrete fields in `fields`, inline
//! fragments on other types as abstract branches, with a merge pass that
//! resolves branch overlap so every concrete typename routes to exactly one
//! field map at runtime.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::map::Entry;
use serde_json::Value;

use crate::error::ArtifactError;
use crate::selection::{
    AbstractFields, FieldMap, FieldSelection, FilterValue, FragmentSpreadRef, ListMarker,
    ListUpdate, LoadingSpec, MutationOperation, SubscriptionSelection,
};

/// One selection in the compiler's input document.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionNode {
    /// A field selection.
    Field(FieldNode),
    /// An inline fragment.
    InlineFragment(InlineFragmentNode),
    /// A named fragment spread.
    FragmentSpread(FragmentSpreadNode),
}

impl From<FieldNode> for SelectionNode {
    fn from(node: FieldNode) -> Self {
        Self::Field(node)
    }
}

impl From<InlineFragmentNode> for SelectionNode {
    fn from(node: InlineFragmentNode) -> Self {
        Self::InlineFragment(node)
    }
}

impl From<FragmentSpreadNode> for SelectionNode {
    fn from(node: FragmentSpreadNode) -> Self {
        Self::FragmentSpread(node)
    }
}

/// A field in the input document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldNode {
    /// Field name.
    pub name: String,
    /// Response alias.
    pub alias: Option<String>,
    /// Call arguments in document order.
    pub arguments: Vec<FieldArgument>,
    /// Nested selections.
    pub selections: Vec<SelectionNode>,
    /// `@list`/`@paginate` marker.
    pub list: Option<ListMarker>,
    /// Declarative list operations attached by mutation directives.
    pub operations: Vec<MutationOperation>,
    /// Pagination update markers.
    pub updates: Vec<ListUpdate>,
    /// Whether the field carries `@loading`.
    pub loading: bool,
}

impl FieldNode {
    /// Create a field node.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the response alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Append a call argument.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: ArgumentValue) -> Self {
        self.arguments.push(FieldArgument {
            name: name.into(),
            value,
        });
        self
    }

    /// Set the nested selections.
    #[must_use]
    pub fn with_selections(mut self, selections: Vec<SelectionNode>) -> Self {
        self.selections = selections;
        self
    }

    /// Mark the field as the storage point of a named list.
    #[must_use]
    pub fn with_list(mut self, name: impl Into<String>, element_type: impl Into<String>) -> Self {
        self.list = Some(ListMarker {
            name: name.into(),
            element_type: element_type.into(),
        });
        self
    }

    /// Attach a declarative list operation.
    #[must_use]
    pub fn with_operation(mut self, operation: MutationOperation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Attach a pagination update marker.
    #[must_use]
    pub fn with_update(mut self, update: ListUpdate) -> Self {
        self.updates.push(update);
        self
    }

    /// Mark the field with `@loading`.
    #[must_use]
    pub const fn with_loading(mut self) -> Self {
        self.loading = true;
        self
    }

    fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A named call argument.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldArgument {
    /// Argument name.
    pub name: String,
    /// Argument value.
    pub value: ArgumentValue,
}

/// A call argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    /// Literal JSON value, rendered into the key as-is.
    Literal(Value),
    /// Variable reference, kept as a `$name` placeholder in the key.
    Variable(String),
}

/// An inline fragment in the input document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InlineFragmentNode {
    /// Type condition.
    pub type_condition: String,
    /// Nested selections.
    pub selections: Vec<SelectionNode>,
    /// Whether the branch carries `@loading`.
    pub loading: bool,
}

impl InlineFragmentNode {
    /// Create an inline fragment node.
    #[must_use]
    pub fn new(type_condition: impl Into<String>, selections: Vec<SelectionNode>) -> Self {
        Self {
            type_condition: type_condition.into(),
            selections,
            loading: false,
        }
    }

    /// Mark the branch with `@loading`.
    #[must_use]
    pub const fn with_loading(mut self) -> Self {
        self.loading = true;
        self
    }
}

/// A fragment spread in the input document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentSpreadNode {
    /// Fragment name.
    pub name: String,
    /// Arguments passed to the fragment.
    pub arguments: Value,
    /// Whether the spread carries `@loading`.
    pub loading: bool,
}

impl FragmentSpreadNode {
    /// Create a fragment spread node.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Value::Null,
            loading: false,
        }
    }

    /// Attach fragment arguments.
    #[must_use]
    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }

    /// Mark the spread with `@loading`.
    #[must_use]
    pub const fn with_loading(mut self) -> Self {
        self.loading = true;
        self
    }
}

/// One field definition in the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    /// Named output type of the field.
    pub type_name: String,
    /// Whether the field may be null.
    pub nullable: bool,
}

impl SchemaField {
    /// A non-null field of the given type.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            nullable: false,
        }
    }

    /// A nullable field of the given type.
    #[must_use]
    pub fn nullable(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            nullable: true,
        }
    }
}

/// The slice of schema information the compiler needs: field lookups per
/// type, possible concrete types per interface/union, and identity fields.
#[derive(Debug, Clone, Default)]
pub struct SchemaInfo {
    types: HashMap<String, HashMap<String, SchemaField>>,
    possible: HashMap<String, BTreeSet<String>>,
    keys: HashMap<String, Vec<String>>,
    default_keys: Vec<String>,
}

impl SchemaInfo {
    /// Create an empty schema with the default `id` identity field.
    #[must_use]
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
            possible: HashMap::new(),
            keys: HashMap::new(),
            default_keys: vec!["id".to_string()],
        }
    }

    /// Define a concrete object type.
    #[must_use]
    pub fn with_object(
        mut self,
        name: impl Into<String>,
        fields: Vec<(&str, SchemaField)>,
    ) -> Self {
        self.types.insert(
            name.into(),
            fields
                .into_iter()
                .map(|(field, def)| (field.to_string(), def))
                .collect(),
        );
        self
    }

    /// Define an interface with its shared fields and possible concrete types.
    #[must_use]
    pub fn with_interface(
        mut self,
        name: impl Into<String>,
        fields: Vec<(&str, SchemaField)>,
        possible: Vec<&str>,
    ) -> Self {
        let name = name.into();
        self.possible.insert(
            name.clone(),
            possible.into_iter().map(str::to_string).collect(),
        );
        self.types.insert(
            name,
            fields
                .into_iter()
                .map(|(field, def)| (field.to_string(), def))
                .collect(),
        );
        self
    }

    /// Define a union and its member types.
    #[must_use]
    pub fn with_union(mut self, name: impl Into<String>, members: Vec<&str>) -> Self {
        let name = name.into();
        self.possible.insert(
            name.clone(),
            members.into_iter().map(str::to_string).collect(),
        );
        self.types.insert(name, HashMap::new());
        self
    }

    /// Override the identity fields for a type.
    #[must_use]
    pub fn with_keys(mut self, type_name: impl Into<String>, keys: Vec<&str>) -> Self {
        self.keys
            .insert(type_name.into(), keys.into_iter().map(str::to_string).collect());
        self
    }

    /// Returns `true` if the named type is an interface or union.
    #[must_use]
    pub fn is_abstract(&self, name: &str) -> bool {
        self.possible.contains_key(name)
    }

    /// Concrete types a value of the named type can be at runtime.
    pub fn possible_types(&self, name: &str) -> Result<BTreeSet<String>, ArtifactError> {
        if let Some(possible) = self.possible.get(name) {
            return Ok(possible.clone());
        }
        if self.types.contains_key(name) {
            let mut single = BTreeSet::new();
            single.insert(name.to_string());
            return Ok(single);
        }
        Err(ArtifactError::UnknownType {
            name: name.to_string(),
        })
    }

    /// Identity fields of the named type.
    #[must_use]
    pub fn key_fields(&self, type_name: &str) -> &[String] {
        self.keys
            .get(type_name)
            .map_or(&self.default_keys, Vec::as_slice)
    }

    fn has_field(&self, type_name: &str, field: &str) -> bool {
        self.types
            .get(type_name)
            .is_some_and(|fields| fields.contains_key(field))
    }

    fn field(&self, parent: &str, name: &str) -> Result<&SchemaField, ArtifactError> {
        let fields = self
            .types
            .get(parent)
            .ok_or_else(|| ArtifactError::UnknownType {
                name: parent.to_string(),
            })?;
        fields.get(name).ok_or_else(|| ArtifactError::UnknownField {
            parent: parent.to_string(),
            field: name.to_string(),
        })
    }
}

/// Compiler options.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Treat every field as loading-annotated (operation-level `@loading`).
    pub global_loading: bool,
}

/// Compile a document selection against a root type.
pub fn compile(
    selections: &[SelectionNode],
    root_type: &str,
    schema: &SchemaInfo,
) -> Result<SubscriptionSelection, ArtifactError> {
    compile_with_options(selections, root_type, schema, CompileOptions::default())
}

/// Compile with explicit options.
pub fn compile_with_options(
    selections: &[SelectionNode],
    root_type: &str,
    schema: &SchemaInfo,
    options: CompileOptions,
) -> Result<SubscriptionSelection, ArtifactError> {
    let mut selection = build_selection(selections, root_type, schema, options.global_loading)?;
    merge_selection(&mut selection, schema);
    Ok(selection)
}

fn build_selection(
    nodes: &[SelectionNode],
    parent_type: &str,
    schema: &SchemaInfo,
    global_loading: bool,
) -> Result<SubscriptionSelection, ArtifactError> {
    let mut selection = SubscriptionSelection::default();
    let mut loading_branch: Option<String> = None;

    for node in nodes {
        match node {
            SelectionNode::Field(field) => {
                let built = build_field(field, parent_type, schema, global_loading)?;
                insert_field(&mut selection.fields, field.response_key().to_string(), built);
            }

            SelectionNode::InlineFragment(fragment)
                if fragment.type_condition == parent_type =>
            {
                let inner = build_selection(
                    &fragment.selections,
                    parent_type,
                    schema,
                    global_loading || fragment.loading,
                )?;
                absorb(&mut selection, inner);
            }

            SelectionNode::InlineFragment(fragment) => {
                if fragment.loading {
                    if let Some(first) = &loading_branch {
                        return Err(ArtifactError::DuplicateLoadingBranch {
                            parent: parent_type.to_string(),
                            first: first.clone(),
                            second: fragment.type_condition.clone(),
                        });
                    }
                    loading_branch = Some(fragment.type_condition.clone());
                    selection.loading_types.push(fragment.type_condition.clone());
                }

                let parent_possible = schema.possible_types(parent_type)?;
                let branch_possible = schema.possible_types(&fragment.type_condition)?;
                let overlap: BTreeSet<String> = parent_possible
                    .intersection(&branch_possible)
                    .cloned()
                    .collect();
                if overlap.is_empty() {
                    continue;
                }

                let branch = build_selection(
                    &fragment.selections,
                    &fragment.type_condition,
                    schema,
                    global_loading || fragment.loading,
                )?;

                claim_branch(&mut selection, &fragment.type_condition, branch.fields, &overlap);

                // A fragment body may itself contain fragments on narrower
                // types; hoist those branches to this level so the merged
                // tree stays one level deep per selection.
                if let Some(nested) = branch.abstract_fields {
                    for (sub_condition, sub_map) in nested.fields {
                        let sub_possible = schema.possible_types(&sub_condition)?;
                        let sub_overlap: BTreeSet<String> =
                            overlap.intersection(&sub_possible).cloned().collect();
                        if sub_overlap.is_empty() {
                            continue;
                        }
                        claim_branch(&mut selection, &sub_condition, sub_map, &sub_overlap);
                    }
                }

                for (name, spread) in branch.fragments {
                    selection.fragments.entry(name).or_insert(spread);
                }
                for loading_type in branch.loading_types {
                    if !selection.loading_types.contains(&loading_type) {
                        selection.loading_types.push(loading_type);
                    }
                }
            }

            SelectionNode::FragmentSpread(spread) => {
                selection.fragments.insert(
                    spread.name.clone(),
                    FragmentSpreadRef {
                        arguments: spread.arguments.clone(),
                        loading: spread.loading,
                    },
                );
            }
        }
    }

    Ok(selection)
}

fn build_field(
    field: &FieldNode,
    parent_type: &str,
    schema: &SchemaInfo,
    global_loading: bool,
) -> Result<FieldSelection, ArtifactError> {
    // __typename is synthesized: every composite type carries it without a
    // schema entry.
    let (type_name, nullable) = if field.name == "__typename" {
        ("String".to_string(), false)
    } else {
        let def = schema.field(parent_type, &field.name)?;
        (def.type_name.clone(), def.nullable)
    };

    if let Some(list) = &field.list {
        if !schema.is_abstract(&list.element_type) {
            for key in schema.key_fields(&list.element_type) {
                if !schema.has_field(&list.element_type, key) {
                    return Err(ArtifactError::MissingListKey {
                        list: list.name.clone(),
                        type_name: list.element_type.clone(),
                        key: key.clone(),
                    });
                }
            }
        }
    }

    let selection = if field.selections.is_empty() {
        None
    } else {
        Some(Box::new(build_selection(
            &field.selections,
            &type_name,
            schema,
            global_loading,
        )?))
    };

    let loading = if field.loading || global_loading {
        let deeper = selection
            .as_ref()
            .is_some_and(|sub| sub.has_loading_fields());
        Some(if deeper {
            LoadingSpec::Continue
        } else {
            LoadingSpec::Value
        })
    } else {
        None
    };

    let filters = if field.arguments.is_empty() {
        None
    } else {
        Some(
            field
                .arguments
                .iter()
                .map(|argument| {
                    let value = match &argument.value {
                        ArgumentValue::Literal(literal) => FilterValue::Literal(literal.clone()),
                        ArgumentValue::Variable(name) => FilterValue::Variable(name.clone()),
                    };
                    (argument.name.clone(), value)
                })
                .collect(),
        )
    };

    Ok(FieldSelection {
        key_raw: render_key(&field.name, &field.arguments),
        selection,
        operations: field.operations.clone(),
        list: field.list.clone(),
        filters,
        nullable,
        visible: schema
            .key_fields(parent_type)
            .iter()
            .any(|key| key == &field.name),
        updates: field.updates.clone(),
        is_abstract: schema.is_abstract(&type_name),
        loading,
        field_type: type_name,
    })
}

fn render_key(name: &str, arguments: &[FieldArgument]) -> String {
    if arguments.is_empty() {
        return name.to_string();
    }
    let rendered: Vec<String> = arguments
        .iter()
        .map(|argument| {
            let value = match &argument.value {
                ArgumentValue::Literal(literal) => literal.to_string(),
                ArgumentValue::Variable(variable) => format!("${variable}"),
            };
            format!("{}: {value}", argument.name)
        })
        .collect();
    format!("{name}({})", rendered.join(", "))
}

/// Record an inline-fragment branch and route its possible concrete types.
fn claim_branch(
    selection: &mut SubscriptionSelection,
    condition: &str,
    fields: FieldMap,
    overlap: &BTreeSet<String>,
) {
    let abstract_fields = selection
        .abstract_fields
        .get_or_insert_with(AbstractFields::default);

    match abstract_fields.fields.entry(condition.to_string()) {
        Entry::Occupied(mut existing) => merge_field_maps(existing.get_mut(), fields),
        Entry::Vacant(slot) => {
            slot.insert(fields);
        }
    }

    for concrete in overlap {
        if concrete == condition {
            // A direct concrete branch wins over any earlier type_map claim;
            // absorb the claiming branch so no field is lost.
            if let Some(previous) = abstract_fields.type_map.shift_remove(concrete) {
                let claimed = abstract_fields
                    .fields
                    .get(&previous)
                    .cloned()
                    .unwrap_or_default();
                if let Some(target) = abstract_fields.fields.get_mut(concrete) {
                    merge_field_maps(target, claimed);
                }
            }
            continue;
        }

        if abstract_fields.fields.contains_key(concrete.as_str()) {
            // The concrete type already has a direct branch: fold this
            // branch's fields into it instead of routing through type_map.
            let claimed = abstract_fields
                .fields
                .get(condition)
                .cloned()
                .unwrap_or_default();
            if let Some(target) = abstract_fields.fields.get_mut(concrete) {
                merge_field_maps(target, claimed);
            }
            continue;
        }

        match abstract_fields.type_map.get(concrete).cloned() {
            None => {
                abstract_fields
                    .type_map
                    .insert(concrete.clone(), condition.to_string());
            }
            Some(canonical) if canonical != condition => {
                // Two branches claim the same concrete type: fold this
                // branch's fields into the canonical one.
                let claimed = abstract_fields
                    .fields
                    .get(condition)
                    .cloned()
                    .unwrap_or_default();
                if let Some(target) = abstract_fields.fields.get_mut(&canonical) {
                    merge_field_maps(target, claimed);
                }
            }
            Some(_) => {}
        }
    }
}

/// Merge another selection built on the same type into `selection`.
fn absorb(selection: &mut SubscriptionSelection, other: SubscriptionSelection) {
    for (key, field) in other.fields {
        insert_field(&mut selection.fields, key, field);
    }
    if let Some(nested) = other.abstract_fields {
        let abstract_fields = selection
            .abstract_fields
            .get_or_insert_with(AbstractFields::default);
        for (name, map) in nested.fields {
            match abstract_fields.fields.entry(name) {
                Entry::Occupied(mut existing) => merge_field_maps(existing.get_mut(), map),
                Entry::Vacant(slot) => {
                    slot.insert(map);
                }
            }
        }
        for (concrete, canonical) in nested.type_map {
            abstract_fields.type_map.entry(concrete).or_insert(canonical);
        }
    }
    for (name, spread) in other.fragments {
        selection.fragments.entry(name).or_insert(spread);
    }
    for loading_type in other.loading_types {
        if !selection.loading_types.contains(&loading_type) {
            selection.loading_types.push(loading_type);
        }
    }
}

fn insert_field(fields: &mut FieldMap, key: String, field: FieldSelection) {
    match fields.entry(key) {
        Entry::Occupied(mut existing) => merge_field(existing.get_mut(), field),
        Entry::Vacant(slot) => {
            slot.insert(field);
        }
    }
}

fn merge_field_maps(target: &mut FieldMap, source: FieldMap) {
    for (key, field) in source {
        insert_field(target, key, field);
    }
}

/// Deep-merge a repeated field occurrence: union of sub-selections,
/// nullability, and operations.
fn merge_field(existing: &mut FieldSelection, incoming: FieldSelection) {
    existing.nullable |= incoming.nullable;
    existing.visible |= incoming.visible;
    existing.is_abstract |= incoming.is_abstract;
    if existing.list.is_none() {
        existing.list = incoming.list;
    }
    if existing.filters.is_none() {
        existing.filters = incoming.filters;
    }
    if existing.loading.is_none() {
        existing.loading = incoming.loading;
    }
    for update in incoming.updates {
        if !existing.updates.contains(&update) {
            existing.updates.push(update);
        }
    }
    for operation in incoming.operations {
        if !existing.operations.contains(&operation) {
            existing.operations.push(operation);
        }
    }
    match (existing.selection.as_mut(), incoming.selection) {
        (Some(current), Some(other)) => absorb(current, *other),
        (None, Some(other)) => existing.selection = Some(other),
        _ => {}
    }
}

/// Resolve abstract-branch overlap across the whole tree.
fn merge_selection(selection: &mut SubscriptionSelection, schema: &SchemaInfo) {
    if let Some(abstract_fields) = selection.abstract_fields.as_mut() {
        // Concrete fields merge into every branch so reading "as that type"
        // never misses a field selected at the parent level.
        for branch in abstract_fields.fields.values_mut() {
            for (key, field) in &selection.fields {
                match branch.entry(key.clone()) {
                    Entry::Occupied(mut existing) => {
                        merge_field(existing.get_mut(), field.clone());
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(field.clone());
                    }
                }
            }
        }

        // Prune branches nothing routes to: a branch survives if a type_map
        // entry points at it or its own name is a concrete type.
        let live: HashSet<String> = abstract_fields
            .type_map
            .values()
            .cloned()
            .chain(
                abstract_fields
                    .fields
                    .keys()
                    .filter(|name| !schema.is_abstract(name))
                    .cloned(),
            )
            .collect();
        abstract_fields.fields.retain(|name, _| live.contains(name));

        for branch in abstract_fields.fields.values_mut() {
            for field in branch.values_mut() {
                if let Some(sub) = field.selection.as_mut() {
                    merge_selection(sub, schema);
                }
            }
        }

        if abstract_fields.is_empty() {
            selection.abstract_fields = None;
        }
    }

    for field in selection.fields.values_mut() {
        if let Some(sub) = field.selection.as_mut() {
            merge_selection(sub, schema);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn todo_schema() -> SchemaInfo {
        SchemaInfo::new()
            .with_object(
                "Query",
                vec![
                    ("allItems", SchemaField::new("TodoItem")),
                    ("filteredItems", SchemaField::new("TodoItem")),
                ],
            )
            .with_object(
                "TodoItem",
                vec![
                    ("id", SchemaField::new("ID")),
                    ("text", SchemaField::new("String")),
                    ("completed", SchemaField::new("Boolean")),
                ],
            )
    }

    #[test]
    fn renders_keys_with_literal_and_variable_arguments() {
        let node = FieldNode::new("filteredItems")
            .with_argument("completed", ArgumentValue::Variable("completed".to_string()))
            .with_argument("first", ArgumentValue::Literal(json!(10)));
        assert_eq!(
            render_key(&node.name, &node.arguments),
            "filteredItems(completed: $completed, first: 10)"
        );
        assert_eq!(render_key("allItems", &[]), "allItems");
    }

    #[test]
    fn typename_is_synthesized_without_schema_lookup() {
        let compiled = compile(
            &[FieldNode::new("allItems")
                .with_selections(vec![FieldNode::new("__typename").into()])
                .into()],
            "Query",
            &todo_schema(),
        )
        .unwrap();

        let items = compiled.fields.get("allItems").unwrap();
        let typename = items
            .selection
            .as_ref()
            .unwrap()
            .fields
            .get("__typename")
            .unwrap();
        assert_eq!(typename.field_type, "String");
    }

    #[test]
    fn unknown_field_is_a_compile_error() {
        let result = compile(&[FieldNode::new("nope").into()], "Query", &todo_schema());
        assert!(matches!(
            result,
            Err(ArtifactError::UnknownField { parent, field })
                if parent == "Query" && field == "nope"
        ));
    }

    #[test]
    fn repeated_fields_deep_merge_sub_selections() {
        let compiled = compile(
            &[
                FieldNode::new("allItems")
                    .with_selections(vec![FieldNode::new("id").into()])
                    .into(),
                FieldNode::new("allItems")
                    .with_selections(vec![FieldNode::new("completed").into()])
                    .into(),
            ],
            "Query",
            &todo_schema(),
        )
        .unwrap();

        let sub = compiled
            .fields
            .get("allItems")
            .unwrap()
            .selection
            .as_ref()
            .unwrap();
        assert!(sub.fields.contains_key("id"));
        assert!(sub.fields.contains_key("completed"));
    }

    #[test]
    fn loading_marks_deepest_annotated_field_as_value() {
        let compiled = compile(
            &[FieldNode::new("allItems")
                .with_loading()
                .with_selections(vec![
                    FieldNode::new("id").with_loading().into(),
                    FieldNode::new("text").into(),
                ])
                .into()],
            "Query",
            &todo_schema(),
        )
        .unwrap();

        let items = compiled.fields.get("allItems").unwrap();
        assert_eq!(items.loading, Some(LoadingSpec::Continue));

        let sub = items.selection.as_ref().unwrap();
        assert_eq!(sub.fields.get("id").unwrap().loading, Some(LoadingSpec::Value));
        assert_eq!(sub.fields.get("text").unwrap().loading, None);
    }

    #[test]
    fn duplicate_loading_branches_are_rejected() {
        let schema = SchemaInfo::new()
            .with_union("Entity", vec!["Cat", "Ghost"])
            .with_object("Cat", vec![("id", SchemaField::new("ID"))])
            .with_object("Ghost", vec![("id", SchemaField::new("ID"))]);

        let result = build_selection(
            &[
                InlineFragmentNode::new("Cat", vec![FieldNode::new("id").into()])
                    .with_loading()
                    .into(),
                InlineFragmentNode::new("Ghost", vec![FieldNode::new("id").into()])
                    .with_loading()
                    .into(),
            ],
            "Entity",
            &schema,
            false,
        );

        assert!(matches!(
            result,
            Err(ArtifactError::DuplicateLoadingBranch { first, second, .. })
                if first == "Cat" && second == "Ghost"
        ));
    }

    #[test]
    fn missing_list_key_is_a_compile_error() {
        let schema = SchemaInfo::new()
            .with_object("Query", vec![("notes", SchemaField::new("Note"))])
            .with_object("Note", vec![("text", SchemaField::new("String"))]);

        let result = compile(
            &[FieldNode::new("notes")
                .with_list("All_Notes", "Note")
                .with_selections(vec![FieldNode::new("text").into()])
                .into()],
            "Query",
            &schema,
        );

        assert!(matches!(
            result,
            Err(ArtifactError::MissingListKey { list, key, .. })
                if list == "All_Notes" && key == "id"
        ));
    }
}
