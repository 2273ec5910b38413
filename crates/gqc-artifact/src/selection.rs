//! Selection tree data model.
//!
//! A [`SubscriptionSelection`] is the compiled, serializable description of
//! how to write a response payload into the cache and read it back out. The
//! compiler guarantees that abstract-type overlap is resolved before the tree
//! reaches the runtime: every concrete typename routes to exactly one merged
//! field map.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field selections keyed by response key.
pub type FieldMap = IndexMap<String, FieldSelection>;

/// One level of a compiled selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSelection {
    /// Concrete fields visible on this type.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: FieldMap,

    /// Merged inline-fragment branches, present only for abstract selections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_fields: Option<AbstractFields>,

    /// Fragment spreads referenced at this level.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fragments: IndexMap<String, FragmentSpreadRef>,

    /// Branch typenames marked as the loading shape for an abstract field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loading_types: Vec<String>,
}

impl SubscriptionSelection {
    /// Resolve the field map to use for a payload with the given typename.
    ///
    /// Falls back to the concrete `fields` when no branch matches; merged
    /// branches are complete, so no second lookup is needed.
    #[must_use]
    pub fn fields_for(&self, typename: Option<&str>) -> &FieldMap {
        if let (Some(abstract_fields), Some(typename)) = (self.abstract_fields.as_ref(), typename)
        {
            if let Some(branch) = abstract_fields.branch(typename) {
                return branch;
            }
        }
        &self.fields
    }

    /// Returns `true` if any field at this level carries a loading marker.
    #[must_use]
    pub fn has_loading_fields(&self) -> bool {
        self.fields.values().any(|field| field.loading.is_some())
    }
}

/// Inline-fragment branches of an abstract selection, after merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbstractFields {
    /// Field map per branch name (a concrete or abstract type condition).
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, FieldMap>,

    /// Concrete typename to the canonical branch that covers it.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub type_map: IndexMap<String, String>,
}

impl AbstractFields {
    /// Look up the merged branch for a concrete typename.
    #[must_use]
    pub fn branch(&self, typename: &str) -> Option<&FieldMap> {
        if let Some(direct) = self.fields.get(typename) {
            return Some(direct);
        }
        self.type_map
            .get(typename)
            .and_then(|canonical| self.fields.get(canonical))
    }

    /// Returns `true` if no branches were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.type_map.is_empty()
    }
}

/// One field entry in a selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSelection {
    /// Named GraphQL output type of the field.
    #[serde(rename = "type")]
    pub field_type: String,

    /// Call signature with `$variable` placeholders kept literal.
    pub key_raw: String,

    /// Nested selection for object/interface/union-typed fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Box<SubscriptionSelection>>,

    /// List operations to run after this field's value is written.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<MutationOperation>,

    /// Marks this field as the storage point of a named list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<ListMarker>,

    /// The field's call arguments, recorded structurally for list matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<IndexMap<String, FilterValue>>,

    /// Whether the field may be null.
    #[serde(default, skip_serializing_if = "is_false")]
    pub nullable: bool,

    /// Whether the field is part of the entity's identity.
    #[serde(default, skip_serializing_if = "is_false")]
    pub visible: bool,

    /// Append/prepend markers for paginated connections.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<ListUpdate>,

    /// Whether the field's own type is an interface or union.
    #[serde(rename = "abstract", default, skip_serializing_if = "is_false")]
    pub is_abstract: bool,

    /// Loading-placeholder marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loading: Option<LoadingSpec>,
}

impl FieldSelection {
    /// Create a scalar field selection with the given type and raw key.
    #[must_use]
    pub fn new(field_type: impl Into<String>, key_raw: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            key_raw: key_raw.into(),
            ..Self::default()
        }
    }

    /// Attach a nested selection.
    #[must_use]
    pub fn with_selection(mut self, selection: SubscriptionSelection) -> Self {
        self.selection = Some(Box::new(selection));
        self
    }

    /// Attach a list operation.
    #[must_use]
    pub fn with_operation(mut self, operation: MutationOperation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Mark this field as the storage point of a named list.
    #[must_use]
    pub fn with_list(mut self, name: impl Into<String>, element_type: impl Into<String>) -> Self {
        self.list = Some(ListMarker {
            name: name.into(),
            element_type: element_type.into(),
        });
        self
    }

    /// Record the field's call arguments for list matching.
    #[must_use]
    pub fn with_filters(mut self, filters: IndexMap<String, FilterValue>) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Mark the field as nullable.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Declarative list mutation attached to a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOperation {
    /// What to do with the field's value.
    pub action: OperationAction,

    /// Target list name (insert/remove/toggle).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<String>,

    /// Where to insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<ListPosition>,

    /// Parent of the target list, defaulting to the root record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ParentIdRef>,

    /// Conditional gate evaluated against the list's filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<WhenFilter>,

    /// Target entity type (delete only).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub delete_type: Option<String>,
}

impl MutationOperation {
    /// Insert the field's value into a named list.
    #[must_use]
    pub fn insert(list: impl Into<String>) -> Self {
        Self::action_on_list(OperationAction::Insert, list)
    }

    /// Remove the field's value from a named list.
    #[must_use]
    pub fn remove(list: impl Into<String>) -> Self {
        Self::action_on_list(OperationAction::Remove, list)
    }

    /// Toggle the field's value in a named list.
    #[must_use]
    pub fn toggle(list: impl Into<String>) -> Self {
        Self::action_on_list(OperationAction::Toggle, list)
    }

    /// Delete the entity whose id is the field's value.
    #[must_use]
    pub fn delete(delete_type: impl Into<String>) -> Self {
        Self {
            action: OperationAction::Delete,
            list: None,
            position: None,
            parent_id: None,
            when: None,
            delete_type: Some(delete_type.into()),
        }
    }

    fn action_on_list(action: OperationAction, list: impl Into<String>) -> Self {
        Self {
            action,
            list: Some(list.into()),
            position: None,
            parent_id: None,
            when: None,
            delete_type: None,
        }
    }

    /// Set the insert position.
    #[must_use]
    pub const fn with_position(mut self, position: ListPosition) -> Self {
        self.position = Some(position);
        self
    }

    /// Set the parent of the target list.
    #[must_use]
    pub fn with_parent_id(mut self, parent_id: ParentIdRef) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Attach a conditional gate.
    #[must_use]
    pub fn with_when(mut self, when: WhenFilter) -> Self {
        self.when = Some(when);
        self
    }
}

/// List mutation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationAction {
    /// Append/prepend the value into the list.
    Insert,
    /// Detach the value from the list.
    Remove,
    /// Delete the entity entirely.
    Delete,
    /// Remove when present, insert otherwise.
    Toggle,
}

/// Insert position within a list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListPosition {
    /// Prepend.
    First,
    /// Append.
    #[default]
    Last,
}

/// Reference to the parent record of a list operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ParentIdRef {
    /// Literal record id.
    Literal(String),
    /// Variable holding the record id.
    Variable(String),
}

/// Key/value equality gate for list operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhenFilter {
    /// Every entry must match the list's filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must: Option<IndexMap<String, Value>>,

    /// Passes unless every entry matches the list's filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_not: Option<IndexMap<String, Value>>,
}

impl WhenFilter {
    /// Gate that requires every entry to match.
    #[must_use]
    pub fn must(conditions: IndexMap<String, Value>) -> Self {
        Self {
            must: Some(conditions),
            must_not: None,
        }
    }

    /// Gate that fails when every entry matches.
    #[must_use]
    pub fn must_not(conditions: IndexMap<String, Value>) -> Self {
        Self {
            must: None,
            must_not: Some(conditions),
        }
    }
}

/// Marks a field as the storage point of a named list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMarker {
    /// List name from the `@list`/`@paginate` directive.
    pub name: String,

    /// Element type stored in the list.
    #[serde(rename = "type")]
    pub element_type: String,
}

/// Pagination update direction recorded on a connection field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListUpdate {
    /// New pages extend the tail.
    Append,
    /// New pages extend the head.
    Prepend,
}

/// Loading-placeholder marker on a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LoadingSpec {
    /// Substitute a placeholder value here.
    Value,
    /// Keep recursing to find the placeholder deeper down.
    Continue,
}

/// A recorded call argument: a literal or a variable reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FilterValue {
    /// Literal JSON value.
    Literal(Value),
    /// `$variable` reference, resolved against the operation's variables.
    Variable(String),
}

impl FilterValue {
    /// Resolve the filter against a variables object.
    ///
    /// Absent variables resolve to `null`.
    #[must_use]
    pub fn resolve(&self, variables: &Value) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
        }
    }
}

/// Fragment spread recorded at a selection level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentSpreadRef {
    /// Arguments passed to the fragment.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub arguments: Value,

    /// Whether the spread carries `@loading`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub loading: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_for_routes_through_type_map() {
        let mut branch = FieldMap::default();
        branch.insert("name".to_string(), FieldSelection::new("String", "name"));

        let mut abstract_fields = AbstractFields::default();
        abstract_fields.fields.insert("Friend".to_string(), branch);
        abstract_fields
            .type_map
            .insert("Cat".to_string(), "Friend".to_string());

        let selection = SubscriptionSelection {
            abstract_fields: Some(abstract_fields),
            ..SubscriptionSelection::default()
        };

        assert!(selection.fields_for(Some("Cat")).contains_key("name"));
        assert!(selection.fields_for(Some("Dog")).is_empty());
        assert!(selection.fields_for(None).is_empty());
    }

    #[test]
    fn filter_value_resolution() {
        let variables = serde_json::json!({ "completed": true });

        let literal = FilterValue::Literal(serde_json::json!(false));
        assert_eq!(literal.resolve(&variables), serde_json::json!(false));

        let variable = FilterValue::Variable("completed".to_string());
        assert_eq!(variable.resolve(&variables), serde_json::json!(true));

        let missing = FilterValue::Variable("missing".to_string());
        assert_eq!(missing.resolve(&variables), Value::Null);
    }
}
