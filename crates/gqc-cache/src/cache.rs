//! Cache engine.
//!
//! Holds the entity map and the mounted named lists. Writes walk a payload
//! against its compiled selection, diff every field, and collect the specs
//! whose data actually changed; each distinct setter fires exactly once per
//! write, after the lock is released, with freshly read data.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use gqc_artifact::{
    FieldSelection, ListPosition, MutationOperation, OperationAction, ParentIdRef,
    SubscriptionSelection, WhenFilter,
};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::CacheError;
use crate::key::evaluate_key;
use crate::record::{Record, Setter, SubscriptionSpec};

/// Id of the singleton root record.
pub const ROOT_ID: &str = "_ROOT_";

/// Per-type identity configuration.
///
/// Entity ids are `"Type:<key>"` where `<key>` joins the type's identity
/// fields; the default identity is the `id` field.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    keys: HashMap<String, Vec<String>>,
    default_keys: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            keys: HashMap::new(),
            default_keys: vec!["id".to_string()],
        }
    }
}

impl CacheConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the identity fields of a type (composite keys join their
    /// values in declaration order).
    #[must_use]
    pub fn with_keys(mut self, type_name: impl Into<String>, keys: Vec<&str>) -> Self {
        self.keys
            .insert(type_name.into(), keys.into_iter().map(str::to_string).collect());
        self
    }

    fn key_fields(&self, type_name: &str) -> &[String] {
        self.keys
            .get(type_name)
            .map_or(&self.default_keys, Vec::as_slice)
    }
}

/// The normalized cache.
///
/// One instance per client, owned by the caller. All mutating entry points
/// run as exclusive critical sections; reads may run concurrently with each
/// other. Subscriber callbacks are invoked after the lock is released.
pub struct Cache {
    inner: RwLock<CacheInner>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    /// Create a cache with the default identity configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Create a cache with per-type identity fields.
    #[must_use]
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                config,
                records: HashMap::new(),
                lists: HashMap::new(),
            }),
        }
    }

    /// Write a response payload into the cache.
    ///
    /// Recursively walks `data` against `selection`, diffing scalars, record
    /// links, and list links; runs any list operations attached to written
    /// fields; then notifies every subscriber whose data changed. A non-object
    /// payload (e.g. `data: null` on a failed response) is a no-op.
    pub fn write(
        &self,
        selection: &SubscriptionSelection,
        data: &Value,
        variables: &Value,
        root_id: Option<&str>,
    ) -> Result<(), CacheError> {
        let Some(object) = data.as_object() else {
            return Ok(());
        };
        let root = root_id.unwrap_or(ROOT_ID);
        self.with_write(variables, |inner, specs| {
            inner.write_selection(root, selection, object, variables, specs)
        })
    }

    /// Register a spec onto the record tree rooted at its parent id.
    ///
    /// Re-subscribing with changed variables first clears every stale
    /// variable-bound registration of the same setter.
    pub fn subscribe(&self, spec: &SubscriptionSpec, variables: &Value) {
        let mut inner = self.inner.write();
        let root = spec.parent_id.clone().unwrap_or_else(|| ROOT_ID.to_string());
        let selection = Arc::clone(&spec.selection);
        inner.subscribe_selection(&root, &selection, spec, variables);
        trace!(root = %root, "spec subscribed");
    }

    /// Deregister a spec, decrementing shared-setter reference counts.
    pub fn unsubscribe(&self, spec: &SubscriptionSpec, variables: &Value) {
        let mut inner = self.inner.write();
        let root = spec.parent_id.clone().unwrap_or_else(|| ROOT_ID.to_string());
        let selection = Arc::clone(&spec.selection);
        inner.unsubscribe_spec(&root, &selection, spec.setter_id(), variables);
        trace!(root = %root, "spec unsubscribed");
    }

    /// Read a selection back out of the cache as a plain value.
    ///
    /// Missing records and links read as `null`; reads never fail.
    #[must_use]
    pub fn read(
        &self,
        selection: &SubscriptionSelection,
        variables: &Value,
        root_id: Option<&str>,
    ) -> Value {
        self.inner
            .read()
            .read_selection(root_id.unwrap_or(ROOT_ID), selection, variables)
    }

    /// Canonical entity id for a payload object or a literal id.
    ///
    /// Returns `None` when an object payload is missing identity fields.
    #[must_use]
    pub fn id(&self, type_name: &str, data: &Value) -> Option<String> {
        match data {
            Value::String(literal) => Some(format!("{type_name}:{literal}")),
            Value::Object(object) => self.inner.read().identify(type_name, object),
            _ => None,
        }
    }

    /// Delete a record: drop its subscribers, detach it from every list it
    /// belongs to (notifying those lists' subscribers), and remove it.
    ///
    /// Deleting an unknown id is a no-op. Children linked from the record
    /// stay addressable by id.
    pub fn delete(&self, id: &str, variables: &Value) {
        let notifications = {
            let mut inner = self.inner.write();
            let mut specs = SpecCollector::default();
            inner.delete_record(id, variables, &mut specs);
            inner.prepare(specs, variables)
        };
        dispatch(notifications);
    }

    /// Look up a mounted named list.
    ///
    /// Fails until a subscriber has walked through the list: operations only
    /// target lists that are actually observed.
    pub fn connection(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<crate::connection::ConnectionHandler<'_>, CacheError> {
        let parent = parent_id.unwrap_or(ROOT_ID);
        if self.inner.read().list_state(name, parent).is_none() {
            return Err(CacheError::UnmountedList {
                name: name.to_string(),
                parent: parent.to_string(),
            });
        }
        Ok(crate::connection::ConnectionHandler::new(self, name, parent))
    }

    /// Returns `true` if a record exists for the id.
    #[must_use]
    pub fn contains_record(&self, id: &str) -> bool {
        self.inner.read().records.contains_key(id)
    }

    /// Scalar stored on a record under an evaluated key.
    #[must_use]
    pub fn record_field(&self, id: &str, key: &str) -> Option<Value> {
        self.inner
            .read()
            .records
            .get(id)
            .and_then(|record| record.field(key).cloned())
    }

    /// Number of distinct subscribers on a record key.
    #[must_use]
    pub fn subscriber_count(&self, id: &str, key: &str) -> usize {
        self.inner
            .read()
            .records
            .get(id)
            .map_or(0, |record| record.subscriber_count(key))
    }

    fn with_write<F>(&self, variables: &Value, operation: F) -> Result<(), CacheError>
    where
        F: FnOnce(&mut CacheInner, &mut SpecCollector) -> Result<(), CacheError>,
    {
        let notifications = {
            let mut inner = self.inner.write();
            let mut specs = SpecCollector::default();
            operation(&mut inner, &mut specs)?;
            inner.prepare(specs, variables)
        };
        dispatch(notifications);
        Ok(())
    }

    // --- internal namespace used by ConnectionHandler ---

    pub(crate) fn list_insert(
        &self,
        name: &str,
        parent: &str,
        when: Option<&WhenFilter>,
        position: ListPosition,
        data: &Value,
        variables: &Value,
    ) -> Result<(), CacheError> {
        self.with_write(variables, |inner, specs| {
            let state = inner.required_list(name, parent)?;
            if !when_passes(when, &state.filters) {
                return Ok(());
            }
            let Some(object) = data.as_object() else {
                return Err(CacheError::MissingEntityId {
                    type_name: state.element_type.clone(),
                });
            };
            inner.list_append(&state, position, object, variables, specs)
        })
    }

    pub(crate) fn list_remove(
        &self,
        name: &str,
        parent: &str,
        when: Option<&WhenFilter>,
        data: &Value,
        variables: &Value,
    ) -> Result<(), CacheError> {
        self.with_write(variables, |inner, specs| {
            let state = inner.required_list(name, parent)?;
            if !when_passes(when, &state.filters) {
                return Ok(());
            }
            let Some(object) = data.as_object() else {
                return Err(CacheError::MissingEntityId {
                    type_name: state.element_type.clone(),
                });
            };
            let id = inner.identify(&state.element_type, object).ok_or_else(|| {
                CacheError::MissingEntityId {
                    type_name: state.element_type.clone(),
                }
            })?;
            inner.list_detach(&state, &id, variables, specs);
            Ok(())
        })
    }

    pub(crate) fn list_remove_id(
        &self,
        name: &str,
        parent: &str,
        when: Option<&WhenFilter>,
        id: &str,
        variables: &Value,
    ) -> Result<(), CacheError> {
        self.with_write(variables, |inner, specs| {
            let state = inner.required_list(name, parent)?;
            if !when_passes(when, &state.filters) {
                return Ok(());
            }
            inner.list_detach(&state, id, variables, specs);
            Ok(())
        })
    }

    pub(crate) fn list_toggle(
        &self,
        name: &str,
        parent: &str,
        when: Option<&WhenFilter>,
        position: ListPosition,
        data: &Value,
        variables: &Value,
    ) -> Result<(), CacheError> {
        self.with_write(variables, |inner, specs| {
            let state = inner.required_list(name, parent)?;
            if !when_passes(when, &state.filters) {
                return Ok(());
            }
            let Some(object) = data.as_object() else {
                return Err(CacheError::MissingEntityId {
                    type_name: state.element_type.clone(),
                });
            };
            let id = inner.identify(&state.element_type, object).ok_or_else(|| {
                CacheError::MissingEntityId {
                    type_name: state.element_type.clone(),
                }
            })?;
            inner.list_toggle(&state, position, &id, object, variables, specs)
        })
    }

    pub(crate) fn list_ids(&self, name: &str, parent: &str) -> Vec<String> {
        let inner = self.inner.read();
        let Some(state) = inner.list_state(name, parent) else {
            return Vec::new();
        };
        let Some(owner) = inner.records.get(parent) else {
            return Vec::new();
        };
        owner
            .linked_list(&state.key)
            .iter()
            .filter(|id| inner.records.contains_key(id.as_str()))
            .cloned()
            .collect()
    }

    pub(crate) fn list_records(&self, name: &str, parent: &str, variables: &Value) -> Vec<Value> {
        let inner = self.inner.read();
        let Some(state) = inner.list_state(name, parent) else {
            return Vec::new();
        };
        let Some(owner) = inner.records.get(parent) else {
            return Vec::new();
        };
        let selection = Arc::clone(&state.selection);
        owner
            .linked_list(&state.key)
            .to_vec()
            .iter()
            .filter(|id| inner.records.contains_key(id.as_str()))
            .map(|id| inner.read_selection(id, &selection, variables))
            .collect()
    }

    pub(crate) fn list_filters(&self, name: &str, parent: &str) -> Option<HashMap<String, Value>> {
        self.inner
            .read()
            .list_state(name, parent)
            .map(|state| state.filters.clone())
    }
}

/// A mounted named list: one field on one record, plus the element selection
/// and the filter arguments it was subscribed with.
#[derive(Clone)]
struct ListState {
    name: String,
    parent_id: String,
    key: String,
    element_type: String,
    selection: Arc<SubscriptionSelection>,
    filters: HashMap<String, Value>,
}

/// Set-like accumulator: one entry per distinct setter.
#[derive(Default)]
struct SpecCollector {
    specs: Vec<SubscriptionSpec>,
    seen: HashSet<usize>,
}

impl SpecCollector {
    fn extend_from(&mut self, specs: &[SubscriptionSpec]) {
        for spec in specs {
            if self.seen.insert(spec.setter_id()) {
                self.specs.push(spec.clone());
            }
        }
    }
}

struct CacheInner {
    config: CacheConfig,
    records: HashMap<String, Record>,
    // list name -> parent record id -> state
    lists: HashMap<String, HashMap<String, ListState>>,
}

impl CacheInner {
    fn record_mut(&mut self, id: &str) -> &mut Record {
        self.records.entry(id.to_string()).or_default()
    }

    fn record_typename(&self, id: &str) -> Option<String> {
        self.records
            .get(id)
            .and_then(|record| record.field("__typename"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn list_state(&self, name: &str, parent: &str) -> Option<&ListState> {
        self.lists.get(name)?.get(parent)
    }

    fn required_list(&self, name: &str, parent: &str) -> Result<ListState, CacheError> {
        self.list_state(name, parent)
            .cloned()
            .ok_or_else(|| CacheError::UnmountedList {
                name: name.to_string(),
                parent: parent.to_string(),
            })
    }

    /// Entity id for a payload object, `None` when identity fields are
    /// missing (the object is embedded).
    fn identify(&self, declared_type: &str, object: &Map<String, Value>) -> Option<String> {
        let type_name = object
            .get("__typename")
            .and_then(Value::as_str)
            .unwrap_or(declared_type);
        let keys = self.config.key_fields(type_name);
        let mut parts = Vec::with_capacity(keys.len());
        for key in keys {
            match object.get(key) {
                Some(Value::String(part)) => parts.push(part.clone()),
                Some(value) if !value.is_null() => parts.push(value.to_string()),
                _ => return None,
            }
        }
        Some(format!("{type_name}:{}", parts.join("+")))
    }

    fn write_selection(
        &mut self,
        parent_id: &str,
        selection: &SubscriptionSelection,
        object: &Map<String, Value>,
        variables: &Value,
        specs: &mut SpecCollector,
    ) -> Result<(), CacheError> {
        let typename = object.get("__typename").and_then(Value::as_str);
        let fields = selection.fields_for(typename);

        for (field_name, value) in object {
            let Some(field) = fields.get(field_name) else {
                // Servers add __typename whether or not it was selected.
                if field_name == "__typename" {
                    let record = self.record_mut(parent_id);
                    if record.write_field("__typename", value.clone()) {
                        let subscribers = record.subscribers("__typename").to_vec();
                        specs.extend_from(&subscribers);
                    }
                    continue;
                }
                return Err(CacheError::UnknownField {
                    parent: parent_id.to_string(),
                    field: field_name.clone(),
                });
            };

            let key = evaluate_key(&field.key_raw, variables);

            match (value, field.selection.as_deref()) {
                (Value::Object(child), Some(child_selection)) => {
                    self.write_linked_record(
                        parent_id,
                        &key,
                        field,
                        child_selection,
                        child,
                        variables,
                        specs,
                    )?;
                }
                (Value::Array(items), Some(child_selection)) => {
                    self.write_linked_list(
                        parent_id,
                        &key,
                        field,
                        child_selection,
                        items,
                        variables,
                        specs,
                    )?;
                }
                (Value::Null, Some(_)) => {
                    let record = self.record_mut(parent_id);
                    if record.write_record_link(&key, None) {
                        let subscribers = record.subscribers(&key).to_vec();
                        specs.extend_from(&subscribers);
                    }
                }
                (scalar, _) => {
                    let record = self.record_mut(parent_id);
                    if record.write_field(&key, scalar.clone()) {
                        trace!(record = %parent_id, key = %key, "scalar changed");
                        let subscribers = record.subscribers(&key).to_vec();
                        specs.extend_from(&subscribers);
                    }
                }
            }

            if !field.operations.is_empty() {
                self.execute_operations(field, value, variables, specs)?;
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_linked_record(
        &mut self,
        parent_id: &str,
        key: &str,
        field: &FieldSelection,
        child_selection: &SubscriptionSelection,
        child: &Map<String, Value>,
        variables: &Value,
        specs: &mut SpecCollector,
    ) -> Result<(), CacheError> {
        // A payload without identity fields is embedded: it lives under a
        // composite id scoped to the parent field.
        let child_id = self
            .identify(&field.field_type, child)
            .unwrap_or_else(|| format!("{parent_id}.{key}"));

        let record = self.record_mut(parent_id);
        if record.write_record_link(key, Some(child_id.clone())) {
            trace!(record = %parent_id, key = %key, child = %child_id, "record link changed");
            let subscribers = record.subscribers(key).to_vec();
            specs.extend_from(&subscribers);
        }

        self.write_selection(&child_id, child_selection, child, variables, specs)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_linked_list(
        &mut self,
        parent_id: &str,
        key: &str,
        field: &FieldSelection,
        child_selection: &SubscriptionSelection,
        items: &[Value],
        variables: &Value,
        specs: &mut SpecCollector,
    ) -> Result<(), CacheError> {
        let mut ids = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let Some(child) = item.as_object() else {
                continue;
            };
            let child_id = self
                .identify(&field.field_type, child)
                .unwrap_or_else(|| format!("{parent_id}.{key}[{index}]"));
            self.write_selection(&child_id, child_selection, child, variables, specs)?;
            if let Some(list) = &field.list {
                self.record_mut(&child_id)
                    .add_connection_ref(&list.name, parent_id);
            }
            ids.push(child_id);
        }

        let record = self.record_mut(parent_id);
        if record.write_list_link(key, ids) {
            trace!(record = %parent_id, key = %key, "list link changed");
            let subscribers = record.subscribers(key).to_vec();
            specs.extend_from(&subscribers);
        }

        Ok(())
    }

    fn execute_operations(
        &mut self,
        field: &FieldSelection,
        value: &Value,
        variables: &Value,
        specs: &mut SpecCollector,
    ) -> Result<(), CacheError> {
        for operation in &field.operations {
            if operation.action == OperationAction::Delete {
                let type_name = operation
                    .delete_type
                    .as_deref()
                    .unwrap_or(&field.field_type);
                for target in each_value(value) {
                    let Some(raw) = target.as_str() else {
                        return Err(CacheError::InvalidDeleteId {
                            type_name: type_name.to_string(),
                            value: target.to_string(),
                        });
                    };
                    self.delete_record(&format!("{type_name}:{raw}"), variables, specs);
                }
                continue;
            }

            let Some(list_name) = operation.list.as_deref() else {
                return Err(CacheError::MissingOperationList {
                    action: action_name(operation.action).to_string(),
                });
            };
            let parent = resolve_parent_id(operation, list_name, variables)?;
            let state = self.required_list(list_name, &parent)?;

            // A failing when/when_not gate is an intentional no-op.
            if !when_passes(operation.when.as_ref(), &state.filters) {
                debug!(list = %list_name, "operation gated off");
                continue;
            }

            let position = operation.position.unwrap_or_default();
            for target in each_value(value) {
                let Some(object) = target.as_object() else {
                    continue;
                };
                match operation.action {
                    OperationAction::Insert => {
                        self.list_append(&state, position, object, variables, specs)?;
                    }
                    OperationAction::Remove => {
                        let id = self.identify(&state.element_type, object).ok_or_else(|| {
                            CacheError::MissingEntityId {
                                type_name: state.element_type.clone(),
                            }
                        })?;
                        self.list_detach(&state, &id, variables, specs);
                    }
                    OperationAction::Toggle => {
                        let id = self.identify(&state.element_type, object).ok_or_else(|| {
                            CacheError::MissingEntityId {
                                type_name: state.element_type.clone(),
                            }
                        })?;
                        self.list_toggle(&state, position, &id, object, variables, specs)?;
                    }
                    OperationAction::Delete => {}
                }
            }
        }

        Ok(())
    }

    fn list_append(
        &mut self,
        state: &ListState,
        position: ListPosition,
        child: &Map<String, Value>,
        variables: &Value,
        specs: &mut SpecCollector,
    ) -> Result<(), CacheError> {
        let child_id = self.identify(&state.element_type, child).ok_or_else(|| {
            CacheError::MissingEntityId {
                type_name: state.element_type.clone(),
            }
        })?;

        self.write_selection(&child_id, &state.selection, child, variables, specs)?;

        let owner = self.record_mut(&state.parent_id);
        owner.add_to_list(&state.key, child_id.clone(), position);
        let subscribers = owner.subscribers(&state.key).to_vec();
        specs.extend_from(&subscribers);

        self.record_mut(&child_id)
            .add_connection_ref(&state.name, &state.parent_id);

        // List subscribers also watch the new member's own fields, so later
        // updates to the entity propagate without a fresh subscribe.
        let selection = Arc::clone(&state.selection);
        self.insert_subscribers(&child_id, &selection, &subscribers, variables);

        debug!(list = %state.name, id = %child_id, "list insert");
        Ok(())
    }

    fn list_detach(
        &mut self,
        state: &ListState,
        id: &str,
        variables: &Value,
        specs: &mut SpecCollector,
    ) {
        let owner = self.record_mut(&state.parent_id);
        if !owner.remove_from_list(&state.key, id) {
            // Detaching an absent reference is normal control flow.
            return;
        }
        let subscribers = owner.subscribers(&state.key).to_vec();
        specs.extend_from(&subscribers);

        let setters: Vec<usize> = subscribers.iter().map(SubscriptionSpec::setter_id).collect();
        let selection = Arc::clone(&state.selection);
        self.unsubscribe_selection(id, &selection, variables, &setters);

        if let Some(record) = self.records.get_mut(id) {
            record.remove_connection_ref(&state.name, &state.parent_id);
        }

        debug!(list = %state.name, id = %id, "list remove");
    }

    fn list_toggle(
        &mut self,
        state: &ListState,
        position: ListPosition,
        id: &str,
        child: &Map<String, Value>,
        variables: &Value,
        specs: &mut SpecCollector,
    ) -> Result<(), CacheError> {
        let present = self
            .records
            .get(&state.parent_id)
            .is_some_and(|owner| owner.list_contains(&state.key, id));
        if present {
            self.list_detach(state, id, variables, specs);
            Ok(())
        } else {
            self.list_append(state, position, child, variables, specs)
        }
    }

    fn delete_record(
        &mut self,
        id: &str,
        variables: &Value,
        specs: &mut SpecCollector,
    ) {
        let Some(record) = self.records.get_mut(id) else {
            return;
        };
        record.clear_subscribers();
        let references = record.connections().to_vec();

        for reference in references {
            if let Some(state) = self.list_state(&reference.name, &reference.parent_id).cloned() {
                self.list_detach(&state, id, variables, specs);
            }
        }

        self.records.remove(id);
        debug!(record = %id, "record deleted");
    }

    fn subscribe_selection(
        &mut self,
        record_id: &str,
        selection: &SubscriptionSelection,
        spec: &SubscriptionSpec,
        variables: &Value,
    ) {
        let typename = self.record_typename(record_id);
        let fields = selection.fields_for(typename.as_deref());

        for field in fields.values() {
            let key = evaluate_key(&field.key_raw, variables);
            self.record_mut(record_id)
                .add_subscriber(&field.key_raw, &key, spec);

            if let (Some(list), Some(child_selection)) = (&field.list, field.selection.as_deref())
            {
                let filters = field
                    .filters
                    .as_ref()
                    .map(|filters| {
                        filters
                            .iter()
                            .map(|(name, value)| (name.clone(), value.resolve(variables)))
                            .collect()
                    })
                    .unwrap_or_default();
                let state = ListState {
                    name: list.name.clone(),
                    parent_id: record_id.to_string(),
                    key: key.clone(),
                    element_type: list.element_type.clone(),
                    selection: Arc::new(child_selection.clone()),
                    filters,
                };
                self.lists
                    .entry(list.name.clone())
                    .or_default()
                    .insert(record_id.to_string(), state);
                debug!(list = %list.name, parent = %record_id, "list mounted");
            }

            if let Some(child_selection) = field.selection.as_deref() {
                let (linked_record, linked_list) = self.links(record_id, &key);
                if let Some(child_id) = linked_record {
                    self.subscribe_selection(&child_id, child_selection, spec, variables);
                }
                for child_id in linked_list {
                    self.subscribe_selection(&child_id, child_selection, spec, variables);
                }
            }
        }
    }

    fn unsubscribe_spec(
        &mut self,
        record_id: &str,
        selection: &SubscriptionSelection,
        setter_id: usize,
        variables: &Value,
    ) {
        let typename = self.record_typename(record_id);
        let fields = selection.fields_for(typename.as_deref());

        for field in fields.values() {
            let key = evaluate_key(&field.key_raw, variables);
            let (linked_record, linked_list) = self.links(record_id, &key);

            if let Some(record) = self.records.get_mut(record_id) {
                record.remove_subscriber(&key, setter_id);
            }

            // Unmount the list once nobody watches the field anymore.
            if let Some(list) = &field.list {
                let unwatched = self
                    .records
                    .get(record_id)
                    .map_or(true, |record| record.subscriber_count(&key) == 0);
                if unwatched {
                    if let Some(parents) = self.lists.get_mut(&list.name) {
                        parents.remove(record_id);
                        if parents.is_empty() {
                            self.lists.remove(&list.name);
                        }
                    }
                    debug!(list = %list.name, parent = %record_id, "list unmounted");
                }
            }

            if let Some(child_selection) = field.selection.as_deref() {
                if let Some(child_id) = linked_record {
                    self.unsubscribe_spec(&child_id, child_selection, setter_id, variables);
                }
                for child_id in linked_list {
                    self.unsubscribe_spec(&child_id, child_selection, setter_id, variables);
                }
            }
        }
    }

    /// Subscribe existing specs onto a record's fields (list insertions).
    fn insert_subscribers(
        &mut self,
        record_id: &str,
        selection: &SubscriptionSelection,
        specs: &[SubscriptionSpec],
        variables: &Value,
    ) {
        let typename = self.record_typename(record_id);
        let fields = selection.fields_for(typename.as_deref());

        for field in fields.values() {
            let key = evaluate_key(&field.key_raw, variables);
            {
                let record = self.record_mut(record_id);
                for spec in specs {
                    record.add_subscriber(&field.key_raw, &key, spec);
                }
            }
            if let Some(child_selection) = field.selection.as_deref() {
                let (linked_record, linked_list) = self.links(record_id, &key);
                if let Some(child_id) = linked_record {
                    self.insert_subscribers(&child_id, child_selection, specs, variables);
                }
                for child_id in linked_list {
                    self.insert_subscribers(&child_id, child_selection, specs, variables);
                }
            }
        }
    }

    /// Remove setters from a record tree without touching reference counts
    /// elsewhere (list removals).
    fn unsubscribe_selection(
        &mut self,
        record_id: &str,
        selection: &SubscriptionSelection,
        variables: &Value,
        setters: &[usize],
    ) {
        let typename = self.record_typename(record_id);
        let fields = selection.fields_for(typename.as_deref());

        for field in fields.values() {
            let key = evaluate_key(&field.key_raw, variables);
            let (linked_record, linked_list) = self.links(record_id, &key);

            if let Some(record) = self.records.get_mut(record_id) {
                for setter in setters {
                    record.remove_subscriber_entirely(&key, *setter);
                }
            }

            if let Some(child_selection) = field.selection.as_deref() {
                if let Some(child_id) = linked_record {
                    self.unsubscribe_selection(&child_id, child_selection, variables, setters);
                }
                for child_id in linked_list {
                    self.unsubscribe_selection(&child_id, child_selection, variables, setters);
                }
            }
        }
    }

    fn links(&self, record_id: &str, key: &str) -> (Option<String>, Vec<String>) {
        let Some(record) = self.records.get(record_id) else {
            return (None, Vec::new());
        };
        (
            record.record_link(key).flatten().map(str::to_string),
            record.linked_list(key).to_vec(),
        )
    }

    fn read_selection(
        &self,
        record_id: &str,
        selection: &SubscriptionSelection,
        variables: &Value,
    ) -> Value {
        let Some(record) = self.records.get(record_id) else {
            return Value::Null;
        };
        let typename = record.field("__typename").and_then(Value::as_str);
        let fields = selection.fields_for(typename);

        let mut out = Map::new();
        for (response_key, field) in fields {
            let key = evaluate_key(&field.key_raw, variables);
            let value = if let Some(child_selection) = field.selection.as_deref() {
                if let Some(link) = record.record_link(&key) {
                    match link {
                        Some(child_id) => {
                            self.read_selection(child_id, child_selection, variables)
                        }
                        None => Value::Null,
                    }
                } else if let Some(ids) = record.list_link(&key) {
                    Value::Array(
                        ids.iter()
                            .map(|child_id| {
                                self.read_selection(child_id, child_selection, variables)
                            })
                            .collect(),
                    )
                } else {
                    Value::Null
                }
            } else {
                record.field(&key).cloned().unwrap_or(Value::Null)
            };
            out.insert(response_key.clone(), value);
        }

        Value::Object(out)
    }

    fn prepare(&self, specs: SpecCollector, variables: &Value) -> Vec<(Setter, Value)> {
        if !specs.specs.is_empty() {
            debug!(count = specs.specs.len(), "notifying subscribers");
        }
        specs
            .specs
            .into_iter()
            .map(|spec| {
                let root = spec.parent_id.as_deref().unwrap_or(ROOT_ID);
                let value = self.read_selection(root, &spec.selection, variables);
                (Arc::clone(&spec.set), value)
            })
            .collect()
    }
}

fn dispatch(notifications: Vec<(Setter, Value)>) {
    for (set, value) in notifications {
        set(value);
    }
}

fn each_value(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn resolve_parent_id(
    operation: &MutationOperation,
    list: &str,
    variables: &Value,
) -> Result<String, CacheError> {
    match &operation.parent_id {
        None => Ok(ROOT_ID.to_string()),
        Some(ParentIdRef::Literal(id)) => Ok(id.clone()),
        Some(ParentIdRef::Variable(name)) => variables
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CacheError::InvalidParentId {
                list: list.to_string(),
            }),
    }
}

pub(crate) fn when_passes(when: Option<&WhenFilter>, filters: &HashMap<String, Value>) -> bool {
    let Some(when) = when else {
        return true;
    };
    if let Some(must) = &when.must {
        return must
            .iter()
            .all(|(key, value)| filters.get(key) == Some(value));
    }
    if let Some(must_not) = &when.must_not {
        return !must_not
            .iter()
            .all(|(key, value)| filters.get(key) == Some(value));
    }
    true
}

const fn action_name(action: OperationAction) -> &'static str {
    match action {
        OperationAction::Insert => "insert",
        OperationAction::Remove => "remove",
        OperationAction::Delete => "delete",
        OperationAction::Toggle => "toggle",
    }
}
