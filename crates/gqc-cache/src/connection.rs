//! Connection handlers.
//!
//! A [`ConnectionHandler`] is a view over one mounted named list: the
//! list-valued field of a single record, plus the filters it was subscribed
//! with and an optional `when`/`when_not` gate. Both declarative mutation
//! operations and imperative application code mutate lists through it.

use gqc_artifact::{ListPosition, WhenFilter};
use serde_json::Value;

use crate::cache::{Cache, when_passes};
use crate::error::CacheError;

/// View over one mounted named list.
///
/// Obtained from [`Cache::connection`]; operations resolve the list state at
/// call time, so a handler stays valid across writes.
pub struct ConnectionHandler<'a> {
    cache: &'a Cache,
    name: String,
    parent_id: String,
    when: Option<WhenFilter>,
}

impl<'a> ConnectionHandler<'a> {
    pub(crate) fn new(cache: &'a Cache, name: &str, parent_id: &str) -> Self {
        Self {
            cache,
            name: name.to_string(),
            parent_id: parent_id.to_string(),
            when: None,
        }
    }

    /// List name this handler targets.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent record the list hangs off.
    #[must_use]
    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    /// Scope the handler with a conditional gate.
    #[must_use]
    pub fn when(mut self, when: WhenFilter) -> Self {
        self.when = Some(when);
        self
    }

    /// Evaluate the gate against the list's current filters.
    ///
    /// Passes when no condition is attached.
    #[must_use]
    pub fn validate_when(&self) -> bool {
        let filters = self
            .cache
            .list_filters(&self.name, &self.parent_id)
            .unwrap_or_default();
        when_passes(self.when.as_ref(), &filters)
    }

    /// Write an entity and append its id to the list.
    ///
    /// Notifies the list's subscribers and subscribes them onto the new
    /// record's own fields. Gated by `when`; a failing gate is a no-op.
    pub fn append(&self, data: &Value, variables: &Value) -> Result<(), CacheError> {
        self.cache.list_insert(
            &self.name,
            &self.parent_id,
            self.when.as_ref(),
            ListPosition::Last,
            data,
            variables,
        )
    }

    /// Write an entity and prepend its id to the list.
    pub fn prepend(&self, data: &Value, variables: &Value) -> Result<(), CacheError> {
        self.cache.list_insert(
            &self.name,
            &self.parent_id,
            self.when.as_ref(),
            ListPosition::First,
            data,
            variables,
        )
    }

    /// Detach an entity, identified from its payload.
    ///
    /// Removal from a list is distinct from deleting the entity: the record
    /// itself stays in the cache.
    pub fn remove(&self, data: &Value, variables: &Value) -> Result<(), CacheError> {
        self.cache.list_remove(
            &self.name,
            &self.parent_id,
            self.when.as_ref(),
            data,
            variables,
        )
    }

    /// Detach an id from the list.
    pub fn remove_id(&self, id: &str, variables: &Value) -> Result<(), CacheError> {
        self.cache.list_remove_id(
            &self.name,
            &self.parent_id,
            self.when.as_ref(),
            id,
            variables,
        )
    }

    /// Remove the entity when it is a member, append it otherwise.
    pub fn toggle(&self, data: &Value, variables: &Value) -> Result<(), CacheError> {
        self.cache.list_toggle(
            &self.name,
            &self.parent_id,
            self.when.as_ref(),
            ListPosition::Last,
            data,
            variables,
        )
    }

    /// Member ids in list order, skipping ids that no longer resolve.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.cache.list_ids(&self.name, &self.parent_id)
    }

    /// Member records in list order, read with the list's element selection,
    /// skipping ids that no longer resolve.
    #[must_use]
    pub fn records(&self, variables: &Value) -> Vec<Value> {
        self.cache.list_records(&self.name, &self.parent_id, variables)
    }
}

impl IntoIterator for &ConnectionHandler<'_> {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids().into_iter()
    }
}
