//! Entity records.
//!
//! One [`Record`] per entity id (or the root). A record stores scalar field
//! values, record links (1:1), list links (1:N, insertion ordered), the
//! subscription specs depending on each key, and back-references to every
//! named list the record is an element of.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use gqc_artifact::{ListPosition, SubscriptionSelection};
use serde_json::Value;

use crate::key::key_has_variables;

/// Subscriber callback invoked with freshly read data.
pub type Setter = Arc<dyn Fn(Value) + Send + Sync>;

/// A subscribed selection plus its setter callback.
///
/// The setter's pointer identity identifies the subscriber: the same handle
/// subscribed through multiple paths is notified once per write.
#[derive(Clone)]
pub struct SubscriptionSpec {
    /// Selection to read when notifying.
    pub selection: Arc<SubscriptionSelection>,

    /// Callback receiving the freshly read data.
    pub set: Setter,

    /// Record the selection is rooted at; defaults to the cache root.
    pub parent_id: Option<String>,
}

impl SubscriptionSpec {
    /// Create a spec rooted at the cache root.
    #[must_use]
    pub fn new(selection: Arc<SubscriptionSelection>, set: Setter) -> Self {
        Self {
            selection,
            set,
            parent_id: None,
        }
    }

    /// Root the spec at a specific record.
    #[must_use]
    pub fn with_parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Identity of the subscriber, derived from the setter handle.
    #[must_use]
    pub fn setter_id(&self) -> usize {
        Arc::as_ptr(&self.set).cast::<()>() as usize
    }
}

impl fmt::Debug for SubscriptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionSpec")
            .field("setter", &self.setter_id())
            .field("parent_id", &self.parent_id)
            .finish_non_exhaustive()
    }
}

/// Back-reference to a named list a record is an element of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRef {
    /// List name.
    pub name: String,
    /// Parent record the list hangs off.
    pub parent_id: String,
}

/// Storage for one entity.
#[derive(Debug, Default)]
pub struct Record {
    fields: HashMap<String, Value>,
    record_links: HashMap<String, Option<String>>,
    list_links: HashMap<String, Vec<String>>,
    subscribers: HashMap<String, Vec<SubscriptionSpec>>,
    key_versions: HashMap<String, BTreeSet<String>>,
    reference_counts: HashMap<String, HashMap<usize, usize>>,
    connections: Vec<ConnectionRef>,
}

impl Record {
    /// Scalar value stored under an evaluated key.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Write a scalar, reporting whether the content changed.
    pub(crate) fn write_field(&mut self, key: &str, value: Value) -> bool {
        if self.fields.get(key) == Some(&value) {
            return false;
        }
        self.fields.insert(key.to_string(), value);
        true
    }

    /// Record link stored under a key. Outer `None` means no link was ever
    /// written; inner `None` is an explicit null link.
    #[must_use]
    pub fn record_link(&self, key: &str) -> Option<Option<&str>> {
        self.record_links.get(key).map(Option::as_deref)
    }

    pub(crate) fn write_record_link(&mut self, key: &str, id: Option<String>) -> bool {
        if self.record_links.get(key) == Some(&id) {
            return false;
        }
        self.record_links.insert(key.to_string(), id);
        true
    }

    /// List link stored under a key, `None` if never written.
    #[must_use]
    pub fn list_link(&self, key: &str) -> Option<&[String]> {
        self.list_links.get(key).map(Vec::as_slice)
    }

    /// Ids linked under a key, empty when absent.
    #[must_use]
    pub fn linked_list(&self, key: &str) -> &[String] {
        self.list_links.get(key).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn write_list_link(&mut self, key: &str, ids: Vec<String>) -> bool {
        if self.list_links.get(key) == Some(&ids) {
            return false;
        }
        self.list_links.insert(key.to_string(), ids);
        true
    }

    pub(crate) fn add_to_list(&mut self, key: &str, id: String, position: ListPosition) {
        let list = self.list_links.entry(key.to_string()).or_default();
        match position {
            ListPosition::First => list.insert(0, id),
            ListPosition::Last => list.push(id),
        }
    }

    /// Detach the first occurrence of an id, reporting whether it was there.
    pub(crate) fn remove_from_list(&mut self, key: &str, id: &str) -> bool {
        let Some(list) = self.list_links.get_mut(key) else {
            return false;
        };
        let Some(index) = list.iter().position(|entry| entry == id) else {
            return false;
        };
        list.remove(index);
        true
    }

    #[must_use]
    pub(crate) fn list_contains(&self, key: &str, id: &str) -> bool {
        self.linked_list(key).iter().any(|entry| entry == id)
    }

    /// Register a spec on an evaluated key.
    ///
    /// When the raw key embeds variables, every previously seen evaluated
    /// variant is cleared for this subscriber first, so stale variable-bound
    /// subscriptions don't linger across variable changes.
    pub(crate) fn add_subscriber(&mut self, raw_key: &str, key: &str, spec: &SubscriptionSpec) {
        if key_has_variables(raw_key) {
            let stale: Vec<String> = self
                .key_versions
                .get(raw_key)
                .map(|versions| {
                    versions
                        .iter()
                        .filter(|version| version.as_str() != key)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            for version in stale {
                self.remove_subscriber_entirely(&version, spec.setter_id());
            }
        }

        self.key_versions
            .entry(raw_key.to_string())
            .or_default()
            .insert(key.to_string());

        *self
            .reference_counts
            .entry(key.to_string())
            .or_default()
            .entry(spec.setter_id())
            .or_insert(0) += 1;

        let subscribers = self.subscribers.entry(key.to_string()).or_default();
        if !subscribers
            .iter()
            .any(|existing| existing.setter_id() == spec.setter_id())
        {
            subscribers.push(spec.clone());
        }
    }

    /// Specs currently depending on a key.
    #[must_use]
    pub fn subscribers(&self, key: &str) -> &[SubscriptionSpec] {
        self.subscribers.get(key).map_or(&[], Vec::as_slice)
    }

    /// Number of distinct subscribers on a key.
    #[must_use]
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.subscribers.get(key).map_or(0, Vec::len)
    }

    /// Drop one registration of a subscriber on a key; the subscriber stays
    /// until its reference count reaches zero.
    pub(crate) fn remove_subscriber(&mut self, key: &str, setter_id: usize) {
        let mut gone = false;
        if let Some(counts) = self.reference_counts.get_mut(key) {
            if let Some(count) = counts.get_mut(&setter_id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    counts.remove(&setter_id);
                    gone = true;
                }
            }
        }
        if gone {
            if let Some(subscribers) = self.subscribers.get_mut(key) {
                subscribers.retain(|spec| spec.setter_id() != setter_id);
            }
        }
    }

    /// Drop a subscriber from a key regardless of its reference count.
    pub(crate) fn remove_subscriber_entirely(&mut self, key: &str, setter_id: usize) {
        if let Some(counts) = self.reference_counts.get_mut(key) {
            counts.remove(&setter_id);
        }
        if let Some(subscribers) = self.subscribers.get_mut(key) {
            subscribers.retain(|spec| spec.setter_id() != setter_id);
        }
    }

    /// Drop every subscriber registration across all keys.
    pub(crate) fn clear_subscribers(&mut self) {
        self.subscribers.clear();
        self.reference_counts.clear();
        self.key_versions.clear();
    }

    /// Named lists this record is an element of.
    #[must_use]
    pub fn connections(&self) -> &[ConnectionRef] {
        &self.connections
    }

    pub(crate) fn add_connection_ref(&mut self, name: &str, parent_id: &str) {
        let reference = ConnectionRef {
            name: name.to_string(),
            parent_id: parent_id.to_string(),
        };
        if !self.connections.contains(&reference) {
            self.connections.push(reference);
        }
    }

    pub(crate) fn remove_connection_ref(&mut self, name: &str, parent_id: &str) {
        self.connections
            .retain(|reference| reference.name != name || reference.parent_id != parent_id);
    }
}
