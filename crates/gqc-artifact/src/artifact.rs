//! Artifact model: the serialized contract between build time and runtime.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::selection::SubscriptionSelection;

/// One compiled GraphQL document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Document name.
    pub name: String,

    /// Operation kind.
    pub kind: ArtifactKind,

    /// Content hash of the normalized document text.
    pub hash: String,

    /// Normalized document text with internal directives stripped.
    pub raw: String,

    /// Root type of the operation.
    pub root_type: String,

    /// Compiled selection tree.
    pub selection: SubscriptionSelection,

    /// Input type descriptors for custom scalar marshalling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputSpec>,

    /// Pagination descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refetch: Option<RefetchSpec>,

    /// Cache policy (queries only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<CachePolicy>,

    /// Whether partial cache data may satisfy the document (queries only).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

/// Operation kind carried by an artifact.
///
/// The serialized names are fixed by the artifact wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Query document.
    #[serde(rename = "HoudiniQuery")]
    Query,
    /// Mutation document.
    #[serde(rename = "HoudiniMutation")]
    Mutation,
    /// Subscription document.
    #[serde(rename = "HoudiniSubscription")]
    Subscription,
    /// Fragment definition.
    #[serde(rename = "HoudiniFragment")]
    Fragment,
}

impl ArtifactKind {
    /// Returns `true` for query documents.
    #[must_use]
    pub const fn is_query(self) -> bool {
        matches!(self, Self::Query)
    }

    /// Returns `true` for mutation documents.
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        matches!(self, Self::Mutation)
    }
}

/// Input type descriptors, enough to marshal custom scalars recursively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    /// Top-level variable name to type name.
    pub fields: IndexMap<String, String>,

    /// Named input type to its field type map.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub types: IndexMap<String, IndexMap<String, String>>,

    /// Default values per variable.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub defaults: IndexMap<String, Value>,
}

/// Pagination descriptor for refetchable documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefetchSpec {
    /// How refetched pages merge into the cached list.
    pub update: RefetchUpdate,

    /// Response path to the paginated field.
    pub path: Vec<String>,

    /// Pagination method.
    pub method: PaginateMethod,

    /// Page size of the initial fetch.
    pub page_size: usize,

    /// Whether the paginated field lives on an entity rather than the root.
    pub embedded: bool,

    /// Type the paginated field returns.
    pub target_type: String,

    /// Which directions the document can paginate in.
    pub direction: PaginateDirection,
}

/// Merge direction for refetched pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefetchUpdate {
    /// New pages extend the tail.
    Append,
    /// New pages extend the head.
    Prepend,
}

/// Pagination method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaginateMethod {
    /// Relay-style cursors.
    Cursor,
    /// Numeric offsets.
    Offset,
}

/// Supported pagination directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaginateDirection {
    /// Forward only.
    Forward,
    /// Backward only.
    Backward,
    /// Both directions.
    Both,
}

/// Cache policy for query documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CachePolicy {
    /// Serve from cache when complete, fall back to the network.
    #[default]
    CacheOrNetwork,
    /// Never hit the network.
    CacheOnly,
    /// Always hit the network.
    NetworkOnly,
}

/// Hash the normalized document text for build-over-build change detection.
///
/// Identical text always produces the same digest within a build.
#[must_use]
pub fn document_hash(raw: &str) -> String {
    let mut hasher = DefaultHasher::new();
    raw.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_hash_is_stable_and_content_sensitive() {
        let query = "query All { items { id } }";
        assert_eq!(document_hash(query), document_hash(query));
        assert_ne!(document_hash(query), document_hash("query All { items { id name } }"));
        assert_eq!(document_hash(query).len(), 16);
    }

    #[test]
    fn kind_serializes_with_wire_names() {
        let kind = serde_json::to_string(&ArtifactKind::Query).unwrap();
        assert_eq!(kind, "\"HoudiniQuery\"");

        let parsed: ArtifactKind = serde_json::from_str("\"HoudiniFragment\"").unwrap();
        assert_eq!(parsed, ArtifactKind::Fragment);
    }
}
