//! Error types for the cache engine.

use thiserror::Error;

/// Error type for cache operations.
///
/// Every variant is a structural defect in the caller's selection, payload,
/// or operation wiring; the cache never retries. Soft conditions (absent
/// links, failed `when` gates) are not errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A payload field is not part of the selection being written.
    #[error("payload field {field} is not part of the selection written to {parent}")]
    UnknownField {
        /// Record the payload was being written into.
        parent: String,
        /// Offending payload field.
        field: String,
    },

    /// A list operation targeted a list no subscriber has mounted.
    #[error("no list {name} is mounted under {parent}")]
    UnmountedList {
        /// List name.
        name: String,
        /// Parent record id the lookup used.
        parent: String,
    },

    /// An operation's parent id did not resolve to a string.
    #[error("parent id for the operation on {list} must resolve to a string")]
    InvalidParentId {
        /// Target list name.
        list: String,
    },

    /// A delete operation's payload was not a string id.
    #[error("delete operation for {type_name} expects a string id, got {value}")]
    InvalidDeleteId {
        /// Entity type being deleted.
        type_name: String,
        /// Offending payload, rendered as JSON.
        value: String,
    },

    /// An insert/remove/toggle operation carried no target list.
    #[error("{action} operation carries no target list")]
    MissingOperationList {
        /// Operation action name.
        action: String,
    },

    /// A list entry could not be identified.
    #[error("cannot compute an id for a {type_name} list entry: missing key fields")]
    MissingEntityId {
        /// Entity type of the entry.
        type_name: String,
    },
}
