//! Error types for artifact compilation.

use thiserror::Error;

/// Error type for selection compilation.
///
/// All variants are configuration defects surfaced at build time; none are
/// retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
    /// A selection referenced a type the schema does not define.
    #[error("unknown type in selection: {name}")]
    UnknownType {
        /// Type name as written in the document.
        name: String,
    },

    /// A selection referenced a field its parent type does not define.
    #[error("type {parent} has no field {field}")]
    UnknownField {
        /// Parent type name.
        parent: String,
        /// Field name as written in the document.
        field: String,
    },

    /// More than one inline-fragment branch of an abstract selection was
    /// marked as the loading shape.
    #[error("@loading may mark only one branch of {parent}: saw {first} and {second}")]
    DuplicateLoadingBranch {
        /// Type the branches were selected on.
        parent: String,
        /// First branch carrying the directive.
        first: String,
        /// Second branch carrying the directive.
        second: String,
    },

    /// A type stored in a named list is missing one of its identity fields.
    #[error("list {list} stores {type_name}, which has no key field {key}")]
    MissingListKey {
        /// List name from the directive.
        list: String,
        /// Element type of the list.
        type_name: String,
        /// Missing key field.
        key: String,
    },
}
