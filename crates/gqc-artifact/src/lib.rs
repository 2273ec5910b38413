//! GQC Artifact - Compiled GraphQL document artifacts.
//!
//! This crate provides:
//! - The serializable artifact model handed from build time to runtime.
//! - The selection tree consumed by the normalized cache.
//! - The selection compiler that merges abstract-type branches so every
//!   concrete type resolves to exactly one field map.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

mod artifact;
mod compiler;
mod error;
mod selection;

pub use artifact::{
    Artifact, ArtifactKind, CachePolicy, InputSpec, PaginateDirection, PaginateMethod,
    RefetchSpec, RefetchUpdate, document_hash,
};
pub use compiler::{
    ArgumentValue, FieldArgument, FieldNode, FragmentSpreadNode, InlineFragmentNode, SchemaField,
    SchemaInfo, SelectionNode, compile, compile_with_options, CompileOptions,
};
pub use error::ArtifactError;
pub use selection::{
    AbstractFields, FieldMap, FieldSelection, FilterValue, FragmentSpreadRef, ListMarker,
    ListPosition, ListUpdate, LoadingSpec, MutationOperation, OperationAction, ParentIdRef,
    SubscriptionSelection, WhenFilter,
};
