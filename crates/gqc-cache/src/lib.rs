//! GQC Cache - Normalized client cache for GraphQL responses.
//!
//! This crate provides:
//! - Entity records keyed `"Type:id"` with scalar fields and record/list links.
//! - A cache engine that writes response payloads, diffs changes, and
//!   notifies subscribed selections exactly once per write.
//! - Connection handlers for declarative and imperative list mutations.
//!
//! One [`Cache`] per client; callers own the instance and its lifecycle.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

mod cache;
mod connection;
mod error;
mod key;
mod record;

pub use cache::{Cache, CacheConfig, ROOT_ID};
pub use connection::ConnectionHandler;
pub use error::CacheError;
pub use key::{evaluate_key, key_has_variables};
pub use record::{ConnectionRef, Record, Setter, SubscriptionSpec};
