//! Stores
//!
//! This module contains the stateful owners of a dataset:
//!
//! - `Store` - flat rows with load lifecycle, paging, sort/filter policy and commit
//! - `TreeStore` - hierarchical rows with path addressing and lazy expansion
//!
//! Both take their rows from an injected [`Loader`](crate::db::Loader) and
//! report every change on a broadcast channel of
//! [`StoreEvent`](crate::db::StoreEvent)s.

pub mod error;
pub mod store;
pub mod tree_store;

pub use error::StoreError;
pub use store::{total_pages, LoadPhase, Store};
pub use tree_store::{ExpandDepth, TreeStore};
