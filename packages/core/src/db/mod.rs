//! Loading Layer
//!
//! This module handles everything between a store and its data source:
//!
//! - The [`Loader`] trait: the loading strategy injected into a store
//! - [`LocalLoader`] / [`RemoteLoader`]: the two strategies
//! - The [`Transport`] seam consumed by the remote strategy
//! - [`StoreConfig`]: construction-time configuration
//! - [`StoreEvent`]: notifications emitted by stores

pub mod config;
pub mod events;
mod loader;
mod local;
mod remote;

pub use config::{StoreConfig, DEFAULT_PAGE_SIZE};
pub use events::StoreEvent;
pub use loader::{CommitResponse, LoadResponse, Loader, RecordChange};
pub use local::{ChildrenHook, LocalLoader};
pub use remote::{RemoteLoader, Transport};
