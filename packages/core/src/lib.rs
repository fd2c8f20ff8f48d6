//! GridStore Core - data layer for grid and tree widgets
//!
//! This crate provides observable datasets for flat and hierarchical rows,
//! the stores that load, page, sort, filter and commit them, and the
//! selection/cell-edit state machine a grid keeps on top.
//!
//! # Architecture
//!
//! - **Records** keep an original and a current snapshot, so dirty fields,
//!   commit and rollback fall out of comparing the two
//! - **Datasets** sort and filter by rewriting a view over their records,
//!   never by discarding them
//! - **Stores** own one dataset and take their rows from an injected
//!   [`Loader`](db::Loader); local and remote stores share one state machine
//! - **Grids** track selections by record hash, so they survive reloads that
//!   reorder rows
//!
//! # Modules
//!
//! - [`models`] - Typed values, field metadata, records, sort/filter specs
//! - [`data`] - Dataset and row reading
//! - [`db`] - Loading strategies, transport seam, events, configuration
//! - [`services`] - Store and TreeStore
//! - [`grid`] - Selection and cell-edit engine

pub mod data;
pub mod db;
pub mod grid;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use data::{DataChange, Dataset};
pub use db::{LoadResponse, Loader, StoreConfig, StoreEvent, Transport};
pub use grid::{Grid, GridConfig, GridEvent, RowSource};
pub use models::*;
pub use services::*;
