//! Grid interaction state
//!
//! The selection and single-cell edit engine that sits between a store and
//! whatever renders it:
//!
//! - [`Grid`] - selections by hash, focus, the active editor
//! - [`GridConfig`] - selection mode and column flags
//! - [`RowSource`] - the rows a grid shows, implemented by both stores
//! - [`GridEvent`] - notifications for the rendering layer

mod config;
mod engine;
mod events;
mod source;

pub use config::{ColumnConfig, GridConfig, SelectionMode};
pub use engine::{ClickModifier, EditOutcome, EditSession, FocusDirection, Grid};
pub use events::{CellPosition, GridEvent};
pub use source::RowSource;
