//! Grid Events
//!
//! Notifications emitted by a [`Grid`](super::Grid) on a tokio broadcast
//! channel. Selection events carry the selected hashes in selection order.

use crate::models::{FieldValue, RecordHash};
use serde::Serialize;

/// A cell by visible row and column index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CellPosition {
    pub row: usize,
    pub col: usize,
}

impl CellPosition {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    /// The selected hash set changed
    SelectionChange { hashes: Vec<RecordHash> },

    /// A user gesture finished changing the selection
    SelectionComplete { hashes: Vec<RecordHash> },

    FocusMove {
        from: Option<CellPosition>,
        to: Option<CellPosition>,
    },

    BeforeEdit {
        cell: CellPosition,
        hash: RecordHash,
        field: String,
    },

    /// A completed edit changed the record
    Edit {
        cell: CellPosition,
        hash: RecordHash,
        field: String,
        value: FieldValue,
    },

    /// An edit ended without changing the record
    Rollback {
        cell: CellPosition,
        hash: RecordHash,
        field: String,
    },
}

impl GridEvent {
    pub fn event_type(&self) -> &str {
        match self {
            GridEvent::SelectionChange { .. } => "selectionChange",
            GridEvent::SelectionComplete { .. } => "selectionComplete",
            GridEvent::FocusMove { .. } => "focusMove",
            GridEvent::BeforeEdit { .. } => "beforeEdit",
            GridEvent::Edit { .. } => "edit",
            GridEvent::Rollback { .. } => "rollback",
        }
    }
}
