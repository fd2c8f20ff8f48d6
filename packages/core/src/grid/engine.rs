//! Grid - selection and single-cell edit state
//!
//! A `Grid` owns the interaction state for one view over a [`RowSource`]:
//!
//! - **Selections** keyed by record hash, so they follow rows across
//!   re-sorts and reloads rather than sticking to positions.
//! - **Focus**: one cell, clamped to the visible rows and columns.
//! - **Editing**: at most one cell, `Idle -> Editing(row, col) -> Idle`.
//!
//! The grid caches the source's rows and listens to the source's store
//! events. [`Grid::sync_with_source`] reconciles against whatever changed since
//! the last call, and [`Grid::follow_source`] waits for the next change.
//! [`Grid::refresh`] forces a full reconciliation.
//!
//! # Edit completion
//!
//! The draft is compared with the record's current value in the source, not
//! the cached row. An unchanged draft takes the rollback path and the record
//! is not touched; a changed draft is written through the source, which marks
//! the field dirty. Focus returns to the edited cell either way.

use super::config::{GridConfig, SelectionMode};
use super::events::{CellPosition, GridEvent};
use super::source::RowSource;
use crate::db::StoreEvent;
use crate::models::{FieldValue, Record, RecordHash};
use indexmap::IndexMap;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

const GRID_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Modifier held during a click
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClickModifier {
    #[default]
    None,
    /// Add or remove the clicked row (ctrl/cmd)
    Toggle,
    /// Extend from the last clicked row (shift)
    Range,
}

/// Direction for keyboard focus movement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusDirection {
    Up,
    Down,
    Left,
    Right,
}

/// The cell being edited
#[derive(Debug, Clone, PartialEq)]
pub struct EditSession {
    pub cell: CellPosition,
    pub hash: RecordHash,
    pub field: String,
    pub draft: FieldValue,
}

/// How an edit ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Edited,
    RolledBack,
}

/// What pending store events mean for the cached rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Staleness {
    Fresh,
    /// Values or structure changed; selections that still resolve are kept
    Rows,
    /// A load replaced the records
    Reloaded,
}

impl Staleness {
    fn of(event: &StoreEvent) -> Self {
        match event {
            StoreEvent::Load {
                success: true,
                superseded: false,
                ..
            } => Staleness::Reloaded,
            StoreEvent::Update(_) | StoreEvent::UpdateChildren { .. } => Staleness::Rows,
            _ => Staleness::Fresh,
        }
    }
}

pub struct Grid<S: RowSource> {
    source: S,
    config: GridConfig,
    rows: Vec<Record>,
    selections: IndexMap<RecordHash, Record>,
    anchor: Option<usize>,
    focus: Option<CellPosition>,
    editing: Option<EditSession>,
    event_tx: broadcast::Sender<GridEvent>,
    store_rx: broadcast::Receiver<StoreEvent>,
}

impl<S: RowSource> Grid<S> {
    /// Create a grid; rows are pulled on the first [`refresh`](Self::refresh)
    pub fn new(source: S, config: GridConfig) -> Self {
        let (event_tx, _) = broadcast::channel(GRID_EVENT_CHANNEL_CAPACITY);
        let store_rx = source.subscribe_to_events();
        Self {
            source,
            config,
            rows: Vec::new(),
            selections: IndexMap::new(),
            anchor: None,
            focus: None,
            editing: None,
            event_tx,
            store_rx,
        }
    }

    pub fn subscribe_to_events(&self) -> broadcast::Receiver<GridEvent> {
        self.event_tx.subscribe()
    }

    fn emit_event(&self, event: GridEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Record> {
        self.rows.get(index)
    }

    pub fn is_multiple(&self) -> bool {
        self.config.is_multiple()
    }

    /// Re-read rows from the source and reconcile selection, focus and edit state
    ///
    /// Non-keepable grids drop their selections; keepable ones restore them.
    /// An edit whose record disappeared is abandoned without a signal.
    pub async fn refresh(&mut self) {
        self.reconcile(self.config.keepable).await;
    }

    /// Reconcile with every store change announced since the last call
    ///
    /// A new load is handled like [`refresh`](Self::refresh). Field and
    /// structural updates re-read rows but keep the selections that still
    /// resolve. Returns whether anything was re-read.
    pub async fn sync_with_source(&mut self) -> bool {
        let stale = self.pending_staleness(Staleness::Fresh);
        self.apply_staleness(stale).await
    }

    /// Wait for the next store change that affects the rows, then reconcile
    ///
    /// Returns `false` once the source has stopped emitting.
    pub async fn follow_source(&mut self) -> bool {
        let stale = loop {
            match self.store_rx.recv().await {
                Ok(event) => match Staleness::of(&event) {
                    Staleness::Fresh => continue,
                    stale => break stale,
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Grid missed {} store event(s)", skipped);
                    break Staleness::Reloaded;
                }
                Err(RecvError::Closed) => return false,
            }
        };
        let stale = self.pending_staleness(stale);
        self.apply_staleness(stale).await
    }

    /// Fold every queued store event into `stale`
    fn pending_staleness(&mut self, mut stale: Staleness) -> Staleness {
        loop {
            match self.store_rx.try_recv() {
                Ok(event) => stale = stale.max(Staleness::of(&event)),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!("Grid missed {} store event(s)", skipped);
                    stale = Staleness::Reloaded;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return stale,
            }
        }
    }

    async fn apply_staleness(&mut self, stale: Staleness) -> bool {
        match stale {
            Staleness::Fresh => return false,
            Staleness::Rows => self.reconcile(true).await,
            Staleness::Reloaded => self.refresh().await,
        }
        true
    }

    async fn reconcile(&mut self, keep_selections: bool) {
        // Everything queued so far is reflected in the rows read below
        let _ = self.pending_staleness(Staleness::Fresh);
        self.rows = self.source.rows().await;

        if keep_selections {
            self.restore_selections();
        } else {
            self.replace_selections(IndexMap::new());
        }

        if let Some(session) = &self.editing {
            match self.position_of(&session.hash) {
                Some(row) => {
                    let cell = CellPosition::new(row, session.cell.col);
                    if let Some(session) = self.editing.as_mut() {
                        session.cell = cell;
                    }
                }
                None => {
                    tracing::debug!("Dropping edit of vanished record {}", session.hash);
                    self.editing = None;
                }
            }
        }

        let clamped = self.focus.and_then(|cell| self.clamp(cell));
        self.set_focus(clamped);
        self.anchor = self.anchor.filter(|row| *row < self.rows.len());
    }

    fn position_of(&self, hash: &RecordHash) -> Option<usize> {
        self.rows.iter().position(|r| r.hash() == hash)
    }

    //
    // SELECTION
    //

    fn selected_hashes(&self) -> Vec<RecordHash> {
        self.selections.keys().cloned().collect()
    }

    /// Install `next`; `SelectionChange` fires only if the hash set differs
    fn replace_selections(&mut self, next: IndexMap<RecordHash, Record>) -> bool {
        let changed = {
            let before: HashSet<&RecordHash> = self.selections.keys().collect();
            before.len() != next.len() || next.keys().any(|hash| !before.contains(hash))
        };
        self.selections = next;
        if changed {
            self.emit_event(GridEvent::SelectionChange {
                hashes: self.selected_hashes(),
            });
        }
        changed
    }

    fn complete_gesture(&self, changed: bool) {
        if changed {
            self.emit_event(GridEvent::SelectionComplete {
                hashes: self.selected_hashes(),
            });
        }
    }

    pub fn get_selections(&self) -> Vec<Record> {
        self.selections.values().cloned().collect()
    }

    pub fn is_selected(&self, row: usize) -> bool {
        self.rows
            .get(row)
            .is_some_and(|record| self.selections.contains_key(record.hash()))
    }

    /// Select the row at `row`; in single mode (or without `keep_existing`)
    /// it replaces the current selection
    pub fn select(&mut self, row: usize, keep_existing: bool) -> bool {
        let Some(record) = self.rows.get(row).cloned() else {
            return false;
        };
        let mut next = if keep_existing && self.is_multiple() {
            self.selections.clone()
        } else {
            IndexMap::new()
        };
        next.insert(record.hash().clone(), record);
        self.anchor = Some(row);
        self.replace_selections(next)
    }

    pub fn deselect(&mut self, row: usize) -> bool {
        let Some(record) = self.rows.get(row) else {
            return false;
        };
        let mut next = self.selections.clone();
        next.shift_remove(record.hash());
        self.replace_selections(next)
    }

    pub fn toggle(&mut self, row: usize) -> bool {
        if self.is_selected(row) {
            self.deselect(row)
        } else {
            self.select(row, true)
        }
    }

    /// Select rows `a..=b` in either direction; single mode selects only `b`
    pub fn select_range(&mut self, a: usize, b: usize) -> bool {
        if !self.is_multiple() {
            return self.select(b, false);
        }
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let next: IndexMap<RecordHash, Record> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(i, _)| (low..=high).contains(i))
            .map(|(_, record)| (record.hash().clone(), record.clone()))
            .collect();
        if next.is_empty() {
            return false;
        }
        self.replace_selections(next)
    }

    /// Select every visible row (only the first in single mode)
    pub fn select_all(&mut self) -> bool {
        if self.rows.is_empty() {
            return false;
        }
        if !self.is_multiple() {
            return self.select(0, false);
        }
        let next = self
            .rows
            .iter()
            .map(|record| (record.hash().clone(), record.clone()))
            .collect();
        self.replace_selections(next)
    }

    pub fn deselect_all(&mut self) -> bool {
        self.replace_selections(IndexMap::new())
    }

    /// Select exactly the visible rows with the given hashes; unknown hashes are ignored
    pub fn set_selections(&mut self, hashes: &[RecordHash]) -> bool {
        let mut next: IndexMap<RecordHash, Record> = hashes
            .iter()
            .filter_map(|hash| {
                let row = self.position_of(hash)?;
                Some((hash.clone(), self.rows[row].clone()))
            })
            .collect();
        if !self.is_multiple() {
            next.truncate(1);
        }
        self.replace_selections(next)
    }

    /// Re-apply the selected hashes to the current rows, dropping missing ones
    pub fn restore_selections(&mut self) -> bool {
        let next = self
            .selections
            .keys()
            .filter_map(|hash| {
                let row = self.position_of(hash)?;
                Some((hash.clone(), self.rows[row].clone()))
            })
            .collect();
        self.replace_selections(next)
    }

    /// Handle a click on a cell according to the selection mode
    pub fn click_cell(&mut self, cell: CellPosition, modifier: ClickModifier) -> bool {
        if cell.row >= self.rows.len() {
            return false;
        }
        self.set_focus(self.clamp(cell));

        let changed = match self.config.selection_mode {
            SelectionMode::Manual | SelectionMode::Check => false,
            SelectionMode::Column => {
                let selectable = self
                    .config
                    .columns
                    .get(cell.col)
                    .is_some_and(|column| column.selectable);
                selectable && self.select(cell.row, false)
            }
            SelectionMode::Row => match (modifier, self.anchor) {
                (ClickModifier::Toggle, _) if self.is_multiple() => self.toggle(cell.row),
                (ClickModifier::Range, Some(anchor)) if self.is_multiple() => {
                    let changed = self.select_range(anchor, cell.row);
                    self.anchor = Some(anchor);
                    changed
                }
                _ => self.select(cell.row, false),
            },
        };
        self.complete_gesture(changed);
        changed
    }

    /// Checkbox toggle (check mode)
    pub fn toggle_check(&mut self, row: usize) -> bool {
        if self.config.selection_mode != SelectionMode::Check {
            return false;
        }
        let changed = self.toggle(row);
        self.complete_gesture(changed);
        changed
    }

    //
    // FOCUS
    //

    pub fn focus(&self) -> Option<CellPosition> {
        self.focus
    }

    fn clamp(&self, cell: CellPosition) -> Option<CellPosition> {
        let last_row = self.rows.len().checked_sub(1)?;
        let last_col = self.config.columns.len().saturating_sub(1);
        Some(CellPosition::new(cell.row.min(last_row), cell.col.min(last_col)))
    }

    fn set_focus(&mut self, to: Option<CellPosition>) {
        if self.focus == to {
            return;
        }
        let from = std::mem::replace(&mut self.focus, to);
        self.emit_event(GridEvent::FocusMove { from, to });
    }

    /// Focus a cell; out-of-range positions are clamped
    pub fn focus_cell(&mut self, cell: CellPosition) -> Option<CellPosition> {
        let clamped = self.clamp(cell);
        self.set_focus(clamped);
        self.focus
    }

    /// Move focus one step, staying inside the grid
    pub fn move_focus(&mut self, direction: FocusDirection) -> Option<CellPosition> {
        let Some(current) = self.focus else {
            return self.focus_cell(CellPosition::new(0, 0));
        };
        let next = match direction {
            FocusDirection::Up => CellPosition::new(current.row.saturating_sub(1), current.col),
            FocusDirection::Down => CellPosition::new(current.row + 1, current.col),
            FocusDirection::Left => CellPosition::new(current.row, current.col.saturating_sub(1)),
            FocusDirection::Right => CellPosition::new(current.row, current.col + 1),
        };
        self.focus_cell(next)
    }

    //
    // EDITING
    //

    pub fn editing(&self) -> Option<&EditSession> {
        self.editing.as_ref()
    }

    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    /// Start editing `cell`
    ///
    /// If another cell is being edited, that edit is completed and this
    /// request is dropped (returns `false`); the caller re-issues it.
    pub async fn begin_edit(&mut self, cell: CellPosition) -> bool {
        if let Some(active) = &self.editing {
            if active.cell == cell {
                return true;
            }
            self.complete_edit().await;
            return false;
        }

        let Some(column) = self.config.columns.get(cell.col) else {
            return false;
        };
        if !column.editable {
            return false;
        }
        let Some(record) = self.rows.get(cell.row) else {
            return false;
        };

        let session = EditSession {
            cell,
            hash: record.hash().clone(),
            field: column.field.clone(),
            draft: record.value(&column.field),
        };
        self.emit_event(GridEvent::BeforeEdit {
            cell,
            hash: session.hash.clone(),
            field: session.field.clone(),
        });
        self.editing = Some(session);
        self.set_focus(Some(cell));
        true
    }

    /// Replace the value being typed
    pub fn set_draft(&mut self, value: impl Into<FieldValue>) -> bool {
        match self.editing.as_mut() {
            Some(session) => {
                session.draft = value.into();
                true
            }
            None => false,
        }
    }

    /// Finish the active edit, writing the draft if it differs
    pub async fn complete_edit(&mut self) -> Option<EditOutcome> {
        let session = self.editing.take()?;
        let written = match self.source.get(&session.hash).await {
            Some(record) if record.value(&session.field) == session.draft => false,
            Some(_) => self
                .source
                .set_value(&session.hash, &session.field, session.draft.clone())
                .await
                .unwrap_or(false),
            None => {
                tracing::debug!("Edited record {} no longer exists", session.hash);
                false
            }
        };

        let outcome = if written {
            self.sync_rows().await;
            self.emit_event(GridEvent::Edit {
                cell: session.cell,
                hash: session.hash.clone(),
                field: session.field.clone(),
                value: session.draft.clone(),
            });
            EditOutcome::Edited
        } else {
            self.rollback_signal(&session)
        };

        self.focus_cell(session.cell);
        Some(outcome)
    }

    /// Abandon the active edit without writing
    pub fn cancel_edit(&mut self) -> Option<EditOutcome> {
        let session = self.editing.take()?;
        let outcome = self.rollback_signal(&session);
        self.focus_cell(session.cell);
        Some(outcome)
    }

    fn rollback_signal(&self, session: &EditSession) -> EditOutcome {
        self.emit_event(GridEvent::Rollback {
            cell: session.cell,
            hash: session.hash.clone(),
            field: session.field.clone(),
        });
        EditOutcome::RolledBack
    }

    /// Pull fresh row values after a write, keeping selection identity
    async fn sync_rows(&mut self) {
        self.rows = self.source.rows().await;
        let refreshed: Vec<(RecordHash, Record)> = self
            .selections
            .keys()
            .filter_map(|hash| {
                let row = self.position_of(hash)?;
                Some((hash.clone(), self.rows[row].clone()))
            })
            .collect();
        for (hash, record) in refreshed {
            self.selections.insert(hash, record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreConfig;
    use crate::grid::ColumnConfig;
    use crate::services::Store;
    use serde_json::json;

    fn grid(mode: SelectionMode, multiple: bool) -> Grid<Store> {
        let store = Store::local(
            StoreConfig::new().with_primary_keys(["id"]),
            vec![
                json!({"id": 1, "name": "a"}),
                json!({"id": 2, "name": "b"}),
                json!({"id": 3, "name": "c"}),
            ],
        );
        let config = GridConfig::new(vec![
            ColumnConfig::new("id").selectable(),
            ColumnConfig::new("name").editable(),
        ])
        .with_selection_mode(mode)
        .with_multiple(multiple);

        tokio_test::block_on(async {
            store.load().await;
            let mut grid = Grid::new(store, config);
            grid.refresh().await;
            grid
        })
    }

    #[test]
    fn test_select_range_is_direction_agnostic() {
        let mut multi = grid(SelectionMode::Row, true);
        assert!(multi.select_range(2, 0));
        assert_eq!(multi.get_selections().len(), 3);

        let mut single = grid(SelectionMode::Row, false);
        single.select_range(0, 2);
        let selected = single.get_selections();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].value("id"), FieldValue::Int(3));
    }

    #[test]
    fn test_column_mode_is_single_even_if_multiple() {
        let mut grid = grid(SelectionMode::Column, true);
        assert!(grid.click_cell(CellPosition::new(0, 0), ClickModifier::None));
        assert!(grid.click_cell(CellPosition::new(1, 0), ClickModifier::Toggle));
        assert_eq!(grid.get_selections().len(), 1);
        assert!(grid.is_selected(1));

        // Non-selectable column only moves focus
        assert!(!grid.click_cell(CellPosition::new(2, 1), ClickModifier::None));
        assert_eq!(grid.focus(), Some(CellPosition::new(2, 1)));
    }

    #[test]
    fn test_check_mode_toggles() {
        let mut grid = grid(SelectionMode::Check, false);
        assert!(!grid.click_cell(CellPosition::new(0, 0), ClickModifier::None));
        assert!(grid.toggle_check(0));
        assert!(grid.toggle_check(2));
        assert_eq!(grid.get_selections().len(), 2);
        assert!(grid.toggle_check(0));
        assert!(!grid.is_selected(0));
    }

    #[test]
    fn test_manual_mode_never_selects_on_click() {
        let mut grid = grid(SelectionMode::Manual, true);
        assert!(!grid.click_cell(CellPosition::new(1, 0), ClickModifier::None));
        assert!(grid.get_selections().is_empty());
        assert!(grid.select(1, false));
    }

    #[test]
    fn test_shift_click_extends_from_anchor() {
        let mut grid = grid(SelectionMode::Row, true);
        grid.click_cell(CellPosition::new(2, 0), ClickModifier::None);
        grid.click_cell(CellPosition::new(0, 0), ClickModifier::Range);
        assert_eq!(grid.get_selections().len(), 3);
    }

    #[test]
    fn test_move_focus_clamps() {
        let mut grid = grid(SelectionMode::Row, false);
        assert_eq!(grid.move_focus(FocusDirection::Up), Some(CellPosition::new(0, 0)));
        assert_eq!(grid.move_focus(FocusDirection::Up), Some(CellPosition::new(0, 0)));
        grid.move_focus(FocusDirection::Right);
        assert_eq!(grid.move_focus(FocusDirection::Right), Some(CellPosition::new(0, 1)));
        for _ in 0..5 {
            grid.move_focus(FocusDirection::Down);
        }
        assert_eq!(grid.focus(), Some(CellPosition::new(2, 1)));
    }

    #[test]
    fn test_cancel_always_rolls_back() {
        let mut grid = grid(SelectionMode::Row, false);
        tokio_test::block_on(async {
            assert!(grid.begin_edit(CellPosition::new(0, 1)).await);
        });
        grid.set_draft("changed");
        assert_eq!(grid.cancel_edit(), Some(EditOutcome::RolledBack));
        assert!(!grid.is_editing());
        assert_eq!(grid.row(0).unwrap().value("name"), FieldValue::from("a"));
    }

    #[test]
    fn test_non_editable_column_does_not_enter_edit() {
        let mut grid = grid(SelectionMode::Row, false);
        let started = tokio_test::block_on(grid.begin_edit(CellPosition::new(0, 0)));
        assert!(!started);
        assert!(!grid.is_editing());
    }
}
