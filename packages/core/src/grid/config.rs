//! Grid configuration

use serde::{Deserialize, Serialize};

/// How clicks turn into selections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Clicking a row selects it; modifiers extend when `multiple` is set
    #[default]
    Row,
    /// A checkbox per row; always multiple, always deselectable
    Check,
    /// Clicking a selectable column selects its row; always single
    Column,
    /// No implicit selection; host code drives it
    Manual,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub field: String,
    pub editable: bool,
    pub selectable: bool,
}

impl ColumnConfig {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Default::default()
        }
    }

    pub fn editable(mut self) -> Self {
        self.editable = true;
        self
    }

    pub fn selectable(mut self) -> Self {
        self.selectable = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub selection_mode: SelectionMode,
    pub multiple: bool,
    /// Keep selections across reloads
    pub keepable: bool,
    pub columns: Vec<ColumnConfig>,
}

impl GridConfig {
    pub fn new(columns: Vec<ColumnConfig>) -> Self {
        Self {
            columns,
            ..Default::default()
        }
    }

    pub fn with_selection_mode(mut self, mode: SelectionMode) -> Self {
        self.selection_mode = mode;
        self
    }

    pub fn with_multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    pub fn with_keepable(mut self, keepable: bool) -> Self {
        self.keepable = keepable;
        self
    }

    /// Whether more than one row may be selected under this mode
    pub fn is_multiple(&self) -> bool {
        match self.selection_mode {
            SelectionMode::Check => true,
            SelectionMode::Column => false,
            SelectionMode::Row | SelectionMode::Manual => self.multiple,
        }
    }
}
