//! Record Data Structure
//!
//! A [`Record`] is one row of a dataset: an ordered mapping of field name to
//! [`FieldValue`] plus the snapshot it was last committed with.
//!
//! # Snapshots
//!
//! - `original`: values as of the last load or commit
//! - `current`: values as seen by callers, changed through the dataset setter
//!
//! A field is dirty when its current value differs from the original one.
//! [`Record::commit`] collapses current into original, [`Record::rollback`]
//! restores original into current. Both are idempotent.
//!
//! # Identity
//!
//! The [`RecordHash`] is derived from the committed primary-key values (all
//! committed fields when no primary key is declared). It stays stable while a
//! record is being edited and is refreshed on commit, so selection keyed by
//! hash survives edits of the row.
//!
//! Phantom records (added locally, never committed) have an empty original
//! snapshot: every field is dirty and their hash comes from current values.

use super::record_list::RecordList;
use super::value::FieldValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Ordered field name → value mapping
pub type Row = IndexMap<String, FieldValue>;

/// Identity of a record derived from its key values
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordHash(String);

impl RecordHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of data with mutation history
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    original: Row,
    current: Row,
    hash: RecordHash,
    primary_keys: Arc<[String]>,
    phantom: bool,
    children: Option<RecordList>,
}

impl Record {
    /// Create a committed record (no dirty fields)
    pub fn new(values: Row, primary_keys: Arc<[String]>) -> Self {
        let hash = compute_hash(&values, &primary_keys);
        Self {
            original: values.clone(),
            current: values,
            hash,
            primary_keys,
            phantom: false,
            children: None,
        }
    }

    /// Create a record that has never been committed
    pub fn phantom(values: Row, primary_keys: Arc<[String]>) -> Self {
        let hash = compute_hash(&values, &primary_keys);
        Self {
            original: Row::new(),
            current: values,
            hash,
            primary_keys,
            phantom: true,
            children: None,
        }
    }

    pub fn hash(&self) -> &RecordHash {
        &self.hash
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.current.get(field)
    }

    /// Value of `field`, `Null` when absent
    pub fn value(&self, field: &str) -> FieldValue {
        self.current.get(field).cloned().unwrap_or_default()
    }

    pub fn values(&self) -> &Row {
        &self.current
    }

    pub fn original_values(&self) -> &Row {
        &self.original
    }

    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    pub fn is_phantom(&self) -> bool {
        self.phantom
    }

    /// Set a field; returns `true` when the current value changed
    ///
    /// Only the owning dataset calls this, so that the change notification and
    /// dirty tracking cannot be bypassed.
    pub(crate) fn set(&mut self, field: &str, value: FieldValue) -> bool {
        match self.current.get(field) {
            Some(existing) if *existing == value => false,
            _ => {
                self.current.insert(field.to_string(), value);
                true
            }
        }
    }

    /// Fields whose current value differs from the original snapshot
    pub fn dirty_fields(&self) -> Vec<&str> {
        self.current
            .iter()
            .filter(|(name, value)| self.original.get(name.as_str()) != Some(*value))
            .map(|(name, _)| name.as_str())
            .chain(
                self.original
                    .keys()
                    .filter(|name| !self.current.contains_key(name.as_str()))
                    .map(String::as_str),
            )
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.phantom || self.current != self.original
    }

    /// Collapse current into original; field values are unchanged
    pub fn commit(&mut self) {
        if !self.is_dirty() {
            return;
        }
        self.original = self.current.clone();
        self.phantom = false;
        self.hash = compute_hash(&self.original, &self.primary_keys);
    }

    /// Restore original into current
    pub fn rollback(&mut self) {
        if self.phantom || self.current == self.original {
            return;
        }
        self.current = self.original.clone();
    }

    /// Values identifying this record: committed primary keys, or every
    /// committed field when no primary key is declared
    fn key_values(&self) -> Vec<FieldValue> {
        let source = if self.phantom {
            &self.current
        } else {
            &self.original
        };
        key_values(source, &self.primary_keys)
    }

    /// Primary-key equality
    pub fn is_equal(&self, other: &Record) -> bool {
        let ours = self.key_values();
        let theirs = other.key_values();
        ours.len() == theirs.len() && ours.iter().zip(&theirs).all(|(a, b)| a.loose_eq(b))
    }

    /// Hash equality
    pub fn is_identical(&self, other: &Record) -> bool {
        self.hash == other.hash
    }

    /// Whether the given JSON object carries this record's primary-key values
    pub fn matches_key(&self, key: &Map<String, Value>) -> bool {
        if self.primary_keys.is_empty() {
            return self.original.iter().all(|(name, value)| {
                key.get(name)
                    .is_some_and(|v| FieldValue::from_json(v).loose_eq(value))
            });
        }
        let source = if self.phantom {
            &self.current
        } else {
            &self.original
        };
        self.primary_keys.iter().all(|name| {
            let ours = source.get(name).cloned().unwrap_or_default();
            key.get(name)
                .is_some_and(|v| FieldValue::from_json(v).loose_eq(&ours))
        })
    }

    /// Pre-mutation primary-key snapshot, used to locate the row remotely
    ///
    /// Empty for phantom records. Without declared primary keys the whole
    /// original row is the origin.
    pub fn origin(&self) -> Map<String, Value> {
        if self.phantom {
            return Map::new();
        }
        if self.primary_keys.is_empty() {
            return row_to_json(&self.original);
        }
        self.primary_keys
            .iter()
            .map(|name| {
                let value = self.original.get(name).map(FieldValue::to_json);
                (name.clone(), value.unwrap_or(Value::Null))
            })
            .collect()
    }

    /// Current values as a JSON object
    pub fn to_json(&self) -> Map<String, Value> {
        row_to_json(&self.current)
    }

    /// Children of a tree record
    ///
    /// `None` means the children are unknown (not fetched yet); an empty list
    /// means the record is known to have no children.
    pub fn children(&self) -> Option<&RecordList> {
        self.children.as_ref()
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut RecordList> {
        self.children.as_mut()
    }

    pub fn has_children_loaded(&self) -> bool {
        self.children.is_some()
    }

    pub(crate) fn set_children(&mut self, children: Option<RecordList>) {
        self.children = children;
    }

    pub(crate) fn with_children(mut self, children: Option<RecordList>) -> Self {
        self.children = children;
        self
    }
}

fn key_values(row: &Row, primary_keys: &[String]) -> Vec<FieldValue> {
    if primary_keys.is_empty() {
        return row.values().cloned().collect();
    }
    primary_keys
        .iter()
        .map(|name| row.get(name).cloned().unwrap_or_default())
        .collect()
}

fn compute_hash(row: &Row, primary_keys: &[String]) -> RecordHash {
    let values = key_values(row, primary_keys)
        .iter()
        .map(FieldValue::to_json)
        .collect();
    RecordHash(Value::Array(values).to_string())
}

fn row_to_json(row: &Row) -> Map<String, Value> {
    row.iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect()
}
