//! Row Reader
//!
//! Turns raw JSON rows (as delivered by a loading strategy) into [`Record`]s,
//! coercing values to declared field types and attaching tree children.
//!
//! A row's children are:
//! - the records read from its `children_field` array when present,
//! - a known-empty list when its `leaf_field` is `true`,
//! - unknown (`None`) otherwise, meaning they must be fetched on expansion.

use crate::models::{FieldSet, Record, RecordList, Row, ValidationError};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct RowReader {
    fields: FieldSet,
    primary_keys: Arc<[String]>,
    children_field: Option<String>,
    leaf_field: Option<String>,
}

impl RowReader {
    pub fn new(fields: FieldSet, primary_keys: Vec<String>) -> Self {
        Self {
            fields,
            primary_keys: primary_keys.into(),
            children_field: None,
            leaf_field: None,
        }
    }

    /// Read nested children from `children_field` and leaf markers from `leaf_field`
    pub fn with_tree_fields(
        mut self,
        children_field: impl Into<String>,
        leaf_field: impl Into<String>,
    ) -> Self {
        self.children_field = Some(children_field.into());
        self.leaf_field = Some(leaf_field.into());
        self
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    pub fn primary_keys(&self) -> &Arc<[String]> {
        &self.primary_keys
    }

    fn values(&self, row: &Value) -> Result<Row, ValidationError> {
        let object = row
            .as_object()
            .ok_or_else(|| ValidationError::invalid_row(row))?;

        let mut values = Row::new();
        for meta in self.fields.iter() {
            let raw = object.get(&meta.name).unwrap_or(&Value::Null);
            values.insert(meta.name.clone(), self.fields.coerce(&meta.name, raw));
        }
        for (name, raw) in object {
            if self.children_field.as_deref() == Some(name.as_str())
                || self.leaf_field.as_deref() == Some(name.as_str())
                || values.contains_key(name)
            {
                continue;
            }
            values.insert(name.clone(), self.fields.coerce(name, raw));
        }
        Ok(values)
    }

    fn children(&self, row: &Value) -> Option<RecordList> {
        if let Some(Value::Array(rows)) = self
            .children_field
            .as_ref()
            .and_then(|field| row.get(field))
        {
            return Some(RecordList::new(self.read_all(rows)));
        }
        let is_leaf = self
            .leaf_field
            .as_ref()
            .and_then(|field| row.get(field))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        is_leaf.then(RecordList::default)
    }

    /// Read one committed record
    pub fn read(&self, row: &Value) -> Result<Record, ValidationError> {
        let values = self.values(row)?;
        Ok(Record::new(values, self.primary_keys.clone()).with_children(self.children(row)))
    }

    /// Read one record that has never been committed
    pub fn read_phantom(&self, row: &Value) -> Result<Record, ValidationError> {
        let values = self.values(row)?;
        Ok(Record::phantom(values, self.primary_keys.clone()).with_children(self.children(row)))
    }

    /// Read every row, skipping malformed ones
    pub fn read_all(&self, rows: &[Value]) -> Vec<Record> {
        rows.iter()
            .filter_map(|row| match self.read(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping malformed row: {}", e);
                    None
                }
            })
            .collect()
    }
}
