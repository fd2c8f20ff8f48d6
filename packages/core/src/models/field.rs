//! Field Metadata
//!
//! Declared fields of a dataset: name plus element type. Records use the
//! lookup table to coerce incoming JSON; undeclared fields are still kept,
//! with their type inferred from the JSON shape.

use super::value::{FieldType, FieldValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One declared field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMeta {
    pub name: String,

    #[serde(default, rename = "type")]
    pub field_type: FieldType,
}

impl FieldMeta {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Ordered set of declared fields with name lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    fields: Vec<FieldMeta>,
    by_name: HashMap<String, usize>,
}

impl FieldSet {
    pub fn new(fields: Vec<FieldMeta>) -> Self {
        let by_name = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Self { fields, by_name }
    }

    pub fn get(&self, name: &str) -> Option<&FieldMeta> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldMeta> {
        self.fields.iter()
    }

    /// Comma-joined declared field names, as sent in the `fields` request param
    pub fn joined_names(&self) -> String {
        self.fields
            .iter()
            .map(|f| f.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Coerce a raw JSON value for `name`
    pub fn coerce(&self, name: &str, value: &Value) -> FieldValue {
        match self.get(name) {
            Some(meta) => FieldValue::coerce(value, meta.field_type),
            None => FieldValue::from_json(value),
        }
    }
}
