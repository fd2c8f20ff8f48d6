//! Store configuration
//!
//! `StoreConfig` carries everything a store needs to know at construction:
//! where remote data lives, how response payloads are shaped, which fields
//! and primary keys rows have, and whether sort/filter/paging run on the
//! server or locally.

use crate::models::{FieldMeta, FieldSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default page size when paging is enabled without an explicit size
pub const DEFAULT_PAGE_SIZE: usize = 20;

fn default_records_field() -> String {
    "records".to_string()
}

fn default_total_field() -> String {
    "total".to_string()
}

fn default_children_field() -> String {
    "children".to_string()
}

fn default_leaf_field() -> String {
    "leaf".to_string()
}

/// Configuration for a `Store` / `TreeStore`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Remote load endpoint
    pub url: String,

    /// Remote commit endpoint (falls back to `url`)
    pub commit_url: Option<String>,

    /// Remote endpoint returning the children of one record (tree only)
    pub expander_url: Option<String>,

    /// Remote endpoint returning the ancestor chain of one record (tree only)
    pub path_finder_url: Option<String>,

    /// Key of the row array in a load response
    #[serde(default = "default_records_field")]
    pub records_field: String,

    /// Key of the total row count in a load response
    #[serde(default = "default_total_field")]
    pub total_field: String,

    /// Key of nested child rows (tree only)
    #[serde(default = "default_children_field")]
    pub children_field: String,

    /// Key of the boolean marking a row without children (tree only)
    #[serde(default = "default_leaf_field")]
    pub leaf_field: String,

    /// Fields identifying a row; empty means "every field"
    pub primary_keys: Vec<String>,

    /// Declared fields
    pub fields: Vec<FieldMeta>,

    /// Caller parameters sent with every request
    pub params: Map<String, Value>,

    /// Rows per page; 0 disables paging
    pub page_size: usize,

    pub remote_sort: bool,
    pub remote_filter: bool,
    pub remote_page: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            commit_url: None,
            expander_url: None,
            path_finder_url: None,
            records_field: default_records_field(),
            total_field: default_total_field(),
            children_field: default_children_field(),
            leaf_field: default_leaf_field(),
            primary_keys: Vec::new(),
            fields: Vec::new(),
            params: Map::new(),
            page_size: 0,
            remote_sort: false,
            remote_filter: false,
            remote_page: false,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_commit_url(mut self, url: impl Into<String>) -> Self {
        self.commit_url = Some(url.into());
        self
    }

    pub fn with_expander_url(mut self, url: impl Into<String>) -> Self {
        self.expander_url = Some(url.into());
        self
    }

    pub fn with_path_finder_url(mut self, url: impl Into<String>) -> Self {
        self.path_finder_url = Some(url.into());
        self
    }

    pub fn with_primary_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldMeta>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_records_field(mut self, field: impl Into<String>) -> Self {
        self.records_field = field.into();
        self
    }

    pub fn with_total_field(mut self, field: impl Into<String>) -> Self {
        self.total_field = field.into();
        self
    }

    /// Run sort, filter and paging on the server
    pub fn remote(mut self) -> Self {
        self.remote_sort = true;
        self.remote_filter = true;
        self.remote_page = true;
        if self.page_size == 0 {
            self.page_size = DEFAULT_PAGE_SIZE;
        }
        self
    }

    pub fn with_remote_sort(mut self, remote: bool) -> Self {
        self.remote_sort = remote;
        self
    }

    pub fn with_remote_filter(mut self, remote: bool) -> Self {
        self.remote_filter = remote;
        self
    }

    pub fn with_remote_page(mut self, remote: bool) -> Self {
        self.remote_page = remote;
        self
    }

    pub fn field_set(&self) -> FieldSet {
        FieldSet::new(self.fields.clone())
    }

    pub fn commit_endpoint(&self) -> &str {
        self.commit_url.as_deref().unwrap_or(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.records_field, "records");
        assert_eq!(config.total_field, "total");
        assert_eq!(config.page_size, 0);
        assert!(!config.remote_sort);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: StoreConfig = serde_json::from_value(json!({
            "url": "/api/users",
            "recordsField": "rows",
            "primaryKeys": ["id"],
            "fields": [{"name": "id", "type": "int"}],
            "pageSize": 50,
            "remotePage": true
        }))
        .unwrap();

        assert_eq!(config.records_field, "rows");
        assert_eq!(config.total_field, "total");
        assert_eq!(config.page_size, 50);
        assert!(config.remote_page);
        assert_eq!(config.commit_endpoint(), "/api/users");
        assert_eq!(config.field_set().joined_names(), "id");
    }

    #[test]
    fn test_remote_builder_enables_paging() {
        let config = StoreConfig::new().with_url("/x").remote();
        assert!(config.remote_sort && config.remote_filter && config.remote_page);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }
}
