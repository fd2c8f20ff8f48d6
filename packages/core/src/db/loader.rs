//! Loader Trait - Loading Strategy Abstraction
//!
//! This module defines the `Loader` trait that abstracts where a store's rows
//! come from. A store is constructed with one loader and never branches on
//! which one it has:
//!
//! - [`LocalLoader`](super::LocalLoader): rows supplied up front; loading is
//!   synchronous materialization
//! - [`RemoteLoader`](super::RemoteLoader): rows fetched through a
//!   [`Transport`](super::Transport), with remote sort/filter/paging and (for
//!   trees) remote expansion and ancestor discovery
//!
//! # Failure policy
//!
//! Loaders never return `Err`. A failed fetch becomes a response with
//! `success: false` and a message, so callers branch on data rather than on
//! a thrown failure.

use crate::models::Record;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result of a load, expansion or ancestor lookup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadResponse {
    pub success: bool,

    /// Raw rows as delivered
    pub records: Vec<Value>,

    /// Total rows on the server (all pages)
    pub total: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Any other keys of the response payload
    pub extra: Map<String, Value>,
}

impl LoadResponse {
    pub fn ok(records: Vec<Value>) -> Self {
        let total = records.len();
        Self {
            success: true,
            records,
            total,
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Read a transport payload using the configured field names
    ///
    /// `success` defaults to `false` when absent; `total` defaults to the
    /// number of rows.
    pub fn from_payload(payload: Value, records_field: &str, total_field: &str) -> Self {
        let Value::Object(mut object) = payload else {
            return Self::failure("response payload is not an object");
        };
        let success = object
            .remove("success")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let records = match object.remove(records_field) {
            Some(Value::Array(rows)) => rows,
            _ => Vec::new(),
        };
        let total = object
            .remove(total_field)
            .and_then(|v| v.as_u64())
            .map(|t| t as usize)
            .unwrap_or(records.len());
        let message = object
            .remove("message")
            .and_then(|v| v.as_str().map(str::to_string));
        Self {
            success,
            records,
            total,
            message,
            extra: object,
        }
    }
}

/// One row sent to a commit endpoint
///
/// `origin` holds the pre-mutation primary-key snapshot (empty for new rows);
/// `updated` holds the current row, or `null` when the row was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordChange {
    pub origin: Map<String, Value>,
    pub updated: Option<Map<String, Value>>,
}

impl RecordChange {
    pub fn updated(record: &Record) -> Self {
        Self {
            origin: record.origin(),
            updated: Some(record.to_json()),
        }
    }

    pub fn removed(record: &Record) -> Self {
        Self {
            origin: record.origin(),
            updated: None,
        }
    }
}

/// Result of a commit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub extra: Map<String, Value>,
}

impl CommitResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn from_payload(payload: Value) -> Self {
        let Value::Object(mut object) = payload else {
            return Self::failure("response payload is not an object");
        };
        let success = object
            .remove("success")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let message = object
            .remove("message")
            .and_then(|v| v.as_str().map(str::to_string));
        Self {
            success,
            message,
            extra: object,
        }
    }
}

/// Abstraction over where a store's rows come from
///
/// Implementations must be `Send + Sync`; stores hold them behind an `Arc`
/// and await them without holding any store lock.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Whether requests leave the process (enables remote sort/filter/page)
    fn is_remote(&self) -> bool;

    /// Load one page (or every row) using the serialized query parameters
    async fn load(&self, params: &Map<String, Value>) -> LoadResponse;

    /// Children of one tree record
    ///
    /// `None` means this loader has no child source; the record is then
    /// treated as having no children.
    async fn load_children(
        &self,
        _parent: &Record,
        _params: &Map<String, Value>,
    ) -> Option<LoadResponse> {
        None
    }

    /// Ancestor chain (root first) of a tree record not resolvable locally
    async fn load_parents(
        &self,
        _child: &Record,
        _params: &Map<String, Value>,
    ) -> Option<LoadResponse> {
        None
    }

    /// Persist changed rows
    async fn commit(
        &self,
        changes: Vec<RecordChange>,
        params: &Map<String, Value>,
    ) -> CommitResponse;
}
