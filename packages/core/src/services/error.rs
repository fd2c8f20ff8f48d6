//! Store Error Types
//!
//! Errors here are programming errors: a row that is not an object, a filter
//! whose value does not fit its operator, a JSON spec that does not parse.
//! Loads and lookups never produce them; those report failure as data.

use crate::models::ValidationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Row or query validation failed
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A JSON sort/filter specification did not parse
    #[error("Malformed {kind} specification: {source}")]
    MalformedSpec {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn malformed_sorters(source: serde_json::Error) -> Self {
        Self::MalformedSpec {
            kind: "sort",
            source,
        }
    }

    pub fn malformed_filters(source: serde_json::Error) -> Self {
        Self::MalformedSpec {
            kind: "filter",
            source,
        }
    }
}

/// Result type for store operations that can fail validation
pub type Result<T> = std::result::Result<T, StoreError>;
