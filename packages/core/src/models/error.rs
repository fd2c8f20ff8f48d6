//! Validation errors for rows and query specifications
//!
//! These are programming errors: they surface while building filter/sort
//! specifications or reading rows, never from a lookup or a load.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Unknown filter operator: {0}")]
    UnknownOperator(String),

    #[error("Filter value does not fit operator '{operator}': {reason}")]
    InvalidFilterValue { operator: String, reason: String },

    #[error("Unknown sort direction: {0}")]
    UnknownDirection(String),

    #[error("Row must be a JSON object, got: {0}")]
    InvalidRow(String),
}

impl ValidationError {
    pub fn unknown_operator(op: impl Into<String>) -> Self {
        Self::UnknownOperator(op.into())
    }

    pub fn invalid_filter_value(operator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFilterValue {
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_row(row: &serde_json::Value) -> Self {
        Self::InvalidRow(row.to_string())
    }
}
