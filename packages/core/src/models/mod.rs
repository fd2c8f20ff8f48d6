//! Data Models
//!
//! This module contains the core data structures used throughout GridStore:
//!
//! - `FieldValue` / `FieldType` - Typed cell values and declared element types
//! - `FieldSet` - Declared field metadata lookup
//! - `Record` - One row with original/current snapshots and optional children
//! - `RecordList` - Sibling records with a sorted/filtered visible view
//! - `SortSpec` / `FilterSpec` - Query specifications shared by local and remote loading

mod error;
mod field;
mod query;
mod record;
mod record_list;
mod value;

pub use error::ValidationError;
pub use field::{FieldMeta, FieldSet};
pub use query::{
    FilterCondition, FilterMode, FilterOperator, FilterSpec, FilterValue, RangeValue,
    SortDirection, SortSpec,
};
pub use record::{Record, RecordHash, Row};
pub use record_list::RecordList;
pub use value::{FieldType, FieldValue};
