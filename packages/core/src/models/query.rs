//! Sort and Filter Specifications
//!
//! Both specifications are ordered mappings keyed by field name and are sent
//! verbatim (JSON-encoded) to remote loaders as the `sorters` and `filters`
//! request parameters.
//!
//! # Examples
//!
//! ```rust
//! use gridstore_core::models::{FilterCondition, FilterMode, FilterSpec, SortDirection, SortSpec};
//!
//! let sorters = SortSpec::new()
//!     .then("dept", SortDirection::Asc)
//!     .then("salary", SortDirection::Desc);
//! assert_eq!(sorters.to_json_string(), r#"{"dept":"asc","salary":"desc"}"#);
//!
//! let filters = FilterSpec::new()
//!     .with("name", FilterCondition::like("ann"))
//!     .with("age", FilterCondition::range(Some(18.into()), Some(65.into())));
//! assert_eq!(filters.len(), 2);
//! # let _ = FilterMode::All;
//! ```

use super::error::ValidationError;
use super::record::Record;
use super::value::FieldValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Direction of one sorter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(ValidationError::UnknownDirection(s.to_string())),
        }
    }
}

/// Ordered multi-field sort specification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortSpec(IndexMap<String, SortDirection>);

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-field sort
    pub fn by(field: impl Into<String>, direction: SortDirection) -> Self {
        Self::new().then(field, direction)
    }

    /// Append a lower-priority sorter
    pub fn then(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.0.insert(field.into(), direction);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SortDirection)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Compare two records field by field; `Equal` means "keep input order"
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for (field, direction) in &self.0 {
            let left = a.get(field).unwrap_or(&FieldValue::Null);
            let right = b.get(field).unwrap_or(&FieldValue::Null);
            let ordering = match direction {
                SortDirection::Asc => left.sort_cmp(right),
                SortDirection::Desc => right.sort_cmp(left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

/// Comparison operator of a filter condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    /// Case-insensitive substring
    Like,
    /// Prefix match on hierarchical codes (`"01"` matches `"0103"`)
    Code,
    /// Set membership
    In,
    /// Start/end bounds with independent operators
    Range,
}

impl FilterOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Ne => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::Ge => ">=",
            FilterOperator::Lt => "<",
            FilterOperator::Le => "<=",
            FilterOperator::Like => "like",
            FilterOperator::Code => "code",
            FilterOperator::In => "in",
            FilterOperator::Range => "range",
        }
    }

    /// Apply a scalar operator to a field value
    fn test(self, field: &FieldValue, expected: &FieldValue) -> bool {
        let ordering = || field.partial_compare(expected);
        match self {
            FilterOperator::Eq => field.loose_eq(expected),
            FilterOperator::Ne => !field.loose_eq(expected),
            FilterOperator::Gt => ordering() == Some(Ordering::Greater),
            FilterOperator::Ge => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
            FilterOperator::Lt => ordering() == Some(Ordering::Less),
            FilterOperator::Le => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
            FilterOperator::Like => field
                .to_string()
                .to_lowercase()
                .contains(&expected.to_string().to_lowercase()),
            FilterOperator::Code => !field.is_null() && field.to_string().starts_with(&expected.to_string()),
            FilterOperator::In | FilterOperator::Range => false,
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" | "==" | "eq" => Ok(FilterOperator::Eq),
            "!=" | "<>" | "ne" => Ok(FilterOperator::Ne),
            ">" | "gt" => Ok(FilterOperator::Gt),
            ">=" | "ge" => Ok(FilterOperator::Ge),
            "<" | "lt" => Ok(FilterOperator::Lt),
            "<=" | "le" => Ok(FilterOperator::Le),
            "like" => Ok(FilterOperator::Like),
            "code" => Ok(FilterOperator::Code),
            "in" => Ok(FilterOperator::In),
            "range" | "between" => Ok(FilterOperator::Range),
            other => Err(ValidationError::unknown_operator(other)),
        }
    }
}

impl Serialize for FilterOperator {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FilterOperator {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn default_start_operator() -> FilterOperator {
    FilterOperator::Ge
}

fn default_end_operator() -> FilterOperator {
    FilterOperator::Le
}

/// Bounds of a range condition; a missing bound is unbounded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RangeValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<FieldValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<FieldValue>,

    #[serde(default = "default_start_operator")]
    pub start_operator: FilterOperator,

    #[serde(default = "default_end_operator")]
    pub end_operator: FilterOperator,
}

/// Value side of a filter condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Range(RangeValue),
    List(Vec<FieldValue>),
    Scalar(FieldValue),
}

#[derive(Deserialize)]
struct RawCondition {
    value: FilterValue,
    operator: FilterOperator,
}

/// One `{value, operator}` entry of a filter specification
///
/// Construction validates that the value shape fits the operator, so a
/// condition that exists can always be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCondition")]
pub struct FilterCondition {
    value: FilterValue,
    operator: FilterOperator,
}

impl TryFrom<RawCondition> for FilterCondition {
    type Error = ValidationError;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        FilterCondition::new(raw.operator, raw.value)
    }
}

impl FilterCondition {
    pub fn new(operator: FilterOperator, value: FilterValue) -> Result<Self, ValidationError> {
        match (&value, operator) {
            (FilterValue::Range(range), FilterOperator::Range) => {
                if !matches!(range.start_operator, FilterOperator::Gt | FilterOperator::Ge | FilterOperator::Eq) {
                    return Err(ValidationError::invalid_filter_value(
                        operator.as_str(),
                        format!("start operator '{}' is not a lower bound", range.start_operator),
                    ));
                }
                if !matches!(range.end_operator, FilterOperator::Lt | FilterOperator::Le | FilterOperator::Eq) {
                    return Err(ValidationError::invalid_filter_value(
                        operator.as_str(),
                        format!("end operator '{}' is not an upper bound", range.end_operator),
                    ));
                }
            }
            (_, FilterOperator::Range) => {
                return Err(ValidationError::invalid_filter_value(
                    operator.as_str(),
                    "expected an object with start/end bounds",
                ));
            }
            (FilterValue::List(_), FilterOperator::In) => {}
            (_, FilterOperator::In) => {
                return Err(ValidationError::invalid_filter_value(
                    operator.as_str(),
                    "expected an array of values",
                ));
            }
            (FilterValue::Scalar(_), _) => {}
            (_, op) => {
                return Err(ValidationError::invalid_filter_value(
                    op.as_str(),
                    "expected a single value",
                ));
            }
        }
        Ok(Self { value, operator })
    }

    /// Parse an operator string and build the condition
    pub fn parse(operator: &str, value: FilterValue) -> Result<Self, ValidationError> {
        Self::new(operator.parse()?, value)
    }

    fn scalar(operator: FilterOperator, value: FieldValue) -> Self {
        Self {
            value: FilterValue::Scalar(value),
            operator,
        }
    }

    pub fn eq(value: impl Into<FieldValue>) -> Self {
        Self::scalar(FilterOperator::Eq, value.into())
    }

    pub fn ne(value: impl Into<FieldValue>) -> Self {
        Self::scalar(FilterOperator::Ne, value.into())
    }

    pub fn gt(value: impl Into<FieldValue>) -> Self {
        Self::scalar(FilterOperator::Gt, value.into())
    }

    pub fn ge(value: impl Into<FieldValue>) -> Self {
        Self::scalar(FilterOperator::Ge, value.into())
    }

    pub fn lt(value: impl Into<FieldValue>) -> Self {
        Self::scalar(FilterOperator::Lt, value.into())
    }

    pub fn le(value: impl Into<FieldValue>) -> Self {
        Self::scalar(FilterOperator::Le, value.into())
    }

    pub fn like(value: impl Into<FieldValue>) -> Self {
        Self::scalar(FilterOperator::Like, value.into())
    }

    pub fn code(value: impl Into<FieldValue>) -> Self {
        Self::scalar(FilterOperator::Code, value.into())
    }

    pub fn one_of(values: Vec<FieldValue>) -> Self {
        Self {
            value: FilterValue::List(values),
            operator: FilterOperator::In,
        }
    }

    /// Inclusive range; pass `None` for an open end
    pub fn range(start: Option<FieldValue>, end: Option<FieldValue>) -> Self {
        Self {
            value: FilterValue::Range(RangeValue {
                start,
                end,
                start_operator: FilterOperator::Ge,
                end_operator: FilterOperator::Le,
            }),
            operator: FilterOperator::Range,
        }
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn value(&self) -> &FilterValue {
        &self.value
    }

    pub fn matches(&self, field: &FieldValue) -> bool {
        match &self.value {
            FilterValue::Scalar(expected) => self.operator.test(field, expected),
            FilterValue::List(values) => values.iter().any(|v| field.loose_eq(v)),
            FilterValue::Range(range) => {
                let lower = range
                    .start
                    .as_ref()
                    .map_or(true, |start| range.start_operator.test(field, start));
                let upper = range
                    .end
                    .as_ref()
                    .map_or(true, |end| range.end_operator.test(field, end));
                lower && upper
            }
        }
    }
}

/// How multiple filter conditions combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterMode {
    /// Every condition must match
    #[default]
    #[serde(rename = "and", alias = "all")]
    All,
    /// At least one condition must match
    #[serde(rename = "or", alias = "any")]
    Any,
}

impl FilterMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterMode::All => "and",
            FilterMode::Any => "or",
        }
    }
}

/// Field → condition filter specification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSpec(IndexMap<String, FilterCondition>);

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, condition: FilterCondition) -> Self {
        self.0.insert(field.into(), condition);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, condition: FilterCondition) {
        self.0.insert(field.into(), condition);
    }

    pub fn remove(&mut self, field: &str) -> Option<FilterCondition> {
        self.0.shift_remove(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&FilterCondition> {
        self.0.get(field)
    }

    /// Whether `record` passes; an empty specification passes everything
    pub fn matches(&self, record: &Record, mode: FilterMode) -> bool {
        if self.0.is_empty() {
            return true;
        }
        let mut results = self
            .0
            .iter()
            .map(|(field, condition)| condition.matches(record.get(field).unwrap_or(&FieldValue::Null)));
        match mode {
            FilterMode::All => results.all(|ok| ok),
            FilterMode::Any => results.any(|ok| ok),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}
