//! Data Layer
//!
//! - [`Dataset`] - ordered, observable record collection with local sort/filter
//! - [`RowReader`] - JSON rows → typed [`Record`](crate::models::Record)s

mod dataset;
mod reader;

pub use dataset::{DataChange, Dataset, Observer};
pub use reader::RowReader;
