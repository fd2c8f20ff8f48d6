//! Ordered sibling list with a visible view
//!
//! The raw `records` keep insertion order forever; `view` holds raw indices in
//! the current sorted/filtered order. Sorting and filtering only rewrite the
//! view, never the records.

use super::record::{Record, RecordHash};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordList {
    records: Vec<Record>,
    view: Vec<usize>,
}

impl RecordList {
    /// New list with every record visible in insertion order
    pub fn new(records: Vec<Record>) -> Self {
        let view = (0..records.len()).collect();
        Self { records, view }
    }

    /// Number of visible records
    pub fn len(&self) -> usize {
        self.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// Visible record at `index`
    pub fn get(&self, index: usize) -> Option<&Record> {
        self.view.get(index).and_then(|&raw| self.records.get(raw))
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Record> {
        let raw = *self.view.get(index)?;
        self.records.get_mut(raw)
    }

    /// Visible records in view order
    pub fn iter(&self) -> impl Iterator<Item = &Record> + '_ {
        self.view.iter().filter_map(|&raw| self.records.get(raw))
    }

    /// Every record, hidden ones included, in insertion order
    pub fn all(&self) -> &[Record] {
        &self.records
    }

    pub(crate) fn all_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    pub(crate) fn raw_mut(&mut self, raw: usize) -> Option<&mut Record> {
        self.records.get_mut(raw)
    }

    pub(crate) fn set_view(&mut self, view: Vec<usize>) {
        self.view = view;
    }

    /// Visible position of the record with `hash`
    pub fn position(&self, hash: &RecordHash) -> Option<usize> {
        self.view
            .iter()
            .position(|&raw| self.records.get(raw).is_some_and(|r| r.hash() == hash))
    }

    pub(crate) fn push(&mut self, record: Record) {
        self.view.push(self.records.len());
        self.records.push(record);
    }

    /// Drop records rejected by `keep`; returns the removed ones
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&Record) -> bool) -> Vec<Record> {
        let (kept, removed): (Vec<Record>, Vec<Record>) =
            std::mem::take(&mut self.records).into_iter().partition(|r| keep(r));
        self.records = kept;
        self.view = (0..self.records.len()).collect();
        removed
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.view.clear();
    }
}
