//! Dataset - In-memory ordered collection of Records
//!
//! The dataset owns its records exclusively. Callers read through shared
//! references or clones; every mutation goes through a dataset method so the
//! observer hears about it and dirty tracking cannot be bypassed.
//!
//! # Sorting and filtering
//!
//! Sort and filter only rewrite the visible view of each sibling list (see
//! [`RecordList`]). Sorting is stable with ties broken by insertion order.
//! Tree datasets apply both per sibling list; a branch stays visible when any
//! of its descendants matches the filter.
//!
//! Tree traversal uses explicit path stacks bounded by materialized children,
//! so arbitrarily deep trees never recurse on the call stack.
//!
//! # Notifications
//!
//! Each structural call (`add`, `delete`, `empty`, `replace`) fires the
//! observer exactly once, regardless of how many rows it touched.

use crate::models::{FieldValue, FilterMode, FilterSpec, Record, RecordHash, RecordList, SortSpec};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// What changed in a dataset
#[derive(Debug, Clone, PartialEq)]
pub enum DataChange {
    /// Rows appended
    Added { count: usize },
    /// Rows removed
    Removed { count: usize },
    /// Every row removed
    Emptied,
    /// Every row replaced by a load
    Replaced { count: usize },
    /// Sort or filter re-applied
    Refreshed,
    /// One field of one record changed
    Field { hash: RecordHash, field: String },
    /// Dirty records committed
    Committed { count: usize },
    /// Dirty records rolled back
    RolledBack { count: usize },
    /// Child list of one record attached or replaced
    Children { hash: RecordHash },
}

/// Change callback installed by the owning store
pub type Observer = Arc<dyn Fn(&DataChange) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Dataset {
    roots: RecordList,
    sorters: SortSpec,
    filters: FilterSpec,
    filter_mode: FilterMode,
    observer: Option<Observer>,
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("roots", &self.roots)
            .field("sorters", &self.sorters)
            .field("filters", &self.filters)
            .field("filter_mode", &self.filter_mode)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl Dataset {
    pub fn new(records: Vec<Record>) -> Self {
        let mut dataset = Self {
            roots: RecordList::new(records),
            ..Default::default()
        };
        dataset.apply();
        dataset
    }

    pub fn set_observer(&mut self, observer: Observer) {
        self.observer = Some(observer);
    }

    fn notify(&self, change: DataChange) {
        if let Some(observer) = &self.observer {
            observer(&change);
        }
    }

    //
    // SORT / FILTER
    //

    pub fn sorters(&self) -> &SortSpec {
        &self.sorters
    }

    pub fn filters(&self) -> &FilterSpec {
        &self.filters
    }

    pub fn filter_mode(&self) -> FilterMode {
        self.filter_mode
    }

    /// Apply a sort specification; no-op when already applied
    pub fn sort(&mut self, sorters: SortSpec) -> bool {
        if self.sorters == sorters {
            return false;
        }
        self.sorters = sorters;
        self.apply();
        self.notify(DataChange::Refreshed);
        true
    }

    /// Apply a filter specification; no-op when already applied
    pub fn filter(&mut self, filters: FilterSpec, mode: FilterMode) -> bool {
        if self.filters == filters && self.filter_mode == mode {
            return false;
        }
        self.filters = filters;
        self.filter_mode = mode;
        self.apply();
        self.notify(DataChange::Refreshed);
        true
    }

    /// Recompute every visible view from the current specifications
    fn apply(&mut self) {
        refresh_views(&mut self.roots, &self.sorters, &self.filters, self.filter_mode);
    }

    //
    // READ ACCESS (visible order)
    //

    pub fn roots(&self) -> &RecordList {
        &self.roots
    }

    /// Number of visible root records
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.roots.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> + '_ {
        self.roots.iter()
    }

    /// Walk a path of visible sibling indices; `None` as soon as a segment misses
    pub fn get_at(&self, path: &[usize]) -> Option<&Record> {
        let (&last, parents) = path.split_last()?;
        let mut list = &self.roots;
        for &index in parents {
            list = list.get(index)?.children()?;
        }
        list.get(last)
    }

    fn get_at_mut(&mut self, path: &[usize]) -> Option<&mut Record> {
        let (&last, parents) = path.split_last()?;
        let mut list = &mut self.roots;
        for &index in parents {
            list = list.get_mut(index)?.children_mut()?;
        }
        list.get_mut(last)
    }

    /// Pre-order search of the visible tree
    pub fn find_path(&self, mut predicate: impl FnMut(&Record) -> bool) -> Option<Vec<usize>> {
        let mut stack: Vec<Vec<usize>> = (0..self.roots.len()).rev().map(|i| vec![i]).collect();
        while let Some(path) = stack.pop() {
            let Some(record) = self.get_at(&path) else {
                continue;
            };
            if predicate(record) {
                return Some(path);
            }
            if let Some(children) = record.children() {
                for i in (0..children.len()).rev() {
                    let mut child = path.clone();
                    child.push(i);
                    stack.push(child);
                }
            }
        }
        None
    }

    /// Visible path of the record with `hash`
    pub fn locate(&self, hash: &RecordHash) -> Option<Vec<usize>> {
        self.find_path(|record| record.hash() == hash)
    }

    /// Visible records in pre-order, descending only into branches accepted by `expanded`
    pub fn flatten(&self, mut expanded: impl FnMut(&Record) -> bool) -> Vec<(Vec<usize>, &Record)> {
        let mut rows = Vec::new();
        let mut stack: Vec<Vec<usize>> = (0..self.roots.len()).rev().map(|i| vec![i]).collect();
        while let Some(path) = stack.pop() {
            let Some(record) = self.get_at(&path) else {
                continue;
            };
            if let Some(children) = record.children().filter(|_| expanded(record)) {
                for i in (0..children.len()).rev() {
                    let mut child = path.clone();
                    child.push(i);
                    stack.push(child);
                }
            }
            rows.push((path, record));
        }
        rows
    }

    /// Every materialized record, hidden ones included
    pub fn records(&self) -> Vec<&Record> {
        let mut out = Vec::new();
        let mut stack: Vec<&RecordList> = vec![&self.roots];
        while let Some(list) = stack.pop() {
            for record in list.all() {
                out.push(record);
                if let Some(children) = record.children() {
                    stack.push(children);
                }
            }
        }
        out
    }

    /// Records whose current values differ from their original snapshot
    pub fn updated_records(&self) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|r| r.is_dirty())
            .cloned()
            .collect()
    }

    /// Total number of materialized records, hidden and nested ones included
    pub fn total_count(&self) -> usize {
        self.records().len()
    }

    //
    // MUTATION
    //

    /// Set one field of the record at a visible path
    ///
    /// Returns `None` for a stale path, `Some(changed)` otherwise. The visible
    /// order is not recomputed, so rows do not jump while being edited.
    pub fn set_value(&mut self, path: &[usize], field: &str, value: FieldValue) -> Option<bool> {
        let record = self.get_at_mut(path)?;
        let changed = record.set(field, value);
        if changed {
            let hash = record.hash().clone();
            self.notify(DataChange::Field {
                hash,
                field: field.to_string(),
            });
        }
        Some(changed)
    }

    pub fn set_value_by_hash(&mut self, hash: &RecordHash, field: &str, value: FieldValue) -> Option<bool> {
        let path = self.locate(hash)?;
        self.set_value(&path, field, value)
    }

    /// Append root records
    pub fn add(&mut self, records: Vec<Record>) {
        let count = records.len();
        for record in records {
            self.roots.push(record);
        }
        self.apply();
        self.notify(DataChange::Added { count });
    }

    /// Remove records (at any depth) by hash; returns the removed records
    pub fn delete(&mut self, hashes: &[RecordHash]) -> Vec<Record> {
        let targets: HashSet<&RecordHash> = hashes.iter().collect();
        let mut removed = Vec::new();
        for path in list_paths(&self.roots) {
            if let Some(list) = list_by_raw_mut(&mut self.roots, &path) {
                removed.extend(list.retain(|r| !targets.contains(r.hash())));
            }
        }
        self.apply();
        self.notify(DataChange::Removed {
            count: removed.len(),
        });
        removed
    }

    pub fn empty(&mut self) {
        self.roots.clear();
        self.notify(DataChange::Emptied);
    }

    /// Replace every record, keeping the applied sort and filter
    pub fn replace(&mut self, records: Vec<Record>) {
        let count = records.len();
        self.roots = RecordList::new(records);
        self.apply();
        self.notify(DataChange::Replaced { count });
    }

    /// Attach children to the record at a visible path
    ///
    /// Only the new child list gets a view. Siblings and ancestors are not
    /// re-sorted, so rows edited since the last sort keep their position.
    /// The record was reached through visible indices, so its ancestors stay
    /// visible under any filter.
    pub fn set_children(&mut self, path: &[usize], children: Vec<Record>) -> Option<RecordHash> {
        let mut list = RecordList::new(children);
        refresh_views(&mut list, &self.sorters, &self.filters, self.filter_mode);
        let record = self.get_at_mut(path)?;
        record.set_children(Some(list));
        let hash = record.hash().clone();
        self.notify(DataChange::Children { hash: hash.clone() });
        Some(hash)
    }

    /// Commit the records accepted by `predicate`; returns how many were dirty
    pub fn commit_where(&mut self, mut predicate: impl FnMut(&Record) -> bool) -> usize {
        let mut count = 0;
        let mut stack: Vec<&mut RecordList> = vec![&mut self.roots];
        while let Some(list) = stack.pop() {
            for record in list.all_mut() {
                if record.is_dirty() && predicate(&*record) {
                    record.commit();
                    count += 1;
                }
                if let Some(children) = record.children_mut() {
                    stack.push(children);
                }
            }
        }
        self.notify(DataChange::Committed { count });
        count
    }

    pub fn commit(&mut self) -> usize {
        self.commit_where(|_| true)
    }

    /// Roll every record back; phantom records are dropped
    pub fn rollback(&mut self) -> usize {
        let mut count = 0;
        for path in list_paths(&self.roots) {
            if let Some(list) = list_by_raw_mut(&mut self.roots, &path) {
                count += list.retain(|r| !r.is_phantom()).len();
                for record in list.all_mut() {
                    if record.is_dirty() {
                        record.rollback();
                        count += 1;
                    }
                }
            }
        }
        self.apply();
        self.notify(DataChange::RolledBack { count });
        count
    }
}

/// Raw paths of every materialized sibling list under `root`, deepest first
fn list_paths(root: &RecordList) -> Vec<Vec<usize>> {
    let mut paths = Vec::new();
    let mut stack = vec![Vec::new()];
    while let Some(path) = stack.pop() {
        if let Some(list) = list_by_raw(root, &path) {
            for (raw, record) in list.all().iter().enumerate() {
                if record.children().is_some() {
                    let mut child = path.clone();
                    child.push(raw);
                    stack.push(child);
                }
            }
        }
        paths.push(path);
    }
    paths.sort_by_key(|p| std::cmp::Reverse(p.len()));
    paths
}

fn list_by_raw<'a>(root: &'a RecordList, path: &[usize]) -> Option<&'a RecordList> {
    let mut list = root;
    for &raw in path {
        list = list.all().get(raw)?.children()?;
    }
    Some(list)
}

fn list_by_raw_mut<'a>(root: &'a mut RecordList, path: &[usize]) -> Option<&'a mut RecordList> {
    let mut list = root;
    for &raw in path {
        list = list.raw_mut(raw)?.children_mut()?;
    }
    Some(list)
}

/// Recompute the views of `root` and every list below it
///
/// Deepest lists go first so a branch sees its children's filtered views.
fn refresh_views(root: &mut RecordList, sorters: &SortSpec, filters: &FilterSpec, mode: FilterMode) {
    for path in list_paths(root) {
        let Some(list) = list_by_raw_mut(root, &path) else {
            continue;
        };
        let records = list.all();
        let mut view: Vec<usize> = (0..records.len())
            .filter(|&raw| {
                let record = &records[raw];
                filters.matches(record, mode)
                    || (!filters.is_empty() && record.children().is_some_and(|c| !c.is_empty()))
            })
            .collect();
        if !sorters.is_empty() {
            view.sort_by(|&a, &b| sorters.compare(&records[a], &records[b]));
        }
        list.set_view(view);
    }
}
