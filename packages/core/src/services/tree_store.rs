//! TreeStore - hierarchical store with lazy expansion
//!
//! A `TreeStore` is a [`Store`] whose records carry child lists, plus the
//! tree-only operations: path addressing, expansion, ancestor discovery.
//!
//! # Paths
//!
//! Every record is reachable by the sibling indices leading to it from the
//! roots, e.g. `[2, 0, 1]` is the third root's first child's second child.
//! Indices refer to the visible (sorted/filtered) order, and the first segment
//! is relative to the current page. A stale path resolves to `None`.
//!
//! # Expansion
//!
//! Children are either known (possibly empty) or unknown. Expanding a record
//! with unknown children asks the loader for them; with no child source the
//! record becomes a known-empty leaf. Attaching children emits a single
//! `UpdateChildren` for that record, never a whole-dataset `Update`.
//!
//! Expansions are serialized behind a gate and re-locate their record by hash
//! after the fetch, since paths may shift while it is in flight.

use crate::data::RowReader;
use crate::db::{
    ChildrenHook, LoadResponse, Loader, LocalLoader, RemoteLoader, StoreConfig, StoreEvent,
    Transport,
};
use crate::models::{FieldValue, Record, RecordHash};
use crate::services::store::{Store, StoreState};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockWriteGuard};

/// How deep `expand_all` descends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandDepth {
    /// Every branch, as deep as the data goes
    Unbounded,
    /// Roots are level 1
    Levels(usize),
}

impl From<bool> for ExpandDepth {
    /// `true` is unbounded, `false` expands only the roots
    fn from(all: bool) -> Self {
        if all {
            ExpandDepth::Unbounded
        } else {
            ExpandDepth::Levels(1)
        }
    }
}

impl From<usize> for ExpandDepth {
    fn from(levels: usize) -> Self {
        ExpandDepth::Levels(levels)
    }
}

impl ExpandDepth {
    fn allows(self, level: usize) -> bool {
        match self {
            ExpandDepth::Unbounded => true,
            ExpandDepth::Levels(max) => level <= max,
        }
    }
}

/// Expanded records of one applied load
#[derive(Debug, Default)]
struct Expansion {
    generation: u64,
    hashes: HashSet<RecordHash>,
}

/// Hierarchical store
#[derive(Clone)]
pub struct TreeStore {
    store: Store,
    expanded: Arc<RwLock<Expansion>>,
    expand_gate: Arc<Mutex<()>>,
}

impl TreeStore {
    pub fn new(config: StoreConfig, loader: Arc<dyn Loader>) -> Self {
        let reader = RowReader::new(config.field_set(), config.primary_keys.clone())
            .with_tree_fields(config.children_field.clone(), config.leaf_field.clone());
        Self {
            store: Store::with_reader(config, loader, reader),
            expanded: Arc::new(RwLock::new(Expansion::default())),
            expand_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Tree over nested rows supplied up front
    pub fn local(config: StoreConfig, rows: Vec<Value>) -> Self {
        Self::new(config, Arc::new(LocalLoader::new(rows)))
    }

    /// Local tree whose unknown children come from `hook`
    pub fn local_with_children(config: StoreConfig, rows: Vec<Value>, hook: ChildrenHook) -> Self {
        Self::new(
            config,
            Arc::new(LocalLoader::new(rows).with_children_hook(hook)),
        )
    }

    /// Tree fetched through `transport`, expanded through the expander URL
    pub fn remote(config: StoreConfig, transport: Arc<dyn Transport>) -> Self {
        let loader = Arc::new(RemoteLoader::new(transport, &config));
        Self::new(config, loader)
    }

    /// Remote tree whose children come from `hook` when no expander URL is set
    pub fn remote_with_children(
        config: StoreConfig,
        transport: Arc<dyn Transport>,
        hook: ChildrenHook,
    ) -> Self {
        let loader = Arc::new(RemoteLoader::new(transport, &config).with_children_hook(hook));
        Self::new(config, loader)
    }

    /// The underlying store: load lifecycle, sort/filter/page, commit, events
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn subscribe_to_events(&self) -> tokio::sync::broadcast::Receiver<StoreEvent> {
        self.store.subscribe_to_events()
    }

    pub async fn load(&self) -> LoadResponse {
        self.store.load().await
    }

    /// Reload; expansion state is forgotten once the new records are applied
    pub async fn reload(&self) -> LoadResponse {
        self.store.reload().await
    }

    pub async fn is_loaded(&self) -> bool {
        self.store.is_loaded().await
    }

    //
    // PATH ADDRESSING
    //

    /// Translate a page-relative path into a dataset path
    fn absolute(&self, state: &StoreState, path: &[usize]) -> Option<Vec<usize>> {
        let (first, rest) = path.split_first()?;
        let window = self.store.window(state);
        if *first >= window.len() {
            return None;
        }
        let mut absolute = Vec::with_capacity(path.len());
        absolute.push(window.start + first);
        absolute.extend_from_slice(rest);
        Some(absolute)
    }

    /// Inverse of `absolute`; `None` when the root is off the current page
    fn relative(&self, state: &StoreState, mut path: Vec<usize>) -> Option<Vec<usize>> {
        let window = self.store.window(state);
        let first = path.first_mut()?;
        if !window.contains(&*first) {
            return None;
        }
        *first -= window.start;
        Some(path)
    }

    pub async fn get_at(&self, path: &[usize]) -> Option<Record> {
        let state = self.store.read_state().await;
        let absolute = self.absolute(&state, path)?;
        state.dataset.get_at(&absolute).cloned()
    }

    pub async fn set_at(&self, path: &[usize], field: &str, value: FieldValue) -> Option<bool> {
        let mut state = self.store.write_state().await;
        let absolute = self.absolute(&state, path)?;
        self.store.set_value_at(&mut state, &absolute, field, value)
    }

    pub async fn set_value(&self, hash: &RecordHash, field: &str, value: FieldValue) -> Option<bool> {
        self.store.set_value(hash, field, value).await
    }

    /// Path of the record with `hash`, if it is on the current page
    pub async fn path_of(&self, hash: &RecordHash) -> Option<Vec<usize>> {
        let state = self.store.read_state().await;
        let path = state.dataset.locate(hash)?;
        self.relative(&state, path)
    }

    /// First visible record (pre-order) accepted by `predicate`, with its path
    pub async fn find_by(&self, predicate: impl Fn(&Record) -> bool) -> Option<(Vec<usize>, Record)> {
        let state = self.store.read_state().await;
        let window = self.store.window(&state);
        let (path, record) = state
            .dataset
            .flatten(|_| true)
            .into_iter()
            .find(|(path, record)| path.first().is_some_and(|i| window.contains(i)) && predicate(record))?;
        let record = record.clone();
        Some((self.relative(&state, path)?, record))
    }

    pub async fn find(&self, field: &str, value: &FieldValue) -> Option<Record> {
        self.find_by(|r| r.get(field).is_some_and(|v| v.loose_eq(value)))
            .await
            .map(|(_, record)| record)
    }

    pub async fn find_index(&self, field: &str, value: &FieldValue) -> Option<Vec<usize>> {
        self.find_by(|r| r.get(field).is_some_and(|v| v.loose_eq(value)))
            .await
            .map(|(path, _)| path)
    }

    pub async fn match_record(&self, record: &Record) -> Option<Record> {
        self.find_by(|r| r.is_equal(record)).await.map(|(_, r)| r)
    }

    pub async fn match_index(&self, record: &Record) -> Option<Vec<usize>> {
        self.find_by(|r| r.is_equal(record)).await.map(|(path, _)| path)
    }

    //
    // EXPANSION
    //

    /// Expansion state for the records currently applied
    ///
    /// Any load that replaces the dataset (however it was started) leaves the
    /// stored set behind a newer generation, and it is dropped here.
    async fn expansion(&self) -> RwLockWriteGuard<'_, Expansion> {
        let applied = self.store.read_state().await.applied_generation();
        let mut expansion = self.expanded.write().await;
        if expansion.generation != applied {
            expansion.generation = applied;
            expansion.hashes.clear();
        }
        expansion
    }

    pub async fn is_expanded(&self, hash: &RecordHash) -> bool {
        self.expansion().await.hashes.contains(hash)
    }

    /// Expand the record at `path`
    ///
    /// Returns the number of visible children after expansion, or `None` when
    /// the path is stale or the child fetch failed.
    pub async fn expand(&self, path: &[usize]) -> Option<usize> {
        let _gate = self.expand_gate.lock().await;
        let hash = {
            let state = self.store.read_state().await;
            let absolute = self.absolute(&state, path)?;
            state.dataset.get_at(&absolute)?.hash().clone()
        };
        self.expand_locked(&hash).await
    }

    /// Expand a record by identity rather than position
    pub async fn expand_record(&self, record: &Record) -> Option<usize> {
        let _gate = self.expand_gate.lock().await;
        self.expand_locked(record.hash()).await
    }

    async fn expand_locked(&self, hash: &RecordHash) -> Option<usize> {
        let (record, params) = {
            let state = self.store.read_state().await;
            let path = state.dataset.locate(hash)?;
            (state.dataset.get_at(&path)?.clone(), self.store.params_of(&state, false))
        };

        if let Some(children) = record.children() {
            self.expansion().await.hashes.insert(hash.clone());
            self.store
                .emit_event(StoreEvent::UpdateChildren { hash: hash.clone() });
            return Some(children.len());
        }

        let rows = match self.store.loader().load_children(&record, &params).await {
            Some(response) if response.success => response.records,
            Some(response) => {
                tracing::warn!(
                    "Expanding {} failed: {}",
                    hash,
                    response.message.as_deref().unwrap_or("no message")
                );
                return None;
            }
            None => Vec::new(),
        };
        let children = self.store.reader().read_all(&rows);
        tracing::debug!("Expanding {} with {} child row(s)", hash, children.len());

        let mut state = self.store.write_state().await;
        let Some(path) = state.dataset.locate(hash) else {
            tracing::debug!("Record {} vanished while expanding", hash);
            return None;
        };
        self.store.emit_event(StoreEvent::BeforeUpdate);
        state.dataset.set_children(&path, children)?;
        let count = state
            .dataset
            .get_at(&path)
            .and_then(Record::children)
            .map_or(0, |children| children.len());
        drop(state);

        self.expansion().await.hashes.insert(hash.clone());
        Some(count)
    }

    /// Collapse the record at `path`; its children stay loaded
    pub async fn collapse(&self, path: &[usize]) -> bool {
        let Some(record) = self.get_at(path).await else {
            return false;
        };
        let removed = self.expansion().await.hashes.remove(record.hash());
        if removed {
            self.store.emit_event(StoreEvent::UpdateChildren {
                hash: record.hash().clone(),
            });
        }
        removed
    }

    /// Expand every branch down to `depth`; returns how many records were expanded
    ///
    /// Traversal follows only children actually attached, and visits each hash
    /// once, so it ends on cyclic or inconsistent data.
    pub async fn expand_all(&self, depth: impl Into<ExpandDepth>) -> usize {
        let depth = depth.into();
        let mut queue: VecDeque<(RecordHash, usize)> = {
            let state = self.store.read_state().await;
            let window = self.store.window(&state);
            window
                .filter_map(|i| state.dataset.get(i))
                .map(|record| (record.hash().clone(), 1))
                .collect()
        };
        let mut visited = HashSet::new();
        let mut expanded = 0;

        while let Some((hash, level)) = queue.pop_front() {
            if !depth.allows(level) || !visited.insert(hash.clone()) {
                continue;
            }
            {
                let _gate = self.expand_gate.lock().await;
                if self.expand_locked(&hash).await.is_none() {
                    continue;
                }
            }
            expanded += 1;

            let state = self.store.read_state().await;
            let children = state
                .dataset
                .locate(&hash)
                .and_then(|path| state.dataset.get_at(&path))
                .and_then(Record::children);
            if let Some(children) = children {
                queue.extend(children.iter().map(|child| (child.hash().clone(), level + 1)));
            }
        }

        tracing::debug!("Expanded {} record(s)", expanded);
        expanded
    }

    //
    // ANCESTORS
    //

    fn local_parents(&self, state: &StoreState, child: &Record) -> Option<Vec<Record>> {
        let path = state
            .dataset
            .locate(child.hash())
            .or_else(|| state.dataset.find_path(|r| r.is_equal(child)))?;
        let parents = (1..path.len())
            .map(|depth| state.dataset.get_at(&path[..depth]).cloned())
            .collect::<Option<Vec<_>>>()?;
        Some(parents)
    }

    /// Ancestor chain of `child`, root first
    ///
    /// Resolved locally when possible. Otherwise, with a path finder
    /// configured, the remote ancestor chain is fetched, each ancestor found
    /// locally is expanded in order, and local resolution is retried once.
    pub async fn get_parents(&self, child: &Record) -> Option<Vec<Record>> {
        {
            let state = self.store.read_state().await;
            if let Some(parents) = self.local_parents(&state, child) {
                return Some(parents);
            }
        }

        let params = self.store.base_params().await;
        let response = self.store.loader().load_parents(child, &params).await?;
        if !response.success {
            tracing::warn!(
                "Ancestor lookup failed: {}",
                response.message.as_deref().unwrap_or("no message")
            );
            return None;
        }

        for row in &response.records {
            let Some(key) = row.as_object() else {
                continue;
            };
            let hash = {
                let state = self.store.read_state().await;
                state
                    .dataset
                    .find_path(|r| r.matches_key(key))
                    .and_then(|path| state.dataset.get_at(&path))
                    .map(|r| r.hash().clone())
            };
            if let Some(hash) = hash {
                let _gate = self.expand_gate.lock().await;
                self.expand_locked(&hash).await;
            }
        }

        let state = self.store.read_state().await;
        self.local_parents(&state, child)
    }

    //
    // VISIBLE ROWS
    //

    /// Page roots plus the children of expanded records, depth first
    pub async fn visible_rows(&self) -> Vec<(Vec<usize>, Record)> {
        let expanded = self.expansion().await.hashes.clone();
        let state = self.store.read_state().await;
        state
            .dataset
            .flatten(|record| expanded.contains(record.hash()))
            .into_iter()
            .filter_map(|(path, record)| {
                let relative = self.relative(&state, path)?;
                Some((relative, record.clone()))
            })
            .collect()
    }
}
