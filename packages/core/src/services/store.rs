//! Store - stateful owner of one Dataset
//!
//! A `Store` wraps a [`Dataset`] with loading, paging, sorting and filtering
//! policy. The loading strategy is injected as a [`Loader`]; the store never
//! branches on whether its rows arrive locally or remotely, only on the
//! `remote_*` flags.
//!
//! # State machine
//!
//! ```text
//! Unloaded ──load()──▶ Loading ──resolve──▶ Loaded
//!     ▲                                       │
//!     └──────────────── reload() ◀────────────┘
//! ```
//!
//! - A failed load still ends in `Loaded`, with the dataset unchanged; the
//!   failure is only visible in the returned [`LoadResponse`].
//! - `load()` while a load is in flight awaits that load instead of fetching
//!   again.
//! - `reload()` always starts a new generation; a superseded load's results
//!   are discarded when it resolves.
//!
//! # Concurrency
//!
//! `Store` is a cheap `Clone` handle. State lives behind a tokio `RwLock`
//! that is never held across a loader await. Commits are queued behind
//! their own gate.
//!
//! # Examples
//!
//! ```rust
//! use gridstore_core::db::StoreConfig;
//! use gridstore_core::models::{FilterCondition, FilterMode, FilterSpec};
//! use gridstore_core::services::Store;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = Store::local(
//!     StoreConfig::new().with_primary_keys(["id"]),
//!     vec![json!({"id": 1, "name": "ann"}), json!({"id": 2, "name": "bob"})],
//! );
//! let response = store.load().await;
//! assert!(response.success);
//!
//! store
//!     .set_filter(FilterSpec::new().with("name", FilterCondition::like("b")), FilterMode::All)
//!     .await;
//! assert_eq!(store.count().await, 1);
//! # }
//! ```

use crate::data::{DataChange, Dataset, RowReader};
use crate::db::{
    CommitResponse, LoadResponse, Loader, LocalLoader, RecordChange, RemoteLoader, StoreConfig,
    StoreEvent, Transport,
};
use crate::models::{
    FieldValue, FilterMode, FilterSpec, Record, RecordHash, Row, SortDirection, SortSpec,
};
use crate::services::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Broadcast capacity for store events
const STORE_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Load lifecycle of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Unloaded,
    Loading,
    Loaded,
}

pub(crate) struct StoreState {
    pub(crate) dataset: Dataset,
    phase: LoadPhase,
    generation: u64,
    /// Generation whose records are in the dataset
    applied: u64,
    page: usize,
    page_size: usize,
    /// Server-side row count (remote paging only)
    remote_total: usize,
    params: Map<String, Value>,
    sorters: SortSpec,
    filters: FilterSpec,
    filter_mode: FilterMode,
    /// Committed rows deleted since the last commit
    removed: Vec<Record>,
    updated_at: Option<DateTime<Utc>>,
    last_response: Option<LoadResponse>,
}

impl StoreState {
    pub(crate) fn applied_generation(&self) -> u64 {
        self.applied
    }
}

struct StoreInner {
    state: RwLock<StoreState>,
    loader: Arc<dyn Loader>,
    reader: RowReader,
    remote_sort: bool,
    remote_filter: bool,
    remote_page: bool,
    event_tx: broadcast::Sender<StoreEvent>,
    /// Generation of the last applied load
    completed: watch::Sender<u64>,
    commit_gate: Mutex<()>,
}

/// Flat store over one dataset
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Create a store with an explicit loading strategy
    pub fn new(config: StoreConfig, loader: Arc<dyn Loader>) -> Self {
        let reader = RowReader::new(config.field_set(), config.primary_keys.clone());
        Self::with_reader(config, loader, reader)
    }

    /// Store over rows supplied up front
    pub fn local(config: StoreConfig, rows: Vec<Value>) -> Self {
        Self::new(config, Arc::new(LocalLoader::new(rows)))
    }

    /// Store fetching through `transport`
    pub fn remote(config: StoreConfig, transport: Arc<dyn Transport>) -> Self {
        let loader = Arc::new(RemoteLoader::new(transport, &config));
        Self::new(config, loader)
    }

    pub(crate) fn with_reader(
        config: StoreConfig,
        loader: Arc<dyn Loader>,
        reader: RowReader,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(STORE_EVENT_CHANNEL_CAPACITY);
        let (completed, _) = watch::channel(0);

        let mut dataset = Dataset::default();
        let observer_tx = event_tx.clone();
        dataset.set_observer(Arc::new(move |change: &DataChange| {
            let _ = observer_tx.send(StoreEvent::from_change(change));
        }));

        let remote = loader.is_remote();
        let state = StoreState {
            dataset,
            phase: LoadPhase::Unloaded,
            generation: 0,
            applied: 0,
            page: 1,
            page_size: config.page_size,
            remote_total: 0,
            params: config.params.clone(),
            sorters: SortSpec::new(),
            filters: FilterSpec::new(),
            filter_mode: FilterMode::All,
            removed: Vec::new(),
            updated_at: None,
            last_response: None,
        };

        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(state),
                loader,
                reader,
                remote_sort: remote && config.remote_sort,
                remote_filter: remote && config.remote_filter,
                remote_page: remote && config.remote_page,
                event_tx,
                completed,
                commit_gate: Mutex::new(()),
            }),
        }
    }

    /// Subscribe to store events
    ///
    /// Returns a broadcast receiver that sees every event emitted after the
    /// call.
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Ignores errors if no subscribers
    pub(crate) fn emit_event(&self, event: StoreEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    pub(crate) async fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.inner.state.read().await
    }

    pub(crate) async fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.inner.state.write().await
    }

    pub(crate) fn loader(&self) -> &Arc<dyn Loader> {
        &self.inner.loader
    }

    pub(crate) fn reader(&self) -> &RowReader {
        &self.inner.reader
    }

    pub fn is_remote(&self) -> bool {
        self.inner.loader.is_remote()
    }

    //
    // LOAD LIFECYCLE
    //

    pub async fn phase(&self) -> LoadPhase {
        self.inner.state.read().await.phase
    }

    pub async fn is_loaded(&self) -> bool {
        self.phase().await == LoadPhase::Loaded
    }

    /// Time of the last successful load
    pub async fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.inner.state.read().await.updated_at
    }

    /// Load unless already loaded; joins an in-flight load instead of fetching twice
    ///
    /// Once loaded this returns the last response without fetching, even when
    /// that load failed. Use [`reload`](Self::reload) to retry.
    pub async fn load(&self) -> LoadResponse {
        let (ticket, params) = {
            let mut state = self.inner.state.write().await;
            match state.phase {
                LoadPhase::Loaded => {
                    return state
                        .last_response
                        .clone()
                        .unwrap_or_else(|| LoadResponse::ok(Vec::new()));
                }
                LoadPhase::Loading => {
                    let pending = state.generation;
                    drop(state);
                    return self.wait_for(pending).await;
                }
                LoadPhase::Unloaded => self.begin_load(&mut state),
            }
        };
        self.fetch(ticket, params).await
    }

    /// Force a fresh load, superseding any load in flight
    pub async fn reload(&self) -> LoadResponse {
        let (ticket, params) = {
            let mut state = self.inner.state.write().await;
            state.phase = LoadPhase::Unloaded;
            self.begin_load(&mut state)
        };
        self.fetch(ticket, params).await
    }

    fn begin_load(&self, state: &mut StoreState) -> (u64, Map<String, Value>) {
        state.generation += 1;
        state.phase = LoadPhase::Loading;
        let params = self.params_of(state, true);
        tracing::debug!("Store load {} starting", state.generation);
        self.emit_event(StoreEvent::BeforeLoad {
            generation: state.generation,
        });
        (state.generation, params)
    }

    async fn fetch(&self, ticket: u64, params: Map<String, Value>) -> LoadResponse {
        let response = self.inner.loader.load(&params).await;
        self.finish(ticket, response).await
    }

    async fn finish(&self, ticket: u64, response: LoadResponse) -> LoadResponse {
        let mut state = self.inner.state.write().await;

        if state.generation != ticket {
            tracing::debug!(
                "Discarding superseded load {} (current generation {})",
                ticket,
                state.generation
            );
            self.emit_event(StoreEvent::Load {
                generation: ticket,
                success: response.success,
                superseded: true,
            });
            return response;
        }

        if response.success {
            let records = self.inner.reader.read_all(&response.records);
            tracing::info!(
                "Store load {} applied {} row(s), total {}",
                ticket,
                records.len(),
                response.total
            );
            self.emit_event(StoreEvent::BeforeUpdate);
            state.dataset.replace(records);
            state.remote_total = response.total;
            state.removed.clear();
            state.applied = ticket;
            state.updated_at = Some(Utc::now());
        } else {
            tracing::warn!(
                "Store load {} failed: {}",
                ticket,
                response.message.as_deref().unwrap_or("no message")
            );
        }

        state.phase = LoadPhase::Loaded;
        state.last_response = Some(response.clone());
        self.emit_event(StoreEvent::Load {
            generation: ticket,
            success: response.success,
            superseded: false,
        });
        self.inner.completed.send_replace(ticket);
        response
    }

    async fn wait_for(&self, pending: u64) -> LoadResponse {
        let mut rx = self.inner.completed.subscribe();
        let resolved = rx.wait_for(|done| *done >= pending).await.is_ok();
        if !resolved {
            return LoadResponse::failure("store dropped while loading");
        }
        self.inner
            .state
            .read()
            .await
            .last_response
            .clone()
            .unwrap_or_else(|| LoadResponse::ok(Vec::new()))
    }

    //
    // PARAMETERS
    //

    pub(crate) fn params_of(&self, state: &StoreState, include_loader_params: bool) -> Map<String, Value> {
        let mut params = state.params.clone();
        if !include_loader_params {
            return params;
        }

        let fields = self.inner.reader.fields();
        if self.inner.loader.is_remote() && !fields.is_empty() {
            params.insert("fields".to_string(), Value::from(fields.joined_names()));
        }
        if self.inner.remote_page && state.page_size > 0 {
            let start = (state.page - 1) * state.page_size;
            params.insert("start".to_string(), Value::from(start));
            params.insert("limit".to_string(), Value::from(state.page_size));
        }
        if self.inner.remote_sort && !state.sorters.is_empty() {
            params.insert(
                "sorters".to_string(),
                Value::from(state.sorters.to_json_string()),
            );
        }
        if self.inner.remote_filter && !state.filters.is_empty() {
            params.insert(
                "filters".to_string(),
                Value::from(state.filters.to_json_string()),
            );
            params.insert(
                "filterMode".to_string(),
                Value::from(state.filter_mode.as_str()),
            );
        }
        params
    }

    /// Request parameters; loader params are added only for enabled remote flags
    pub async fn get_params(&self, include_loader_params: bool) -> Map<String, Value> {
        let state = self.inner.state.read().await;
        self.params_of(&state, include_loader_params)
    }

    pub(crate) async fn base_params(&self) -> Map<String, Value> {
        self.get_params(false).await
    }

    /// Replace the caller parameters (takes effect on the next load)
    pub async fn set_params(&self, params: Map<String, Value>) {
        self.inner.state.write().await.params = params;
    }

    pub async fn set_param(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner
            .state
            .write()
            .await
            .params
            .insert(key.into(), value.into());
    }

    //
    // SORT / FILTER / PAGE
    //

    /// Apply a filter; resets to page 1
    ///
    /// Returns the reload response when filtering is remote, `None` when it
    /// was applied locally or nothing changed.
    pub async fn set_filter(&self, filters: FilterSpec, mode: FilterMode) -> Option<LoadResponse> {
        {
            let mut state = self.inner.state.write().await;
            if state.filters == filters && state.filter_mode == mode {
                return None;
            }
            state.filters = filters.clone();
            state.filter_mode = mode;
            state.page = 1;
            if !self.inner.remote_filter {
                self.emit_event(StoreEvent::BeforeUpdate);
                state.dataset.filter(filters, mode);
                return None;
            }
        }
        Some(self.reload().await)
    }

    /// `set_filter` from a JSON `field -> {value, operator}` map
    pub async fn set_filter_json(&self, json: &str, mode: FilterMode) -> Result<Option<LoadResponse>> {
        let filters = FilterSpec::from_json(json).map_err(StoreError::malformed_filters)?;
        Ok(self.set_filter(filters, mode).await)
    }

    pub async fn clear_filter(&self) -> Option<LoadResponse> {
        let mode = self.inner.state.read().await.filter_mode;
        self.set_filter(FilterSpec::new(), mode).await
    }

    pub async fn filters(&self) -> (FilterSpec, FilterMode) {
        let state = self.inner.state.read().await;
        (state.filters.clone(), state.filter_mode)
    }

    /// Apply a multi-field sort; the page is kept
    pub async fn multi_sort(&self, sorters: SortSpec) -> Option<LoadResponse> {
        {
            let mut state = self.inner.state.write().await;
            if state.sorters == sorters {
                return None;
            }
            state.sorters = sorters.clone();
            if !self.inner.remote_sort {
                self.emit_event(StoreEvent::BeforeUpdate);
                state.dataset.sort(sorters);
                return None;
            }
        }
        Some(self.reload().await)
    }

    /// `multi_sort` from a JSON `field -> direction` map
    pub async fn multi_sort_json(&self, json: &str) -> Result<Option<LoadResponse>> {
        let sorters = SortSpec::from_json(json).map_err(StoreError::malformed_sorters)?;
        Ok(self.multi_sort(sorters).await)
    }

    pub async fn sort(&self, field: impl Into<String>, direction: SortDirection) -> Option<LoadResponse> {
        self.multi_sort(SortSpec::by(field, direction)).await
    }

    pub async fn sorters(&self) -> SortSpec {
        self.inner.state.read().await.sorters.clone()
    }

    /// Move to a 1-based page; values below 1 are clamped
    pub async fn set_page(&self, page: usize) -> Option<LoadResponse> {
        {
            let mut state = self.inner.state.write().await;
            let page = page.max(1);
            if state.page == page {
                return None;
            }
            state.page = page;
            if !self.inner.remote_page {
                self.emit_event(StoreEvent::BeforeUpdate);
                self.emit_event(StoreEvent::Update(DataChange::Refreshed));
                return None;
            }
        }
        Some(self.reload().await)
    }

    pub async fn next_page(&self) -> Option<LoadResponse> {
        let (page, pages) = {
            let state = self.inner.state.read().await;
            (state.page, self.total_pages_of(&state))
        };
        if page >= pages {
            return None;
        }
        self.set_page(page + 1).await
    }

    pub async fn previous_page(&self) -> Option<LoadResponse> {
        let page = self.inner.state.read().await.page;
        if page <= 1 {
            return None;
        }
        self.set_page(page - 1).await
    }

    pub async fn page(&self) -> usize {
        self.inner.state.read().await.page
    }

    pub async fn page_size(&self) -> usize {
        self.inner.state.read().await.page_size
    }

    fn total_of(&self, state: &StoreState) -> usize {
        if self.inner.remote_page {
            state.remote_total
        } else {
            state.dataset.len()
        }
    }

    fn total_pages_of(&self, state: &StoreState) -> usize {
        total_pages(self.total_of(state), state.page_size)
    }

    /// Rows across all pages (visible rows after filtering for local stores)
    pub async fn total(&self) -> usize {
        let state = self.inner.state.read().await;
        self.total_of(&state)
    }

    pub async fn get_total_page(&self) -> usize {
        let state = self.inner.state.read().await;
        self.total_pages_of(&state)
    }

    /// Visible root range of the current page
    pub(crate) fn window(&self, state: &StoreState) -> Range<usize> {
        let len = state.dataset.len();
        if self.inner.remote_page || state.page_size == 0 {
            return 0..len;
        }
        let start = ((state.page - 1) * state.page_size).min(len);
        let end = (start + state.page_size).min(len);
        start..end
    }

    //
    // READ ACCESS (current page, visible order)
    //

    /// Visible records of the current page
    pub async fn records(&self) -> Vec<Record> {
        let state = self.inner.state.read().await;
        let window = self.window(&state);
        window
            .filter_map(|i| state.dataset.get(i).cloned())
            .collect()
    }

    /// Number of visible records on the current page
    pub async fn count(&self) -> usize {
        let state = self.inner.state.read().await;
        self.window(&state).len()
    }

    pub async fn get_at(&self, index: usize) -> Option<Record> {
        let state = self.inner.state.read().await;
        let window = self.window(&state);
        if index >= window.len() {
            return None;
        }
        state.dataset.get(window.start + index).cloned()
    }

    /// Position and record of the first visible row accepted by `predicate`
    pub async fn find_by(&self, predicate: impl Fn(&Record) -> bool) -> Option<(usize, Record)> {
        let state = self.inner.state.read().await;
        let window = self.window(&state);
        window
            .filter_map(|i| state.dataset.get(i))
            .enumerate()
            .find(|(_, record)| predicate(record))
            .map(|(i, record)| (i, record.clone()))
    }

    /// First visible record whose `field` equals `value`
    pub async fn find(&self, field: &str, value: &FieldValue) -> Option<Record> {
        self.find_by(|r| r.get(field).is_some_and(|v| v.loose_eq(value)))
            .await
            .map(|(_, record)| record)
    }

    pub async fn find_index(&self, field: &str, value: &FieldValue) -> Option<usize> {
        self.find_by(|r| r.get(field).is_some_and(|v| v.loose_eq(value)))
            .await
            .map(|(index, _)| index)
    }

    /// Visible record with the same primary key as `record`
    pub async fn match_record(&self, record: &Record) -> Option<Record> {
        self.find_by(|r| r.is_equal(record)).await.map(|(_, r)| r)
    }

    pub async fn match_index(&self, record: &Record) -> Option<usize> {
        self.find_by(|r| r.is_equal(record)).await.map(|(i, _)| i)
    }

    /// Visible record carrying the given primary-key values
    pub async fn match_key(&self, key: &Map<String, Value>) -> Option<Record> {
        self.find_by(|r| r.matches_key(key)).await.map(|(_, r)| r)
    }

    pub async fn get_by_hash(&self, hash: &RecordHash) -> Option<Record> {
        let state = self.inner.state.read().await;
        let path = state.dataset.locate(hash)?;
        state.dataset.get_at(&path).cloned()
    }

    /// Records with uncommitted changes (new rows included)
    pub async fn get_updated_records(&self) -> Vec<Record> {
        self.inner.state.read().await.dataset.updated_records()
    }

    //
    // MUTATION
    //

    /// Set one field of the record with `hash`
    pub async fn set_value(&self, hash: &RecordHash, field: &str, value: FieldValue) -> Option<bool> {
        let mut state = self.inner.state.write().await;
        let path = state.dataset.locate(hash)?;
        self.set_value_at(&mut state, &path, field, value)
    }

    /// Set one field of the visible record at `index` on the current page
    pub async fn set_at(&self, index: usize, field: &str, value: FieldValue) -> Option<bool> {
        let mut state = self.inner.state.write().await;
        let window = self.window(&state);
        if index >= window.len() {
            return None;
        }
        self.set_value_at(&mut state, &[window.start + index], field, value)
    }

    /// Announce and apply a field write; unchanged values emit nothing
    pub(crate) fn set_value_at(
        &self,
        state: &mut StoreState,
        path: &[usize],
        field: &str,
        value: FieldValue,
    ) -> Option<bool> {
        let record = state.dataset.get_at(path)?;
        if record.get(field) == Some(&value) {
            return Some(false);
        }
        self.emit_event(StoreEvent::BeforeUpdate);
        state.dataset.set_value(path, field, value)
    }

    /// Append new rows; they stay dirty until committed
    ///
    /// Rows are validated before anything is added, so a malformed row adds
    /// nothing.
    pub async fn add(&self, rows: &[Value]) -> Result<Vec<RecordHash>> {
        let records = rows
            .iter()
            .map(|row| self.inner.reader.read_phantom(row))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let hashes = records.iter().map(|r| r.hash().clone()).collect();

        let mut state = self.inner.state.write().await;
        self.emit_event(StoreEvent::BeforeUpdate);
        state.remote_total += records.len();
        state.dataset.add(records);
        Ok(hashes)
    }

    /// Remove rows by hash; committed ones are sent as removals on the next commit
    pub async fn delete(&self, hashes: &[RecordHash]) -> usize {
        let mut state = self.inner.state.write().await;
        self.emit_event(StoreEvent::BeforeUpdate);
        let removed = state.dataset.delete(hashes);
        let count = removed.len();
        state.remote_total = state.remote_total.saturating_sub(count);
        state
            .removed
            .extend(removed.into_iter().filter(|r| !r.is_phantom()));
        count
    }

    /// Drop every row locally
    pub async fn empty(&self) {
        let mut state = self.inner.state.write().await;
        self.emit_event(StoreEvent::BeforeUpdate);
        state.dataset.empty();
        state.remote_total = 0;
        state.page = 1;
    }

    /// Send changed rows to the loader and commit them locally on success
    ///
    /// With `is_all` every row is sent, otherwise only dirty and removed rows.
    /// Only records whose values still equal what was sent are committed, and
    /// only the removals that were sent are forgotten.
    pub async fn commit(&self, is_all: bool) -> CommitResponse {
        let _gate = self.inner.commit_gate.lock().await;

        let (changes, sent, removed_sent, params) = {
            let state = self.inner.state.read().await;
            let records: Vec<Record> = if is_all {
                state.dataset.records().into_iter().cloned().collect()
            } else {
                state.dataset.updated_records()
            };
            let sent: HashMap<RecordHash, Row> = records
                .iter()
                .map(|r| (r.hash().clone(), r.values().clone()))
                .collect();
            let mut changes: Vec<RecordChange> = records.iter().map(RecordChange::updated).collect();
            changes.extend(state.removed.iter().map(RecordChange::removed));
            let removed_sent: HashSet<RecordHash> =
                state.removed.iter().map(|r| r.hash().clone()).collect();
            (changes, sent, removed_sent, self.params_of(&state, false))
        };

        if changes.is_empty() {
            return CommitResponse::ok();
        }

        tracing::debug!("Committing {} row(s)", changes.len());
        let response = self.inner.loader.commit(changes, &params).await;
        if !response.success {
            tracing::warn!(
                "Commit failed: {}",
                response.message.as_deref().unwrap_or("no message")
            );
            return response;
        }

        let mut state = self.inner.state.write().await;
        self.emit_event(StoreEvent::BeforeUpdate);
        state
            .dataset
            .commit_where(|r| sent.get(r.hash()).is_some_and(|values| values == r.values()));
        state.removed.retain(|r| !removed_sent.contains(r.hash()));
        response
    }

    /// Discard every uncommitted change: values restored, new rows dropped,
    /// removed rows re-added
    pub async fn rollback(&self) -> usize {
        let mut state = self.inner.state.write().await;
        self.emit_event(StoreEvent::BeforeUpdate);
        let mut count = state.dataset.rollback();
        if !state.removed.is_empty() {
            let removed = std::mem::take(&mut state.removed);
            count += removed.len();
            self.emit_event(StoreEvent::BeforeUpdate);
            state.remote_total += removed.len();
            state.dataset.add(removed);
        }
        count
    }
}

/// `ceil(total / limit)` when paging, never below 1
pub fn total_pages(total: usize, limit: usize) -> usize {
    if limit == 0 {
        return 1;
    }
    total.div_ceil(limit).max(1)
}
