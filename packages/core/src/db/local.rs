//! LocalLoader - rows supplied up front
//!
//! Loading hands back the whole array; sorting, filtering and paging are
//! then done by the store on its dataset. Commits succeed immediately since
//! there is nowhere to send them.

use super::loader::{CommitResponse, LoadResponse, Loader, RecordChange};
use crate::models::Record;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Hook producing the child rows of one tree record
pub type ChildrenHook = Arc<dyn Fn(&Record) -> Vec<Value> + Send + Sync>;

#[derive(Clone, Default)]
pub struct LocalLoader {
    rows: Vec<Value>,
    children: Option<ChildrenHook>,
}

impl std::fmt::Debug for LocalLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalLoader")
            .field("rows", &self.rows.len())
            .field("children", &self.children.is_some())
            .finish()
    }
}

impl LocalLoader {
    pub fn new(rows: Vec<Value>) -> Self {
        Self {
            rows,
            children: None,
        }
    }

    /// Produce children on expansion instead of relying on nested rows
    pub fn with_children_hook(mut self, hook: ChildrenHook) -> Self {
        self.children = Some(hook);
        self
    }
}

#[async_trait]
impl Loader for LocalLoader {
    fn is_remote(&self) -> bool {
        false
    }

    async fn load(&self, _params: &Map<String, Value>) -> LoadResponse {
        LoadResponse::ok(self.rows.clone())
    }

    async fn load_children(
        &self,
        parent: &Record,
        _params: &Map<String, Value>,
    ) -> Option<LoadResponse> {
        let hook = self.children.as_ref()?;
        Some(LoadResponse::ok(hook(parent)))
    }

    async fn commit(
        &self,
        changes: Vec<RecordChange>,
        _params: &Map<String, Value>,
    ) -> CommitResponse {
        tracing::debug!("Local commit of {} row(s)", changes.len());
        CommitResponse::ok()
    }
}
