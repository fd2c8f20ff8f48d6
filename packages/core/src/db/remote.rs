//! RemoteLoader - rows fetched through a transport channel
//!
//! The transport itself (HTTP client, IPC bridge, test double) is supplied by
//! the host through the [`Transport`] trait. Transport errors are folded into
//! `success: false` responses here and never propagate as `Err`.

use super::config::StoreConfig;
use super::loader::{CommitResponse, LoadResponse, Loader, RecordChange};
use super::local::ChildrenHook;
use crate::models::Record;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Request/response channel to a data service
#[async_trait]
pub trait Transport: Send + Sync {
    /// `GET url?params` → payload object
    async fn get(&self, url: &str, params: &Map<String, Value>) -> Result<Value>;

    /// `PATCH url?params` with a JSON body → payload object
    async fn patch(&self, url: &str, body: Value, params: &Map<String, Value>) -> Result<Value>;
}

pub struct RemoteLoader {
    transport: Arc<dyn Transport>,
    url: String,
    commit_url: String,
    expander_url: Option<String>,
    path_finder_url: Option<String>,
    records_field: String,
    total_field: String,
    children: Option<ChildrenHook>,
}

impl RemoteLoader {
    pub fn new(transport: Arc<dyn Transport>, config: &StoreConfig) -> Self {
        Self {
            transport,
            url: config.url.clone(),
            commit_url: config.commit_endpoint().to_string(),
            expander_url: config.expander_url.clone(),
            path_finder_url: config.path_finder_url.clone(),
            records_field: config.records_field.clone(),
            total_field: config.total_field.clone(),
            children: None,
        }
    }

    /// Produce children locally when no expander URL is configured
    pub fn with_children_hook(mut self, hook: ChildrenHook) -> Self {
        self.children = Some(hook);
        self
    }

    async fn fetch(&self, url: &str, params: &Map<String, Value>) -> LoadResponse {
        match self.transport.get(url, params).await {
            Ok(payload) => {
                let response =
                    LoadResponse::from_payload(payload, &self.records_field, &self.total_field);
                if !response.success {
                    tracing::warn!(
                        "Remote load from '{}' reported failure: {}",
                        url,
                        response.message.as_deref().unwrap_or("no message")
                    );
                }
                response
            }
            Err(e) => {
                tracing::warn!("Remote load from '{}' failed: {}", url, e);
                LoadResponse::failure(e.to_string())
            }
        }
    }
}

/// Request params plus the record's primary-key snapshot
fn keyed_params(record: &Record, params: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = params.clone();
    merged.extend(record.origin());
    merged
}

#[async_trait]
impl Loader for RemoteLoader {
    fn is_remote(&self) -> bool {
        true
    }

    async fn load(&self, params: &Map<String, Value>) -> LoadResponse {
        self.fetch(&self.url, params).await
    }

    async fn load_children(
        &self,
        parent: &Record,
        params: &Map<String, Value>,
    ) -> Option<LoadResponse> {
        match (self.expander_url.as_deref(), self.children.as_ref()) {
            (Some(url), _) => Some(self.fetch(url, &keyed_params(parent, params)).await),
            (None, Some(hook)) => Some(LoadResponse::ok(hook(parent))),
            (None, None) => None,
        }
    }

    async fn load_parents(
        &self,
        child: &Record,
        params: &Map<String, Value>,
    ) -> Option<LoadResponse> {
        let url = self.path_finder_url.as_deref()?;
        Some(self.fetch(url, &keyed_params(child, params)).await)
    }

    async fn commit(
        &self,
        changes: Vec<RecordChange>,
        params: &Map<String, Value>,
    ) -> CommitResponse {
        let body = json!({ "records": changes });
        match self.transport.patch(&self.commit_url, body, params).await {
            Ok(payload) => CommitResponse::from_payload(payload),
            Err(e) => {
                tracing::warn!("Remote commit to '{}' failed: {}", self.commit_url, e);
                CommitResponse::failure(e.to_string())
            }
        }
    }
}
