//! Shared helpers for store and grid integration tests

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use gridstore_core::db::Transport;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, Mutex};

/// Install a `RUST_LOG`-driven subscriber once per test binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One request seen by the mock transport
#[derive(Debug, Clone)]
pub struct Request {
    pub method: &'static str,
    pub url: String,
    pub params: Map<String, Value>,
    pub body: Option<Value>,
}

struct Scripted {
    gate: Option<oneshot::Receiver<()>>,
    result: Result<Value>,
}

/// Transport answering calls from a script, in order
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<Request>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn push(&self, payload: Value) {
        self.script.lock().await.push_back(Scripted {
            gate: None,
            result: Ok(payload),
        });
    }

    pub async fn push_error(&self, message: &str) {
        self.script.lock().await.push_back(Scripted {
            gate: None,
            result: Err(anyhow!(message.to_string())),
        });
    }

    /// Script a response that is held back until the returned sender fires
    pub async fn push_gated(&self, payload: Value) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        self.script.lock().await.push_back(Scripted {
            gate: Some(gate),
            result: Ok(payload),
        });
        release
    }

    pub async fn requests(&self) -> Vec<Request> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// Yield until at least `count` calls have been made
    pub async fn wait_for_calls(&self, count: usize) {
        while self.call_count().await < count {
            tokio::task::yield_now().await;
        }
    }

    async fn answer(&self, request: Request) -> Result<Value> {
        self.requests.lock().await.push(request);
        let next = self.script.lock().await.pop_front();
        let Some(scripted) = next else {
            return Err(anyhow!("no scripted response"));
        };
        if let Some(gate) = scripted.gate {
            let _ = gate.await;
        }
        scripted.result
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str, params: &Map<String, Value>) -> Result<Value> {
        self.answer(Request {
            method: "GET",
            url: url.to_string(),
            params: params.clone(),
            body: None,
        })
        .await
    }

    async fn patch(&self, url: &str, body: Value, params: &Map<String, Value>) -> Result<Value> {
        self.answer(Request {
            method: "PATCH",
            url: url.to_string(),
            params: params.clone(),
            body: Some(body),
        })
        .await
    }
}

/// Successful load payload
pub fn rows(records: Value) -> Value {
    let total = records.as_array().map_or(0, Vec::len);
    serde_json::json!({ "success": true, "records": records, "total": total })
}

/// Every event currently queued on `rx`
pub fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
