//! RowSource - what a grid displays and edits

use crate::db::StoreEvent;
use crate::models::{FieldValue, Record, RecordHash};
use crate::services::{Store, TreeStore};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Rows a [`Grid`](super::Grid) renders, in display order
///
/// Implemented by [`Store`] (current page) and [`TreeStore`] (page roots plus
/// expanded branches).
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn rows(&self) -> Vec<Record>;

    /// Current state of one record, wherever it sits
    async fn get(&self, hash: &RecordHash) -> Option<Record>;

    /// Write one field; `None` when the record no longer exists
    async fn set_value(&self, hash: &RecordHash, field: &str, value: FieldValue) -> Option<bool>;

    /// Change notifications the grid reconciles against
    fn subscribe_to_events(&self) -> broadcast::Receiver<StoreEvent>;
}

#[async_trait]
impl RowSource for Store {
    async fn rows(&self) -> Vec<Record> {
        self.records().await
    }

    async fn get(&self, hash: &RecordHash) -> Option<Record> {
        self.get_by_hash(hash).await
    }

    async fn set_value(&self, hash: &RecordHash, field: &str, value: FieldValue) -> Option<bool> {
        Store::set_value(self, hash, field, value).await
    }

    fn subscribe_to_events(&self) -> broadcast::Receiver<StoreEvent> {
        Store::subscribe_to_events(self)
    }
}

#[async_trait]
impl RowSource for TreeStore {
    async fn rows(&self) -> Vec<Record> {
        self.visible_rows()
            .await
            .into_iter()
            .map(|(_, record)| record)
            .collect()
    }

    async fn get(&self, hash: &RecordHash) -> Option<Record> {
        self.store().get_by_hash(hash).await
    }

    async fn set_value(&self, hash: &RecordHash, field: &str, value: FieldValue) -> Option<bool> {
        TreeStore::set_value(self, hash, field, value).await
    }

    fn subscribe_to_events(&self) -> broadcast::Receiver<StoreEvent> {
        TreeStore::subscribe_to_events(self)
    }
}
