//! Store Events
//!
//! This module defines the notifications emitted by `Store` and `TreeStore`.
//! They follow the observer pattern: the rendering layer subscribes to a
//! store without the store knowing anything about rendering.
//!
//! # Architecture
//!
//! Events are emitted on a tokio broadcast channel, allowing multiple
//! subscribers. Emission never blocks and is ignored when nobody listens.
//!
//! # Ordering
//!
//! - Every `BeforeLoad` is followed by exactly one `Load` carrying the same
//!   generation, even when the load failed or was superseded.
//! - Every `BeforeUpdate` is followed by the `Update` (or `UpdateChildren`)
//!   of the mutation it announced.

use crate::data::DataChange;
use crate::models::RecordHash;

/// Notifications emitted by stores
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A load (generation `n`) is about to fetch
    BeforeLoad { generation: u64 },

    /// Load `generation` resolved
    ///
    /// `superseded` loads were overtaken by a newer one and their results
    /// were discarded.
    Load {
        generation: u64,
        success: bool,
        superseded: bool,
    },

    /// The dataset is about to change
    BeforeUpdate,

    /// The dataset changed
    Update(DataChange),

    /// The child list of one record changed; only that subtree needs redraw
    UpdateChildren { hash: RecordHash },
}

impl StoreEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            StoreEvent::BeforeLoad { .. } => "beforeLoad",
            StoreEvent::Load { .. } => "load",
            StoreEvent::BeforeUpdate => "beforeUpdate",
            StoreEvent::Update(_) => "update",
            StoreEvent::UpdateChildren { .. } => "updateChildren",
        }
    }

    /// Map a dataset change to the event announcing it
    pub(crate) fn from_change(change: &DataChange) -> Self {
        match change {
            DataChange::Children { hash } => StoreEvent::UpdateChildren { hash: hash.clone() },
            other => StoreEvent::Update(other.clone()),
        }
    }
}
