//! Change notification.
//!
//! Every committed mutation produces one [`ChangeEvent`], handed to the
//! engine's [`ChangeSink`] after the operation's `after*` hooks have run.
//! Delivering events to subscribers is the sink's business.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

/// Kind of committed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
    Restore,
    Revert,
}

impl ChangeOperation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Create => "create",
            ChangeOperation::Update => "update",
            ChangeOperation::Delete => "delete",
            ChangeOperation::Restore => "restore",
            ChangeOperation::Revert => "revert",
        }
    }
}

/// One committed change to one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub collection: String,
    pub operation: ChangeOperation,
    pub id: String,
    pub user_id: Option<String>,
    pub locale: Option<String>,
    /// RFC 3339 commit time.
    pub at: String,
}

/// Append-only destination for change events.
pub trait ChangeSink: Send + Sync {
    fn append(&self, event: ChangeEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ChangeSink for NoopSink {
    fn append(&self, _event: ChangeEvent) {}
}

/// Keeps every event in memory, in commit order.
#[derive(Debug, Default)]
pub struct MemoryChangeLog {
    events: Mutex<Vec<ChangeEvent>>,
}

impl MemoryChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events.
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl ChangeSink for MemoryChangeLog {
    fn append(&self, event: ChangeEvent) {
        tracing::trace!(
            collection = %event.collection,
            operation = event.operation.as_str(),
            id = %event.id,
            "Change recorded"
        );
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
