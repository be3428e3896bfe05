//! In-memory sink — keeps windows and notifications for inspection.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::SinkError;
use crate::pipeline::types::{LabeledRecord, WindowBatch};
use crate::sink::{DurableSink, LiveNotifier};

/// Durable sink and notifier backed by process memory.
///
/// Windows are keyed by [`WindowId::storage_key`](crate::pipeline::types::WindowId::storage_key),
/// so rewriting a window replaces it.
#[derive(Debug, Default)]
pub struct MemorySink {
    windows: RwLock<BTreeMap<String, Vec<LabeledRecord>>>,
    notifications: RwLock<Vec<LabeledRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage keys of every written window, in key order.
    pub async fn window_keys(&self) -> Vec<String> {
        self.windows.read().await.keys().cloned().collect()
    }

    pub async fn window(&self, key: &str) -> Option<Vec<LabeledRecord>> {
        self.windows.read().await.get(key).cloned()
    }

    /// Every stored record across all windows.
    pub async fn stored_records(&self) -> Vec<LabeledRecord> {
        self.windows
            .read()
            .await
            .values()
            .flat_map(|records| records.iter().cloned())
            .collect()
    }

    pub async fn notifications(&self) -> Vec<LabeledRecord> {
        self.notifications.read().await.clone()
    }
}

#[async_trait]
impl DurableSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write_window(&self, batch: &WindowBatch) -> Result<(), SinkError> {
        self.windows
            .write()
            .await
            .insert(batch.window.storage_key(), batch.records.to_vec());
        Ok(())
    }
}

#[async_trait]
impl LiveNotifier for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn notify(&self, record: &LabeledRecord) -> Result<(), SinkError> {
        self.notifications.write().await.push(record.clone());
        Ok(())
    }
}
