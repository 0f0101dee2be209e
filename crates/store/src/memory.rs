//! In-memory [`ResultStore`] implementation.
//!
//! Used by tests and by single-process runs that do not need results to
//! survive the process. Semantics match the Postgres implementation:
//! `create_record` upserts by task id.

use std::collections::HashMap;

use async_trait::async_trait;
use storyforge_core::task::TaskOutput;
use storyforge_core::types::TaskId;
use tokio::sync::RwLock;

use crate::record::GenerationRecord;
use crate::{ResultStore, StoreError};

/// `RwLock<HashMap>`-backed result store.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<TaskId, GenerationRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, across all batches.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn create_record(&self, record: &GenerationRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.task_id, record.clone());
        Ok(())
    }

    async fn update_record(&self, task_id: TaskId, output: &TaskOutput) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&task_id)
            .ok_or(StoreError::NotFound(task_id))?;
        record.output = output.clone();
        Ok(())
    }

    async fn delete_record(&self, task_id: TaskId) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .remove(&task_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(task_id))
    }

    async fn list_by_batch(&self, batch_ref: &str) -> Result<Vec<GenerationRecord>, StoreError> {
        let mut records: Vec<GenerationRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.batch_ref == batch_ref)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.sequence_index);
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
