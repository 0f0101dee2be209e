//! Postgres-backed [`ResultStore`] implementation.
//!
//! One table, `generation_records`, keyed by `task_id`. `create_record`
//! uses `ON CONFLICT (task_id) DO UPDATE` so duplicate terminal
//! notifications repeat the same value instead of erroring.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE generation_records (
//!     task_id        UUID PRIMARY KEY,
//!     batch_ref      TEXT NOT NULL,
//!     kind           TEXT NOT NULL,
//!     sequence_index BIGINT NOT NULL,
//!     output         JSONB NOT NULL,
//!     created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! CREATE INDEX generation_records_batch_ref_idx ON generation_records (batch_ref);
//! ```

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use storyforge_core::task::{TaskKind, TaskOutput};
use storyforge_core::types::{TaskId, Timestamp};

use crate::record::GenerationRecord;
use crate::{ResultStore, StoreError};

/// Column list for `generation_records` queries.
const COLUMNS: &str = "task_id, batch_ref, kind, sequence_index, output, created_at";

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Postgres result store.
pub struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Raw row shape; decoded into [`GenerationRecord`] after fetching.
#[derive(sqlx::FromRow)]
struct RecordRow {
    task_id: TaskId,
    batch_ref: String,
    kind: String,
    sequence_index: i64,
    output: serde_json::Value,
    created_at: Timestamp,
}

impl RecordRow {
    fn decode(self) -> Result<GenerationRecord, StoreError> {
        let kind = TaskKind::parse(&self.kind)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown task kind {:?}", self.kind)))?;
        let output: TaskOutput = serde_json::from_value(self.output)
            .map_err(|e| StoreError::Corrupt(format!("undecodable output payload: {e}")))?;
        Ok(GenerationRecord {
            task_id: self.task_id,
            batch_ref: self.batch_ref,
            kind,
            sequence_index: self.sequence_index as usize,
            output,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn create_record(&self, record: &GenerationRecord) -> Result<(), StoreError> {
        let output = serde_json::to_value(&record.output)
            .map_err(|e| StoreError::Corrupt(format!("unencodable output payload: {e}")))?;

        sqlx::query(
            "INSERT INTO generation_records \
                 (task_id, batch_ref, kind, sequence_index, output, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (task_id) DO UPDATE SET output = EXCLUDED.output",
        )
        .bind(record.task_id)
        .bind(&record.batch_ref)
        .bind(record.kind.as_str())
        .bind(record.sequence_index as i64)
        .bind(&output)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_record(&self, task_id: TaskId, output: &TaskOutput) -> Result<(), StoreError> {
        let output = serde_json::to_value(output)
            .map_err(|e| StoreError::Corrupt(format!("unencodable output payload: {e}")))?;

        let result = sqlx::query("UPDATE generation_records SET output = $2 WHERE task_id = $1")
            .bind(task_id)
            .bind(&output)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(task_id));
        }
        Ok(())
    }

    async fn delete_record(&self, task_id: TaskId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM generation_records WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(task_id));
        }
        Ok(())
    }

    async fn list_by_batch(&self, batch_ref: &str) -> Result<Vec<GenerationRecord>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_records \
             WHERE batch_ref = $1 \
             ORDER BY sequence_index ASC"
        );
        let rows: Vec<RecordRow> = sqlx::query_as(&query)
            .bind(batch_ref)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(RecordRow::decode).collect()
    }
}
