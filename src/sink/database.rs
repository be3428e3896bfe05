//! libSQL table sink — labeled records keyed by `(window_key, message_id)`.
//!
//! Each window is written in one transaction that first deletes any rows
//! already stored under the window's key, so a re-dispatch replaces the
//! earlier copy.
//!
//! Message ids are `u64` but SQLite integers are signed, so ids are stored
//! bit-cast to `i64`. Ids above `i64::MAX` land as negative values and come
//! back unchanged.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::SinkError;
use crate::pipeline::types::{Label, LabeledRecord, WindowBatch};
use crate::sink::DurableSink;
use crate::sink::migrations;

pub struct LibSqlSink {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    /// One transaction at a time on the shared connection.
    write_lock: Mutex<()>,
}

impl LibSqlSink {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SinkError::Database(format!("Failed to open libSQL database: {e}")))?;
        let sink = Self::from_database(db).await?;
        info!(path = %path.display(), "Sink database opened");
        Ok(sink)
    }

    /// In-memory database (for tests).
    pub async fn new_memory() -> Result<Self, SinkError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                SinkError::Database(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, SinkError> {
        let conn = db
            .connect()
            .map_err(|e| SinkError::Database(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        })
    }

    /// Records stored for one window, ordered by message id.
    pub async fn window_records(&self, window_key: &str) -> Result<Vec<LabeledRecord>, SinkError> {
        let mut rows = self
            .conn
            .query(
                "SELECT message_id, text, positive_score, negative_score, label
                 FROM labeled_records WHERE window_key = ?1",
                params![window_key],
            )
            .await
            .map_err(|e| SinkError::Database(format!("window_records: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| SinkError::Database(format!("window_records: {e}")))?
        {
            records.push(row_to_record(&row)?);
        }
        // Bit-cast ids do not sort in SQL order.
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    /// Total rows across all windows.
    pub async fn count(&self) -> Result<u64, SinkError> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM labeled_records", ())
            .await
            .map_err(|e| SinkError::Database(format!("count: {e}")))?;
        match rows
            .next()
            .await
            .map_err(|e| SinkError::Database(format!("count: {e}")))?
        {
            Some(row) => {
                let n: i64 = row
                    .get(0)
                    .map_err(|e| SinkError::Database(format!("count row parse: {e}")))?;
                Ok(n.max(0) as u64)
            }
            None => Ok(0),
        }
    }
}

fn row_to_record(row: &libsql::Row) -> Result<LabeledRecord, SinkError> {
    let parse = |e: libsql::Error| SinkError::Database(format!("row parse: {e}"));
    let id: i64 = row.get(0).map_err(parse)?;
    let text: String = row.get(1).map_err(parse)?;
    let positive: f64 = row.get(2).map_err(parse)?;
    let negative: f64 = row.get(3).map_err(parse)?;
    let label: String = row.get(4).map_err(parse)?;
    let label = Label::parse(&label)
        .ok_or_else(|| SinkError::Database(format!("unknown label {label:?}")))?;
    Ok(LabeledRecord {
        id: id as u64,
        text,
        positive_score: positive as f32,
        negative_score: negative as f32,
        label,
    })
}

#[async_trait]
impl DurableSink for LibSqlSink {
    fn name(&self) -> &str {
        "libsql"
    }

    async fn write_window(&self, batch: &WindowBatch) -> Result<(), SinkError> {
        let window = batch.window;
        let key = window.storage_key();
        let start = window.start.to_rfc3339();
        let end = window.end.to_rfc3339();

        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| SinkError::Database(format!("begin: {e}")))?;

        tx.execute(
            "DELETE FROM labeled_records WHERE window_key = ?1",
            params![key.clone()],
        )
        .await
        .map_err(|e| SinkError::Database(format!("clear window: {e}")))?;

        for record in batch.records.iter() {
            let id = record.id as i64;
            tx.execute(
                "INSERT OR REPLACE INTO labeled_records
                    (window_key, message_id, partition, window_start, window_end,
                     text, positive_score, negative_score, label)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    key.clone(),
                    id,
                    i64::from(window.partition),
                    start.clone(),
                    end.clone(),
                    record.text.clone(),
                    f64::from(record.positive_score),
                    f64::from(record.negative_score),
                    record.label.as_str()
                ],
            )
            .await
            .map_err(|e| SinkError::Database(format!("insert record {}: {e}", record.id)))?;
        }

        tx.commit()
            .await
            .map_err(|e| SinkError::Database(format!("commit: {e}")))?;

        debug!(window = %window, key = %key, records = batch.len(), "Window rows written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::pipeline::types::WindowId;

    fn batch(sequence: u64, start_ms: i64, ids: &[u64]) -> WindowBatch {
        let start = Utc.timestamp_millis_opt(start_ms).unwrap();
        let window = WindowId {
            partition: 0,
            sequence,
            start,
            end: start + chrono::Duration::seconds(2),
        };
        let records = ids
            .iter()
            .map(|&id| LabeledRecord {
                id,
                text: format!("text {id}"),
                positive_score: 0.0,
                negative_score: 1.0,
                label: Label::Negative,
            })
            .collect();
        WindowBatch::new(window, records)
    }

    #[tokio::test]
    async fn stores_and_reads_back_window() {
        let sink = LibSqlSink::new_memory().await.unwrap();
        let batch = batch(0, 1_700_000_000_000, &[3, 1, 2]);

        sink.write_window(&batch).await.unwrap();

        let stored = sink.window_records(&batch.window.storage_key()).await.unwrap();
        let ids: Vec<u64> = stored.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(stored[0].label, Label::Negative);
        assert_eq!(stored[0].text, "text 1");
    }

    #[tokio::test]
    async fn rewriting_window_leaves_one_copy() {
        let sink = LibSqlSink::new_memory().await.unwrap();
        let first = batch(0, 1_700_000_000_000, &[1, 2, 3]);
        let second = batch(1, 1_700_000_002_000, &[4]);

        sink.write_window(&first).await.unwrap();
        sink.write_window(&second).await.unwrap();
        sink.write_window(&first).await.unwrap();

        assert_eq!(sink.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn local_file_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sentiment.db");
        let batch = batch(0, 1_700_000_000_000, &[10, 11]);

        {
            let sink = LibSqlSink::new_local(&path).await.unwrap();
            sink.write_window(&batch).await.unwrap();
        }
        let reopened = LibSqlSink::new_local(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn ids_above_signed_range_round_trip() {
        let sink = LibSqlSink::new_memory().await.unwrap();
        let huge = u64::MAX;
        let past_signed = i64::MAX as u64 + 1;
        let batch = batch(0, 1_700_000_000_000, &[huge, 1, past_signed]);

        sink.write_window(&batch).await.unwrap();

        let stored = sink.window_records(&batch.window.storage_key()).await.unwrap();
        let ids: Vec<u64> = stored.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, past_signed, huge]);
        assert_eq!(sink.count().await.unwrap(), 3);
    }
}
