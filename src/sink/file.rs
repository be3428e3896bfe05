//! JSON-lines file sink, one file per window.
//!
//! Layout: `<root>/partition=<p>/<YYYY>/<MM>/<DD>/<HH>/<start_millis>.jsonl`.
//! Each write goes to a temporary file that is renamed over the target, so
//! a re-dispatched window replaces its earlier output instead of appending.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::SinkError;
use crate::pipeline::types::{WindowBatch, WindowId};
use crate::sink::DurableSink;

pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final location of a window's file.
    pub fn path_for(&self, window: &WindowId) -> PathBuf {
        self.root.join(format!("{}.jsonl", window.storage_key()))
    }
}

#[async_trait]
impl DurableSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn write_window(&self, batch: &WindowBatch) -> Result<(), SinkError> {
        if batch.is_empty() {
            debug!(window = %batch.window, "Empty window, nothing to write");
            return Ok(());
        }

        let path = self.path_for(&batch.window);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut body = Vec::with_capacity(batch.len() * 96);
        for record in batch.records.iter() {
            serde_json::to_writer(&mut body, record)?;
            body.push(b'\n');
        }

        let tmp = path.with_extension("jsonl.tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;

        debug!(
            window = %batch.window,
            path = %path.display(),
            records = batch.len(),
            "Window file written"
        );
        Ok(())
    }
}
