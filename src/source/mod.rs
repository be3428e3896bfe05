//! Record sources — one partition of the upstream queue each.

use async_trait::async_trait;
use tokio::io::AsyncBufRead;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::debug;

use crate::error::SourceError;
use crate::pipeline::types::RawRecord;

/// A single partition's stream of raw records.
///
/// `Ok(None)` means the partition is exhausted; the scheduler closes its
/// final window and stops.
#[async_trait]
pub trait RecordSource: Send {
    fn name(&self) -> &str;

    async fn next_record(&mut self) -> Result<Option<RawRecord>, SourceError>;
}

// ── ChannelSource ───────────────────────────────────────────────────

/// Records pushed in-process over a bounded channel.
pub struct ChannelSource {
    name: String,
    rx: mpsc::Receiver<RawRecord>,
}

impl ChannelSource {
    pub fn new(name: impl Into<String>, rx: mpsc::Receiver<RawRecord>) -> Self {
        Self {
            name: name.into(),
            rx,
        }
    }

    /// A connected sender and source. Dropping every sender ends the source.
    pub fn channel(name: impl Into<String>, capacity: usize) -> (mpsc::Sender<RawRecord>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(name, rx))
    }
}

#[async_trait]
impl RecordSource for ChannelSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_record(&mut self) -> Result<Option<RawRecord>, SourceError> {
        Ok(self.rx.recv().await)
    }
}

// ── LineSource ──────────────────────────────────────────────────────

/// Newline-delimited payloads from any async reader (stdin, a file).
///
/// Blank lines are skipped. Offsets count delivered records from 0 and
/// each record is stamped with the time it was read.
pub struct LineSource<R> {
    name: String,
    partition: u32,
    lines: LinesStream<R>,
    next_offset: u64,
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(name: impl Into<String>, partition: u32, reader: R) -> Self {
        Self {
            name: name.into(),
            partition,
            lines: LinesStream::new(tokio::io::AsyncBufReadExt::lines(reader)),
            next_offset: 0,
        }
    }
}

#[async_trait]
impl<R> RecordSource for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_record(&mut self) -> Result<Option<RawRecord>, SourceError> {
        while let Some(line) = self.lines.next().await {
            let line = line.map_err(|e| SourceError::ReadFailed {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record = RawRecord::new(self.partition, self.next_offset, line.as_bytes().to_vec());
            self.next_offset += 1;
            return Ok(Some(record));
        }
        debug!(source = %self.name, records = self.next_offset, "Source exhausted");
        Ok(None)
    }
}
