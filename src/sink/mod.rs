//! Window sinks — durable storage and live notification.
//!
//! Every finished window goes to both paths independently:
//! 1. `DurableSink::write_window()` — whole batch, retried with backoff
//! 2. `LiveNotifier::notify()` — one record at a time, failures logged and dropped
//!
//! A failure on one path never blocks or fails the other. Notifications are
//! bounded by a per-window deadline so a slow listener cannot hold a window.

pub mod database;
pub mod file;
pub mod http;
pub mod memory;
mod migrations;
pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

use crate::config::SinkConfig;
use crate::error::SinkError;
use crate::pipeline::types::{LabeledRecord, WindowBatch};
use crate::sink::retry::RetryPolicy;
use crate::stats::PipelineStats;

pub use database::LibSqlSink;
pub use file::FileSink;
pub use http::HttpNotifier;
pub use memory::MemorySink;

/// Append-only storage for whole windows.
///
/// Writing the same window twice must leave exactly one copy of its records.
#[async_trait]
pub trait DurableSink: Send + Sync {
    fn name(&self) -> &str;

    async fn write_window(&self, batch: &WindowBatch) -> Result<(), SinkError>;
}

/// One-way delivery of labeled records to an external listener.
#[async_trait]
pub trait LiveNotifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, record: &LabeledRecord) -> Result<(), SinkError>;
}

/// Live delivery counts for one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyOutcome {
    pub delivered: usize,
    pub failed: usize,
    /// Not attempted, or cut off, because the window's deadline passed.
    pub dropped: usize,
}

/// Result of dispatching one window.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Durable sinks that gave up after retries, with their final error.
    pub durable_failures: Vec<(String, SinkError)>,
    pub notify: NotifyOutcome,
}

/// Fans a window out to every configured sink.
#[derive(Clone)]
pub struct Dispatcher {
    durable: Vec<Arc<dyn DurableSink>>,
    notifiers: Vec<Arc<dyn LiveNotifier>>,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            durable: Vec::new(),
            notifiers: Vec::new(),
            retry,
        }
    }

    /// Open every sink named in `config`.
    pub async fn from_config(retry: RetryPolicy, config: &SinkConfig) -> Result<Self, SinkError> {
        let mut dispatcher = Self::new(retry);

        if let Some(dir) = &config.output_dir {
            info!(path = %dir.display(), "File sink enabled");
            dispatcher = dispatcher.with_durable(Arc::new(FileSink::new(dir)));
        }
        if let Some(path) = &config.db_path {
            let sink = LibSqlSink::new_local(path).await?;
            info!(path = %path.display(), "libSQL sink enabled");
            dispatcher = dispatcher.with_durable(Arc::new(sink));
        }
        if let Some(notifier) = HttpNotifier::from_config(config)? {
            info!(url = notifier.url(), "HTTP notifier enabled");
            dispatcher = dispatcher.with_notifier(Arc::new(notifier));
        }
        if dispatcher.durable.is_empty() {
            warn!("No durable sink configured (set SENTIMENT_OUTPUT_DIR or SENTIMENT_DB_PATH)");
        }
        Ok(dispatcher)
    }

    pub fn with_durable(mut self, sink: Arc<dyn DurableSink>) -> Self {
        self.durable.push(sink);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn LiveNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Number of durable sinks.
    pub fn durable_count(&self) -> usize {
        self.durable.len()
    }

    /// Number of live notifiers.
    pub fn notifier_count(&self) -> usize {
        self.notifiers.len()
    }

    /// Deliver a window to every sink with no notification deadline.
    ///
    /// The runtime drives the two paths separately; this is for callers that
    /// want one combined result.
    pub async fn dispatch(&self, batch: &WindowBatch, stats: &PipelineStats) -> DispatchOutcome {
        let (durable_failures, notify) = tokio::join!(
            self.write_durable(batch, stats),
            self.notify_all(batch, stats, None)
        );
        DispatchOutcome {
            durable_failures,
            notify,
        }
    }

    /// Write the batch to each durable sink, retrying each independently.
    pub async fn write_durable(
        &self,
        batch: &WindowBatch,
        stats: &PipelineStats,
    ) -> Vec<(String, SinkError)> {
        let mut failures = Vec::new();
        for sink in &self.durable {
            let result = self
                .retry
                .run(sink.name(), |_| sink.write_window(batch))
                .await;
            match result {
                Ok(()) => {
                    debug!(
                        window = %batch.window,
                        sink = sink.name(),
                        records = batch.len(),
                        "Window written to durable sink"
                    );
                }
                Err(e) => {
                    error!(
                        window = %batch.window,
                        sink = sink.name(),
                        error = %e,
                        "Durable sink write failed"
                    );
                    stats.record_durable_failure();
                    failures.push((sink.name().to_string(), e));
                }
            }
        }
        failures
    }

    /// Send each record to each notifier, once, until `deadline`.
    ///
    /// Whatever is still unsent at the deadline is counted as dropped.
    pub async fn notify_all(
        &self,
        batch: &WindowBatch,
        stats: &PipelineStats,
        deadline: Option<Instant>,
    ) -> NotifyOutcome {
        let mut outcome = NotifyOutcome::default();
        let total = batch.len() * self.notifiers.len();

        'notifiers: for notifier in &self.notifiers {
            for record in batch.records.iter() {
                let sent = match deadline {
                    Some(deadline) => match timeout_at(deadline, notifier.notify(record)).await {
                        Ok(sent) => sent,
                        Err(_) => break 'notifiers,
                    },
                    None => notifier.notify(record).await,
                };
                match sent {
                    Ok(()) => outcome.delivered += 1,
                    Err(e) => {
                        outcome.failed += 1;
                        stats.record_notify_failure();
                        warn!(
                            window = %batch.window,
                            notifier = notifier.name(),
                            id = record.id,
                            error = %e,
                            "Live notification dropped"
                        );
                    }
                }
            }
        }

        outcome.dropped = total - outcome.delivered - outcome.failed;
        if outcome.dropped > 0 {
            stats.record_notify_dropped(outcome.dropped);
            warn!(
                window = %batch.window,
                delivered = outcome.delivered,
                dropped = outcome.dropped,
                "Notification deadline passed, dropping the rest of the window"
            );
        }
        outcome
    }
}
