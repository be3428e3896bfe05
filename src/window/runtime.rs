//! Sentiment runtime — one scheduler per partition, shared sinks and stats.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{PipelineConfig, SinkConfig};
use crate::pipeline::Pipeline;
use crate::sink::Dispatcher;
use crate::source::RecordSource;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::window::scheduler::{PartitionScheduler, PartitionSummary, SchedulerContext};
use crate::window::state::WindowEvent;

/// Buffered window events per subscriber before the slowest one lags.
const EVENT_CAPACITY: usize = 256;

/// A configured runtime, not yet consuming.
pub struct SentimentRuntime {
    ctx: SchedulerContext,
}

impl SentimentRuntime {
    pub fn new(config: PipelineConfig, pipeline: Pipeline, dispatcher: Dispatcher) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            ctx: SchedulerContext {
                config: Arc::new(config),
                pipeline: Arc::new(pipeline),
                dispatcher,
                stats: Arc::new(PipelineStats::default()),
                events,
            },
        }
    }

    /// Validate `config`, load its lexicons and open the configured sinks.
    pub async fn from_config(config: PipelineConfig, sinks: &SinkConfig) -> crate::Result<Self> {
        config.validate()?;
        let pipeline = Pipeline::from_config(&config)?;
        let dispatcher = Dispatcher::from_config(config.retry, sinks).await?;
        Ok(Self::new(config, pipeline, dispatcher))
    }

    /// Subscribe before `start` to see every event from the first window.
    pub fn subscribe(&self) -> broadcast::Receiver<WindowEvent> {
        self.ctx.events.subscribe()
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.ctx.stats)
    }

    /// Spawn one scheduler per source. Source `i` is partition `i`.
    pub fn start(self, sources: Vec<Box<dyn RecordSource>>) -> RuntimeHandle {
        let configured = self.ctx.config.partitions as usize;
        if sources.len() != configured {
            warn!(
                configured,
                sources = sources.len(),
                "Source count differs from configured partitions"
            );
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut partitions = JoinSet::new();
        for (index, source) in sources.into_iter().enumerate() {
            let scheduler = PartitionScheduler::new(index as u32, self.ctx.clone());
            partitions.spawn(scheduler.run(source, shutdown_rx.clone()));
        }
        info!(
            topic = %self.ctx.config.topic,
            partitions = partitions.len(),
            sinks = self.ctx.dispatcher.durable_count(),
            notifiers = self.ctx.dispatcher.notifier_count(),
            "Sentiment runtime started"
        );

        RuntimeHandle {
            shutdown: shutdown_tx,
            partitions,
            finished: Vec::new(),
            ctx: self.ctx,
        }
    }
}

/// Control over a running runtime.
pub struct RuntimeHandle {
    shutdown: watch::Sender<bool>,
    partitions: JoinSet<PartitionSummary>,
    finished: Vec<PartitionSummary>,
    ctx: SchedulerContext,
}

impl RuntimeHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<WindowEvent> {
        self.ctx.events.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Wait for every source to be exhausted and its windows drained.
    ///
    /// Cancel-safe: partitions that already finished are kept for a later
    /// `wait` or `shutdown`.
    pub async fn wait(&mut self) -> Vec<PartitionSummary> {
        while let Some(result) = self.partitions.join_next().await {
            collect_summary(&mut self.finished, result);
        }
        self.summaries()
    }

    /// Seal open windows and drain, aborting whatever is left after the
    /// configured grace period.
    pub async fn shutdown(mut self) -> Vec<PartitionSummary> {
        let _ = self.shutdown.send(true);
        let grace = self.ctx.config.shutdown_grace;

        let drained = tokio::time::timeout(grace, async {
            while let Some(result) = self.partitions.join_next().await {
                collect_summary(&mut self.finished, result);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                grace_ms = grace.as_millis() as u64,
                remaining = self.partitions.len(),
                "Shutdown grace elapsed, aborting partitions"
            );
            self.partitions.abort_all();
            while self.partitions.join_next().await.is_some() {}
        }
        self.summaries()
    }

    fn summaries(&self) -> Vec<PartitionSummary> {
        let mut summaries = self.finished.clone();
        summaries.sort_by_key(|s| s.partition);
        summaries
    }
}

fn collect_summary(
    summaries: &mut Vec<PartitionSummary>,
    result: Result<PartitionSummary, tokio::task::JoinError>,
) {
    match result {
        Ok(summary) => summaries.push(summary),
        Err(e) if e.is_cancelled() => {}
        Err(e) => error!(error = %e, "Partition task failed"),
    }
}
