//! Partition scheduler — collects records into fixed windows, runs the
//! pipeline on each closed window and hands the result to the sinks.
//!
//! Per partition there are two loops joined in one task:
//! - the collector drives the window timer and buffers source records
//! - the processor runs stages on the blocking pool and enforces the join deadline
//!
//! They are connected by a bounded channel of `max_in_flight_windows`
//! closed windows. When it is full the collector stops reading its source.
//! Durable writes hold one of `max_in_flight_windows` permits. Live
//! notifications run in a separate bounded set under their own deadline and
//! never hold a permit.

use std::future::Future;
use std::ops::Range;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use tokio::sync::{Semaphore, broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::error::Elapsed;
use tokio::time::{Instant, MissedTickBehavior, timeout_at};
use tracing::{debug, error, info, warn};

use crate::config::{LatePolicy, PipelineConfig};
use crate::error::{JoinIncompleteError, WindowError};
use crate::pipeline::lexicon::Scorer;
use crate::pipeline::types::{
    LabeledRecord, NormalizedMessage, Polarity, RawRecord, ScoredMessage, WindowBatch, WindowId,
};
use crate::pipeline::{Pipeline, score_all};
use crate::sink::Dispatcher;
use crate::source::RecordSource;
use crate::stats::PipelineStats;
use crate::window::state::{WindowEvent, WindowLifecycle, WindowPhase};

/// Everything a partition shares with the rest of the runtime.
#[derive(Clone)]
pub struct SchedulerContext {
    pub config: Arc<PipelineConfig>,
    pub pipeline: Arc<Pipeline>,
    pub dispatcher: Dispatcher,
    pub stats: Arc<PipelineStats>,
    pub events: broadcast::Sender<WindowEvent>,
}

/// Final counts for one partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionSummary {
    pub partition: u32,
    pub windows_closed: u64,
    pub windows_dispatched: u64,
    pub windows_abandoned: u64,
}

struct OpenWindow {
    lifecycle: WindowLifecycle,
    records: Vec<RawRecord>,
}

struct ClosedWindow {
    lifecycle: WindowLifecycle,
    records: Vec<RawRecord>,
    closed_at: Instant,
    /// No window follows this one on the partition.
    last: bool,
}

#[derive(Default)]
struct ProcessCounts {
    dispatched: u64,
    abandoned: u64,
}

/// Windowing for a single partition.
pub struct PartitionScheduler {
    partition: u32,
    ctx: SchedulerContext,
}

impl PartitionScheduler {
    pub fn new(partition: u32, ctx: SchedulerContext) -> Self {
        Self { partition, ctx }
    }

    /// Run until the source is exhausted or shutdown is signalled, then
    /// drain every closed window.
    pub async fn run(
        self,
        source: Box<dyn RecordSource>,
        shutdown: watch::Receiver<bool>,
    ) -> PartitionSummary {
        info!(
            partition = self.partition,
            source = source.name(),
            window_ms = self.ctx.config.window_duration.as_millis() as u64,
            "Partition scheduler started"
        );

        let (tx, rx) = mpsc::channel(self.ctx.config.max_in_flight_windows.max(1));
        let (windows_closed, counts) =
            tokio::join!(self.collect(source, shutdown, tx), self.process(rx));

        info!(
            partition = self.partition,
            windows = windows_closed,
            dispatched = counts.dispatched,
            abandoned = counts.abandoned,
            "Partition scheduler stopped"
        );
        PartitionSummary {
            partition: self.partition,
            windows_closed,
            windows_dispatched: counts.dispatched,
            windows_abandoned: counts.abandoned,
        }
    }

    // ── Collector ───────────────────────────────────────────────────

    async fn collect(
        &self,
        mut source: Box<dyn RecordSource>,
        mut shutdown: watch::Receiver<bool>,
        tx: mpsc::Sender<ClosedWindow>,
    ) -> u64 {
        let duration = self.ctx.config.window_duration;
        let span = chrono::Duration::from_std(duration)
            .unwrap_or_else(|_| chrono::Duration::hours(24));

        let epoch = Utc::now();
        let mut sequence = 0;
        let mut open = self.open_window(sequence, epoch, span);
        let mut ticker = tokio::time::interval_at(Instant::now() + duration, duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut closed = 0;

        if *shutdown.borrow() {
            self.seal(open, true, &tx).await;
            return 1;
        }

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    // A dropped sender also means stop.
                    if changed.is_err() || *shutdown.borrow() {
                        info!(partition = self.partition, "Shutdown requested, sealing open window");
                        self.seal(open, true, &tx).await;
                        closed += 1;
                        break;
                    }
                }

                _ = ticker.tick() => {
                    sequence += 1;
                    let next_start = open.lifecycle.window().end;
                    let next = self.open_window(sequence, next_start, span);
                    let finished = std::mem::replace(&mut open, next);
                    closed += 1;
                    if !self.seal(finished, false, &tx).await {
                        warn!(partition = self.partition, "Window processor gone, stopping collector");
                        break;
                    }
                }

                next = source.next_record() => match next {
                    Ok(Some(record)) => self.accept(&mut open, record, epoch),
                    Ok(None) => {
                        info!(partition = self.partition, "Source exhausted, closing final window");
                        self.seal(open, true, &tx).await;
                        closed += 1;
                        break;
                    }
                    Err(e) => {
                        error!(
                            partition = self.partition,
                            source = source.name(),
                            error = %e,
                            "Source failed, closing final window"
                        );
                        self.seal(open, true, &tx).await;
                        closed += 1;
                        break;
                    }
                },
            }
        }
        closed
    }

    fn open_window(&self, sequence: u64, start: DateTime<Utc>, span: chrono::Duration) -> OpenWindow {
        let window = WindowId {
            partition: self.partition,
            sequence,
            start,
            end: start + span,
        };
        let mut lifecycle = WindowLifecycle::new(window);
        if let Err(e) = lifecycle.transition_to(WindowPhase::Open) {
            error!(error = %e, "Failed to open window");
        }
        OpenWindow {
            lifecycle,
            records: Vec::new(),
        }
    }

    /// Late means the record belongs to a window this partition already
    /// sealed. Anything older than the first window is backlog and joins the
    /// open window.
    fn accept(&self, open: &mut OpenWindow, record: RawRecord, epoch: DateTime<Utc>) {
        self.ctx.stats.record_received();
        let window = open.lifecycle.window();
        if record.timestamp < window.start && record.timestamp >= epoch {
            match self.ctx.config.late_policy {
                LatePolicy::Drop => {
                    self.ctx.stats.record_late_dropped();
                    debug!(
                        window = %window,
                        offset = record.offset,
                        "Late record dropped"
                    );
                    return;
                }
                LatePolicy::MergeIntoNext => {
                    self.ctx.stats.record_late_merged();
                    debug!(
                        window = %window,
                        offset = record.offset,
                        "Late record merged into open window"
                    );
                }
            }
        }
        open.records.push(record);
    }

    /// Hand a window to the processor. Returns false if the processor is gone.
    async fn seal(&self, open: OpenWindow, last: bool, tx: &mpsc::Sender<ClosedWindow>) -> bool {
        let OpenWindow {
            mut lifecycle,
            records,
        } = open;
        if let Err(e) = lifecycle.transition_to(WindowPhase::Closing) {
            error!(error = %e, "Failed to seal window");
            return true;
        }
        debug!(window = %lifecycle.window(), records = records.len(), "Window sealed");
        tx.send(ClosedWindow {
            lifecycle,
            records,
            closed_at: Instant::now(),
            last,
        })
        .await
        .is_ok()
    }

    // ── Processor ───────────────────────────────────────────────────

    async fn process(&self, mut rx: mpsc::Receiver<ClosedWindow>) -> ProcessCounts {
        let permits = Arc::new(Semaphore::new(self.ctx.config.max_in_flight_windows.max(1)));
        let mut deliveries: JoinSet<()> = JoinSet::new();
        let mut notifications: JoinSet<()> = JoinSet::new();
        let mut counts = ProcessCounts::default();

        while let Some(closed) = rx.recv().await {
            while let Some(finished) = deliveries.try_join_next() {
                log_task_result(finished);
            }

            let ClosedWindow {
                mut lifecycle,
                records,
                closed_at,
                last,
            } = closed;
            let window = lifecycle.window();
            let deadline = closed_at + self.ctx.config.join_timeout;

            match self.run_stages(window, records, deadline).await {
                Ok(labeled) => {
                    advance(&mut lifecycle, WindowPhase::Dispatched);
                    counts.dispatched += 1;
                    self.ctx.stats.record_labeled(labeled.len());
                    self.ctx.stats.record_window_dispatched();

                    let batch = WindowBatch::new(window, labeled);
                    let permit = match Arc::clone(&permits).acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    self.queue_notifications(&mut notifications, batch.clone());
                    let ctx = self.ctx.clone();
                    deliveries.spawn(async move {
                        let _permit = permit;
                        deliver_durable(&ctx, batch).await;
                    });
                }
                Err(e) => {
                    advance(&mut lifecycle, WindowPhase::Abandoned);
                    counts.abandoned += 1;
                    self.ctx.stats.record_window_abandoned();
                    warn!(window = %window, error = %e, "Window abandoned");
                    let _ = self.ctx.events.send(WindowEvent::Abandoned {
                        window,
                        error: Arc::new(e),
                    });
                }
            }

            advance(
                &mut lifecycle,
                if last {
                    WindowPhase::Stopped
                } else {
                    WindowPhase::Idle
                },
            );
        }

        while let Some(finished) = deliveries.join_next().await {
            log_task_result(finished);
        }
        while let Some(finished) = notifications.join_next().await {
            log_task_result(finished);
        }
        counts
    }

    /// Start live delivery for a window next to its durable write.
    ///
    /// At most `max_in_flight_windows` windows notify at once; a window
    /// arriving while all slots are busy has its notifications dropped.
    fn queue_notifications(&self, notifications: &mut JoinSet<()>, batch: WindowBatch) {
        let notifiers = self.ctx.dispatcher.notifier_count();
        if batch.is_empty() || notifiers == 0 {
            return;
        }
        while let Some(finished) = notifications.try_join_next() {
            log_task_result(finished);
        }

        if notifications.len() >= self.ctx.config.max_in_flight_windows.max(1) {
            let dropped = batch.len() * notifiers;
            self.ctx.stats.record_notify_dropped(dropped);
            warn!(
                window = %batch.window,
                dropped,
                pending = notifications.len(),
                "Notification queue full, dropping window notifications"
            );
            let _ = self.ctx.events.send(WindowEvent::Notified {
                window: batch.window,
                delivered: 0,
                failed: 0,
                dropped,
            });
            return;
        }

        let deadline = Instant::now() + self.ctx.config.notify_deadline;
        let ctx = self.ctx.clone();
        notifications.spawn(async move { deliver_live(&ctx, batch, deadline).await });
    }

    /// Stages 2–7 for one window, bounded by the join deadline.
    async fn run_stages(
        &self,
        window: WindowId,
        records: Vec<RawRecord>,
        deadline: Instant,
    ) -> Result<Vec<LabeledRecord>, WindowError> {
        let workers = self.ctx.config.workers.max(1);
        let waited = self.ctx.config.join_timeout;
        let incomplete = |missing: Vec<Polarity>| -> WindowError {
            JoinIncompleteError {
                window,
                missing,
                waited,
            }
            .into()
        };

        let prepare = {
            let handles: Vec<_> = split_chunks(records, workers)
                .into_iter()
                .map(|chunk| {
                    let pipeline = Arc::clone(&self.ctx.pipeline);
                    let stats = Arc::clone(&self.ctx.stats);
                    tokio::task::spawn_blocking(move || pipeline.prepare(chunk, &stats))
                })
                .collect();
            try_join_all(handles)
        };

        let prepared: Arc<[NormalizedMessage]> = match timeout_at(deadline, prepare).await {
            Ok(Ok(chunks)) => chunks.into_iter().flatten().collect(),
            Ok(Err(e)) => return Err(task_failed(window, e)),
            Err(_) => return Err(incomplete(vec![Polarity::Positive, Polarity::Negative])),
        };

        let positive = score_side(
            self.ctx.pipeline.scorer(Polarity::Positive),
            Arc::clone(&prepared),
            workers,
        );
        let negative = score_side(
            self.ctx.pipeline.scorer(Polarity::Negative),
            Arc::clone(&prepared),
            workers,
        );
        let (positive, negative) =
            tokio::join!(timeout_at(deadline, positive), timeout_at(deadline, negative));

        let mut missing = Vec::new();
        let mut side = |polarity: Polarity,
                        result: Result<Result<Vec<ScoredMessage>, JoinError>, Elapsed>|
         -> Result<Option<Vec<ScoredMessage>>, WindowError> {
            match result {
                Ok(Ok(scored)) => Ok(Some(scored)),
                Ok(Err(e)) => Err(task_failed(window, e)),
                Err(_) => {
                    missing.push(polarity);
                    Ok(None)
                }
            }
        };
        let positive = side(Polarity::Positive, positive)?;
        let negative = side(Polarity::Negative, negative)?;

        match (positive, negative) {
            (Some(positive), Some(negative)) => Ok(self.ctx.pipeline.finish(positive, negative)),
            _ => Err(incomplete(missing)),
        }
    }
}

/// Write a batch to the durable sinks and report the outcome.
async fn deliver_durable(ctx: &SchedulerContext, batch: WindowBatch) {
    let window = batch.window;
    let failures = ctx.dispatcher.write_durable(&batch, &ctx.stats).await;

    info!(
        window = %window,
        records = batch.len(),
        durable_failures = failures.len(),
        "Window dispatched"
    );
    let _ = ctx.events.send(WindowEvent::Dispatched {
        window,
        records: batch.len(),
    });
    for (_sink, source) in failures {
        let _ = ctx.events.send(WindowEvent::SinkFailed {
            window,
            error: Arc::new(WindowError::Sink { window, source }),
        });
    }
}

async fn deliver_live(ctx: &SchedulerContext, batch: WindowBatch, deadline: Instant) {
    let outcome = ctx.dispatcher.notify_all(&batch, &ctx.stats, Some(deadline)).await;
    debug!(
        window = %batch.window,
        delivered = outcome.delivered,
        failed = outcome.failed,
        dropped = outcome.dropped,
        "Window notifications finished"
    );
    let _ = ctx.events.send(WindowEvent::Notified {
        window: batch.window,
        delivered: outcome.delivered,
        failed: outcome.failed,
        dropped: outcome.dropped,
    });
}

fn advance(lifecycle: &mut WindowLifecycle, to: WindowPhase) {
    if let Err(e) = lifecycle.transition_to(to) {
        error!(error = %e, "Window phase change rejected");
    }
}

fn log_task_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Window delivery task failed");
    }
}

fn task_failed(window: WindowId, e: JoinError) -> WindowError {
    WindowError::TaskFailed {
        window,
        reason: e.to_string(),
    }
}

/// Score one side on the blocking pool, `workers` chunks in parallel.
///
/// Tasks start immediately; the returned future only collects them.
fn score_side(
    scorer: Arc<dyn Scorer>,
    messages: Arc<[NormalizedMessage]>,
    workers: usize,
) -> impl Future<Output = Result<Vec<ScoredMessage>, JoinError>> + Send {
    let handles: Vec<_> = chunk_ranges(messages.len(), workers)
        .into_iter()
        .map(|range| {
            let scorer = Arc::clone(&scorer);
            let messages = Arc::clone(&messages);
            tokio::task::spawn_blocking(move || score_all(scorer.as_ref(), &messages[range]))
        })
        .collect();
    async move {
        let chunks = try_join_all(handles).await?;
        Ok(chunks.into_iter().flatten().collect())
    }
}

/// Split into at most `workers` contiguous chunks, preserving order.
fn split_chunks<T>(mut items: Vec<T>, workers: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let size = items.len().div_ceil(workers.max(1));
    let mut chunks = Vec::with_capacity(workers);
    while items.len() > size {
        let rest = items.split_off(size);
        chunks.push(std::mem::replace(&mut items, rest));
    }
    chunks.push(items);
    chunks
}

fn chunk_ranges(len: usize, workers: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let size = len.div_ceil(workers.max(1));
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}
