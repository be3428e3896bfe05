//! Pipeline counters shared across partitions.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::pipeline::extract::Rejection;

/// Lock-free counters updated by every stage.
#[derive(Debug, Default)]
pub struct PipelineStats {
    records_received: AtomicU64,
    rejected_malformed: AtomicU64,
    rejected_missing_id: AtomicU64,
    rejected_missing_text: AtomicU64,
    rejected_language: AtomicU64,
    late_dropped: AtomicU64,
    late_merged: AtomicU64,
    records_labeled: AtomicU64,
    windows_dispatched: AtomicU64,
    windows_abandoned: AtomicU64,
    durable_failures: AtomicU64,
    notify_failures: AtomicU64,
    notify_dropped: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub records_received: u64,
    pub rejected_malformed: u64,
    pub rejected_missing_id: u64,
    pub rejected_missing_text: u64,
    pub rejected_language: u64,
    pub late_dropped: u64,
    pub late_merged: u64,
    pub records_labeled: u64,
    pub windows_dispatched: u64,
    pub windows_abandoned: u64,
    pub durable_failures: u64,
    pub notify_failures: u64,
    /// Notifications skipped by the per-window deadline or a full queue.
    pub notify_dropped: u64,
}

impl StatsSnapshot {
    /// Records dropped by the extractor, all reasons combined.
    pub fn rejected_total(&self) -> u64 {
        self.rejected_malformed
            + self.rejected_missing_id
            + self.rejected_missing_text
            + self.rejected_language
    }
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl PipelineStats {
    pub fn record_received(&self) {
        bump(&self.records_received, 1);
    }

    pub fn record_rejection(&self, rejection: Rejection) {
        let counter = match rejection {
            Rejection::Malformed => &self.rejected_malformed,
            Rejection::MissingId => &self.rejected_missing_id,
            Rejection::MissingText => &self.rejected_missing_text,
            Rejection::LanguageMismatch => &self.rejected_language,
        };
        bump(counter, 1);
    }

    pub fn record_late_dropped(&self) {
        bump(&self.late_dropped, 1);
    }

    pub fn record_late_merged(&self) {
        bump(&self.late_merged, 1);
    }

    pub fn record_labeled(&self, n: usize) {
        bump(&self.records_labeled, n as u64);
    }

    pub fn record_window_dispatched(&self) {
        bump(&self.windows_dispatched, 1);
    }

    pub fn record_window_abandoned(&self) {
        bump(&self.windows_abandoned, 1);
    }

    pub fn record_durable_failure(&self) {
        bump(&self.durable_failures, 1);
    }

    pub fn record_notify_failure(&self) {
        bump(&self.notify_failures, 1);
    }

    pub fn record_notify_dropped(&self, n: usize) {
        bump(&self.notify_dropped, n as u64);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            records_received: load(&self.records_received),
            rejected_malformed: load(&self.rejected_malformed),
            rejected_missing_id: load(&self.rejected_missing_id),
            rejected_missing_text: load(&self.rejected_missing_text),
            rejected_language: load(&self.rejected_language),
            late_dropped: load(&self.late_dropped),
            late_merged: load(&self.late_merged),
            records_labeled: load(&self.records_labeled),
            windows_dispatched: load(&self.windows_dispatched),
            windows_abandoned: load(&self.windows_abandoned),
            durable_failures: load(&self.durable_failures),
            notify_failures: load(&self.notify_failures),
            notify_dropped: load(&self.notify_dropped),
        }
    }
}
