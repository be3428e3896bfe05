//! Shared types for the sentiment pipeline.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Envelope ────────────────────────────────────────────────────────

/// A record as delivered by the queue: opaque payload plus envelope metadata.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// Queue partition the record was read from.
    pub partition: u32,
    /// Offset within the partition.
    pub offset: u64,
    /// Queue message key, if any.
    pub key: Option<String>,
    /// Raw payload bytes (tweet JSON).
    pub payload: Vec<u8>,
    /// Timestamp assigned by the queue.
    pub timestamp: DateTime<Utc>,
}

impl RawRecord {
    /// Build a record stamped with the current time.
    pub fn new(partition: u32, offset: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            partition,
            offset,
            key: None,
            payload: payload.into(),
            timestamp: Utc::now(),
        }
    }

    /// Override the queue timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach a queue message key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Strip envelope metadata, keeping only the payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

// ── Stage values ────────────────────────────────────────────────────

/// A parsed tweet that passed the language filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u64,
    pub text: String,
    pub language: String,
}

/// A message whose text has been cleaned, stop-word filtered and stemmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedMessage {
    pub id: u64,
    pub text: String,
}

/// Lexicon score. Always finite and non-negative.
pub type Score = f32;

/// Which lexicon a scorer draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    /// Lowercase name, as used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of the join: a normalized message with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMessage {
    pub id: u64,
    pub text: String,
    pub score: Score,
}

/// A message present in both scorer streams of the same window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRecord {
    pub id: u64,
    pub text: String,
    pub positive_score: Score,
    pub negative_score: Score,
}

/// Categorical sentiment label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Positive,
    Negative,
    Neutral,
}

impl Label {
    /// Wire name of the label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }

    /// Inverse of [`Label::as_str`]. Unknown names return `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal record handed to both sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRecord {
    pub id: u64,
    pub text: String,
    pub positive_score: Score,
    pub negative_score: Score,
    pub label: Label,
}

// ── Windows ─────────────────────────────────────────────────────────

/// Identity of one processing window on one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId {
    pub partition: u32,
    /// Per-partition window counter, starting at 0.
    pub sequence: u64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl WindowId {
    /// Durable destination for this window, derived from its start time.
    ///
    /// Re-dispatching the same window always yields the same key.
    pub fn storage_key(&self) -> String {
        format!(
            "partition={}/{}/{}",
            self.partition,
            self.start.format("%Y/%m/%d/%H"),
            self.start.timestamp_millis()
        )
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "p{}#{}@{}",
            self.partition,
            self.sequence,
            self.start.format("%H:%M:%S%.3f")
        )
    }
}

/// Immutable batch of labeled records for one window.
#[derive(Debug, Clone)]
pub struct WindowBatch {
    pub window: WindowId,
    pub records: Arc<[LabeledRecord]>,
}

impl WindowBatch {
    pub fn new(window: WindowId, records: Vec<LabeledRecord>) -> Self {
        Self {
            window,
            records: records.into(),
        }
    }

    /// True when no record survived the window.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of labeled records in the window.
    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window_at(ms: i64) -> WindowId {
        let start = Utc.timestamp_millis_opt(ms).unwrap();
        WindowId {
            partition: 3,
            sequence: 7,
            start,
            end: start + chrono::Duration::milliseconds(2000),
        }
    }

    #[test]
    fn storage_key_is_derived_from_start_time() {
        // 2024-01-02T03:04:05.678Z
        let window = window_at(1_704_164_645_678);
        assert_eq!(
            window.storage_key(),
            "partition=3/2024/01/02/03/1704164645678"
        );
    }

    #[test]
    fn storage_key_stable_across_calls() {
        let window = window_at(1_700_000_000_000);
        assert_eq!(window.storage_key(), window.storage_key());
    }

    #[test]
    fn into_payload_strips_envelope() {
        let record = RawRecord::new(1, 42, b"{}".to_vec()).with_key("k");
        assert_eq!(record.key.as_deref(), Some("k"));
        assert_eq!(record.into_payload(), b"{}".to_vec());
    }

    #[test]
    fn label_serialization() {
        let record = LabeledRecord {
            id: 9,
            text: "love".into(),
            positive_score: 1.0,
            negative_score: 0.0,
            label: Label::Positive,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["label"], "positive");
        assert_eq!(json["id"], 9);
        assert_eq!(Label::parse("neutral"), Some(Label::Neutral));
        assert_eq!(Label::parse("meh"), None);
    }
}
