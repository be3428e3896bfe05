//! Error types for the sentiment pipeline.

use std::fmt;
use std::time::Duration;

use crate::pipeline::types::{Polarity, WindowId};
use crate::window::state::WindowPhase;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Window error: {0}")]
    Window(#[from] WindowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a record source (queue collaborator).
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Source {name} failed to read: {reason}")]
    ReadFailed { name: String, reason: String },
}

/// Durable sink and live notifier errors.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Endpoint rejected delivery with status {status}")]
    Rejected { status: u16 },

    #[error("Sink {sink} gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        sink: String,
        attempts: u32,
        last: Box<SinkError>,
    },
}

/// One or both scorer sides of a window did not complete before the deadline.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Window {window} join incomplete after {waited:?}: missing {}", MissingSides(.missing))]
pub struct JoinIncompleteError {
    pub window: WindowId,
    pub missing: Vec<Polarity>,
    pub waited: Duration,
}

struct MissingSides<'a>(&'a [Polarity]);

impl fmt::Display for MissingSides<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|p| p.as_str()).collect();
        write!(f, "{}", names.join(", "))
    }
}

/// Window-level failures. A failed window is reported and never retried.
#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error(transparent)]
    JoinIncomplete(#[from] JoinIncompleteError),

    #[error("Window {window} durable write failed: {source}")]
    Sink {
        window: WindowId,
        #[source]
        source: SinkError,
    },

    #[error("Window {window} stage task failed: {reason}")]
    TaskFailed { window: WindowId, reason: String },

    #[error("Window {window} cannot move from {from} to {to}")]
    InvalidTransition {
        window: WindowId,
        from: WindowPhase,
        to: WindowPhase,
    },
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
