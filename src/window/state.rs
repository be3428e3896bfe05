//! Window state machine and the events windows report.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::WindowError;
use crate::pipeline::types::WindowId;

/// Phase of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPhase {
    /// Not yet accepting records.
    Idle,
    /// Buffering records until the deadline.
    Open,
    /// Sealed; stages and join in progress.
    Closing,
    /// Handed to the sinks.
    Dispatched,
    /// Join failed; the window produced nothing.
    Abandoned,
    /// Partition shut down after this window.
    Stopped,
}

impl WindowPhase {
    /// Check if a window in this phase may move to `target`.
    pub fn can_transition_to(&self, target: WindowPhase) -> bool {
        use WindowPhase::*;

        matches!(
            (self, target),
            (Idle, Open) | (Idle, Stopped) |
            (Open, Closing) |
            (Closing, Dispatched) | (Closing, Abandoned) |
            (Dispatched, Idle) | (Dispatched, Stopped) |
            (Abandoned, Idle) | (Abandoned, Stopped)
        )
    }

    /// Check if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl std::fmt::Display for WindowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Dispatched => "dispatched",
            Self::Abandoned => "abandoned",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// A recorded phase change.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseTransition {
    pub from: WindowPhase,
    pub to: WindowPhase,
    pub timestamp: DateTime<Utc>,
}

/// Tracks one window from opening to release.
#[derive(Debug, Clone)]
pub struct WindowLifecycle {
    window: WindowId,
    phase: WindowPhase,
    transitions: Vec<PhaseTransition>,
}

impl WindowLifecycle {
    /// Start tracking `window` in the `Idle` phase.
    pub fn new(window: WindowId) -> Self {
        Self {
            window,
            phase: WindowPhase::Idle,
            transitions: Vec::new(),
        }
    }

    /// The tracked window.
    pub fn window(&self) -> WindowId {
        self.window
    }

    /// Current phase.
    pub fn phase(&self) -> WindowPhase {
        self.phase
    }

    /// Every phase change so far, oldest first.
    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    /// Move to `to`, recording the change. Invalid moves leave the phase as is.
    pub fn transition_to(&mut self, to: WindowPhase) -> Result<(), WindowError> {
        if !self.phase.can_transition_to(to) {
            return Err(WindowError::InvalidTransition {
                window: self.window,
                from: self.phase,
                to,
            });
        }
        trace!(window = %self.window, from = %self.phase, to = %to, "Window phase change");
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
        });
        self.phase = to;
        Ok(())
    }
}

/// Outcome of a window, broadcast to observers.
#[derive(Debug, Clone)]
pub enum WindowEvent {
    /// Every durable sink has been tried. Failures follow as `SinkFailed`.
    Dispatched { window: WindowId, records: usize },
    /// Live notifications for a non-empty window finished or hit the deadline.
    Notified {
        window: WindowId,
        delivered: usize,
        failed: usize,
        dropped: usize,
    },
    /// Stages or join did not finish; nothing was emitted for the window.
    Abandoned {
        window: WindowId,
        error: Arc<WindowError>,
    },
    /// A durable sink gave up on the window after retries.
    SinkFailed {
        window: WindowId,
        error: Arc<WindowError>,
    },
}

impl WindowEvent {
    /// The window this event reports on.
    pub fn window(&self) -> WindowId {
        match self {
            Self::Dispatched { window, .. }
            | Self::Notified { window, .. }
            | Self::Abandoned { window, .. }
            | Self::SinkFailed { window, .. } => *window,
        }
    }
}
