//! CycleOutcome - result of one poll cycle
//!
//! Produced by the Scheduler, consumed by the Gap Tracker update, the retry
//! decision and observability. Discarded afterwards.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::TimeRange;

/// Per-backend result of one dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SinkOutcome {
    /// Batch accepted; `dropped` malformed samples were skipped
    Delivered {
        samples: usize,
        dropped: usize,
        attempts: u32,
    },
    /// Network/5xx/timeout after all in-cycle attempts
    Transient { message: String, attempts: u32 },
    /// Backend refused the batch
    Permanent { message: String },
}

impl SinkOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => "delivered",
            Self::Transient { .. } => "transient",
            Self::Permanent { .. } => "permanent",
        }
    }
}

/// Overall cycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    /// Every backend accepted the batch
    Delivered,
    /// At least one backend failed
    Partial,
    /// Nothing was dispatched because the source failed
    SourceFailed,
    /// Shutdown interrupted the cycle before dispatch
    Cancelled,
}

impl CycleStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Partial => "partial",
            Self::SourceFailed => "source_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Result of one fetch-dispatch-update cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    pub cycle_id: u64,
    pub range: TimeRange,
    pub status: CycleStatus,
    /// Samples fetched from the source
    pub samples: usize,
    /// Samples dropped as malformed (by the source or any backend)
    pub dropped: usize,
    pub per_backend: BTreeMap<String, SinkOutcome>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    /// Source error or first backend error, for logging
    pub error: Option<String>,
    /// Whether repeating the cycle can help (transient source or backend failure)
    pub retryable: bool,
    /// Global watermark after the update step
    pub watermark: Option<DateTime<Utc>>,
}

impl CycleOutcome {
    /// Outcome for a cycle whose fetch failed
    pub fn source_failed(
        cycle_id: u64,
        range: TimeRange,
        elapsed: Duration,
        error: String,
        retryable: bool,
        watermark: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            cycle_id,
            range,
            status: CycleStatus::SourceFailed,
            samples: 0,
            dropped: 0,
            per_backend: BTreeMap::new(),
            elapsed,
            error: Some(error),
            retryable,
            watermark,
        }
    }

    /// Outcome for a cycle stopped by shutdown before dispatch
    pub fn cancelled(
        cycle_id: u64,
        range: TimeRange,
        elapsed: Duration,
        watermark: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            status: CycleStatus::Cancelled,
            error: None,
            retryable: false,
            ..Self::source_failed(cycle_id, range, elapsed, String::new(), false, watermark)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CycleStatus::Delivered
    }

    /// Backends that did not accept the batch
    pub fn failed_backends(&self) -> Vec<&str> {
        self.per_backend
            .iter()
            .filter(|(_, o)| !o.is_success())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
