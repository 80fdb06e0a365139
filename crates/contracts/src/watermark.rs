//! Watermarks - time ranges, scopes and the durable store interface

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ContractError, SensorId};

/// Closed time range `[start, end]` for one poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Range ending at `end` and reaching `span` back
    pub fn trailing(end: DateTime<Utc>, span: chrono::Duration) -> Self {
        Self {
            start: end - span,
            end,
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} .. {}",
            self.start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.end.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        )
    }
}

/// Logical scope a watermark belongs to
///
/// The base scope is either every sensor (`global`) or a sensor filter; it can
/// be narrowed to one backend for per-backend progress.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct WatermarkScope {
    sensors: Option<Vec<SensorId>>,
    backend: Option<String>,
}

impl WatermarkScope {
    pub fn global() -> Self {
        Self::default()
    }

    /// Scope for an optional sensor filter; an empty filter is global
    pub fn for_sensors(filter: Option<&[SensorId]>) -> Self {
        let sensors = filter.filter(|ids| !ids.is_empty()).map(|ids| {
            let mut ids = ids.to_vec();
            ids.sort();
            ids.dedup();
            ids
        });
        Self {
            sensors,
            backend: None,
        }
    }

    /// Same base scope narrowed to one backend
    pub fn for_backend(&self, backend: &str) -> Self {
        Self {
            sensors: self.sensors.clone(),
            backend: Some(backend.to_string()),
        }
    }

    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    pub fn sensors(&self) -> Option<&[SensorId]> {
        self.sensors.as_deref()
    }

    /// Canonical key used by [`WatermarkStore`]
    pub fn key(&self) -> String {
        let mut key = match &self.sensors {
            None => "global".to_string(),
            Some(ids) => {
                let joined: Vec<&str> = ids.iter().map(SensorId::as_str).collect();
                format!("sensors={}", joined.join("+"))
            }
        };
        if let Some(backend) = &self.backend {
            key.push_str("/backend=");
            key.push_str(backend);
        }
        key
    }
}

impl fmt::Display for WatermarkScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Durable watermark storage, keyed by [`WatermarkScope::key`]
///
/// Only the Gap Tracker calls this, from the scheduler task.
pub trait WatermarkStore: Send {
    fn get(&self, key: &str) -> Result<Option<DateTime<Utc>>, ContractError>;

    /// Must be atomic: after an error the previous value is still readable
    fn set(&mut self, key: &str, watermark: DateTime<Utc>) -> Result<(), ContractError>;
}
