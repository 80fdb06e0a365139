//! Sample / Batch - Sample Source output, Dispatcher input
//!
//! A `Sample` is one point destined for a time-series backend. It is built
//! once by the Sample Source and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::SensorId;

/// Tag key carrying the sensor id
pub const TAG_SENSOR_ID: &str = "sensor_id";
/// Tag key carrying the human readable sensor name
pub const TAG_SENSOR_NAME: &str = "sensor_name";

/// One enriched reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub sensor_id: SensorId,
    pub sensor_name: String,
    pub timestamp: DateTime<Utc>,
    /// Measurement name, e.g. `SensorPush` or `SensorPush_V`
    pub measurement: String,
    /// Always contains [`TAG_SENSOR_ID`] and [`TAG_SENSOR_NAME`]
    pub tags: BTreeMap<String, String>,
    /// Only the fields applicable to the measurement are present
    pub fields: BTreeMap<String, f64>,
}

impl Sample {
    /// Create a sample with the mandatory identity tags and no fields
    pub fn new(
        sensor_id: SensorId,
        sensor_name: impl Into<String>,
        measurement: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let sensor_name = sensor_name.into();
        let mut tags = BTreeMap::new();
        tags.insert(TAG_SENSOR_ID.to_string(), sensor_id.to_string());
        tags.insert(TAG_SENSOR_NAME.to_string(), sensor_name.clone());
        Self {
            sensor_id,
            sensor_name,
            timestamp,
            measurement: measurement.into(),
            tags,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insertion
    pub fn with_field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Builder-style tag insertion
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Timestamp in nanoseconds since the Unix epoch
    ///
    /// Instants outside the i64 nanosecond range (years before 1677 or after
    /// 2262) yield `None`.
    pub fn timestamp_ns(&self) -> Option<i64> {
        self.timestamp.timestamp_nanos_opt()
    }
}

/// Ordered group of samples for one delivery attempt
///
/// Kept timestamp-ascending so backends ingest sequentially.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    samples: Vec<Sample>,
}

impl Batch {
    /// Build a batch, sorting by timestamp (stable)
    pub fn new(mut samples: Vec<Sample>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        Self { samples }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append another slice of samples, keeping the order invariant
    pub fn extend(&mut self, more: Vec<Sample>) {
        self.samples.extend(more);
        self.samples.sort_by_key(|s| s.timestamp);
    }

    /// Samples stamped at or after `cutoff`
    ///
    /// `None` means no cutoff: the whole batch is returned.
    pub fn since(&self, cutoff: Option<DateTime<Utc>>) -> Batch {
        match cutoff {
            None => self.clone(),
            Some(cutoff) => {
                let start = self.samples.partition_point(|s| s.timestamp < cutoff);
                Batch {
                    samples: self.samples[start..].to_vec(),
                }
            }
        }
    }

    /// Latest timestamp in the batch
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.samples.last().map(|s| s.timestamp)
    }
}

impl FromIterator<Sample> for Batch {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Batch::new(iter.into_iter().collect())
    }
}
