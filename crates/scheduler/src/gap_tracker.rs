//! Gap Tracker - watermark bookkeeping and next-range computation

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument, warn};

use contracts::{ContractError, TimeRange, WatermarkScope, WatermarkStore};

/// Watermarks per scope, read through a durable store
///
/// Single writer: only the scheduler task owns the tracker.
pub struct GapTracker {
    store: Box<dyn WatermarkStore>,
    cache: HashMap<String, Option<DateTime<Utc>>>,
    initial_backlog: Duration,
    max_lookback: Duration,
}

impl GapTracker {
    /// `initial_backlog` is the first range when a scope has no watermark;
    /// no range ever starts earlier than `max_lookback` before now.
    pub fn new(store: Box<dyn WatermarkStore>, initial_backlog: Duration, max_lookback: Duration) -> Self {
        Self {
            store,
            cache: HashMap::new(),
            initial_backlog,
            max_lookback,
        }
    }

    /// Current watermark of `scope`
    pub fn watermark(&mut self, scope: &WatermarkScope) -> Result<Option<DateTime<Utc>>, ContractError> {
        let key = scope.key();
        if let Some(cached) = self.cache.get(&key) {
            return Ok(*cached);
        }
        let value = self.store.get(&key)?;
        self.cache.insert(key, value);
        Ok(value)
    }

    /// Range of the next poll: from the watermark to `now`
    #[instrument(name = "gap_tracker_next_range", skip(self), fields(scope = %scope))]
    pub fn next_range(
        &mut self,
        scope: &WatermarkScope,
        now: DateTime<Utc>,
    ) -> Result<TimeRange, ContractError> {
        let floor = now - self.max_lookback;
        let start = match self.watermark(scope)? {
            Some(watermark) if watermark < floor => {
                warn!(
                    watermark = %watermark,
                    floor = %floor,
                    "watermark older than max lookback, skipping the oldest data"
                );
                floor
            }
            Some(watermark) => watermark.min(now),
            None => {
                let start = (now - self.initial_backlog).max(floor);
                debug!(start = %start, "no watermark yet, using initial backlog");
                start
            }
        };
        Ok(TimeRange::new(start, now))
    }

    /// Move the watermark of `scope` forward to `to` (clamped to `now`)
    ///
    /// Returns whether it moved. Backward or equal moves are ignored. The new
    /// value is persisted before it becomes visible.
    #[instrument(name = "gap_tracker_advance", skip(self), fields(scope = %scope))]
    pub fn advance(
        &mut self,
        scope: &WatermarkScope,
        to: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, ContractError> {
        let to = to.min(now);
        if let Some(current) = self.watermark(scope)? {
            if to <= current {
                debug!(current = %current, requested = %to, "watermark not moved");
                return Ok(false);
            }
        }

        let key = scope.key();
        self.store.set(&key, to)?;
        self.cache.insert(key, Some(to));
        debug!(watermark = %to, "watermark advanced");
        Ok(true)
    }
}
