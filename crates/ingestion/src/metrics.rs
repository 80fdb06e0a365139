//! Ingestion counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Ingestion metrics
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Upstream sample requests issued
    pub requests: AtomicU64,

    /// Samples produced after enrichment
    pub samples: AtomicU64,

    /// Readings dropped as malformed
    pub dropped: AtomicU64,

    /// Responses cut off at the sample limit
    pub truncated_pages: AtomicU64,

    /// Requests repeated after a forced token refresh
    pub auth_retries: AtomicU64,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_samples(&self, count: usize) {
        self.samples.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: usize) {
        self.dropped.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_truncated(&self) {
        self.truncated_pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auth_retry(&self) {
        self.auth_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            truncated_pages: self.truncated_pages.load(Ordering::Relaxed),
            auth_retries: self.auth_retries.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub samples: u64,
    pub dropped: u64,
    pub truncated_pages: u64,
    pub auth_retries: u64,
}
