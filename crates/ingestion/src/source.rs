//! Sample Source
//!
//! Wraps the vendor API: given a time range and an optional sensor filter it
//! yields enriched samples. Large ranges are fetched as sequential slices with
//! a delay between requests. Each [`SampleSource::fetch`] is independent.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, instrument, warn};

use contracts::{
    Batch, ContractError, GatewayInfo, Sample, SamplePage, SampleQuery, SensorId, SensorInfo,
    ShutdownSignal, SourceConfig, TimeRange, VendorApi,
};

use crate::credentials::CredentialManager;
use crate::enrich::Enricher;
use crate::metrics::IngestionMetrics;
use crate::slicing::slices;

pub struct SampleSource<A> {
    credentials: Arc<CredentialManager<A>>,
    enricher: Enricher,
    slice: chrono::Duration,
    request_delay: Duration,
    sample_limit: u32,
    voltage_records: bool,
    metrics: Arc<IngestionMetrics>,
}

impl<A: VendorApi> SampleSource<A> {
    pub fn new(credentials: Arc<CredentialManager<A>>, config: &SourceConfig) -> Self {
        Self {
            credentials,
            enricher: Enricher::from_config(config),
            slice: config.slice.as_chrono(),
            request_delay: config.request_delay.as_duration(),
            sample_limit: config.sample_limit,
            voltage_records: config.voltage_records,
            metrics: Arc::new(IngestionMetrics::new()),
        }
    }

    pub fn enricher(&self) -> &Enricher {
        &self.enricher
    }

    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Start a fetch over `range`
    ///
    /// Nothing is requested until the first [`SampleFetch::next_slice`].
    pub fn fetch(&self, range: TimeRange, filter: Option<&[SensorId]>) -> SampleFetch<'_, A> {
        SampleFetch {
            source: self,
            range,
            filter: filter.filter(|ids| !ids.is_empty()).map(<[SensorId]>::to_vec),
            slices: slices(range, self.slice).into(),
            sensors: None,
            shutdown: ShutdownSignal::never(),
            requests: 0,
            voltage_done: !self.voltage_records,
        }
    }

    /// Sensors visible to the account
    pub async fn sensors(&self) -> Result<Vec<SensorInfo>, ContractError> {
        let api = self.credentials.api().clone();
        self.authorized(move |token| {
            let api = api.clone();
            async move { api.list_sensors(&token).await }
        })
        .await
    }

    /// Gateways visible to the account
    pub async fn gateways(&self) -> Result<Vec<GatewayInfo>, ContractError> {
        let api = self.credentials.api().clone();
        self.authorized(move |token| {
            let api = api.clone();
            async move { api.list_gateways(&token).await }
        })
        .await
    }

    async fn samples(&self, query: &SampleQuery) -> Result<SamplePage, ContractError> {
        let api = self.credentials.api().clone();
        self.authorized(move |token| {
            let api = api.clone();
            let query = query.clone();
            async move { api.list_samples(&token, &query).await }
        })
        .await
    }

    /// Run `call` with the current token; on 401 refresh once and repeat
    async fn authorized<T, F, Fut>(&self, mut call: F) -> Result<T, ContractError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, ContractError>>,
    {
        let token = self.credentials.current_token().await?;
        match call(token.clone()).await {
            Err(ContractError::AuthExpired) => {
                warn!("access token rejected, forcing refresh");
                let fresh = self.credentials.force_refresh(&token).await?;
                self.metrics.record_auth_retry();
                match call(fresh).await {
                    Err(ContractError::AuthExpired) => Err(ContractError::source_rejected(
                        401,
                        "access token rejected again after refresh",
                    )),
                    other => other,
                }
            }
            other => other,
        }
    }
}

/// Samples of one slice
#[derive(Debug, Clone)]
pub struct FetchedSlice {
    pub range: TimeRange,
    pub samples: Vec<Sample>,
    pub dropped: usize,
    pub truncated: bool,
    /// Set when the page was truncated: samples at or after this instant were
    /// not all returned and have been left out
    pub complete_until: Option<DateTime<Utc>>,
}

/// Everything a drained fetch produced
#[derive(Debug, Clone, Default)]
pub struct FetchedBatch {
    pub batch: Batch,
    /// Readings dropped as malformed
    pub dropped: usize,
    /// Sample requests issued
    pub requests: u32,
    /// End of the contiguous data fetched, when a truncated page cut the
    /// range short
    pub complete_until: Option<DateTime<Utc>>,
}

impl FetchedBatch {
    /// How far `range` was actually covered
    pub fn covered_until(&self, range: &TimeRange) -> DateTime<Utc> {
        self.complete_until.map_or(range.end, |t| t.min(range.end))
    }
}

/// Cursor over the slices of one fetch
pub struct SampleFetch<'a, A> {
    source: &'a SampleSource<A>,
    range: TimeRange,
    filter: Option<Vec<SensorId>>,
    slices: VecDeque<TimeRange>,
    sensors: Option<BTreeMap<SensorId, SensorInfo>>,
    shutdown: ShutdownSignal,
    requests: u32,
    voltage_done: bool,
}

impl<A: VendorApi> SampleFetch<'_, A> {
    /// Abort between slices once shutdown is requested
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn remaining_slices(&self) -> usize {
        self.slices.len()
    }

    /// Fetch the next slice, `None` once the range is exhausted
    ///
    /// A failed slice stays queued, so calling again retries it.
    pub async fn next_slice(&mut self) -> Option<Result<FetchedSlice, ContractError>> {
        let slice = self.slices.pop_front()?;

        let proceed = if self.requests > 0 && !self.source.request_delay.is_zero() {
            debug!(
                delay_ms = self.source.request_delay.as_millis() as u64,
                "waiting before next request"
            );
            self.shutdown.sleep(self.source.request_delay).await
        } else {
            !self.shutdown.is_triggered()
        };
        if !proceed {
            self.slices.push_front(slice);
            return Some(Err(ContractError::Cancelled));
        }

        let is_last = self.slices.is_empty();
        let result = self.fetch_slice(slice, is_last).await;
        if result.is_err() {
            self.slices.push_front(slice);
        }
        Some(result)
    }

    /// Drain every slice into one timestamp-ordered batch
    ///
    /// Stops after a truncated slice; later slices are left for the next
    /// fetch starting at `complete_until`.
    pub async fn collect(mut self) -> Result<FetchedBatch, ContractError> {
        let mut samples = Vec::new();
        let mut dropped = 0;
        let mut complete_until = None;
        while let Some(slice) = self.next_slice().await {
            let slice = slice?;
            dropped += slice.dropped;
            samples.extend(slice.samples);
            if slice.complete_until.is_some() {
                complete_until = slice.complete_until;
                break;
            }
        }
        Ok(FetchedBatch {
            batch: Batch::new(samples),
            dropped,
            requests: self.requests,
            complete_until,
        })
    }

    async fn load_sensors(&mut self) -> Result<(), ContractError> {
        if self.sensors.is_none() {
            let list = self.source.sensors().await?;
            debug!(count = list.len(), "sensor list loaded");
            self.sensors = Some(list.into_iter().map(|s| (s.id.clone(), s)).collect());
        }
        Ok(())
    }

    #[instrument(
        name = "source_fetch_slice",
        skip(self),
        fields(range_start = %slice.start, range_end = %slice.end)
    )]
    async fn fetch_slice(
        &mut self,
        slice: TimeRange,
        is_last: bool,
    ) -> Result<FetchedSlice, ContractError> {
        self.load_sensors().await?;

        let query = SampleQuery {
            start: slice.start,
            stop: slice.end,
            sensors: self.filter.clone(),
            limit: self.source.sample_limit,
        };
        let page = self.source.samples(&query).await?;
        self.requests += 1;
        self.source.metrics.record_request();

        let enricher = &self.source.enricher;
        let sensors = self.sensors.as_ref();
        let mut samples = Vec::new();
        let mut dropped = 0;
        let mut latest: BTreeMap<&SensorId, DateTime<Utc>> = BTreeMap::new();
        let limit = self.source.sample_limit as usize;
        let mut cut = Vec::new();

        for (id, readings) in &page.readings {
            if page.truncated && readings.len() >= limit {
                cut.push(id);
            }
            let name = sensors
                .and_then(|s| s.get(id))
                .map_or(id.as_str(), |info| info.name.as_str());

            for raw in readings {
                match enricher.enrich(id, name, raw) {
                    // Slice boundaries belong to the later slice.
                    Ok(sample) if sample.timestamp < slice.start => {}
                    Ok(sample) if sample.timestamp > slice.end => {}
                    Ok(sample) if !is_last && sample.timestamp == slice.end => {}
                    Ok(sample) => {
                        let last = latest.entry(id).or_insert(sample.timestamp);
                        *last = (*last).max(sample.timestamp);
                        samples.push(sample);
                    }
                    Err(err) => {
                        dropped += 1;
                        warn!(sensor_id = %id, error = %err, "dropping malformed reading");
                    }
                }
            }
        }

        // The cut sensor whose readings end first bounds what is known
        // complete. Readings from that instant on are fetched again next time.
        let complete_until = if page.truncated {
            let bounded = cut.iter().filter_map(|id| latest.get(id)).min().copied();
            let horizon = bounded
                .or_else(|| latest.values().min().copied())
                .unwrap_or(slice.start);
            let before = samples.len();
            samples.retain(|s| s.timestamp < horizon);
            self.source.metrics.record_truncated();
            warn!(
                total_samples = page.total_samples,
                limit = self.source.sample_limit,
                complete_until = %horizon,
                deferred = before - samples.len(),
                "sample response truncated, stopping at the last complete reading"
            );
            Some(horizon)
        } else {
            None
        };

        if !self.voltage_done {
            self.voltage_done = true;
            if let Some(sensors) = sensors {
                let filter = self.filter.as_deref();
                samples.extend(
                    sensors
                        .values()
                        .filter(|info| filter.is_none_or(|ids| ids.contains(&info.id)))
                        .map(|info| enricher.voltage_sample(info, self.range.end)),
                );
            }
        }

        self.source.metrics.record_samples(samples.len());
        self.source.metrics.record_dropped(dropped);
        counter!("sensorpushd_samples_fetched_total").increment(samples.len() as u64);
        if dropped > 0 {
            counter!("sensorpushd_samples_dropped_total", "reason" => "malformed")
                .increment(dropped as u64);
        }
        debug!(samples = samples.len(), dropped, "slice fetched");

        Ok(FetchedSlice {
            range: slice,
            samples,
            dropped,
            truncated: page.truncated,
            complete_until,
        })
    }
}
