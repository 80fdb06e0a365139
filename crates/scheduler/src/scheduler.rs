//! Scheduler - cycle state machine, daemon loop and one-shot runs

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use contracts::{
    ContractError, CycleOutcome, CycleStatus, DaemonBlueprint, RetryPolicy, SensorId,
    ShutdownSignal, SinkOutcome, TimeRange, VendorApi, WatermarkScope,
};
use dispatcher::Dispatcher;
use ingestion::{Clock, SampleSource, SystemClock};
use observability::{record_backoff, record_cycle_outcome, record_watermark_lag, CycleStatsAggregator};

use crate::error::SchedulerError;
use crate::gap_tracker::GapTracker;

/// Scheduler state, published for observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Fetching,
    Dispatching,
    UpdatingWatermark,
    BackingOff,
    Terminating,
}

impl SchedulerState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Dispatching => "dispatching",
            Self::UpdatingWatermark => "updating_watermark",
            Self::BackingOff => "backing_off",
            Self::Terminating => "terminating",
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Sleep between daemon cycles
    pub interval: Duration,
    /// Backoff after a transient source failure
    pub cycle_policy: RetryPolicy,
    /// Cycle attempts of a one-shot run
    pub oneshot_attempts: u32,
    /// Time granted to an in-flight cycle after shutdown
    pub shutdown_grace: Duration,
    /// Sensor filter (empty = all)
    pub sensors: Vec<SensorId>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            cycle_policy: RetryPolicy::default(),
            oneshot_attempts: 3,
            shutdown_grace: Duration::from_secs(30),
            sensors: Vec::new(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_blueprint(blueprint: &DaemonBlueprint) -> Self {
        Self {
            interval: blueprint.daemon.interval.as_duration(),
            cycle_policy: blueprint.retry.cycle_policy(),
            oneshot_attempts: blueprint.retry.oneshot_attempts,
            shutdown_grace: blueprint.daemon.shutdown_grace.as_duration(),
            sensors: blueprint.source.sensors.clone(),
        }
    }
}

/// Result of one cycle plus the source error that ended it, if any
struct CycleRun {
    outcome: CycleOutcome,
    source_error: Option<ContractError>,
}

/// Drives fetch -> dispatch -> watermark update
pub struct Scheduler<A> {
    source: SampleSource<A>,
    dispatcher: Dispatcher,
    tracker: GapTracker,
    config: SchedulerConfig,
    scope: WatermarkScope,
    shutdown: ShutdownSignal,
    clock: Arc<dyn Clock>,
    state: watch::Sender<SchedulerState>,
    cycle_id: u64,
    stats: CycleStatsAggregator,
}

impl<A: VendorApi> Scheduler<A> {
    pub fn new(
        source: SampleSource<A>,
        dispatcher: Dispatcher,
        tracker: GapTracker,
        config: SchedulerConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        let scope = WatermarkScope::for_sensors(Some(&config.sensors));
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            source,
            dispatcher,
            tracker,
            config,
            scope,
            shutdown,
            clock: Arc::new(SystemClock),
            state,
            cycle_id: 0,
            stats: CycleStatsAggregator::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Watermark scope of this scheduler (global or the sensor filter)
    pub fn scope(&self) -> &WatermarkScope {
        &self.scope
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Outcomes of every cycle run so far
    pub fn stats(&self) -> &CycleStatsAggregator {
        &self.stats
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Global watermark, or the one of `backend`
    pub fn watermark(&mut self, backend: Option<&str>) -> Result<Option<DateTime<Utc>>, ContractError> {
        match backend {
            Some(name) => self.tracker.watermark(&self.scope.for_backend(name)),
            None => self.tracker.watermark(&self.scope),
        }
    }

    /// Range the next daemon cycle would fetch
    pub fn next_range(&mut self) -> Result<TimeRange, ContractError> {
        let now = self.clock.now();
        self.tracker.next_range(&self.scope, now)
    }

    fn set_state(&self, state: SchedulerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = previous.label(), to = state.label(), "scheduler state");
        }
    }

    fn global_watermark(&mut self) -> Option<DateTime<Utc>> {
        self.tracker.watermark(&self.scope).ok().flatten()
    }

    /// Each sink's own progress, used to suppress resends
    fn backend_cutoffs(&mut self) -> BTreeMap<String, DateTime<Utc>> {
        let mut cutoffs = BTreeMap::new();
        for name in self.dispatcher.sink_names() {
            match self.tracker.watermark(&self.scope.for_backend(&name)) {
                Ok(Some(watermark)) => {
                    cutoffs.insert(name, watermark);
                }
                Ok(None) => {}
                Err(e) => warn!(sink = %name, error = %e, "cannot read backend watermark, sending everything"),
            }
        }
        cutoffs
    }

    /// One fetch-dispatch-update cycle over `range`
    pub async fn run_once(&mut self, range: TimeRange) -> CycleOutcome {
        self.run_cycle(range).await.outcome
    }

    #[instrument(
        name = "scheduler_cycle",
        skip(self),
        fields(cycle = self.cycle_id + 1, range_start = %range.start, range_end = %range.end)
    )]
    async fn run_cycle(&mut self, range: TimeRange) -> CycleRun {
        self.cycle_id += 1;
        let cycle_id = self.cycle_id;
        let started = Instant::now();

        self.set_state(SchedulerState::Fetching);
        let fetched = self
            .source
            .fetch(range, self.scope.sensors())
            .with_shutdown(self.shutdown.clone())
            .collect()
            .await;

        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(err) => {
                let watermark = self.global_watermark();
                let outcome = if matches!(err, ContractError::Cancelled) {
                    CycleOutcome::cancelled(cycle_id, range, started.elapsed(), watermark)
                } else {
                    CycleOutcome::source_failed(
                        cycle_id,
                        range,
                        started.elapsed(),
                        err.to_string(),
                        err.is_transient(),
                        watermark,
                    )
                };
                self.finish(&outcome);
                return CycleRun {
                    outcome,
                    source_error: Some(err),
                };
            }
        };

        self.set_state(SchedulerState::Dispatching);
        let cutoffs = self.backend_cutoffs();
        let per_backend = self.dispatcher.dispatch(&fetched.batch, &cutoffs).await;

        self.set_state(SchedulerState::UpdatingWatermark);
        let now = self.clock.now();
        let covered = fetched.covered_until(&range);
        let mut store_error = None;

        for (name, outcome) in &per_backend {
            if !outcome.is_success() {
                continue;
            }
            if let Err(e) = self.tracker.advance(&self.scope.for_backend(name), covered, now) {
                store_error.get_or_insert(e.to_string());
            }
        }

        let required_ok = self
            .dispatcher
            .required_sinks()
            .iter()
            .all(|name| per_backend.get(name).is_some_and(SinkOutcome::is_success));
        if required_ok {
            if let Err(e) = self.tracker.advance(&self.scope, covered, now) {
                store_error.get_or_insert(e.to_string());
            }
        }

        let watermark = self.global_watermark();
        if let Some(watermark) = watermark {
            let lag = (now - watermark).num_milliseconds() as f64 / 1000.0;
            record_watermark_lag(&self.scope.key(), lag);
        }

        let backend_error = per_backend
            .iter()
            .find_map(|(name, outcome)| match outcome {
                SinkOutcome::Delivered { .. } => None,
                SinkOutcome::Transient { message, .. } | SinkOutcome::Permanent { message } => {
                    Some(format!("{name}: {message}"))
                }
            });
        let sink_dropped = per_backend
            .values()
            .filter_map(|outcome| match outcome {
                SinkOutcome::Delivered { dropped, .. } => Some(*dropped),
                _ => None,
            })
            .max()
            .unwrap_or(0);

        let delivered = backend_error.is_none() && store_error.is_none();
        let retryable =
            per_backend.values().any(SinkOutcome::is_transient) || store_error.is_some();

        let outcome = CycleOutcome {
            cycle_id,
            range,
            status: if delivered {
                CycleStatus::Delivered
            } else {
                CycleStatus::Partial
            },
            samples: fetched.batch.len(),
            dropped: fetched.dropped + sink_dropped,
            per_backend,
            elapsed: started.elapsed(),
            error: store_error
                .map(|e| format!("watermark not saved: {e}"))
                .or(backend_error),
            retryable,
            watermark,
        };
        self.finish(&outcome);
        CycleRun {
            outcome,
            source_error: None,
        }
    }

    /// Emit the outcome exactly once
    fn finish(&mut self, outcome: &CycleOutcome) {
        record_cycle_outcome(outcome);
        self.stats.update(outcome);
        self.set_state(SchedulerState::Idle);
    }

    /// Run cycles until shutdown
    ///
    /// Transient source failures back off and retry from the same watermark
    /// without limit. Anything else waits for the next interval. Only watermark
    /// read failures end the loop with an error.
    #[instrument(name = "scheduler_run_daemon", skip(self), fields(scope = %self.scope))]
    pub async fn run_daemon(&mut self) -> Result<(), SchedulerError> {
        info!(
            interval_s = self.config.interval.as_secs(),
            sinks = ?self.dispatcher.sink_names(),
            "daemon started"
        );

        let mut attempt = 0u32;
        loop {
            if self.shutdown.is_triggered() {
                break;
            }

            let range = self.next_range()?;
            let run = {
                let mut grace_signal = self.shutdown.clone();
                let grace = self.config.shutdown_grace;
                let cycle = self.run_cycle(range);
                tokio::pin!(cycle);
                tokio::select! {
                    run = &mut cycle => Some(run),
                    _ = async {
                        grace_signal.wait().await;
                        tokio::time::sleep(grace).await;
                    } => None,
                }
            };
            let Some(run) = run else {
                warn!(
                    grace_s = self.config.shutdown_grace.as_secs(),
                    "grace period elapsed, abandoning in-flight cycle"
                );
                break;
            };

            let wait = match run.outcome.status {
                CycleStatus::Cancelled => break,
                CycleStatus::SourceFailed if run.outcome.retryable => {
                    attempt += 1;
                    let delay = match &run.source_error {
                        Some(err) => self.config.cycle_policy.delay_for_error(attempt, err),
                        None => self.config.cycle_policy.delay_for(attempt),
                    };
                    let reason = run.source_error.as_ref().map_or("source", ContractError::kind);
                    record_backoff(reason, delay);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "source failed, retrying the same range after backoff"
                    );
                    self.set_state(SchedulerState::BackingOff);
                    delay
                }
                CycleStatus::SourceFailed => {
                    attempt = 0;
                    warn!("source rejected the request, waiting for the next interval");
                    self.config.interval
                }
                CycleStatus::Delivered | CycleStatus::Partial => {
                    attempt = 0;
                    self.config.interval
                }
            };

            if !self.shutdown.sleep(wait).await {
                break;
            }
        }

        self.set_state(SchedulerState::Terminating);
        info!(cycles = self.cycle_id, "daemon stopped");
        Ok(())
    }

    /// Run `range` with bounded attempts
    ///
    /// Retries transient source failures and cycles where a backend failed
    /// transiently; backends that already succeeded are not written again.
    #[instrument(
        name = "scheduler_run_oneshot",
        skip(self),
        fields(range_start = %range.start, range_end = %range.end)
    )]
    pub async fn run_oneshot(&mut self, range: TimeRange) -> Result<CycleOutcome, SchedulerError> {
        let policy = self
            .config
            .cycle_policy
            .with_max_attempts(self.config.oneshot_attempts);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let run = self.run_cycle(range).await;
            let outcome = run.outcome;

            match outcome.status {
                CycleStatus::Delivered => return Ok(outcome),
                CycleStatus::Cancelled => return Err(SchedulerError::Cancelled),
                CycleStatus::SourceFailed | CycleStatus::Partial if !outcome.retryable => {
                    return Err(SchedulerError::Permanent {
                        message: outcome.error.unwrap_or_default(),
                    });
                }
                CycleStatus::SourceFailed | CycleStatus::Partial => {}
            }

            let last_error = outcome.error.unwrap_or_default();
            if !policy.allows_retry_after(attempt) {
                return Err(SchedulerError::RetriesExhausted {
                    attempts: attempt,
                    last_error,
                });
            }

            let delay = match &run.source_error {
                Some(err) => policy.delay_for_error(attempt, err),
                None => policy.delay_for(attempt),
            };
            record_backoff("oneshot", delay);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "cycle failed, retrying"
            );
            self.set_state(SchedulerState::BackingOff);
            if !self.shutdown.sleep(delay).await {
                return Err(SchedulerError::Cancelled);
            }
        }
    }

    /// Drain the sink workers
    pub async fn close(self) {
        self.dispatcher.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryWatermarkStore;
    use chrono::TimeZone;
    use contracts::{ApiConfig, BackendSink, Batch, Shutdown, SourceConfig, Span, WriteReport};
    use dispatcher::{SinkHandle, SinkOptions};
    use ingestion::{CredentialManager, ManualClock};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use vendor_client::{MockFailure, MockVendorApi};

    struct TestSink {
        name: String,
        online: Arc<AtomicBool>,
        received: Arc<Mutex<Vec<Batch>>>,
        delay: Duration,
    }

    impl BackendSink for TestSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&mut self, batch: &Batch) -> Result<WriteReport, ContractError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if !self.online.load(Ordering::SeqCst) {
                return Err(ContractError::backend_transient(&self.name, "connection refused"));
            }
            self.received.lock().unwrap().push(batch.clone());
            Ok(WriteReport {
                written: batch.len(),
                dropped: 0,
            })
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    struct Harness {
        api: Arc<MockVendorApi>,
        clock: Arc<ManualClock>,
        online: Arc<AtomicBool>,
        received: Arc<Mutex<Vec<Batch>>>,
        scheduler: Scheduler<MockVendorApi>,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn harness(shutdown: ShutdownSignal) -> Harness {
        harness_with(shutdown, Duration::ZERO, Duration::from_secs(30))
    }

    /// Every write takes `write_delay`; the daemon waits `grace` after shutdown
    fn harness_with(shutdown: ShutdownSignal, write_delay: Duration, grace: Duration) -> Harness {
        let api = Arc::new(MockVendorApi::new().with_sensor("1.1", "Garage"));
        let clock = Arc::new(ManualClock::new(start()));
        let api_config = ApiConfig {
            login: "me".into(),
            password: "pw".into(),
            base_url: "http://mock".into(),
            token_ttl: Span::from_mins(60),
            token_safety_margin: Span::from_mins(5),
            timeout: Span::from_secs(5),
            verify_tls: true,
        };
        let credentials = Arc::new(CredentialManager::new(Arc::clone(&api), &api_config));
        let source_config = SourceConfig {
            request_delay: Span::from_secs(0),
            voltage_records: false,
            ..Default::default()
        };
        let source = SampleSource::new(credentials, &source_config);

        let online = Arc::new(AtomicBool::new(true));
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = TestSink {
            name: "influx".into(),
            online: Arc::clone(&online),
            received: Arc::clone(&received),
            delay: write_delay,
        };
        let options = SinkOptions::new(
            RetryPolicy::new(Duration::from_millis(10), Duration::from_millis(10))
                .with_jitter(0.0)
                .with_max_attempts(1),
            Duration::from_secs(5),
        );
        let dispatcher = Dispatcher::with_handles(vec![SinkHandle::spawn(sink, options, shutdown.clone())]);

        let tracker = GapTracker::new(
            Box::new(MemoryWatermarkStore::new()),
            chrono::Duration::minutes(60),
            chrono::Duration::days(30),
        );
        let config = SchedulerConfig {
            interval: Duration::from_secs(300),
            cycle_policy: RetryPolicy::new(Duration::from_secs(10), Duration::from_secs(60))
                .with_jitter(0.0),
            oneshot_attempts: 2,
            shutdown_grace: grace,
            ..Default::default()
        };
        let scheduler = Scheduler::new(source, dispatcher, tracker, config, shutdown)
            .with_clock(clock.clone());

        Harness {
            api,
            clock,
            online,
            received,
            scheduler,
        }
    }

    #[tokio::test]
    async fn test_successful_cycle_advances_watermark() {
        let mut h = harness(ShutdownSignal::never());
        h.api.push_temperature("1.1", start() - chrono::Duration::minutes(30), 68.0);

        let range = h.scheduler.next_range().unwrap();
        let outcome = h.scheduler.run_once(range).await;

        assert_eq!(outcome.status, CycleStatus::Delivered);
        assert_eq!(outcome.samples, 1);
        assert_eq!(outcome.watermark, Some(start()));
        assert_eq!(h.scheduler.watermark(Some("influx")).unwrap(), Some(start()));
        assert_eq!(h.scheduler.state(), SchedulerState::Idle);
        assert_eq!(h.scheduler.stats().delivered, 1);
    }

    #[tokio::test]
    async fn test_source_failure_keeps_watermark() {
        let mut h = harness(ShutdownSignal::never());
        h.api.fail_next_samples(MockFailure::Unavailable);

        let range = h.scheduler.next_range().unwrap();
        let outcome = h.scheduler.run_once(range).await;

        assert_eq!(outcome.status, CycleStatus::SourceFailed);
        assert!(outcome.retryable);
        assert_eq!(h.scheduler.watermark(None).unwrap(), None);
        assert!(h.received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_holds_global_watermark() {
        let mut h = harness(ShutdownSignal::never());
        h.online.store(false, Ordering::SeqCst);

        let range = h.scheduler.next_range().unwrap();
        let outcome = h.scheduler.run_once(range).await;

        assert_eq!(outcome.status, CycleStatus::Partial);
        assert_eq!(outcome.failed_backends(), vec!["influx"]);
        assert_eq!(h.scheduler.watermark(None).unwrap(), None);
        assert_eq!(h.scheduler.next_range().unwrap().start, range.start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oneshot_retries_then_gives_up() {
        let mut h = harness(ShutdownSignal::never());
        h.api.fail_next_samples(MockFailure::Unavailable);
        h.api.fail_next_samples(MockFailure::Unavailable);

        let range = TimeRange::trailing(start(), chrono::Duration::minutes(60));
        let err = h.scheduler.run_oneshot(range).await.unwrap_err();
        assert!(matches!(err, SchedulerError::RetriesExhausted { attempts: 2, .. }), "got: {err}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_oneshot_recovers_on_second_attempt() {
        let mut h = harness(ShutdownSignal::never());
        h.api.fail_next_samples(MockFailure::Unavailable);
        h.api.push_temperature("1.1", start() - chrono::Duration::minutes(5), 70.0);

        let range = TimeRange::trailing(start(), chrono::Duration::minutes(60));
        let outcome = h.scheduler.run_oneshot(range).await.unwrap();
        assert_eq!(outcome.samples, 1);
        assert_eq!(h.scheduler.stats().total_cycles, 2);
    }

    #[tokio::test]
    async fn test_oneshot_permanent_source_error() {
        let mut h = harness(ShutdownSignal::never());
        h.api.fail_next_samples(MockFailure::Rejected(400));

        let range = TimeRange::trailing(start(), chrono::Duration::minutes(60));
        let err = h.scheduler.run_oneshot(range).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Permanent { .. }), "got: {err}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_daemon_stops_on_shutdown_during_sleep() {
        let shutdown = Shutdown::new();
        let mut h = harness(shutdown.signal());
        let mut states = h.scheduler.subscribe_state();

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            shutdown.trigger();
        });

        h.scheduler.run_daemon().await.unwrap();
        trigger.await.unwrap();

        assert_eq!(h.scheduler.stats().total_cycles, 1);
        assert_eq!(*states.borrow_and_update(), SchedulerState::Terminating);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_lets_slow_write_finish_within_grace() {
        let shutdown = Shutdown::new();
        let mut h = harness_with(shutdown.signal(), Duration::from_secs(3), Duration::from_secs(10));
        h.api.push_temperature("1.1", start() - chrono::Duration::minutes(30), 68.0);

        let trigger = tokio::spawn(async move {
            // lands while the write is in flight
            tokio::time::sleep(Duration::from_secs(1)).await;
            shutdown.trigger();
        });

        let began = tokio::time::Instant::now();
        h.scheduler.run_daemon().await.unwrap();
        trigger.await.unwrap();

        assert!(began.elapsed() < Duration::from_secs(10));
        assert_eq!(h.received.lock().unwrap().len(), 1);
        assert_eq!(h.scheduler.watermark(None).unwrap(), Some(start()));
        assert_eq!(h.scheduler.stats().delivered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_hanging_past_grace_is_abandoned() {
        let shutdown = Shutdown::new();
        let mut h = harness_with(shutdown.signal(), Duration::from_secs(60), Duration::from_secs(2));
        h.api.push_temperature("1.1", start() - chrono::Duration::minutes(30), 68.0);

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            shutdown.trigger();
        });

        let began = tokio::time::Instant::now();
        h.scheduler.run_daemon().await.unwrap();
        trigger.await.unwrap();

        // trigger plus grace, well before the 5s sink deadline
        let elapsed = began.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "returned after {elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "returned after {elapsed:?}");
        assert!(h.received.lock().unwrap().is_empty());
        assert_eq!(h.scheduler.watermark(None).unwrap(), None);
        assert_eq!(h.scheduler.watermark(Some("influx")).unwrap(), None);
        assert_eq!(h.scheduler.stats().total_cycles, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_daemon_backfills_after_source_outage() {
        let shutdown = Shutdown::new();
        let mut h = harness(shutdown.signal());
        h.api.fail_next_samples(MockFailure::Unavailable);
        let first_start = h.scheduler.next_range().unwrap().start;

        let clock = Arc::clone(&h.clock);
        let trigger = tokio::spawn(async move {
            // after the backoff retry, before the next interval
            tokio::time::sleep(Duration::from_secs(30)).await;
            clock.advance(chrono::Duration::seconds(30));
            tokio::time::sleep(Duration::from_secs(30)).await;
            shutdown.trigger();
        });

        h.scheduler.run_daemon().await.unwrap();
        trigger.await.unwrap();

        let queries = h.api.sample_queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].start, first_start);
        assert_eq!(queries[1].start, first_start);
        assert_eq!(h.scheduler.stats().source_failed, 1);
        assert_eq!(h.scheduler.stats().delivered, 1);
    }
}
