//! Shared fixtures: mock vendor, recording sinks, scheduler wiring

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use contracts::{
    ApiConfig, BackendConfig, BackendKind, BackendSink, Batch, ContractError, RetryPolicy,
    ShutdownSignal, SourceConfig, Span, WriteReport,
};
use dispatcher::line_protocol::encode_batch;
use dispatcher::{Dispatcher, SinkHandle, SinkOptions};
use ingestion::{CredentialManager, ManualClock, SampleSource};
use scheduler::{GapTracker, MemoryWatermarkStore, Scheduler, SchedulerConfig};
use vendor_client::MockVendorApi;

pub const SENSOR: &str = "16234567.2384712973412";
pub const SENSOR_NAME: &str = "Serre, nord = ☀";

/// Fixed "now" of every scenario
pub fn now0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn api() -> Arc<MockVendorApi> {
    Arc::new(MockVendorApi::new().with_sensor(SENSOR, SENSOR_NAME))
}

pub fn api_config() -> ApiConfig {
    ApiConfig {
        login: "me@example.com".into(),
        password: "pw".into(),
        base_url: "http://mock".into(),
        token_ttl: Span::from_mins(60),
        token_safety_margin: Span::from_mins(5),
        timeout: Span::from_secs(5),
        verify_tls: true,
    }
}

/// No inter-request delay, no voltage records
pub fn source_config() -> SourceConfig {
    SourceConfig {
        request_delay: Span::from_secs(0),
        voltage_records: false,
        ..Default::default()
    }
}

pub fn source(api: &Arc<MockVendorApi>) -> SampleSource<MockVendorApi> {
    let credentials = Arc::new(CredentialManager::new(Arc::clone(api), &api_config()));
    SampleSource::new(credentials, &source_config())
}

pub fn backend(name: &str, kind: BackendKind) -> BackendConfig {
    BackendConfig {
        name: name.to_string(),
        kind,
        // nothing listens here
        url: "http://127.0.0.1:9".to_string(),
        token: Some("tok".into()),
        org: Some("home".into()),
        bucket: Some("sensors".into()),
        database: Some("sensors".into()),
        verify_tls: true,
        required: true,
        timeout: Span::from_secs(1),
    }
}

/// Observes one [`WireSink`]
#[derive(Clone, Default)]
pub struct SinkRecorder {
    offline: Arc<AtomicBool>,
    batches: Arc<Mutex<Vec<Batch>>>,
    lines: Arc<Mutex<Vec<String>>>,
}

impl SinkRecorder {
    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    /// Batches accepted so far
    pub fn batches(&self) -> Vec<Batch> {
        self.batches.lock().unwrap().clone()
    }

    /// Every line protocol line accepted so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

/// Sink that encodes like a network backend and keeps what it "sent"
pub struct WireSink {
    name: String,
    recorder: SinkRecorder,
}

impl WireSink {
    pub fn new(name: &str) -> (Self, SinkRecorder) {
        let recorder = SinkRecorder::default();
        (
            Self {
                name: name.to_string(),
                recorder: recorder.clone(),
            },
            recorder,
        )
    }
}

impl BackendSink for WireSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, batch: &Batch) -> Result<WriteReport, ContractError> {
        if self.recorder.offline.load(Ordering::SeqCst) {
            return Err(ContractError::backend_transient(&self.name, "connection refused"));
        }
        let encoded = encode_batch(batch);
        self.recorder.batches.lock().unwrap().push(batch.clone());
        self.recorder.lines.lock().unwrap().extend(encoded.lines.iter().cloned());
        Ok(WriteReport {
            written: encoded.lines.len(),
            dropped: encoded.dropped.len(),
        })
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}

/// One attempt per cycle, so a failure shows up immediately
pub fn sink_options() -> SinkOptions {
    SinkOptions::new(
        RetryPolicy::new(Duration::from_millis(10), Duration::from_millis(10))
            .with_jitter(0.0)
            .with_max_attempts(1),
        Duration::from_secs(5),
    )
}

/// Dispatcher over fresh wire sinks, plus their recorders by name
pub fn wire_dispatcher(names: &[&str]) -> (Dispatcher, BTreeMap<String, SinkRecorder>) {
    let mut recorders = BTreeMap::new();
    let mut handles = Vec::new();
    for name in names {
        let (sink, recorder) = WireSink::new(name);
        recorders.insert(name.to_string(), recorder);
        handles.push(SinkHandle::spawn(sink, sink_options(), ShutdownSignal::never()));
    }
    (Dispatcher::with_handles(handles), recorders)
}

/// Scheduler with a 60 minute initial backlog and in-memory watermarks
pub fn scheduler(
    api: &Arc<MockVendorApi>,
    dispatcher: Dispatcher,
    clock: &Arc<ManualClock>,
) -> Scheduler<MockVendorApi> {
    scheduler_with_source(source(api), dispatcher, clock)
}

pub fn scheduler_with_source(
    source: SampleSource<MockVendorApi>,
    dispatcher: Dispatcher,
    clock: &Arc<ManualClock>,
) -> Scheduler<MockVendorApi> {
    let tracker = GapTracker::new(
        Box::new(MemoryWatermarkStore::new()),
        chrono::Duration::minutes(60),
        chrono::Duration::days(30),
    );
    let config = SchedulerConfig {
        cycle_policy: RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(1))
            .with_jitter(0.0),
        ..Default::default()
    };
    Scheduler::new(source, dispatcher, tracker, config, ShutdownSignal::never())
        .with_clock(clock.clone())
}

/// Everything a scenario needs
pub struct Harness {
    pub api: Arc<MockVendorApi>,
    pub clock: Arc<ManualClock>,
    pub sinks: BTreeMap<String, SinkRecorder>,
    pub scheduler: Scheduler<MockVendorApi>,
}

pub fn harness(names: &[&str]) -> Harness {
    let api = api();
    let clock = Arc::new(ManualClock::new(now0()));
    let (dispatcher, sinks) = wire_dispatcher(names);
    let scheduler = scheduler(&api, dispatcher, &clock);
    Harness {
        api,
        clock,
        sinks,
        scheduler,
    }
}
