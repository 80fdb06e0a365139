//! End-to-end scenarios: MockVendorApi -> SampleSource -> Scheduler -> Dispatcher

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use chrono::Duration;
use contracts::{
    BackendKind, Batch, CycleStatus, RawReading, RetryConfig, Sample, ShutdownSignal, SinkOutcome,
    SourceConfig, TimeRange,
};
use dispatcher::{create_dispatcher, Dispatcher, DispatcherConfig, DryRunSink, SinkHandle};
use ingestion::{Clock, CredentialManager, ManualClock, SampleSource};
use vendor_client::MockFailure;

use crate::support::*;

fn push_three(api: &vendor_client::MockVendorApi) {
    for (minutes, fahrenheit) in [(50, 68.0), (30, 69.8), (10, 71.6)] {
        api.push_temperature(SENSOR, now0() - Duration::minutes(minutes), fahrenheit);
    }
}

#[tokio::test]
async fn test_backlog_cycle_delivers_identical_batches() {
    let mut h = harness(&["influx", "vm"]);
    push_three(&h.api);

    let range = h.scheduler.next_range().unwrap();
    assert_eq!(range, TimeRange::trailing(now0(), Duration::minutes(60)));

    let outcome = h.scheduler.run_once(range).await;
    assert_eq!(outcome.status, CycleStatus::Delivered);
    assert_eq!(outcome.samples, 3);
    assert_eq!(outcome.watermark, Some(now0()));

    let influx = h.sinks["influx"].batches();
    let vm = h.sinks["vm"].batches();
    assert_eq!(influx.len(), 1);
    assert_eq!(influx[0].len(), 3);
    assert_eq!(influx, vm);
    assert_eq!(h.sinks["influx"].lines(), h.sinks["vm"].lines());

    // ascending and tagged with the sensor identity
    let samples = influx[0].samples();
    assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert!(samples.iter().all(|s| s.tags["sensor_name"] == SENSOR_NAME));
    assert_eq!(samples[0].fields["temperature"], 20.0);
}

#[tokio::test]
async fn test_dry_run_computes_batch_without_writes() {
    let api = api();
    push_three(&api);
    let clock = Arc::new(ManualClock::new(now0()));

    let dispatcher = create_dispatcher(
        DispatcherConfig {
            backends: vec![
                backend("influx", BackendKind::InfluxDb2),
                backend("vm", BackendKind::VictoriaMetrics),
            ],
            retry: RetryConfig::default(),
            dry_run: true,
            verbose: true,
        },
        ShutdownSignal::never(),
    )
    .unwrap();
    let mut scheduler = scheduler(&api, dispatcher, &clock);

    let range = scheduler.next_range().unwrap();
    let outcome = scheduler.run_once(range).await;

    // a real write to 127.0.0.1:9 would have failed
    assert_eq!(outcome.status, CycleStatus::Delivered);
    assert_eq!(outcome.samples, 3);
    assert_eq!(outcome.watermark, Some(now0()));
    for name in ["influx", "vm"] {
        assert_eq!(
            outcome.per_backend[name],
            SinkOutcome::Delivered {
                samples: 3,
                dropped: 0,
                attempts: 1
            }
        );
    }
    let written: u64 = scheduler
        .dispatcher()
        .metrics()
        .iter()
        .map(|(_, m)| m.samples_written)
        .sum();
    assert_eq!(written, 6);
    scheduler.close().await;
}

#[tokio::test]
async fn test_dry_run_logs_what_a_backend_would_receive() {
    let mut h = harness(&["influx"]);
    push_three(&h.api);
    let range = h.scheduler.next_range().unwrap();
    assert!(h.scheduler.run_once(range).await.is_success());

    // same readings, dry-run sink in place of the wire
    let api = api();
    push_three(&api);
    let clock = Arc::new(ManualClock::new(now0()));
    let transcript = Arc::new(Mutex::new(Vec::new()));
    let sink = DryRunSink::new("influx").with_transcript(transcript.clone());
    let dispatcher = Dispatcher::with_handles(vec![SinkHandle::spawn(
        sink,
        sink_options(),
        ShutdownSignal::never(),
    )]);
    let mut dry = scheduler(&api, dispatcher, &clock);

    let range = dry.next_range().unwrap();
    let outcome = dry.run_once(range).await;
    assert_eq!(outcome.status, CycleStatus::Delivered);
    assert_eq!(outcome.watermark, Some(now0()));

    let logged = transcript.lock().unwrap().clone();
    assert_eq!(logged.len(), 3);
    assert_eq!(logged, h.sinks["influx"].lines());
    dry.close().await;
}

#[tokio::test]
async fn test_recovered_backend_gets_one_consolidated_batch() {
    let mut h = harness(&["influx", "vm"]);

    // cycle 0 establishes both watermarks
    h.api.push_temperature(SENSOR, now0() - Duration::minutes(2), 70.0);
    let range = h.scheduler.next_range().unwrap();
    assert!(h.scheduler.run_once(range).await.is_success());

    h.sinks["vm"].set_online(false);
    let mut missed = Vec::new();
    for cycle in 1..=3 {
        h.clock.advance(Duration::minutes(5));
        let at = h.clock.now() - Duration::minutes(2);
        h.api.push_temperature(SENSOR, at, 70.0 + cycle as f64);
        missed.push(at);

        if cycle == 3 {
            h.sinks["vm"].set_online(true);
        }
        let range = h.scheduler.next_range().unwrap();
        // global watermark held at the last full delivery
        assert_eq!(range.start, now0());

        let outcome = h.scheduler.run_once(range).await;
        if cycle < 3 {
            assert_eq!(outcome.status, CycleStatus::Partial);
            assert_eq!(outcome.failed_backends(), vec!["vm"]);
            assert_eq!(outcome.watermark, Some(now0()));
        } else {
            assert_eq!(outcome.status, CycleStatus::Delivered);
            assert_eq!(outcome.watermark, Some(h.clock.now()));
        }
    }

    let vm = h.sinks["vm"].batches();
    assert_eq!(vm.len(), 2, "one batch before the outage, one after");
    let consolidated: Vec<_> = vm[1].samples().iter().map(|s| s.timestamp).collect();
    assert_eq!(consolidated, missed);

    // influx got every reading exactly once
    let influx = h.sinks["influx"].batches();
    assert_eq!(influx.len(), 4);
    assert!(influx.iter().all(|b| b.len() == 1));
    let unique: BTreeSet<_> = influx
        .iter()
        .flat_map(|b| b.samples().iter().map(|s| s.timestamp))
        .collect();
    assert_eq!(unique.len(), 4);
}

#[tokio::test]
async fn test_no_resend_to_backend_that_already_succeeded() {
    let mut h = harness(&["influx", "vm"]);
    push_three(&h.api);
    h.sinks["vm"].set_online(false);

    let range = h.scheduler.next_range().unwrap();
    let first = h.scheduler.run_once(range).await;
    assert_eq!(first.status, CycleStatus::Partial);
    assert_eq!(h.scheduler.watermark(None).unwrap(), None);
    assert_eq!(h.scheduler.watermark(Some("influx")).unwrap(), Some(now0()));

    // same range again once vm is back
    h.sinks["vm"].set_online(true);
    let retry = h.scheduler.next_range().unwrap();
    assert_eq!(retry, range);
    let second = h.scheduler.run_once(retry).await;

    assert_eq!(second.status, CycleStatus::Delivered);
    assert_eq!(
        second.per_backend["influx"],
        SinkOutcome::Delivered {
            samples: 0,
            dropped: 0,
            attempts: 0
        }
    );
    assert_eq!(h.sinks["influx"].batches().len(), 1);
    assert_eq!(h.sinks["vm"].batches()[0].len(), 3);
    assert_eq!(h.scheduler.watermark(None).unwrap(), Some(now0()));
}

#[tokio::test]
async fn test_failed_cycle_leaves_watermark_unchanged() {
    let mut h = harness(&["influx", "vm"]);
    let range = h.scheduler.next_range().unwrap();
    h.scheduler.run_once(range).await;
    let before = h.scheduler.watermark(None).unwrap();
    assert_eq!(before, Some(now0()));

    // source down
    h.clock.advance(Duration::minutes(5));
    h.api.fail_next_samples(MockFailure::Unavailable);
    let range = h.scheduler.next_range().unwrap();
    let outcome = h.scheduler.run_once(range).await;
    assert_eq!(outcome.status, CycleStatus::SourceFailed);
    assert!(outcome.retryable);
    assert_eq!(h.scheduler.watermark(None).unwrap(), before);
    assert_eq!(h.scheduler.watermark(Some("vm")).unwrap(), before);

    // every backend down
    h.api.push_temperature(SENSOR, h.clock.now() - Duration::minutes(1), 70.0);
    for recorder in h.sinks.values() {
        recorder.set_online(false);
    }
    let range = h.scheduler.next_range().unwrap();
    let outcome = h.scheduler.run_once(range).await;
    assert_eq!(outcome.status, CycleStatus::Partial);
    assert_eq!(h.scheduler.watermark(None).unwrap(), before);
    assert_eq!(h.scheduler.watermark(Some("influx")).unwrap(), before);
    assert_eq!(h.scheduler.next_range().unwrap().start, now0());
}

#[tokio::test]
async fn test_consecutive_cycles_are_contiguous() {
    let mut h = harness(&["influx"]);
    let mut previous: Option<TimeRange> = None;

    for _ in 0..6 {
        let range = h.scheduler.next_range().unwrap();
        if let Some(previous) = previous {
            assert_eq!(range.start, previous.end, "gap or overlap between cycles");
        }
        let outcome = h.scheduler.run_once(range).await;
        assert!(outcome.is_success());
        previous = Some(range);
        h.clock.advance(Duration::minutes(5));
    }

    assert_eq!(
        h.scheduler.watermark(None).unwrap(),
        previous.map(|r| r.end)
    );
    assert_eq!(h.scheduler.stats().total_cycles, 6);
}

#[tokio::test]
async fn test_malformed_readings_dropped_rest_delivered() {
    let mut h = harness(&["influx", "vm"]);
    h.api.push_temperature(SENSOR, now0() - Duration::minutes(40), 68.0);
    h.api.push_reading(
        SENSOR,
        RawReading {
            observed: "yesterday".into(),
            temperature: Some(70.0),
            ..Default::default()
        },
    );
    h.api.push_reading(
        SENSOR,
        RawReading {
            observed: (now0() - Duration::minutes(30)).to_rfc3339(),
            ..Default::default()
        },
    );
    h.api.push_temperature(SENSOR, now0() - Duration::minutes(20), 69.0);

    let range = h.scheduler.next_range().unwrap();
    let outcome = h.scheduler.run_once(range).await;

    assert_eq!(outcome.status, CycleStatus::Delivered);
    assert_eq!(outcome.samples, 2);
    assert_eq!(outcome.dropped, 2);
    assert_eq!(h.sinks["influx"].batches()[0].len(), 2);
    assert_eq!(h.sinks["vm"].lines().len(), 2);
    assert_eq!(outcome.watermark, Some(now0()));
}

#[tokio::test]
async fn test_non_numeric_value_drops_only_its_reading() {
    let mut h = harness(&["influx", "vm"]);
    h.api.push_temperature(SENSOR, now0() - Duration::minutes(40), 68.0);
    h.api.push_json(
        SENSOR,
        serde_json::json!({
            "observed": (now0() - Duration::minutes(30)).to_rfc3339(),
            "temperature": "n/a",
            "humidity": 45.0
        }),
    );
    h.api.push_json(
        SENSOR,
        serde_json::json!({
            "observed": (now0() - Duration::minutes(20)).to_rfc3339(),
            "temperature": "69.8",
            "humidity": "45"
        }),
    );

    let range = h.scheduler.next_range().unwrap();
    let outcome = h.scheduler.run_once(range).await;

    assert_eq!(outcome.status, CycleStatus::Delivered);
    assert_eq!(outcome.samples, 2);
    assert_eq!(outcome.dropped, 1);
    assert_eq!(outcome.watermark, Some(now0()));

    let delivered = &h.sinks["influx"].batches()[0];
    let temperatures: Vec<f64> = delivered
        .samples()
        .iter()
        .map(|s| s.fields["temperature"])
        .collect();
    assert_eq!(temperatures, vec![20.0, 21.0]);
    assert_eq!(h.sinks["vm"].lines().len(), 2);
}

#[tokio::test]
async fn test_truncated_response_holds_watermark_at_last_complete_reading() {
    let api = api();
    push_three(&api);
    let clock = Arc::new(ManualClock::new(now0()));
    let (dispatcher, sinks) = wire_dispatcher(&["influx"]);
    let credentials = Arc::new(CredentialManager::new(Arc::clone(&api), &api_config()));
    let limited = SampleSource::new(
        credentials,
        &SourceConfig {
            sample_limit: 2,
            ..source_config()
        },
    );
    let mut scheduler = scheduler_with_source(limited, dispatcher, &clock);

    // three readings, two returned: only the oldest is known complete
    let range = scheduler.next_range().unwrap();
    let outcome = scheduler.run_once(range).await;
    assert_eq!(outcome.status, CycleStatus::Delivered);
    assert_eq!(outcome.samples, 1);
    assert_eq!(outcome.watermark, Some(now0() - Duration::minutes(30)));

    let next = scheduler.next_range().unwrap();
    assert_eq!(next.start, now0() - Duration::minutes(30));
    let outcome = scheduler.run_once(next).await;
    assert_eq!(outcome.samples, 2);
    assert_eq!(outcome.watermark, Some(now0()));

    let delivered: Vec<_> = sinks["influx"]
        .batches()
        .iter()
        .flat_map(|b| b.samples().iter().map(|s| s.timestamp).collect::<Vec<_>>())
        .collect();
    assert_eq!(
        delivered,
        vec![
            now0() - Duration::minutes(50),
            now0() - Duration::minutes(30),
            now0() - Duration::minutes(10),
        ]
    );
    scheduler.close().await;
}

#[tokio::test]
async fn test_non_finite_field_dropped_at_encoding() {
    let (dispatcher, sinks) = wire_dispatcher(&["influx", "vm"]);
    let batch: Batch = (0..3)
        .map(|i| {
            let value = if i == 1 { f64::NAN } else { 20.0 + i as f64 };
            Sample::new(SENSOR.into(), SENSOR_NAME, "SensorPush", now0() + Duration::minutes(i))
                .with_field("temperature", value)
        })
        .collect();

    let outcomes = dispatcher.dispatch(&batch, &BTreeMap::new()).await;
    for name in ["influx", "vm"] {
        assert_eq!(
            outcomes[name],
            SinkOutcome::Delivered {
                samples: 2,
                dropped: 1,
                attempts: 1
            }
        );
        assert_eq!(sinks[name].lines().len(), 2);
    }
    dispatcher.shutdown().await;
}

mod credentials {
    use super::*;

    fn source_with_clock(
        api: &Arc<vendor_client::MockVendorApi>,
        clock: &Arc<ManualClock>,
    ) -> SampleSource<vendor_client::MockVendorApi> {
        let credentials = CredentialManager::new(Arc::clone(api), &api_config())
            .with_clock(clock.clone());
        SampleSource::new(Arc::new(credentials), &source_config())
    }

    fn range() -> TimeRange {
        TimeRange::trailing(now0(), Duration::minutes(60))
    }

    #[tokio::test]
    async fn test_token_refreshed_before_expiry() {
        let api = api();
        push_three(&api);
        // mock tokens expire one hour after the real time of issue
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let source = source_with_clock(&api, &clock);

        source.fetch(range(), None).collect().await.unwrap();
        assert_eq!(api.auth_calls(), 1);

        clock.advance(Duration::minutes(50));
        source.fetch(range(), None).collect().await.unwrap();
        assert_eq!(api.auth_calls(), 1, "token still fresh");

        // inside the 5 minute safety margin
        clock.advance(Duration::minutes(6));
        let fetched = source.fetch(range(), None).collect().await.unwrap();
        assert_eq!(fetched.batch.len(), 3);
        assert_eq!(api.auth_calls(), 2);
        assert_eq!(api.sample_queries().len(), 3, "no request was rejected");
        assert_eq!(source.metrics().snapshot().auth_retries, 0);
    }

    #[tokio::test]
    async fn test_rejected_token_refreshed_and_request_retried_once() {
        let api = api();
        push_three(&api);
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let source = source_with_clock(&api, &clock);

        api.fail_next_samples(MockFailure::AuthExpired);
        let fetched = source.fetch(range(), None).collect().await.unwrap();

        assert_eq!(fetched.batch.len(), 3);
        assert_eq!(api.auth_calls(), 2, "initial token plus one forced refresh");
        assert_eq!(api.sample_queries().len(), 2, "original request repeated once");
        assert_eq!(source.metrics().snapshot().auth_retries, 1);
    }

    #[tokio::test]
    async fn test_second_rejection_is_not_retried_again() {
        let api = api();
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let source = source_with_clock(&api, &clock);

        api.fail_next_samples(MockFailure::AuthExpired);
        api.fail_next_samples(MockFailure::AuthExpired);
        let err = source.fetch(range(), None).collect().await.unwrap_err();

        assert!(!err.is_transient(), "got: {err}");
        assert_eq!(api.sample_queries().len(), 2);
    }
}
