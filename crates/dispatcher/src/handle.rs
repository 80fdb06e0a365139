//! SinkHandle - one backend sink behind its own queue and worker task

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use metrics::{counter, histogram};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{BackendSink, Batch, ContractError, RetryPolicy, ShutdownSignal, SinkOutcome};

use crate::metrics::SinkMetrics;

/// Per-sink delivery settings
#[derive(Debug, Clone)]
pub struct SinkOptions {
    /// In-cycle retry of transient failures (`max_attempts` bounds the tries)
    pub policy: RetryPolicy,
    /// How long a dispatch waits for this sink's reply
    pub deadline: Duration,
    /// Whether this sink holds back the global watermark
    pub required: bool,
    /// Queued batches before new ones are refused
    pub queue_capacity: usize,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::new(Duration::from_secs(5), Duration::from_secs(300))
                .with_max_attempts(2),
            deadline: Duration::from_secs(120),
            required: true,
            queue_capacity: 4,
        }
    }
}

impl SinkOptions {
    pub fn new(policy: RetryPolicy, deadline: Duration) -> Self {
        Self {
            policy,
            deadline,
            ..Default::default()
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

struct SinkRequest {
    batch: Batch,
    reply: oneshot::Sender<SinkOutcome>,
}

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    /// Delivery settings
    options: SinkOptions,
    /// Channel to send batches to worker
    tx: mpsc::Sender<SinkRequest>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    ///
    /// `shutdown` interrupts retry backoff; a write already in progress is
    /// always allowed to finish.
    pub fn spawn<S: BackendSink + Send + 'static>(
        sink: S,
        options: SinkOptions,
        shutdown: ShutdownSignal,
    ) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_policy = options.policy;
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_policy, shutdown, worker_name).await;
        });

        Self {
            name,
            options,
            tx,
            metrics,
            worker_handle,
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.options.required
    }

    pub fn deadline(&self) -> Duration {
        self.options.deadline
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue a batch (non-blocking)
    ///
    /// Returns the reply channel, or the failure outcome when the worker is
    /// busy or gone.
    pub fn submit(&self, batch: Batch) -> Result<oneshot::Receiver<SinkOutcome>, SinkOutcome> {
        let (reply, rx) = oneshot::channel();
        match self.tx.try_send(SinkRequest { batch, reply }) {
            Ok(()) => Ok(rx),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(sink = %self.name, "sink still busy with earlier batches");
                Err(SinkOutcome::Transient {
                    message: "sink queue full, earlier writes still in progress".into(),
                    attempts: 0,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "sink worker closed unexpectedly");
                Err(SinkOutcome::Transient {
                    message: "sink worker stopped".into(),
                    attempts: 0,
                })
            }
        }
    }

    /// Shutdown the sink worker gracefully
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        // Drop sender to signal worker to stop
        drop(self.tx);
        // Wait for worker to finish
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Worker task that consumes batches and writes to sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics, policy, shutdown),
    fields(sink = %name)
)]
async fn sink_worker<S: BackendSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<SinkRequest>,
    metrics: Arc<SinkMetrics>,
    policy: RetryPolicy,
    mut shutdown: ShutdownSignal,
    name: String,
) {
    debug!(sink = %name, "sink worker started");

    while let Some(request) = rx.recv().await {
        let outcome = deliver(&mut sink, &request.batch, &policy, &metrics, &mut shutdown, &name).await;
        // the dispatcher may have given up waiting
        if request.reply.send(outcome).is_err() {
            debug!(sink = %name, "reply dropped, dispatch already timed out");
        }
    }

    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "close failed on shutdown");
    }
    debug!(sink = %name, "sink worker stopped");
}

async fn deliver<S: BackendSink>(
    sink: &mut S,
    batch: &Batch,
    policy: &RetryPolicy,
    metrics: &SinkMetrics,
    shutdown: &mut ShutdownSignal,
    name: &str,
) -> SinkOutcome {
    if batch.is_empty() {
        return SinkOutcome::Delivered {
            samples: 0,
            dropped: 0,
            attempts: 0,
        };
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        let started = Instant::now();

        // a panicking write fails this attempt only, the worker keeps the sink
        let result = match AssertUnwindSafe(sink.write(batch)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic_reason(panic.as_ref());
                error!(sink = %name, attempt, reason = %reason, "sink panicked during write");
                Err(ContractError::backend_transient(
                    name,
                    format!("sink panicked: {reason}"),
                ))
            }
        };

        match result {
            Ok(report) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                metrics.record_write(report.written, report.dropped, latency_ms);
                counter!("sensorpushd_sink_writes_total", "sink" => name.to_string(), "status" => "delivered")
                    .increment(1);
                histogram!("sensorpushd_sink_write_latency_ms", "sink" => name.to_string())
                    .record(latency_ms as f64);
                if report.dropped > 0 {
                    counter!("sensorpushd_samples_dropped_total", "reason" => "encoding")
                        .increment(report.dropped as u64);
                }
                debug!(sink = %name, written = report.written, attempt, latency_ms, "batch delivered");
                return SinkOutcome::Delivered {
                    samples: report.written,
                    dropped: report.dropped,
                    attempts: attempt,
                };
            }
            Err(err) if err.is_transient() => {
                metrics.inc_failure_count();
                counter!("sensorpushd_sink_writes_total", "sink" => name.to_string(), "status" => "transient")
                    .increment(1);

                let outcome = SinkOutcome::Transient {
                    message: err.to_string(),
                    attempts: attempt,
                };
                if !policy.allows_retry_after(attempt) || shutdown.is_triggered() {
                    warn!(sink = %name, attempt, error = %err, "write failed, giving up for this cycle");
                    return outcome;
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    sink = %name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "write failed, retrying"
                );
                if !shutdown.sleep(delay).await {
                    return outcome;
                }
            }
            Err(err) => {
                metrics.inc_failure_count();
                counter!("sensorpushd_sink_writes_total", "sink" => name.to_string(), "status" => "permanent")
                    .increment(1);
                error!(sink = %name, error = %err, "backend rejected batch");
                return SinkOutcome::Permanent {
                    message: err.to_string(),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use contracts::{ContractError, Sample, Shutdown, WriteReport};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Sink that replays scripted results, then succeeds
    struct ScriptedSink {
        name: String,
        script: Mutex<VecDeque<Result<(), ContractError>>>,
        calls: Arc<AtomicU32>,
        /// Writes that panic before the script is consulted
        panics: u32,
    }

    impl ScriptedSink {
        fn new(name: &str, script: Vec<Result<(), ContractError>>) -> (Self, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            let sink = Self {
                name: name.to_string(),
                script: Mutex::new(script.into()),
                calls: Arc::clone(&calls),
                panics: 0,
            };
            (sink, calls)
        }
    }

    impl BackendSink for ScriptedSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&mut self, batch: &Batch) -> Result<WriteReport, ContractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panics > 0 {
                self.panics -= 1;
                panic!("sink exploded");
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or(Ok(()))?;
            Ok(WriteReport {
                written: batch.len(),
                dropped: 0,
            })
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    fn batch() -> Batch {
        Batch::new(vec![Sample::new(
            "1.1".into(),
            "Garage",
            "SensorPush",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
        .with_field("temperature", 20.0)])
    }

    fn options(attempts: u32) -> SinkOptions {
        SinkOptions::new(
            RetryPolicy::new(Duration::from_secs(5), Duration::from_secs(60))
                .with_jitter(0.0)
                .with_max_attempts(attempts),
            Duration::from_secs(120),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retried_within_cycle() {
        let (sink, calls) = ScriptedSink::new(
            "influx",
            vec![Err(ContractError::backend_transient("influx", "503"))],
        );
        let handle = SinkHandle::spawn(sink, options(2), ShutdownSignal::never());

        let outcome = handle.submit(batch()).unwrap().await.unwrap();
        assert_eq!(
            outcome,
            SinkOutcome::Delivered {
                samples: 1,
                dropped: 0,
                attempts: 2
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(handle.metrics().failure_count(), 1);
        assert_eq!(handle.metrics().write_count(), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_exhausted_is_transient() {
        let (sink, calls) = ScriptedSink::new(
            "vm",
            vec![
                Err(ContractError::backend_transient("vm", "refused")),
                Err(ContractError::backend_transient("vm", "refused")),
            ],
        );
        let handle = SinkHandle::spawn(sink, options(2), ShutdownSignal::never());

        let outcome = handle.submit(batch()).unwrap().await.unwrap();
        assert!(matches!(outcome, SinkOutcome::Transient { attempts: 2, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_not_retried() {
        let (sink, calls) = ScriptedSink::new(
            "influx",
            vec![Err(ContractError::backend_permanent("influx", "400 bad line"))],
        );
        let handle = SinkHandle::spawn(sink, options(3), ShutdownSignal::never());

        let outcome = handle.submit(batch()).unwrap().await.unwrap();
        assert!(matches!(outcome, SinkOutcome::Permanent { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_backoff() {
        let (sink, calls) = ScriptedSink::new(
            "influx",
            vec![Err(ContractError::backend_transient("influx", "503"))],
        );
        let shutdown = Shutdown::new();
        let slow = SinkOptions::new(
            RetryPolicy::new(Duration::from_secs(3600), Duration::from_secs(3600))
                .with_jitter(0.0)
                .with_max_attempts(5),
            Duration::from_secs(7200),
        );
        let handle = SinkHandle::spawn(sink, slow, shutdown.signal());

        let reply = handle.submit(batch()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown.trigger();

        let outcome = reply.await.unwrap();
        assert!(matches!(outcome, SinkOutcome::Transient { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_write_fails_attempt_and_worker_survives() {
        let (mut sink, calls) = ScriptedSink::new("boom", vec![]);
        sink.panics = 1;
        let handle = SinkHandle::spawn(sink, options(1), ShutdownSignal::never());

        let outcome = handle.submit(batch()).unwrap().await.unwrap();
        match outcome {
            SinkOutcome::Transient { message, attempts } => {
                assert_eq!(attempts, 1);
                assert!(message.contains("sink exploded"), "got: {message}");
            }
            other => panic!("expected transient outcome, got {other:?}"),
        }

        // same worker, next cycle
        let outcome = handle.submit(batch()).unwrap().await.unwrap();
        assert_eq!(
            outcome,
            SinkOutcome::Delivered {
                samples: 1,
                dropped: 0,
                attempts: 1
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(handle.metrics().failure_count(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_batch_not_written() {
        let (sink, calls) = ScriptedSink::new("influx", vec![]);
        let handle = SinkHandle::spawn(sink, options(1), ShutdownSignal::never());

        let outcome = handle.submit(Batch::empty()).unwrap().await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        handle.shutdown().await;
    }
}
