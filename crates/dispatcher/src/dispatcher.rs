//! Dispatcher - fan-out of one batch to every configured backend

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, instrument, warn};

use contracts::{BackendConfig, Batch, RetryConfig, RetryPolicy, ShutdownSignal, SinkOutcome};

use crate::error::DispatcherError;
use crate::handle::{SinkHandle, SinkOptions};
use crate::metrics::MetricsSnapshot;
use crate::sinks::{DryRunSink, LineProtocolSink};

/// Extra wait on top of the worst-case write time
const DEADLINE_SLACK: Duration = Duration::from_secs(30);

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Backends to write to
    pub backends: Vec<BackendConfig>,
    /// In-cycle retry settings
    pub retry: RetryConfig,
    /// Log line protocol instead of sending it
    pub dry_run: bool,
    /// Log every dry-run line
    pub verbose: bool,
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    shutdown: ShutdownSignal,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new(config: DispatcherConfig, shutdown: ShutdownSignal) -> Self {
        Self { config, shutdown }
    }

    /// Build sinks and start their workers
    #[instrument(
        name = "dispatcher_builder_build",
        skip(self),
        fields(sink_count = self.config.backends.len(), dry_run = self.config.dry_run)
    )]
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        if self.config.backends.is_empty() {
            return Err(DispatcherError::NoBackends);
        }

        let mut handles = Vec::with_capacity(self.config.backends.len());
        for backend in &self.config.backends {
            handles.push(create_sink_handle(backend, &self.config, self.shutdown.clone())?);
        }
        info!(sinks = handles.len(), "Dispatcher ready");
        Ok(Dispatcher { handles })
    }
}

/// Worst-case time for all attempts of one write, plus slack
fn reply_deadline(timeout: Duration, policy: &RetryPolicy) -> Duration {
    let attempts = policy.max_attempts.unwrap_or(1);
    let longest_delay = policy.max.mul_f64(1.0 + policy.jitter);
    timeout * attempts + longest_delay * attempts.saturating_sub(1) + DEADLINE_SLACK
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(backend, config, shutdown),
    fields(sink = %backend.name, kind = %backend.kind)
)]
fn create_sink_handle(
    backend: &BackendConfig,
    config: &DispatcherConfig,
    shutdown: ShutdownSignal,
) -> Result<SinkHandle, DispatcherError> {
    let policy = config.retry.sink_policy();
    let options = SinkOptions::new(policy, reply_deadline(backend.timeout.as_duration(), &policy))
        .required(backend.required);

    if config.dry_run {
        // still validates the endpoint settings
        LineProtocolSink::from_config(backend)?;
        let sink = DryRunSink::new(&backend.name).verbose(config.verbose);
        return Ok(SinkHandle::spawn(sink, options, shutdown));
    }

    let sink = LineProtocolSink::from_config(backend)?;
    debug!(sink = %backend.name, endpoint = %sink.endpoint(), "sink created");
    Ok(SinkHandle::spawn(sink, options, shutdown))
}

/// Restrict configured backends to the named subset
///
/// An empty `names` selects every backend. Unknown names are an error.
pub fn select_backends(
    backends: &[BackendConfig],
    names: &[String],
) -> Result<Vec<BackendConfig>, DispatcherError> {
    if names.is_empty() {
        return Ok(backends.to_vec());
    }
    names
        .iter()
        .map(|name| {
            backends
                .iter()
                .find(|b| &b.name == name)
                .cloned()
                .ok_or_else(|| DispatcherError::UnknownBackend {
                    name: name.clone(),
                    known: backends
                        .iter()
                        .map(|b| b.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                })
        })
        .collect()
}

/// Fans out batches to independent sink workers
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
}

impl Dispatcher {
    /// Create a dispatcher with custom sink handles (for testing)
    pub fn with_handles(handles: Vec<SinkHandle>) -> Self {
        Self { handles }
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.handles.iter().map(|h| h.name().to_string()).collect()
    }

    /// Sinks whose failure holds back the global watermark
    pub fn required_sinks(&self) -> Vec<String> {
        self.handles
            .iter()
            .filter(|h| h.is_required())
            .map(|h| h.name().to_string())
            .collect()
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Deliver `batch` to every sink and collect one outcome per sink
    ///
    /// A sink with an entry in `cutoffs` only receives samples stamped at or
    /// after it. All sinks are submitted before any reply is awaited, so a
    /// slow or failing sink never delays the others.
    #[instrument(
        name = "dispatcher_dispatch",
        skip(self, batch, cutoffs),
        fields(samples = batch.len(), sinks = self.handles.len())
    )]
    pub async fn dispatch(
        &self,
        batch: &Batch,
        cutoffs: &BTreeMap<String, DateTime<Utc>>,
    ) -> BTreeMap<String, SinkOutcome> {
        let started = Instant::now();
        let mut outcomes = BTreeMap::new();
        let mut pending = Vec::with_capacity(self.handles.len());

        for handle in &self.handles {
            let cutoff = cutoffs.get(handle.name()).copied();
            let slice = batch.since(cutoff);
            if slice.len() != batch.len() {
                debug!(
                    sink = %handle.name(),
                    skipped = batch.len() - slice.len(),
                    "samples already delivered to this sink"
                );
            }
            match handle.submit(slice) {
                Ok(reply) => pending.push((handle, reply)),
                Err(outcome) => {
                    outcomes.insert(handle.name().to_string(), outcome);
                }
            }
        }

        for (handle, reply) in pending {
            let deadline = handle.deadline();
            let outcome = match timeout_at(started + deadline, reply).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => {
                    error!(sink = %handle.name(), "sink worker stopped unexpectedly");
                    SinkOutcome::Transient {
                        message: "sink worker stopped unexpectedly".into(),
                        attempts: 0,
                    }
                }
                Err(_) => {
                    warn!(
                        sink = %handle.name(),
                        deadline_ms = deadline.as_millis() as u64,
                        "no reply before deadline"
                    );
                    SinkOutcome::Transient {
                        message: format!("no reply within {}s", deadline.as_secs()),
                        attempts: 0,
                    }
                }
            };
            outcomes.insert(handle.name().to_string(), outcome);
        }

        outcomes
    }

    /// Let every worker finish its queue, then close the sinks
    #[instrument(name = "dispatcher_shutdown", skip(self))]
    pub async fn shutdown(self) {
        for handle in self.handles {
            handle.shutdown().await;
        }
        info!("Dispatcher shutdown complete");
    }
}

/// Convenience function to create a dispatcher from configuration
#[instrument(name = "dispatcher_create", skip(config, shutdown))]
pub fn create_dispatcher(
    config: DispatcherConfig,
    shutdown: ShutdownSignal,
) -> Result<Dispatcher, DispatcherError> {
    DispatcherBuilder::new(config, shutdown).build()
}
