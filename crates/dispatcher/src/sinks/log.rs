//! DryRunSink - encodes like a network sink and logs instead of sending

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use contracts::{BackendSink, Batch, ContractError, WriteReport};
use tracing::{info, instrument, warn};

use crate::line_protocol::{encode_batch, parse_line};

/// Lines logged per batch unless verbose
pub const PREVIEW_LINES: usize = 5;

/// Sink that logs the line protocol it would have sent
pub struct DryRunSink {
    name: String,
    verbose: bool,
    lines_seen: Arc<AtomicU64>,
    transcript: Option<Arc<Mutex<Vec<String>>>>,
}

impl DryRunSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verbose: false,
            lines_seen: Arc::new(AtomicU64::new(0)),
            transcript: None,
        }
    }

    /// Log every line instead of a preview
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Also append every encoded line to `transcript`
    pub fn with_transcript(mut self, transcript: Arc<Mutex<Vec<String>>>) -> Self {
        self.transcript = Some(transcript);
        self
    }

    /// Shared counter of lines "written" so far
    pub fn lines_seen(&self) -> Arc<AtomicU64> {
        self.lines_seen.clone()
    }
}

impl BackendSink for DryRunSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "dry_run_sink_write",
        skip(self, batch),
        fields(sink = %self.name, samples = batch.len())
    )]
    async fn write(&mut self, batch: &Batch) -> Result<WriteReport, ContractError> {
        let encoded = encode_batch(batch);
        for err in &encoded.dropped {
            warn!(sink = %self.name, error = %err, "malformed sample would be dropped");
        }

        let shown = if self.verbose {
            encoded.lines.len()
        } else {
            PREVIEW_LINES
        };
        for (i, line) in encoded.lines.iter().enumerate() {
            if let Err(reason) = parse_line(line) {
                warn!(sink = %self.name, line = %line, reason = %reason, "line does not parse back");
            }
            if i < shown {
                info!(sink = %self.name, "{line}");
            }
        }
        if encoded.lines.len() > shown {
            info!(
                sink = %self.name,
                hidden = encoded.lines.len() - shown,
                "more lines omitted, use -v to show all"
            );
        }

        if let Some(transcript) = &self.transcript {
            transcript
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(encoded.lines.iter().cloned());
        }
        self.lines_seen
            .fetch_add(encoded.lines.len() as u64, Ordering::Relaxed);
        Ok(WriteReport {
            written: encoded.lines.len(),
            dropped: encoded.dropped.len(),
        })
    }

    #[instrument(name = "dry_run_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(
            sink = %self.name,
            lines = self.lines_seen.load(Ordering::Relaxed),
            "DryRunSink closed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use contracts::Sample;

    fn batch(n: i64) -> Batch {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                Sample::new("1.1".into(), "Garage", "SensorPush", start + Duration::minutes(i))
                    .with_field("temperature", 20.0 + i as f64)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_dry_run_counts_lines() {
        let mut sink = DryRunSink::new("influx");
        let seen = sink.lines_seen();

        let report = sink.write(&batch(12)).await.unwrap();
        assert_eq!(report.written, 12);
        assert_eq!(report.dropped, 0);
        assert_eq!(seen.load(Ordering::Relaxed), 12);
        assert!(sink.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_transcript_keeps_lines_in_order() {
        let transcript = Arc::new(Mutex::new(Vec::new()));
        let mut sink = DryRunSink::new("influx").with_transcript(transcript.clone());

        sink.write(&batch(2)).await.unwrap();
        sink.write(&batch(1)).await.unwrap();

        let lines = transcript.lock().unwrap().clone();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], lines[2]);
        assert!(lines[1].contains("temperature=21"), "got: {}", lines[1]);
    }

    #[tokio::test]
    async fn test_dry_run_reports_malformed() {
        let mut sink = DryRunSink::new("influx").verbose(true);
        let mut samples = batch(2).into_samples();
        samples.push(samples[0].clone().with_field("bad", f64::NAN));

        let report = sink.write(&Batch::new(samples)).await.unwrap();
        assert_eq!(report.written, 2);
        assert_eq!(report.dropped, 1);
    }
}
