//! Run statistics printed at exit.

use contracts::VendorApi;
use dispatcher::MetricsSnapshot;
use observability::CycleSummary;
use scheduler::Scheduler;

/// Statistics from a daemon or one-shot run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Aggregated cycle outcomes
    pub cycles: CycleSummary,
    /// Per-sink counters
    pub sinks: Vec<(String, MetricsSnapshot)>,
}

impl PipelineStats {
    pub fn collect<A: VendorApi>(scheduler: &Scheduler<A>) -> Self {
        Self {
            cycles: scheduler.stats().summary(),
            sinks: scheduler.dispatcher().metrics(),
        }
    }

    /// Samples accepted by every sink together
    pub fn samples_written(&self) -> u64 {
        self.sinks.iter().map(|(_, s)| s.samples_written).sum()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!();
        print!("{}", self.cycles);

        if !self.sinks.is_empty() {
            println!("Sinks:");
            for (name, sink) in &self.sinks {
                println!(
                    "  {}: {} writes, {} failed attempts, {} samples, {} dropped, last {} ms",
                    name,
                    sink.write_count,
                    sink.failure_count,
                    sink.samples_written,
                    sink.dropped_count,
                    sink.last_latency_ms
                );
            }
        }
        println!();
    }
}
