//! Pipeline orchestration module.

mod orchestrator;
mod signal;
mod stats;

pub use orchestrator::{build_scheduler, load_blueprint, sample_source, Overrides, PipelineConfig};
pub use signal::install_signal_handlers;
pub use stats::PipelineStats;
