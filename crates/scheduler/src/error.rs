//! Scheduler error types

use thiserror::Error;

/// Why a scheduler run ended without delivering
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// One-shot attempts used up on transient failures
    #[error("giving up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Source or backend refused the request; repeating cannot help
    #[error("permanent failure: {message}")]
    Permanent { message: String },

    /// Shutdown requested before the run finished
    #[error("cancelled by shutdown")]
    Cancelled,

    /// Watermark store or other contract error
    #[error(transparent)]
    Contract(#[from] contracts::ContractError),
}

impl SchedulerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
