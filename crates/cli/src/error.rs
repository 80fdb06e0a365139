//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path} (run `sensorpushd init-config` to create one)")]
    ConfigNotFound { path: String },

    /// `init-config` would overwrite a file
    #[error("{path} already exists, pass --force to overwrite it")]
    OutputExists { path: String },

    /// `--start` after `--stop`
    #[error("invalid range: start {start} is after stop {stop}")]
    InvalidRange { start: String, stop: String },

    /// Configuration, source or watermark store error
    #[error(transparent)]
    Contract(#[from] contracts::ContractError),

    /// Backend selection or sink creation failed
    #[error(transparent)]
    Dispatcher(#[from] dispatcher::DispatcherError),

    /// A one-shot run or the daemon loop failed
    #[error(transparent)]
    Scheduler(#[from] scheduler::SchedulerError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn output_exists(path: impl Into<String>) -> Self {
        Self::OutputExists { path: path.into() }
    }
}
