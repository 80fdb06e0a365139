//! CLI argument definitions using clap.

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use contracts::Span;
use std::path::PathBuf;

/// sensorpushd - SensorPush cloud to time-series database bridge
#[derive(Parser, Debug)]
#[command(
    name = "sensorpushd",
    author,
    version,
    about = "SensorPush cloud ingestion daemon",
    long_about = "Polls the SensorPush cloud API for sensor readings, converts and enriches them,\n\
                  and writes them as line protocol to InfluxDB 2.x/3.x and VictoriaMetrics.\n\n\
                  Run `daemon` for continuous polling with gap-free catch-up, or `once` to\n\
                  import a fixed time range."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SENSORPUSHD_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "SENSORPUSHD_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Explicit log level or filter directive (overrides -v/-q)
    #[arg(long, global = true, env = "SENSORPUSHD_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, env = "SENSORPUSHD_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Prometheus metrics port (0 = disabled)
    #[arg(long, default_value = "0", global = true, env = "SENSORPUSHD_METRICS_PORT")]
    pub metrics_port: u16,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Level used when `RUST_LOG` is not set
    pub fn default_log_level(&self) -> String {
        if let Some(level) = &self.log_level {
            return level.clone();
        }
        if self.quiet {
            return "warn".to_string();
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
        .to_string()
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll continuously and keep every backend up to date
    Daemon(DaemonArgs),

    /// Import one time range and exit
    Once(OnceArgs),

    /// List the sensors visible to the account
    Sensors(ListArgs),

    /// List the gateways visible to the account
    Gateways(ListArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Write a commented starter configuration
    InitConfig(InitConfigArgs),
}

/// Configuration file plus secret overrides
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "sensorpushd.toml",
        env = "SENSORPUSHD_CONFIG"
    )]
    pub config: PathBuf,

    /// Account login, overrides `api.login`
    #[arg(long, env = "SENSORPUSHD_LOGIN", hide_env_values = true)]
    pub login: Option<String>,

    /// Account password, overrides `api.password`
    #[arg(long, env = "SENSORPUSHD_PASSWORD", hide_env_values = true, hide = true)]
    pub password: Option<String>,
}

/// Arguments for the `daemon` command
#[derive(Args, Debug, Clone)]
pub struct DaemonArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Sleep between polls, e.g. `5m`
    #[arg(long, env = "SENSORPUSHD_INTERVAL")]
    pub interval: Option<Span>,

    /// Range of the first poll when no watermark exists, e.g. `10m`
    #[arg(long, env = "SENSORPUSHD_BACKLOG")]
    pub backlog: Option<Span>,

    /// Write only to these backends (repeatable or comma separated)
    #[arg(long = "backend", value_name = "NAME", value_delimiter = ',', env = "SENSORPUSHD_BACKENDS")]
    pub backends: Vec<String>,

    /// Log the line protocol instead of sending it
    #[arg(long, env = "SENSORPUSHD_DRY_RUN")]
    pub dry_run: bool,

    /// Restrict to these sensor ids (comma separated)
    #[arg(long, value_name = "ID,..", env = "SENSORPUSHD_SENSORS")]
    pub sensors: Option<String>,
}

/// Arguments for the `once` command
#[derive(Args, Debug, Clone)]
pub struct OnceArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Range start (RFC 3339), defaults to `stop - backlog`
    #[arg(long, conflicts_with = "backlog")]
    pub start: Option<DateTime<Utc>>,

    /// Range end (RFC 3339), defaults to now
    #[arg(long)]
    pub stop: Option<DateTime<Utc>>,

    /// Import this much history, e.g. `1d` (default `daemon.oneshot_backlog`)
    #[arg(long, env = "SENSORPUSHD_BACKLOG")]
    pub backlog: Option<Span>,

    /// Write only to these backends (repeatable or comma separated)
    #[arg(long = "backend", value_name = "NAME", value_delimiter = ',', env = "SENSORPUSHD_BACKENDS")]
    pub backends: Vec<String>,

    /// Restrict to these sensor ids (comma separated)
    #[arg(long, value_name = "ID,..", env = "SENSORPUSHD_SENSORS")]
    pub sensors: Option<String>,

    /// Log the line protocol instead of sending it
    #[arg(long, env = "SENSORPUSHD_DRY_RUN")]
    pub dry_run: bool,

    /// Keep imperial units
    #[arg(long)]
    pub no_convert: bool,

    /// Width of one upstream request, e.g. `12h`
    #[arg(long)]
    pub slice: Option<Span>,

    /// Sample limit per upstream request
    #[arg(long)]
    pub query_limit: Option<u32>,

    /// Pause between upstream requests, e.g. `60s`
    #[arg(long)]
    pub delay: Option<Span>,
}

/// Arguments for the `sensors` and `gateways` commands
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command
#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `init-config` command
#[derive(Args, Debug, Clone)]
pub struct InitConfigArgs {
    /// Destination file, `-` for stdout
    #[arg(short, long, default_value = "sensorpushd.toml")]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
