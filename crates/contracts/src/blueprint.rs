//! DaemonBlueprint - Config Loader 输出
//!
//! 描述完整的守护进程配置：云端 API 凭据、采样参数、调度、重试策略、后端列表。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::{RetryPolicy, SensorId, Span};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的守护进程配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 云端 API 访问
    pub api: ApiConfig,

    /// 采样与数据富化
    #[serde(default)]
    pub source: SourceConfig,

    /// 调度与水位线
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// 退避重试
    #[serde(default)]
    pub retry: RetryConfig,

    /// 时序后端列表 (至少一个)
    pub backends: Vec<BackendConfig>,
}

impl DaemonBlueprint {
    /// Look up a backend by name
    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.name == name)
    }
}

/// Vendor API access
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Account e-mail
    #[serde(default)]
    pub login: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Lifetime assumed for a fresh access token
    #[serde(default = "default_token_ttl")]
    pub token_ttl: Span,

    /// Refresh this long before the token expires
    #[serde(default = "default_token_safety_margin")]
    pub token_safety_margin: Span,

    /// Per-request timeout
    #[serde(default = "default_http_timeout")]
    pub timeout: Span,

    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

// Keep the password out of logs.
impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("token_ttl", &self.token_ttl)
            .field("token_safety_margin", &self.token_safety_margin)
            .field("timeout", &self.timeout)
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

fn default_base_url() -> String {
    "https://api.sensorpush.com/api/v1".to_string()
}

fn default_token_ttl() -> Span {
    Span::from_mins(60)
}

fn default_token_safety_margin() -> Span {
    Span::from_mins(5)
}

fn default_http_timeout() -> Span {
    Span::from_secs(30)
}

fn default_true() -> bool {
    true
}

/// Sampling and enrichment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Measurement for readings; voltage records use `<name>_V`
    #[serde(default = "default_measurement_name")]
    pub measurement_name: String,

    /// Site altitude used when a sensor reports none
    #[serde(default)]
    pub altitude_m: f64,

    /// Convert imperial units to metric
    #[serde(default = "default_true")]
    pub convert_units: bool,

    /// Width of one upstream request
    #[serde(default = "default_slice")]
    pub slice: Span,

    /// Pause between slices
    #[serde(default = "default_request_delay")]
    pub request_delay: Span,

    /// Readings per sensor and request
    #[serde(default = "default_sample_limit")]
    pub sample_limit: u32,

    /// Restrict to these sensors (empty = all)
    #[serde(default)]
    pub sensors: Vec<SensorId>,

    /// Emit the `<name>_V` voltage/RSSI measurement
    #[serde(default = "default_true")]
    pub voltage_records: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            measurement_name: default_measurement_name(),
            altitude_m: 0.0,
            convert_units: true,
            slice: default_slice(),
            request_delay: default_request_delay(),
            sample_limit: default_sample_limit(),
            sensors: Vec::new(),
            voltage_records: true,
        }
    }
}

fn default_measurement_name() -> String {
    "SensorPush".to_string()
}

fn default_slice() -> Span {
    Span::from_hours(12)
}

fn default_request_delay() -> Span {
    Span::from_secs(60)
}

fn default_sample_limit() -> u32 {
    10_000
}

/// Scheduling and watermark persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Sleep between cycles
    #[serde(default = "default_interval")]
    pub interval: Span,

    /// Range of the first daemon cycle when no watermark exists
    #[serde(default = "default_poll_backlog")]
    pub poll_backlog: Span,

    /// Range of a one-shot run without explicit start/stop
    #[serde(default = "default_oneshot_backlog")]
    pub oneshot_backlog: Span,

    /// Catch-up after downtime never reaches further back than this
    #[serde(default = "default_max_lookback")]
    pub max_lookback: Span,

    /// Watermark store file
    #[serde(default = "default_state_path")]
    pub state_path: String,

    /// Time granted to an in-flight cycle after a shutdown request
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: Span,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            poll_backlog: default_poll_backlog(),
            oneshot_backlog: default_oneshot_backlog(),
            max_lookback: default_max_lookback(),
            state_path: default_state_path(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

fn default_interval() -> Span {
    Span::from_mins(5)
}

fn default_poll_backlog() -> Span {
    Span::from_mins(10)
}

fn default_oneshot_backlog() -> Span {
    Span::from_days(1)
}

fn default_max_lookback() -> Span {
    Span::from_days(30)
}

fn default_state_path() -> String {
    "sensorpushd-state.json".to_string()
}

fn default_shutdown_grace() -> Span {
    Span::from_secs(30)
}

/// Backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay")]
    pub base_delay: Span,

    #[serde(default = "default_max_delay")]
    pub max_delay: Span,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Relative jitter, 0.0 - 1.0
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Cycle attempts in one-shot mode before exiting non-zero
    #[serde(default = "default_oneshot_attempts")]
    pub oneshot_attempts: u32,

    /// Write attempts per backend within one cycle
    #[serde(default = "default_sink_attempts")]
    pub sink_attempts: u32,

    /// First delay between in-cycle backend attempts
    #[serde(default = "default_sink_retry_delay")]
    pub sink_retry_delay: Span,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            oneshot_attempts: default_oneshot_attempts(),
            sink_attempts: default_sink_attempts(),
            sink_retry_delay: default_sink_retry_delay(),
        }
    }
}

impl RetryConfig {
    /// Cycle-level policy (unbounded, the daemon never gives up)
    pub fn cycle_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.base_delay.into(), self.max_delay.into())
            .with_multiplier(self.multiplier)
            .with_jitter(self.jitter)
    }

    /// Cycle-level policy for one-shot runs
    pub fn oneshot_policy(&self) -> RetryPolicy {
        self.cycle_policy().with_max_attempts(self.oneshot_attempts)
    }

    /// In-cycle policy for a single backend
    pub fn sink_policy(&self) -> RetryPolicy {
        let base: Duration = self.sink_retry_delay.into();
        RetryPolicy::new(base, self.max_delay.into())
            .with_multiplier(self.multiplier)
            .with_jitter(self.jitter)
            .with_max_attempts(self.sink_attempts)
    }
}

fn default_base_delay() -> Span {
    Span::from_secs(10)
}

fn default_max_delay() -> Span {
    Span::from_mins(5)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.2
}

fn default_oneshot_attempts() -> u32 {
    3
}

fn default_sink_attempts() -> u32 {
    2
}

fn default_sink_retry_delay() -> Span {
    Span::from_secs(5)
}

/// Backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// InfluxDB 2.x `/api/v2/write`
    #[serde(rename = "influxdb2")]
    InfluxDb2,
    /// InfluxDB 3.x `/api/v3/write_lp`
    #[serde(rename = "influxdb3")]
    InfluxDb3,
    /// VictoriaMetrics `/write` (Influx line protocol)
    #[serde(rename = "victoriametrics")]
    VictoriaMetrics,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InfluxDb2 => "influxdb2",
            Self::InfluxDb3 => "influxdb3",
            Self::VictoriaMetrics => "victoriametrics",
        })
    }
}

/// One backend definition, immutable after load
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Unique name (log/metrics label and watermark scope)
    pub name: String,

    pub kind: BackendKind,

    /// Base URL, e.g. `http://localhost:8086`
    pub url: String,

    /// API token (influxdb2/influxdb3 required, victoriametrics optional)
    #[serde(default)]
    pub token: Option<String>,

    /// influxdb2 organisation
    #[serde(default)]
    pub org: Option<String>,

    /// influxdb2 bucket
    #[serde(default)]
    pub bucket: Option<String>,

    /// influxdb3 database
    #[serde(default)]
    pub database: Option<String>,

    #[serde(default = "default_true")]
    pub verify_tls: bool,

    /// Whether this backend holds back the global watermark
    #[serde(default = "default_true")]
    pub required: bool,

    /// Per-write timeout
    #[serde(default = "default_write_timeout")]
    pub timeout: Span,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("database", &self.database)
            .field("verify_tls", &self.verify_tls)
            .field("required", &self.required)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn default_write_timeout() -> Span {
    Span::from_secs(15)
}
