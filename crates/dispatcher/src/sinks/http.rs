//! LineProtocolSink - HTTP line-protocol writes to InfluxDB 2/3 and VictoriaMetrics

use std::time::Instant;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, instrument, warn};

use contracts::{BackendConfig, BackendKind, BackendSink, Batch, ContractError, WriteReport};

use crate::error::DispatcherError;
use crate::line_protocol::encode_batch;

/// Lines per HTTP request
pub const MAX_LINES_PER_REQUEST: usize = 5000;

/// Sink that POSTs line protocol to a time-series backend
pub struct LineProtocolSink {
    name: String,
    kind: BackendKind,
    client: Client,
    endpoint: Url,
    authorization: Option<String>,
}

impl LineProtocolSink {
    /// Create a sink from a `[[backends]]` entry
    pub fn from_config(config: &BackendConfig) -> Result<Self, DispatcherError> {
        let endpoint = write_url(config)
            .map_err(|e| DispatcherError::sink_creation(&config.name, e))?;

        let client = Client::builder()
            .timeout(config.timeout.as_duration())
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;

        let token = config.token.as_deref().filter(|t| !t.is_empty());
        let authorization = match config.kind {
            BackendKind::InfluxDb2 => token.map(|t| format!("Token {t}")),
            BackendKind::InfluxDb3 | BackendKind::VictoriaMetrics => {
                token.map(|t| format!("Bearer {t}"))
            }
        };

        Ok(Self {
            name: config.name.clone(),
            kind: config.kind,
            client,
            endpoint,
            authorization,
        })
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(&self, body: String) -> Result<(), ContractError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);
        if let Some(auth) = &self.authorization {
            request = request.header(AUTHORIZATION, auth);
        }

        let response = request.send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                "request timed out"
            } else if e.is_connect() {
                "connection failed"
            } else {
                "request failed"
            };
            ContractError::backend_transient(&self.name, format!("{reason}: {e}"))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(&self.name, status, &body))
    }
}

/// Build the kind-specific write endpoint
fn write_url(config: &BackendConfig) -> Result<Url, String> {
    let base = config.url.trim_end_matches('/');
    let path = match config.kind {
        BackendKind::InfluxDb2 => "api/v2/write",
        BackendKind::InfluxDb3 => "api/v3/write_lp",
        BackendKind::VictoriaMetrics => "write",
    };
    let mut url = Url::parse(&format!("{base}/{path}"))
        .map_err(|e| format!("invalid url '{}': {e}", config.url))?;

    let required = |value: &Option<String>, field: &str| {
        value
            .clone()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| format!("{field} is required for {} backends", config.kind))
    };

    match config.kind {
        BackendKind::InfluxDb2 => {
            let org = required(&config.org, "org")?;
            let bucket = required(&config.bucket, "bucket")?;
            url.query_pairs_mut()
                .append_pair("org", &org)
                .append_pair("bucket", &bucket)
                .append_pair("precision", "ns");
        }
        BackendKind::InfluxDb3 => {
            let database = required(&config.database, "database")?;
            url.query_pairs_mut()
                .append_pair("db", &database)
                .append_pair("precision", "nanosecond");
        }
        BackendKind::VictoriaMetrics => {}
    }
    Ok(url)
}

/// Map a non-2xx write answer to the backend error taxonomy
pub fn classify_status(sink: &str, status: StatusCode, body: &str) -> ContractError {
    let snippet: String = body.chars().take(200).collect();
    let message = format!("HTTP {}: {}", status.as_u16(), snippet.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ContractError::backend_permanent(sink, format!("authentication failed, {message}"))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            ContractError::backend_transient(sink, message)
        }
        s if s.is_server_error() => ContractError::backend_transient(sink, message),
        _ => ContractError::backend_permanent(sink, message),
    }
}

impl BackendSink for LineProtocolSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "http_sink_write",
        skip(self, batch),
        fields(sink = %self.name, samples = batch.len())
    )]
    async fn write(&mut self, batch: &Batch) -> Result<WriteReport, ContractError> {
        let encoded = encode_batch(batch);
        for err in &encoded.dropped {
            warn!(sink = %self.name, error = %err, "dropping malformed sample");
        }

        let started = Instant::now();
        for body in encoded.chunks(MAX_LINES_PER_REQUEST) {
            self.post(body).await?;
        }
        debug!(
            sink = %self.name,
            lines = encoded.lines.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch written"
        );

        Ok(WriteReport {
            written: encoded.lines.len(),
            dropped: encoded.dropped.len(),
        })
    }

    #[instrument(name = "http_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, "LineProtocolSink closed");
        Ok(())
    }
}
