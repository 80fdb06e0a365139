//! reqwest-based client for the SensorPush cloud API

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use contracts::{
    ApiConfig, ContractError, Credential, GatewayInfo, SampleQuery, SamplePage, SensorId,
    SensorInfo, VendorApi, MEASURES,
};

use crate::wire::{
    decode_reading, AccessTokenRequest, AccessTokenResponse, AuthorizeRequest, AuthorizeResponse,
    GatewayEntry, SamplesRequest, SamplesResponse, SensorEntry,
};

const USER_AGENT: &str = concat!("sensorpushd/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the vendor API
#[derive(Debug, Clone)]
pub struct SensorPushClient {
    http: Client,
    base_url: String,
    token_ttl: chrono::Duration,
}

impl SensorPushClient {
    /// Build a client from the `[api]` section
    pub fn new(config: &ApiConfig) -> Result<Self, ContractError> {
        let http = Client::builder()
            .timeout(config.timeout.as_duration())
            .danger_accept_invalid_certs(!config.verify_tls)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ContractError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token_ttl: config.token_ttl.as_chrono(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// POST a JSON body and decode the JSON answer
    async fn post<B, T>(&self, path: &str, token: Option<&str>, body: &B) -> Result<T, ContractError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.http.post(self.url(path)).json(body);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, token);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let response = check_status(response).await?;

        response.json::<T>().await.map_err(|e| {
            ContractError::source_unavailable(format!("invalid response from {path}: {e}"))
        })
    }
}

/// Map a non-2xx answer to the source error taxonomy
pub fn classify_status(
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> ContractError {
    let snippet: String = body.chars().take(200).collect();
    match status {
        StatusCode::UNAUTHORIZED => ContractError::AuthExpired,
        StatusCode::TOO_MANY_REQUESTS => ContractError::SourceRateLimited { retry_after },
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
            ContractError::source_unavailable(format!("HTTP {}: {}", s.as_u16(), snippet))
        }
        s => ContractError::source_rejected(s.as_u16(), snippet),
    }
}

async fn check_status(response: Response) -> Result<Response, ContractError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body, retry_after))
}

fn map_transport_error(err: reqwest::Error) -> ContractError {
    if err.is_timeout() {
        ContractError::source_unavailable(format!("request timed out: {err}"))
    } else if err.is_connect() {
        ContractError::source_unavailable(format!("connection failed: {err}"))
    } else {
        ContractError::source_unavailable(err.to_string())
    }
}

impl VendorApi for SensorPushClient {
    #[instrument(name = "vendor_authenticate", skip(self, password), fields(login = %login))]
    async fn authenticate(&self, login: &str, password: &str) -> Result<Credential, ContractError> {
        let authorize: AuthorizeResponse = self
            .post(
                "oauth/authorize",
                None,
                &AuthorizeRequest {
                    email: login,
                    password,
                },
            )
            .await?;

        let access: AccessTokenResponse = self
            .post(
                "oauth/accesstoken",
                None,
                &AccessTokenRequest {
                    authorization: &authorize.authorization,
                },
            )
            .await?;

        debug!("access token issued");
        Ok(Credential::new(access.accesstoken, Utc::now() + self.token_ttl))
    }

    #[instrument(name = "vendor_list_sensors", skip(self, token))]
    async fn list_sensors(&self, token: &str) -> Result<Vec<SensorInfo>, ContractError> {
        let entries: std::collections::BTreeMap<String, SensorEntry> = self
            .post("devices/sensors", Some(token), &serde_json::json!({}))
            .await?;
        Ok(entries
            .into_iter()
            .map(|(key, entry)| entry.into_info(key))
            .collect())
    }

    #[instrument(name = "vendor_list_gateways", skip(self, token))]
    async fn list_gateways(&self, token: &str) -> Result<Vec<GatewayInfo>, ContractError> {
        let entries: std::collections::BTreeMap<String, GatewayEntry> = self
            .post("devices/gateways", Some(token), &serde_json::json!({}))
            .await?;
        Ok(entries
            .into_iter()
            .map(|(key, entry)| entry.into_info(key))
            .collect())
    }

    #[instrument(
        name = "vendor_list_samples",
        skip(self, token, query),
        fields(start = %query.start, stop = %query.stop, limit = query.limit)
    )]
    async fn list_samples(
        &self,
        token: &str,
        query: &SampleQuery,
    ) -> Result<SamplePage, ContractError> {
        let request = SamplesRequest {
            start_time: query.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            stop_time: query.stop.to_rfc3339_opts(SecondsFormat::Millis, true),
            measures: &MEASURES,
            limit: query.limit,
            sensors: query
                .sensors
                .as_ref()
                .map(|ids| ids.iter().map(SensorId::as_str).collect()),
        };

        let response: SamplesResponse = self.post("samples", Some(token), &request).await?;

        Ok(SamplePage {
            truncated: response.truncated,
            total_samples: response.total_samples,
            readings: response
                .sensors
                .into_iter()
                .map(|(id, readings)| {
                    let readings = readings.iter().map(decode_reading).collect();
                    (SensorId::from(id), readings)
                })
                .collect(),
        })
    }
}
