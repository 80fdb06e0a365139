//! Mock vendor API
//!
//! 用于单元测试与端到端测试的内存实现，支持注入失败场景与 token 过期。

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::instrument;

use contracts::{
    ContractError, Credential, GatewayInfo, RawReading, SampleQuery, SamplePage, SensorId,
    SensorInfo, VendorApi,
};

/// Failure to inject into the next call of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    /// Network error / 5xx
    Unavailable,
    /// HTTP 429
    RateLimited,
    /// HTTP 4xx other than 401
    Rejected(u16),
    /// HTTP 401
    AuthExpired,
}

impl MockFailure {
    fn into_error(self) -> ContractError {
        match self {
            Self::Unavailable => ContractError::source_unavailable("mock: service unavailable"),
            Self::RateLimited => ContractError::SourceRateLimited { retry_after: None },
            Self::Rejected(status) => ContractError::source_rejected(status, "mock: rejected"),
            Self::AuthExpired => ContractError::AuthExpired,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    sensors: Vec<SensorInfo>,
    gateways: Vec<GatewayInfo>,
    readings: BTreeMap<SensorId, Vec<RawReading>>,
    token_ttl: Option<chrono::Duration>,
    issued_tokens: u32,
    valid_token: Option<String>,
    fail_auth: VecDeque<MockFailure>,
    fail_sensors: VecDeque<MockFailure>,
    fail_samples: VecDeque<MockFailure>,
    auth_calls: u32,
    sensor_calls: u32,
    sample_queries: Vec<SampleQuery>,
}

/// In-memory vendor API
///
/// Tokens are `token-1`, `token-2`, ... Only the most recently issued token is
/// accepted; [`MockVendorApi::revoke_token`] simulates server-side expiry.
#[derive(Debug, Default)]
pub struct MockVendorApi {
    state: Mutex<MockState>,
}

impl MockVendorApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a sensor
    pub fn with_sensor(self, id: &str, name: &str) -> Self {
        self.state().sensors.push(SensorInfo {
            id: SensorId::from(id),
            name: name.to_string(),
            active: true,
            battery_voltage: Some(3.0),
            rssi: Some(-60.0),
        });
        self
    }

    pub fn with_gateway(self, name: &str) -> Self {
        self.state().gateways.push(GatewayInfo {
            name: name.to_string(),
            id: None,
            last_seen: None,
            message: Some("OK".into()),
            version: None,
        });
        self
    }

    /// Lifetime of issued tokens (default one hour)
    pub fn with_token_ttl(self, ttl: chrono::Duration) -> Self {
        self.state().token_ttl = Some(ttl);
        self
    }

    /// Add a raw reading for a sensor
    pub fn push_reading(&self, sensor_id: &str, reading: RawReading) {
        self.state()
            .readings
            .entry(SensorId::from(sensor_id))
            .or_default()
            .push(reading);
    }

    /// Add a reading exactly as the vendor would send it on the wire
    pub fn push_json(&self, sensor_id: &str, reading: serde_json::Value) {
        self.push_reading(sensor_id, crate::wire::decode_reading(&reading));
    }

    /// Add a reading with only a temperature (°F)
    pub fn push_temperature(&self, sensor_id: &str, observed: DateTime<Utc>, fahrenheit: f64) {
        self.push_reading(
            sensor_id,
            RawReading {
                observed: observed.to_rfc3339(),
                temperature: Some(fahrenheit),
                humidity: Some(45.0),
                ..Default::default()
            },
        );
    }

    pub fn fail_next_auth(&self, failure: MockFailure) {
        self.state().fail_auth.push_back(failure);
    }

    pub fn fail_next_sensors(&self, failure: MockFailure) {
        self.state().fail_sensors.push_back(failure);
    }

    pub fn fail_next_samples(&self, failure: MockFailure) {
        self.state().fail_samples.push_back(failure);
    }

    /// Invalidate the current token server-side
    pub fn revoke_token(&self) {
        self.state().valid_token = None;
    }

    pub fn auth_calls(&self) -> u32 {
        self.state().auth_calls
    }

    pub fn sensor_calls(&self) -> u32 {
        self.state().sensor_calls
    }

    /// Every samples query received, in order
    pub fn sample_queries(&self) -> Vec<SampleQuery> {
        self.state().sample_queries.clone()
    }

    fn check_token(state: &MockState, token: &str) -> Result<(), ContractError> {
        match &state.valid_token {
            Some(valid) if valid == token => Ok(()),
            _ => Err(ContractError::AuthExpired),
        }
    }
}

impl VendorApi for MockVendorApi {
    #[instrument(name = "mock_vendor_authenticate", skip(self, password))]
    async fn authenticate(&self, login: &str, password: &str) -> Result<Credential, ContractError> {
        let _ = (login, password);
        let mut state = self.state();
        state.auth_calls += 1;
        if let Some(failure) = state.fail_auth.pop_front() {
            return Err(failure.into_error());
        }

        state.issued_tokens += 1;
        let token = format!("token-{}", state.issued_tokens);
        state.valid_token = Some(token.clone());
        let ttl = state.token_ttl.unwrap_or_else(|| chrono::Duration::hours(1));
        Ok(Credential::new(token, Utc::now() + ttl))
    }

    async fn list_sensors(&self, token: &str) -> Result<Vec<SensorInfo>, ContractError> {
        let mut state = self.state();
        state.sensor_calls += 1;
        if let Some(failure) = state.fail_sensors.pop_front() {
            return Err(failure.into_error());
        }
        Self::check_token(&state, token)?;
        Ok(state.sensors.clone())
    }

    async fn list_gateways(&self, token: &str) -> Result<Vec<GatewayInfo>, ContractError> {
        let state = self.state();
        Self::check_token(&state, token)?;
        Ok(state.gateways.clone())
    }

    #[instrument(name = "mock_vendor_list_samples", skip(self, token, query))]
    async fn list_samples(
        &self,
        token: &str,
        query: &SampleQuery,
    ) -> Result<SamplePage, ContractError> {
        let mut state = self.state();
        state.sample_queries.push(query.clone());
        if let Some(failure) = state.fail_samples.pop_front() {
            return Err(failure.into_error());
        }
        Self::check_token(&state, token)?;

        let mut page = SamplePage::default();
        let limit = query.limit as usize;
        for (id, readings) in &state.readings {
            if let Some(filter) = &query.sensors {
                if !filter.contains(id) {
                    continue;
                }
            }
            let in_range: Vec<RawReading> = readings
                .iter()
                .filter(|r| {
                    DateTime::parse_from_rfc3339(&r.observed)
                        .map(|t| {
                            let t = t.with_timezone(&Utc);
                            t >= query.start && t <= query.stop
                        })
                        // unparseable timestamps are passed through for the source to reject
                        .unwrap_or(true)
                })
                .cloned()
                .collect();

            page.total_samples += in_range.len() as u64;
            if in_range.len() > limit {
                page.truncated = true;
            }
            // oldest first, the newest readings are cut
            let take: Vec<RawReading> = in_range.into_iter().take(limit).collect();
            if !take.is_empty() {
                page.readings.insert(id.clone(), take);
            }
        }
        Ok(page)
    }
}
