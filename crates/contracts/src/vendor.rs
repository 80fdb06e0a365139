//! Vendor cloud API - interface and raw payloads
//!
//! The HTTP client lives in `vendor_client`; the Sample Source and Credential
//! Manager only see this trait.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContractError, SensorId};

/// Measures requested from the samples endpoint
pub const MEASURES: [&str; 7] = [
    "altitude",
    "barometric_pressure",
    "dewpoint",
    "humidity",
    "temperature",
    "vpd",
    "distance",
];

/// Access token plus expiry
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Still usable at `now` with `margin` to spare
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        now < self.expires_at - margin
    }
}

// Never print the token itself.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Sensor metadata from `devices/sensors`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorInfo {
    pub id: SensorId,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub battery_voltage: Option<f64>,
    #[serde(default)]
    pub rssi: Option<f64>,
}

/// Gateway metadata from `devices/gateways`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayInfo {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// One reading exactly as the vendor reports it
///
/// Units are imperial (°F, inHg, ft, kPa for vpd).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub observed: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub barometric_pressure: Option<f64>,
    #[serde(default)]
    pub dewpoint: Option<f64>,
    #[serde(default)]
    pub vpd: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub distance: Option<f64>,
    /// Measures present in the response with a value that is not a number
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid: Vec<String>,
}

/// Parameters for one samples request
#[derive(Debug, Clone, PartialEq)]
pub struct SampleQuery {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    /// `None` means every sensor on the account
    pub sensors: Option<Vec<SensorId>>,
    /// Readings per sensor
    pub limit: u32,
}

/// One samples response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplePage {
    pub truncated: bool,
    pub total_samples: u64,
    pub readings: BTreeMap<SensorId, Vec<RawReading>>,
}

/// Vendor API operations
///
/// Errors follow the source taxonomy: 401 maps to `AuthExpired`, 429 to
/// `SourceRateLimited`, network/5xx to `SourceUnavailable` and any other 4xx
/// to `SourceRejected`.
pub trait VendorApi: Send + Sync {
    /// Exchange login and password for a fresh credential
    fn authenticate(
        &self,
        login: &str,
        password: &str,
    ) -> impl Future<Output = Result<Credential, ContractError>> + Send;

    /// All sensors visible to the account
    fn list_sensors(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Vec<SensorInfo>, ContractError>> + Send;

    /// All gateways visible to the account
    fn list_gateways(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Vec<GatewayInfo>, ContractError>> + Send;

    /// Readings in `[query.start, query.stop]`
    fn list_samples(
        &self,
        token: &str,
        query: &SampleQuery,
    ) -> impl Future<Output = Result<SamplePage, ContractError>> + Send;
}
