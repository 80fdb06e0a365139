//! JSON request/response bodies of the cloud API

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use contracts::{GatewayInfo, RawReading, SensorId, SensorInfo};

#[derive(Serialize)]
pub(crate) struct AuthorizeRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct AuthorizeResponse {
    pub authorization: String,
}

#[derive(Serialize)]
pub(crate) struct AccessTokenRequest<'a> {
    pub authorization: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct AccessTokenResponse {
    pub accesstoken: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SamplesRequest<'a> {
    pub start_time: String,
    pub stop_time: String,
    pub measures: &'a [&'a str],
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensors: Option<Vec<&'a str>>,
}

#[derive(Deserialize)]
pub(crate) struct SamplesResponse {
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub total_samples: u64,
    /// Readings stay untyped until [`decode_reading`], so one bad value
    /// cannot reject the whole page
    #[serde(default)]
    pub sensors: BTreeMap<String, Vec<Value>>,
}

/// Decode one reading, keeping whatever is usable
///
/// Numbers and numeric strings are accepted, null or absent means not
/// measured. Anything else is listed in `RawReading::invalid` and a missing
/// `observed` leaves it empty, so the enricher rejects only this reading.
pub(crate) fn decode_reading(value: &Value) -> RawReading {
    let mut invalid = Vec::new();
    let mut measure = |key: &str| match value.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Some(v),
            _ => {
                invalid.push(key.to_string());
                None
            }
        },
        Some(_) => {
            invalid.push(key.to_string());
            None
        }
    };

    let temperature = measure("temperature");
    let humidity = measure("humidity");
    let barometric_pressure = measure("barometric_pressure");
    let dewpoint = measure("dewpoint");
    let vpd = measure("vpd");
    let altitude = measure("altitude");
    let distance = measure("distance");

    RawReading {
        observed: value
            .get("observed")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        temperature,
        humidity,
        barometric_pressure,
        dewpoint,
        vpd,
        altitude,
        distance,
        invalid,
    }
}

#[derive(Deserialize)]
pub(crate) struct SensorEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub battery_voltage: Option<f64>,
    #[serde(default)]
    pub rssi: Option<f64>,
}

impl SensorEntry {
    /// The map key is authoritative when the entry omits its id
    pub fn into_info(self, key: String) -> SensorInfo {
        let id = self.id.unwrap_or(key);
        SensorInfo {
            name: self.name.unwrap_or_else(|| id.clone()),
            id: SensorId::from(id),
            active: self.active,
            battery_voltage: self.battery_voltage,
            rssi: self.rssi,
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct GatewayEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl GatewayEntry {
    pub fn into_info(self, key: String) -> GatewayInfo {
        GatewayInfo {
            name: self.name.unwrap_or(key),
            id: self.id,
            last_seen: self.last_seen,
            message: self.message,
            version: self.version,
        }
    }
}
