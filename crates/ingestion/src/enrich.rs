//! Enrichment: raw vendor reading -> `Sample`
//!
//! 厂商数据为英制单位（°F、inHg、ft、kPa）。默认转换为公制，
//! 缺失的露点、VPD、绝对湿度按温湿度推算。

use chrono::{DateTime, Utc};

use contracts::{ContractError, RawReading, Sample, SensorId, SensorInfo, SourceConfig};

pub const FIELD_TEMPERATURE: &str = "temperature";
pub const FIELD_HUMIDITY: &str = "humidity";
pub const FIELD_PRESSURE: &str = "pressure";
pub const FIELD_ABS_HUMIDITY: &str = "abs_humidity";
pub const FIELD_ALTITUDE: &str = "altitude";
pub const FIELD_DISTANCE: &str = "distance";
pub const FIELD_DEWPOINT: &str = "dewpoint";
pub const FIELD_VPD: &str = "vpd";
pub const FIELD_VOLTAGE: &str = "voltage";
pub const FIELD_RSSI: &str = "rssi";

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn fahrenheit_to_celsius(f: f64) -> f64 {
    round2((f - 32.0) * 5.0 / 9.0)
}

fn celsius_to_fahrenheit(c: f64) -> f64 {
    round2(c * 9.0 / 5.0 + 32.0)
}

fn feet_to_meters(ft: f64) -> f64 {
    round2(ft * 0.3048)
}

fn inhg_to_mbar(inhg: f64) -> f64 {
    round2(inhg * 33.8639)
}

fn kpa_to_mbar(kpa: f64) -> f64 {
    round2(kpa * 10.0)
}

/// Dewpoint (°C), Magnus approximation
pub fn dewpoint_celsius(temp_c: f64, humidity: f64) -> f64 {
    let gamma = ((humidity / 100.0).ln() + 17.27 * temp_c / (237.3 + temp_c)) / 17.27;
    round2(237.3 * gamma / (1.0 - gamma))
}

/// Vapour pressure deficit (mbar)
pub fn vpd_mbar(temp_c: f64, humidity: f64) -> f64 {
    let saturation_kpa = 610.78 * (temp_c / (temp_c + 238.3) * 17.2694).exp() / 1000.0;
    kpa_to_mbar(saturation_kpa * (1.0 - humidity / 100.0))
}

/// Absolute humidity (g/m³) without a pressure reading
pub fn abs_humidity(temp_c: f64, humidity: f64) -> f64 {
    round2(
        6.112 * ((17.67 * temp_c) / (temp_c + 243.5)).exp() * humidity * 2.1674
            / (273.15 + temp_c),
    )
}

/// Absolute humidity (g/m³) corrected for station pressure (mbar)
pub fn abs_humidity_with_pressure(temp_c: f64, humidity: f64, pressure_mbar: f64) -> f64 {
    let tk = temp_c + 273.15;
    let x = tk * tk - 293_700.0;
    let correction = 0.000_000_000_011_965 * x * x;

    // saturation vapour pressure, bar
    let saturation = 1.01325
        * 10f64.powf(
            5.426651 - 2005.1 / tk + 0.00013869 * x / tk * (10f64.powf(correction) - 1.0)
                - 0.0044 * 10f64.powf(-0.0057148 * (374.11 - temp_c).powf(1.25)),
        )
        + ((tk / 647.3) - 0.422) * (0.577 - tk / 647.3) * correction.exp() * 0.00980665;

    let pressure_bar = pressure_mbar / 1000.0;
    let mixing = 0.622 * humidity / 100.0 * saturation / (pressure_bar - humidity / 100.0 * saturation);
    round2(mixing * pressure_bar * 100_000_000.0 / (tk * 287.1))
}

fn insert_finite(sample: &mut Sample, key: &str, value: f64) {
    if value.is_finite() {
        sample.fields.insert(key.to_string(), value);
    }
}

/// Pure reading → sample transform
#[derive(Debug, Clone)]
pub struct Enricher {
    measurement: String,
    altitude_m: f64,
    convert_units: bool,
}

impl Enricher {
    pub fn new(measurement: impl Into<String>, altitude_m: f64, convert_units: bool) -> Self {
        Self {
            measurement: measurement.into(),
            altitude_m,
            convert_units,
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(
            config.measurement_name.clone(),
            config.altitude_m,
            config.convert_units,
        )
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Measurement holding battery voltage and RSSI
    pub fn voltage_measurement(&self) -> String {
        format!("{}_V", self.measurement)
    }

    pub fn converts_units(&self) -> bool {
        self.convert_units
    }

    /// Turn one raw reading into a sample
    ///
    /// Fails with `MalformedSample` when the timestamp does not parse, a
    /// measure arrived as something other than a number, or the reading
    /// carries no measured value at all.
    pub fn enrich(
        &self,
        sensor_id: &SensorId,
        sensor_name: &str,
        raw: &RawReading,
    ) -> Result<Sample, ContractError> {
        let timestamp = DateTime::parse_from_rfc3339(&raw.observed)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                ContractError::malformed_sample(
                    sensor_id.as_str(),
                    format!("bad timestamp '{}': {e}", raw.observed),
                )
            })?;

        if let Some(measure) = raw.invalid.first() {
            return Err(ContractError::malformed_sample(
                sensor_id.as_str(),
                format!("non-numeric {measure} at {}", raw.observed),
            ));
        }

        if raw.temperature.is_none()
            && raw.humidity.is_none()
            && raw.barometric_pressure.is_none()
            && raw.distance.is_none()
        {
            return Err(ContractError::malformed_sample(
                sensor_id.as_str(),
                format!("reading at {} has no measured values", raw.observed),
            ));
        }

        let mut sample = Sample::new(
            sensor_id.clone(),
            sensor_name,
            self.measurement.clone(),
            timestamp,
        );

        // Derived values are computed in metric and reported in the unit
        // system of the measured fields.
        let temp_c = raw.temperature.map(fahrenheit_to_celsius);
        let pressure_mbar = raw.barometric_pressure.map(inhg_to_mbar);

        if let Some(humidity) = raw.humidity {
            insert_finite(&mut sample, FIELD_HUMIDITY, humidity);
        }
        if let Some(f) = raw.temperature {
            let value = if self.convert_units { fahrenheit_to_celsius(f) } else { f };
            insert_finite(&mut sample, FIELD_TEMPERATURE, value);
        }
        if let Some(inhg) = raw.barometric_pressure {
            let value = if self.convert_units { inhg_to_mbar(inhg) } else { inhg };
            insert_finite(&mut sample, FIELD_PRESSURE, value);
        }

        let altitude = match raw.altitude {
            Some(ft) if ft != 0.0 => {
                if self.convert_units {
                    feet_to_meters(ft)
                } else {
                    ft
                }
            }
            _ => self.altitude_m,
        };
        insert_finite(&mut sample, FIELD_ALTITUDE, altitude);

        if let Some(ft) = raw.distance {
            let value = if self.convert_units { feet_to_meters(ft) } else { ft };
            insert_finite(&mut sample, FIELD_DISTANCE, value);
        }

        if let (Some(t), Some(h)) = (temp_c, raw.humidity) {
            let abs = match pressure_mbar {
                Some(p) => abs_humidity_with_pressure(t, h, p),
                None => abs_humidity(t, h),
            };
            insert_finite(&mut sample, FIELD_ABS_HUMIDITY, abs);
        }

        let dewpoint = match (raw.dewpoint, temp_c, raw.humidity) {
            (Some(f), _, _) if self.convert_units => Some(fahrenheit_to_celsius(f)),
            (Some(f), _, _) => Some(f),
            (None, Some(t), Some(h)) if self.convert_units => Some(dewpoint_celsius(t, h)),
            (None, Some(t), Some(h)) => Some(celsius_to_fahrenheit(dewpoint_celsius(t, h))),
            _ => None,
        };
        if let Some(value) = dewpoint {
            insert_finite(&mut sample, FIELD_DEWPOINT, value);
        }

        let vpd = match (raw.vpd, temp_c, raw.humidity) {
            (Some(kpa), _, _) if self.convert_units => Some(kpa_to_mbar(kpa)),
            (Some(kpa), _, _) => Some(kpa),
            (None, Some(t), Some(h)) if self.convert_units => Some(vpd_mbar(t, h)),
            (None, Some(t), Some(h)) => Some(round2(vpd_mbar(t, h) / 10.0)),
            _ => None,
        };
        if let Some(value) = vpd {
            insert_finite(&mut sample, FIELD_VPD, value);
        }

        Ok(sample)
    }

    /// Battery voltage and RSSI of one sensor, stamped at `at`
    ///
    /// Missing values are reported as 0.0.
    pub fn voltage_sample(&self, sensor: &SensorInfo, at: DateTime<Utc>) -> Sample {
        Sample::new(
            sensor.id.clone(),
            sensor.name.clone(),
            self.voltage_measurement(),
            at,
        )
        .with_field(FIELD_VOLTAGE, sensor.battery_voltage.unwrap_or(0.0))
        .with_field(FIELD_RSSI, sensor.rssi.unwrap_or(0.0))
    }
}
