// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! Sensor traits and common types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SensorResult;

/// Sensor operational status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorStatus {
    Disconnected,
    Connected,
    Active,
    Error,
}

/// One SGP30 measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasSample {
    /// CO2 equivalent in ppm (400..60000)
    pub co2_ppm: u16,
    /// Total volatile organic compounds in ppb (0..60000)
    pub tvoc_ppb: u16,
}

/// A gas sensor's slot in one cycle; `sample` is `None` when the read failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasReading {
    pub index: usize,
    pub sample: Option<GasSample>,
    pub error: Option<String>,
}

impl GasReading {
    pub fn ok(index: usize, sample: GasSample) -> Self {
        Self { index, sample: Some(sample), error: None }
    }

    pub fn failed(index: usize, error: impl Into<String>) -> Self {
        Self { index, sample: None, error: Some(error.into()) }
    }

    pub fn is_ok(&self) -> bool {
        self.sample.is_some()
    }

    /// 1-based label used in reports and CSV headers
    pub fn label(&self) -> String {
        gas_label(self.index)
    }
}

/// `SGP30_<n>` with a 1-based n
pub fn gas_label(index: usize) -> String {
    format!("SGP30_{}", index + 1)
}

/// Raw BME680 output for one forced-mode measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimateSample {
    pub temperature_c: f64,
    pub pressure_hpa: f64,
    pub humidity_pct: f64,
    pub gas_resistance_ohm: f64,
    /// Heater reached its target; gas resistance is only meaningful when set
    pub heat_stable: bool,
}

/// Climate fields of one cycle. Anything that could not be read is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClimateReading {
    pub temperature_c: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub gas_resistance_ohm: Option<f64>,
}

impl ClimateReading {
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        self.temperature_c.is_some()
    }
}

impl From<ClimateSample> for ClimateReading {
    fn from(sample: ClimateSample) -> Self {
        Self {
            temperature_c: Some(sample.temperature_c),
            pressure_hpa: Some(sample.pressure_hpa),
            humidity_pct: Some(sample.humidity_pct),
            gas_resistance_ohm: sample.heat_stable.then_some(sample.gas_resistance_ohm),
        }
    }
}

/// A CO2/TVOC sensor in the directional array
#[async_trait]
pub trait GasSensor: Send {
    /// Get sensor unique identifier
    fn id(&self) -> &str;

    /// Get current status
    fn status(&self) -> SensorStatus;

    /// Bring the sensor up (IAQ init etc.)
    async fn connect(&mut self) -> SensorResult<()>;

    /// Request a fresh measurement
    async fn measure(&mut self) -> SensorResult<GasSample>;
}

/// Temperature / pressure / humidity / gas-resistance sensor
#[async_trait]
pub trait ClimateSensor: Send {
    fn id(&self) -> &str;

    fn status(&self) -> SensorStatus;

    async fn connect(&mut self) -> SensorResult<()>;

    async fn measure(&mut self) -> SensorResult<ClimateSample>;
}

/// Sensor health metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorHealth {
    pub sensor_id: String,
    pub status: SensorStatus,
    pub readings_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
}

impl SensorHealth {
    pub fn new(sensor_id: &str) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            status: SensorStatus::Disconnected,
            readings_count: 0,
            error_count: 0,
            last_error: None,
        }
    }

    pub fn record_ok(&mut self) {
        self.readings_count += 1;
        self.status = SensorStatus::Active;
    }

    pub fn record_error(&mut self, error: &str) {
        self.error_count += 1;
        self.last_error = Some(error.to_string());
        self.status = SensorStatus::Error;
    }
}
