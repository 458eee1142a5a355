// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! Sensor simulator for demo/testing

use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use rand::prelude::*;
use rand::rngs::StdRng;

use super::{ClimateSample, ClimateSensor, GasSample, GasSensor, SensorStatus};
use crate::error::{SensorError, SensorResult};

/// Outer sensors sit on the ring a quarter turn apart
const OUTER_SENSORS: usize = 4;

const CO2_BASELINE: f64 = 400.0;
const CO2_PEAK: f64 = 2600.0;
const TVOC_BASELINE: f64 = 5.0;
const TVOC_PEAK: f64 = 450.0;

/// A smell source wandering around the nose
pub struct PlumeModel {
    rng: StdRng,
    source_angle: f64,
    strength: f64,
    drift: f64,
    noise: f64,
}

pub type SharedPlume = Arc<Mutex<PlumeModel>>;

impl PlumeModel {
    pub fn new(seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let source_angle = rng.gen_range(0.0..TAU);
        Self {
            rng,
            source_angle,
            strength: 0.6,
            drift: 0.15,
            noise: 0.03,
        }
    }

    /// Fixed source, no drift or noise
    pub fn fixed(angle: f64, strength: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(0),
            source_angle: angle,
            strength,
            drift: 0.0,
            noise: 0.0,
        }
    }

    pub fn shared(self) -> SharedPlume {
        Arc::new(Mutex::new(self))
    }

    pub fn source_angle(&self) -> f64 {
        self.source_angle
    }

    /// Move the source one step
    pub fn advance(&mut self) {
        if self.drift > 0.0 {
            self.source_angle = (self.source_angle + self.rng.gen_range(-self.drift..self.drift)).rem_euclid(TAU);
            self.strength = (self.strength + self.rng.gen_range(-0.05..0.05)).clamp(0.1, 1.0);
        }
    }

    /// Exposure in [0, 1] of the sensor at `index`. Inner sensors see the
    /// mean of the outer ring.
    fn exposure(&self, index: usize) -> f64 {
        let facing = |i: usize| {
            let angle = i as f64 * FRAC_PI_2;
            let diff = (self.source_angle - angle + PI).rem_euclid(TAU) - PI;
            diff.cos().max(0.0).powi(2) * self.strength
        };
        if index < OUTER_SENSORS {
            facing(index)
        } else {
            (0..OUTER_SENSORS).map(facing).sum::<f64>() / OUTER_SENSORS as f64
        }
    }

    pub fn sample(&mut self, index: usize) -> GasSample {
        let mut exposure = self.exposure(index);
        if self.noise > 0.0 {
            exposure += self.rng.gen_range(-self.noise..self.noise);
        }
        let exposure = exposure.clamp(0.0, 1.0);
        GasSample {
            co2_ppm: (CO2_BASELINE + CO2_PEAK * exposure).round() as u16,
            tvoc_ppb: (TVOC_BASELINE + TVOC_PEAK * exposure).round() as u16,
        }
    }

    fn roll(&mut self, rate: f64) -> bool {
        rate > 0.0 && self.rng.gen::<f64>() < rate
    }
}

/// SGP30 stand-in reading from a shared plume
pub struct SimulatedSgp30 {
    id: String,
    index: usize,
    plume: SharedPlume,
    failure_rate: f64,
    status: SensorStatus,
}

impl SimulatedSgp30 {
    pub fn new(id: &str, index: usize, plume: SharedPlume, failure_rate: f64) -> Self {
        Self {
            id: id.to_string(),
            index,
            plume,
            failure_rate,
            status: SensorStatus::Disconnected,
        }
    }
}

#[async_trait]
impl GasSensor for SimulatedSgp30 {
    fn id(&self) -> &str { &self.id }
    fn status(&self) -> SensorStatus { self.status }

    async fn connect(&mut self) -> SensorResult<()> {
        self.status = SensorStatus::Connected;
        Ok(())
    }

    async fn measure(&mut self) -> SensorResult<GasSample> {
        let mut plume = self
            .plume
            .lock()
            .map_err(|_| SensorError::Simulated(self.id.clone()))?;
        // First sensor of the cycle moves the source
        if self.index == 0 {
            plume.advance();
        }
        if plume.roll(self.failure_rate) {
            self.status = SensorStatus::Error;
            return Err(SensorError::Simulated(self.id.clone()));
        }
        self.status = SensorStatus::Active;
        Ok(plume.sample(self.index))
    }
}

/// BME680 stand-in; gas resistance becomes heat-stable after a warm-up
pub struct SimulatedBme680 {
    id: String,
    rng: StdRng,
    reads: u32,
    warmup_reads: u32,
    failure_rate: f64,
    ambient_c: f64,
    status: SensorStatus,
}

impl SimulatedBme680 {
    pub fn new(id: &str, seed: Option<u64>, warmup_reads: u32, failure_rate: f64) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            id: id.to_string(),
            rng,
            reads: 0,
            warmup_reads,
            failure_rate,
            ambient_c: 22.0,
            status: SensorStatus::Disconnected,
        }
    }
}

#[async_trait]
impl ClimateSensor for SimulatedBme680 {
    fn id(&self) -> &str { &self.id }
    fn status(&self) -> SensorStatus { self.status }

    async fn connect(&mut self) -> SensorResult<()> {
        self.status = SensorStatus::Connected;
        Ok(())
    }

    async fn measure(&mut self) -> SensorResult<ClimateSample> {
        self.reads += 1;
        if self.failure_rate > 0.0 && self.rng.gen::<f64>() < self.failure_rate {
            self.status = SensorStatus::Error;
            return Err(SensorError::Simulated(self.id.clone()));
        }

        self.ambient_c += self.rng.gen_range(-0.02..0.02);
        self.status = SensorStatus::Active;
        Ok(ClimateSample {
            temperature_c: self.ambient_c + self.rng.gen_range(-0.05..0.05),
            pressure_hpa: 1013.25 + self.rng.gen_range(-0.5..0.5),
            humidity_pct: 45.0 + self.rng.gen_range(-1.0..1.0),
            gas_resistance_ohm: 50_000.0 + self.rng.gen_range(-2_000.0..2_000.0),
            heat_stable: self.reads > self.warmup_reads,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sensor_facing_source_reads_highest() {
        // source at 90°, facing sensor 1
        let plume = PlumeModel::fixed(FRAC_PI_2, 1.0).shared();
        let mut sensors: Vec<SimulatedSgp30> = (0..OUTER_SENSORS)
            .map(|i| SimulatedSgp30::new(&format!("sim-{}", i), i, plume.clone(), 0.0))
            .collect();

        let mut co2 = Vec::new();
        for s in sensors.iter_mut() {
            s.connect().await.unwrap();
            co2.push(s.measure().await.unwrap().co2_ppm);
        }
        let max = co2.iter().copied().max().unwrap();
        assert_eq!(co2[1], max);
        assert_eq!(co2[3], CO2_BASELINE as u16);
    }

    #[tokio::test]
    async fn test_values_stay_in_sensor_range() {
        let plume = PlumeModel::new(Some(7)).shared();
        let mut inner = SimulatedSgp30::new("sim-5", 5, plume.clone(), 0.0);
        let mut first = SimulatedSgp30::new("sim-1", 0, plume, 0.0);
        for _ in 0..200 {
            for sample in [first.measure().await.unwrap(), inner.measure().await.unwrap()] {
                assert!((400..=60000).contains(&sample.co2_ppm));
                assert!(sample.tvoc_ppb <= 60000);
            }
        }
    }

    #[tokio::test]
    async fn test_failure_rate_one_always_fails() {
        let plume = PlumeModel::new(Some(1)).shared();
        let mut sgp = SimulatedSgp30::new("sim-1", 0, plume, 1.0);
        assert!(matches!(sgp.measure().await, Err(SensorError::Simulated(_))));
        assert_eq!(sgp.status(), SensorStatus::Error);
    }

    #[tokio::test]
    async fn test_bme680_warms_up() {
        let mut bme = SimulatedBme680::new("sim-bme", Some(3), 2, 0.0);
        assert!(!bme.measure().await.unwrap().heat_stable);
        assert!(!bme.measure().await.unwrap().heat_stable);
        assert!(bme.measure().await.unwrap().heat_stable);
    }
}
