// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! Sensor array - the ten gas sensors and the climate sensor

use std::sync::Arc;
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::bme680::Bme680;
use super::sgp30::{Sgp30, SGP30_ADDRESS};
use super::simulator::{PlumeModel, SimulatedBme680, SimulatedSgp30};
use super::{gas_label, ClimateReading, ClimateSensor, GasReading, GasSensor, SensorHealth};
use crate::config::SensorConfig;
use crate::hardware::{I2cDevice, Mux, MuxRoute, SharedBus};

struct Slot<S: ?Sized> {
    sensor: Box<S>,
    connected: bool,
    health: SensorHealth,
}

impl<S: ?Sized> Slot<S> {
    fn new(sensor: Box<S>, id: &str) -> Self {
        Self { sensor, connected: false, health: SensorHealth::new(id) }
    }
}

/// Owns every sensor and reads them in array order.
///
/// A sensor that failed to come up is retried at the start of its next read,
/// so a loose cable does not take it out for the whole run.
pub struct SensorArray {
    gas: Vec<Slot<dyn GasSensor>>,
    climate: Option<Slot<dyn ClimateSensor>>,
}

impl SensorArray {
    pub fn new(gas: Vec<Box<dyn GasSensor>>, climate: Option<Box<dyn ClimateSensor>>) -> Self {
        let gas = gas
            .into_iter()
            .enumerate()
            .map(|(i, s)| Slot::new(s, &gas_label(i)))
            .collect();
        let climate = climate.map(|s| Slot::new(s, "BME680"));
        Self { gas, climate }
    }

    /// Plume simulator standing in for the whole array
    pub fn simulated(config: &SensorConfig) -> Self {
        let sim = &config.simulator;
        let plume = PlumeModel::new(sim.seed).shared();
        let gas: Vec<Box<dyn GasSensor>> = (0..config.gas_channels.len())
            .map(|i| {
                Box::new(SimulatedSgp30::new(&gas_label(i), i, plume.clone(), sim.failure_rate))
                    as Box<dyn GasSensor>
            })
            .collect();
        let climate = SimulatedBme680::new("BME680", sim.seed, sim.warmup_reads, sim.failure_rate);

        info!("Simulating {} gas sensors", gas.len());
        Self::new(gas, Some(Box::new(climate)))
    }

    /// Drivers for the configured wiring on an already-open bus
    pub fn from_bus(bus: SharedBus, config: &SensorConfig) -> Result<Self> {
        let muxes: Arc<[Mux]> = config.muxes.iter().map(|m| m.to_mux()).collect();

        let mut gas: Vec<Box<dyn GasSensor>> = Vec::with_capacity(config.gas_channels.len());
        for (i, ch) in config.gas_channels.iter().enumerate() {
            let route = MuxRoute { mux: ch.mux, channel: ch.channel };
            let device = I2cDevice::routed(bus.clone(), SGP30_ADDRESS, route, muxes.clone())
                .with_context(|| format!("{} wiring", gas_label(i)))?;
            gas.push(Box::new(Sgp30::new(&gas_label(i), device)));
        }

        let candidates = config
            .bme680_addresses
            .iter()
            .map(|&addr| I2cDevice::direct(bus.clone(), addr, muxes.clone()))
            .collect();
        let climate = Bme680::new("BME680", candidates, config.bme680.clone());

        Ok(Self::new(gas, Some(Box::new(climate))))
    }

    /// Open the Linux I2C bus and build the drivers. Failing to open the bus
    /// is fatal; individual sensors and multiplexers may still be missing.
    #[cfg(feature = "hardware")]
    pub async fn open_hardware(config: &SensorConfig) -> Result<Self> {
        use crate::hardware::{deselect_all, shared, LinuxI2cBus};

        let bus = LinuxI2cBus::open(&config.i2c_bus)
            .with_context(|| format!("opening {}", config.i2c_bus.display()))?;
        let bus = shared(Box::new(bus));
        let muxes: Vec<Mux> = config.muxes.iter().map(|m| m.to_mux()).collect();
        for (addr, e) in deselect_all(&bus, &muxes).await {
            warn!("Multiplexer 0x{:02X} not responding, its sensors will read as failed: {}", addr, e);
        }

        Self::from_bus(bus, config)
    }

    pub fn gas_count(&self) -> usize {
        self.gas.len()
    }

    /// Bring up every sensor; failures are logged and retried on read
    pub async fn connect_all(&mut self) {
        for slot in self.gas.iter_mut() {
            connect_gas(slot).await;
        }
        if let Some(slot) = self.climate.as_mut() {
            connect_climate(slot).await;
        }
    }

    /// One reading per gas sensor, in index order
    pub async fn read_gas(&mut self) -> Vec<GasReading> {
        let mut readings = Vec::with_capacity(self.gas.len());
        for (i, slot) in self.gas.iter_mut().enumerate() {
            if !slot.connected && !connect_gas(slot).await {
                let reason = slot.health.last_error.clone().unwrap_or_else(|| "not connected".into());
                readings.push(GasReading::failed(i, reason));
                continue;
            }
            match slot.sensor.measure().await {
                Ok(sample) => {
                    slot.health.record_ok();
                    readings.push(GasReading::ok(i, sample));
                }
                Err(e) => {
                    debug!("Read error for {}: {}", slot.sensor.id(), e);
                    slot.health.record_error(&e.to_string());
                    readings.push(GasReading::failed(i, e.to_string()));
                }
            }
        }
        readings
    }

    pub async fn read_climate(&mut self) -> ClimateReading {
        let Some(slot) = self.climate.as_mut() else {
            return ClimateReading::unavailable();
        };
        if !slot.connected && !connect_climate(slot).await {
            return ClimateReading::unavailable();
        }
        match slot.sensor.measure().await {
            Ok(sample) => {
                slot.health.record_ok();
                ClimateReading::from(sample)
            }
            Err(e) => {
                debug!("Read error for {}: {}", slot.sensor.id(), e);
                slot.health.record_error(&e.to_string());
                ClimateReading::unavailable()
            }
        }
    }

    pub fn health(&self) -> Vec<SensorHealth> {
        self.gas
            .iter()
            .map(|s| s.health.clone())
            .chain(self.climate.iter().map(|s| s.health.clone()))
            .collect()
    }
}

async fn connect_gas(slot: &mut Slot<dyn GasSensor>) -> bool {
    match slot.sensor.connect().await {
        Ok(()) => {
            info!("Connected sensor: {}", slot.sensor.id());
            slot.connected = true;
            slot.health.status = slot.sensor.status();
        }
        Err(e) => {
            warn!("Failed to connect sensor {}: {}", slot.sensor.id(), e);
            slot.health.record_error(&e.to_string());
        }
    }
    slot.connected
}

async fn connect_climate(slot: &mut Slot<dyn ClimateSensor>) -> bool {
    match slot.sensor.connect().await {
        Ok(()) => {
            info!("Connected sensor: {}", slot.sensor.id());
            slot.connected = true;
            slot.health.status = slot.sensor.status();
        }
        Err(e) => {
            warn!("Failed to connect sensor {}: {}", slot.sensor.id(), e);
            slot.health.record_error(&e.to_string());
        }
    }
    slot.connected
}
