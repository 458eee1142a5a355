// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! Sensirion SGP30 CO2eq / TVOC sensor

use std::time::Duration;
use async_trait::async_trait;
use tracing::debug;

use super::{GasSample, GasSensor, SensorStatus};
use crate::error::{SensorError, SensorResult};
use crate::hardware::I2cDevice;

/// Fixed SGP30 slave address
pub const SGP30_ADDRESS: u8 = 0x58;

const CMD_IAQ_INIT: [u8; 2] = [0x20, 0x03];
const CMD_MEASURE_IAQ: [u8; 2] = [0x20, 0x08];
const CMD_GET_SERIAL_ID: [u8; 2] = [0x36, 0x82];

const IAQ_INIT_DELAY: Duration = Duration::from_millis(10);
const MEASURE_DELAY: Duration = Duration::from_millis(12);
const SERIAL_DELAY: Duration = Duration::from_millis(1);

/// Sensirion CRC-8: polynomial 0x31, init 0xFF, no reflection
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x31 } else { crc << 1 };
        }
    }
    crc
}

/// Split a reply into 16-bit words, checking each word's CRC byte
pub fn decode_words(bytes: &[u8]) -> SensorResult<Vec<u16>> {
    bytes
        .chunks_exact(3)
        .map(|chunk| {
            let expected = crc8(&chunk[..2]);
            if expected != chunk[2] {
                return Err(SensorError::Crc { expected, actual: chunk[2] });
            }
            Ok(u16::from_be_bytes([chunk[0], chunk[1]]))
        })
        .collect()
}

/// One SGP30 on the array
pub struct Sgp30 {
    id: String,
    device: I2cDevice,
    status: SensorStatus,
    serial: Option<u64>,
}

impl Sgp30 {
    pub fn new(id: &str, device: I2cDevice) -> Self {
        Self {
            id: id.to_string(),
            device,
            status: SensorStatus::Disconnected,
            serial: None,
        }
    }

    /// 48-bit chip serial, known after `connect`
    pub fn serial(&self) -> Option<u64> {
        self.serial
    }

    async fn read_serial(&self) -> SensorResult<u64> {
        let reply = self.device.command(&CMD_GET_SERIAL_ID, SERIAL_DELAY, 9).await?;
        let words = decode_words(&reply)?;
        Ok(words.iter().fold(0u64, |acc, &w| (acc << 16) | w as u64))
    }
}

#[async_trait]
impl GasSensor for Sgp30 {
    fn id(&self) -> &str { &self.id }
    fn status(&self) -> SensorStatus { self.status }

    async fn connect(&mut self) -> SensorResult<()> {
        match self.read_serial().await {
            Ok(serial) => {
                debug!("{} serial {:012X}", self.id, serial);
                self.serial = Some(serial);
            }
            Err(e) => {
                self.status = SensorStatus::Error;
                return Err(e);
            }
        }

        if let Err(e) = self.device.command(&CMD_IAQ_INIT, IAQ_INIT_DELAY, 0).await {
            self.status = SensorStatus::Error;
            return Err(e);
        }

        self.status = SensorStatus::Connected;
        Ok(())
    }

    async fn measure(&mut self) -> SensorResult<GasSample> {
        if self.status == SensorStatus::Disconnected {
            return Err(SensorError::NotConnected(self.id.clone()));
        }

        let reply = self.device.command(&CMD_MEASURE_IAQ, MEASURE_DELAY, 6).await?;
        let words = decode_words(&reply)?;
        self.status = SensorStatus::Active;

        Ok(GasSample {
            co2_ppm: words[0],
            tvoc_ppb: words[1],
        })
    }
}
