// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! Driver-level error types

use thiserror::Error;

/// Errors raised by sensor drivers and the buses underneath them.
///
/// Every variant is recoverable at the sampling-loop level: a failed read is
/// recorded as an absent value and the next cycle simply tries again.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("I2C transfer to 0x{addr:02X} failed: {message}")]
    Bus { addr: u8, message: String },

    #[error("I2C bus unavailable: {0}")]
    BusUnavailable(String),

    #[error("Multiplexer 0x{mux:02X} has no channel {channel}")]
    InvalidChannel { mux: u8, channel: u8 },

    #[error("CRC mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    Crc { expected: u8, actual: u8 },

    #[error("Unexpected chip id: expected 0x{expected:02X}, found 0x{found:02X}")]
    ChipId { expected: u8, found: u8 },

    #[error("Sensor {0} not connected")]
    NotConnected(String),

    #[error("Measurement not ready after {attempts} polls")]
    NotReady { attempts: u32 },

    #[error("Simulated fault on {0}")]
    Simulated(String),

    #[error("SPI transfer failed: {0}")]
    Spi(String),

    #[error("GPIO error: {0}")]
    Gpio(String),
}

pub type SensorResult<T> = std::result::Result<T, SensorError>;
