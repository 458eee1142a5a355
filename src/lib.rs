// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! OneNose - Directional Electronic Nose
//!
//! Samples an array of SGP30 gas sensors (behind two I2C multiplexers) and a
//! BME680 climate sensor on a fixed period, points an LED ring toward the
//! strongest gas source, and logs every cycle to CSV.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌────────────────────┐
//! │ Sensors  │ → │ Analysis │ → │ Direction │ → │ Streaming sinks    │
//! │ (array)  │   │ (scores) │   │ (LED map) │   │ console/csv/led/ui │
//! └──────────┘   └──────────┘   └───────────┘   └────────────────────┘
//!       ↑                core::SamplingLoop drives one cycle per tick
//!  hardware (I2C, muxes)     core::Shutdown stops it between cycles
//! ```

pub mod analysis;
pub mod config;
pub mod core;
pub mod detection;
pub mod direction;
pub mod error;
pub mod hardware;
pub mod sensors;
pub mod streaming;

#[cfg(feature = "gui")]
pub mod ui;

// Re-exports for convenience
pub use config::Config;
pub use core::{CycleRecord, Engine, LoopSummary, StopReason};
pub use error::{SensorError, SensorResult};

/// OneNose version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// OneNose name
pub const NAME: &str = "OneNose";
