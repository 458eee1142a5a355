// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! Configuration module

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::direction::{default_entries, DirectionEntry};
use crate::hardware::{Mux, MAX_MUX_CHANNELS};
use crate::sensors::bme680::{Bme680Settings, BME680_ADDR_PRIMARY, BME680_ADDR_SECONDARY};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level
    pub log_level: String,

    /// Enable demo mode (simulated sensors)
    pub demo_mode: bool,

    /// Sampling loop configuration
    pub sampling: SamplingConfig,

    /// Sensor wiring
    pub sensors: SensorConfig,

    /// Sensor index to LED position
    pub direction: Vec<DirectionEntry>,

    /// LED ring
    pub leds: LedConfig,

    /// Exit / power-off buttons
    pub buttons: ButtonConfig,

    /// CSV export
    pub export: ExportConfig,

    /// Status window
    pub gui: GuiConfig,

    /// Smell classifier
    pub classifier: ClassifierConfig,

    /// Terminal report and stop keyword
    pub console: ConsoleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            demo_mode: false,
            sampling: SamplingConfig::default(),
            sensors: SensorConfig::default(),
            direction: default_entries(),
            leds: LedConfig::default(),
            buttons: ButtonConfig::default(),
            export: ExportConfig::default(),
            gui: GuiConfig::default(),
            classifier: ClassifierConfig::default(),
            console: ConsoleConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            // Create parent directories
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("onenose"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        let gas_count = self.sensors.gas_channels.len();
        if gas_count == 0 {
            bail!("no gas sensor channels configured");
        }
        if self.sampling.period_ms == 0 {
            bail!("sampling period must be positive");
        }
        if self.export.batch_size == Some(0) {
            bail!("batch size must be positive");
        }
        if !is_file_stem(&self.export.label) {
            bail!("label {:?} must be a plain file name part (no path separators)", self.export.label);
        }
        for mux in &self.sensors.muxes {
            if mux.channels == 0 || mux.channels > MAX_MUX_CHANNELS {
                bail!(
                    "multiplexer 0x{:02X} must have 1 to {} channels, not {}",
                    mux.address,
                    MAX_MUX_CHANNELS,
                    mux.channels
                );
            }
        }
        for ch in &self.sensors.gas_channels {
            if !self.sensors.muxes.iter().any(|m| m.address == ch.mux) {
                bail!("gas channel refers to unknown multiplexer 0x{:02X}", ch.mux);
            }
        }
        for entry in &self.direction {
            if entry.led as usize >= self.leds.count {
                bail!("LED {} for sensor {} is outside the {}-LED ring", entry.led, entry.sensor, self.leds.count);
            }
        }
        for &i in &self.sampling.scoring_subset {
            if i >= gas_count {
                warn!("Scoring subset index {} has no sensor and will be skipped", i);
            }
        }
        Ok(())
    }
}

/// Label goes into rotated file names, so it must stay inside the data directory
fn is_file_stem(label: &str) -> bool {
    !label.is_empty()
        && label != "."
        && label != ".."
        && !label.chars().any(|c| matches!(c, '/' | '\\') || c.is_control())
}

/// Sampling loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Time between cycle starts in milliseconds
    pub period_ms: u64,

    /// Sensor indices competing for the direction; empty means all
    pub scoring_subset: Vec<usize>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            period_ms: 1000,
            scoring_subset: vec![0, 1, 2, 3],
        }
    }
}

/// Multiplexer on the I2C bus
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MuxConfig {
    pub address: u8,
    pub channels: u8,
}

impl MuxConfig {
    pub fn to_mux(self) -> Mux {
        Mux { address: self.address, channels: self.channels }
    }
}

/// Mux channel carrying one SGP30
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GasChannel {
    pub mux: u8,
    pub channel: u8,
}

/// Simulated sensors for demo mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Probability a single read fails
    pub failure_rate: f64,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
    /// Reads before the simulated heater is stable
    pub warmup_reads: u32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.02,
            seed: None,
            warmup_reads: 5,
        }
    }
}

/// Sensor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// I2C bus device node
    pub i2c_bus: PathBuf,

    /// Multiplexers on the bus
    pub muxes: Vec<MuxConfig>,

    /// Gas sensors in index order
    pub gas_channels: Vec<GasChannel>,

    /// BME680 addresses, tried in order
    pub bme680_addresses: Vec<u8>,

    /// BME680 measurement settings
    pub bme680: Bme680Settings,

    /// Demo mode simulator
    pub simulator: SimulatorConfig,
}

impl Default for SensorConfig {
    fn default() -> Self {
        let gas_channels = (0..8)
            .map(|channel| GasChannel { mux: 0x70, channel })
            .chain((0..2).map(|channel| GasChannel { mux: 0x71, channel }))
            .collect();

        Self {
            i2c_bus: PathBuf::from("/dev/i2c-1"),
            muxes: vec![
                MuxConfig { address: 0x70, channels: 8 },
                MuxConfig { address: 0x71, channels: 8 },
            ],
            gas_channels,
            bme680_addresses: vec![BME680_ADDR_PRIMARY, BME680_ADDR_SECONDARY],
            bme680: Bme680Settings::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

/// LED ring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedConfig {
    pub enabled: bool,

    /// Number of pixels on the ring
    pub count: usize,

    /// SPI device whose MOSI drives the data line
    pub spi_device: PathBuf,

    /// Global brightness 0-255
    pub brightness: u8,

    /// Delay between pixels during a colour wipe
    pub wipe_step_ms: u64,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            count: 20,
            spi_device: PathBuf::from("/dev/spidev0.0"),
            brightness: 255,
            wipe_step_ms: 50,
        }
    }
}

/// GPIO button configuration (BCM numbering)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonConfig {
    pub enabled: bool,
    pub exit_pin: u8,
    pub poweroff_pin: u8,
    pub debounce_ms: u64,
    /// Run `sudo shutdown now` after a power-off press
    pub allow_poweroff: bool,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exit_pin: 17,
            poweroff_pin: 27,
            debounce_ms: 50,
            allow_poweroff: true,
        }
    }
}

/// CSV export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub enabled: bool,

    /// Output directory
    pub data_dir: PathBuf,

    /// File used when no batch size is set
    pub file_name: String,

    /// Cycles per file; `None` appends everything to one file
    pub batch_size: Option<u64>,

    /// Prefix of rotated file names
    pub label: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: PathBuf::from("Data"),
            file_name: "sensor_readings.csv".to_string(),
            batch_size: None,
            label: "run".to_string(),
        }
    }
}

/// GUI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuiConfig {
    pub enabled: bool,
    pub fullscreen: bool,
    pub title: String,
    pub subtitle: String,
    /// Window size when not fullscreen
    pub width: u32,
    pub height: u32,
}

impl Default for GuiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fullscreen: true,
            title: "OneNose".to_string(),
            subtitle: "Directional Electronic Nose".to_string(),
            width: 800,
            height: 480,
        }
    }
}

/// Classifier configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// JSON model artifact; classification is off without one
    pub model_path: Option<PathBuf>,
}

/// Console configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Print the per-cycle report to stdout
    pub report: bool,
    /// Watch stdin for the stop keyword
    pub listen: bool,
    /// Typing this line on stdin stops the run
    pub stop_keyword: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            report: true,
            listen: true,
            stop_keyword: "stop".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_wiring() {
        let config = Config::default();
        assert_eq!(config.sensors.gas_channels.len(), 10);
        assert_eq!(config.sensors.gas_channels[8], GasChannel { mux: 0x71, channel: 0 });
        assert_eq!(config.direction.len(), 4);
        config.validate().unwrap();
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.sensors.gas_channels, created.sensors.gas_channels);
        assert_eq!(loaded.direction, created.direction);
        assert_eq!(loaded.sampling.period_ms, 1000);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            demo_mode = true
            [sampling]
            period_ms = 250
            "#,
        )
        .unwrap();
        assert!(config.demo_mode);
        assert_eq!(config.sampling.period_ms, 250);
        assert_eq!(config.sampling.scoring_subset, vec![0, 1, 2, 3]);
        assert_eq!(config.leds.count, 20);
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "sampling = [not toml").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_led_outside_ring_rejected() {
        let mut config = Config::default();
        config.direction.push(DirectionEntry { sensor: 4, led: 20 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mux_channel_count_bounded() {
        let mut config = Config::default();
        config.sensors.muxes[1].channels = 9;
        assert!(config.validate().is_err());

        config.sensors.muxes[1].channels = 0;
        assert!(config.validate().is_err());

        config.sensors.muxes[1].channels = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_label_cannot_escape_data_dir() {
        for bad in ["", "..", "../up", "a/b", "a\\b"] {
            let mut config = Config::default();
            config.export.label = bad.to_string();
            assert!(config.validate().is_err(), "label {:?} accepted", bad);
        }

        let mut config = Config::default();
        config.export.label = "coffee-2.beans".to_string();
        assert!(config.validate().is_ok());
    }
}
