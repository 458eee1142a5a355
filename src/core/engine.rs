//! Run orchestration - builds sensors and outputs from the configuration

use std::sync::Arc;
use std::time::Duration;
use anyhow::{bail, Result};
use tracing::{info, warn};

use super::sampler::{LoopSummary, SamplingLoop};
use super::shutdown::{watch_console, watch_interrupt, ShutdownSignal, ShutdownTrigger};
use crate::analysis::ScoringPolicy;
use crate::config::Config;
use crate::detection::SmellClassifier;
use crate::direction::DirectionMap;
use crate::hardware::{blank, color_wipe, shared_ring, ChannelScan, MemoryRing, Rgb, SharedRing};
use crate::sensors::SensorArray;
use crate::streaming::{ConsoleSink, CsvExporter, LedSink, StatusSink};

/// One sampling run
pub struct Engine {
    pub config: Arc<Config>,
    ring: Option<SharedRing>,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let ring = open_ring(&config);
        Ok(Self {
            config: Arc::new(config),
            ring,
        })
    }

    async fn open_sensors(&self) -> Result<SensorArray> {
        if self.config.demo_mode {
            return Ok(SensorArray::simulated(&self.config.sensors));
        }
        #[cfg(feature = "hardware")]
        {
            SensorArray::open_hardware(&self.config.sensors).await
        }
        #[cfg(not(feature = "hardware"))]
        {
            bail!("built without the `hardware` feature; run with --demo")
        }
    }

    /// Open the sensors and every output. Anything that fails here is fatal
    /// and happens before the first cycle or the status window.
    pub async fn prepare(self, status: Option<StatusSink>) -> Result<Session> {
        let config = self.config.clone();
        info!("Starting OneNose engine...");

        let sensors = self.open_sensors().await?;
        if sensors.gas_count() != config.sensors.gas_channels.len() {
            bail!("sensor array does not match the configured wiring");
        }

        let direction = Arc::new(DirectionMap::new(config.direction.iter().copied()));
        let mut sampler = SamplingLoop::new(
            sensors,
            direction,
            ScoringPolicy::new(config.sampling.scoring_subset.clone()),
            Duration::from_millis(config.sampling.period_ms),
        )
        .with_classifier(SmellClassifier::load_optional(config.classifier.model_path.as_deref()));

        if config.console.report {
            sampler.add_sink(Box::new(ConsoleSink::stdout()));
        }
        if config.export.enabled {
            let export = &config.export;
            sampler.add_sink(Box::new(CsvExporter::new(
                &export.data_dir,
                &export.file_name,
                &export.label,
                export.batch_size,
                config.sensors.gas_channels.len(),
            )?));
        }
        if let Some(ring) = &self.ring {
            sampler.add_sink(Box::new(LedSink::new(ring.clone())));
        }
        if let Some(status) = status {
            sampler.add_sink(Box::new(status));
        }

        Ok(Session {
            config,
            ring: self.ring,
            sampler,
        })
    }

    /// Prepare, then run until a stop is requested
    pub async fn run(
        self,
        trigger: ShutdownTrigger,
        signal: ShutdownSignal,
        status: Option<StatusSink>,
    ) -> Result<LoopSummary> {
        let session = self.prepare(status).await?;
        Ok(session.run(trigger, signal).await)
    }
}

/// A run whose sensors and outputs are open
pub struct Session {
    config: Arc<Config>,
    ring: Option<SharedRing>,
    sampler: SamplingLoop,
}

impl Session {
    pub async fn run(self, trigger: ShutdownTrigger, signal: ShutdownSignal) -> LoopSummary {
        let Session { config, ring, sampler } = self;

        let interrupt = watch_interrupt(trigger.clone());
        let console = config
            .console
            .listen
            .then(|| watch_console(trigger.clone(), config.console.stop_keyword.clone()));

        #[cfg(feature = "hardware")]
        let _buttons = if config.buttons.enabled && !config.demo_mode {
            match crate::hardware::ButtonWatcher::start(
                config.buttons.exit_pin,
                config.buttons.poweroff_pin,
                Duration::from_millis(config.buttons.debounce_ms),
                trigger.clone(),
            ) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!("Buttons unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let wipe_step = Duration::from_millis(config.leds.wipe_step_ms);
        if let Some(ring) = &ring {
            if let Err(e) = color_wipe(ring, Rgb::GREEN, wipe_step).await {
                warn!("LED ring: {}", e);
            }
        }

        let summary = sampler.run(signal).await;

        if let Some(ring) = &ring {
            let farewell = async {
                color_wipe(ring, Rgb::RED, wipe_step).await?;
                blank(ring).await
            };
            if let Err(e) = farewell.await {
                warn!("LED ring: {}", e);
            }
        }

        interrupt.abort();
        if let Some(console) = console {
            console.abort();
        }

        for h in summary.health.iter().filter(|h| h.error_count > 0) {
            info!("{}: {} readings, {} errors (last: {:?})", h.sensor_id, h.readings_count, h.error_count, h.last_error);
        }
        info!("OneNose engine stopped ({:?})", summary.reason);
        summary
    }
}

fn open_ring(config: &Config) -> Option<SharedRing> {
    if !config.leds.enabled {
        return None;
    }
    if config.demo_mode {
        return Some(shared_ring(Box::new(MemoryRing::new(config.leds.count))));
    }
    open_spi_ring(config)
}

#[cfg(feature = "hardware")]
fn open_spi_ring(config: &Config) -> Option<SharedRing> {
    let leds = &config.leds;
    match crate::hardware::SpiLedRing::open(&leds.spi_device, leds.count, leds.brightness) {
        Ok(ring) => Some(shared_ring(Box::new(ring))),
        Err(e) => {
            warn!("LED ring unavailable: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "hardware"))]
fn open_spi_ring(_config: &Config) -> Option<SharedRing> {
    None
}

/// Cycle red, green and blue wipes until stopped
pub async fn led_test(config: &Config, mut signal: ShutdownSignal) -> Result<()> {
    let Some(ring) = open_ring(config) else {
        bail!("LED ring disabled or unavailable");
    };
    let step = Duration::from_millis(config.leds.wipe_step_ms);

    'outer: loop {
        for color in [Rgb::RED, Rgb::GREEN, Rgb::BLUE] {
            tokio::select! {
                biased;
                _ = signal.wait() => break 'outer,
                result = color_wipe(&ring, color, step) => result?,
            }
        }
    }

    blank(&ring).await?;
    Ok(())
}

/// List devices behind every multiplexer channel
pub async fn scan_bus(config: &Config) -> Result<Vec<ChannelScan>> {
    #[cfg(feature = "hardware")]
    {
        use crate::hardware::{scan, shared, LinuxI2cBus, Mux};

        let bus = shared(Box::new(LinuxI2cBus::open(&config.sensors.i2c_bus)?));
        let muxes: Vec<Mux> = config.sensors.muxes.iter().map(|m| m.to_mux()).collect();
        Ok(scan(&bus, &muxes).await?)
    }
    #[cfg(not(feature = "hardware"))]
    {
        let _ = config;
        bail!("built without the `hardware` feature")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shutdown::{channel, StopReason};

    fn demo_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.demo_mode = true;
        config.console.report = false;
        config.console.listen = false;
        config.sampling.period_ms = 5;
        config.leds.wipe_step_ms = 0;
        config.export.data_dir = dir.to_path_buf();
        config.sensors.simulator.seed = Some(11);
        config
    }

    #[tokio::test]
    async fn test_demo_run_writes_csv_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(demo_config(dir.path())).unwrap();
        let (trigger, signal) = channel();
        let (status, mut feed) = StatusSink::new();

        let stopper = trigger.clone();
        tokio::spawn(async move {
            while feed.changed().await.is_ok() {
                let cycle = feed.borrow().as_ref().map(|r| r.cycle).unwrap_or(0);
                if cycle >= 3 {
                    stopper.stop(StopReason::GuiClosed);
                    break;
                }
            }
        });

        let summary = engine.run(trigger, signal, Some(status)).await.unwrap();
        assert!(summary.cycles >= 3);
        assert_eq!(summary.reason, Some(StopReason::GuiClosed));

        let csv = std::fs::read_to_string(dir.path().join("sensor_readings.csv")).unwrap();
        assert_eq!(csv.lines().count() as u64, summary.cycles + 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.sampling.period_ms = 0;
        assert!(Engine::new(config).is_err());
    }

    #[tokio::test]
    async fn test_unusable_data_dir_fails_before_first_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let engine = Engine::new(demo_config(&blocker.join("Data"))).unwrap();

        assert!(engine.prepare(None).await.is_err());
    }

    #[cfg(not(feature = "hardware"))]
    #[tokio::test]
    async fn test_missing_bus_fails_before_first_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = demo_config(dir.path());
        config.demo_mode = false;
        config.leds.enabled = false;
        let engine = Engine::new(config).unwrap();

        assert!(engine.prepare(None).await.is_err());
        assert!(!dir.path().join("sensor_readings.csv").exists());
    }

    #[tokio::test]
    async fn test_led_test_stops_on_signal() {
        let mut config = Config::default();
        config.demo_mode = true;
        config.leds.wipe_step_ms = 1;
        let (trigger, signal) = channel();
        trigger.stop(StopReason::Interrupt);
        led_test(&config, signal).await.unwrap();
    }
}
