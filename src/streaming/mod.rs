//! Streaming module - per-cycle outputs: console report, CSV export, LED ring, status window

mod export;
mod indicator;

pub use export::*;
pub use indicator::*;

use std::io::Write;
use std::sync::Arc;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

use crate::core::CycleRecord;
use crate::sensors::gas_label;

/// Consumer of cycle records
#[async_trait]
pub trait RecordSink: Send {
    fn name(&self) -> &str;

    async fn accept(&mut self, record: &CycleRecord) -> Result<()>;

    /// Flush and release resources after the last cycle
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Human-readable per-cycle report
pub struct ConsoleSink<W: Write + Send> {
    out: W,
}

impl ConsoleSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: std::io::stdout() }
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_report(&mut self, record: &CycleRecord) -> std::io::Result<()> {
        let rule = "-".repeat(50);
        writeln!(self.out, "{}", rule)?;
        for reading in &record.gas {
            match reading.sample {
                Some(s) => writeln!(self.out, "{}: CO2={}ppm, TVOC={}ppb", reading.label(), s.co2_ppm, s.tvoc_ppb)?,
                None => writeln!(self.out, "{}: Error reading sensor", reading.label())?,
            }
        }
        writeln!(self.out, "{}", rule)?;

        match (record.winner, record.indicator) {
            (Some(w), Some(led)) => writeln!(self.out, "Highest: {} (score {:.4}) -> LED {}", gas_label(w.index), w.score, led)?,
            (Some(w), None) => writeln!(self.out, "Highest: {} (score {:.4})", gas_label(w.index), w.score)?,
            (None, _) => writeln!(self.out, "Highest: none")?,
        }

        let c = &record.climate;
        if let (Some(t), Some(p), Some(h)) = (c.temperature_c, c.pressure_hpa, c.humidity_pct) {
            let line = format!("{:.2} C,{:.2} hPa,{:.2} %RH", t, p, h);
            match c.gas_resistance_ohm {
                Some(ohms) => writeln!(self.out, "{},{:.0} Ohms", line, ohms)?,
                None => writeln!(self.out, "{}", line)?,
            }
        } else {
            writeln!(self.out, "BME680: unavailable")?;
        }

        if record.classification != crate::detection::ClassificationOutcome::Disabled {
            writeln!(self.out, "Smell: {}", record.classification.describe())?;
        }
        self.out.flush()
    }
}

#[async_trait]
impl<W: Write + Send> RecordSink for ConsoleSink<W> {
    fn name(&self) -> &str {
        "console"
    }

    async fn accept(&mut self, record: &CycleRecord) -> Result<()> {
        self.write_report(record)?;
        Ok(())
    }
}

/// Latest record for the status window
pub type StatusFeed = watch::Receiver<Option<Arc<CycleRecord>>>;

/// Publishes each record to a watch channel
pub struct StatusSink {
    tx: watch::Sender<Option<Arc<CycleRecord>>>,
}

impl StatusSink {
    pub fn new() -> (Self, StatusFeed) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl RecordSink for StatusSink {
    fn name(&self) -> &str {
        "status window"
    }

    async fn accept(&mut self, record: &CycleRecord) -> Result<()> {
        // No receiver left just means the window was closed
        self.tx.send_replace(Some(Arc::new(record.clone())));
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{Local, TimeZone};

    use crate::analysis::Winner;
    use crate::core::CycleRecord;
    use crate::detection::ClassificationOutcome;
    use crate::sensors::{ClimateReading, GasReading, GasSample};

    /// Two gas sensors, the second failed; climate without gas resistance
    pub fn record(cycle: u64) -> CycleRecord {
        CycleRecord {
            cycle,
            timestamp: Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
            gas: vec![
                GasReading::ok(0, GasSample { co2_ppm: 1200, tvoc_ppb: 85 }),
                GasReading::failed(1, "nack"),
            ],
            scores: vec![0.0147, -1.0],
            winner: Some(Winner { index: 0, score: 0.0147 }),
            indicator: Some(1),
            climate: ClimateReading {
                temperature_c: Some(21.456),
                pressure_hpa: Some(1013.254),
                humidity_pct: Some(40.0),
                gas_resistance_ohm: None,
            },
            classification: ClassificationOutcome::Disabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::record;
    use super::*;

    #[tokio::test]
    async fn test_console_report() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.accept(&record(1)).await.unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();

        assert!(text.contains("SGP30_1: CO2=1200ppm, TVOC=85ppb"));
        assert!(text.contains("SGP30_2: Error reading sensor"));
        assert!(text.contains("Highest: SGP30_1 (score 0.0147) -> LED 1"));
        assert!(text.contains("21.46 C,1013.25 hPa,40.00 %RH\n"));
        assert!(!text.contains("Ohms"));
        assert!(!text.contains("Smell"));
    }

    #[tokio::test]
    async fn test_status_sink_keeps_latest() {
        let (mut sink, feed) = StatusSink::new();
        sink.accept(&record(1)).await.unwrap();
        sink.accept(&record(2)).await.unwrap();
        assert_eq!(feed.borrow().as_ref().map(|r| r.cycle), Some(2));

        drop(feed);
        assert!(sink.accept(&record(3)).await.is_ok());
    }
}
