//! CSV export with optional batch rotation

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::RecordSink;
use crate::core::CycleRecord;
use crate::sensors::gas_label;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Column names for `gas_count` gas sensors
pub fn csv_header(gas_count: usize) -> String {
    let mut columns = vec![
        "timestamp".to_string(),
        "BME680_temp".to_string(),
        "BME680_pressure".to_string(),
        "BME680_humidity".to_string(),
        "BME680_gas".to_string(),
    ];
    for i in 0..gas_count {
        columns.push(format!("{}_CO2", gas_label(i)));
        columns.push(format!("{}_TVOC", gas_label(i)));
    }
    columns.join(",")
}

fn round2(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

/// One data row; unavailable values are empty fields
pub fn csv_row(record: &CycleRecord, gas_count: usize) -> String {
    let c = &record.climate;
    let mut fields = vec![
        record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        round2(c.temperature_c),
        round2(c.pressure_hpa),
        round2(c.humidity_pct),
        round2(c.gas_resistance_ohm),
    ];
    for i in 0..gas_count {
        match record.gas.get(i).and_then(|r| r.sample) {
            Some(s) => {
                fields.push(s.co2_ppm.to_string());
                fields.push(s.tvoc_ppb.to_string());
            }
            None => {
                fields.push(String::new());
                fields.push(String::new());
            }
        }
    }
    fields.join(",")
}

/// Appends cycle rows to one file, or to a new file every `batch_size` rows
pub struct CsvExporter {
    dir: PathBuf,
    file_name: String,
    label: String,
    batch_size: Option<u64>,
    gas_count: usize,
    writer: Option<BufWriter<File>>,
    rows_in_file: u64,
    batch: u32,
    files: Vec<PathBuf>,
}

impl CsvExporter {
    pub fn new(dir: &Path, file_name: &str, label: &str, batch_size: Option<u64>, gas_count: usize) -> Result<Self> {
        // Create directory if it doesn't exist
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating data directory {}", dir.display()))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            file_name: file_name.to_string(),
            label: label.to_string(),
            batch_size,
            gas_count,
            writer: None,
            rows_in_file: 0,
            batch: 0,
            files: Vec::new(),
        })
    }

    /// Files written so far, oldest first
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn write_record(&mut self, record: &CycleRecord) -> Result<()> {
        let rotate = match self.batch_size {
            Some(size) => self.writer.is_none() || self.rows_in_file >= size,
            None => self.writer.is_none(),
        };
        if rotate {
            self.open_next(record)?;
        }

        let row = csv_row(record, self.gas_count);
        if let Some(ref mut writer) = self.writer {
            writeln!(writer, "{}", row)?;
            writer.flush()?;
        }
        self.rows_in_file += 1;
        Ok(())
    }

    fn open_next(&mut self, record: &CycleRecord) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        let path = match self.batch_size {
            Some(_) => {
                self.batch += 1;
                let stamp = record.timestamp.format(FILE_STAMP_FORMAT);
                self.dir.join(format!("{}_{}_{:03}.csv", self.label, stamp, self.batch))
            }
            None => self.dir.join(&self.file_name),
        };

        let is_new = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        if is_new {
            writeln!(writer, "{}", csv_header(self.gas_count))?;
        }

        if self.batch_size.is_some() {
            info!("Rotated export file to {:?}", path);
        } else {
            debug!("Appending to {:?}", path);
        }
        self.writer = Some(writer);
        self.rows_in_file = 0;
        self.files.push(path);
        Ok(())
    }

    /// Close all files
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

#[async_trait]
impl RecordSink for CsvExporter {
    fn name(&self) -> &str {
        "csv"
    }

    async fn accept(&mut self, record: &CycleRecord) -> Result<()> {
        self.write_record(record)
    }

    async fn close(&mut self) -> Result<()> {
        CsvExporter::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::testing::record;

    fn lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path).unwrap().lines().map(String::from).collect()
    }

    #[test]
    fn test_header_layout() {
        let header = csv_header(10);
        assert!(header.starts_with("timestamp,BME680_temp,BME680_pressure,BME680_humidity,BME680_gas,SGP30_1_CO2,SGP30_1_TVOC"));
        assert!(header.ends_with("SGP30_10_CO2,SGP30_10_TVOC"));
        assert_eq!(header.split(',').count(), 25);
    }

    #[test]
    fn test_unavailable_fields_are_empty() {
        let row = csv_row(&record(1), 2);
        assert_eq!(row, "2026-03-14 09:26:53,21.46,1013.25,40.00,,1200,85,,");
    }

    #[test]
    fn test_single_file_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = CsvExporter::new(dir.path(), "sensor_readings.csv", "run", None, 2).unwrap();
        exporter.write_record(&record(1)).unwrap();
        exporter.write_record(&record(2)).unwrap();
        exporter.close().unwrap();

        // a second run appends below the existing rows
        let mut again = CsvExporter::new(dir.path(), "sensor_readings.csv", "run", None, 2).unwrap();
        again.write_record(&record(3)).unwrap();
        again.close().unwrap();

        let content = lines(&dir.path().join("sensor_readings.csv"));
        assert_eq!(content.len(), 4);
        assert_eq!(content[0], csv_header(2));
        assert_eq!(content.iter().filter(|l| l.starts_with("timestamp")).count(), 1);
    }

    #[test]
    fn test_batch_rotation_repeats_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = CsvExporter::new(dir.path(), "unused.csv", "coffee", Some(2), 2).unwrap();
        for cycle in 1..=5 {
            exporter.write_record(&record(cycle)).unwrap();
        }
        exporter.close().unwrap();

        let files = exporter.files().to_vec();
        assert_eq!(files.len(), 3);
        assert!(files[0].file_name().unwrap().to_string_lossy().starts_with("coffee_20260314_092653_001"));
        assert!(files[2].to_string_lossy().ends_with("_003.csv"));

        let counts: Vec<usize> = files.iter().map(|f| lines(f).len() - 1).collect();
        assert_eq!(counts, vec![2, 2, 1]);
        for f in &files {
            assert_eq!(lines(f)[0], csv_header(2));
        }
    }
}
