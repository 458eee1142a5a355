// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! Bosch BME680 temperature / pressure / humidity / gas sensor

use std::time::Duration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ClimateSample, ClimateSensor, SensorStatus};
use crate::error::{SensorError, SensorResult};
use crate::hardware::I2cDevice;

pub const BME680_ADDR_PRIMARY: u8 = 0x76;
pub const BME680_ADDR_SECONDARY: u8 = 0x77;

const CHIP_ID: u8 = 0x61;

const REG_CHIP_ID: u8 = 0xD0;
const REG_SOFT_RESET: u8 = 0xE0;
const REG_CTRL_GAS_0: u8 = 0x70;
const REG_CTRL_GAS_1: u8 = 0x71;
const REG_CTRL_HUM: u8 = 0x72;
const REG_CTRL_MEAS: u8 = 0x74;
const REG_CONFIG: u8 = 0x75;
const REG_RES_HEAT_0: u8 = 0x5A;
const REG_GAS_WAIT_0: u8 = 0x64;
const REG_FIELD_0: u8 = 0x1D;
const REG_COEFF_1: u8 = 0x89;
const REG_COEFF_2: u8 = 0xE1;
const REG_RES_HEAT_VAL: u8 = 0x00;
const REG_RES_HEAT_RANGE: u8 = 0x02;
const REG_RANGE_SW_ERR: u8 = 0x04;

const SOFT_RESET_CMD: u8 = 0xB6;
const COEFF_1_LEN: usize = 25;
const COEFF_2_LEN: usize = 16;
const FIELD_LEN: usize = 15;

const NEW_DATA_MSK: u8 = 0x80;
const GAS_VALID_MSK: u8 = 0x20;
const HEAT_STAB_MSK: u8 = 0x10;
const GAS_RANGE_MSK: u8 = 0x0F;
const RUN_GAS: u8 = 0x10;
const MODE_FORCED: u8 = 0x01;

const MAX_POLLS: u32 = 10;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Oversampling setting as written to the control registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Oversampling {
    Skip,
    X1,
    X2,
    X4,
    X8,
    X16,
}

impl Oversampling {
    fn code(self) -> u8 {
        match self {
            Oversampling::Skip => 0,
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 3,
            Oversampling::X8 => 4,
            Oversampling::X16 => 5,
        }
    }

    fn cycles(self) -> u32 {
        match self {
            Oversampling::Skip => 0,
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
            Oversampling::X8 => 8,
            Oversampling::X16 => 16,
        }
    }
}

/// Measurement settings applied at connect
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Bme680Settings {
    pub humidity_oversampling: Oversampling,
    pub pressure_oversampling: Oversampling,
    pub temperature_oversampling: Oversampling,
    /// IIR filter coefficient code (0 = off, 2 = size 3)
    pub filter: u8,
    pub heater_temp_c: u16,
    pub heater_duration_ms: u16,
    /// Ambient temperature assumed when computing the heater resistance
    pub ambient_temp_c: i8,
}

impl Default for Bme680Settings {
    fn default() -> Self {
        Self {
            humidity_oversampling: Oversampling::X2,
            pressure_oversampling: Oversampling::X4,
            temperature_oversampling: Oversampling::X8,
            filter: 2,
            heater_temp_c: 320,
            heater_duration_ms: 150,
            ambient_temp_c: 25,
        }
    }
}

/// Factory trimming parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Calibration {
    pub par_t1: u16,
    pub par_t2: i16,
    pub par_t3: i8,
    pub par_p1: u16,
    pub par_p2: i16,
    pub par_p3: i8,
    pub par_p4: i16,
    pub par_p5: i16,
    pub par_p6: i8,
    pub par_p7: i8,
    pub par_p8: i16,
    pub par_p9: i16,
    pub par_p10: u8,
    pub par_h1: u16,
    pub par_h2: u16,
    pub par_h3: i8,
    pub par_h4: i8,
    pub par_h5: i8,
    pub par_h6: u8,
    pub par_h7: i8,
    pub par_gh1: i8,
    pub par_gh2: i16,
    pub par_gh3: i8,
    pub res_heat_range: u8,
    pub res_heat_val: i8,
    pub range_sw_err: i8,
}

impl Calibration {
    /// Parse the 0x89.. and 0xE1.. coefficient blocks (concatenated) plus
    /// the three heater trim registers.
    pub fn from_registers(coeff: &[u8], res_heat_val: u8, res_heat_range: u8, range_sw_err: u8) -> Self {
        let u16_at = |msb: usize, lsb: usize| u16::from_be_bytes([coeff[msb], coeff[lsb]]);
        let i16_at = |msb: usize, lsb: usize| u16_at(msb, lsb) as i16;

        Self {
            par_t1: u16_at(34, 33),
            par_t2: i16_at(2, 1),
            par_t3: coeff[3] as i8,
            par_p1: u16_at(6, 5),
            par_p2: i16_at(8, 7),
            par_p3: coeff[9] as i8,
            par_p4: i16_at(12, 11),
            par_p5: i16_at(14, 13),
            par_p6: coeff[16] as i8,
            par_p7: coeff[15] as i8,
            par_p8: i16_at(20, 19),
            par_p9: i16_at(22, 21),
            par_p10: coeff[23],
            par_h1: ((coeff[27] as u16) << 4) | (coeff[26] & 0x0F) as u16,
            par_h2: ((coeff[25] as u16) << 4) | (coeff[26] >> 4) as u16,
            par_h3: coeff[28] as i8,
            par_h4: coeff[29] as i8,
            par_h5: coeff[30] as i8,
            par_h6: coeff[31],
            par_h7: coeff[32] as i8,
            par_gh1: coeff[37] as i8,
            par_gh2: i16_at(36, 35),
            par_gh3: coeff[38] as i8,
            res_heat_range: (res_heat_range & 0x30) >> 4,
            res_heat_val: res_heat_val as i8,
            range_sw_err: ((range_sw_err & 0xF0) as i8) / 16,
        }
    }

    /// Returns (t_fine, temperature °C)
    pub fn compensate_temperature(&self, adc: u32) -> (f64, f64) {
        let adc = adc as f64;
        let t1 = self.par_t1 as f64;
        let var1 = (adc / 16384.0 - t1 / 1024.0) * self.par_t2 as f64;
        let var2 = (adc / 131072.0 - t1 / 8192.0).powi(2) * (self.par_t3 as f64 * 16.0);
        let t_fine = var1 + var2;
        (t_fine, t_fine / 5120.0)
    }

    /// Pressure in Pa
    pub fn compensate_pressure(&self, adc: u32, t_fine: f64) -> f64 {
        let mut var1 = t_fine / 2.0 - 64000.0;
        let mut var2 = var1 * var1 * (self.par_p6 as f64 / 131072.0);
        var2 += var1 * self.par_p5 as f64 * 2.0;
        var2 = var2 / 4.0 + self.par_p4 as f64 * 65536.0;
        var1 = (self.par_p3 as f64 * var1 * var1 / 16384.0 + self.par_p2 as f64 * var1) / 524288.0;
        var1 = (1.0 + var1 / 32768.0) * self.par_p1 as f64;
        if var1 == 0.0 {
            return 0.0;
        }

        let mut pressure = 1048576.0 - adc as f64;
        pressure = (pressure - var2 / 4096.0) * 6250.0 / var1;
        let var1 = self.par_p9 as f64 * pressure * pressure / 2147483648.0;
        let var2 = pressure * (self.par_p8 as f64 / 32768.0);
        let var3 = (pressure / 256.0).powi(3) * (self.par_p10 as f64 / 131072.0);
        pressure + (var1 + var2 + var3 + self.par_p7 as f64 * 128.0) / 16.0
    }

    /// Relative humidity in %, clamped to [0, 100]
    pub fn compensate_humidity(&self, adc: u16, t_fine: f64) -> f64 {
        let temp = t_fine / 5120.0;
        let var1 = adc as f64 - (self.par_h1 as f64 * 16.0 + (self.par_h3 as f64 / 2.0) * temp);
        let var2 = var1
            * ((self.par_h2 as f64 / 262144.0)
                * (1.0
                    + (self.par_h4 as f64 / 16384.0) * temp
                    + (self.par_h5 as f64 / 1048576.0) * temp * temp));
        let var3 = self.par_h6 as f64 / 16384.0;
        let var4 = self.par_h7 as f64 / 2097152.0;
        (var2 + (var3 + var4 * temp) * var2 * var2).clamp(0.0, 100.0)
    }

    /// Gas resistance in Ω
    pub fn compensate_gas(&self, adc: u16, range: u8) -> f64 {
        const K1: [f64; 16] = [0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, -0.8, 0.0, 0.0, -0.2, -0.5, 0.0, -1.0, 0.0, 0.0];
        const K2: [f64; 16] = [0.0, 0.0, 0.0, 0.0, 0.1, 0.7, 0.0, -0.8, -0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];

        let range = (range & GAS_RANGE_MSK) as usize;
        let var1 = 1340.0 + 5.0 * self.range_sw_err as f64;
        let var2 = var1 * (1.0 + K1[range] / 100.0);
        let var3 = 1.0 + K2[range] / 100.0;
        1.0 / (var3 * 0.000000125 * (1u32 << range) as f64 * ((adc as f64 - 512.0) / var2 + 1.0))
    }

    /// Heater resistance register value for a target temperature
    pub fn heater_resistance(&self, target_c: u16, ambient_c: i8) -> u8 {
        let target = target_c.min(400) as f64;
        let var1 = self.par_gh1 as f64 / 16.0 + 49.0;
        let var2 = (self.par_gh2 as f64 / 32768.0) * 0.0005 + 0.00235;
        let var3 = self.par_gh3 as f64 / 1024.0;
        let var4 = var1 * (1.0 + var2 * target);
        let var5 = var4 + var3 * ambient_c as f64;
        let res = 3.4
            * (var5
                * (4.0 / (4.0 + self.res_heat_range as f64))
                * (1.0 / (1.0 + self.res_heat_val as f64 * 0.002))
                - 25.0);
        res.clamp(0.0, 255.0) as u8
    }
}

/// Encode a heater on-time in ms into the 6-bit value + 2-bit multiplier
pub fn heater_duration_code(mut duration_ms: u16) -> u8 {
    if duration_ms >= 0xFC0 {
        return 0xFF;
    }
    let mut factor: u8 = 0;
    while duration_ms > 0x3F {
        duration_ms /= 4;
        factor += 1;
    }
    duration_ms as u8 + factor * 64
}

/// Raw ADC values of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawField {
    pub new_data: bool,
    pub adc_temp: u32,
    pub adc_pres: u32,
    pub adc_hum: u16,
    pub adc_gas: u16,
    pub gas_range: u8,
    pub gas_valid: bool,
    pub heat_stable: bool,
}

impl RawField {
    pub fn parse(regs: &[u8]) -> Self {
        let adc_20 = |i: usize| ((regs[i] as u32) << 12) | ((regs[i + 1] as u32) << 4) | ((regs[i + 2] as u32) >> 4);
        Self {
            new_data: regs[0] & NEW_DATA_MSK != 0,
            adc_pres: adc_20(2),
            adc_temp: adc_20(5),
            adc_hum: u16::from_be_bytes([regs[8], regs[9]]),
            adc_gas: ((regs[13] as u16) << 2) | ((regs[14] as u16) >> 6),
            gas_range: regs[14] & GAS_RANGE_MSK,
            gas_valid: regs[14] & GAS_VALID_MSK != 0,
            heat_stable: regs[14] & HEAT_STAB_MSK != 0,
        }
    }
}

/// BME680 on the main bus, at whichever of its two addresses answers
pub struct Bme680 {
    id: String,
    candidates: Vec<I2cDevice>,
    device: Option<I2cDevice>,
    calibration: Calibration,
    settings: Bme680Settings,
    status: SensorStatus,
}

impl Bme680 {
    /// `candidates` are tried in order at connect
    pub fn new(id: &str, candidates: Vec<I2cDevice>, settings: Bme680Settings) -> Self {
        Self {
            id: id.to_string(),
            candidates,
            device: None,
            calibration: Calibration::default(),
            settings,
            status: SensorStatus::Disconnected,
        }
    }

    pub fn address(&self) -> Option<u8> {
        self.device.as_ref().map(|d| d.address())
    }

    fn measurement_time(&self) -> Duration {
        let s = &self.settings;
        let cycles = s.temperature_oversampling.cycles()
            + s.pressure_oversampling.cycles()
            + s.humidity_oversampling.cycles();
        // TPH conversion + gas measurement + wake-up, per the datasheet timing model
        let micros = cycles * 1963 + 477 * 4 + 477 * 5 + 500 + 1000;
        Duration::from_micros(micros as u64) + Duration::from_millis(s.heater_duration_ms as u64)
    }

    async fn find_device(&self) -> SensorResult<I2cDevice> {
        let mut last_err = SensorError::BusUnavailable("no BME680 address configured".into());
        for device in &self.candidates {
            match device.read_register(REG_CHIP_ID).await {
                Ok(CHIP_ID) => return Ok(device.clone()),
                Ok(found) => last_err = SensorError::ChipId { expected: CHIP_ID, found },
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    async fn configure(&mut self, device: &I2cDevice) -> SensorResult<()> {
        device.write_register(REG_SOFT_RESET, SOFT_RESET_CMD).await?;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut coeff = device.read_registers(REG_COEFF_1, COEFF_1_LEN).await?;
        coeff.extend(device.read_registers(REG_COEFF_2, COEFF_2_LEN).await?);
        let heat_val = device.read_register(REG_RES_HEAT_VAL).await?;
        let heat_range = device.read_register(REG_RES_HEAT_RANGE).await?;
        let sw_err = device.read_register(REG_RANGE_SW_ERR).await?;
        self.calibration = Calibration::from_registers(&coeff, heat_val, heat_range, sw_err);

        let s = &self.settings;
        device.write_register(REG_CTRL_HUM, s.humidity_oversampling.code()).await?;
        device.write_register(REG_CONFIG, (s.filter & 0x07) << 2).await?;
        device.write_register(REG_CTRL_MEAS, self.ctrl_meas(false)).await?;

        let res_heat = self.calibration.heater_resistance(s.heater_temp_c, s.ambient_temp_c);
        device.write_register(REG_RES_HEAT_0, res_heat).await?;
        device.write_register(REG_GAS_WAIT_0, heater_duration_code(s.heater_duration_ms)).await?;
        device.write_register(REG_CTRL_GAS_0, 0x00).await?;
        device.write_register(REG_CTRL_GAS_1, RUN_GAS).await?;
        Ok(())
    }

    fn ctrl_meas(&self, forced: bool) -> u8 {
        let s = &self.settings;
        (s.temperature_oversampling.code() << 5)
            | (s.pressure_oversampling.code() << 2)
            | if forced { MODE_FORCED } else { 0 }
    }
}

#[async_trait]
impl ClimateSensor for Bme680 {
    fn id(&self) -> &str { &self.id }
    fn status(&self) -> SensorStatus { self.status }

    async fn connect(&mut self) -> SensorResult<()> {
        let device = match self.find_device().await {
            Ok(d) => d,
            Err(e) => {
                self.status = SensorStatus::Error;
                return Err(e);
            }
        };
        if let Err(e) = self.configure(&device).await {
            self.status = SensorStatus::Error;
            return Err(e);
        }
        info!("BME680 found at 0x{:02X}", device.address());
        debug!("BME680 calibration: {:?}", self.calibration);
        self.device = Some(device);
        self.status = SensorStatus::Connected;
        Ok(())
    }

    async fn measure(&mut self) -> SensorResult<ClimateSample> {
        let device = self
            .device
            .clone()
            .ok_or_else(|| SensorError::NotConnected(self.id.clone()))?;

        device.write_register(REG_CTRL_MEAS, self.ctrl_meas(true)).await?;
        tokio::time::sleep(self.measurement_time()).await;

        for _ in 0..MAX_POLLS {
            let regs = device.read_registers(REG_FIELD_0, FIELD_LEN).await?;
            let field = RawField::parse(&regs);
            if !field.new_data {
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }

            let cal = &self.calibration;
            let (t_fine, temperature_c) = cal.compensate_temperature(field.adc_temp);
            self.status = SensorStatus::Active;
            return Ok(ClimateSample {
                temperature_c,
                pressure_hpa: cal.compensate_pressure(field.adc_pres, t_fine) / 100.0,
                humidity_pct: cal.compensate_humidity(field.adc_hum, t_fine),
                gas_resistance_ohm: cal.compensate_gas(field.adc_gas, field.gas_range),
                heat_stable: field.heat_stable && field.gas_valid,
            });
        }

        Err(SensorError::NotReady { attempts: MAX_POLLS })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::hardware::fake::FakeBus;
    use crate::hardware::{shared, Mux};

    fn quick_settings() -> Bme680Settings {
        Bme680Settings { heater_duration_ms: 1, ..Default::default() }
    }

    fn candidates(fake: &FakeBus) -> Vec<I2cDevice> {
        let bus = shared(Box::new(fake.clone()));
        let muxes: Arc<[Mux]> = Arc::from(Vec::new());
        vec![
            I2cDevice::direct(bus.clone(), BME680_ADDR_PRIMARY, muxes.clone()),
            I2cDevice::direct(bus, BME680_ADDR_SECONDARY, muxes),
        ]
    }

    #[test]
    fn test_heater_duration_code() {
        assert_eq!(heater_duration_code(63), 63);
        assert_eq!(heater_duration_code(150), 0x65);
        assert_eq!(heater_duration_code(0xFC0), 0xFF);
    }

    #[test]
    fn test_calibration_layout() {
        let mut coeff = vec![0u8; COEFF_1_LEN + COEFF_2_LEN];
        coeff[33] = 0x34; // T1 lsb
        coeff[34] = 0x12; // T1 msb
        coeff[25] = 0xAB; // H2 msb
        coeff[26] = 0xC5; // H2 lsb nibble / H1 low nibble
        coeff[27] = 0x3E; // H1 msb
        let cal = Calibration::from_registers(&coeff, 0xFE, 0x10, 0xF0);
        assert_eq!(cal.par_t1, 0x1234);
        assert_eq!(cal.par_h1, (0x3E << 4) | 0x5);
        assert_eq!(cal.par_h2, (0xAB << 4) | 0xC);
        assert_eq!(cal.res_heat_val, -2);
        assert_eq!(cal.res_heat_range, 1);
        assert_eq!(cal.range_sw_err, -1);
    }

    #[test]
    fn test_gas_resistance_at_mid_scale() {
        let cal = Calibration::default();
        let ohms = cal.compensate_gas(512, 0);
        assert!((ohms - 8_000_000.0).abs() < 1e-3);
        // Each range step halves the resistance span
        let ohms_r1 = cal.compensate_gas(512, 1);
        assert!((ohms_r1 - 4_000_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_field_parse() {
        let mut regs = [0u8; FIELD_LEN];
        regs[0] = 0x80;
        regs[5] = 0x7F;
        regs[6] = 0xFF;
        regs[7] = 0xF0;
        regs[13] = 0x80;
        regs[14] = 0x30 | 0x03;
        let field = RawField::parse(&regs);
        assert!(field.new_data);
        assert_eq!(field.adc_temp, 0x7FFFF);
        assert_eq!(field.adc_gas, 512);
        assert_eq!(field.gas_range, 3);
        assert!(field.gas_valid && field.heat_stable);
    }

    #[tokio::test]
    async fn test_falls_back_to_secondary_address() {
        let fake = FakeBus::new();
        fake.set_register(BME680_ADDR_SECONDARY, REG_CHIP_ID, CHIP_ID);
        let mut bme = Bme680::new("bme680", candidates(&fake), quick_settings());

        bme.connect().await.unwrap();
        assert_eq!(bme.address(), Some(BME680_ADDR_SECONDARY));
        assert_eq!(bme.status(), SensorStatus::Connected);
    }

    #[tokio::test]
    async fn test_wrong_chip_id_is_rejected() {
        let fake = FakeBus::new();
        fake.set_register(BME680_ADDR_PRIMARY, REG_CHIP_ID, 0x60);
        let mut bme = Bme680::new("bme680", candidates(&fake), quick_settings());

        assert!(bme.connect().await.is_err());
        assert_eq!(bme.status(), SensorStatus::Error);
    }

    #[tokio::test]
    async fn test_measure_reports_heat_stability() {
        let fake = FakeBus::new();
        fake.set_register(BME680_ADDR_PRIMARY, REG_CHIP_ID, CHIP_ID);
        let mut field = [0u8; FIELD_LEN];
        field[0] = NEW_DATA_MSK;
        field[13] = 0x80;
        field[14] = GAS_VALID_MSK;
        fake.set_registers(BME680_ADDR_PRIMARY, REG_FIELD_0, &field);

        let mut bme = Bme680::new("bme680", candidates(&fake), quick_settings());
        bme.connect().await.unwrap();

        let unstable = bme.measure().await.unwrap();
        assert!(!unstable.heat_stable);

        field[14] = GAS_VALID_MSK | HEAT_STAB_MSK;
        fake.set_registers(BME680_ADDR_PRIMARY, REG_FIELD_0, &field);
        let stable = bme.measure().await.unwrap();
        assert!(stable.heat_stable);
        assert!((stable.gas_resistance_ohm - 8_000_000.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_measure_without_connect_fails() {
        let fake = FakeBus::new();
        let mut bme = Bme680::new("bme680", candidates(&fake), quick_settings());
        assert!(matches!(bme.measure().await, Err(SensorError::NotConnected(_))));
    }
}
