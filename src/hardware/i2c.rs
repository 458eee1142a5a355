// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! I2C bus access and TCA9548A / PCA9546A channel routing

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::error::{SensorError, SensorResult};

/// Raw 7-bit-address I2C transfers
pub trait I2cBus: Send {
    fn write(&mut self, addr: u8, data: &[u8]) -> SensorResult<()>;

    fn read(&mut self, addr: u8, buf: &mut [u8]) -> SensorResult<()>;

    fn write_read(&mut self, addr: u8, data: &[u8], buf: &mut [u8]) -> SensorResult<()> {
        self.write(addr, data)?;
        self.read(addr, buf)
    }

    /// True if something acknowledges a one-byte read at `addr`
    fn probe(&mut self, addr: u8) -> bool {
        let mut buf = [0u8; 1];
        self.read(addr, &mut buf).is_ok()
    }
}

/// Bus shared by every device on the Pi's I2C header
pub type SharedBus = Arc<Mutex<Box<dyn I2cBus>>>;

pub fn shared(bus: Box<dyn I2cBus>) -> SharedBus {
    Arc::new(Mutex::new(bus))
}

/// Channels a TCA9548A can switch; the control register is one byte
pub const MAX_MUX_CHANNELS: u8 = 8;

/// Multiplexer on the bus and how many downstream channels it has
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mux {
    pub address: u8,
    pub channels: u8,
}

/// Position of a device behind a multiplexer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxRoute {
    pub mux: u8,
    pub channel: u8,
}

/// Handle to one device, optionally behind a mux channel.
///
/// Every transfer locks the bus for its whole duration, so the channel
/// selection can't be changed by another device in the middle of a command.
#[derive(Clone)]
pub struct I2cDevice {
    bus: SharedBus,
    addr: u8,
    route: Option<MuxRoute>,
    muxes: Arc<[Mux]>,
}

impl I2cDevice {
    /// Device wired straight to the main bus
    pub fn direct(bus: SharedBus, addr: u8, muxes: Arc<[Mux]>) -> Self {
        Self { bus, addr, route: None, muxes }
    }

    /// Device on a mux channel; the channel must exist on that mux
    pub fn routed(bus: SharedBus, addr: u8, route: MuxRoute, muxes: Arc<[Mux]>) -> SensorResult<Self> {
        let mux = muxes
            .iter()
            .find(|m| m.address == route.mux)
            .ok_or(SensorError::InvalidChannel { mux: route.mux, channel: route.channel })?;
        if route.channel >= mux.channels.min(MAX_MUX_CHANNELS) {
            return Err(SensorError::InvalidChannel { mux: route.mux, channel: route.channel });
        }
        Ok(Self { bus, addr, route: Some(route), muxes })
    }

    pub fn address(&self) -> u8 {
        self.addr
    }

    pub fn route(&self) -> Option<MuxRoute> {
        self.route
    }

    pub async fn write(&self, data: &[u8]) -> SensorResult<()> {
        let mut bus = self.bus.lock().await;
        self.select(&mut **bus)?;
        let result = bus.write(self.addr, data);
        self.deselect(&mut **bus);
        result
    }

    pub async fn write_read(&self, data: &[u8], buf: &mut [u8]) -> SensorResult<()> {
        let mut bus = self.bus.lock().await;
        self.select(&mut **bus)?;
        let result = bus.write_read(self.addr, data, buf);
        self.deselect(&mut **bus);
        result
    }

    /// Write a command, wait for the device to execute it, then read the reply
    pub async fn command(&self, cmd: &[u8], delay: Duration, read_len: usize) -> SensorResult<Vec<u8>> {
        let mut bus = self.bus.lock().await;
        self.select(&mut **bus)?;
        let result: SensorResult<Vec<u8>> = async {
            bus.write(self.addr, cmd)?;
            tokio::time::sleep(delay).await;
            let mut buf = vec![0u8; read_len];
            if read_len > 0 {
                bus.read(self.addr, &mut buf)?;
            }
            Ok(buf)
        }
        .await;
        self.deselect(&mut **bus);
        result
    }

    pub async fn write_register(&self, reg: u8, value: u8) -> SensorResult<()> {
        self.write(&[reg, value]).await
    }

    pub async fn read_registers(&self, reg: u8, len: usize) -> SensorResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.write_read(&[reg], &mut buf).await?;
        Ok(buf)
    }

    pub async fn read_register(&self, reg: u8) -> SensorResult<u8> {
        let regs = self.read_registers(reg, 1).await?;
        Ok(regs[0])
    }

    fn select(&self, bus: &mut dyn I2cBus) -> SensorResult<()> {
        let Some(route) = self.route else { return Ok(()) };
        // Only our own mux has to answer; a missing sibling can't shadow this channel
        for mux in self.muxes.iter().filter(|m| m.address != route.mux) {
            if let Err(e) = bus.write(mux.address, &[0x00]) {
                debug!("deselecting mux 0x{:02X}: {}", mux.address, e);
            }
        }
        trace!("mux 0x{:02X} -> channel {}", route.mux, route.channel);
        bus.write(route.mux, &[1u8 << route.channel])
    }

    fn deselect(&self, bus: &mut dyn I2cBus) {
        if let Some(route) = self.route {
            // A failed deselect surfaces on the next select anyway
            let _ = bus.write(route.mux, &[0x00]);
        }
    }
}

/// Disconnect every mux channel, returning the muxes that did not acknowledge
pub async fn deselect_all(bus: &SharedBus, muxes: &[Mux]) -> Vec<(u8, SensorError)> {
    let mut bus = bus.lock().await;
    muxes
        .iter()
        .filter_map(|mux| bus.write(mux.address, &[0x00]).err().map(|e| (mux.address, e)))
        .collect()
}

/// Devices found on one mux channel during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelScan {
    pub mux: u8,
    pub channel: u8,
    pub addresses: Vec<u8>,
}

/// Probe every channel of every mux, hiding the muxes' own addresses
pub async fn scan(bus: &SharedBus, muxes: &[Mux]) -> SensorResult<Vec<ChannelScan>> {
    let mut results = Vec::new();
    let mut bus = bus.lock().await;
    let mux_addrs: Vec<u8> = muxes.iter().map(|m| m.address).collect();

    for mux in muxes {
        for other in muxes.iter().filter(|m| m.address != mux.address) {
            if let Err(e) = bus.write(other.address, &[0x00]) {
                debug!("deselecting mux 0x{:02X}: {}", other.address, e);
            }
        }
        for channel in 0..mux.channels.min(MAX_MUX_CHANNELS) {
            bus.write(mux.address, &[1u8 << channel])?;
            let addresses = (0x03..=0x77u8)
                .filter(|a| !mux_addrs.contains(a))
                .filter(|&a| bus.probe(a))
                .collect();
            results.push(ChannelScan { mux: mux.address, channel, addresses });
        }
        bus.write(mux.address, &[0x00])?;
    }

    Ok(results)
}

#[cfg(feature = "hardware")]
pub use linux::LinuxI2cBus;

#[cfg(feature = "hardware")]
mod linux {
    use std::collections::hash_map::Entry;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use i2cdev::core::I2CDevice;
    use i2cdev::linux::LinuxI2CDevice;

    use super::I2cBus;
    use crate::error::{SensorError, SensorResult};

    /// `/dev/i2c-N` backend, one kernel handle per slave address
    pub struct LinuxI2cBus {
        path: PathBuf,
        devices: HashMap<u8, LinuxI2CDevice>,
    }

    impl LinuxI2cBus {
        pub fn open(path: &Path) -> SensorResult<Self> {
            std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| SensorError::BusUnavailable(format!("{}: {}", path.display(), e)))?;
            Ok(Self {
                path: path.to_path_buf(),
                devices: HashMap::new(),
            })
        }

        fn device(&mut self, addr: u8) -> SensorResult<&mut LinuxI2CDevice> {
            match self.devices.entry(addr) {
                Entry::Occupied(e) => Ok(e.into_mut()),
                Entry::Vacant(v) => {
                    let dev = LinuxI2CDevice::new(&self.path, addr as u16)
                        .map_err(|e| SensorError::Bus { addr, message: e.to_string() })?;
                    Ok(v.insert(dev))
                }
            }
        }
    }

    impl I2cBus for LinuxI2cBus {
        fn write(&mut self, addr: u8, data: &[u8]) -> SensorResult<()> {
            self.device(addr)?
                .write(data)
                .map_err(|e| SensorError::Bus { addr, message: e.to_string() })
        }

        fn read(&mut self, addr: u8, buf: &mut [u8]) -> SensorResult<()> {
            self.device(addr)?
                .read(buf)
                .map_err(|e| SensorError::Bus { addr, message: e.to_string() })
        }
    }
}

/// In-memory bus for driver tests
#[cfg(test)]
pub mod fake {
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::{Arc, Mutex};

    use super::I2cBus;
    use crate::error::{SensorError, SensorResult};

    #[derive(Default)]
    pub struct FakeState {
        /// Every write in order
        pub writes: Vec<(u8, Vec<u8>)>,
        /// Queued replies for plain reads, per address
        pub replies: HashMap<u8, VecDeque<SensorResult<Vec<u8>>>>,
        /// Register files for register-style devices
        pub registers: HashMap<u8, [u8; 256]>,
        /// Addresses that acknowledge
        pub present: HashSet<u8>,
        /// Addresses that refuse every write
        pub nack: HashSet<u8>,
        /// Register-style reads start here (set by a one-byte write)
        pointer: HashMap<u8, u8>,
    }

    #[derive(Clone, Default)]
    pub struct FakeBus {
        pub state: Arc<Mutex<FakeState>>,
    }

    impl FakeBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(&self, addr: u8, bytes: Vec<u8>) {
            let mut s = self.state.lock().unwrap();
            s.present.insert(addr);
            s.replies.entry(addr).or_default().push_back(Ok(bytes));
        }

        pub fn fail_next(&self, addr: u8) {
            let mut s = self.state.lock().unwrap();
            s.replies
                .entry(addr)
                .or_default()
                .push_back(Err(SensorError::Bus { addr, message: "nack".into() }));
        }

        pub fn set_register(&self, addr: u8, reg: u8, value: u8) {
            let mut s = self.state.lock().unwrap();
            s.present.insert(addr);
            s.registers.entry(addr).or_insert([0u8; 256])[reg as usize] = value;
        }

        pub fn set_registers(&self, addr: u8, start: u8, values: &[u8]) {
            for (i, v) in values.iter().enumerate() {
                self.set_register(addr, start.wrapping_add(i as u8), *v);
            }
        }

        pub fn add_device(&self, addr: u8) {
            self.state.lock().unwrap().present.insert(addr);
        }

        pub fn nack_writes(&self, addr: u8) {
            self.state.lock().unwrap().nack.insert(addr);
        }

        pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
            self.state.lock().unwrap().writes.clone()
        }
    }

    impl I2cBus for FakeBus {
        fn write(&mut self, addr: u8, data: &[u8]) -> SensorResult<()> {
            let mut guard = self.state.lock().unwrap();
            let s = &mut *guard;
            s.writes.push((addr, data.to_vec()));
            if s.nack.contains(&addr) {
                return Err(SensorError::Bus { addr, message: "nack".into() });
            }
            if let Some(regs) = s.registers.get_mut(&addr) {
                match data {
                    [reg] => {
                        s.pointer.insert(addr, *reg);
                    }
                    [reg, rest @ ..] => {
                        for (i, v) in rest.iter().enumerate() {
                            regs[reg.wrapping_add(i as u8) as usize] = *v;
                        }
                    }
                    [] => {}
                }
            }
            Ok(())
        }

        fn read(&mut self, addr: u8, buf: &mut [u8]) -> SensorResult<()> {
            let mut s = self.state.lock().unwrap();
            if let Some(regs) = s.registers.get(&addr).copied() {
                let start = s.pointer.get(&addr).copied().unwrap_or(0);
                for (i, b) in buf.iter_mut().enumerate() {
                    *b = regs[start.wrapping_add(i as u8) as usize];
                }
                return Ok(());
            }
            let present = s.present.contains(&addr);
            match s.replies.get_mut(&addr).and_then(|q| q.pop_front()) {
                Some(Ok(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(())
                }
                Some(Err(e)) => Err(e),
                None if present => Ok(()),
                None => Err(SensorError::Bus { addr, message: "no device".into() }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeBus;
    use super::*;

    fn muxes() -> Arc<[Mux]> {
        Arc::from(vec![
            Mux { address: 0x70, channels: 8 },
            Mux { address: 0x71, channels: 8 },
        ])
    }

    #[tokio::test]
    async fn test_routed_write_selects_and_deselects() {
        let fake = FakeBus::new();
        let bus = shared(Box::new(fake.clone()));
        let dev = I2cDevice::routed(bus, 0x58, MuxRoute { mux: 0x71, channel: 1 }, muxes()).unwrap();

        dev.write(&[0x20, 0x03]).await.unwrap();

        assert_eq!(
            fake.writes(),
            vec![
                (0x70, vec![0x00]),
                (0x71, vec![0b0000_0010]),
                (0x58, vec![0x20, 0x03]),
                (0x71, vec![0x00]),
            ]
        );
    }

    #[tokio::test]
    async fn test_direct_device_skips_mux() {
        let fake = FakeBus::new();
        fake.set_register(0x76, 0xD0, 0x61);
        let bus = shared(Box::new(fake.clone()));
        let dev = I2cDevice::direct(bus, 0x76, muxes());

        assert_eq!(dev.read_register(0xD0).await.unwrap(), 0x61);
        assert!(fake.writes().iter().all(|(addr, _)| *addr == 0x76));
    }

    #[test]
    fn test_channel_out_of_range_rejected() {
        let bus = shared(Box::new(FakeBus::new()));
        let small: Arc<[Mux]> = Arc::from(vec![Mux { address: 0x70, channels: 4 }]);
        let err = I2cDevice::routed(bus, 0x58, MuxRoute { mux: 0x70, channel: 5 }, small)
            .err()
            .unwrap();
        assert_eq!(err, SensorError::InvalidChannel { mux: 0x70, channel: 5 });
    }

    #[tokio::test]
    async fn test_dead_sibling_mux_does_not_block_transfer() {
        let fake = FakeBus::new();
        fake.nack_writes(0x71);
        fake.reply(0x58, vec![0xBE, 0xEF, 0x92]);
        let bus = shared(Box::new(fake.clone()));
        let dev = I2cDevice::routed(bus, 0x58, MuxRoute { mux: 0x70, channel: 0 }, muxes()).unwrap();

        let reply = dev.command(&[0x20, 0x08], Duration::ZERO, 3).await.unwrap();

        assert_eq!(reply, vec![0xBE, 0xEF, 0x92]);
        assert!(fake.writes().contains(&(0x70, vec![0b0000_0001])));
    }

    #[tokio::test]
    async fn test_own_mux_failure_is_reported() {
        let fake = FakeBus::new();
        fake.nack_writes(0x70);
        let bus = shared(Box::new(fake.clone()));
        let dev = I2cDevice::routed(bus, 0x58, MuxRoute { mux: 0x70, channel: 0 }, muxes()).unwrap();

        let err = dev.write(&[0x20, 0x03]).await.unwrap_err();
        assert!(matches!(err, SensorError::Bus { addr: 0x70, .. }));
        assert!(fake.writes().iter().all(|(addr, _)| *addr != 0x58));
    }

    #[tokio::test]
    async fn test_deselect_all_reports_missing_mux() {
        let fake = FakeBus::new();
        fake.nack_writes(0x71);
        let bus = shared(Box::new(fake.clone()));

        let failed = deselect_all(&bus, &muxes()).await;

        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, 0x71);
        assert!(fake.writes().contains(&(0x70, vec![0x00])));
    }

    #[test]
    fn test_channel_beyond_mux_width_rejected() {
        let bus = shared(Box::new(FakeBus::new()));
        let wide: Arc<[Mux]> = Arc::from(vec![Mux { address: 0x70, channels: 9 }]);
        let err = I2cDevice::routed(bus, 0x58, MuxRoute { mux: 0x70, channel: 8 }, wide)
            .err()
            .unwrap();
        assert_eq!(err, SensorError::InvalidChannel { mux: 0x70, channel: 8 });
    }

    #[tokio::test]
    async fn test_scan_hides_mux_addresses() {
        let fake = FakeBus::new();
        fake.add_device(0x58);
        fake.add_device(0x70);
        let bus = shared(Box::new(fake.clone()));
        let single: Vec<Mux> = vec![Mux { address: 0x70, channels: 2 }];

        let found = scan(&bus, &single).await.unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].addresses, vec![0x58]);
        assert!(found.iter().all(|c| !c.addresses.contains(&0x70)));
    }
}
