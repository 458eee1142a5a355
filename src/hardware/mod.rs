//! Hardware access - I2C bus and muxes, LED ring, buttons

mod buttons;
mod i2c;
mod ws2813;

pub use buttons::EdgeDetector;
#[cfg(feature = "hardware")]
pub use buttons::ButtonWatcher;

pub use i2c::{
    deselect_all, scan, shared, ChannelScan, I2cBus, I2cDevice, Mux, MuxRoute, SharedBus, MAX_MUX_CHANNELS,
};
#[cfg(feature = "hardware")]
pub use i2c::LinuxI2cBus;
#[cfg(test)]
pub use i2c::fake;

pub use ws2813::{blank, color_wipe, encode_frame, shared_ring, LedRing, MemoryRing, Rgb, SharedRing, SPI_CLOCK_HZ};
#[cfg(feature = "hardware")]
pub use ws2813::SpiLedRing;
