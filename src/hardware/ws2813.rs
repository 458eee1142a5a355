// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! WS2813 LED ring driven through the SPI MOSI line

use std::sync::Arc;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::SensorResult;

/// SPI clock giving a 416 ns slot per encoded bit
pub const SPI_CLOCK_HZ: u32 = 2_400_000;

/// Trailing low time (>280 µs) latches the frame
const RESET_BYTES: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb { r: 0, g: 0, b: 0 };
    pub const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };
    pub const GREEN: Rgb = Rgb { r: 0, g: 255, b: 0 };
    pub const BLUE: Rgb = Rgb { r: 0, g: 0, b: 255 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn scaled(self, brightness: u8) -> Self {
        let s = |c: u8| ((c as u16 * brightness as u16) / 255) as u8;
        Self { r: s(self.r), g: s(self.g), b: s(self.b) }
    }
}

/// An addressable LED strip
pub trait LedRing: Send {
    fn len(&self) -> usize;

    /// Out-of-range positions are ignored
    fn set_pixel(&mut self, index: usize, color: Rgb);

    fn clear(&mut self);

    /// Push the pixel buffer to the LEDs
    fn show(&mut self) -> SensorResult<()>;
}

pub type SharedRing = Arc<Mutex<Box<dyn LedRing>>>;

pub fn shared_ring(ring: Box<dyn LedRing>) -> SharedRing {
    Arc::new(Mutex::new(ring))
}

/// Expand one byte to 24 SPI bits: 1 -> 110, 0 -> 100, MSB first
fn encode_byte(byte: u8) -> [u8; 3] {
    let mut acc: u32 = 0;
    for bit in (0..8).rev() {
        let pattern = if byte & (1 << bit) != 0 { 0b110 } else { 0b100 };
        acc = (acc << 3) | pattern;
    }
    let [_, a, b, c] = acc.to_be_bytes();
    [a, b, c]
}

/// SPI frame for a pixel buffer in the strip's GRB order, reset gap included
pub fn encode_frame(pixels: &[Rgb], brightness: u8) -> Vec<u8> {
    let mut frame = Vec::with_capacity(pixels.len() * 9 + RESET_BYTES);
    for px in pixels {
        let px = px.scaled(brightness);
        for channel in [px.g, px.r, px.b] {
            frame.extend_from_slice(&encode_byte(channel));
        }
    }
    frame.resize(frame.len() + RESET_BYTES, 0);
    frame
}

/// Pixel buffer with no output, for demo runs and tests
pub struct MemoryRing {
    pixels: Vec<Rgb>,
    shown: Vec<Rgb>,
    frames: usize,
}

impl MemoryRing {
    pub fn new(count: usize) -> Self {
        Self {
            pixels: vec![Rgb::OFF; count],
            shown: vec![Rgb::OFF; count],
            frames: 0,
        }
    }

    /// Pixels as of the last `show`
    pub fn shown(&self) -> &[Rgb] {
        &self.shown
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl LedRing for MemoryRing {
    fn len(&self) -> usize {
        self.pixels.len()
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) {
        if let Some(px) = self.pixels.get_mut(index) {
            *px = color;
        }
    }

    fn clear(&mut self) {
        self.pixels.fill(Rgb::OFF);
    }

    fn show(&mut self) -> SensorResult<()> {
        self.shown.clone_from(&self.pixels);
        self.frames += 1;
        Ok(())
    }
}

#[cfg(feature = "hardware")]
pub use spi::SpiLedRing;

#[cfg(feature = "hardware")]
mod spi {
    use std::io::Write;
    use std::path::Path;

    use spidev::{SpiModeFlags, Spidev, SpidevOptions};
    use tracing::debug;

    use super::{encode_frame, LedRing, Rgb, SPI_CLOCK_HZ};
    use crate::error::{SensorError, SensorResult};

    pub struct SpiLedRing {
        spi: Spidev,
        pixels: Vec<Rgb>,
        brightness: u8,
    }

    impl SpiLedRing {
        pub fn open(path: &Path, count: usize, brightness: u8) -> SensorResult<Self> {
            let mut spi = Spidev::open(path)
                .map_err(|e| SensorError::Spi(format!("{}: {}", path.display(), e)))?;
            let options = SpidevOptions::new()
                .bits_per_word(8)
                .max_speed_hz(SPI_CLOCK_HZ)
                .mode(SpiModeFlags::SPI_MODE_0)
                .build();
            spi.configure(&options).map_err(|e| SensorError::Spi(e.to_string()))?;
            debug!("LED ring on {} ({} pixels)", path.display(), count);

            Ok(Self {
                spi,
                pixels: vec![Rgb::OFF; count],
                brightness,
            })
        }
    }

    impl LedRing for SpiLedRing {
        fn len(&self) -> usize {
            self.pixels.len()
        }

        fn set_pixel(&mut self, index: usize, color: Rgb) {
            if let Some(px) = self.pixels.get_mut(index) {
                *px = color;
            }
        }

        fn clear(&mut self) {
            self.pixels.fill(Rgb::OFF);
        }

        fn show(&mut self) -> SensorResult<()> {
            let frame = encode_frame(&self.pixels, self.brightness);
            self.spi.write_all(&frame).map_err(|e| SensorError::Spi(e.to_string()))
        }
    }
}

/// Light the ring one pixel at a time
pub async fn color_wipe(ring: &SharedRing, color: Rgb, step: Duration) -> SensorResult<()> {
    let count = ring.lock().await.len();
    for i in 0..count {
        {
            let mut ring = ring.lock().await;
            ring.set_pixel(i, color);
            ring.show()?;
        }
        tokio::time::sleep(step).await;
    }
    Ok(())
}

/// Turn every pixel off
pub async fn blank(ring: &SharedRing) -> SensorResult<()> {
    let mut ring = ring.lock().await;
    ring.clear();
    ring.show()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_byte_patterns() {
        assert_eq!(encode_byte(0x00), [0x92, 0x49, 0x24]);
        assert_eq!(encode_byte(0xFF), [0xDB, 0x6D, 0xB6]);
    }

    #[test]
    fn test_frame_is_grb_with_reset_gap() {
        let frame = encode_frame(&[Rgb::RED], 255);
        assert_eq!(frame.len(), 9 + RESET_BYTES);
        // green first, then red
        assert_eq!(&frame[0..3], &encode_byte(0x00));
        assert_eq!(&frame[3..6], &encode_byte(0xFF));
        assert_eq!(&frame[6..9], &encode_byte(0x00));
        assert!(frame[9..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_brightness_scaling() {
        assert_eq!(Rgb::new(255, 128, 0).scaled(128), Rgb::new(128, 64, 0));
        assert_eq!(Rgb::GREEN.scaled(0), Rgb::OFF);
    }

    #[test]
    fn test_memory_ring_ignores_out_of_range() {
        let mut ring = MemoryRing::new(4);
        ring.set_pixel(10, Rgb::BLUE);
        ring.set_pixel(3, Rgb::BLUE);
        ring.show().unwrap();
        assert_eq!(ring.shown()[3], Rgb::BLUE);
        assert_eq!(ring.shown().len(), 4);
    }

    #[tokio::test]
    async fn test_color_wipe_fills_ring() {
        let ring = shared_ring(Box::new(MemoryRing::new(5)));
        color_wipe(&ring, Rgb::GREEN, Duration::ZERO).await.unwrap();
        blank(&ring).await.unwrap();
        assert_eq!(ring.lock().await.len(), 5);
    }
}
