// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! Direction indicator on the LED ring

use anyhow::Result;
use async_trait::async_trait;

use super::RecordSink;
use crate::core::CycleRecord;
use crate::hardware::{Rgb, SharedRing};

/// Clears the ring and lights the winner's LED each cycle
pub struct LedSink {
    ring: SharedRing,
    color: Rgb,
}

impl LedSink {
    pub fn new(ring: SharedRing) -> Self {
        Self { ring, color: Rgb::RED }
    }
}

#[async_trait]
impl RecordSink for LedSink {
    fn name(&self) -> &str {
        "led ring"
    }

    async fn accept(&mut self, record: &CycleRecord) -> Result<()> {
        let mut ring = self.ring.lock().await;
        ring.clear();
        if let Some(led) = record.indicator {
            ring.set_pixel(led as usize, self.color);
        }
        ring.show()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::SensorResult;
    use crate::hardware::{shared_ring, LedRing, MemoryRing};
    use crate::streaming::testing::record;

    /// Forwards to a MemoryRing the test can still inspect
    struct Probe(Arc<Mutex<MemoryRing>>);

    impl LedRing for Probe {
        fn len(&self) -> usize { self.0.lock().unwrap().len() }
        fn set_pixel(&mut self, index: usize, color: Rgb) { self.0.lock().unwrap().set_pixel(index, color) }
        fn clear(&mut self) { self.0.lock().unwrap().clear() }
        fn show(&mut self) -> SensorResult<()> { self.0.lock().unwrap().show() }
    }

    #[tokio::test]
    async fn test_lights_only_the_indicator() {
        let memory = Arc::new(Mutex::new(MemoryRing::new(20)));
        let mut sink = LedSink::new(shared_ring(Box::new(Probe(memory.clone()))));

        let mut first = record(1);
        first.indicator = Some(11);
        sink.accept(&first).await.unwrap();
        let mut second = record(2);
        second.indicator = Some(5);
        sink.accept(&second).await.unwrap();

        let ring = memory.lock().unwrap();
        let lit: Vec<usize> = ring.shown().iter().enumerate().filter(|(_, c)| **c != Rgb::OFF).map(|(i, _)| i).collect();
        assert_eq!(lit, vec![5]);
        assert_eq!(ring.shown()[5], Rgb::RED);
        assert_eq!(ring.frames(), 2);
    }

    #[tokio::test]
    async fn test_no_indicator_blanks_ring() {
        let memory = Arc::new(Mutex::new(MemoryRing::new(20)));
        let mut sink = LedSink::new(shared_ring(Box::new(Probe(memory.clone()))));
        let mut rec = record(1);
        rec.indicator = None;
        sink.accept(&rec).await.unwrap();
        assert!(memory.lock().unwrap().shown().iter().all(|c| *c == Rgb::OFF));
    }
}
