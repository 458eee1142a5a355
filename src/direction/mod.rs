// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! Sensor index to LED ring position lookup

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

/// One sensor → LED pairing as written in the configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionEntry {
    pub sensor: usize,
    pub led: u16,
}

/// Immutable table from gas sensor index to indicator position.
///
/// Built once at startup; lookups never fail, an unmapped index simply has
/// no indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionMap {
    table: BTreeMap<usize, u16>,
}

impl DirectionMap {
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = DirectionEntry>,
    {
        Self {
            table: entries.into_iter().map(|e| (e.sensor, e.led)).collect(),
        }
    }

    /// Indicator for a sensor, `None` when the sensor is not on the ring
    pub fn lookup(&self, sensor: usize) -> Option<u16> {
        self.table.get(&sensor).copied()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = DirectionEntry> + '_ {
        self.table.iter().map(|(&sensor, &led)| DirectionEntry { sensor, led })
    }

    /// Highest LED position referenced, used to validate against ring size
    pub fn max_led(&self) -> Option<u16> {
        self.table.values().copied().max()
    }
}

impl Default for DirectionMap {
    /// Outer four sensors of the 20-LED ring, one per quadrant
    fn default() -> Self {
        Self::new(default_entries())
    }
}

pub fn default_entries() -> Vec<DirectionEntry> {
    vec![
        DirectionEntry { sensor: 0, led: 1 },
        DirectionEntry { sensor: 1, led: 5 },
        DirectionEntry { sensor: 2, led: 11 },
        DirectionEntry { sensor: 3, led: 15 },
    ]
}
