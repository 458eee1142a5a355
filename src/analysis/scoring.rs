// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! Per-cycle gas scoring and winner selection

use serde::{Deserialize, Serialize};

use crate::sensors::{GasReading, GasSample};

/// Score assigned to a sensor whose read failed. Loses to any valid score.
pub const FAILED_SCORE: f64 = -1.0;

/// Inclusive value range used for min-max normalization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormRange {
    pub min: f64,
    pub max: f64,
}

/// SGP30 CO2eq output range (ppm)
pub const CO2_RANGE: NormRange = NormRange { min: 400.0, max: 60000.0 };

/// SGP30 TVOC output range (ppb)
pub const TVOC_RANGE: NormRange = NormRange { min: 0.0, max: 60000.0 };

/// Clamp `(value - min) / (max - min)` into `[0, 1]`.
pub fn normalize(value: f64, range: NormRange) -> f64 {
    let span = range.max - range.min;
    if span <= 0.0 {
        return 0.0;
    }
    ((value - range.min) / span).clamp(0.0, 1.0)
}

/// normalize(CO2) + normalize(TVOC), in `[0, 2]`
pub fn combined_score(sample: &GasSample) -> f64 {
    normalize(sample.co2_ppm as f64, CO2_RANGE) + normalize(sample.tvoc_ppb as f64, TVOC_RANGE)
}

/// Score one reading, using the sentinel for a failed read
pub fn score_reading(reading: &GasReading) -> f64 {
    reading.sample.as_ref().map(combined_score).unwrap_or(FAILED_SCORE)
}

/// Score every reading, keeping reading order
pub fn score_all(readings: &[GasReading]) -> Vec<f64> {
    readings.iter().map(score_reading).collect()
}

/// Winning sensor of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Winner {
    /// Sensor index (position in the score list)
    pub index: usize,
    pub score: f64,
}

/// Which sensors compete for the direction indicator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// Sensor indices that take part in the arg-max. Empty means all.
    pub subset: Vec<usize>,
}

impl ScoringPolicy {
    pub fn new(subset: Vec<usize>) -> Self {
        Self { subset }
    }

    /// Arg-max over the subset. Ties go to the earliest subset position.
    ///
    /// Subset indices with no score (out of range) are skipped.
    pub fn select(&self, scores: &[f64]) -> Option<Winner> {
        if self.subset.is_empty() {
            return arg_max_first(scores.iter().copied().enumerate());
        }
        arg_max_first(
            self.subset
                .iter()
                .filter_map(|&i| scores.get(i).map(|&s| (i, s))),
        )
    }
}

/// Stable left-to-right arg-max: only a strictly greater score replaces the
/// current best, so the first of several equal maxima wins.
pub fn arg_max_first<I>(scores: I) -> Option<Winner>
where
    I: IntoIterator<Item = (usize, f64)>,
{
    let mut best: Option<Winner> = None;
    for (index, score) in scores {
        match best {
            Some(b) if score <= b.score => {}
            _ if score.is_nan() => {}
            _ => best = Some(Winner { index, score }),
        }
    }
    best
}
