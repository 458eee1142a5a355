// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! Directional sampling loop

use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::shutdown::{ShutdownSignal, StopReason};
use super::LoopState;
use crate::analysis::{score_all, ScoringPolicy, Winner};
use crate::detection::{ClassificationOutcome, SmellClassifier};
use crate::direction::DirectionMap;
use crate::sensors::{ClimateReading, GasReading, SensorArray, SensorHealth};
use crate::streaming::RecordSink;

/// Everything observed and decided in one cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleRecord {
    /// 1-based
    pub cycle: u64,
    pub timestamp: DateTime<Local>,
    pub gas: Vec<GasReading>,
    pub scores: Vec<f64>,
    pub winner: Option<Winner>,
    pub indicator: Option<u16>,
    pub climate: ClimateReading,
    pub classification: ClassificationOutcome,
}

/// What the loop reports when it returns
#[derive(Debug, Clone)]
pub struct LoopSummary {
    pub cycles: u64,
    pub reason: Option<StopReason>,
    pub health: Vec<SensorHealth>,
}

pub struct SamplingLoop {
    sensors: SensorArray,
    direction: Arc<DirectionMap>,
    policy: ScoringPolicy,
    classifier: Option<SmellClassifier>,
    sinks: Vec<Box<dyn RecordSink>>,
    period: Duration,
    cycle: u64,
    state: LoopState,
}

impl SamplingLoop {
    pub fn new(sensors: SensorArray, direction: Arc<DirectionMap>, policy: ScoringPolicy, period: Duration) -> Self {
        Self {
            sensors,
            direction,
            policy,
            classifier: None,
            sinks: Vec::new(),
            period,
            cycle: 0,
            state: LoopState::Running,
        }
    }

    pub fn with_classifier(mut self, classifier: Option<SmellClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn RecordSink>) {
        info!("Output: {}", sink.name());
        self.sinks.push(sink);
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Read, score, decide and emit once
    pub async fn run_cycle(&mut self) -> CycleRecord {
        self.cycle += 1;
        let timestamp = Local::now();

        let gas = self.sensors.read_gas().await;
        let scores = score_all(&gas);
        let winner = self.policy.select(&scores);
        let indicator = winner.and_then(|w| self.direction.lookup(w.index));

        let climate = self.sensors.read_climate().await;

        let classification = match &self.classifier {
            Some(model) => model.classify(&climate, &gas),
            None => ClassificationOutcome::Disabled,
        };

        let record = CycleRecord {
            cycle: self.cycle,
            timestamp,
            gas,
            scores,
            winner,
            indicator,
            climate,
            classification,
        };
        debug!(
            "cycle {}: winner {:?} indicator {:?}",
            record.cycle,
            record.winner.map(|w| w.index),
            record.indicator
        );

        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.accept(&record).await {
                warn!("{} failed on cycle {}: {:#}", sink.name(), record.cycle, e);
            }
        }

        record
    }

    /// Run until stopped. A stop is only observed between cycles.
    pub async fn run(mut self, mut signal: ShutdownSignal) -> LoopSummary {
        self.sensors.connect_all().await;
        info!("Sampling every {:?} over {} gas sensors", self.period, self.sensors.gas_count());

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.state == LoopState::Running {
            tokio::select! {
                biased;
                _ = signal.wait() => {
                    self.state = LoopState::Stopping;
                    continue;
                }
                _ = ticker.tick() => {}
            }
            if signal.is_stopping() {
                self.state = LoopState::Stopping;
                continue;
            }
            self.run_cycle().await;
        }

        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.close().await {
                warn!("Closing {} failed: {:#}", sink.name(), e);
            }
        }

        info!("Sampling stopped after {} cycles", self.cycle);
        LoopSummary {
            cycles: self.cycle,
            reason: signal.reason(),
            health: self.sensors.health(),
        }
    }
}
