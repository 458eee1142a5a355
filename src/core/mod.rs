//! Core module - sampling loop, run orchestration and shutdown

mod engine;
mod sampler;
mod shutdown;

pub use engine::{led_test, scan_bus, Engine, Session};
pub use sampler::{CycleRecord, LoopSummary, SamplingLoop};
pub use shutdown::{channel, watch_console, watch_interrupt, ShutdownSignal, ShutdownTrigger, StopReason};

use serde::{Deserialize, Serialize};

/// Sampling loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    Running,
    /// Stop observed; no further cycle will start
    Stopping,
}
