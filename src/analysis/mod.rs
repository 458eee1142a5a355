//! Analysis module - gas scoring and direction winner selection

mod scoring;

pub use scoring::*;
