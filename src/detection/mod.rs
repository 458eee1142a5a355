//! Detection module - smell classification

mod classification;

pub use classification::*;
