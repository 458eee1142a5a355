//! Sensor module - gas and climate drivers, simulation, and the sensor array

mod manager;
mod traits;
mod simulator;
pub mod bme680;
pub mod sgp30;

pub use manager::SensorArray;
pub use traits::*;
pub use simulator::{PlumeModel, SharedPlume, SimulatedBme680, SimulatedSgp30};
pub use bme680::{Bme680, Bme680Settings, Oversampling};
pub use sgp30::Sgp30;
