// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! Exit and power-off push buttons

/// Turns a stream of pin levels into press events.
///
/// Buttons pull the pin low when pressed; a press is reported once per
/// high-to-low transition, however many low levels follow it.
#[derive(Debug, Clone, Copy)]
pub struct EdgeDetector {
    prev: bool,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self { prev: true }
    }

    /// Feed the current level, returns true on a fresh press
    pub fn update(&mut self, level: bool) -> bool {
        let pressed = self.prev && !level;
        self.prev = level;
        pressed
    }
}

impl Default for EdgeDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "hardware")]
pub use gpio::ButtonWatcher;

#[cfg(feature = "hardware")]
mod gpio {
    use std::time::Duration;

    use rppal::gpio::{Event, Gpio, InputPin, Trigger};
    use tracing::info;

    use super::EdgeDetector;
    use crate::core::{ShutdownTrigger, StopReason};
    use crate::error::{SensorError, SensorResult};

    /// Holds the interrupt-armed pins; dropping it disarms them
    pub struct ButtonWatcher {
        _pins: Vec<InputPin>,
    }

    impl ButtonWatcher {
        pub fn start(
            exit_pin: u8,
            poweroff_pin: u8,
            debounce: Duration,
            trigger: ShutdownTrigger,
        ) -> SensorResult<Self> {
            let gpio = Gpio::new().map_err(|e| SensorError::Gpio(e.to_string()))?;
            let mut pins = Vec::with_capacity(2);

            for (number, reason) in [(exit_pin, StopReason::ExitButton), (poweroff_pin, StopReason::PowerOffButton)] {
                let mut pin = gpio
                    .get(number)
                    .map_err(|e| SensorError::Gpio(format!("GPIO{}: {}", number, e)))?
                    .into_input_pullup();

                let trigger = trigger.clone();
                let mut edges = EdgeDetector::new();
                pin.set_async_interrupt(Trigger::Both, Some(debounce), move |event: Event| {
                    let level = !matches!(event.trigger, Trigger::FallingEdge);
                    if edges.update(level) {
                        info!("{:?} pressed", reason);
                        trigger.stop(reason);
                    }
                })
                .map_err(|e| SensorError::Gpio(format!("GPIO{}: {}", number, e)))?;

                pins.push(pin);
            }

            info!("Buttons armed: exit GPIO{}, power-off GPIO{}", exit_pin, poweroff_pin);
            Ok(Self { _pins: pins })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_trigger_per_press() {
        let mut edges = EdgeDetector::new();
        assert!(!edges.update(true));
        assert!(edges.update(false));
        // held down
        assert!(!edges.update(false));
        assert!(!edges.update(false));
        // released, pressed again
        assert!(!edges.update(true));
        assert!(edges.update(false));
    }

    #[test]
    fn test_release_alone_never_triggers() {
        let mut edges = EdgeDetector::new();
        for _ in 0..3 {
            assert!(!edges.update(true));
        }
    }
}
