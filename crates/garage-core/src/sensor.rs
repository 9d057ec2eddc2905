//! Reed switch sampling

use std::sync::Arc;

use crate::door::DoorPosition;
use crate::gpio::{Gpio, Pin};

/// Reads the open and closed endpoint switches together
#[derive(Clone)]
pub struct SensorReader {
    gpio: Arc<dyn Gpio>,
    open_pin: Pin,
    closed_pin: Pin,
}

impl SensorReader {
    pub fn new(gpio: Arc<dyn Gpio>, open_pin: Pin, closed_pin: Pin) -> Self {
        Self {
            gpio,
            open_pin,
            closed_pin,
        }
    }

    /// Sample both switches back to back
    ///
    /// No side effects and no actuation between the two reads.
    pub fn read(&self) -> DoorPosition {
        let at_open_sensor = self.gpio.read(self.open_pin);
        let at_closed_sensor = self.gpio.read(self.closed_pin);
        DoorPosition::new(at_open_sensor, at_closed_sensor)
    }
}
