//! In-memory GPIO used off-Pi and in tests

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

use super::{Gpio, GpioResult, Pin};

/// GPIO simulator
///
/// Every pin starts low. Inputs are set from the outside with
/// [`SimulatedGpio::set_input`]; writes are recorded, and rising edges are
/// counted per pin so tests can assert how many pulses actually reached
/// the relay.
#[derive(Debug, Default)]
pub struct SimulatedGpio {
    levels: DashMap<Pin, bool>,
    rising_edges: DashMap<Pin, u64>,
    released: AtomicBool,
}

impl SimulatedGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the level an input pin will report
    pub fn set_input(&self, pin: Pin, level: bool) {
        self.levels.insert(pin, level);
    }

    /// Current level of any pin
    pub fn level(&self, pin: Pin) -> bool {
        self.levels.get(&pin).map(|l| *l).unwrap_or(false)
    }

    /// Number of low-to-high transitions written to `pin`
    pub fn pulse_count(&self, pin: Pin) -> u64 {
        self.rising_edges.get(&pin).map(|c| *c).unwrap_or(0)
    }

    /// Whether [`Gpio::release`] has been called
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Gpio for SimulatedGpio {
    fn read(&self, pin: Pin) -> bool {
        self.level(pin)
    }

    fn write(&self, pin: Pin, level: bool) -> GpioResult<()> {
        trace!(pin, level, "Simulated GPIO write");
        let previous = self.levels.insert(pin, level).unwrap_or(false);
        if level && !previous {
            *self.rising_edges.entry(pin).or_insert(0) += 1;
        }
        Ok(())
    }

    fn release(&self) {
        // A cleaned-up header reads low everywhere.
        for mut level in self.levels.iter_mut() {
            *level = false;
        }
        self.released.store(true, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
