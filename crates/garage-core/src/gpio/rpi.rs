//! Raspberry Pi GPIO through rppal

use rppal::gpio::{Gpio as Chip, InputPin, OutputPin};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

use super::{Gpio, GpioError, GpioResult, Pin};

/// Hardware GPIO on the Pi header
///
/// Inputs are configured with the internal pull-down so an unwired reed
/// switch reads low. Outputs start low.
pub struct RpiGpio {
    inputs: HashMap<Pin, InputPin>,
    outputs: Mutex<HashMap<Pin, OutputPin>>,
}

impl RpiGpio {
    /// Claim the given pins from the kernel GPIO driver
    pub fn new(outputs: &[Pin], inputs: &[Pin]) -> GpioResult<Self> {
        let chip = Chip::new().map_err(|e| GpioError::Backend(e.to_string()))?;

        let claim = |pin: Pin| {
            chip.get(pin).map_err(|e| GpioError::PinUnavailable {
                pin,
                reason: e.to_string(),
            })
        };

        let mut input_pins = HashMap::new();
        for &pin in inputs {
            input_pins.insert(pin, claim(pin)?.into_input_pulldown());
        }

        let mut output_pins = HashMap::new();
        for &pin in outputs {
            output_pins.insert(pin, claim(pin)?.into_output_low());
        }

        debug!(?inputs, ?outputs, "Claimed GPIO lines");

        Ok(Self {
            inputs: input_pins,
            outputs: Mutex::new(output_pins),
        })
    }
}

impl Gpio for RpiGpio {
    fn read(&self, pin: Pin) -> bool {
        self.inputs.get(&pin).map(|p| p.is_high()).unwrap_or(false)
    }

    fn write(&self, pin: Pin, level: bool) -> GpioResult<()> {
        let mut outputs = self
            .outputs
            .lock()
            .map_err(|_| GpioError::Backend("output table lock poisoned".to_string()))?;
        let line = outputs
            .get_mut(&pin)
            .ok_or(GpioError::NotConfigured { pin })?;
        if level {
            line.set_high();
        } else {
            line.set_low();
        }
        Ok(())
    }

    fn release(&self) {
        match self.outputs.lock() {
            Ok(mut outputs) => {
                for line in outputs.values_mut() {
                    line.set_low();
                }
                // Dropping the pins hands them back to the kernel
                outputs.clear();
            }
            Err(_) => warn!("GPIO output table poisoned, skipping release"),
        }
    }

    fn name(&self) -> &'static str {
        "rpi"
    }
}
