//! Trigger relay driver

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::gpio::{Gpio, GpioError, GpioResult, Pin};

/// Sole writer of the trigger output
///
/// A pulse drives the line high, holds it for the configured duration, then
/// drives it low. The pulse runs on its own task, so a caller that goes away
/// mid-pulse (for example a dropped HTTP connection) never leaves the relay
/// energized.
#[derive(Clone)]
pub struct Actuator {
    gpio: Arc<dyn Gpio>,
    pin: Pin,
    duration: Duration,
    line: Arc<Mutex<()>>,
}

impl Actuator {
    pub fn new(gpio: Arc<dyn Gpio>, pin: Pin, duration: Duration) -> Self {
        Self {
            gpio,
            pin,
            duration,
            line: Arc::new(Mutex::new(())),
        }
    }

    pub fn pin(&self) -> Pin {
        self.pin
    }

    /// Issue one pulse and wait for it to finish
    ///
    /// Failing to drive the line is returned to the caller, never retried.
    pub async fn pulse(&self) -> GpioResult<()> {
        let gpio = self.gpio.clone();
        let pin = self.pin;
        let duration = self.duration;
        let line = self.line.clone().lock_owned().await;

        let task = tokio::spawn(async move {
            let _line = line;
            debug!(pin, ?duration, "Trigger high");
            gpio.write(pin, true)?;
            tokio::time::sleep(duration).await;
            let result = gpio.write(pin, false);
            if let Err(ref e) = result {
                error!(pin, "Failed to drive trigger low: {}", e);
            }
            debug!(pin, "Trigger low");
            result
        });

        task.await
            .map_err(|e| GpioError::Backend(format!("pulse task failed: {}", e)))?
    }
}
