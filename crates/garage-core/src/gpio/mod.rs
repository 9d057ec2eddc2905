//! GPIO capability
//!
//! The controller never talks to hardware directly. It reads inputs and
//! drives the trigger line through [`Gpio`], which has two implementations:
//! [`SimulatedGpio`] (in-memory, always available) and `RpiGpio` (behind the
//! `rpi` feature).

mod sim;

#[cfg(feature = "rpi")]
mod rpi;

#[cfg(feature = "rpi")]
pub use rpi::RpiGpio;
pub use sim::SimulatedGpio;

use thiserror::Error;

/// BCM pin number
pub type Pin = u8;

/// Result type for GPIO operations
pub type GpioResult<T> = Result<T, GpioError>;

/// Errors raised by a GPIO backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GpioError {
    /// The pin could not be claimed from the backend
    #[error("GPIO pin {pin} is not available: {reason}")]
    PinUnavailable { pin: Pin, reason: String },

    /// Write to a pin that was never set up as an output, or was released
    #[error("GPIO pin {pin} is not configured as an output")]
    NotConfigured { pin: Pin },

    /// Any other backend failure
    #[error("GPIO backend failure: {0}")]
    Backend(String),
}

/// Digital I/O capability
///
/// Reads never fail: an unwired or unreadable input reports `false`, which
/// the door projection already treats as "not at this endpoint".
pub trait Gpio: Send + Sync {
    /// Read the level of an input pin
    fn read(&self, pin: Pin) -> bool;

    /// Drive an output pin high (`true`) or low (`false`)
    fn write(&self, pin: Pin, level: bool) -> GpioResult<()>;

    /// Drive every output low and give the lines back
    ///
    /// Must be safe to call more than once.
    fn release(&self);

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}
