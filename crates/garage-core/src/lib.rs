//! Door state reconciliation and actuation safety for the garage controller
//!
//! This crate owns everything that touches the physical door:
//!
//! - [`Gpio`] - the capability the rest of the crate reads sensors and drives
//!   the trigger relay through, with a simulator and an optional Raspberry Pi
//!   backend
//! - [`SensorReader`] - samples both reed switches into a [`DoorPosition`]
//! - [`Actuator`] - the only writer of the trigger output
//! - [`DoorController`] - projects sensor readings into a [`DoorState`] and
//!   serializes every toggle request behind close mode and the rate limiter
//!
//! HTTP handlers, the bus bridge and the background loops all share one
//! `Arc<DoorController>`.

mod actuator;
mod controller;
mod door;
pub mod gpio;
mod sensor;

pub use actuator::Actuator;
pub use controller::{
    ControllerEvent, DoorController, DoorSnapshot, ToggleError, ToggleOutcome, ToggleResult,
    ToggleSource,
};
pub use door::{CoverCommand, DoorPins, DoorPosition, DoorState, DoorTiming};
pub use gpio::{Gpio, GpioError, GpioResult, Pin, SimulatedGpio};
pub use sensor::SensorReader;
