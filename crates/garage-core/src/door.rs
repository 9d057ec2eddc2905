//! Door position, projected state and the static wiring/timing description

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::gpio::Pin;

/// Raw reading of both reed switches, sampled together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorPosition {
    pub at_open_sensor: bool,
    pub at_closed_sensor: bool,
}

impl DoorPosition {
    pub fn new(at_open_sensor: bool, at_closed_sensor: bool) -> Self {
        Self {
            at_open_sensor,
            at_closed_sensor,
        }
    }

    /// Project the two switches into a logical door state
    pub fn state(&self) -> DoorState {
        match (self.at_open_sensor, self.at_closed_sensor) {
            (true, false) => DoorState::Open,
            (false, true) => DoorState::Closed,
            (false, false) => DoorState::Moving,
            (true, true) => DoorState::Unknown,
        }
    }
}

/// Logical door state
///
/// Serialized in title case (`"Open"`) for the HTTP API; the bus uses the
/// lower-case form from [`DoorState::as_payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DoorState {
    Open,
    Closed,
    /// Neither endpoint switch is engaged
    Moving,
    /// Both switches engaged at once, which only a sensor fault produces
    Unknown,
}

impl DoorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoorState::Open => "Open",
            DoorState::Closed => "Closed",
            DoorState::Moving => "Moving",
            DoorState::Unknown => "Unknown",
        }
    }

    /// Retained cover-state payload
    pub fn as_payload(&self) -> &'static str {
        match self {
            DoorState::Open => "open",
            DoorState::Closed => "closed",
            DoorState::Moving => "moving",
            DoorState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intent carried by a cover command
///
/// The opener behind the relay is toggle-only, so all three map onto the
/// same pulse. They differ only in how close mode treats them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoverCommand {
    Open,
    Close,
    Stop,
}

impl CoverCommand {
    /// OPEN and CLOSE cannot be told apart once they hit the relay
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, CoverCommand::Open | CoverCommand::Close)
    }
}

impl FromStr for CoverCommand {
    type Err = ();

    /// Parses a bus payload, ignoring case and surrounding whitespace
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(CoverCommand::Open),
            "CLOSE" => Ok(CoverCommand::Close),
            "STOP" => Ok(CoverCommand::Stop),
            _ => Err(()),
        }
    }
}

/// BCM pin numbers for the trigger relay and the two reed switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoorPins {
    pub trigger: Pin,
    pub sensor_open: Pin,
    pub sensor_closed: Pin,
}

impl Default for DoorPins {
    fn default() -> Self {
        Self {
            trigger: 4,
            sensor_open: 14,
            sensor_closed: 16,
        }
    }
}

/// Pulse length and the minimum spacing between two pulses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorTiming {
    pub trigger_pulse: Duration,
    pub min_toggle_gap: Duration,
}

impl Default for DoorTiming {
    fn default() -> Self {
        Self {
            trigger_pulse: Duration::from_millis(500),
            min_toggle_gap: Duration::from_secs(2),
        }
    }
}
