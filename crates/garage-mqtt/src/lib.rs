//! Home Assistant MQTT bridge for the garage controller
//!
//! Mirrors door state and close mode into retained topics, advertises a
//! cover and a switch entity through MQTT discovery, and turns inbound
//! command messages into [`BusCommand`]s applied to the shared
//! [`garage_core::DoorController`].
//!
//! Transport events flow into the bridge over a channel:
//!
//! ```text
//!   rumqttc EventLoop ──BusEvent──▶ mpsc ──▶ BusBridge::run ──▶ DoorController
//! ```
//!
//! so no publish is ever issued from the task that drives the connection.

mod bridge;
mod command;
mod discovery;
mod error;
mod topics;
mod transport;

pub use bridge::{BusBridge, Publisher};
pub use command::{BusCommand, BusEvent};
pub use discovery::{CoverDiscovery, DeviceInfo, SwitchDiscovery};
pub use error::{BusError, BusResult};
pub use topics::Topics;
pub use transport::{connect, MqttEventLoop, MqttTransport, EVENT_CHANNEL_CAPACITY};

/// Availability payloads
pub const PAYLOAD_ONLINE: &str = "online";
pub const PAYLOAD_OFFLINE: &str = "offline";

/// Switch payloads for close mode
pub const PAYLOAD_ON: &str = "ON";
pub const PAYLOAD_OFF: &str = "OFF";
