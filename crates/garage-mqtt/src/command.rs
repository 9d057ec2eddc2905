//! Typed bus input

use garage_core::CoverCommand;

use crate::topics::Topics;
use crate::{PAYLOAD_OFF, PAYLOAD_ON};

/// Something the transport observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// Broker accepted the connection (first connect or reconnect)
    Connected,
    /// A message arrived on a subscribed topic
    Message { topic: String, payload: String },
}

/// A command decoded from an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusCommand {
    /// Cover command topic; every intent becomes one toggle
    Toggle(CoverCommand),
    /// Close-mode command topic
    SetCloseMode(bool),
}

impl BusCommand {
    /// Decode a message, returning `None` for unknown topics or payloads
    pub fn parse(topics: &Topics, topic: &str, payload: &str) -> Option<Self> {
        if topic == topics.cover_command {
            payload.parse().ok().map(BusCommand::Toggle)
        } else if topic == topics.close_mode_command {
            match payload.trim().to_ascii_uppercase().as_str() {
                PAYLOAD_ON => Some(BusCommand::SetCloseMode(true)),
                PAYLOAD_OFF => Some(BusCommand::SetCloseMode(false)),
                _ => None,
            }
        } else {
            None
        }
    }
}
