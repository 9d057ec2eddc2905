//! MQTT discovery documents
//!
//! Two entities share one device: a cover for the door itself and a switch
//! for close mode. Both point at the same availability topic.

use serde::Serialize;

use crate::topics::Topics;
use crate::{PAYLOAD_OFF, PAYLOAD_ON};

/// Device block shared by both entities
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Cover entity config
#[derive(Debug, Clone, Serialize)]
pub struct CoverDiscovery {
    pub name: String,
    pub unique_id: String,
    pub availability_topic: String,
    pub command_topic: String,
    pub state_topic: String,
    pub payload_open: &'static str,
    pub payload_close: &'static str,
    pub payload_stop: &'static str,
    pub state_open: &'static str,
    pub state_closed: &'static str,
    pub state_opening: &'static str,
    pub state_closing: &'static str,
    pub device: DeviceInfo,
}

impl CoverDiscovery {
    pub fn new(topics: &Topics, node_id: &str) -> Self {
        Self {
            name: "Garage Door".to_string(),
            unique_id: format!("{}_cover", node_id),
            availability_topic: topics.availability.clone(),
            command_topic: topics.cover_command.clone(),
            state_topic: topics.cover_state.clone(),
            payload_open: "OPEN",
            payload_close: "CLOSE",
            payload_stop: "STOP",
            state_open: "open",
            state_closed: "closed",
            state_opening: "opening",
            state_closing: "closing",
            device: DeviceInfo {
                identifiers: vec![node_id.to_string()],
                name: Some("GaragePi".to_string()),
            },
        }
    }
}

/// Close-mode switch entity config
#[derive(Debug, Clone, Serialize)]
pub struct SwitchDiscovery {
    pub name: String,
    pub unique_id: String,
    pub availability_topic: String,
    pub command_topic: String,
    pub state_topic: String,
    pub payload_on: &'static str,
    pub payload_off: &'static str,
    pub device: DeviceInfo,
}

impl SwitchDiscovery {
    pub fn new(topics: &Topics, node_id: &str) -> Self {
        Self {
            name: "Garage Close Mode".to_string(),
            unique_id: format!("{}_close_mode", node_id),
            availability_topic: topics.availability.clone(),
            command_topic: topics.close_mode_command.clone(),
            state_topic: topics.close_mode_state.clone(),
            payload_on: PAYLOAD_ON,
            payload_off: PAYLOAD_OFF,
            device: DeviceInfo {
                identifiers: vec![node_id.to_string()],
                name: None,
            },
        }
    }
}
