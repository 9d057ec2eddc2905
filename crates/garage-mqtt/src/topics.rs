//! Topic layout

/// Every topic the bridge publishes to or subscribes on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub availability: String,
    pub cover_state: String,
    pub cover_command: String,
    pub close_mode_state: String,
    pub close_mode_command: String,
    /// Discovery config topic for the cover entity
    pub cover_config: String,
    /// Discovery config topic for the close-mode switch entity
    pub switch_config: String,
}

impl Topics {
    pub fn new(base: &str, discovery_prefix: &str, node_id: &str) -> Self {
        let base = base.trim_end_matches('/');
        let prefix = discovery_prefix.trim_end_matches('/');
        Self {
            availability: format!("{}/availability", base),
            cover_state: format!("{}/cover/state", base),
            cover_command: format!("{}/cover/set", base),
            close_mode_state: format!("{}/close_mode/state", base),
            close_mode_command: format!("{}/close_mode/set", base),
            cover_config: format!("{}/cover/{}/cover/config", prefix, node_id),
            switch_config: format!("{}/switch/{}/close_mode/config", prefix, node_id),
        }
    }

    pub fn from_config(config: &garage_config::MqttConfig) -> Self {
        Self::new(&config.base, &config.discovery_prefix, &config.node_id)
    }
}
