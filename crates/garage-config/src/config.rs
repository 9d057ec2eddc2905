//! Garage controller configuration
//!
//! Every section has per-field defaults, so a YAML file only needs the keys
//! it wants to change.

use garage_core::{DoorPins, DoorTiming, Pin};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::env;
use crate::error::{ConfigError, ConfigResult};

/// Highest BCM pin on the 40-pin header
const MAX_BCM_PIN: Pin = 27;

/// Which GPIO implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GpioBackend {
    /// Hardware when available, simulator otherwise
    #[default]
    Auto,
    /// Raspberry Pi header; fail if unavailable
    Rpi,
    /// In-memory simulator
    Sim,
}

impl std::str::FromStr for GpioBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(GpioBackend::Auto),
            "rpi" => Ok(GpioBackend::Rpi),
            "sim" | "simulated" => Ok(GpioBackend::Sim),
            other => Err(format!("unknown GPIO backend '{}'", other)),
        }
    }
}

/// Door timing, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoorConfig {
    /// How long the trigger relay is held closed
    pub trigger_pulse_s: f64,
    /// Minimum time between two pulses
    pub min_toggle_gap_s: f64,
    /// Close-mode enforcement period
    pub enforce_interval_s: f64,
    /// Door state polling period for the bus
    pub publish_interval_s: f64,
}

impl Default for DoorConfig {
    fn default() -> Self {
        Self {
            trigger_pulse_s: 0.5,
            min_toggle_gap_s: 2.0,
            enforce_interval_s: 5.0,
            publish_interval_s: 1.0,
        }
    }
}

impl DoorConfig {
    pub fn timing(&self) -> ConfigResult<DoorTiming> {
        Ok(DoorTiming {
            trigger_pulse: seconds("door.trigger_pulse_s", self.trigger_pulse_s)?,
            min_toggle_gap: seconds("door.min_toggle_gap_s", self.min_toggle_gap_s)?,
        })
    }

    pub fn enforce_interval(&self) -> ConfigResult<Duration> {
        seconds("door.enforce_interval_s", self.enforce_interval_s)
    }

    pub fn publish_interval(&self) -> ConfigResult<Duration> {
        seconds("door.publish_interval_s", self.publish_interval_s)
    }
}

/// HTTP listener and bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token for mutating endpoints; empty disables auth
    pub token: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            token: String::new(),
        }
    }
}

impl ApiConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The configured token, if auth is enabled
    pub fn token(&self) -> Option<&str> {
        let token = self.token.trim();
        (!token.is_empty()).then_some(token)
    }
}

/// Broker connection and topic layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host; empty disables the bus entirely
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub client_id: String,
    pub discovery_prefix: String,
    pub node_id: String,
    /// Prefix for every state and command topic
    pub base: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            user: String::new(),
            password: String::new(),
            client_id: "garagepi".to_string(),
            discovery_prefix: "homeassistant".to_string(),
            node_id: "garagepi".to_string(),
            base: "garagepi".to_string(),
        }
    }
}

impl MqttConfig {
    pub fn is_enabled(&self) -> bool {
        !self.host.trim().is_empty()
    }

    /// Username and password, when a username is configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        (!self.user.is_empty()).then(|| (self.user.as_str(), self.password.as_str()))
    }
}

/// Complete controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GarageConfig {
    pub pins: DoorPins,
    pub door: DoorConfig,
    pub gpio_backend: GpioBackend,
    pub api: ApiConfig,
    pub mqtt: MqttConfig,
}

impl GarageConfig {
    /// Load from the process environment
    ///
    /// Reads the YAML file named by `GARAGE_CONFIG` first, if set.
    pub fn load() -> ConfigResult<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let mut config = match lookup(env::CONFIG_FILE_VAR).filter(|p| !p.trim().is_empty()) {
            Some(path) => Self::from_yaml_file(path.trim())?,
            None => Self::default(),
        };
        env::apply(&mut config, &lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML file without applying the environment
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration file");

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check ranges and cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        self.door.timing()?;
        self.door.enforce_interval()?;
        self.door.publish_interval()?;

        for (key, pin) in [
            ("pins.trigger", self.pins.trigger),
            ("pins.sensor_open", self.pins.sensor_open),
            ("pins.sensor_closed", self.pins.sensor_closed),
        ] {
            if pin > MAX_BCM_PIN {
                return Err(ConfigError::invalid(
                    key,
                    format!("BCM pin {} is out of range 0..={}", pin, MAX_BCM_PIN),
                ));
            }
        }

        let DoorPins {
            trigger,
            sensor_open,
            sensor_closed,
        } = self.pins;
        if trigger == sensor_open || trigger == sensor_closed || sensor_open == sensor_closed {
            return Err(ConfigError::invalid(
                "pins",
                "trigger and sensor pins must be distinct",
            ));
        }

        if self.api.port == 0 {
            return Err(ConfigError::invalid("api.port", "port must be non-zero"));
        }
        if self.mqtt.is_enabled() && self.mqtt.port == 0 {
            return Err(ConfigError::invalid("mqtt.port", "port must be non-zero"));
        }

        Ok(())
    }
}

/// Convert a seconds value to a positive duration
fn seconds(key: &str, value: f64) -> ConfigResult<Duration> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::invalid(
            key,
            format!("expected a positive number of seconds, got {}", value),
        ));
    }
    Duration::try_from_secs_f64(value).map_err(|e| ConfigError::invalid(key, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GarageConfig::load_with(lookup(&[])).unwrap();
        assert_eq!(config.pins, DoorPins::default());
        assert_eq!(config.api.bind_address(), "0.0.0.0:5000");
        assert_eq!(config.api.token(), None);
        assert_eq!(config.mqtt.host, "localhost");
        assert_eq!(config.mqtt.base, "garagepi");
        assert_eq!(config.gpio_backend, GpioBackend::Auto);

        let timing = config.door.timing().unwrap();
        assert_eq!(timing.trigger_pulse, Duration::from_millis(500));
        assert_eq!(timing.min_toggle_gap, Duration::from_secs(2));
        assert_eq!(config.door.enforce_interval().unwrap(), Duration::from_secs(5));
        assert_eq!(config.door.publish_interval().unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn test_token_is_trimmed() {
        let config = GarageConfig::load_with(lookup(&[("API_TOKEN", "  abc \n")])).unwrap();
        assert_eq!(config.api.token(), Some("abc"));

        let config = GarageConfig::load_with(lookup(&[("API_TOKEN", "   ")])).unwrap();
        assert_eq!(config.api.token(), None);
    }

    #[test]
    fn test_empty_mqtt_host_disables_bus() {
        let config = GarageConfig::load_with(lookup(&[("MQTT_HOST", "")])).unwrap();
        assert!(!config.mqtt.is_enabled());
    }

    #[test]
    fn test_credentials_require_user() {
        let mut mqtt = MqttConfig::default();
        mqtt.password = "secret".to_string();
        assert_eq!(mqtt.credentials(), None);

        mqtt.user = "door".to_string();
        assert_eq!(mqtt.credentials(), Some(("door", "secret")));
    }

    #[test]
    fn test_zero_pulse_rejected() {
        let err = GarageConfig::load_with(lookup(&[("TRIGGER_PULSE_S", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "door.trigger_pulse_s"));
    }

    #[test]
    fn test_duplicate_pins_rejected() {
        let err = GarageConfig::load_with(lookup(&[("PIN_SENSOR_OPEN", "4")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "pins"));
    }

    #[test]
    fn test_out_of_range_pin_rejected() {
        let err = GarageConfig::load_with(lookup(&[("PIN_TRIGGER", "40")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "pins.trigger"));
    }

    #[test]
    fn test_yaml_file_with_env_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
pins:
  trigger: 17
door:
  min_toggle_gap_s: 3.5
gpio_backend: sim
mqtt:
  base: garage/north
  port: 8883
"#
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let config = GarageConfig::load_with(lookup(&[
            ("GARAGE_CONFIG", path.as_str()),
            ("MQTT_PORT", "1884"),
        ]))
        .unwrap();

        assert_eq!(config.pins.trigger, 17);
        assert_eq!(config.pins.sensor_open, 14);
        assert_eq!(config.door.min_toggle_gap_s, 3.5);
        assert_eq!(config.door.trigger_pulse_s, 0.5);
        assert_eq!(config.gpio_backend, GpioBackend::Sim);
        assert_eq!(config.mqtt.base, "garage/north");
        assert_eq!(config.mqtt.port, 1884);
    }

    #[test]
    fn test_missing_file() {
        let err = GarageConfig::load_with(lookup(&[("GARAGE_CONFIG", "/nonexistent/garage.yaml")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pins: [not, a, mapping").unwrap();

        let err = GarageConfig::from_yaml_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseYaml { .. }));
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("RPI".parse::<GpioBackend>(), Ok(GpioBackend::Rpi));
        assert_eq!("simulated".parse::<GpioBackend>(), Ok(GpioBackend::Sim));
        assert!("gpiod".parse::<GpioBackend>().is_err());
    }
}
