//! Configuration for the garage controller
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. Built-in defaults
//! 2. An optional YAML file named by `GARAGE_CONFIG`
//! 3. Environment variables (`PIN_TRIGGER`, `MQTT_HOST`, `API_TOKEN`, ...)
//!
//! # Example
//!
//! ```ignore
//! use garage_config::GarageConfig;
//!
//! let config = GarageConfig::load()?;
//! let timing = config.door.timing()?;
//! ```

mod config;
mod env;
mod error;

pub use config::{ApiConfig, DoorConfig, GarageConfig, GpioBackend, MqttConfig};
pub use env::CONFIG_FILE_VAR;
pub use error::{ConfigError, ConfigResult};
