//! Environment variable overrides

use std::str::FromStr;

use crate::config::GarageConfig;
use crate::error::{ConfigError, ConfigResult};

/// Names a YAML file to load before the environment is applied
pub const CONFIG_FILE_VAR: &str = "GARAGE_CONFIG";

/// Overlay recognised environment variables onto `config`
pub(crate) fn apply(
    config: &mut GarageConfig,
    lookup: &impl Fn(&str) -> Option<String>,
) -> ConfigResult<()> {
    let pins = &mut config.pins;
    set_parsed(lookup, "PIN_TRIGGER", &mut pins.trigger)?;
    set_parsed(lookup, "PIN_SENSOR_OPEN", &mut pins.sensor_open)?;
    set_parsed(lookup, "PIN_SENSOR_CLOSED", &mut pins.sensor_closed)?;

    let door = &mut config.door;
    set_parsed(lookup, "TRIGGER_PULSE_S", &mut door.trigger_pulse_s)?;
    set_parsed(lookup, "MIN_TOGGLE_GAP_S", &mut door.min_toggle_gap_s)?;
    set_parsed(lookup, "ENFORCE_INTERVAL_S", &mut door.enforce_interval_s)?;
    set_parsed(lookup, "PUBLISH_INTERVAL_S", &mut door.publish_interval_s)?;

    set_parsed(lookup, "GPIO_BACKEND", &mut config.gpio_backend)?;

    let api = &mut config.api;
    set_string(lookup, "HOST", &mut api.host);
    set_parsed(lookup, "PORT", &mut api.port)?;
    if let Some(token) = lookup("API_TOKEN") {
        api.token = token.trim().to_string();
    }

    let mqtt = &mut config.mqtt;
    set_string(lookup, "MQTT_HOST", &mut mqtt.host);
    set_parsed(lookup, "MQTT_PORT", &mut mqtt.port)?;
    set_string(lookup, "MQTT_USER", &mut mqtt.user);
    set_string(lookup, "MQTT_PASSWORD", &mut mqtt.password);
    set_string(lookup, "MQTT_CLIENT_ID", &mut mqtt.client_id);
    set_string(lookup, "DISCOVERY_PREFIX", &mut mqtt.discovery_prefix);
    set_string(lookup, "NODE_ID", &mut mqtt.node_id);
    set_string(lookup, "MQTT_BASE", &mut mqtt.base);

    Ok(())
}

fn set_string(lookup: &impl Fn(&str) -> Option<String>, var: &str, target: &mut String) {
    if let Some(value) = lookup(var) {
        *target = value;
    }
}

fn set_parsed<T>(lookup: &impl Fn(&str) -> Option<String>, var: &str, target: &mut T) -> ConfigResult<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(var) else {
        return Ok(());
    };
    *target = raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: var.to_string(),
        reason: format!("cannot parse '{}': {}", raw.trim(), e),
    })?;
    Ok(())
}
