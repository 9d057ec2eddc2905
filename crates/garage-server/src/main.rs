//! GaragePi server
//!
//! Main entry point: wires configuration, GPIO, the door controller, the
//! background loops, the MQTT bridge and the HTTP API together, and tears
//! them down again on SIGINT/SIGTERM.

mod tasks;

use anyhow::{Context, Result};
use garage_api::AppState;
use garage_config::{GarageConfig, GpioBackend};
use garage_core::{DoorController, DoorPins, Gpio, SimulatedGpio};
use garage_mqtt::{BusBridge, Topics, EVENT_CHANNEL_CAPACITY};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long shutdown waits for the MQTT loop to flush `offline`
const BUS_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// The running controller and everything attached to it
pub struct GaragePi {
    controller: Arc<DoorController>,
    bridge: Option<Arc<BusBridge>>,
    bus_loop: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: broadcast::Sender<()>,
    stopped: AtomicBool,
}

impl GaragePi {
    /// Build the controller and start the background work
    pub fn start(config: &GarageConfig) -> Result<Self> {
        let timing = config.door.timing()?;
        let gpio = open_gpio(config.gpio_backend, &config.pins)?;
        info!(backend = gpio.name(), "GPIO ready");

        let controller = Arc::new(DoorController::new(gpio, config.pins, timing));
        let (shutdown_tx, _) = broadcast::channel(1);

        tasks::spawn_enforcement_loop(
            controller.clone(),
            config.door.enforce_interval()?,
            shutdown_tx.subscribe(),
        );

        let mut bridge = None;
        let mut bus_loop = None;
        if config.mqtt.is_enabled() {
            let topics = Topics::from_config(&config.mqtt);
            let (transport, event_loop) = garage_mqtt::connect(&config.mqtt, &topics);
            let bus = Arc::new(BusBridge::new(
                controller.clone(),
                Arc::new(transport),
                topics,
                config.mqtt.node_id.clone(),
            ));

            tasks::spawn_state_publish_loop(
                bus.clone(),
                config.door.publish_interval()?,
                shutdown_tx.subscribe(),
            );

            let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            bus_loop = Some(tokio::spawn(event_loop.run(events_tx)));
            tokio::spawn(bus.clone().run(events_rx));
            bus.clone().spawn_close_mode_mirror();

            info!(
                host = %config.mqtt.host,
                port = config.mqtt.port,
                "MQTT bridge started"
            );
            bridge = Some(bus);
        } else {
            info!("MQTT disabled, HTTP control only");
        }

        Ok(Self {
            controller,
            bridge,
            bus_loop: Mutex::new(bus_loop),
            shutdown_tx,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn controller(&self) -> Arc<DoorController> {
        self.controller.clone()
    }

    /// Stop loops, announce offline and release the GPIO lines
    ///
    /// Every step is best-effort. Calls after the first do nothing.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down");

        let _ = self.shutdown_tx.send(());

        if let Some(bridge) = &self.bridge {
            if tokio::time::timeout(BUS_SHUTDOWN_TIMEOUT, bridge.shutdown())
                .await
                .is_err()
            {
                warn!("Timed out announcing offline");
            }

            let handle = self.bus_loop.lock().ok().and_then(|mut slot| slot.take());
            if let Some(mut handle) = handle {
                if tokio::time::timeout(BUS_SHUTDOWN_TIMEOUT, &mut handle)
                    .await
                    .is_err()
                {
                    warn!("MQTT loop did not stop in time");
                    handle.abort();
                }
            }
        }

        self.controller.release();
        info!("GPIO released");
    }
}

/// Pick the GPIO backend
///
/// `auto` prefers hardware and falls back to the simulator.
fn open_gpio(backend: GpioBackend, pins: &DoorPins) -> Result<Arc<dyn Gpio>> {
    match backend {
        GpioBackend::Sim => Ok(Arc::new(SimulatedGpio::new())),
        GpioBackend::Rpi => open_hardware(pins),
        GpioBackend::Auto => match open_hardware(pins) {
            Ok(gpio) => Ok(gpio),
            Err(e) => {
                warn!("Hardware GPIO unavailable ({:#}), using simulator", e);
                Ok(Arc::new(SimulatedGpio::new()))
            }
        },
    }
}

#[cfg(feature = "rpi")]
fn open_hardware(pins: &DoorPins) -> Result<Arc<dyn Gpio>> {
    let gpio = garage_core::gpio::RpiGpio::new(&[pins.trigger], &[pins.sensor_open, pins.sensor_closed])
        .context("failed to open Raspberry Pi GPIO")?;
    Ok(Arc::new(gpio))
}

#[cfg(not(feature = "rpi"))]
fn open_hardware(_pins: &DoorPins) -> Result<Arc<dyn Gpio>> {
    anyhow::bail!("built without the `rpi` feature")
}

fn init_tracing() -> Result<()> {
    let default_directive = std::env::var("LOG_LEVEL")
        .ok()
        .filter(|level| !level.trim().is_empty())
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&default_directive))
        .context("invalid log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = GarageConfig::load().context("failed to load configuration")?;
    init_tracing()?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting GaragePi");

    let garage = GaragePi::start(&config)?;
    let state = AppState::new(garage.controller(), config.api.token())
        .context("failed to load status page template")?;

    let served = garage_api::start_server(state, &config.api.bind_address(), shutdown_signal()).await;

    garage.shutdown().await;
    served.context("HTTP server failed")?;

    info!("GaragePi stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim_config() -> GarageConfig {
        let mut config = GarageConfig::default();
        config.gpio_backend = GpioBackend::Sim;
        config.mqtt.host = String::new();
        config
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let garage = GaragePi::start(&sim_config()).unwrap();

        garage.shutdown().await;
        garage.shutdown().await;

        assert!(garage.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_auto_backend_falls_back_to_simulator() {
        let gpio = open_gpio(GpioBackend::Sim, &DoorPins::default()).unwrap();
        assert_eq!(gpio.name(), "simulated");

        #[cfg(not(feature = "rpi"))]
        {
            let gpio = open_gpio(GpioBackend::Auto, &DoorPins::default()).unwrap();
            assert_eq!(gpio.name(), "simulated");
            assert!(open_gpio(GpioBackend::Rpi, &DoorPins::default()).is_err());
        }
    }
}
