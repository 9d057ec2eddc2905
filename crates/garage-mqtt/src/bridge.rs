//! Bus bridge
//!
//! Glue between the broker and the [`DoorController`]: publishes discovery,
//! availability, door state and close mode, and applies inbound commands
//! through the same controller calls the HTTP handlers use.

use async_trait::async_trait;
use garage_core::{ControllerEvent, DoorController, DoorState, ToggleError, ToggleOutcome, ToggleSource};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::command::{BusCommand, BusEvent};
use crate::discovery::{CoverDiscovery, SwitchDiscovery};
use crate::error::BusResult;
use crate::topics::Topics;
use crate::{PAYLOAD_OFF, PAYLOAD_OFFLINE, PAYLOAD_ON, PAYLOAD_ONLINE};

/// Outbound side of the bus
///
/// Every publish and subscription uses at-least-once delivery.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: String, retained: bool) -> BusResult<()>;

    async fn subscribe(&self, topic: &str) -> BusResult<()>;

    async fn disconnect(&self) -> BusResult<()>;
}

/// Mirrors the controller onto the bus and routes bus commands into it
pub struct BusBridge {
    controller: Arc<DoorController>,
    publisher: Arc<dyn Publisher>,
    topics: Topics,
    node_id: String,
}

impl BusBridge {
    pub fn new(
        controller: Arc<DoorController>,
        publisher: Arc<dyn Publisher>,
        topics: Topics,
        node_id: impl Into<String>,
    ) -> Self {
        Self {
            controller,
            publisher,
            topics,
            node_id: node_id.into(),
        }
    }

    /// Run after every (re)connection
    ///
    /// Discovery first, then subscriptions, then availability, so the hub
    /// never sees the entity online before its commands are being listened
    /// for. State is republished unconditionally so a broker that lost its
    /// retained values gets fresh ones.
    pub async fn on_connected(&self) -> BusResult<()> {
        self.publish_discovery().await?;
        self.publisher.subscribe(&self.topics.cover_command).await?;
        self.publisher.subscribe(&self.topics.close_mode_command).await?;
        self.publish_availability(true).await?;
        self.publish_state(true).await?;
        let close_mode = self.controller.close_mode().await;
        self.publish_close_mode(close_mode).await?;
        info!(node_id = %self.node_id, "Bus session initialised");
        Ok(())
    }

    async fn publish_discovery(&self) -> BusResult<()> {
        let cover = serde_json::to_string(&CoverDiscovery::new(&self.topics, &self.node_id))?;
        let switch = serde_json::to_string(&SwitchDiscovery::new(&self.topics, &self.node_id))?;
        self.publisher
            .publish(&self.topics.cover_config, cover, true)
            .await?;
        self.publisher
            .publish(&self.topics.switch_config, switch, true)
            .await
    }

    pub async fn publish_availability(&self, online: bool) -> BusResult<()> {
        let payload = if online { PAYLOAD_ONLINE } else { PAYLOAD_OFFLINE };
        self.publisher
            .publish(&self.topics.availability, payload.to_string(), true)
            .await
    }

    /// Publish the door state if it changed since the last publish
    ///
    /// Returns the state that was published, if any.
    pub async fn publish_state(&self, force: bool) -> BusResult<Option<DoorState>> {
        let Some(state) = self.controller.observe_state(force).await else {
            return Ok(None);
        };
        debug!(%state, force, "Publishing door state");
        self.publisher
            .publish(&self.topics.cover_state, state.as_payload().to_string(), true)
            .await?;
        Ok(Some(state))
    }

    pub async fn publish_close_mode(&self, enabled: bool) -> BusResult<()> {
        let payload = if enabled { PAYLOAD_ON } else { PAYLOAD_OFF };
        self.publisher
            .publish(&self.topics.close_mode_state, payload.to_string(), true)
            .await
    }

    /// Apply one transport event
    pub async fn handle_event(&self, event: BusEvent) {
        match event {
            BusEvent::Connected => {
                if let Err(e) = self.on_connected().await {
                    error!("MQTT connect handling failed: {}", e);
                }
            }
            BusEvent::Message { topic, payload } => {
                match BusCommand::parse(&self.topics, &topic, &payload) {
                    Some(command) => self.apply(command).await,
                    None => debug!(%topic, %payload, "Ignoring unrecognised bus message"),
                }
            }
        }
    }

    /// Apply a decoded command through the controller
    pub async fn apply(&self, command: BusCommand) {
        match command {
            BusCommand::Toggle(cover) => {
                match self.controller.request_toggle(ToggleSource::Cover(cover)).await {
                    Ok(ToggleOutcome::Pulsed) => debug!(?cover, "Cover command pulsed trigger"),
                    Ok(ToggleOutcome::Suppressed) => {
                        debug!(?cover, "Cover command inside toggle gap")
                    }
                    Err(ToggleError::CloseModeActive) => {
                        info!(?cover, "Ignoring cover command, close mode is enabled")
                    }
                    Err(e) => error!(?cover, "Cover command failed: {}", e),
                }
            }
            BusCommand::SetCloseMode(enabled) => {
                self.controller.set_close_mode(enabled).await;
            }
        }
    }

    /// Consume transport events until the channel closes
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<BusEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        debug!("Bus event channel closed");
    }

    /// Republish close mode whenever the controller reports a change
    pub fn spawn_close_mode_mirror(self: Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.controller.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ControllerEvent::CloseModeChanged(enabled)) => {
                        if let Err(e) = self.publish_close_mode(enabled).await {
                            warn!("Failed to publish close mode: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Close mode mirror lagged by {} events", n);
                        let enabled = self.controller.close_mode().await;
                        if let Err(e) = self.publish_close_mode(enabled).await {
                            warn!("Failed to publish close mode: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Best-effort offline announcement and disconnect
    ///
    /// Errors are logged and swallowed.
    pub async fn shutdown(&self) {
        if let Err(e) = self.publish_availability(false).await {
            debug!("Offline publish failed during shutdown: {}", e);
        }
        if let Err(e) = self.publisher.disconnect().await {
            debug!("Disconnect failed during shutdown: {}", e);
        }
    }
}
