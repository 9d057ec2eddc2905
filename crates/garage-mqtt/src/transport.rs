//! rumqttc transport
//!
//! [`connect`] splits the broker connection in two: [`MqttTransport`] is the
//! [`Publisher`] handed to the bridge, [`MqttEventLoop`] drives the socket
//! and forwards what it sees as [`BusEvent`]s. The two halves run on
//! separate tasks so a slow handler never stalls the network loop.

use async_trait::async_trait;
use garage_config::MqttConfig;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bridge::Publisher;
use crate::command::BusEvent;
use crate::error::BusResult;
use crate::topics::Topics;
use crate::PAYLOAD_OFFLINE;

/// Capacity of the client request queue and the event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Publishing half of the broker connection
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
}

#[async_trait]
impl Publisher for MqttTransport {
    async fn publish(&self, topic: &str, payload: String, retained: bool) -> BusResult<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, retained, payload)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> BusResult<()> {
        self.client.subscribe(topic, QoS::AtLeastOnce).await?;
        Ok(())
    }

    async fn disconnect(&self) -> BusResult<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}

/// Socket-driving half of the broker connection
pub struct MqttEventLoop {
    inner: EventLoop,
}

/// Build both halves for `config`
///
/// Nothing touches the network until [`MqttEventLoop::run`] is polled. The
/// broker is told to publish `offline` on the availability topic if the
/// connection drops without a clean disconnect.
pub fn connect(config: &MqttConfig, topics: &Topics) -> (MqttTransport, MqttEventLoop) {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(KEEP_ALIVE);
    options.set_clean_session(true);
    if let Some((user, password)) = config.credentials() {
        options.set_credentials(user, password);
    }
    options.set_last_will(LastWill::new(
        &topics.availability,
        PAYLOAD_OFFLINE,
        QoS::AtLeastOnce,
        true,
    ));

    let (client, inner) = AsyncClient::new(options, EVENT_CHANNEL_CAPACITY);
    (MqttTransport { client }, MqttEventLoop { inner })
}

impl MqttEventLoop {
    /// Poll the connection until a disconnect goes out or `events` closes
    ///
    /// Connection errors are logged and retried after a fixed delay; the
    /// client reconnects on the next poll.
    pub async fn run(mut self, events: mpsc::Sender<BusEvent>) {
        loop {
            let forwarded = match self.inner.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        info!("Connected to MQTT broker");
                        events.send(BusEvent::Connected).await
                    } else {
                        warn!("MQTT broker refused connection: {:?}", ack.code);
                        Ok(())
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let payload = String::from_utf8_lossy(&publish.payload).trim().to_string();
                    debug!(topic = %publish.topic, %payload, "MQTT message received");
                    events
                        .send(BusEvent::Message {
                            topic: publish.topic,
                            payload,
                        })
                        .await
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("MQTT disconnect sent");
                    return;
                }
                Ok(_) => Ok(()),
                Err(e) => {
                    warn!(
                        "MQTT connection error: {}, retrying in {:?}",
                        e, RECONNECT_DELAY
                    );
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    Ok(())
                }
            };

            if forwarded.is_err() {
                debug!("Bus event receiver dropped, stopping MQTT loop");
                return;
            }
        }
    }
}
