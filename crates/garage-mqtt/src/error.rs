//! Error types for the bus bridge

use thiserror::Error;

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Errors that can occur while talking to the broker
#[derive(Debug, Error)]
pub enum BusError {
    /// The MQTT client rejected the request (request queue closed or full)
    #[error("MQTT client request failed: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// Discovery document could not be encoded
    #[error("failed to serialize discovery document: {0}")]
    Serialize(#[from] serde_json::Error),
}
