//! Transport layer for telemetry delivery
//!
//! This module provides the transport abstraction and its MQTT
//! implementation.

use crate::config::QosLevel;
use bytes::Bytes;

pub mod mqtt;

pub use mqtt::ConnectionState;

/// What the transport did with an accepted publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Handed to the broker connection
    Sent,
    /// Held in the offline queue until the connection is back
    Queued,
}

/// Transport trait for telemetry delivery
///
/// This trait provides an abstraction over the broker connection so the
/// publisher and agent loop can be exercised without a network.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect to the broker, returning once the session is confirmed
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Disconnect from the broker
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Publish a payload to `topic`
    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: QosLevel,
    ) -> Result<PublishOutcome, Self::Error>;

    /// Check if transport is currently connected
    fn is_connected(&self) -> bool;

    /// Get current connection state, None before the first connect
    fn connection_state(&self) -> Option<ConnectionState>;
}
