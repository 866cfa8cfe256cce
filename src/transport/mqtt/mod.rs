//! MQTT client implementation for telemetry publishing
//!
//! The client separates pure functions from I/O operations for better
//! testability.
//!
//! # Architecture
//!
//! - [`connection`] - Pure connection state, backoff and option construction
//! - [`health_monitor`] - Pure reconnection and publish routing decisions
//! - [`message_handler`] - Pure event routing
//! - [`offline_queue`] - Messages held while the broker is unreachable
//! - [`client`] - Impure I/O operations and coordination
//!
//! # Usage
//!
//! ```rust,no_run
//! use telemetry_agent::config::{AgentConfig, QosLevel};
//! use telemetry_agent::transport::mqtt::MqttClient;
//!
//! # async fn example(config: AgentConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = MqttClient::new(config.mqtt_client_id(), &config.mqtt, &config.credential_paths())?;
//! client.connect().await?;
//! client
//!     .publish_message(&config.mqtt.topic, "{}".into(), QosLevel::AtMostOnce)
//!     .await?;
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;
pub mod offline_queue;

pub use client::MqttClient;
pub use connection::{ConnectionState, MqttError, ReconnectConfig};
pub use health_monitor::{ConnectionEvent, HealthMonitor, PublishRoute, ReconnectionDecision};
pub use message_handler::{EventRoute, MessageHandler};
pub use offline_queue::{OfflineQueue, QueuedMessage};
