//! Pure connection state management for MQTT client
//!
//! This module contains pure functions for connection state management,
//! backoff calculation and option construction.

use crate::config::{ConfigError, CredentialPaths, MqttSection, ReconnectSection};
use rumqttc::v5::MqttOptions;
use rumqttc::{TlsConfiguration, Transport as RumqttcTransport};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Connection state for MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - attempting to connect
    Connecting,
    /// Successfully connected and ready for operations
    Connected,
    /// Disconnected with reason
    Disconnected(String),
    /// Attempting to reconnect (attempt count)
    Reconnecting(u32),
}

/// Reconnection backoff configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// A connection that stayed up this long resets the backoff
    pub stable_after: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::from(&ReconnectSection::default())
    }
}

impl From<&ReconnectSection> for ReconnectConfig {
    fn from(section: &ReconnectSection) -> Self {
        Self {
            base_delay: Duration::from_secs(section.base_delay_secs),
            max_delay: Duration::from_secs(section.max_delay_secs),
            stable_after: Duration::from_secs(section.stable_connection_secs),
        }
    }
}

impl ReconnectConfig {
    /// Backoff for the given 1-based attempt: `base * 2^(attempt-1)`, capped at `max_delay`
    pub fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Whether a connection that lasted `uptime` counts as stable
    pub fn is_stable(&self, uptime: Duration) -> bool {
        uptime >= self.stable_after
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Publishing failed: {0}")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publish timed out after {0:?}")]
    PublishTimeout(Duration),
    #[error("Offline publish queue full ({limit} messages)")]
    QueueFull { limit: usize },
    #[error("Invalid broker endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Client not connected: connect() not called")]
    NotConnected,
    #[error("Credential error: {0}")]
    Credentials(#[source] ConfigError),
    #[error("Connection failed: {0}")]
    ConnectionFailedStr(String),
}

/// Read one PEM file, keeping the path in the error
pub fn read_credential(path: &Path) -> Result<Vec<u8>, MqttError> {
    std::fs::read(path).map_err(|source| {
        MqttError::Credentials(ConfigError::CredentialRead {
            path: path.to_path_buf(),
            source,
        })
    })
}

/// Build the mutual-TLS transport from the CA, client certificate and key
pub fn configure_tls(credentials: &CredentialPaths) -> Result<RumqttcTransport, MqttError> {
    let ca = read_credential(&credentials.root_ca)?;
    let certificate = read_credential(&credentials.certificate)?;
    let private_key = read_credential(&credentials.private_key)?;

    Ok(RumqttcTransport::tls_with_config(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth: Some((certificate, private_key)),
    }))
}

/// Pure function to configure MQTT options (without transport) from config
pub fn base_mqtt_options(client_id: &str, config: &MqttSection) -> Result<MqttOptions, MqttError> {
    url::Host::parse(&config.endpoint)
        .map_err(|_| MqttError::InvalidEndpoint(config.endpoint.clone()))?;

    let mut mqtt_options = MqttOptions::new(client_id, config.endpoint.clone(), config.port);
    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    mqtt_options.set_clean_start(true);
    Ok(mqtt_options)
}

/// Configure MQTT options including the TLS transport.
///
/// Credential files are read here so a missing file fails before any
/// network activity.
pub fn configure_mqtt_options(
    client_id: &str,
    config: &MqttSection,
    credentials: &CredentialPaths,
) -> Result<MqttOptions, MqttError> {
    let mut mqtt_options = base_mqtt_options(client_id, config)?;
    mqtt_options.set_transport(configure_tls(credentials)?);
    Ok(mqtt_options)
}
