//! Configuration system for the telemetry agent
//!
//! Configuration is read once at startup from a TOML file and never mutated
//! afterwards. Every optional field falls back to the values a stock
//! Raspberry Pi deployment uses.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides the configuration file location
pub const CONFIG_PATH_ENV: &str = "TELEMETRY_AGENT_CONFIG";

/// Locations searched when no override is given
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["telemetry.toml", "config/telemetry.toml"];

/// Main agent configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub device: DeviceSection,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub sensors: SensorsSection,
    #[serde(default)]
    pub publish: PublishSection,
}

/// Device identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Device identifier placed in every payload (must match [a-zA-Z0-9._-]+)
    pub id: String,
    /// Cloud-side thing name, the stem of the credential file names
    pub thing_name: String,
}

/// MQTT section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker host name
    pub endpoint: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default)]
    pub qos: QosLevel,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    #[serde(default)]
    pub credentials: CredentialsSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
    #[serde(default)]
    pub queue: QueueSection,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
}

fn default_port() -> u16 {
    8883
}

fn default_topic() -> String {
    "iot/device/sensordata".to_string()
}

fn default_keep_alive() -> u64 {
    600
}

/// MQTT quality of service level, encoded as 0, 1 or 2 in TOML
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QosLevel {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QosLevel {
    type Error = ConfigError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(QosLevel::AtMostOnce),
            1 => Ok(QosLevel::AtLeastOnce),
            2 => Ok(QosLevel::ExactlyOnce),
            other => Err(ConfigError::InvalidConfig(format!(
                "QoS must be 0, 1 or 2, got {other}"
            ))),
        }
    }
}

impl From<QosLevel> for u8 {
    fn from(qos: QosLevel) -> Self {
        match qos {
            QosLevel::AtMostOnce => 0,
            QosLevel::AtLeastOnce => 1,
            QosLevel::ExactlyOnce => 2,
        }
    }
}

/// Certificate material used for TLS mutual authentication.
///
/// Explicit paths win; anything left unset is derived from `certs_dir` and the
/// thing name (`<thing>.root-CA.pem`, `<thing>.private.key`, `<thing>.cert.pem`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialsSection {
    #[serde(default = "default_certs_dir")]
    pub certs_dir: PathBuf,
    pub root_ca: Option<PathBuf>,
    pub private_key: Option<PathBuf>,
    pub certificate: Option<PathBuf>,
}

fn default_certs_dir() -> PathBuf {
    PathBuf::from("/home/pi")
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            certs_dir: default_certs_dir(),
            root_ca: None,
            private_key: None,
            certificate: None,
        }
    }
}

/// Fully resolved credential file locations
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialPaths {
    pub root_ca: PathBuf,
    pub private_key: PathBuf,
    pub certificate: PathBuf,
}

impl CredentialsSection {
    /// Resolve credential paths for the given thing name
    pub fn resolve(&self, thing_name: &str) -> CredentialPaths {
        let derived = |suffix: &str| self.certs_dir.join(format!("{thing_name}{suffix}"));
        CredentialPaths {
            root_ca: self
                .root_ca
                .clone()
                .unwrap_or_else(|| derived(".root-CA.pem")),
            private_key: self
                .private_key
                .clone()
                .unwrap_or_else(|| derived(".private.key")),
            certificate: self
                .certificate
                .clone()
                .unwrap_or_else(|| derived(".cert.pem")),
        }
    }
}

/// Automatic reconnect backoff
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
    /// Uptime after which a connection counts as stable and backoff resets
    #[serde(default = "default_stable_connection")]
    pub stable_connection_secs: u64,
}

fn default_base_delay() -> u64 {
    1
}

fn default_max_delay() -> u64 {
    32
}

fn default_stable_connection() -> u64 {
    20
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
            stable_connection_secs: default_stable_connection(),
        }
    }
}

/// Offline publish queueing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueSection {
    /// Maximum queued messages while offline (None = unbounded)
    pub offline_limit: Option<usize>,
    /// Queued messages flushed per second once the connection is back
    #[serde(default = "default_drain_frequency")]
    pub drain_frequency_hz: f64,
}

/// Accepted range for `drain_frequency_hz`
const DRAIN_FREQUENCY_RANGE: std::ops::RangeInclusive<f64> = 0.001..=1000.0;

fn default_drain_frequency() -> f64 {
    2.0
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            offline_limit: None,
            drain_frequency_hz: default_drain_frequency(),
        }
    }
}

impl QueueSection {
    /// Delay between two drained messages
    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.drain_frequency_hz)
    }
}

/// Transport timeouts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutsSection {
    #[serde(default = "default_connect_disconnect_timeout")]
    pub connect_disconnect_secs: u64,
    #[serde(default = "default_operation_timeout")]
    pub operation_secs: u64,
}

fn default_connect_disconnect_timeout() -> u64 {
    10
}

fn default_operation_timeout() -> u64 {
    5
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            connect_disconnect_secs: default_connect_disconnect_timeout(),
            operation_secs: default_operation_timeout(),
        }
    }
}

/// Sensor bus addressing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorsSection {
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,
    #[serde(default = "default_tsl2561_address")]
    pub tsl2561_address: u16,
    /// BCM pin number of the DHT11 data line
    #[serde(default = "default_dht11_pin")]
    pub dht11_gpio_pin: u8,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_i2c_bus() -> u8 {
    1
}

fn default_tsl2561_address() -> u16 {
    crate::sensor::tsl2561::DEFAULT_ADDRESS
}

fn default_dht11_pin() -> u8 {
    14
}

fn default_retry_delay() -> u64 {
    1000
}

impl Default for SensorsSection {
    fn default() -> Self {
        Self {
            i2c_bus: default_i2c_bus(),
            tsl2561_address: default_tsl2561_address(),
            dht11_gpio_pin: default_dht11_pin(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

/// Publish cadence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishSection {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_interval() -> u64 {
    60
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid device ID format: {0}")]
    InvalidDeviceId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Credential file {path} unreadable: {source}")]
    CredentialRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("No configuration file found (set TELEMETRY_AGENT_CONFIG or create telemetry.toml)")]
    NotFound,
}

impl AgentConfig {
    /// Load configuration from TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Locate the configuration file: env override first, then default paths
    pub fn discover() -> Result<PathBuf, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
            .ok_or(ConfigError::NotFound)
    }

    /// Check cross-field invariants that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_device_id(&self.device.id)?;

        if self.device.thing_name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "device.thing_name must not be empty".to_string(),
            ));
        }

        url::Host::parse(&self.mqtt.endpoint).map_err(|_| {
            ConfigError::InvalidConfig(format!(
                "mqtt.endpoint '{}' is not a valid host name",
                self.mqtt.endpoint
            ))
        })?;

        validate_topic(&self.mqtt.topic)?;

        if self.mqtt.reconnect.base_delay_secs == 0
            || self.mqtt.reconnect.base_delay_secs > self.mqtt.reconnect.max_delay_secs
        {
            return Err(ConfigError::InvalidConfig(
                "mqtt.reconnect requires 0 < base_delay_secs <= max_delay_secs".to_string(),
            ));
        }

        let drain_hz = self.mqtt.queue.drain_frequency_hz;
        if !drain_hz.is_finite() || !DRAIN_FREQUENCY_RANGE.contains(&drain_hz) {
            return Err(ConfigError::InvalidConfig(format!(
                "mqtt.queue.drain_frequency_hz must be between {} and {}, got {drain_hz}",
                DRAIN_FREQUENCY_RANGE.start(),
                DRAIN_FREQUENCY_RANGE.end()
            )));
        }

        if self.mqtt.timeouts.connect_disconnect_secs == 0 || self.mqtt.timeouts.operation_secs == 0
        {
            return Err(ConfigError::InvalidConfig(
                "mqtt.timeouts must be greater than 0".to_string(),
            ));
        }

        if self.publish.interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "publish.interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// MQTT client id: the device id, not the thing name
    pub fn mqtt_client_id(&self) -> &str {
        &self.device.id
    }

    /// Credential file locations for this device
    pub fn credential_paths(&self) -> CredentialPaths {
        self.mqtt.credentials.resolve(&self.device.thing_name)
    }

    /// Interval between publish cycles
    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish.interval_secs)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
id = "device_001"
thing_name = "test-thing"

[mqtt]
endpoint = "example-ats.iot.ap-northeast-1.amazonaws.com"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Validate device ID format
fn validate_device_id(device_id: &str) -> Result<(), ConfigError> {
    let valid_chars = device_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if device_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidDeviceId(format!(
            "Device ID '{device_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}

/// Publish topics must be concrete: no wildcards, no empty string
fn validate_topic(topic: &str) -> Result<(), ConfigError> {
    if topic.is_empty() || topic.contains(['+', '#']) {
        return Err(ConfigError::InvalidConfig(format!(
            "mqtt.topic '{topic}' must be non-empty and contain no wildcards"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[device]
id = "device_001"
thing_name = "living-room"

[mqtt]
endpoint = "example-ats.iot.ap-northeast-1.amazonaws.com"
port = 443
topic = "iot/device/sensordata"
qos = 1
keep_alive_secs = 30

[mqtt.credentials]
certs_dir = "/etc/telemetry"
root_ca = "/etc/ssl/AmazonRootCA1.pem"

[mqtt.reconnect]
base_delay_secs = 2
max_delay_secs = 64
stable_connection_secs = 30

[mqtt.queue]
offline_limit = 100
drain_frequency_hz = 5.0

[mqtt.timeouts]
connect_disconnect_secs = 15
operation_secs = 3

[sensors]
i2c_bus = 0
tsl2561_address = 0x29
dht11_gpio_pin = 4
retry_delay_ms = 500

[publish]
interval_secs = 10
"#;

        let config = AgentConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.device.id, "device_001");
        assert_eq!(config.mqtt.port, 443);
        assert_eq!(config.mqtt.qos, QosLevel::AtLeastOnce);
        assert_eq!(config.mqtt.reconnect.max_delay_secs, 64);
        assert_eq!(config.mqtt.queue.offline_limit, Some(100));
        assert_eq!(config.sensors.tsl2561_address, 0x29);
        assert_eq!(config.publish_interval(), Duration::from_secs(10));

        let paths = config.credential_paths();
        assert_eq!(paths.root_ca, PathBuf::from("/etc/ssl/AmazonRootCA1.pem"));
        assert_eq!(
            paths.private_key,
            PathBuf::from("/etc/telemetry/living-room.private.key")
        );
        assert_eq!(
            paths.certificate,
            PathBuf::from("/etc/telemetry/living-room.cert.pem")
        );
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = AgentConfig::test_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.topic, "iot/device/sensordata");
        assert_eq!(config.mqtt.qos, QosLevel::AtMostOnce);
        assert_eq!(config.mqtt.reconnect, ReconnectSection::default());
        assert_eq!(config.mqtt.queue.offline_limit, None);
        assert_eq!(config.mqtt.timeouts.connect_disconnect_secs, 10);
        assert_eq!(config.mqtt.timeouts.operation_secs, 5);
        assert_eq!(config.sensors.dht11_gpio_pin, 14);
        assert_eq!(config.sensors.i2c_bus, 1);
        assert_eq!(config.publish.interval_secs, 60);

        let paths = config.credential_paths();
        assert_eq!(
            paths.root_ca,
            PathBuf::from("/home/pi/test-thing.root-CA.pem")
        );
    }

    #[test]
    fn test_invalid_qos_rejected() {
        let toml_content = r#"
[device]
id = "device_001"
thing_name = "thing"

[mqtt]
endpoint = "broker.local"
qos = 3
"#;
        assert!(matches!(
            AgentConfig::from_toml_str(toml_content),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn test_client_id_is_device_id() {
        let config = AgentConfig::test_config();
        assert_eq!(config.mqtt_client_id(), "device_001");
        assert!(config
            .credential_paths()
            .root_ca
            .to_string_lossy()
            .contains("test-thing"));
    }

    #[test]
    fn test_invalid_device_id() {
        assert!(validate_device_id("device 001").is_err());
        assert!(validate_device_id("").is_err());
        assert!(validate_device_id("device_001.kitchen-2").is_ok());
    }

    #[test]
    fn test_wildcard_topic_rejected() {
        assert!(validate_topic("iot/+/sensordata").is_err());
        assert!(validate_topic("iot/#").is_err());
        assert!(validate_topic("").is_err());
        assert!(validate_topic("iot/device/sensordata").is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = AgentConfig::test_config();
        config.publish.interval_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let mut config = AgentConfig::test_config();
        config.mqtt.endpoint = "bad host name".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_drain_interval() {
        let queue = QueueSection::default();
        assert_eq!(queue.drain_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_drain_frequency_out_of_range_rejected() {
        for hz in [0.0, -2.0, 1e-30, 1e12, f64::INFINITY, f64::NAN] {
            let mut config = AgentConfig::test_config();
            config.mqtt.queue.drain_frequency_hz = hz;
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidConfig(_))),
                "{hz} Hz should be rejected"
            );
        }
    }

    #[test]
    fn test_drain_frequency_bounds_accepted() {
        for hz in [0.001, 1000.0] {
            let mut config = AgentConfig::test_config();
            config.mqtt.queue.drain_frequency_hz = hz;
            assert!(config.validate().is_ok(), "{hz} Hz should be accepted");
            assert!(config.mqtt.queue.drain_interval() > Duration::ZERO);
        }
    }

    #[test]
    fn test_qos_round_trip_through_u8() {
        for level in 0u8..=2 {
            let qos = QosLevel::try_from(level).unwrap();
            assert_eq!(u8::from(qos), level);
        }
        assert!(QosLevel::try_from(7).is_err());
    }
}
