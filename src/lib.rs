//! Telemetry Agent
//!
//! Periodically reads ambient light, temperature and humidity from sensors
//! attached to a Raspberry Pi and publishes each reading as JSON to an MQTT
//! broker over mutually authenticated TLS.
//!
//! # Overview
//!
//! - [`sensor`] - demo and live sensor sources with the "retry until valid" policy
//! - [`payload`] - the outbound JSON document with fixed UTC+9 timestamps
//! - [`publisher`] - best-effort publishing on top of a [`transport::Transport`]
//! - [`agent`] - the acquire → build → publish loop
//! - [`transport`] - MQTT v5 client with reconnect backoff and offline queue
//!
//! # Quick Start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use telemetry_agent::payload::PayloadBuilder;
//! use telemetry_agent::sensor::DemoSensorSource;
//!
//! let builder = PayloadBuilder::new("device_001");
//! let now = Utc.with_ymd_and_hms(2023, 12, 31, 15, 0, 0).unwrap();
//! let payload = builder.build(&DemoSensorSource::READING, now);
//!
//! assert_eq!(payload.lux, 123);
//! assert_eq!(payload.verbose_timestamp, "2024-01-01 00:00:00.000+0900");
//! let json = payload.to_json().unwrap();
//! assert!(json.starts_with(b"{\"id\":\"device_001\""));
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod observability;
pub mod payload;
pub mod publisher;
pub mod sensor;
pub mod shutdown;
pub mod testing;
pub mod transport;

pub use agent::{AgentLoop, AgentState, CycleOutcome};
pub use config::{AgentConfig, ConfigError, QosLevel};
pub use error::{AgentError, AgentResult};
pub use payload::{Payload, PayloadBuilder};
pub use publisher::Publisher;
pub use sensor::{DemoSensorSource, SensorReading, SensorSource};
pub use transport::mqtt::MqttClient;
