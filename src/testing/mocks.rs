//! Mock implementations for testing
//!
//! Provides a mock Transport, scripted sensor drivers and a fixed clock so
//! the agent can be exercised without a broker or Raspberry Pi hardware.

use crate::config::QosLevel;
use crate::error::AgentError;
use crate::payload::Clock;
use crate::sensor::{
    DemoSensorSource, HumidityReading, HumidityTemperatureSensor, LightSensor, SensorError,
    SensorReading, SensorSource,
};
use crate::shutdown::ShutdownRx;
use crate::transport::{ConnectionState, PublishOutcome, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A message recorded by [`MockTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QosLevel,
}

impl PublishedMessage {
    /// Payload decoded as UTF-8 (lossy)
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Mock transport for testing
///
/// While connected, publishes are recorded in `published_messages`; before
/// connecting (or after disconnecting) they land in `queued_messages` the
/// way the MQTT client queues offline messages.
#[derive(Debug, Default)]
pub struct MockTransport {
    pub published_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    pub queued_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    pub should_fail: bool,
    /// 1-based publish call numbers that fail
    pub failing_calls: Vec<usize>,
    publish_calls: Arc<AtomicUsize>,
    connected: bool,
    ever_connected: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation fails
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// Fail only the listed publish calls (1-based)
    pub fn failing_publish_calls(mut self, calls: &[usize]) -> Self {
        self.failing_calls = calls.to_vec();
        self
    }

    pub async fn get_published_messages(&self) -> Vec<PublishedMessage> {
        self.published_messages.lock().await.clone()
    }

    pub async fn get_queued_messages(&self) -> Vec<PublishedMessage> {
        self.queued_messages.lock().await.clone()
    }

    /// Number of publish attempts, including failed ones
    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    pub async fn clear_history(&self) {
        self.published_messages.lock().await.clear();
        self.queued_messages.lock().await.clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = AgentError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        if self.should_fail {
            return Err(AgentError::connection("Mock connection failure"));
        }
        self.connected = true;
        self.ever_connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.connected = false;
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: QosLevel,
    ) -> Result<PublishOutcome, Self::Error> {
        let call = self.publish_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.should_fail || self.failing_calls.contains(&call) {
            return Err(AgentError::connection("Mock publish failure"));
        }

        let message = PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
        };
        if self.connected {
            self.published_messages.lock().await.push(message);
            Ok(PublishOutcome::Sent)
        } else {
            self.queued_messages.lock().await.push(message);
            Ok(PublishOutcome::Queued)
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        if self.connected {
            Some(ConnectionState::Connected)
        } else if self.ever_connected {
            Some(ConnectionState::Disconnected("Client disconnected".to_string()))
        } else {
            None
        }
    }
}

/// Light sensor that always reports the same value
#[derive(Debug, Clone, Copy)]
pub struct FixedLightSensor {
    lux: f64,
}

impl FixedLightSensor {
    pub fn new(lux: f64) -> Self {
        Self { lux }
    }
}

impl LightSensor for FixedLightSensor {
    fn read_lux(&mut self) -> Result<f64, SensorError> {
        Ok(self.lux)
    }
}

/// Light sensor whose bus transaction always fails
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingLightSensor;

impl LightSensor for FailingLightSensor {
    fn read_lux(&mut self) -> Result<f64, SensorError> {
        Err(SensorError::Bus("mock I2C read failed".to_string()))
    }
}

/// Humidity sensor replaying a fixed script; invalid once exhausted
#[derive(Debug, Clone)]
pub struct ScriptedHumiditySensor {
    script: VecDeque<HumidityReading>,
    reads: usize,
}

impl ScriptedHumiditySensor {
    pub fn new(script: Vec<HumidityReading>) -> Self {
        Self {
            script: script.into(),
            reads: 0,
        }
    }

    /// Number of reads performed so far
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl HumidityTemperatureSensor for ScriptedHumiditySensor {
    fn read(&mut self) -> HumidityReading {
        self.reads += 1;
        self.script
            .pop_front()
            .unwrap_or_else(HumidityReading::invalid)
    }
}

/// Sensor source replaying scripted results, then the demo reading
#[derive(Debug, Default)]
pub struct ScriptedSensorSource {
    script: VecDeque<Result<SensorReading, SensorError>>,
}

impl ScriptedSensorSource {
    pub fn new(script: Vec<Result<SensorReading, SensorError>>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

#[async_trait]
impl SensorSource for ScriptedSensorSource {
    async fn acquire(&mut self, _shutdown: &ShutdownRx) -> Result<SensorReading, SensorError> {
        self.script
            .pop_front()
            .unwrap_or(Ok(DemoSensorSource::READING))
    }

    fn is_demo(&self) -> bool {
        false
    }
}

/// Clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
