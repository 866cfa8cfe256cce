//! Periodic acquire → build → publish loop
//!
//! The loop owns its sensor source, payload builder and publisher. It moves
//! from `Disconnected` to `Connected` once at startup and stays there;
//! reconnection is the transport's business.

use crate::config::{AgentConfig, QosLevel};
use crate::error::{AgentError, AgentResult};
use crate::payload::{Clock, PayloadBuilder, SystemClock};
use crate::publisher::Publisher;
use crate::sensor::{SensorError, SensorSource};
use crate::shutdown::{interruptible_sleep, is_shutdown_requested, ShutdownRx};
use crate::transport::Transport;
use crate::{cycle_span, lifecycle_span};
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

/// Connection state as seen by the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Disconnected,
    Connected,
}

/// Result of a single poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The transport accepted the payload
    Published,
    /// The transport rejected the payload; the next cycle carries on
    PublishFailed,
    /// Sensor bus error, nothing was published this cycle
    Skipped,
    /// Shutdown arrived while waiting for a valid reading
    Cancelled,
}

/// Orchestrates sensor acquisition and publishing on a fixed cadence
pub struct AgentLoop<T: Transport> {
    sensor: Box<dyn SensorSource>,
    builder: PayloadBuilder,
    publisher: Publisher<T>,
    clock: Box<dyn Clock>,
    topic: String,
    qos: QosLevel,
    interval: Duration,
    state: AgentState,
    cycles: u64,
}

impl<T> AgentLoop<T>
where
    T: Transport,
    AgentError: From<T::Error>,
{
    pub fn new(config: &AgentConfig, sensor: Box<dyn SensorSource>, publisher: Publisher<T>) -> Self {
        Self {
            sensor,
            builder: PayloadBuilder::new(config.device.id.clone()),
            publisher,
            clock: Box::new(SystemClock),
            topic: config.mqtt.topic.clone(),
            qos: config.mqtt.qos,
            interval: config.publish_interval(),
            state: AgentState::Disconnected,
            cycles: 0,
        }
    }

    /// Replace the wall clock, used to pin timestamps in tests
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Number of cycles run so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn publisher(&self) -> &Publisher<T> {
        &self.publisher
    }

    /// Connect the publisher. A failure here is fatal for the agent.
    pub async fn start(&mut self) -> AgentResult<()> {
        let span = lifecycle_span!(event = "start", device_id = %self.builder.device_id());
        async {
            info!(
                demo = self.sensor.is_demo(),
                topic = %self.topic,
                interval_secs = self.interval.as_secs(),
                "Starting telemetry agent"
            );
            self.publisher.connect().await?;
            self.state = AgentState::Connected;
            info!("Agent connected, entering publish loop");
            Ok::<(), AgentError>(())
        }
        .instrument(span)
        .await
    }

    /// Acquire one reading and publish it
    pub async fn run_cycle(&mut self, shutdown: &ShutdownRx) -> CycleOutcome {
        self.cycles += 1;
        let span = cycle_span!(cycle = self.cycles);
        async {
            let reading = match self.sensor.acquire(shutdown).await {
                Ok(reading) => reading,
                Err(SensorError::Cancelled) => {
                    info!("Sensor acquisition interrupted by shutdown");
                    return CycleOutcome::Cancelled;
                }
                Err(e) => {
                    warn!(error = %e, "Sensor read failed, skipping cycle");
                    return CycleOutcome::Skipped;
                }
            };

            let payload = self.builder.build(&reading, self.clock.now());
            if let Ok(pretty) = payload.to_pretty_json() {
                debug!(payload = %pretty, "Built payload");
            }

            let bytes = match payload.to_json() {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(error = %e, "Payload serialization failed");
                    return CycleOutcome::PublishFailed;
                }
            };

            if self.publisher.publish(&self.topic, bytes, self.qos).await {
                info!("Publish result: OK");
                CycleOutcome::Published
            } else {
                warn!("Publish result: NG");
                CycleOutcome::PublishFailed
            }
        }
        .instrument(span)
        .await
    }

    /// Run cycles until `shutdown` fires
    pub async fn run(&mut self, shutdown: ShutdownRx) -> AgentResult<()> {
        if self.state != AgentState::Connected {
            return Err(AgentError::internal(
                "Agent loop must be started before running",
            ));
        }

        while !is_shutdown_requested(&shutdown) {
            if self.run_cycle(&shutdown).await == CycleOutcome::Cancelled {
                break;
            }
            if !interruptible_sleep(shutdown.clone(), self.interval).await {
                break;
            }
        }

        info!(cycles = self.cycles, "Publish loop stopped");
        Ok(())
    }

    /// Disconnect the publisher after the loop has stopped
    pub async fn stop(&mut self) -> AgentResult<()> {
        let span = lifecycle_span!(event = "stop", device_id = %self.builder.device_id());
        async {
            self.publisher.disconnect().await?;
            info!("Agent stopped");
            Ok::<(), AgentError>(())
        }
        .instrument(span)
        .await
    }
}
