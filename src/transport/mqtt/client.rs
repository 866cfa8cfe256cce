//! Impure I/O operations for MQTT client
//!
//! This module handles network communication, async coordination, and
//! integration with the rumqttc client. One supervisor task owns the event
//! loop for the lifetime of the connection and drives reconnects; a second
//! task drains the offline queue once the broker is reachable again.

use super::connection::{configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig};
use super::health_monitor::{ConnectionEvent, HealthMonitor, PublishRoute, ReconnectionDecision};
use super::message_handler::{EventRoute, MessageHandler};
use super::offline_queue::{OfflineQueue, QueuedMessage};
use crate::config::{CredentialPaths, MqttSection, QosLevel};
use crate::shutdown::{interruptible_sleep, ShutdownRx, ShutdownTx};
use crate::transport::{PublishOutcome, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::v5::{AsyncClient, EventLoop, MqttOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Bound of the rumqttc request channel
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// MQTT transport client with automatic reconnect and offline queueing
pub struct MqttClient {
    client_id: String,
    client: AsyncClient,
    // EventLoop is Send but not Sync; the mutex makes the client shareable
    event_loop: Option<Mutex<EventLoop>>,
    supervisor_handle: Option<JoinHandle<()>>,
    drain_handle: Option<JoinHandle<()>>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    shutdown_tx: Option<ShutdownTx>,
    reconnect_config: ReconnectConfig,
    queue: Arc<Mutex<OfflineQueue>>,
    drain_interval: Duration,
    connect_timeout: Duration,
    operation_timeout: Duration,
}

impl MqttClient {
    /// Build a TLS client. Credential files are read immediately.
    pub fn new(
        client_id: &str,
        config: &MqttSection,
        credentials: &CredentialPaths,
    ) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(client_id, config, credentials)?;
        Ok(Self::with_options(mqtt_options, config))
    }

    /// Build a client from prepared options; `config` supplies reconnect,
    /// queue and timeout settings.
    pub fn with_options(mqtt_options: MqttOptions, config: &MqttSection) -> Self {
        let client_id = mqtt_options.client_id();
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        MqttClient {
            client_id,
            client,
            event_loop: Some(Mutex::new(event_loop)),
            supervisor_handle: None,
            drain_handle: None,
            state_rx: None,
            shutdown_tx: None,
            reconnect_config: ReconnectConfig::from(&config.reconnect),
            queue: Arc::new(Mutex::new(OfflineQueue::new(config.queue.offline_limit))),
            drain_interval: config.queue.drain_interval(),
            connect_timeout: Duration::from_secs(config.timeouts.connect_disconnect_secs),
            operation_timeout: Duration::from_secs(config.timeouts.operation_secs),
        }
    }

    /// Create connection state and shutdown channels
    #[allow(clippy::type_complexity)]
    fn setup_connection_channels() -> (
        (
            watch::Sender<ConnectionState>,
            watch::Receiver<ConnectionState>,
        ),
        (ShutdownTx, ShutdownRx),
    ) {
        let state_channels = watch::channel(ConnectionState::Connecting);
        let shutdown_channels = crate::shutdown::shutdown_channel();
        (state_channels, shutdown_channels)
    }

    /// Wait for connection confirmation (ConnAck) with timeout
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailedStr(
                        "State channel closed".to_string(),
                    ));
                }
                match *state_rx.borrow() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(ref reason) => {
                        return Err(MqttError::ConnectionFailedStr(reason.clone()));
                    }
                    ConnectionState::Connecting | ConnectionState::Reconnecting(_) => continue,
                }
            }
        })
        .await;

        match timeout_result {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnectionFailedStr(format!(
                "ConnAck timeout - no connection confirmation within {timeout:?}"
            ))),
        }
    }

    /// Connect to the broker and wait for ConnAck.
    ///
    /// The supervisor keeps running after this returns and reconnects on its
    /// own; a failed initial connect stops it again.
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        let event_loop = self
            .event_loop
            .take()
            .ok_or_else(|| {
                MqttError::ConnectionFailedStr("Event loop already started".to_string())
            })?
            .into_inner();

        let ((state_tx, state_rx), (shutdown_tx, shutdown_rx)) =
            Self::setup_connection_channels();
        self.state_rx = Some(state_rx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        info!(
            client_id = %self.client_id,
            timeout_secs = self.connect_timeout.as_secs(),
            "Connecting to MQTT broker"
        );

        let supervisor = ConnectionSupervisor {
            client_id: self.client_id.clone(),
            client: self.client.clone(),
            event_loop,
            state_tx,
            shutdown_rx: shutdown_rx.clone(),
            reconnect_config: self.reconnect_config.clone(),
            disconnect_timeout: self.connect_timeout,
            attempts: 0,
            connected_at: None,
        };
        self.supervisor_handle = Some(tokio::spawn(supervisor.run()));

        let drainer = QueueDrainer {
            sink: self.client.clone(),
            queue: self.queue.clone(),
            state_rx: state_rx.clone(),
            shutdown_rx,
            interval: self.drain_interval,
            operation_timeout: self.operation_timeout,
        };
        self.drain_handle = Some(tokio::spawn(drainer.run()));

        if let Err(e) = Self::wait_for_connection_confirmation(state_rx, self.connect_timeout).await
        {
            self.stop_background_tasks();
            return Err(e);
        }

        info!(client_id = %self.client_id, "MQTT connection confirmed");
        Ok(())
    }

    /// Publish one message with the operation timeout applied
    async fn publish_with_timeout(
        client: &AsyncClient,
        message: QueuedMessage,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let qos = MessageHandler::to_mqtt_qos(message.qos);
        match tokio::time::timeout(
            timeout,
            client.publish(message.topic, qos, false, message.payload),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(MqttError::PublishFailed(Box::new(e))),
            Err(_) => Err(MqttError::PublishTimeout(timeout)),
        }
    }

    /// Publish now if connected with nothing queued, otherwise queue
    pub async fn publish_message(
        &self,
        topic: &str,
        payload: Bytes,
        qos: QosLevel,
    ) -> Result<PublishOutcome, MqttError> {
        let state_rx = self.state_rx.as_ref().ok_or(MqttError::NotConnected)?;
        let state = state_rx.borrow().clone();
        let message = QueuedMessage {
            topic: topic.to_string(),
            payload,
            qos,
        };

        // held through the direct publish so a drain cannot interleave
        let mut queue = self.queue.lock().await;
        match HealthMonitor::route_publish(&state, queue.len()) {
            PublishRoute::Direct => {
                Self::publish_with_timeout(&self.client, message, self.operation_timeout).await?;
                Ok(PublishOutcome::Sent)
            }
            PublishRoute::Enqueue => {
                let depth = queue.enqueue(message)?;
                debug!(
                    queue_depth = depth,
                    state = ?state,
                    "Publish queued until the connection is restored"
                );
                Ok(PublishOutcome::Queued)
            }
        }
    }

    /// Number of messages waiting in the offline queue
    pub async fn queued_messages(&self) -> usize {
        self.queue.lock().await.len()
    }

    fn stop_background_tasks(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.supervisor_handle.take() {
            handle.abort();
        }
        if let Some(handle) = self.drain_handle.take() {
            handle.abort();
        }
    }

    /// Send MQTT DISCONNECT and stop the supervisor, waiting at most the
    /// disconnect timeout
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        let Some(shutdown_tx) = self.shutdown_tx.as_ref() else {
            debug!("Disconnect requested before connect, nothing to do");
            return Ok(());
        };

        let pending = self.queue.lock().await.len();
        if pending > 0 {
            warn!(pending, "Discarding queued messages on disconnect");
        }

        let _ = shutdown_tx.send(true);
        info!("Sent shutdown signal to reconnection supervisor");

        if let Some(handle) = self.drain_handle.take() {
            handle.abort();
        }

        if let Some(handle) = self.supervisor_handle.take() {
            match tokio::time::timeout(self.connect_timeout, handle).await {
                Ok(Ok(())) => info!("MQTT supervisor shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!("MQTT supervisor ended with error: {}", e);
                }
                Err(_) => warn!("MQTT supervisor did not stop in time, aborting"),
                _ => {}
            }
        }

        info!("MQTT client disconnected");
        Ok(())
    }

    /// Current connection state, None before `connect()`
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        MqttClient::connect(self).await
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        MqttClient::disconnect(self).await
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: QosLevel,
    ) -> Result<PublishOutcome, Self::Error> {
        self.publish_message(topic, payload, qos).await
    }

    fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        MqttClient::connection_state(self)
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        // no async in Drop; disconnect() is the graceful path
        self.stop_background_tasks();
    }
}

/// Owns the event loop and the connection state machine
struct ConnectionSupervisor {
    client_id: String,
    client: AsyncClient,
    event_loop: EventLoop,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: ShutdownRx,
    reconnect_config: ReconnectConfig,
    disconnect_timeout: Duration,
    attempts: u32,
    connected_at: Option<Instant>,
}

impl ConnectionSupervisor {
    async fn run(mut self) {
        info!(
            client_id = %self.client_id,
            "Starting MQTT event loop with reconnection supervisor"
        );

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping reconnection supervisor");
                        self.close().await;
                        break;
                    }
                }

                event = self.event_loop.poll() => {
                    let keep_running = match event {
                        Ok(event) => {
                            let route = MessageHandler::route_mqtt_event(&event);
                            self.process_event_route(route).await
                        }
                        Err(e) => {
                            self.handle_connection_loss(ConnectionEvent::NetworkError(e.to_string()))
                                .await
                        }
                    };
                    if !keep_running {
                        break;
                    }
                }
            }
        }

        info!(client_id = %self.client_id, "MQTT event loop stopped");
    }

    /// Returns false when the supervisor should stop
    async fn process_event_route(&mut self, route: EventRoute) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged => {
                self.connected_at = Some(Instant::now());
                self.transition(HealthMonitor::determine_next_state(
                    ConnectionEvent::ConnAckReceived,
                ));
                true
            }
            EventRoute::Disconnected => {
                self.handle_connection_loss(ConnectionEvent::DisconnectedByBroker)
                    .await
            }
            EventRoute::PublishAcknowledged { packet_id } => {
                debug!(target: "mqtt_transport", packet_id, "Publish acknowledged");
                true
            }
            EventRoute::InfrastructureEvent(event_str) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                true
            }
            EventRoute::DisconnectSent | EventRoute::OutgoingEvent => true,
        }
    }

    /// Record the loss, then wait out the backoff. Returns false on shutdown.
    async fn handle_connection_loss(&mut self, event: ConnectionEvent) -> bool {
        let uptime = self.connected_at.take().map(|since| since.elapsed());
        self.attempts =
            HealthMonitor::attempts_after_disconnect(self.attempts, uptime, &self.reconnect_config);
        self.transition(HealthMonitor::determine_next_state(event));

        let shutdown_requested = *self.shutdown_rx.borrow();
        match HealthMonitor::should_attempt_reconnection(
            self.attempts,
            &self.reconnect_config,
            shutdown_requested,
        ) {
            ReconnectionDecision::Proceed { attempt, delay } => {
                self.attempts = attempt;
                info!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling MQTT reconnection"
                );

                if !interruptible_sleep(self.shutdown_rx.clone(), delay).await {
                    info!("Shutdown signal received during reconnection delay, stopping");
                    return false;
                }

                self.transition(HealthMonitor::determine_next_state(
                    ConnectionEvent::ReconnectionStarted(attempt),
                ));
                true
            }
            ReconnectionDecision::AbortShutdownRequested => {
                info!("Shutdown signal received, stopping reconnection");
                false
            }
        }
    }

    fn transition(&self, next: ConnectionState) {
        let previous = self.state_tx.send_replace(next.clone());
        if previous != next {
            HealthMonitor::log_state_transition(&previous, &next);
        }
    }

    /// Send DISCONNECT if connected and poll until it is written out
    async fn close(&mut self) {
        let connected = HealthMonitor::can_publish(&self.state_tx.borrow());
        if connected {
            if let Err(e) = self.client.try_disconnect() {
                warn!("Failed to queue MQTT DISCONNECT: {}", e);
            } else {
                let event_loop = &mut self.event_loop;
                let flush = async {
                    loop {
                        match event_loop.poll().await {
                            Ok(event) => {
                                if MessageHandler::route_mqtt_event(&event)
                                    == EventRoute::DisconnectSent
                                {
                                    break;
                                }
                            }
                            Err(_) => break,
                        }
                    }
                };
                if tokio::time::timeout(self.disconnect_timeout, flush)
                    .await
                    .is_err()
                {
                    warn!("MQTT DISCONNECT not flushed before timeout");
                }
            }
        }

        self.state_tx
            .send_replace(ConnectionState::Disconnected("Client disconnected".to_string()));
    }
}

/// Destination for drained messages
#[async_trait]
trait DrainSink: Send + Sync + 'static {
    async fn send(&self, message: QueuedMessage, timeout: Duration) -> Result<(), MqttError>;
}

#[async_trait]
impl DrainSink for AsyncClient {
    async fn send(&self, message: QueuedMessage, timeout: Duration) -> Result<(), MqttError> {
        MqttClient::publish_with_timeout(self, message, timeout).await
    }
}

/// Flushes the offline queue at a fixed rate while connected
struct QueueDrainer<S> {
    sink: S,
    queue: Arc<Mutex<OfflineQueue>>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_rx: ShutdownRx,
    interval: Duration,
    operation_timeout: Duration,
}

impl<S: DrainSink> QueueDrainer<S> {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown_rx.wait_for(|stop| *stop) => break,
            }

            if !HealthMonitor::can_publish(&self.state_rx.borrow()) {
                continue;
            }

            self.drain_one().await;
        }
    }

    /// Publish the oldest queued message; true if it left the queue.
    ///
    /// The queue stays locked until the publish settles, so a direct publish
    /// cannot overtake the message in flight.
    async fn drain_one(&self) -> bool {
        let mut queue = self.queue.lock().await;
        let Some(message) = queue.pop_front() else {
            return false;
        };

        match self
            .sink
            .send(message.clone(), self.operation_timeout)
            .await
        {
            Ok(()) => {
                debug!(remaining = queue.len(), "Drained queued message");
                true
            }
            Err(e) => {
                warn!("Failed to drain queued message, will retry: {}", e);
                queue.requeue_front(message);
                false
            }
        }
    }
}
