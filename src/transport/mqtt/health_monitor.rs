//! Pure health monitoring and reconnection logic for MQTT client
//!
//! This module contains pure functions for reconnection decision making,
//! publish routing and connection state tracking.

use super::connection::{ConnectionState, ReconnectConfig};
use std::time::Duration;
use tracing::{error, info, warn};

/// Pure health monitoring and reconnection decision logic
pub struct HealthMonitor;

impl HealthMonitor {
    /// Determine if reconnection should be attempted (pure function).
    /// Retries are unlimited; only shutdown stops them.
    pub fn should_attempt_reconnection(
        current_attempts: u32,
        config: &ReconnectConfig,
        shutdown_requested: bool,
    ) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }

        let attempt = current_attempts.saturating_add(1);
        ReconnectionDecision::Proceed {
            attempt,
            delay: config.calculate_backoff_delay(attempt),
        }
    }

    /// Attempt counter to continue from after a connection is lost.
    ///
    /// `uptime` is how long the lost connection had been up (None if it never
    /// came up). A stable connection restarts the backoff from the base delay.
    pub fn attempts_after_disconnect(
        current_attempts: u32,
        uptime: Option<Duration>,
        config: &ReconnectConfig,
    ) -> u32 {
        match uptime {
            Some(uptime) if config.is_stable(uptime) => 0,
            _ => current_attempts,
        }
    }

    /// Determine next state after connection event (pure function)
    pub fn determine_next_state(event: ConnectionEvent) -> ConnectionState {
        match event {
            ConnectionEvent::ConnAckReceived => ConnectionState::Connected,
            ConnectionEvent::DisconnectedByBroker => {
                ConnectionState::Disconnected("Broker disconnected".to_string())
            }
            ConnectionEvent::NetworkError(error) => ConnectionState::Disconnected(error),
            ConnectionEvent::ReconnectionStarted(attempt) => ConnectionState::Reconnecting(attempt),
        }
    }

    /// Check if connection state allows publishing (pure function)
    pub fn can_publish(state: &ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }

    /// Decide whether a new message goes straight to the broker or to the
    /// offline queue. Anything already queued must go out first.
    pub fn route_publish(state: &ConnectionState, queued: usize) -> PublishRoute {
        if Self::can_publish(state) && queued == 0 {
            PublishRoute::Direct
        } else {
            PublishRoute::Enqueue
        }
    }

    /// Log connection state transition (pure logging function)
    pub fn log_state_transition(from: &ConnectionState, to: &ConnectionState) {
        match (from, to) {
            (ConnectionState::Connecting, ConnectionState::Connected) => {
                info!("MQTT connection established successfully");
            }
            (ConnectionState::Connected, ConnectionState::Disconnected(reason)) => {
                warn!("MQTT connection lost: {}", reason);
            }
            (_, ConnectionState::Reconnecting(attempt)) => {
                info!("Starting reconnection attempt {}", attempt);
            }
            (ConnectionState::Reconnecting(_), ConnectionState::Connected) => {
                info!("Reconnection successful");
            }
            (_, ConnectionState::Disconnected(reason)) => {
                error!("MQTT connection attempt failed: {}", reason);
            }
            _ => {
                info!("MQTT connection state: {:?} -> {:?}", from, to);
            }
        }
    }
}

/// Decision result for reconnection attempts
#[derive(Debug, PartialEq)]
pub enum ReconnectionDecision {
    /// Proceed with reconnection attempt after `delay`
    Proceed { attempt: u32, delay: Duration },
    /// Abort reconnection - shutdown requested
    AbortShutdownRequested,
}

/// Where an outgoing message goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishRoute {
    Direct,
    Enqueue,
}

/// Connection events that trigger state transitions
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// ConnAck received from broker
    ConnAckReceived,
    /// Broker initiated disconnect
    DisconnectedByBroker,
    /// Network or protocol error
    NetworkError(String),
    /// Reconnection attempt started
    ReconnectionStarted(u32),
}
