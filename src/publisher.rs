//! Best-effort publishing on top of a [`Transport`]
//!
//! The publisher adds no retry of its own. Reconnects and offline queueing
//! belong to the transport; a failed publish is reported and the next cycle
//! tries again with fresh data.

use crate::config::QosLevel;
use crate::error::{AgentError, AgentResult};
use crate::mqtt_span;
use crate::transport::{ConnectionState, PublishOutcome, Transport};
use bytes::Bytes;
use tracing::{debug, info, warn, Instrument};

/// Connects and publishes through a transport
pub struct Publisher<T: Transport> {
    transport: T,
}

impl<T> Publisher<T>
where
    T: Transport,
    AgentError: From<T::Error>,
{
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Establish the broker session. Failure is not masked.
    pub async fn connect(&mut self) -> AgentResult<()> {
        let span = mqtt_span!(operation = "connect");
        async {
            self.transport.connect().await?;
            info!("Publisher connected");
            Ok::<(), AgentError>(())
        }
        .instrument(span)
        .await
    }

    /// Publish `payload`, returning whether the transport accepted it.
    ///
    /// A queued message counts as accepted.
    pub async fn publish(&self, topic: &str, payload: Bytes, qos: QosLevel) -> bool {
        let span = mqtt_span!(operation = "publish", topic = %topic, qos = u8::from(qos), bytes = payload.len());
        async {
            match self.transport.publish(topic, payload, qos).await {
                Ok(PublishOutcome::Sent) => {
                    debug!("Payload handed to broker connection");
                    true
                }
                Ok(PublishOutcome::Queued) => {
                    info!("Broker unreachable, payload queued for delivery");
                    true
                }
                Err(e) => {
                    warn!(error = %e, "Publish rejected by transport");
                    false
                }
            }
        }
        .instrument(span)
        .await
    }

    pub async fn disconnect(&mut self) -> AgentResult<()> {
        let span = mqtt_span!(operation = "disconnect");
        async {
            self.transport.disconnect().await?;
            info!("Publisher disconnected");
            Ok::<(), AgentError>(())
        }
        .instrument(span)
        .await
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.transport.connection_state()
    }

    /// Access the transport, mainly for inspection in tests
    pub fn transport(&self) -> &T {
        &self.transport
    }
}
