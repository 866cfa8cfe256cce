//! Pure message routing logic for MQTT events
//!
//! The agent only publishes, so incoming traffic is limited to connection
//! control and acknowledgements.

use crate::config::QosLevel;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{mqttbytes::QoS, Event};
use rumqttc::Outgoing;

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Disconnect(_) => EventRoute::Disconnected,
                Packet::PubAck(puback) => EventRoute::PublishAcknowledged {
                    packet_id: puback.pkid,
                },
                Packet::PubComp(pubcomp) => EventRoute::PublishAcknowledged {
                    packet_id: pubcomp.pkid,
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Map the configured QoS onto the wire level (pure function)
    pub fn to_mqtt_qos(qos: QosLevel) -> QoS {
        match qos {
            QosLevel::AtMostOnce => QoS::AtMostOnce,
            QosLevel::AtLeastOnce => QoS::AtLeastOnce,
            QosLevel::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Connection acknowledged - ready to publish
    ConnectionAcknowledged,
    /// MQTT broker disconnected
    Disconnected,
    /// Broker confirmed a QoS 1/2 publish
    PublishAcknowledged { packet_id: u16 },
    /// Our DISCONNECT was written to the socket
    DisconnectSent,
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::v5::mqttbytes::v5::{ConnAck, ConnectReturnCode, Disconnect, DisconnectReasonCode};

    #[test]
    fn test_route_connack() {
        let connack = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
            properties: None,
        }));
        assert_eq!(
            MessageHandler::route_mqtt_event(&connack),
            EventRoute::ConnectionAcknowledged
        );
    }

    #[test]
    fn test_route_disconnect() {
        let disconnect = Event::Incoming(Packet::Disconnect(Disconnect {
            reason_code: DisconnectReasonCode::NormalDisconnection,
            properties: None,
        }));
        assert_eq!(
            MessageHandler::route_mqtt_event(&disconnect),
            EventRoute::Disconnected
        );
    }

    #[test]
    fn test_route_outgoing() {
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(Outgoing::Disconnect)),
            EventRoute::DisconnectSent
        );
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(Outgoing::PingReq)),
            EventRoute::OutgoingEvent
        );
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(
            MessageHandler::to_mqtt_qos(QosLevel::AtMostOnce),
            QoS::AtMostOnce
        );
        assert_eq!(
            MessageHandler::to_mqtt_qos(QosLevel::AtLeastOnce),
            QoS::AtLeastOnce
        );
        assert_eq!(
            MessageHandler::to_mqtt_qos(QosLevel::ExactlyOnce),
            QoS::ExactlyOnce
        );
    }
}
