//! Pure routing of rumqttc events
//!
//! Maps raw MQTT packets to the small set of cases the connection driver
//! acts on.

use rumqttc::{Event, Packet, QoS, SubscribeReasonCode};

/// Pure routing decisions for MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to the appropriate handling branch (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                },
                Packet::SubAck(suback) => {
                    if Self::subscription_rejected(&suback.return_codes) {
                        EventRoute::SubscriptionRejected {
                            packet_id: suback.pkid,
                        }
                    } else {
                        EventRoute::SubscriptionConfirmed {
                            packet_id: suback.pkid,
                        }
                    }
                }
                Packet::Disconnect => EventRoute::Disconnected,
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Delivery level used for the sensor subscription
    pub fn subscription_qos() -> QoS {
        QoS::AtMostOnce
    }

    /// Check SubAck return codes for a broker-side rejection (pure function)
    pub fn subscription_rejected(return_codes: &[SubscribeReasonCode]) -> bool {
        return_codes
            .iter()
            .any(|code| matches!(code, SubscribeReasonCode::Failure))
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Connection acknowledged by the broker
    ConnectionAcknowledged,
    /// Message received on a subscribed topic
    MessageReceived { topic: String, payload: Vec<u8> },
    /// Broker granted the subscription
    SubscriptionConfirmed { packet_id: u16 },
    /// Broker refused the subscription
    SubscriptionRejected { packet_id: u16 },
    /// Broker sent DISCONNECT
    Disconnected,
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}
