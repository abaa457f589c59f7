//! MQTT transport backed by `rumqttc`

use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, NetworkOptions, Packet, QoS,
    SubscribeReasonCode,
};
use std::time::Duration;
use tracing::{debug, warn};

use super::{Transport, TransportConfig, TransportError, TransportEvent, TransportProtocol};

/// Broker session over TCP or WebSocket.
///
/// Clean session, QoS 0. The event loop reconnects on the next `poll`
/// after an error; pacing is left to the connection manager.
pub struct MqttTransport {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttTransport {
    /// Build the client and event loop. Nothing touches the network until
    /// the first `poll`.
    pub fn new(config: &TransportConfig) -> Self {
        let client_id = config.client_id();
        let broker = match config.protocol {
            TransportProtocol::Tcp => config.host.clone(),
            // rumqttc takes the full URL as the host for WebSocket sessions
            TransportProtocol::Ws => config.broker_url(),
        };

        let mut options = MqttOptions::new(client_id.clone(), broker, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        options.set_clean_session(true);
        if config.protocol == TransportProtocol::Ws {
            options.set_transport(rumqttc::Transport::Ws);
        }

        let (client, mut eventloop) = AsyncClient::new(options, config.channel_capacity.max(1));

        let mut network = NetworkOptions::new();
        network.set_connection_timeout(config.connect_timeout_ms.div_ceil(1000).max(1));
        eventloop.set_network_options(network);

        debug!("mqtt: client {} for {}", client_id, config.broker_url());

        Self { client, eventloop }
    }
}

fn map_connection_error(e: ConnectionError) -> TransportError {
    match e {
        ConnectionError::ConnectionRefused(code) => {
            TransportError::ConnectionFailed(format!("refused by broker: {:?}", code))
        }
        other => TransportError::ConnectionLost(other.to_string()),
    }
}

/// Reduce an event-loop event to what the connection manager acts on
fn map_event(event: Event) -> TransportEvent {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => TransportEvent::Connected,
        Event::Incoming(Packet::Publish(publish)) => TransportEvent::Message {
            topic: publish.topic,
            payload: publish.payload.to_vec(),
        },
        Event::Incoming(Packet::SubAck(ack)) => {
            if ack
                .return_codes
                .iter()
                .any(|code| matches!(code, SubscribeReasonCode::Failure))
            {
                warn!("mqtt: broker rejected subscription (pkid {})", ack.pkid);
            }
            TransportEvent::Idle
        }
        Event::Incoming(Packet::Disconnect) => TransportEvent::Closed,
        _ => TransportEvent::Idle,
    }
}

impl Transport for MqttTransport {
    async fn poll(&mut self) -> Result<TransportEvent, TransportError> {
        let event = self.eventloop.poll().await.map_err(map_connection_error)?;
        Ok(map_event(event))
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| TransportError::SubscribeFailed {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }

    fn close(&mut self) {
        // Queue a DISCONNECT if there is room; the socket goes away with
        // the event loop either way.
        if let Err(e) = self.client.try_disconnect() {
            debug!("mqtt: disconnect not queued: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rumqttc::{ConnAck, ConnectReturnCode, Outgoing, Publish, SubAck};
    use std::io;

    #[test]
    fn test_refused_connection_is_a_failed_attempt() {
        let err = map_connection_error(ConnectionError::ConnectionRefused(
            ConnectReturnCode::NotAuthorized,
        ));
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
        assert!(err.to_string().contains("NotAuthorized"));
    }

    #[test]
    fn test_io_error_is_a_lost_connection() {
        let io = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        let err = map_connection_error(ConnectionError::Io(io));
        assert!(matches!(err, TransportError::ConnectionLost(_)));
    }

    #[test]
    fn test_connack_means_connected() {
        let ack = ConnAck::new(ConnectReturnCode::Success, false);
        assert_eq!(
            map_event(Event::Incoming(Packet::ConnAck(ack))),
            TransportEvent::Connected
        );
    }

    #[test]
    fn test_publish_becomes_message() {
        let publish = Publish::new("telemetry/car-1/RPM", QoS::AtMostOnce, b"{}".to_vec());
        assert_eq!(
            map_event(Event::Incoming(Packet::Publish(publish))),
            TransportEvent::Message {
                topic: "telemetry/car-1/RPM".to_string(),
                payload: b"{}".to_vec(),
            }
        );
    }

    #[test]
    fn test_rejected_suback_keeps_session() {
        let ack = SubAck::new(1, vec![SubscribeReasonCode::Failure]);
        assert_eq!(
            map_event(Event::Incoming(Packet::SubAck(ack))),
            TransportEvent::Idle
        );
    }

    #[test]
    fn test_broker_disconnect_closes() {
        assert_eq!(
            map_event(Event::Incoming(Packet::Disconnect)),
            TransportEvent::Closed
        );
        assert_eq!(map_event(Event::Outgoing(Outgoing::PingReq)), TransportEvent::Idle);
    }
}
