//! Pub/Sub Transport
//!
//! Connection lifecycle for the telemetry subscription: a [`Transport`]
//! abstraction over the broker session, the MQTT implementation, and the
//! [`ConnectionManager`] that supervises it with reconnect-and-backoff.

mod connection;
mod error;
/// MQTT client transport
pub mod mqtt;

pub use connection::{
    ConnectionEvent, ConnectionManager, ConnectionState, DEFAULT_RECONNECT_BACKOFF_MS,
};
pub use error::TransportError;
pub use mqtt::MqttTransport;

use serde::{Deserialize, Serialize};
use std::future::Future;

/// Default topic pattern covering every telemetry device
pub const DEFAULT_TOPIC: &str = "telemetry/#";

/// Default broker port for plain MQTT
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Something that happened on the transport session
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Session (re-)established by the broker
    Connected,
    /// Application message received
    Message {
        /// Topic the message was published on
        topic: String,
        /// Raw payload bytes
        payload: Vec<u8>,
    },
    /// Broker ended the session
    Closed,
    /// Protocol traffic with no meaning for the pipeline (pings, acks)
    Idle,
}

/// Abstraction over a broker session (MQTT, or the demo simulator)
pub trait Transport: Send + 'static {
    /// Wait for the next event, connecting or reconnecting as needed.
    ///
    /// An `Err` means the session is down; the next call starts a new
    /// connection attempt.
    fn poll(&mut self) -> impl Future<Output = Result<TransportEvent, TransportError>> + Send;

    /// Request a subscription to `topic` at the lowest quality of service.
    /// Must not block on the broker's acknowledgement.
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Tear the session down without waiting for the broker
    fn close(&mut self);
}

/// Wire protocol used to reach the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    /// MQTT over TCP
    #[default]
    Tcp,
    /// MQTT over WebSocket
    Ws,
}

/// Broker connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Broker host name
    pub host: String,
    /// Broker port
    pub port: u16,
    /// TCP or WebSocket
    pub protocol: TransportProtocol,
    /// URL path for WebSocket connections
    pub ws_path: String,
    /// Topic pattern to subscribe to
    pub topic: String,
    /// Client ids are `<prefix>_<8 hex chars>`
    pub client_id_prefix: String,
    /// MQTT keep-alive in seconds
    pub keep_alive_secs: u64,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Capacity of the client request queue
    pub channel_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_MQTT_PORT,
            protocol: TransportProtocol::Tcp,
            ws_path: "/mqtt".to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            client_id_prefix: "racecast".to_string(),
            keep_alive_secs: 30,
            connect_timeout_ms: 10_000,
            channel_capacity: 64,
        }
    }
}

impl TransportConfig {
    /// Generate a fresh client id
    pub fn client_id(&self) -> String {
        format!("{}_{:08x}", self.client_id_prefix, rand::random::<u32>())
    }

    /// Broker address as shown in logs
    pub fn broker_url(&self) -> String {
        match self.protocol {
            TransportProtocol::Tcp => format!("mqtt://{}:{}", self.host, self.port),
            TransportProtocol::Ws => format!("ws://{}:{}{}", self.host, self.port, self.ws_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_format() {
        let cfg = TransportConfig {
            client_id_prefix: "web".into(),
            ..Default::default()
        };
        let id = cfg.client_id();
        let (prefix, suffix) = id.split_once('_').unwrap();
        assert_eq!(prefix, "web");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_broker_url() {
        let mut cfg = TransportConfig {
            host: "broker.local".into(),
            port: 9001,
            protocol: TransportProtocol::Ws,
            ..Default::default()
        };
        assert_eq!(cfg.broker_url(), "ws://broker.local:9001/mqtt");
        cfg.protocol = TransportProtocol::Tcp;
        assert_eq!(cfg.broker_url(), "mqtt://broker.local:9001");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: TransportConfig =
            serde_json::from_str(r#"{"host":"broker.local","protocol":"ws","port":9001}"#).unwrap();
        assert_eq!(cfg.protocol, TransportProtocol::Ws);
        assert_eq!(cfg.topic, DEFAULT_TOPIC);
        assert_eq!(cfg.keep_alive_secs, 30);
    }
}
