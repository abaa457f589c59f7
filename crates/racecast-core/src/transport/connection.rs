//! Connection management
//!
//! Supervises the transport session: connects, (re-)subscribes on every
//! connect, retries after a fixed backoff when the session drops, and
//! forwards payloads only while connected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Transport, TransportError, TransportEvent};

/// Default delay before reconnecting after the session drops
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 5000;

/// Capacity of the event channel handed to the pipeline
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected (initial state, after an error, or after stop)
    #[default]
    Disconnected,
    /// Connection attempt in progress
    Connecting,
    /// Session established
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// What the connection manager hands to the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The connection state changed
    State(ConnectionState),
    /// Raw payload received while connected
    Payload {
        /// Topic the message was published on
        topic: String,
        /// Raw payload bytes
        payload: Vec<u8>,
    },
}

/// Owns the transport session and its reconnect loop
pub struct ConnectionManager<T: Transport> {
    /// Transport, until `start` moves it into the supervisor task
    transport: Option<T>,
    topic: String,
    backoff: Duration,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    state_tx: watch::Sender<ConnectionState>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a manager for `transport` (not yet connected)
    pub fn new(transport: T, topic: impl Into<String>, backoff: Duration) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport: Some(transport),
            topic: topic.into(),
            backoff,
            cancel: CancellationToken::new(),
            task: None,
            state_tx,
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch connection state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// True between `start` and `stop`
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Start the supervisor task. Must be called from within a tokio
    /// runtime. Returns the stream of connection events.
    pub fn start(&mut self) -> Result<mpsc::Receiver<ConnectionEvent>, TransportError> {
        let transport = self.transport.take().ok_or(TransportError::AlreadyStarted)?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let supervisor = Supervisor {
            transport,
            topic: self.topic.clone(),
            backoff: self.backoff,
            events: events_tx,
            state_tx: self.state_tx.clone(),
            cancel: self.cancel.clone(),
            state: ConnectionState::Disconnected,
        };
        self.task = Some(tokio::spawn(supervisor.run()));
        Ok(events_rx)
    }

    /// Tear the session down immediately, interrupting any pending
    /// reconnect. Safe to call any number of times.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            // Dropping the transport closes the socket; no unsubscribe round trip.
            task.abort();
            info!("connection: stopped");
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Supervisor<T: Transport> {
    transport: T,
    topic: String,
    backoff: Duration,
    events: mpsc::Sender<ConnectionEvent>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    state: ConnectionState,
}

impl<T: Transport> Supervisor<T> {
    async fn run(mut self) {
        if self.set_state(ConnectionState::Connecting).await.is_err() {
            return;
        }

        loop {
            let polled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                polled = self.transport.poll() => polled,
            };

            let keep_going = match polled {
                Ok(TransportEvent::Connected) => self.on_connected().await,
                Ok(TransportEvent::Message { topic, payload }) => {
                    self.forward(topic, payload).await
                }
                Ok(TransportEvent::Idle) => Ok(()),
                Ok(TransportEvent::Closed) => self.on_disconnected(TransportError::Closed).await,
                Err(e) => self.on_disconnected(e).await,
            };
            if keep_going.is_err() {
                break;
            }
        }

        self.transport.close();
        self.state_tx.send_replace(ConnectionState::Disconnected);
        debug!("connection: supervisor exited");
    }

    async fn on_connected(&mut self) -> Result<(), Stop> {
        info!("connection: connected");
        self.set_state(ConnectionState::Connected).await?;

        // The session stays up when the subscribe request fails; no retry.
        match self.transport.subscribe(&self.topic) {
            Ok(()) => info!("connection: subscribed to {}", self.topic),
            Err(e) => warn!("connection: subscription error: {}", e),
        }
        Ok(())
    }

    async fn forward(&mut self, topic: String, payload: Vec<u8>) -> Result<(), Stop> {
        if self.state != ConnectionState::Connected {
            debug!("connection: dropping message on {} while {}", topic, self.state);
            return Ok(());
        }
        self.emit(ConnectionEvent::Payload { topic, payload }).await
    }

    async fn on_disconnected(&mut self, error: TransportError) -> Result<(), Stop> {
        warn!("connection: {} (retrying in {}ms)", error, self.backoff.as_millis());
        self.set_state(ConnectionState::Disconnected).await?;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Stop),
            _ = tokio::time::sleep(self.backoff) => {}
        }

        self.set_state(ConnectionState::Connecting).await
    }

    async fn set_state(&mut self, state: ConnectionState) -> Result<(), Stop> {
        if self.state == state {
            return Ok(());
        }
        debug!("connection: {} -> {}", self.state, state);
        self.state = state;
        self.state_tx.send_replace(state);
        self.emit(ConnectionEvent::State(state)).await
    }

    async fn emit(&mut self, event: ConnectionEvent) -> Result<(), Stop> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Stop),
            sent = self.events.send(event) => sent.map_err(|_| Stop),
        }
    }
}

/// Supervisor shutdown: cancelled, or the pipeline went away
struct Stop;
