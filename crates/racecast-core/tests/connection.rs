use pretty_assertions::assert_eq;
use racecast_core::transport::{
    ConnectionEvent, ConnectionManager, ConnectionState, Transport, TransportError, TransportEvent,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

const TOPIC: &str = "telemetry/#";
const BACKOFF: Duration = Duration::from_secs(5);

type Scripted = Result<TransportEvent, TransportError>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Transport driven by the test: each scripted result is returned from one
/// `poll`; with nothing queued, `poll` waits.
struct ScriptedTransport {
    script: mpsc::UnboundedReceiver<Scripted>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    fail_subscribe: Arc<AtomicBool>,
}

struct Handle {
    script: mpsc::UnboundedSender<Scripted>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    fail_subscribe: Arc<AtomicBool>,
}

impl Handle {
    fn push(&self, item: Scripted) {
        self.script.send(item).unwrap();
    }

    fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }
}

fn scripted() -> (ScriptedTransport, Handle) {
    init_tracing();
    let (tx, rx) = mpsc::unbounded_channel();
    let subscriptions = Arc::new(Mutex::new(Vec::new()));
    let fail_subscribe = Arc::new(AtomicBool::new(false));
    (
        ScriptedTransport {
            script: rx,
            subscriptions: subscriptions.clone(),
            fail_subscribe: fail_subscribe.clone(),
        },
        Handle {
            script: tx,
            subscriptions,
            fail_subscribe,
        },
    )
}

impl Transport for ScriptedTransport {
    async fn poll(&mut self) -> Result<TransportEvent, TransportError> {
        match self.script.recv().await {
            Some(item) => item,
            None => std::future::pending().await,
        }
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(TransportError::SubscribeFailed {
                topic: topic.to_string(),
                message: "not authorized".to_string(),
            });
        }
        self.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    fn close(&mut self) {}
}

fn state(s: ConnectionState) -> Option<ConnectionEvent> {
    Some(ConnectionEvent::State(s))
}

fn message(body: &str) -> Scripted {
    Ok(TransportEvent::Message {
        topic: "telemetry/car-1/SPEED".to_string(),
        payload: body.as_bytes().to_vec(),
    })
}

#[tokio::test(start_paused = true)]
async fn test_connect_and_subscribe() {
    let (transport, handle) = scripted();
    let mut manager = ConnectionManager::new(transport, TOPIC, BACKOFF);
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    let mut events = manager.start().unwrap();
    assert_eq!(events.recv().await, state(ConnectionState::Connecting));

    handle.push(Ok(TransportEvent::Connected));
    assert_eq!(events.recv().await, state(ConnectionState::Connected));
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(handle.subscriptions(), vec![TOPIC.to_string()]);

    handle.push(message("a"));
    assert_eq!(
        events.recv().await,
        Some(ConnectionEvent::Payload {
            topic: "telemetry/car-1/SPEED".to_string(),
            payload: b"a".to_vec(),
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_resubscribes_after_reconnect() {
    let (transport, handle) = scripted();
    let mut manager = ConnectionManager::new(transport, TOPIC, BACKOFF);
    let mut events = manager.start().unwrap();
    assert_eq!(events.recv().await, state(ConnectionState::Connecting));

    handle.push(Ok(TransportEvent::Connected));
    assert_eq!(events.recv().await, state(ConnectionState::Connected));

    let dropped_at = Instant::now();
    handle.push(Err(TransportError::ConnectionLost("reset by peer".into())));
    assert_eq!(events.recv().await, state(ConnectionState::Disconnected));
    assert_eq!(events.recv().await, state(ConnectionState::Connecting));
    assert!(dropped_at.elapsed() >= BACKOFF);

    handle.push(Ok(TransportEvent::Connected));
    assert_eq!(events.recv().await, state(ConnectionState::Connected));
    assert_eq!(handle.subscriptions(), vec![TOPIC.to_string(), TOPIC.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_broker_close_reconnects() {
    let (transport, handle) = scripted();
    let mut manager = ConnectionManager::new(transport, TOPIC, BACKOFF);
    let mut events = manager.start().unwrap();
    assert_eq!(events.recv().await, state(ConnectionState::Connecting));

    handle.push(Ok(TransportEvent::Connected));
    assert_eq!(events.recv().await, state(ConnectionState::Connected));
    handle.push(Ok(TransportEvent::Closed));
    assert_eq!(events.recv().await, state(ConnectionState::Disconnected));
    assert_eq!(events.recv().await, state(ConnectionState::Connecting));
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_failure_keeps_session() {
    let (transport, handle) = scripted();
    handle.fail_subscribe.store(true, Ordering::SeqCst);

    let mut manager = ConnectionManager::new(transport, TOPIC, BACKOFF);
    let mut events = manager.start().unwrap();
    assert_eq!(events.recv().await, state(ConnectionState::Connecting));

    handle.push(Ok(TransportEvent::Connected));
    assert_eq!(events.recv().await, state(ConnectionState::Connected));
    assert!(handle.subscriptions().is_empty());

    // No reconnect: the next thing out is the message, not a state change
    handle.push(message("still here"));
    assert!(matches!(
        events.recv().await,
        Some(ConnectionEvent::Payload { .. })
    ));
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_messages_before_connect_are_dropped() {
    let (transport, handle) = scripted();
    let mut manager = ConnectionManager::new(transport, TOPIC, BACKOFF);
    let mut events = manager.start().unwrap();
    assert_eq!(events.recv().await, state(ConnectionState::Connecting));

    handle.push(message("early"));
    handle.push(Ok(TransportEvent::Idle));
    handle.push(Ok(TransportEvent::Connected));
    handle.push(message("late"));

    assert_eq!(events.recv().await, state(ConnectionState::Connected));
    assert_eq!(
        events.recv().await,
        Some(ConnectionEvent::Payload {
            topic: "telemetry/car-1/SPEED".to_string(),
            payload: b"late".to_vec(),
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_interrupts_backoff() {
    let backoff = Duration::from_secs(60);
    let (transport, handle) = scripted();
    let mut manager = ConnectionManager::new(transport, TOPIC, backoff);
    let mut state_rx = manager.watch_state();
    let mut events = manager.start().unwrap();
    assert_eq!(events.recv().await, state(ConnectionState::Connecting));

    handle.push(Ok(TransportEvent::Connected));
    assert_eq!(events.recv().await, state(ConnectionState::Connected));
    handle.push(Err(TransportError::ConnectionFailed("refused".into())));
    assert_eq!(events.recv().await, state(ConnectionState::Disconnected));

    // Supervisor is now sleeping out the backoff
    let stopped_at = Instant::now();
    manager.stop();
    manager.stop();
    assert!(!manager.is_running());
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    // The event stream ends without another connection attempt
    assert_eq!(events.recv().await, None);
    assert!(stopped_at.elapsed() < backoff);
    assert_eq!(*state_rx.borrow_and_update(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_fails() {
    let (transport, _handle) = scripted();
    let mut manager = ConnectionManager::new(transport, TOPIC, BACKOFF);
    let _events = manager.start().unwrap();
    assert!(manager.is_running());
    assert_eq!(manager.start().unwrap_err(), TransportError::AlreadyStarted);
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_start_is_noop() {
    let (transport, _handle) = scripted();
    let mut manager = ConnectionManager::new(transport, TOPIC, BACKOFF);
    manager.stop();
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(!manager.is_running());
}
