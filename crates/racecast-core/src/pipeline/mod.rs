//! Telemetry pipeline
//!
//! Wires the connection manager to the pipeline state and drives it from
//! a single task: transport events, the liveness tick and (while anything
//! is animating) the frame tick are applied one at a time, and the
//! resulting snapshot is published on a watch channel.

mod clock;
mod error;
mod state;

pub use clock::{Clock, RuntimeClock, SystemClock};
pub use error::PipelineError;
pub use state::{Now, PipelineInput, PipelineStats, TelemetrySnapshot, TelemetryState};

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::transport::{
    ConnectionEvent, ConnectionManager, ConnectionState, MqttTransport, Transport,
};

/// Running pipeline. Dropping it tears everything down.
pub struct Pipeline<T: Transport> {
    connection: ConnectionManager<T>,
    /// Stops the frame source
    frames: CancellationToken,
    /// Stops the liveness timer
    liveness: CancellationToken,
    /// Stops the driver task
    halt: CancellationToken,
    task: Option<JoinHandle<()>>,
    snapshot_rx: watch::Receiver<TelemetrySnapshot>,
    stats_rx: watch::Receiver<PipelineStats>,
}

impl Pipeline<MqttTransport> {
    /// Start a pipeline subscribed to the configured MQTT broker
    pub fn with_mqtt(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let transport = MqttTransport::new(&config.transport);
        Self::spawn(config, transport, SystemClock)
    }
}

impl<T: Transport> Pipeline<T> {
    /// Validate `config`, then start the connection manager and the driver
    /// task. Must be called from within a tokio runtime.
    pub fn spawn<C: Clock>(
        config: &PipelineConfig,
        transport: T,
        clock: C,
    ) -> Result<Self, PipelineError> {
        let state = TelemetryState::new(config);
        Self::spawn_with_state(config, state, transport, clock)
    }

    /// Like [`Pipeline::spawn`], starting from a prepared state
    pub fn spawn_with_state<C: Clock>(
        config: &PipelineConfig,
        state: TelemetryState,
        transport: T,
        clock: C,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let mut connection = ConnectionManager::new(
            transport,
            config.transport.topic.clone(),
            config.reconnect_backoff(),
        );
        let events = connection.start()?;

        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());
        let (stats_tx, stats_rx) = watch::channel(state.stats());

        let driver = Driver {
            state,
            events,
            clock,
            liveness_period: config.liveness_tick(),
            frame_period: config.frame_interval(),
            frames: CancellationToken::new(),
            liveness: CancellationToken::new(),
            halt: CancellationToken::new(),
            snapshot_tx,
            stats_tx,
        };
        let frames = driver.frames.clone();
        let liveness = driver.liveness.clone();
        let halt = driver.halt.clone();

        info!("pipeline: started on {}", config.transport.broker_url());

        Ok(Self {
            connection,
            frames,
            liveness,
            halt,
            task: Some(tokio::spawn(driver.run())),
            snapshot_rx,
            stats_rx,
        })
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> TelemetrySnapshot {
        *self.snapshot_rx.borrow()
    }

    /// Receiver notified on every snapshot change
    pub fn subscribe(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.snapshot_rx.clone()
    }

    /// Latest message counters
    pub fn stats(&self) -> PipelineStats {
        *self.stats_rx.borrow()
    }

    /// Connection state as seen by the connection manager
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// False once shutdown has begun
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Tear down in order: frame source, liveness timer, transport.
    ///
    /// The transport is force-closed without waiting for the broker. Safe
    /// to call more than once.
    pub async fn shutdown(&mut self) {
        self.frames.cancel();
        self.liveness.cancel();
        self.connection.stop();
        self.halt.cancel();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!("pipeline: driver ended abnormally: {}", e);
            }
            info!("pipeline: shut down");
        }
    }
}

impl<T: Transport> Drop for Pipeline<T> {
    fn drop(&mut self) {
        self.frames.cancel();
        self.liveness.cancel();
        self.connection.stop();
        self.halt.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Owns the state inside the driver task
struct Driver<C: Clock> {
    state: TelemetryState,
    events: mpsc::Receiver<ConnectionEvent>,
    clock: C,
    liveness_period: Duration,
    frame_period: Duration,
    frames: CancellationToken,
    liveness: CancellationToken,
    halt: CancellationToken,
    snapshot_tx: watch::Sender<TelemetrySnapshot>,
    stats_tx: watch::Sender<PipelineStats>,
}

impl<C: Clock> Driver<C> {
    async fn run(mut self) {
        let mut liveness_ticker = tokio::time::interval(self.liveness_period);
        liveness_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut frame_ticker = tokio::time::interval(self.frame_period);
        frame_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let started = Instant::now();
        let mut frames_on = true;
        let mut liveness_on = true;

        loop {
            let animating = frames_on && self.state.is_animating();
            let input = tokio::select! {
                biased;
                _ = self.halt.cancelled() => break,
                _ = self.frames.cancelled(), if frames_on => {
                    frames_on = false;
                    continue;
                }
                _ = self.liveness.cancelled(), if liveness_on => {
                    liveness_on = false;
                    continue;
                }
                _ = liveness_ticker.tick(), if liveness_on => PipelineInput::LivenessTick,
                _ = frame_ticker.tick(), if animating => PipelineInput::Frame,
                event = self.events.recv() => match event {
                    Some(event) => PipelineInput::Connection(event),
                    None => break,
                },
            };

            self.apply(input, started);
        }

        // The aborted supervisor never delivers its final state change
        let closed = ConnectionEvent::State(ConnectionState::Disconnected);
        self.apply(PipelineInput::Connection(closed), started);
        debug!("pipeline: driver exited");
    }

    /// Apply `input` and publish whatever changed
    fn apply(&mut self, input: PipelineInput, started: Instant) {
        let monotonic_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        let now = Now::new(self.clock.now_ms(), monotonic_ms);

        let stats_before = self.state.stats();
        if self.state.apply(input, now) {
            let snapshot = self.state.snapshot();
            self.snapshot_tx.send_if_modified(|current| {
                if *current != snapshot {
                    *current = snapshot;
                    true
                } else {
                    false
                }
            });
        }
        let stats = self.state.stats();
        if stats != stats_before {
            self.stats_tx.send_replace(stats);
        }
    }
}
