//! Polling task
//!
//! A tokio task that exclusively owns one [`LoggingEngine`]. Received
//! frames, missed ticks and control commands arrive over an mpsc queue and
//! are handled strictly one at a time; setup frames go out through the
//! bridge transport and progress is published on a broadcast channel.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::TickStatus;
use crate::directory::ParameterDirectory;
use crate::engine::LoggingEngine;
use crate::error::LogError;
use crate::metrics::MetricsSnapshot;
use crate::mode::LoggingMode;
use crate::session_log::SessionEvent;
use crate::transport::BridgeTransport;

/// Inbound queue capacity
const QUEUE_DEPTH: usize = 64;
/// Broadcast buffer for task events
const EVENT_DEPTH: usize = 256;

/// Input to the polling task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickEvent {
    /// Send the first setup frame of the active mode
    Start,
    /// A frame arrived from the bridge
    Frame { tick: u32, data: Vec<u8> },
    /// Nothing arrived during this tick
    Missed { tick: u32 },
    /// Switch modes and restart the setup sequence
    SelectMode(LoggingMode),
    /// Close the session and end the task
    Stop,
}

/// Progress published by the polling task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    FrameSent { step: usize, len: usize },
    CycleComplete { cycle: u64, metrics: MetricsSnapshot },
    SessionOpened(String),
    SessionClosed,
    /// Tick-local failure, polling continues
    TickError(LogError),
    TransportError(String),
    ModeSelected(LoggingMode),
    TimedOut,
    Stopped,
}

/// Owner of one engine, driven by [`TickEvent`]s
pub struct PollingTask<D: ParameterDirectory> {
    engine: LoggingEngine<D>,
    transport: Arc<dyn BridgeTransport>,
    events: broadcast::Sender<TaskEvent>,
    /// Next setup step to send, `None` before `Start`
    next_step: Option<usize>,
}

/// Handle to a spawned [`PollingTask`]
pub struct PollingTaskHandle<D: ParameterDirectory> {
    tx: mpsc::Sender<TickEvent>,
    events: broadcast::Sender<TaskEvent>,
    join: JoinHandle<LoggingEngine<D>>,
}

impl<D: ParameterDirectory + 'static> PollingTask<D> {
    /// Move `engine` into a new task
    pub fn spawn(
        engine: LoggingEngine<D>,
        transport: Arc<dyn BridgeTransport>,
    ) -> PollingTaskHandle<D> {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let (events, _) = broadcast::channel(EVENT_DEPTH);

        let task = Self {
            engine,
            transport,
            events: events.clone(),
            next_step: None,
        };
        let join = tokio::spawn(task.run(rx));

        PollingTaskHandle { tx, events, join }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<TickEvent>) -> LoggingEngine<D> {
        info!(mode = %self.engine.mode(), "Polling task started");

        while let Some(event) = rx.recv().await {
            match event {
                TickEvent::Start => self.start().await,
                TickEvent::Frame { tick, data } => {
                    self.handle_tick(tick, Some(data.as_slice()));
                    self.send_next_step().await;
                }
                TickEvent::Missed { tick } => {
                    if self.handle_tick(tick, None) {
                        warn!(tick, "Bridge stopped answering, ending polling");
                        self.engine.stop();
                        self.publish(TaskEvent::TimedOut);
                        break;
                    }
                }
                TickEvent::SelectMode(mode) => {
                    self.engine.select_mode(mode);
                    self.publish(TaskEvent::ModeSelected(mode));
                    self.start().await;
                }
                TickEvent::Stop => {
                    self.engine.stop();
                    self.publish(TaskEvent::Stopped);
                    break;
                }
            }
        }

        self.engine.stop();
        info!(cycles = self.engine.cycles(), "Polling task finished");
        self.engine
    }

    async fn start(&mut self) {
        self.next_step = Some(0);
        self.send_next_step().await;
    }

    /// Send the next setup frame while the setup sequence is running
    async fn send_next_step(&mut self) {
        let Some(step) = self.next_step else {
            return;
        };
        if step >= self.engine.frame_count() {
            return;
        }
        self.next_step = Some(step + 1);

        let frame = self.engine.build(step);
        if frame.is_empty() {
            debug!(step, "Setup step produced no frame");
            return;
        }

        match self.transport.send(&frame).await {
            Ok(()) => self.publish(TaskEvent::FrameSent {
                step,
                len: frame.len(),
            }),
            Err(e) => {
                warn!(step, error = %e, "Failed to send setup frame");
                self.publish(TaskEvent::TransportError(e.to_string()));
            }
        }
    }

    /// Run one tick through the engine; true when polling must stop
    fn handle_tick(&mut self, tick: u32, frame: Option<&[u8]>) -> bool {
        match self.engine.parse(tick, frame) {
            Ok(TickStatus::CycleComplete { .. }) => {
                self.publish(TaskEvent::CycleComplete {
                    cycle: self.engine.cycles(),
                    metrics: self.engine.metrics(),
                });
                match self.engine.take_session_event() {
                    Some(SessionEvent::Opened(name)) => {
                        self.publish(TaskEvent::SessionOpened(name))
                    }
                    Some(SessionEvent::Closed) => self.publish(TaskEvent::SessionClosed),
                    _ => {}
                }
                false
            }
            Ok(_) => false,
            Err(e) if e.is_terminal() => true,
            Err(e) => {
                warn!(tick, error = %e, "Rejected frame");
                self.publish(TaskEvent::TickError(e));
                false
            }
        }
    }

    fn publish(&self, event: TaskEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl<D: ParameterDirectory> PollingTaskHandle<D> {
    /// Queue an event for the task
    pub async fn send(&self, event: TickEvent) -> Result<(), mpsc::error::SendError<TickEvent>> {
        self.tx.send(event).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Wait for the task to end and take its engine back
    pub async fn join(self) -> Result<LoggingEngine<D>, tokio::task::JoinError> {
        drop(self.tx);
        self.join.await
    }
}
