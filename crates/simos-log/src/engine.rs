//! Logging engine
//!
//! Owns the active mode, one codec per mode, the timeout counter, the
//! metrics calculator and the log session controller, and sequences them
//! for every tick. An engine is a plain owned value: one caller drives it
//! one tick at a time.

use tracing::{debug, info};

use crate::codec::{ExtendedMemoryCodec, FrameCodec, ServiceReadCodec, TickStatus};
use crate::config::EngineConfig;
use crate::directory::ParameterDirectory;
use crate::discovery::{DiscoveredPids, TorqueSource};
use crate::error::{LogError, LogResult};
use crate::metrics::{MetricsCalculator, MetricsSnapshot};
use crate::mode::LoggingMode;
use crate::session_log::{LogSessionController, LogSink, SessionEvent};

pub struct LoggingEngine<D: ParameterDirectory> {
    config: EngineConfig,
    directory: D,
    mode: LoggingMode,
    service_read: ServiceReadCodec,
    extended_memory: ExtendedMemoryCodec,
    timeout_remaining: u32,
    discovered: DiscoveredPids,
    metrics: MetricsCalculator,
    session: LogSessionController,
    session_event: Option<SessionEvent>,
    cycles: u64,
}

impl<D: ParameterDirectory> LoggingEngine<D> {
    /// Create an engine in `ServiceRead` mode
    pub fn new(config: EngineConfig, directory: D, sink: Box<dyn LogSink>) -> Self {
        let mut engine = Self {
            timeout_remaining: config.timeout_ticks,
            metrics: MetricsCalculator::new(config.vehicle.clone()),
            session: LogSessionController::new(config.logging.clone(), sink),
            config,
            directory,
            mode: LoggingMode::ServiceRead,
            service_read: ServiceReadCodec::new(),
            extended_memory: ExtendedMemoryCodec::new(),
            discovered: DiscoveredPids::default(),
            session_event: None,
            cycles: 0,
        };
        engine.prepare();
        engine
    }

    pub fn mode(&self) -> LoggingMode {
        self.mode
    }

    /// Switch the active mode
    ///
    /// Every cached layout, discovery result and metric is dropped and a
    /// running log session is closed; the new mode's layout is computed
    /// from the directory right away.
    pub fn select_mode(&mut self, mode: LoggingMode) {
        info!(from = %self.mode, to = %mode, "Selecting logging mode");
        self.session.close();
        self.service_read.reset();
        self.extended_memory.reset();
        self.metrics.reset();
        self.discovered = DiscoveredPids::default();
        self.session_event = None;
        self.timeout_remaining = self.config.timeout_ticks;
        self.cycles = 0;
        self.mode = mode;
        self.prepare();
    }

    pub fn frame_count(&self) -> usize {
        self.codec().frame_count()
    }

    /// Outbound frame for `step`, empty when the step produces nothing
    pub fn build(&mut self, step: usize) -> Vec<u8> {
        let mode = self.mode;
        let frame = match mode {
            LoggingMode::ServiceRead => self.service_read.build(step, &self.directory),
            LoggingMode::ExtendedMemory => self.extended_memory.build(step, &self.directory),
        };
        if step == 0 {
            self.discover();
        }
        frame
    }

    /// Handle one tick
    ///
    /// `None` means nothing arrived this tick. After `timeout_ticks`
    /// consecutive empty ticks the result is [`LogError::Timeout`].
    pub fn parse(&mut self, tick: u32, frame: Option<&[u8]>) -> LogResult<TickStatus> {
        let Some(frame) = frame else {
            self.timeout_remaining = self.timeout_remaining.saturating_sub(1);
            if self.timeout_remaining == 0 {
                return Err(LogError::Timeout);
            }
            return Ok(TickStatus::Idle);
        };

        self.timeout_remaining = self.config.timeout_ticks;
        if frame.is_empty() {
            return Err(LogError::NoFrame);
        }

        debug!(tick, frame = %hex::encode(frame), "Parsing frame");
        let status = match self.mode {
            LoggingMode::ServiceRead => self.service_read.parse(tick, frame, &mut self.directory),
            LoggingMode::ExtendedMemory => {
                self.extended_memory
                    .parse(tick, frame, &mut self.directory)
            }
        }?;

        if let TickStatus::CycleComplete { bridge_tick } = status {
            self.complete_cycle(bridge_tick);
        }
        Ok(status)
    }

    /// Close a running log session
    pub fn stop(&mut self) {
        self.session.close();
    }

    pub fn torque(&self) -> f32 {
        self.metrics.torque()
    }

    pub fn horsepower(&self) -> f32 {
        self.metrics.horsepower()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn torque_source(&self) -> TorqueSource {
        self.metrics.source()
    }

    pub fn discovered(&self) -> &DiscoveredPids {
        &self.discovered
    }

    /// Whether a log session is open
    pub fn is_logging(&self) -> bool {
        self.session.is_enabled()
    }

    /// Session change produced by the last completed cycle
    pub fn take_session_event(&mut self) -> Option<SessionEvent> {
        self.session_event.take()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn timeout_remaining(&self) -> u32 {
        self.timeout_remaining
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Mutable access to the directory; call `build(0)` afterwards to pick
    /// up changed definitions
    pub fn directory_mut(&mut self) -> &mut D {
        &mut self.directory
    }

    fn codec(&self) -> &dyn FrameCodec {
        match self.mode {
            LoggingMode::ServiceRead => &self.service_read,
            LoggingMode::ExtendedMemory => &self.extended_memory,
        }
    }

    fn prepare(&mut self) {
        match self.mode {
            LoggingMode::ServiceRead => self.service_read.prepare(&self.directory),
            LoggingMode::ExtendedMemory => self.extended_memory.prepare(&self.directory),
        }
        self.discover();
    }

    fn discover(&mut self) {
        let table = self.config.discovery.table(self.mode);
        self.discovered = table.discover(self.directory.definitions(self.mode));
        let prefer_physics =
            self.config.vehicle.use_physics_torque && self.mode == LoggingMode::ExtendedMemory;
        let source = TorqueSource::select(&self.discovered, prefer_physics);
        // Rebinds inputs only; cached torque and horsepower survive
        self.metrics.configure(&self.discovered, source);
    }

    fn complete_cycle(&mut self, bridge_tick: u32) {
        let mode = self.mode;
        self.cycles += 1;

        self.metrics.update(self.directory.values(mode));
        self.directory.commit_cycle(mode);

        let event = self.session.on_cycle(
            bridge_tick,
            self.directory.definitions(mode),
            self.directory.values(mode),
        );
        debug!(
            cycle = self.cycles,
            bridge_tick,
            torque = self.metrics.torque(),
            horsepower = self.metrics.horsepower(),
            "Cycle complete"
        );
        self.session_event = Some(event);
    }
}
