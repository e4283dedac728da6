//! Frame codecs
//!
//! One implementation per logging mode. A codec turns a polling step into
//! the outbound frame the bridge should store, and an inbound frame into
//! parameter value updates.

mod extended_memory;
mod service_read;

pub use extended_memory::ExtendedMemoryCodec;
pub use service_read::ServiceReadCodec;

use crate::directory::{ParameterDirectory, PidDefinition};
use crate::error::LogResult;
use crate::mode::LoggingMode;

/// Outcome of a successfully handled tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    /// No frame arrived, timeout not reached yet
    Idle,
    /// Setup echo accepted, nothing decoded
    Priming,
    /// Values decoded, cycle still running
    Partial,
    /// Every enabled parameter has been refreshed
    CycleComplete {
        /// Tick counter from the bridge header of the completing frame
        bridge_tick: u32,
    },
}

impl TickStatus {
    pub fn is_cycle_complete(&self) -> bool {
        matches!(self, TickStatus::CycleComplete { .. })
    }
}

/// Request layout computed at step 0 of a mode selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollPlan {
    /// Directory indices of enabled definitions, in directory order
    ///
    /// Enabled virtual parameters are included so they can be zeroed;
    /// they never reach the request bytes.
    pub enabled: Vec<usize>,
    /// Flattened request data sent to the bridge
    pub request: Vec<u8>,
}

impl PollPlan {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }
}

/// Indices of enabled definitions
pub(crate) fn enabled_indices(definitions: &[PidDefinition]) -> Vec<usize> {
    definitions
        .iter()
        .enumerate()
        .filter(|(_, d)| d.enabled)
        .map(|(i, _)| i)
        .collect()
}

/// Build/parse capability of one logging mode
pub trait FrameCodec: Send {
    fn mode(&self) -> LoggingMode;

    /// Frames needed to set up one full poll
    fn frame_count(&self) -> usize;

    /// Current request layout
    fn plan(&self) -> &PollPlan;

    /// Recompute the request layout from the directory
    fn prepare(&mut self, directory: &dyn ParameterDirectory);

    /// Outbound frame for `step`; empty when the step produces nothing
    ///
    /// Step 0 recomputes the request layout first.
    fn build(&mut self, step: usize, directory: &dyn ParameterDirectory) -> Vec<u8>;

    /// Validate and decode one inbound frame
    fn parse(
        &mut self,
        tick: u32,
        frame: &[u8],
        directory: &mut dyn ParameterDirectory,
    ) -> LogResult<TickStatus>;

    /// Drop every cached layout
    fn reset(&mut self);
}

/// Codec for `mode`
pub fn codec_for(mode: LoggingMode) -> Box<dyn FrameCodec> {
    match mode {
        LoggingMode::ServiceRead => Box::new(ServiceReadCodec::new()),
        LoggingMode::ExtendedMemory => Box::new(ExtendedMemoryCodec::new()),
    }
}
