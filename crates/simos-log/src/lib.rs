//! simos-log - UDS live-data logging engine
//!
//! This crate streams live parameter data from an engine ECU through a
//! BLE-to-ISOTP bridge device. It builds the bridge's periodic polling
//! frames, decodes the answers into the parameter value table, derives
//! torque/horsepower and gates CSV logging on a trigger parameter.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PollingTask                             │
//! │  owns one LoggingEngine, fed TickEvents over a queue         │
//! │                                                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐ │
//! │  │ FrameCodec  │  │ Metrics     │  │ LogSession          │ │
//! │  │ (22 / 3E)   │  │ Calculator  │  │ Controller          │ │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘ │
//! │         │                │                    │             │
//! │  ┌──────┴────────────────┴──────┐   ┌────────┴──────────┐  │
//! │  │ ParameterDirectory           │   │ LogSink (CSV)     │  │
//! │  │ (definitions + value table)  │   └───────────────────┘  │
//! │  └──────────────────────────────┘                          │
//! │                          │                                  │
//! │                 ┌────────┴────────┐                         │
//! │                 │BridgeTransport  │                         │
//! │                 │(BLE/mock)       │                         │
//! │                 └─────────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod config;
pub mod directory;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod header;
pub mod metrics;
pub mod mode;
pub mod session_log;
pub mod task;
pub mod testing;
pub mod transport;

pub use codec::{ExtendedMemoryCodec, FrameCodec, PollPlan, ServiceReadCodec, TickStatus};
pub use config::EngineConfig;
pub use directory::{ParameterDirectory, ParameterTable, PidDefinition, PidValue};
pub use discovery::{DiscoveredPids, DiscoveryTable, TorqueSource};
pub use engine::LoggingEngine;
pub use error::{ConfigError, LogError, LogResult};
pub use header::{BridgeHeader, CommandFlags};
pub use metrics::{MetricsCalculator, MetricsSnapshot};
pub use mode::LoggingMode;
pub use session_log::{CsvFileSink, LogSessionController, LogSink, NullSink, SessionEvent};
pub use task::{PollingTask, PollingTaskHandle, TaskEvent, TickEvent};
pub use transport::{BridgeTransport, MockBridgeTransport, TransportError};
