//! CSV log sessions gated by the last parameter of the directory
//!
//! Each completed cycle the gating value decides whether a session should
//! be open. A session starts with a header line and gets one data line per
//! cycle until the gate drops again.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::config::LoggingConfig;
use crate::directory::{PidDefinition, PidValue};

/// File collaborator receiving session output
pub trait LogSink: Send {
    /// Start a new session file called `name`
    fn open(&mut self, name: &str) -> io::Result<()>;

    /// Append one line (without line terminator)
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()>;
}

/// What the controller did for one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Ramp-up, or gate closed with no session
    Idle,
    /// New session started (file name) and its first line written
    Opened(String),
    /// Data line appended to the running session
    Written,
    /// Gate dropped, session finished
    Closed,
}

/// Opens, feeds and closes CSV sessions
pub struct LogSessionController {
    config: LoggingConfig,
    sink: Box<dyn LogSink>,
    enabled: bool,
}

impl LogSessionController {
    pub fn new(config: LoggingConfig, sink: Box<dyn LogSink>) -> Self {
        Self {
            config,
            sink,
            enabled: false,
        }
    }

    /// Whether a session is currently open
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Session file name for a start time
    pub fn file_name(prefix: &str, time: DateTime<Local>) -> String {
        format!("{}-{}.csv", prefix, time.format("%Y_%m_%d-%H_%M_%S"))
    }

    /// Column header; the gating parameter's column carries the revision tag
    pub fn header_line(&self, definitions: &[PidDefinition]) -> String {
        let mut line = String::from("Time");
        let last = definitions.len().saturating_sub(1);
        for (i, def) in definitions.iter().enumerate() {
            line.push(',');
            if i == last {
                line.push_str(&self.config.revision);
            } else {
                line.push_str(&def.column_name());
            }
        }
        line
    }

    /// Data line: bridge time in seconds followed by every value
    pub fn data_line(bridge_tick: u32, values: &[PidValue]) -> String {
        let mut line = (bridge_tick as f32 / 1000.0).to_string();
        for v in values {
            line.push(',');
            line.push_str(&v.value.to_string());
        }
        line
    }

    /// Run the gate for one completed cycle
    pub fn on_cycle(
        &mut self,
        bridge_tick: u32,
        definitions: &[PidDefinition],
        values: &[PidValue],
    ) -> SessionEvent {
        if bridge_tick < self.config.ramp_up_ticks {
            return SessionEvent::Idle;
        }

        let gate = values
            .last()
            .map(|v| (v.value != 0.0) != self.config.invert_gate)
            .unwrap_or(false);

        if !gate {
            if self.enabled {
                self.close();
                return SessionEvent::Closed;
            }
            return SessionEvent::Idle;
        }

        let mut event = SessionEvent::Written;
        if !self.enabled {
            let name = Self::file_name(&self.config.prefix, Local::now());
            info!(file = %name, "Opening log session");
            if let Err(e) = self.sink.open(&name) {
                warn!(file = %name, error = %e, "Failed to open log session");
            }
            let header = self.header_line(definitions);
            self.write(&header);
            event = SessionEvent::Opened(name);
        }
        self.enabled = true;

        self.write(&Self::data_line(bridge_tick, values));
        event
    }

    /// Close a running session, e.g. on stop or mode switch
    pub fn close(&mut self) {
        if !self.enabled {
            return;
        }
        info!("Closing log session");
        if let Err(e) = self.sink.close() {
            warn!(error = %e, "Failed to close log session");
        }
        self.enabled = false;
    }

    fn write(&mut self, line: &str) {
        debug!(line, "Log line");
        if let Err(e) = self.sink.write_line(line) {
            warn!(error = %e, "Failed to write log line");
        }
    }
}

/// Sink that drops every session, for runs that only build frames
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn open(&mut self, _name: &str) -> io::Result<()> {
        Ok(())
    }

    fn write_line(&mut self, _line: &str) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink writing each session to its own file under a directory
pub struct CsvFileSink {
    dir: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl CsvFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writer: None,
        }
    }
}

impl LogSink for CsvFileSink {
    fn open(&mut self, name: &str) -> io::Result<()> {
        self.close()?;
        fs::create_dir_all(&self.dir)?;
        let file = File::create(self.dir.join(name))?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(w) => writeln!(w, "{}", line),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no log session open",
            )),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut w) => w.flush(),
            None => Ok(()),
        }
    }
}
