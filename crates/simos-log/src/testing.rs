//! Test helpers: an in-memory log sink and bridge response builders

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::header::{encode_frame, CommandFlags};
use crate::session_log::LogSink;

/// One session captured by [`MemorySink`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySession {
    pub name: String,
    pub lines: Vec<String>,
    pub closed: bool,
}

/// Log sink keeping sessions in memory
///
/// Clones share the same storage, so a test can keep one handle while the
/// engine owns another.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    sessions: Arc<Mutex<Vec<MemorySession>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sessions(&self) -> Vec<MemorySession> {
        self.sessions.lock().clone()
    }

    /// Data lines across every session (header lines excluded)
    pub fn data_lines(&self) -> Vec<String> {
        self.sessions
            .lock()
            .iter()
            .flat_map(|s| s.lines.iter().skip(1).cloned())
            .collect()
    }
}

impl LogSink for MemorySink {
    fn open(&mut self, name: &str) -> io::Result<()> {
        self.sessions.lock().push(MemorySession {
            name: name.to_string(),
            ..Default::default()
        });
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        match self.sessions.lock().last_mut() {
            Some(session) if !session.closed => {
                session.lines.push(line.to_string());
                Ok(())
            }
            _ => Err(io::Error::new(io::ErrorKind::NotConnected, "no open session")),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(session) = self.sessions.lock().last_mut() {
            session.closed = true;
        }
        Ok(())
    }
}

/// Positive 0x22 response carrying `(address, value bytes)` pairs
pub fn service_read_response(tick: u32, pairs: &[(u16, &[u8])]) -> Vec<u8> {
    let mut payload = vec![0x62];
    for (address, value) in pairs {
        payload.extend_from_slice(&address.to_be_bytes());
        payload.extend_from_slice(value);
    }
    encode_frame(CommandFlags::empty(), tick, &payload)
}

/// Acknowledgement of a 0x3E upload of `slice_len` bytes
pub fn extended_memory_echo(tick: u32, slice_len: usize) -> Vec<u8> {
    encode_frame(
        CommandFlags::empty(),
        tick,
        &[0x7E, 0x00, (slice_len & 0xFF) as u8],
    )
}

/// Streamed 0x3E data block
pub fn extended_memory_data(tick: u32, block: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(block.len() + 1);
    payload.push(0x7E);
    payload.extend_from_slice(block);
    encode_frame(CommandFlags::empty(), tick, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_shares_storage() {
        let sink = MemorySink::new();
        let mut handle = sink.clone();
        handle.open("a.csv").unwrap();
        handle.write_line("Time,x").unwrap();
        handle.write_line("1,2").unwrap();
        handle.close().unwrap();
        assert!(handle.write_line("late").is_err());

        let sessions = sink.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].name, "a.csv");
        assert!(sessions[0].closed);
        assert_eq!(sink.data_lines(), vec!["1,2".to_string()]);
    }

    #[test]
    fn test_response_builders() {
        assert_eq!(
            service_read_response(5, &[(0xF40C, &[0x0B, 0xB8])]),
            vec![0xF1, 0xF2, 0x00, 0x05, 0x00, 0x00, 0x00, 0x05, 0x62, 0xF4, 0x0C, 0x0B, 0xB8]
        );
        assert_eq!(&extended_memory_echo(0, 0x8F)[8..], &[0x7E, 0x00, 0x8F]);
        assert_eq!(&extended_memory_data(0, &[1, 2])[8..], &[0x7E, 1, 2]);
    }
}
