//! Bridge frame header
//!
//! Every frame exchanged with the BLE bridge starts with an 8-byte header:
//!
//! ```text
//! byte 0..2  tag        F1 F2
//! byte 2     flags      CommandFlags
//! byte 3     size       payload length
//! byte 4..8  tick       big-endian u32, echoed by the bridge
//! ```

use bitflags::bitflags;
use bytes::{Buf, BufMut, BytesMut};

use crate::error::{LogError, LogResult};

/// Fixed tag bytes opening every frame
pub const HEADER_TAG: [u8; 2] = [0xF1, 0xF2];

/// Header length in bytes
pub const HEADER_LEN: usize = 8;

bitflags! {
    /// Periodic-command flags understood by the bridge
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CommandFlags: u8 {
        /// Start periodic polling with the accumulated command list
        const ENABLE = 0x01;
        /// Drop the bridge's current command list
        const CLEAR = 0x02;
        /// Append this payload to the command list
        const ADD = 0x04;
        const SPLIT = 0x08;
        const SET_GET = 0x40;
        const SETTINGS = 0x80;
    }
}

/// Decoded bridge header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BridgeHeader {
    pub flags: CommandFlags,
    /// Declared payload length
    pub size: u8,
    /// Bridge tick counter
    pub tick: u32,
}

impl BridgeHeader {
    pub fn new(flags: CommandFlags, size: u8) -> Self {
        Self {
            flags,
            size,
            tick: 0,
        }
    }

    pub fn with_tick(mut self, tick: u32) -> Self {
        self.tick = tick;
        self
    }

    /// Write the 8 header bytes
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&HEADER_TAG);
        buf.put_u8(self.flags.bits());
        buf.put_u8(self.size);
        buf.put_u32(self.tick);
    }

    /// Split a frame into header and payload
    ///
    /// Fails with `HeaderInvalid` when the frame is shorter than a header or
    /// the tag does not match, and with `SizeMismatch` when the payload
    /// length differs from the declared size.
    pub fn split(frame: &[u8]) -> LogResult<(BridgeHeader, &[u8])> {
        if frame.len() < HEADER_LEN {
            return Err(LogError::HeaderInvalid);
        }

        let (mut head, payload) = frame.split_at(HEADER_LEN);
        let mut tag = [0u8; 2];
        head.copy_to_slice(&mut tag);
        if tag != HEADER_TAG {
            return Err(LogError::HeaderInvalid);
        }

        let header = BridgeHeader {
            flags: CommandFlags::from_bits_retain(head.get_u8()),
            size: head.get_u8(),
            tick: head.get_u32(),
        };

        if payload.len() != header.size as usize {
            return Err(LogError::SizeMismatch {
                declared: header.size as usize,
                actual: payload.len(),
            });
        }

        Ok((header, payload))
    }
}

/// Build a complete frame: header sized to `payload`, followed by the payload
///
/// Payloads longer than 255 bytes are not representable; callers keep
/// their slices inside the bridge's window.
pub fn encode_frame(flags: CommandFlags, tick: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    BridgeHeader::new(flags, payload.len() as u8)
        .with_tick(tick)
        .encode(&mut buf);
    buf.put_slice(payload);
    buf.to_vec()
}
