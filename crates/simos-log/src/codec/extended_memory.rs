//! Extended memory (0x3E) polling
//!
//! The list of `(length, address)` tuples is written into a reserved ECU
//! RAM window in slices of 0x8F bytes, then a finalize command asks the ECU
//! to stream the referenced memory back as one little-endian block. The
//! block carries no addresses, so decoding relies on the enabled-index list
//! captured when the request was built.

use bytes::{BufMut, BytesMut};
use tracing::{debug, trace};

use super::{enabled_indices, FrameCodec, PollPlan, TickStatus};
use crate::directory::{ParameterDirectory, PidDefinition};
use crate::error::{LogError, LogResult};
use crate::header::{encode_frame, BridgeHeader, CommandFlags};
use crate::mode::LoggingMode;

/// Bytes of request data per upload frame
pub const WINDOW: usize = 0x8F;
/// ECU RAM address the request list is uploaded to
pub const MEMORY_BASE: u32 = 0xB001_E700;
/// Upload command prefix
pub const UPLOAD_COMMAND: [u8; 2] = [0x3E, 0x32];
/// Finalize command: start streaming the uploaded list
pub const FINALIZE_PAYLOAD: [u8; 6] = [0x3E, 0x33, 0xB0, 0x01, 0xE7, 0x00];
/// Positive response tag
pub const RESPONSE_TAG: u8 = 0x7E;

const MODE: LoggingMode = LoggingMode::ExtendedMemory;

#[derive(Debug, Default)]
pub struct ExtendedMemoryCodec {
    plan: PollPlan,
    /// Slice length of the last upload frame, echoed back by the ECU
    last_frame_size: Option<usize>,
}

impl ExtendedMemoryCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame_size(&self) -> Option<usize> {
        self.last_frame_size
    }

    fn plan_for(definitions: &[PidDefinition]) -> PollPlan {
        let enabled = enabled_indices(definitions);
        let mut request = BytesMut::with_capacity(enabled.len() * 5 + 1);
        for &i in &enabled {
            let def = &definitions[i];
            if !MODE.is_virtual(def.address) {
                request.put_u8(def.length);
                request.put_u32(def.address);
            }
        }
        request.put_u8(0);

        PollPlan {
            enabled,
            request: request.to_vec(),
        }
    }

    /// Walk the enabled list and read each value from the response block
    fn decode(&self, payload: &[u8], directory: &mut dyn ParameterDirectory) -> LogResult<()> {
        let mut cursor = 1;
        for &index in &self.plan.enabled {
            let (address, length, signed) = match directory.definitions(MODE).get(index) {
                Some(def) => (def.address, def.length as usize, def.signed),
                None => return Err(LogError::UnknownParameter(MODE.sentinel())),
            };

            if MODE.is_virtual(address) {
                directory.set_value(MODE, index, 0.0);
                continue;
            }

            if cursor + length > payload.len() {
                return Err(LogError::UnknownParameter(address));
            }
            let value = decode_value(&payload[cursor..cursor + length], signed);
            cursor += length;
            directory.set_value(MODE, index, value);
        }
        Ok(())
    }
}

/// Decode a little-endian value
///
/// Unsigned 4-byte values are the ECU's native floats.
fn decode_value(bytes: &[u8], signed: bool) -> f32 {
    match (bytes.len(), signed) {
        (1, true) => bytes[0] as i8 as f32,
        (1, false) => bytes[0] as f32,
        (2, true) => i16::from_le_bytes([bytes[0], bytes[1]]) as f32,
        (2, false) => u16::from_le_bytes([bytes[0], bytes[1]]) as f32,
        (4, true) => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
        (4, false) => f32::from_bits(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        _ => 0.0,
    }
}

impl FrameCodec for ExtendedMemoryCodec {
    fn mode(&self) -> LoggingMode {
        MODE
    }

    fn frame_count(&self) -> usize {
        self.plan.request.len().div_ceil(WINDOW) + 1
    }

    fn plan(&self) -> &PollPlan {
        &self.plan
    }

    fn prepare(&mut self, directory: &dyn ParameterDirectory) {
        self.plan = Self::plan_for(directory.definitions(MODE));
        debug!(
            enabled = self.plan.enabled.len(),
            frames = self.frame_count(),
            "Prepared 3E poll plan"
        );
    }

    fn build(&mut self, step: usize, directory: &dyn ParameterDirectory) -> Vec<u8> {
        if step == 0 {
            self.prepare(directory);
        }

        let len = self.plan.request.len();
        let start = step.saturating_mul(WINDOW);
        if start >= len {
            self.last_frame_size = None;
            if step == self.frame_count() - 1 {
                let frame = encode_frame(
                    CommandFlags::CLEAR | CommandFlags::ADD | CommandFlags::ENABLE,
                    0,
                    &FINALIZE_PAYLOAD,
                );
                debug!(step, frame = %hex::encode(&frame), "Built 3E finalize frame");
                return frame;
            }
            debug!(step, "3E frame does not exist");
            return Vec::new();
        }

        let end = (start + WINDOW).min(len);
        let slice = &self.plan.request[start..end];
        let offset = MEMORY_BASE.wrapping_add((step * WINDOW) as u32);

        let mut payload = BytesMut::with_capacity(8 + slice.len());
        payload.put_slice(&UPLOAD_COMMAND);
        payload.put_u32(offset);
        payload.put_u16(slice.len() as u16);
        payload.put_slice(slice);

        self.last_frame_size = Some(slice.len());
        let frame = encode_frame(CommandFlags::CLEAR, 0, &payload);
        debug!(step, size = slice.len(), frame = %hex::encode(&frame), "Built 3E frame");
        frame
    }

    fn parse(
        &mut self,
        tick: u32,
        frame: &[u8],
        directory: &mut dyn ParameterDirectory,
    ) -> LogResult<TickStatus> {
        let (header, payload) = BridgeHeader::split(frame)?;

        if payload.len() < 3 || payload[0] != RESPONSE_TAG {
            return Err(LogError::UnexpectedResponse(
                payload.first().copied().unwrap_or_default(),
            ));
        }

        if (tick as usize) < self.frame_count() - 1 {
            // Upload echo: 00 followed by the low byte of the slice length
            let expected = self.last_frame_size.map_or(0xFF, |size| (size & 0xFF) as u8);
            if payload[1] != 0x00 || payload[2] != expected {
                return Err(LogError::UnexpectedResponse(payload[2]));
            }
            trace!(tick, "3E upload acknowledged");
            return Ok(TickStatus::Priming);
        }

        self.decode(payload, directory)?;
        Ok(TickStatus::CycleComplete {
            bridge_tick: header.tick,
        })
    }

    fn reset(&mut self) {
        self.plan = PollPlan::default();
        self.last_frame_size = None;
    }
}
