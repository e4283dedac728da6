//! ReadDataByIdentifier (0x22) polling
//!
//! The address list is split across several `0x22` requests which the
//! bridge stores and replays periodically. Responses repeat each address in
//! front of its value, so decoding does not depend on request order.

use bytes::{BufMut, BytesMut};
use tracing::{debug, trace};

use super::{enabled_indices, FrameCodec, PollPlan, TickStatus};
use crate::directory::{ParameterDirectory, PidDefinition};
use crate::error::{LogError, LogResult};
use crate::header::{encode_frame, BridgeHeader, CommandFlags};
use crate::mode::LoggingMode;

/// ReadDataByIdentifier request SID
pub const REQUEST_SID: u8 = 0x22;
/// Positive response SID
pub const RESPONSE_SID: u8 = 0x62;
/// Address bytes carried by one request frame
pub const ADDRESS_BYTES_PER_FRAME: usize = 16;

const MODE: LoggingMode = LoggingMode::ServiceRead;

#[derive(Debug, Default)]
pub struct ServiceReadCodec {
    plan: PollPlan,
}

impl ServiceReadCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn plan_for(definitions: &[PidDefinition]) -> PollPlan {
        let enabled = enabled_indices(definitions);
        let mut request = BytesMut::with_capacity(enabled.len() * 2);
        for &i in &enabled {
            let def = &definitions[i];
            if !MODE.is_virtual(def.address) {
                request.put_u16(def.address as u16);
            }
        }

        PollPlan {
            enabled,
            request: request.to_vec(),
        }
    }

    fn zero_virtual(&self, directory: &mut dyn ParameterDirectory) {
        let virtual_rows: Vec<usize> = self
            .plan
            .enabled
            .iter()
            .copied()
            .filter(|&i| {
                directory
                    .definitions(MODE)
                    .get(i)
                    .is_some_and(|d| MODE.is_virtual(d.address))
            })
            .collect();
        for i in virtual_rows {
            directory.set_value(MODE, i, 0.0);
        }
    }
}

/// Decode a big-endian value of `def.length` bytes
fn decode_value(def: &PidDefinition, bytes: &[u8]) -> f32 {
    match (bytes.len(), def.signed) {
        (1, true) => bytes[0] as i8 as f32,
        (1, false) => bytes[0] as f32,
        (2, true) => i16::from_be_bytes([bytes[0], bytes[1]]) as f32,
        (2, false) => u16::from_be_bytes([bytes[0], bytes[1]]) as f32,
        (4, true) => i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
        (4, false) => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
        _ => 0.0,
    }
}

impl FrameCodec for ServiceReadCodec {
    fn mode(&self) -> LoggingMode {
        MODE
    }

    fn frame_count(&self) -> usize {
        self.plan.request.len().div_ceil(ADDRESS_BYTES_PER_FRAME).max(1)
    }

    fn plan(&self) -> &PollPlan {
        &self.plan
    }

    fn prepare(&mut self, directory: &dyn ParameterDirectory) {
        self.plan = Self::plan_for(directory.definitions(MODE));
        debug!(
            enabled = self.plan.enabled.len(),
            frames = self.frame_count(),
            "Prepared 22 poll plan"
        );
    }

    fn build(&mut self, step: usize, directory: &dyn ParameterDirectory) -> Vec<u8> {
        if step == 0 {
            self.prepare(directory);
        }

        let frame_count = self.frame_count();
        if step >= frame_count {
            debug!(step, "22 frame does not exist");
            return Vec::new();
        }

        let flags = if step == 0 {
            CommandFlags::CLEAR | CommandFlags::ADD
        } else if step == frame_count - 1 {
            CommandFlags::ADD | CommandFlags::ENABLE
        } else {
            CommandFlags::ADD
        };

        let len = self.plan.request.len();
        let start = (step * ADDRESS_BYTES_PER_FRAME).min(len);
        let end = (start + ADDRESS_BYTES_PER_FRAME).min(len);

        let mut payload = Vec::with_capacity(1 + end - start);
        payload.push(REQUEST_SID);
        payload.extend_from_slice(&self.plan.request[start..end]);

        let frame = encode_frame(flags, 0, &payload);
        debug!(step, frame = %hex::encode(&frame), "Built 22 frame");
        frame
    }

    fn parse(
        &mut self,
        tick: u32,
        frame: &[u8],
        directory: &mut dyn ParameterDirectory,
    ) -> LogResult<TickStatus> {
        let (header, payload) = BridgeHeader::split(frame)?;

        match payload.first() {
            Some(&RESPONSE_SID) => {}
            Some(&other) => return Err(LogError::UnexpectedResponse(other)),
            None => return Err(LogError::UnexpectedResponse(0)),
        }

        let frame_count = self.frame_count();
        if (tick as usize) < frame_count {
            trace!(tick, "22 priming response");
            return Ok(TickStatus::Priming);
        }

        let mut pos = 1;
        while pos + 3 <= payload.len() {
            let address = u16::from_be_bytes([payload[pos], payload[pos + 1]]) as u32;
            pos += 2;

            let index = directory
                .lookup(MODE, address)
                .ok_or(LogError::UnknownParameter(address))?;
            let def = &directory.definitions(MODE)[index];
            let width = def.length as usize;
            if pos + width > payload.len() {
                return Err(LogError::SizeMismatch {
                    declared: pos + width,
                    actual: payload.len(),
                });
            }

            let value = decode_value(def, &payload[pos..pos + width]);
            pos += width;
            directory.set_value(MODE, index, value);
        }

        self.zero_virtual(directory);

        if tick as usize % frame_count == 0 {
            Ok(TickStatus::CycleComplete {
                bridge_tick: header.tick,
            })
        } else {
            Ok(TickStatus::Partial)
        }
    }

    fn reset(&mut self) {
        self.plan = PollPlan::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ParameterTable;
    use crate::testing::service_read_response;
    use pretty_assertions::assert_eq;

    fn table(defs: Vec<PidDefinition>) -> ParameterTable {
        ParameterTable::with_definitions(defs, vec![]).unwrap()
    }

    fn numbered(n: usize) -> Vec<PidDefinition> {
        (0..n)
            .map(|i| PidDefinition::new(format!("p{}", i), 0x2000 + i as u32, 2))
            .collect()
    }

    fn build_all(codec: &mut ServiceReadCodec, dir: &ParameterTable) -> Vec<Vec<u8>> {
        let first = codec.build(0, dir);
        let mut frames = vec![first];
        for step in 1..codec.frame_count() {
            frames.push(codec.build(step, dir));
        }
        frames
    }

    #[test]
    fn test_frame_count_follows_address_bytes() {
        for (n, expected) in [(0, 1), (1, 1), (8, 1), (9, 2), (16, 2), (17, 3), (40, 5)] {
            let dir = table(numbered(n));
            let mut codec = ServiceReadCodec::new();
            codec.build(0, &dir);
            assert_eq!(codec.frame_count(), expected, "{} parameters", n);
        }
    }

    #[test]
    fn test_frames_concatenate_to_address_sequence() {
        let dir = table(numbered(20));
        let mut codec = ServiceReadCodec::new();
        let frames = build_all(&mut codec, &dir);
        assert_eq!(frames.len(), 3);

        let mut addresses = Vec::new();
        for frame in &frames {
            let (_, payload) = BridgeHeader::split(frame).unwrap();
            assert_eq!(payload[0], REQUEST_SID);
            addresses.extend_from_slice(&payload[1..]);
        }

        let expected: Vec<u8> = (0..20u16).flat_map(|i| (0x2000 + i).to_be_bytes()).collect();
        assert_eq!(addresses, expected);
    }

    #[test]
    fn test_flags_per_step() {
        let dir = table(numbered(20));
        let mut codec = ServiceReadCodec::new();
        let frames = build_all(&mut codec, &dir);
        let flags: Vec<CommandFlags> = frames
            .iter()
            .map(|f| BridgeHeader::split(f).unwrap().0.flags)
            .collect();
        assert_eq!(
            flags,
            vec![
                CommandFlags::CLEAR | CommandFlags::ADD,
                CommandFlags::ADD,
                CommandFlags::ADD | CommandFlags::ENABLE,
            ]
        );
    }

    #[test]
    fn test_single_frame_plan_is_first_frame() {
        let dir = table(vec![PidDefinition::new("Engine speed", 0xF40C, 2)]);
        let mut codec = ServiceReadCodec::new();
        let frame = codec.build(0, &dir);
        assert_eq!(codec.frame_count(), 1);
        assert_eq!(frame[2], (CommandFlags::CLEAR | CommandFlags::ADD).bits());
        assert_eq!(&frame[8..], &[REQUEST_SID, 0xF4, 0x0C]);
    }

    #[test]
    fn test_out_of_range_step_is_empty() {
        let dir = table(numbered(3));
        let mut codec = ServiceReadCodec::new();
        codec.build(0, &dir);
        assert!(codec.build(1, &dir).is_empty());
        assert!(codec.build(99, &dir).is_empty());
    }

    #[test]
    fn test_build_zero_is_idempotent() {
        let dir = table(numbered(11));
        let mut codec = ServiceReadCodec::new();
        assert_eq!(codec.build(0, &dir), codec.build(0, &dir));
    }

    #[test]
    fn test_virtual_and_disabled_are_not_requested() {
        let dir = table(vec![
            PidDefinition::new("a", 0x2000, 2),
            PidDefinition::new("virtual", 0xFFFF, 2),
            PidDefinition::new("off", 0x2002, 2).disabled(),
            PidDefinition::new("b", 0x2003, 1),
        ]);
        let mut codec = ServiceReadCodec::new();
        let frame = codec.build(0, &dir);
        let (_, payload) = BridgeHeader::split(&frame).unwrap();
        assert_eq!(payload, &[0x22, 0x20, 0x00, 0x20, 0x03]);
        assert_eq!(codec.plan().enabled, vec![0, 1, 3]);
    }

    #[test]
    fn test_round_trip_decode() {
        let mut dir = table(vec![
            PidDefinition::new("rpm", 0xF40C, 2),
            PidDefinition::new("temp", 0x2001, 1).signed(),
            PidDefinition::new("load", 0x2002, 1),
            PidDefinition::new("offset", 0x2003, 2).signed(),
            PidDefinition::new("counter", 0x2004, 4),
        ]);
        let mut codec = ServiceReadCodec::new();
        codec.build(0, &dir);
        assert_eq!(codec.frame_count(), 1);

        let frame = service_read_response(
            60,
            &[
                (0xF40C, &[0x0B, 0xB8]),
                (0x2001, &[0xF6]),
                (0x2002, &[0xC8]),
                (0x2003, &[0xFF, 0x38]),
                (0x2004, &[0x00, 0x01, 0x00, 0x00]),
            ],
        );
        let status = codec.parse(2, &frame, &mut dir).unwrap();
        assert_eq!(status, TickStatus::CycleComplete { bridge_tick: 60 });

        let values: Vec<f32> = dir
            .values(MODE)
            .iter()
            .map(|v| v.value)
            .collect();
        assert_eq!(values, vec![3000.0, -10.0, 200.0, -200.0, 65536.0]);
    }

    #[test]
    fn test_priming_ticks_do_not_decode() {
        let mut dir = table(numbered(9));
        let mut codec = ServiceReadCodec::new();
        codec.build(0, &dir);

        let frame = service_read_response(0, &[(0x2000, &[0x00, 0x05])]);
        assert_eq!(codec.parse(0, &frame, &mut dir), Ok(TickStatus::Priming));
        assert_eq!(codec.parse(1, &frame, &mut dir), Ok(TickStatus::Priming));
        assert_eq!(dir.value(MODE, 0), Some(0.0));

        assert_eq!(codec.parse(3, &frame, &mut dir), Ok(TickStatus::Partial));
        assert_eq!(dir.value(MODE, 0), Some(5.0));
        assert!(codec.parse(4, &frame, &mut dir).unwrap().is_cycle_complete());
    }

    #[test]
    fn test_virtual_parameters_are_zeroed() {
        let mut dir = table(vec![
            PidDefinition::new("a", 0x2000, 2),
            PidDefinition::new("virtual", 0xFFFF, 2),
        ]);
        dir.set_value(MODE, 1, 42.0);
        let mut codec = ServiceReadCodec::new();
        codec.build(0, &dir);

        let frame = service_read_response(1, &[(0x2000, &[0x00, 0x01])]);
        codec.parse(1, &frame, &mut dir).unwrap();
        assert_eq!(dir.value(MODE, 1), Some(0.0));
    }

    #[test]
    fn test_parse_errors() {
        let mut dir = table(numbered(2));
        let mut codec = ServiceReadCodec::new();
        codec.build(0, &dir);

        let mut bad_tag = service_read_response(1, &[]);
        bad_tag[0] = 0x00;
        assert_eq!(
            codec.parse(1, &bad_tag, &mut dir),
            Err(LogError::HeaderInvalid)
        );

        let negative = encode_frame(CommandFlags::empty(), 1, &[0x7F, 0x22, 0x31]);
        assert_eq!(
            codec.parse(1, &negative, &mut dir),
            Err(LogError::UnexpectedResponse(0x7F))
        );

        let unknown = service_read_response(1, &[(0x3000, &[0x00, 0x01])]);
        assert_eq!(
            codec.parse(1, &unknown, &mut dir),
            Err(LogError::UnknownParameter(0x3000))
        );

        // Two-byte parameter with only one value byte left
        let truncated = encode_frame(CommandFlags::empty(), 1, &[0x62, 0x20, 0x00, 0x01]);
        assert_eq!(
            codec.parse(1, &truncated, &mut dir),
            Err(LogError::SizeMismatch {
                declared: 5,
                actual: 4
            })
        );
    }

    #[test]
    fn test_reset_clears_plan() {
        let dir = table(numbered(3));
        let mut codec = ServiceReadCodec::new();
        codec.build(0, &dir);
        assert!(!codec.plan().is_empty());
        codec.reset();
        assert!(codec.plan().is_empty());
    }
}
