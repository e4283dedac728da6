//! Metric input discovery
//!
//! Derived metrics need a handful of well-known ECU measurements. Which
//! addresses carry them depends on the firmware, so the role to address
//! mapping is configuration data; the active parameter directory is scanned
//! for those addresses whenever a mode is (re)selected.

use serde::{Deserialize, Serialize};

use crate::config::hex_address;
use crate::directory::PidDefinition;

/// Addresses of the parameters feeding the metrics calculator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryTable {
    #[serde(default, with = "hex_address::option")]
    pub torque: Option<u32>,
    #[serde(default, with = "hex_address::option")]
    pub engine_speed: Option<u32>,
    /// Acceleration-like signal used by the physics torque model
    #[serde(default, with = "hex_address::option")]
    pub secondary_signal: Option<u32>,
    #[serde(default, with = "hex_address::option")]
    pub gear: Option<u32>,
    #[serde(default, with = "hex_address::option")]
    pub road_speed: Option<u32>,
}

impl DiscoveryTable {
    pub fn service_read_defaults() -> Self {
        Self {
            torque: Some(0x437C),
            engine_speed: Some(0xF40C),
            ..Default::default()
        }
    }

    pub fn extended_memory_defaults() -> Self {
        Self {
            torque: Some(0xD001_5344),
            engine_speed: Some(0xD001_2400),
            secondary_signal: Some(0xD001_41BA),
            gear: Some(0xD000_F39A),
            road_speed: Some(0xD001_55B6),
        }
    }

    /// Scan definitions for every configured role
    ///
    /// When an address appears more than once the last row wins.
    pub fn discover(&self, definitions: &[PidDefinition]) -> DiscoveredPids {
        let find = |role: Option<u32>| {
            role.and_then(|address| definitions.iter().rposition(|d| d.address == address))
        };

        DiscoveredPids {
            torque: find(self.torque),
            engine_speed: find(self.engine_speed),
            secondary_signal: find(self.secondary_signal),
            gear: find(self.gear),
            road_speed: find(self.road_speed),
        }
    }
}

/// Directory indices found for each role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveredPids {
    pub torque: Option<usize>,
    pub engine_speed: Option<usize>,
    pub secondary_signal: Option<usize>,
    pub gear: Option<usize>,
    pub road_speed: Option<usize>,
}

impl DiscoveredPids {
    /// Engine speed plus raw torque are present
    pub fn has_direct_torque(&self) -> bool {
        self.engine_speed.is_some() && self.torque.is_some()
    }

    /// Engine speed, secondary signal, gear and road speed are present
    pub fn has_physics_inputs(&self) -> bool {
        self.engine_speed.is_some()
            && self.secondary_signal.is_some()
            && self.gear.is_some()
            && self.road_speed.is_some()
    }
}

/// How torque is obtained for the active mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorqueSource {
    /// No usable inputs, metrics stay at zero
    None,
    /// Raw torque parameter
    Direct { torque: usize },
    /// Derived from acceleration, gear and road speed
    Physics {
        secondary_signal: usize,
        gear: usize,
        road_speed: usize,
    },
}

impl TorqueSource {
    /// Pick the torque model
    ///
    /// The physics model is preferred when it is opted in and all of its
    /// inputs were found; the direct model is the fallback.
    pub fn select(found: &DiscoveredPids, prefer_physics: bool) -> Self {
        if prefer_physics && found.has_physics_inputs() {
            if let (Some(secondary_signal), Some(gear), Some(road_speed)) =
                (found.secondary_signal, found.gear, found.road_speed)
            {
                return TorqueSource::Physics {
                    secondary_signal,
                    gear,
                    road_speed,
                };
            }
        }

        match found.torque {
            Some(torque) if found.has_direct_torque() => TorqueSource::Direct { torque },
            _ => TorqueSource::None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TorqueSource::None => "none",
            TorqueSource::Direct { .. } => "direct",
            TorqueSource::Physics { .. } => "physics",
        }
    }
}
