//! Logging modes exposed by the ECU's diagnostic service

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Wire-incompatible logging mode
///
/// `ServiceRead` polls through ReadDataByIdentifier (0x22) with 16-bit
/// addresses, `ExtendedMemory` uploads a 32-bit address list through the
/// 0x3E extension and reads it back as one positional block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoggingMode {
    #[serde(rename = "22", alias = "service_read")]
    ServiceRead,
    #[serde(rename = "3E", alias = "3e", alias = "extended_memory")]
    ExtendedMemory,
}

impl LoggingMode {
    pub const ALL: [LoggingMode; 2] = [LoggingMode::ServiceRead, LoggingMode::ExtendedMemory];

    /// Address marking a virtual parameter (never transmitted)
    pub fn sentinel(self) -> u32 {
        match self {
            LoggingMode::ServiceRead => 0xFFFF,
            LoggingMode::ExtendedMemory => 0xFFFF_FFFF,
        }
    }

    /// Addresses the ECU accepts in this mode
    pub fn address_range(self) -> RangeInclusive<u32> {
        match self {
            LoggingMode::ServiceRead => 0x1000..=0xFFFF,
            LoggingMode::ExtendedMemory => 0x1000_0000..=0xFFFF_FFFF,
        }
    }

    /// Short name used in configuration files and log output
    pub fn config_name(self) -> &'static str {
        match self {
            LoggingMode::ServiceRead => "22",
            LoggingMode::ExtendedMemory => "3E",
        }
    }

    pub fn is_virtual(self, address: u32) -> bool {
        address == self.sentinel()
    }
}

impl fmt::Display for LoggingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mode {}", self.config_name())
    }
}

impl std::str::FromStr for LoggingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "22" | "service_read" | "service-read" => Ok(LoggingMode::ServiceRead),
            "3e" | "extended_memory" | "extended-memory" => Ok(LoggingMode::ExtendedMemory),
            other => Err(format!("unknown logging mode: {}", other)),
        }
    }
}
