//! Logging engine errors

use thiserror::Error;

/// Result of one engine step
pub type LogResult<T> = Result<T, LogError>;

/// Tick-level errors returned by the frame codecs and the engine
///
/// Every variant except [`LogError::Timeout`] only concerns the tick that
/// produced it; the caller logs it and keeps polling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogError {
    /// A frame arrived without any bytes
    #[error("Empty frame received")]
    NoFrame,

    /// Bridge header tag bytes did not match
    #[error("Invalid bridge header")]
    HeaderInvalid,

    /// Payload length differs from the size declared in the header
    #[error("Payload size mismatch: header declares {declared} bytes, got {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    /// ECU answered with something other than the expected positive response
    #[error("Unexpected ECU response: 0x{0:02X}")]
    UnexpectedResponse(u8),

    /// Too many consecutive ticks without a frame; polling must stop
    #[error("Response timeout")]
    Timeout,

    /// Response referenced an address with no definition, or ran out of data
    #[error("Unknown parameter at address 0x{0:08X}")]
    UnknownParameter(u32),
}

impl LogError {
    /// Whether this error ends the polling task
    pub fn is_terminal(&self) -> bool {
        matches!(self, LogError::Timeout)
    }
}

/// Errors raised while loading configuration or parameter definitions
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Parse a hex address string to u32
///
/// Accepts formats: "F40C", "0xF40C", "0XD0012400", "d0012400"
pub fn parse_address(s: &str) -> Result<u32, ConfigError> {
    let cleaned = s.trim().trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(cleaned, 16)
        .map_err(|_| ConfigError::Invalid(format!("invalid address: {}", s)))
}
