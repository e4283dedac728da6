//! Engine configuration
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! timeout_ticks = 10
//!
//! [logging]
//! prefix = "simoslogger"
//! invert_gate = false
//!
//! [vehicle]
//! curb_weight_kg = 1500.0
//! gear_ratios = [2.92, 1.79, 1.14, 0.78, 0.58, 0.46, 0.0]
//!
//! [discovery.mode_22]
//! torque = "0x437C"
//! engine_speed = "0xF40C"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryTable;
use crate::error::ConfigError;
use crate::mode::LoggingMode;

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Consecutive frame-less ticks before polling is declared dead
    #[serde(default = "default_timeout_ticks")]
    pub timeout_ticks: u32,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub vehicle: VehicleConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_ticks: default_timeout_ticks(),
            logging: LoggingConfig::default(),
            vehicle: VehicleConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ticks == 0 {
            return Err(ConfigError::Invalid(
                "timeout_ticks must be at least 1".to_string(),
            ));
        }
        if self.logging.prefix.is_empty() {
            return Err(ConfigError::Invalid("logging.prefix is empty".to_string()));
        }
        if self.vehicle.gear_ratios.is_empty() {
            return Err(ConfigError::Invalid(
                "vehicle.gear_ratios needs at least one gear".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_timeout_ticks() -> u32 {
    10
}

// =============================================================================
// Logging
// =============================================================================

/// CSV session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// File name prefix, followed by `-yyyy_MM_dd-HH_mm_ss.csv`
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Log while the gating parameter is zero instead of non-zero
    #[serde(default)]
    pub invert_gate: bool,
    /// Bridge ticks below this value never log
    #[serde(default = "default_ramp_up_ticks")]
    pub ramp_up_ticks: u32,
    /// Written in place of the gating parameter's column header
    #[serde(default = "default_revision")]
    pub revision: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            invert_gate: false,
            ramp_up_ticks: default_ramp_up_ticks(),
            revision: default_revision(),
        }
    }
}

fn default_prefix() -> String {
    "simoslogger".to_string()
}

fn default_ramp_up_ticks() -> u32 {
    50
}

fn default_revision() -> String {
    "SimosTools [R1:Aaron loves:Pops'n'Bangs]".to_string()
}

// =============================================================================
// Vehicle
// =============================================================================

/// Vehicle constants for torque and horsepower
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleConfig {
    /// Master switch for derived metrics
    #[serde(default = "default_true")]
    pub calculate_hp: bool,
    /// Prefer the acceleration-based torque model when its inputs exist
    #[serde(default = "default_true")]
    pub use_physics_torque: bool,
    #[serde(default = "default_curb_weight")]
    pub curb_weight_kg: f32,
    #[serde(default = "default_tire_diameter")]
    pub tire_diameter_m: f32,
    #[serde(default = "default_drag_coefficient")]
    pub drag_coefficient: f32,
    /// Ratios for gears 1..=7
    #[serde(default = "default_gear_ratios")]
    pub gear_ratios: Vec<f32>,
    #[serde(default = "default_final_drive")]
    pub final_drive: f32,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            calculate_hp: true,
            use_physics_torque: true,
            curb_weight_kg: default_curb_weight(),
            tire_diameter_m: default_tire_diameter(),
            drag_coefficient: default_drag_coefficient(),
            gear_ratios: default_gear_ratios(),
            final_drive: default_final_drive(),
        }
    }
}

impl VehicleConfig {
    pub fn tire_circumference(&self) -> f32 {
        self.tire_diameter_m * 3.14
    }

    /// Ratio for a 1-based gear, `None` outside the configured gears
    pub fn gear_ratio(&self, gear: i32) -> Option<f32> {
        if gear < 1 {
            return None;
        }
        self.gear_ratios.get(gear as usize - 1).copied()
    }
}

fn default_true() -> bool {
    true
}

fn default_curb_weight() -> f32 {
    1500.0
}

fn default_tire_diameter() -> f32 {
    0.632
}

fn default_drag_coefficient() -> f32 {
    1500.0
}

fn default_gear_ratios() -> Vec<f32> {
    vec![2.92, 1.79, 1.14, 0.78, 0.58, 0.46, 0.0]
}

fn default_final_drive() -> f32 {
    4.77
}

// =============================================================================
// Discovery
// =============================================================================

/// Role to address tables, one per mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "DiscoveryTable::service_read_defaults")]
    pub mode_22: DiscoveryTable,
    #[serde(default = "DiscoveryTable::extended_memory_defaults")]
    pub mode_3e: DiscoveryTable,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mode_22: DiscoveryTable::service_read_defaults(),
            mode_3e: DiscoveryTable::extended_memory_defaults(),
        }
    }
}

impl DiscoveryConfig {
    pub fn table(&self, mode: LoggingMode) -> &DiscoveryTable {
        match mode {
            LoggingMode::ServiceRead => &self.mode_22,
            LoggingMode::ExtendedMemory => &self.mode_3e,
        }
    }
}

/// Serde adapter for addresses written as hex strings or plain integers
pub(crate) mod hex_address {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::error::parse_address;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u32),
        Text(String),
    }

    fn resolve<E: serde::de::Error>(raw: Raw) -> Result<u32, E> {
        match raw {
            Raw::Int(v) => Ok(v),
            Raw::Text(s) => parse_address(&s).map_err(E::custom),
        }
    }

    pub fn serialize<S: Serializer>(value: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{:X}", value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        resolve(Raw::deserialize(deserializer)?)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<u32>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => super::serialize(v, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<u32>, D::Error> {
            Option::<Raw>::deserialize(deserializer)?
                .map(resolve::<D::Error>)
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.timeout_ticks, 10);
        assert_eq!(config.logging.prefix, "simoslogger");
        assert_eq!(config.logging.ramp_up_ticks, 50);
        assert!(!config.logging.invert_gate);
        assert!(config.vehicle.calculate_hp);
        assert_eq!(config.vehicle.gear_ratios.len(), 7);
        assert_eq!(config.discovery.mode_22.engine_speed, Some(0xF40C));
        assert_eq!(config.discovery.mode_3e.gear, Some(0xD000_F39A));
    }

    #[test]
    fn test_parse_sections() {
        let toml = r#"
            timeout_ticks = 4

            [logging]
            prefix = "track"
            invert_gate = true

            [vehicle]
            curb_weight_kg = 1320.0
            final_drive = 3.9

            [discovery.mode_22]
            torque = "0x1234"
            engine_speed = 0xF40C
        "#;
        let config = EngineConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.timeout_ticks, 4);
        assert_eq!(config.logging.prefix, "track");
        assert!(config.logging.invert_gate);
        assert_eq!(config.vehicle.curb_weight_kg, 1320.0);
        assert_eq!(config.vehicle.final_drive, 3.9);
        assert_eq!(config.discovery.mode_22.torque, Some(0x1234));
        assert_eq!(config.discovery.mode_22.engine_speed, Some(0xF40C));
        assert_eq!(config.discovery.mode_22.gear, None);
        // Untouched section keeps its defaults
        assert_eq!(config.discovery.mode_3e.torque, Some(0xD001_5344));
    }

    #[test]
    fn test_validation() {
        assert!(EngineConfig::from_toml_str("timeout_ticks = 0").is_err());
        assert!(EngineConfig::from_toml_str("[vehicle]\ngear_ratios = []").is_err());
        assert!(EngineConfig::from_toml_str("[discovery.mode_22]\ntorque = \"zz\"").is_err());
    }

    #[test]
    fn test_gear_ratio_lookup() {
        let vehicle = VehicleConfig::default();
        assert_eq!(vehicle.gear_ratio(1), Some(2.92));
        assert_eq!(vehicle.gear_ratio(7), Some(0.0));
        assert_eq!(vehicle.gear_ratio(0), None);
        assert_eq!(vehicle.gear_ratio(8), None);
        assert!((vehicle.tire_circumference() - 1.98448).abs() < 1e-5);
    }
}
