//! Parameter directory
//!
//! Definitions are read-only rows describing what to poll; values are the
//! index-aligned mutable table the engine writes decoded readings into.
//! Both exist once per logging mode.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::hex_address;
use crate::error::ConfigError;
use crate::mode::LoggingMode;

/// One polled measurement channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidDefinition {
    pub name: String,
    #[serde(default)]
    pub unit: String,
    /// Display format, e.g. "%01.1f"
    #[serde(default = "default_format")]
    pub format: String,
    /// ECU address; the mode's sentinel marks a virtual parameter
    #[serde(with = "hex_address")]
    pub address: u32,
    /// Value width in bytes (1, 2 or 4)
    #[serde(default = "default_length")]
    pub length: u8,
    #[serde(default)]
    pub signed: bool,
    #[serde(default)]
    pub prog_min: f32,
    #[serde(default = "default_prog_max")]
    pub prog_max: f32,
    #[serde(default = "default_warn_min")]
    pub warn_min: f32,
    #[serde(default = "default_warn_max")]
    pub warn_max: f32,
    /// Exponential smoothing factor in [0, 1), 0 disables smoothing
    #[serde(default)]
    pub smoothing: f32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_format() -> String {
    "%01.2f".to_string()
}

fn default_length() -> u8 {
    2
}

fn default_prog_max() -> f32 {
    100.0
}

fn default_warn_min() -> f32 {
    f32::MIN
}

fn default_warn_max() -> f32 {
    f32::MAX
}

fn default_enabled() -> bool {
    true
}

impl PidDefinition {
    /// Enabled unsigned parameter with default display metadata
    pub fn new(name: impl Into<String>, address: u32, length: u8) -> Self {
        Self {
            name: name.into(),
            unit: String::new(),
            format: default_format(),
            address,
            length,
            signed: false,
            prog_min: 0.0,
            prog_max: default_prog_max(),
            warn_min: default_warn_min(),
            warn_max: default_warn_max(),
            smoothing: 0.0,
            enabled: true,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_warn(mut self, min: f32, max: f32) -> Self {
        self.warn_min = min;
        self.warn_max = max;
        self
    }

    pub fn with_smoothing(mut self, factor: f32) -> Self {
        self.smoothing = factor;
        self
    }

    /// Column header used in CSV sessions
    pub fn column_name(&self) -> String {
        format!("{} ({})", self.name, self.unit)
    }

    fn validate(&self, mode: LoggingMode) -> Result<(), ConfigError> {
        if !matches!(self.length, 1 | 2 | 4) {
            return Err(ConfigError::Invalid(format!(
                "{}: length must be 1, 2 or 4, got {}",
                self.name, self.length
            )));
        }
        if !mode.address_range().contains(&self.address) {
            return Err(ConfigError::Invalid(format!(
                "{}: address 0x{:X} outside {} range",
                self.name, self.address, mode
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(ConfigError::Invalid(format!(
                "{}: smoothing must be in [0, 1)",
                self.name
            )));
        }
        Ok(())
    }
}

/// Latest reading of one parameter plus its rolling statistics
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PidValue {
    pub value: f32,
    pub min: f32,
    pub max: f32,
    pub smoothed: f32,
    /// Value left the definition's warn window at the last commit
    pub warn: bool,
    /// Committed cycles since the table was reset
    pub samples: u32,
}

impl PidValue {
    fn commit(&mut self, def: &PidDefinition) {
        if self.samples == 0 {
            self.min = self.value;
            self.max = self.value;
            self.smoothed = self.value;
        } else {
            self.min = self.min.min(self.value);
            self.max = self.max.max(self.value);
            self.smoothed += (self.value - self.smoothed) * (1.0 - def.smoothing);
        }
        self.warn = self.value < def.warn_min || self.value > def.warn_max;
        self.samples = self.samples.saturating_add(1);
    }
}

/// Source of parameter definitions and sink for decoded values
///
/// The engine only reads definitions and writes values through
/// [`ParameterDirectory::set_value`]; statistics are the directory's job
/// and are refreshed by [`ParameterDirectory::commit_cycle`].
pub trait ParameterDirectory: Send {
    fn definitions(&self, mode: LoggingMode) -> &[PidDefinition];

    fn values(&self, mode: LoggingMode) -> &[PidValue];

    /// Store a decoded reading; out-of-range indices are ignored
    fn set_value(&mut self, mode: LoggingMode, index: usize, raw: f32);

    /// Recompute bounds, smoothing and warn flags after a complete cycle
    fn commit_cycle(&mut self, mode: LoggingMode);

    /// Index of the first definition at `address`
    fn lookup(&self, mode: LoggingMode, address: u32) -> Option<usize> {
        self.definitions(mode)
            .iter()
            .position(|d| d.address == address)
    }

    fn value(&self, mode: LoggingMode, index: usize) -> Option<f32> {
        self.values(mode).get(index).map(|v| v.value)
    }
}

/// On-disk layout of a definition file
#[derive(Debug, Default, Serialize, Deserialize)]
struct DefinitionFile {
    #[serde(default)]
    mode_22: Vec<PidDefinition>,
    #[serde(default)]
    mode_3e: Vec<PidDefinition>,
}

/// In-memory directory holding both modes' tables
#[derive(Debug, Clone, Default)]
pub struct ParameterTable {
    service_read: Vec<PidDefinition>,
    extended_memory: Vec<PidDefinition>,
    service_read_values: Vec<PidValue>,
    extended_memory_values: Vec<PidValue>,
}

impl ParameterTable {
    /// Build a table from definition lists, validating every row
    pub fn with_definitions(
        service_read: Vec<PidDefinition>,
        extended_memory: Vec<PidDefinition>,
    ) -> Result<Self, ConfigError> {
        for def in &service_read {
            def.validate(LoggingMode::ServiceRead)?;
        }
        for def in &extended_memory {
            def.validate(LoggingMode::ExtendedMemory)?;
        }

        Ok(Self {
            service_read_values: vec![PidValue::default(); service_read.len()],
            extended_memory_values: vec![PidValue::default(); extended_memory.len()],
            service_read,
            extended_memory,
        })
    }

    /// Load definitions from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load definitions from a YAML string with `mode_22` / `mode_3e` lists
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let file: DefinitionFile = serde_yaml::from_str(yaml)?;
        Self::with_definitions(file.mode_22, file.mode_3e)
    }

    /// Enable or disable one parameter by index
    pub fn set_enabled(&mut self, mode: LoggingMode, index: usize, enabled: bool) {
        let defs = match mode {
            LoggingMode::ServiceRead => &mut self.service_read,
            LoggingMode::ExtendedMemory => &mut self.extended_memory,
        };
        if let Some(def) = defs.get_mut(index) {
            def.enabled = enabled;
        }
    }

    fn values_mut(&mut self, mode: LoggingMode) -> &mut Vec<PidValue> {
        match mode {
            LoggingMode::ServiceRead => &mut self.service_read_values,
            LoggingMode::ExtendedMemory => &mut self.extended_memory_values,
        }
    }
}

impl ParameterDirectory for ParameterTable {
    fn definitions(&self, mode: LoggingMode) -> &[PidDefinition] {
        match mode {
            LoggingMode::ServiceRead => &self.service_read,
            LoggingMode::ExtendedMemory => &self.extended_memory,
        }
    }

    fn values(&self, mode: LoggingMode) -> &[PidValue] {
        match mode {
            LoggingMode::ServiceRead => &self.service_read_values,
            LoggingMode::ExtendedMemory => &self.extended_memory_values,
        }
    }

    fn set_value(&mut self, mode: LoggingMode, index: usize, raw: f32) {
        if let Some(slot) = self.values_mut(mode).get_mut(index) {
            slot.value = raw;
        }
    }

    fn commit_cycle(&mut self, mode: LoggingMode) {
        let (defs, values) = match mode {
            LoggingMode::ServiceRead => (&self.service_read, &mut self.service_read_values),
            LoggingMode::ExtendedMemory => {
                (&self.extended_memory, &mut self.extended_memory_values)
            }
        };
        for (def, value) in defs.iter().zip(values.iter_mut()) {
            if def.enabled {
                value.commit(def);
            }
        }
    }
}
