//! Rig configuration model and TOML loading.
//!
//! The rig description lists the devices attached to the test rig, the
//! mechanical couplings between their axes, and the names to leave out of
//! the run. The scheduler consumes it already deserialized.
//!
//! # Usage
//!
//! ```rust,no_run
//! use rig_common::config::{ConfigLoader, RigConfig, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let rig = RigConfig::load(Path::new("test-rig.toml"))?;
//!     rig.validate()?;
//!     println!("{} devices", rig.devices.len());
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::consts::{DEFAULT_DRIVER, default_device_name};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// One device entry of the rig description.
///
/// Everything except `name` is opaque to the scheduler and is handed to
/// the device connector untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name. Unnamed devices are called `odrive{index}`.
    #[serde(default)]
    pub name: Option<String>,

    /// Programmer / connection descriptor.
    #[serde(default)]
    pub programmer: Option<String>,

    /// Serial number used by the connector to find the device.
    #[serde(default)]
    pub serial_number: Option<String>,
}

impl DeviceConfig {
    /// Name of this device given its position in the rig description.
    pub fn resolved_name(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| default_device_name(index))
    }
}

/// Runner behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Name of the device connector used to reach the devices.
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Drive every device to idle after a failure.
    #[serde(default = "default_true")]
    pub secure_after_failure: bool,

    /// Explicit test plan (catalog names, in order). Overrides the built-in plans.
    #[serde(default)]
    pub tests: Option<Vec<String>>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            driver: default_driver(),
            secure_after_failure: true,
            tests: None,
        }
    }
}

fn default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

fn default_true() -> bool {
    true
}

/// Complete rig description.
///
/// # TOML Example
///
/// ```toml
/// couplings = [["odrive0.axis0", "odrive1.axis0"]]
///
/// [runner]
/// log_level = "debug"
///
/// [[devices]]
/// name = "odrive0"
/// programmer = "stlink-0"
///
/// [[devices]]
/// programmer = "stlink-1"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RigConfig {
    /// Runner behaviour.
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Devices in rig order.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Groups of qualified axis names that are mechanically linked.
    #[serde(default)]
    pub couplings: Vec<Vec<String>>,

    /// Device or axis names left out of the run.
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl RigConfig {
    /// Validate the configuration.
    ///
    /// Coupling references are deliberately not checked here: unknown axes
    /// are dropped when couplings are resolved.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - a device has an explicit empty name
    /// - two devices resolve to the same name
    /// - `runner.driver` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.driver.is_empty() {
            return Err(ConfigError::ValidationError(
                "runner.driver cannot be empty".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for (idx, device) in self.devices.iter().enumerate() {
            if device.name.as_deref() == Some("") {
                return Err(ConfigError::ValidationError(format!(
                    "device #{idx} has an empty name"
                )));
            }
            let name = device.resolved_name(idx);
            if !names.insert(name.clone()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate device name: {name}"
                )));
            }
        }

        debug!(
            "Rig config valid: {} devices, {} couplings, {} ignored",
            self.devices.len(),
            self.couplings.len(),
            self.ignore.len()
        );
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Any serde-deserializable struct can be loaded from TOML.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
