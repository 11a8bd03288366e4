//! Prelude module for common re-exports.
//!
//! ```rust
//! use rig_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, DeviceConfig, LogLevel, RigConfig, RunnerConfig};

// ─── Device Layer ───────────────────────────────────────────────────
pub use crate::device::{
    AxisIndex, AxisState, AxisStatus, DeviceConnector, DeviceError, DeviceHandle,
};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{AXES_PER_DEVICE, DEFAULT_RIG_CONFIG_PATH};
