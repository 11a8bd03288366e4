//! Device control surface and error types.
//!
//! This module defines:
//! - `DeviceHandle` trait - Interface to one physical motor controller
//! - `DeviceConnector` trait - The device layer that acquires handles
//! - `DeviceError` enum - Error types for device operations
//! - `AxisIndex`, `AxisState`, `AxisStatus` - Per-axis vocabulary
//!
//! The scheduler itself only ever issues one call through this surface:
//! commanding axes to [`AxisState::Idle`] when securing the rig after a
//! failure. Everything else is used by test bodies.

use crate::config::DeviceConfig;
use crate::consts::AXES_PER_DEVICE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error types for device operations.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// The device could not be found or is no longer reachable.
    #[error("Device not connected: {0}")]
    NotConnected(String),

    /// Communication with the device failed.
    #[error("Device communication error: {0}")]
    CommunicationError(String),

    /// The device refused a requested axis state.
    #[error("{axis} rejected state {requested:?}: {reason}")]
    StateRejected {
        /// Axis that received the request.
        axis: AxisIndex,
        /// Requested state.
        requested: AxisState,
        /// Device-reported reason.
        reason: String,
    },

    /// The axis reported an error code.
    #[error("{axis} reported error {code:#06x}")]
    AxisFault {
        /// Faulting axis.
        axis: AxisIndex,
        /// Device-specific error code.
        code: u32,
    },
}

/// One of the two axes of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AxisIndex {
    /// First axis (`axis0`).
    Axis0,
    /// Second axis (`axis1`).
    Axis1,
}

impl AxisIndex {
    /// Both axes in device order.
    pub const ALL: [AxisIndex; AXES_PER_DEVICE] = [AxisIndex::Axis0, AxisIndex::Axis1];

    /// Numeric position on the device.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::Axis0 => 0,
            Self::Axis1 => 1,
        }
    }
}

impl fmt::Display for AxisIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "axis{}", self.index())
    }
}

/// Requested or current axis state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AxisState {
    /// State not reported yet.
    #[default]
    Undefined,
    /// Motor de-energized. The only state the scheduler ever requests.
    Idle,
    /// Phase resistance/inductance measurement.
    MotorCalibration,
    /// Encoder offset search.
    EncoderOffsetCalibration,
    /// Closed-loop position/velocity control.
    ClosedLoopControl,
}

/// Snapshot of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisStatus {
    /// Current state.
    pub state: AxisState,
    /// Axis error code (0 = no error).
    pub error: u32,
    /// Motor calibration is valid.
    pub motor_calibrated: bool,
    /// Encoder offset is known.
    pub encoder_ready: bool,
    /// Velocity estimate [turn/s].
    pub velocity_estimate: f32,
}

impl AxisStatus {
    /// No error code is latched.
    #[inline]
    pub const fn is_healthy(&self) -> bool {
        self.error == 0
    }
}

/// Handle to one physical motor controller.
///
/// Implementations must be callable from several worker threads at once:
/// device-scope tests and axis-scope tests on both axes share the handle.
pub trait DeviceHandle: Send + Sync {
    /// Whether the device is reachable.
    fn is_connected(&self) -> bool;

    /// Read the status of one axis.
    fn axis_status(&self, axis: AxisIndex) -> Result<AxisStatus, DeviceError>;

    /// Request a state transition on one axis.
    fn request_state(&self, axis: AxisIndex, state: AxisState) -> Result<(), DeviceError>;

    /// Set the velocity setpoint used in closed-loop control [turn/s].
    fn set_input_velocity(&self, axis: AxisIndex, velocity: f32) -> Result<(), DeviceError>;

    /// Set the motor current limit [A].
    fn set_current_limit(&self, axis: AxisIndex, amps: f32) -> Result<(), DeviceError>;

    /// Erase the stored configuration, including calibration.
    fn erase_configuration(&self) -> Result<(), DeviceError>;

    /// Persist the current configuration.
    fn save_configuration(&self) -> Result<(), DeviceError>;

    /// Reboot the device and wait until it is reachable again.
    fn reboot(&self) -> Result<(), DeviceError>;
}

/// The external device layer: turns a device entry of the rig description
/// into a live handle.
pub trait DeviceConnector: Send + Sync {
    /// Connector identifier (e.g. "simulation").
    fn name(&self) -> &'static str;

    /// Acquire a handle for the named device.
    fn connect(
        &self,
        name: &str,
        config: &DeviceConfig,
    ) -> Result<Arc<dyn DeviceHandle>, DeviceError>;
}

/// Factory function type for creating connector instances.
pub type ConnectorFactory = fn() -> Box<dyn DeviceConnector>;
