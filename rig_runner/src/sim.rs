//! Simulated motor controllers.
//!
//! [`SimDevice`] implements [`DeviceHandle`] with instant state transitions
//! and a small calibration model:
//!
//! ```text
//! MotorCalibration          → motor_calibrated = true,  back to Idle
//! EncoderOffsetCalibration  → needs motor_calibrated, encoder_ready = true, back to Idle
//! ClosedLoopControl         → needs both, velocity_estimate follows the setpoint
//! erase_configuration       → clears calibration and the saved copy
//! save_configuration        → persists motor calibration
//! reboot                    → restores the saved motor calibration, encoder must be re-found
//! ```
//!
//! Faults can be injected per device to exercise the failure paths: reject a
//! requested state, latch an axis error code, refuse idle commands, or drop
//! the connection. [`SimConnector`] hands out one `SimDevice` per name and
//! keeps them so callers can inspect or poke them afterwards.

use parking_lot::Mutex;
use rig_common::config::DeviceConfig;
use rig_common::consts::DEFAULT_DRIVER;
use rig_common::device::{
    AxisIndex, AxisState, AxisStatus, DeviceConnector, DeviceError, DeviceHandle,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Simulated state of one axis.
#[derive(Debug, Clone, Copy, Default)]
struct SimAxis {
    state: AxisState,
    error: u32,
    motor_calibrated: bool,
    encoder_ready: bool,
    saved_motor_calibration: bool,
    input_velocity: f32,
    current_limit: f32,
}

impl SimAxis {
    fn status(&self) -> AxisStatus {
        AxisStatus {
            state: self.state,
            error: self.error,
            motor_calibrated: self.motor_calibrated,
            encoder_ready: self.encoder_ready,
            velocity_estimate: if self.state == AxisState::ClosedLoopControl {
                self.input_velocity
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    connected: bool,
    axes: [SimAxis; 2],
    rejected: HashSet<AxisState>,
    fail_idle: bool,
    idle_requests: usize,
    reboots: usize,
}

/// A simulated two-axis controller.
#[derive(Debug)]
pub struct SimDevice {
    name: String,
    state: Mutex<SimState>,
}

impl SimDevice {
    /// Create a connected device with both axes idle and uncalibrated.
    pub fn new(name: impl Into<String>) -> Self {
        let mut state = SimState {
            connected: true,
            ..Default::default()
        };
        for axis in &mut state.axes {
            axis.state = AxisState::Idle;
        }
        Self {
            name: name.into(),
            state: Mutex::new(state),
        }
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    // ─── Fault Injection ────────────────────────────────────────────

    /// Reject every future request for `state` on either axis.
    pub fn reject_state(&self, state: AxisState) {
        self.state.lock().rejected.insert(state);
    }

    /// Make idle commands fail. Used to exercise the critical alarm.
    pub fn fail_idle(&self) {
        self.state.lock().fail_idle = true;
    }

    /// Latch an error code on one axis.
    pub fn inject_axis_error(&self, axis: AxisIndex, code: u32) {
        self.state.lock().axes[axis.index()].error = code;
    }

    /// Drop the connection. Every later call fails with `NotConnected`.
    pub fn disconnect(&self) {
        self.state.lock().connected = false;
    }

    /// Mark both axes fully calibrated, as after a previous successful run.
    pub fn preset_calibrated(&self) {
        let mut state = self.state.lock();
        for axis in &mut state.axes {
            axis.motor_calibrated = true;
            axis.encoder_ready = true;
            axis.saved_motor_calibration = true;
        }
    }

    // ─── Inspection ─────────────────────────────────────────────────

    /// Number of idle commands received so far.
    pub fn idle_requests(&self) -> usize {
        self.state.lock().idle_requests
    }

    /// Number of completed reboots.
    pub fn reboots(&self) -> usize {
        self.state.lock().reboots
    }

    /// Last velocity setpoint of one axis.
    pub fn input_velocity(&self, axis: AxisIndex) -> f32 {
        self.state.lock().axes[axis.index()].input_velocity
    }

    /// Current limit of one axis.
    pub fn current_limit(&self, axis: AxisIndex) -> f32 {
        self.state.lock().axes[axis.index()].current_limit
    }

    fn connected(&self, state: &SimState) -> Result<(), DeviceError> {
        if state.connected {
            Ok(())
        } else {
            Err(DeviceError::NotConnected(self.name.clone()))
        }
    }
}

fn reject(axis: AxisIndex, requested: AxisState, reason: &str) -> DeviceError {
    DeviceError::StateRejected {
        axis,
        requested,
        reason: reason.to_string(),
    }
}

impl DeviceHandle for SimDevice {
    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn axis_status(&self, axis: AxisIndex) -> Result<AxisStatus, DeviceError> {
        let state = self.state.lock();
        self.connected(&state)?;
        Ok(state.axes[axis.index()].status())
    }

    fn request_state(&self, axis: AxisIndex, requested: AxisState) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if requested == AxisState::Idle {
            state.idle_requests += 1;
            if state.fail_idle {
                return Err(DeviceError::CommunicationError(format!(
                    "{}: idle command timed out",
                    self.name
                )));
            }
        }
        self.connected(&state)?;
        if state.rejected.contains(&requested) {
            return Err(reject(axis, requested, "rejected by fault injection"));
        }

        let sim = &mut state.axes[axis.index()];
        if requested != AxisState::Idle && sim.error != 0 {
            return Err(DeviceError::AxisFault {
                axis,
                code: sim.error,
            });
        }
        match requested {
            AxisState::Undefined => return Err(reject(axis, requested, "not a requestable state")),
            AxisState::Idle => {
                sim.state = AxisState::Idle;
                sim.input_velocity = 0.0;
            }
            AxisState::MotorCalibration => {
                sim.motor_calibrated = true;
                sim.state = AxisState::Idle;
            }
            AxisState::EncoderOffsetCalibration => {
                if !sim.motor_calibrated {
                    return Err(reject(axis, requested, "motor not calibrated"));
                }
                sim.encoder_ready = true;
                sim.state = AxisState::Idle;
            }
            AxisState::ClosedLoopControl => {
                if !(sim.motor_calibrated && sim.encoder_ready) {
                    return Err(reject(axis, requested, "axis not calibrated"));
                }
                sim.state = AxisState::ClosedLoopControl;
            }
        }
        debug!("{}.{axis} -> {requested:?}", self.name);
        Ok(())
    }

    fn set_input_velocity(&self, axis: AxisIndex, velocity: f32) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        self.connected(&state)?;
        state.axes[axis.index()].input_velocity = velocity;
        Ok(())
    }

    fn set_current_limit(&self, axis: AxisIndex, amps: f32) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        self.connected(&state)?;
        state.axes[axis.index()].current_limit = amps;
        Ok(())
    }

    fn erase_configuration(&self) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        self.connected(&state)?;
        for axis in &mut state.axes {
            *axis = SimAxis {
                state: AxisState::Idle,
                ..Default::default()
            };
        }
        info!("{}: configuration erased", self.name);
        Ok(())
    }

    fn save_configuration(&self) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        self.connected(&state)?;
        for axis in &mut state.axes {
            axis.saved_motor_calibration = axis.motor_calibrated;
        }
        debug!("{}: configuration saved", self.name);
        Ok(())
    }

    fn reboot(&self) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        self.connected(&state)?;
        for axis in &mut state.axes {
            *axis = SimAxis {
                state: AxisState::Idle,
                motor_calibrated: axis.saved_motor_calibration,
                saved_motor_calibration: axis.saved_motor_calibration,
                current_limit: axis.current_limit,
                ..Default::default()
            };
        }
        state.reboots += 1;
        info!("{}: rebooted", self.name);
        Ok(())
    }
}

/// Connector that creates [`SimDevice`]s on demand.
#[derive(Debug, Default)]
pub struct SimConnector {
    devices: Mutex<Vec<Arc<SimDevice>>>,
    unreachable: Mutex<HashSet<String>>,
}

impl SimConnector {
    /// Create a connector with no devices yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `connect` fail for the named device.
    pub fn mark_unreachable(&self, name: impl Into<String>) {
        self.unreachable.lock().insert(name.into());
    }

    /// A device handed out earlier, by name.
    pub fn device(&self, name: &str) -> Option<Arc<SimDevice>> {
        self.devices.lock().iter().find(|d| d.name() == name).cloned()
    }
}

impl DeviceConnector for SimConnector {
    fn name(&self) -> &'static str {
        DEFAULT_DRIVER
    }

    fn connect(
        &self,
        name: &str,
        config: &DeviceConfig,
    ) -> Result<Arc<dyn DeviceHandle>, DeviceError> {
        if self.unreachable.lock().contains(name) {
            return Err(DeviceError::NotConnected(name.to_string()));
        }
        if let Some(existing) = self.device(name) {
            return Ok(existing);
        }
        debug!(
            "Simulating {name} (serial={:?}, programmer={:?})",
            config.serial_number, config.programmer
        );
        let device = Arc::new(SimDevice::new(name));
        self.devices.lock().push(Arc::clone(&device));
        Ok(device)
    }
}

/// Factory for the connector registry.
pub fn create_connector() -> Box<dyn DeviceConnector> {
    Box::new(SimConnector::new())
}
