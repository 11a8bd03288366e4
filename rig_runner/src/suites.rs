//! Built-in test cases and run plans.
//!
//! The tests are thin: each one drives the device layer through
//! [`DeviceHandle`](rig_common::device::DeviceHandle) and checks the
//! reported axis status. Physical measurement belongs to the device layer.

use rig_common::device::{AxisState, AxisStatus};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

use crate::context::{AxisContext, DeviceContext};
use crate::error::TestError;
use crate::registry::{AxisTest, CoupledPairTest, DeviceTest, TestCase, TestCatalog};

/// Full plan, in run order.
pub const DEFAULT_PLAN: &[&str] = &[
    "flash_and_erase",
    "discover_and_goto_idle",
    "motor_calibration",
    "encoder_offset_calibration",
    "closed_loop_control",
    "store_and_reboot",
    "encoder_offset_calibration",
    "closed_loop_control",
    "high_velocity_in_viscous_fluid",
];

/// Plan for `--skip-boring-tests`.
pub const QUICK_PLAN: &[&str] = &[
    "discover_and_goto_idle",
    "encoder_offset_calibration_if_needed",
    "high_velocity_in_viscous_fluid",
];

/// Velocity used by the closed-loop check [turn/s].
const TEST_VELOCITY: f32 = 2.0;

/// Allowed deviation of the velocity estimate [turn/s].
const VELOCITY_TOLERANCE: f32 = 0.2;

/// Time the controller gets to settle on a new setpoint.
const SETTLE_TIME: Duration = Duration::from_millis(20);

/// Catalog of every built-in test.
pub fn builtin_catalog() -> TestCatalog {
    let mut catalog = TestCatalog::new();
    catalog.register("flash_and_erase", || TestCase::exclusive_device(FlashAndErase));
    catalog.register("discover_and_goto_idle", || TestCase::device(DiscoverAndGotoIdle));
    catalog.register("motor_calibration", || TestCase::axis(MotorCalibration));
    catalog.register("encoder_offset_calibration", || {
        TestCase::axis(EncoderOffsetCalibration { pass_if_ready: false })
    });
    catalog.register("encoder_offset_calibration_if_needed", || {
        TestCase::axis(EncoderOffsetCalibration { pass_if_ready: true })
    });
    catalog.register("closed_loop_control", || TestCase::axis(ClosedLoopControl));
    catalog.register("store_and_reboot", || TestCase::device(StoreAndReboot));
    catalog.register("high_velocity_in_viscous_fluid", || {
        TestCase::coupled_pair(HighVelocityInViscousFluid {
            load_current: 20.0,
            driver_current: 40.0,
        })
    });
    catalog
}

// ─── Helpers ────────────────────────────────────────────────────────

fn expect_state(
    axis: &AxisContext,
    status: &AxisStatus,
    expected: AxisState,
) -> Result<(), TestError> {
    if status.state != expected {
        return Err(TestError::failed(format!(
            "{} is in {:?}, expected {expected:?}",
            axis.name(),
            status.state
        )));
    }
    Ok(())
}

fn expect_healthy(axis: &AxisContext, status: &AxisStatus) -> Result<(), TestError> {
    if !status.is_healthy() {
        return Err(TestError::failed(format!(
            "{} has error {:#06x}",
            axis.name(),
            status.error
        )));
    }
    Ok(())
}

fn expect_ready_for_closed_loop(axis: &AxisContext) -> Result<(), TestError> {
    let status = axis.status()?;
    expect_healthy(axis, &status)?;
    if !status.motor_calibrated {
        return Err(TestError::failed(format!("{} motor not calibrated", axis.name())));
    }
    if !status.encoder_ready {
        return Err(TestError::failed(format!("{} encoder not ready", axis.name())));
    }
    Ok(())
}

/// Run `body` with the axis in closed loop; the axis is idled afterwards
/// whatever `body` returned.
fn in_closed_loop<T>(
    axis: &AxisContext,
    body: impl FnOnce() -> Result<T, TestError>,
) -> Result<T, TestError> {
    axis.request_state(AxisState::ClosedLoopControl)?;
    let result = body();
    // Idle is always attempted; the body's error wins over cleanup errors.
    let stopped = axis.handle().set_input_velocity(axis.index(), 0.0);
    let idled = axis.request_state(AxisState::Idle);
    let value = result?;
    stopped?;
    idled?;
    Ok(value)
}

fn check_velocity(axis: &AxisContext, expected: f32) -> Result<(), TestError> {
    axis.handle().set_input_velocity(axis.index(), expected)?;
    thread::sleep(SETTLE_TIME);
    let estimate = axis.status()?.velocity_estimate;
    debug!("{} velocity estimate {estimate:.3} (setpoint {expected:.3})", axis.name());
    if (estimate - expected).abs() > VELOCITY_TOLERANCE {
        return Err(TestError::failed(format!(
            "{} velocity {estimate:.3} turn/s, expected {expected:.3} ± {VELOCITY_TOLERANCE}",
            axis.name()
        )));
    }
    Ok(())
}

// ─── Device Tests ───────────────────────────────────────────────────

/// Erase the stored configuration. Exclusive: the programmer is shared.
pub struct FlashAndErase;

impl DeviceTest for FlashAndErase {
    fn name(&self) -> &str {
        "flash_and_erase"
    }

    fn check_preconditions(&self, device: &DeviceContext) -> Result<(), TestError> {
        if !device.handle().is_connected() {
            return Err(TestError::failed(format!("{} is not connected", device.name())));
        }
        Ok(())
    }

    fn run(&self, device: &DeviceContext) -> Result<(), TestError> {
        if let Some(programmer) = &device.config().programmer {
            info!("Using programmer {programmer}");
        }
        device.handle().erase_configuration()?;
        for axis in device.axes() {
            if axis.status()?.motor_calibrated {
                return Err(TestError::failed(format!(
                    "{} still calibrated after erase",
                    axis.name()
                )));
            }
        }
        Ok(())
    }
}

/// Confirm the device answers and both axes go idle.
pub struct DiscoverAndGotoIdle;

impl DeviceTest for DiscoverAndGotoIdle {
    fn name(&self) -> &str {
        "discover_and_goto_idle"
    }

    fn check_preconditions(&self, device: &DeviceContext) -> Result<(), TestError> {
        if !device.handle().is_connected() {
            return Err(TestError::failed(format!("{} not found", device.name())));
        }
        Ok(())
    }

    fn run(&self, device: &DeviceContext) -> Result<(), TestError> {
        device.request_idle()?;
        for axis in device.axes() {
            let status = axis.status()?;
            expect_state(axis, &status, AxisState::Idle)?;
        }
        Ok(())
    }
}

/// Save the configuration and reboot.
pub struct StoreAndReboot;

impl DeviceTest for StoreAndReboot {
    fn name(&self) -> &str {
        "store_and_reboot"
    }

    fn check_preconditions(&self, device: &DeviceContext) -> Result<(), TestError> {
        for axis in device.axes() {
            let status = axis.status()?;
            expect_state(axis, &status, AxisState::Idle)?;
        }
        Ok(())
    }

    fn run(&self, device: &DeviceContext) -> Result<(), TestError> {
        let before: Vec<bool> = device
            .axes()
            .iter()
            .map(|axis| axis.status().map(|s| s.motor_calibrated))
            .collect::<Result<_, _>>()?;

        device.handle().save_configuration()?;
        device.handle().reboot()?;
        if !device.handle().is_connected() {
            return Err(TestError::failed(format!(
                "{} did not come back after reboot",
                device.name()
            )));
        }

        for (axis, was_calibrated) in device.axes().iter().zip(before) {
            let status = axis.status()?;
            if status.motor_calibrated != was_calibrated {
                return Err(TestError::failed(format!(
                    "{} lost its motor calibration",
                    axis.name()
                )));
            }
            if status.encoder_ready {
                return Err(TestError::failed(format!(
                    "{} encoder still ready after reboot",
                    axis.name()
                )));
            }
        }
        Ok(())
    }
}

// ─── Axis Tests ─────────────────────────────────────────────────────

/// Motor phase calibration.
pub struct MotorCalibration;

impl AxisTest for MotorCalibration {
    fn name(&self) -> &str {
        "motor_calibration"
    }

    fn check_preconditions(&self, axis: &AxisContext) -> Result<(), TestError> {
        let status = axis.status()?;
        expect_healthy(axis, &status)?;
        expect_state(axis, &status, AxisState::Idle)
    }

    fn run(&self, axis: &AxisContext) -> Result<(), TestError> {
        axis.request_state(AxisState::MotorCalibration)?;
        let status = axis.status()?;
        expect_healthy(axis, &status)?;
        if !status.motor_calibrated {
            return Err(TestError::failed(format!(
                "{} motor calibration did not stick",
                axis.name()
            )));
        }
        expect_state(axis, &status, AxisState::Idle)
    }
}

/// Encoder offset search.
pub struct EncoderOffsetCalibration {
    /// Succeed immediately if the encoder is already ready.
    pub pass_if_ready: bool,
}

impl EncoderOffsetCalibration {
    fn already_ready(&self, axis: &AxisContext) -> Result<bool, TestError> {
        Ok(self.pass_if_ready && axis.status()?.encoder_ready)
    }
}

impl AxisTest for EncoderOffsetCalibration {
    fn name(&self) -> &str {
        if self.pass_if_ready {
            "encoder_offset_calibration_if_needed"
        } else {
            "encoder_offset_calibration"
        }
    }

    fn check_preconditions(&self, axis: &AxisContext) -> Result<(), TestError> {
        if self.already_ready(axis)? {
            return Ok(());
        }
        let status = axis.status()?;
        expect_healthy(axis, &status)?;
        if !status.motor_calibrated {
            return Err(TestError::failed(format!("{} motor not calibrated", axis.name())));
        }
        expect_state(axis, &status, AxisState::Idle)
    }

    fn run(&self, axis: &AxisContext) -> Result<(), TestError> {
        if self.already_ready(axis)? {
            info!("{} encoder already ready", axis.name());
            return Ok(());
        }
        axis.request_state(AxisState::EncoderOffsetCalibration)?;
        let status = axis.status()?;
        expect_healthy(axis, &status)?;
        if !status.encoder_ready {
            return Err(TestError::failed(format!("{} encoder not ready", axis.name())));
        }
        Ok(())
    }
}

/// Velocity control on a single axis.
pub struct ClosedLoopControl;

impl AxisTest for ClosedLoopControl {
    fn name(&self) -> &str {
        "closed_loop_control"
    }

    fn check_preconditions(&self, axis: &AxisContext) -> Result<(), TestError> {
        expect_ready_for_closed_loop(axis)
    }

    fn run(&self, axis: &AxisContext) -> Result<(), TestError> {
        in_closed_loop(axis, || {
            check_velocity(axis, TEST_VELOCITY)?;
            check_velocity(axis, -TEST_VELOCITY)
        })
    }
}

// ─── Coupled Tests ──────────────────────────────────────────────────

/// One axis holds a load while its coupled partner is driven fast.
pub struct HighVelocityInViscousFluid {
    /// Current limit of the holding axis [A].
    pub load_current: f32,
    /// Current limit of the driven axis [A].
    pub driver_current: f32,
}

impl HighVelocityInViscousFluid {
    const VELOCITY: f32 = 20.0;
}

impl CoupledPairTest for HighVelocityInViscousFluid {
    fn name(&self) -> &str {
        "high_velocity_in_viscous_fluid"
    }

    fn check_preconditions(
        &self,
        first: &AxisContext,
        second: &AxisContext,
    ) -> Result<(), TestError> {
        expect_ready_for_closed_loop(first)?;
        expect_ready_for_closed_loop(second)
    }

    fn run(&self, first: &AxisContext, second: &AxisContext) -> Result<(), TestError> {
        first.handle().set_current_limit(first.index(), self.load_current)?;
        second.handle().set_current_limit(second.index(), self.driver_current)?;
        in_closed_loop(first, || {
            in_closed_loop(second, || {
                check_velocity(first, 0.0)?;
                check_velocity(second, Self::VELOCITY)
            })
        })
    }
}
