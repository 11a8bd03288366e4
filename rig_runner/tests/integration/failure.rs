//! Failure propagation, skipping, interruption and rig recovery.

use super::{FailingDeviceTest, Probe, ProbeTest, build_rig};
use rig_common::device::AxisIndex;
use rig_runner::context::AxisContext;
use rig_runner::dispatch::Dispatcher;
use rig_runner::error::TestError;
use rig_runner::registry::{AxisTest, TestCase, TestRegistry};
use rig_runner::report::{RunStatus, TargetOutcome};
use rig_runner::runner::{EXIT_RIG_UNSAFE, EXIT_TEST_FAILED, RigRunner};
use rig_runner::shutdown::ShutdownToken;
use rig_runner::suites::{QUICK_PLAN, builtin_catalog};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Fails on whichever member of `coupled` reaches its body first.
struct FirstCoupledFails {
    coupled: [&'static str; 2],
    fired: AtomicBool,
}

impl AxisTest for FirstCoupledFails {
    fn name(&self) -> &str {
        "first_coupled_fails"
    }
    fn check_preconditions(&self, _: &AxisContext) -> Result<(), TestError> {
        Ok(())
    }
    fn run(&self, axis: &AxisContext) -> Result<(), TestError> {
        if self.coupled.contains(&axis.name()) && !self.fired.swap(true, Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(30));
            return Err(TestError::failed("stalled"));
        }
        Ok(())
    }
}

/// Raises the token from inside a body, as Ctrl+C would mid-test.
struct InterruptMidTest {
    token: ShutdownToken,
}

impl AxisTest for InterruptMidTest {
    fn name(&self) -> &str {
        "interrupt"
    }
    fn check_preconditions(&self, _: &AxisContext) -> Result<(), TestError> {
        Ok(())
    }
    fn run(&self, _: &AxisContext) -> Result<(), TestError> {
        self.token.trigger();
        Ok(())
    }
}

/// Raises the token while holding a coupled axis, then succeeds.
struct InterruptWhileCoupled {
    token: ShutdownToken,
    coupled_runs: Arc<AtomicUsize>,
}

impl AxisTest for InterruptWhileCoupled {
    fn name(&self) -> &str {
        "interrupt_while_coupled"
    }
    fn check_preconditions(&self, _: &AxisContext) -> Result<(), TestError> {
        Ok(())
    }
    fn run(&self, axis: &AxisContext) -> Result<(), TestError> {
        if axis.index() == AxisIndex::Axis0 {
            self.coupled_runs.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            self.token.trigger();
        }
        Ok(())
    }
}

#[test]
fn token_raised_mid_run_skips_pending_coupled_target() {
    let (_, rig) = build_rig(&["A", "B"], &[&["A.axis0", "B.axis0"]]);
    let token = ShutdownToken::new();
    let coupled_runs = Arc::new(AtomicUsize::new(0));
    let test = TestCase::axis(InterruptWhileCoupled {
        token: token.clone(),
        coupled_runs: Arc::clone(&coupled_runs),
    });
    let dispatcher = Dispatcher::new(&rig, token.clone());

    dispatcher.dispatch(&test).unwrap();

    assert!(token.is_triggered());
    assert_eq!(coupled_runs.load(Ordering::SeqCst), 1);
    let skipped: Vec<_> = dispatcher
        .into_records()
        .into_iter()
        .filter(|r| r.outcome == TargetOutcome::Skipped)
        .map(|r| r.target)
        .filter(|t| t == "A.axis0" || t == "B.axis0")
        .collect();
    assert_eq!(skipped.len(), 1);
}

#[test]
fn failure_skips_waiting_partner_and_secures_every_device() {
    let (connector, rig) = build_rig(&["A", "B"], &[&["A.axis0", "B.axis0"]]);
    let probe = Probe::shared();
    let registry = TestRegistry::new()
        .with(TestCase::axis(FirstCoupledFails {
            coupled: ["A.axis0", "B.axis0"],
            fired: AtomicBool::new(false),
        }))
        .with(TestCase::device(ProbeTest::new("never", &probe)));

    let runner = RigRunner::new(rig, registry);
    let report = runner.run();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.status.exit_code(), EXIT_TEST_FAILED);
    assert!(runner.token().is_triggered());

    let coupled: Vec<_> = report
        .records
        .iter()
        .filter(|r| r.target == "A.axis0" || r.target == "B.axis0")
        .collect();
    assert_eq!(coupled.len(), 2);
    assert_eq!(
        coupled
            .iter()
            .filter(|r| matches!(r.outcome, TargetOutcome::Failed { .. }))
            .count(),
        1
    );
    assert_eq!(
        coupled
            .iter()
            .filter(|r| r.outcome == TargetOutcome::Skipped)
            .count(),
        1
    );

    // Next test never dispatched.
    assert!(probe.spans().is_empty());
    assert_eq!(report.for_test("never").count(), 0);

    for device in ["A", "B"] {
        assert_eq!(connector.device(device).unwrap().idle_requests(), 2);
    }
}

#[test]
fn device_failure_raises_token_and_aborts_plan() {
    let (connector, rig) = build_rig(&["a", "b"], &[]);
    let probe = Probe::shared();
    let registry = TestRegistry::new()
        .with(TestCase::device(FailingDeviceTest))
        .with(TestCase::axis(ProbeTest::new("spin", &probe)));

    let runner = RigRunner::new(rig, registry);
    let report = runner.run();

    assert_eq!(report.status, RunStatus::Failed);
    assert!(runner.token().is_triggered());
    assert!(report.error.as_deref().unwrap().contains("misbehaved"));
    assert!(probe.spans().is_empty());
    assert_eq!(connector.device("b").unwrap().idle_requests(), 2);
}

#[test]
fn rig_is_unsafe_when_an_idle_command_fails() {
    let (connector, rig) = build_rig(&["a", "b"], &[]);
    connector.device("b").unwrap().fail_idle();
    let registry = TestRegistry::new().with(TestCase::device(FailingDeviceTest));

    let report = RigRunner::new(rig, registry).run();

    assert_eq!(report.status, RunStatus::RigUnsafe);
    assert_eq!(report.status.exit_code(), EXIT_RIG_UNSAFE);
    assert!(report.recovery_error.as_deref().unwrap().contains("could not idle b"));
    // The healthy device was still secured.
    assert_eq!(connector.device("a").unwrap().idle_requests(), 2);
}

#[test]
fn interrupt_during_a_test_stops_before_the_next_one() {
    let (connector, rig) = build_rig(&["a"], &[]);
    let token = ShutdownToken::new();
    let probe = Probe::shared();
    let registry = TestRegistry::new()
        .with(TestCase::axis(InterruptMidTest {
            token: token.clone(),
        }))
        .with(TestCase::axis(ProbeTest::new("after", &probe)));

    let report = RigRunner::new(rig, registry).with_token(token).run();

    assert_eq!(report.status, RunStatus::Failed);
    assert!(
        report
            .error
            .as_deref()
            .unwrap()
            .contains("interrupted during interrupt")
    );
    assert!(probe.spans().is_empty());
    assert_eq!(connector.device("a").unwrap().idle_requests(), 2);
}

#[test]
fn interrupt_during_the_last_test_still_secures_the_rig() {
    let (connector, rig) = build_rig(&["A", "B"], &[&["A.axis0", "B.axis0"]]);
    let token = ShutdownToken::new();
    let coupled_runs = Arc::new(AtomicUsize::new(0));
    let registry = TestRegistry::new().with(TestCase::axis(InterruptWhileCoupled {
        token: token.clone(),
        coupled_runs: Arc::clone(&coupled_runs),
    }));

    let report = RigRunner::new(rig, registry).with_token(token).run();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.status.exit_code(), EXIT_TEST_FAILED);
    assert_eq!(
        report.error.as_deref(),
        Some("run interrupted during interrupt_while_coupled")
    );
    assert!(report
        .records
        .iter()
        .any(|r| r.outcome == TargetOutcome::Skipped));
    for device in ["A", "B"] {
        assert_eq!(connector.device(device).unwrap().idle_requests(), 2);
    }
}

#[test]
fn quick_plan_on_uncalibrated_rig_fails_preconditions() {
    let (_, rig) = build_rig(&["odrive0"], &[]);
    let registry = TestRegistry::from_names(&builtin_catalog(), QUICK_PLAN);

    let report = RigRunner::new(rig, registry).run();

    assert_eq!(report.status, RunStatus::Failed);
    assert!(report
        .error
        .as_deref()
        .unwrap()
        .starts_with("preconditions not met for encoder_offset_calibration_if_needed"));
    assert_eq!(report.for_test("discover_and_goto_idle").count(), 1);
}

#[test]
fn quick_plan_on_calibrated_rig_succeeds() {
    let (connector, rig) = build_rig(
        &["odrive0", "odrive1"],
        &[&["odrive0.axis0", "odrive1.axis0"]],
    );
    for name in ["odrive0", "odrive1"] {
        connector.device(name).unwrap().preset_calibrated();
    }
    let registry = TestRegistry::from_names(&builtin_catalog(), QUICK_PLAN);

    let report = RigRunner::new(rig, registry).run();

    assert_eq!(report.status, RunStatus::Succeeded, "{:?}", report.error);
    assert_eq!(report.for_test("high_velocity_in_viscous_fluid").count(), 1);
}
