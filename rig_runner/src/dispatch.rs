//! Test dispatcher.
//!
//! Runs the registry in order. Each test fans out over its targets and the
//! dispatcher joins every branch before moving on, so test N+1 never
//! touches hardware while a branch of test N is still running.
//!
//! ## Fan-out per scope
//!
//! ```text
//! Device, exclusive   → one device at a time, rig order, stop at first failure
//! Device, shared      → one thread per device, no locks
//! Axis                → one thread per axis, lock axis + coupled axes
//! CoupledPair         → one thread per coupling, lock every member
//! ```
//!
//! Axis and coupling workers check the shutdown token after taking their
//! locks and skip if it is raised. Any failure raises the token.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

use crate::context::{AxisContext, Coupling, DeviceContext, RigContext};
use crate::error::{RunError, TestError};
use crate::lock::LockPlan;
use crate::registry::{AxisTest, CoupledPairTest, DeviceTest, TestCase, TestRegistry, TestScope};
use crate::report::{OutcomeLedger, TargetOutcome, TargetRecord};
use crate::shutdown::ShutdownToken;
use crate::task_group::for_all_parallel;

/// Executes a test registry against one rig.
#[derive(Debug)]
pub struct Dispatcher<'r> {
    rig: &'r RigContext,
    token: ShutdownToken,
    ledger: OutcomeLedger,
}

impl<'r> Dispatcher<'r> {
    /// Create a dispatcher sharing `token` with the rest of the run.
    pub fn new(rig: &'r RigContext, token: ShutdownToken) -> Self {
        Self {
            rig,
            token,
            ledger: OutcomeLedger::new(),
        }
    }

    /// The run's shutdown token.
    pub fn token(&self) -> &ShutdownToken {
        &self.token
    }

    /// Run every test in registry order.
    ///
    /// Stops at the first failing test; later tests are never dispatched.
    ///
    /// # Errors
    /// - `RunError::PreconditionsNotMet` / `RunError::RunFailure` from a target
    /// - `RunError::Interrupted` if the token was raised between tests
    /// - `RunError::InterruptedDuring` if it was raised while a test ran
    /// - `RunError::Scheduling` / `RunError::Task` on internal failures
    pub fn run_all(&self, registry: &TestRegistry) -> Result<(), RunError> {
        info!("Running {} tests", registry.len());
        for test in registry.iter() {
            if self.token.is_triggered() {
                return Err(RunError::Interrupted {
                    next_test: test.name().to_string(),
                });
            }
            self.dispatch(test).inspect_err(|_| {
                self.token.trigger();
            })?;
            // Skipped targets never report an error, so the barrier can
            // come back clean after an interrupt.
            if self.token.is_triggered() {
                return Err(RunError::InterruptedDuring {
                    test: test.name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Fan one test out over its targets and wait for every branch.
    pub fn dispatch(&self, test: &TestCase) -> Result<(), RunError> {
        debug!(
            "Dispatching {} (scope={:?}, exclusive={})",
            test.name(),
            test.scope(),
            test.is_exclusive()
        );
        match test {
            TestCase::Device {
                test,
                exclusive: true,
            } => {
                for device in self.rig.devices().values() {
                    self.run_device(test.as_ref(), device)?;
                }
                Ok(())
            }
            TestCase::Device {
                test,
                exclusive: false,
            } => {
                let targets = labelled(test.name(), self.rig.devices().iter());
                for_all_parallel(&targets, |device| self.run_device(test.as_ref(), device))
            }
            TestCase::Axis(test) => {
                let targets = labelled(test.name(), self.rig.axes().iter());
                for_all_parallel(&targets, |axis| self.run_axis(test.as_ref(), axis))
            }
            TestCase::CoupledPair(test) => {
                let targets: Vec<_> = self
                    .rig
                    .couplings()
                    .iter()
                    .map(|c| (format!("{} on {}", test.name(), c.name()), c.clone()))
                    .collect();
                for_all_parallel(&targets, |coupling| {
                    self.run_coupling(test.as_ref(), coupling)
                })
            }
        }
    }

    /// Outcomes recorded so far.
    pub fn records(&self) -> Vec<TargetRecord> {
        self.ledger.snapshot()
    }

    /// Consume the dispatcher and return its outcomes.
    pub fn into_records(self) -> Vec<TargetRecord> {
        self.ledger.into_records()
    }

    fn run_device(&self, test: &dyn DeviceTest, device: &DeviceContext) -> Result<(), RunError> {
        self.execute(
            test.name(),
            device.name(),
            TestScope::Device,
            || test.check_preconditions(device),
            || test.run(device),
        )
    }

    fn run_axis(&self, test: &dyn AxisTest, axis: &Arc<AxisContext>) -> Result<(), RunError> {
        let plan = self.rig.conflicting_axes(axis);
        self.execute_locked(&plan, test.name(), axis.name(), TestScope::Axis, || {
            self.execute(
                test.name(),
                axis.name(),
                TestScope::Axis,
                || test.check_preconditions(axis),
                || test.run(axis),
            )
        })
    }

    fn run_coupling(
        &self,
        test: &dyn CoupledPairTest,
        coupling: &Coupling,
    ) -> Result<(), RunError> {
        let plan = coupling.lock_plan();
        let name = coupling.name();
        let [first, second, ..] = plan.axes() else {
            return Err(RunError::Scheduling(format!(
                "coupling {name} has fewer than two axes"
            )));
        };
        self.execute_locked(&plan, test.name(), &name, TestScope::CoupledPair, || {
            self.execute(
                test.name(),
                &name,
                TestScope::CoupledPair,
                || test.check_preconditions(first, second),
                || test.run(first, second),
            )
        })
    }

    /// Hold the plan's locks, then run `body` unless the token is raised.
    fn execute_locked(
        &self,
        plan: &LockPlan,
        test: &str,
        target: &str,
        scope: TestScope,
        body: impl FnOnce() -> Result<(), RunError>,
    ) -> Result<(), RunError> {
        let _held = plan.acquire();
        if self.token.is_triggered() {
            warn!("⬛ skipping {test} on {target}");
            self.ledger.record(test, target, scope, TargetOutcome::Skipped);
            return Ok(());
        }
        body()
    }

    /// Precondition check followed by the run procedure on one target.
    fn execute(
        &self,
        test: &str,
        target: &str,
        scope: TestScope,
        check: impl FnOnce() -> Result<(), TestError>,
        run: impl FnOnce() -> Result<(), TestError>,
    ) -> Result<(), RunError> {
        let span = info_span!("target", test, target);
        let _entered = span.enter();
        info!("● running {test} on {target}...");

        let result = catch_panic(check)
            .map_err(|source| RunError::PreconditionsNotMet {
                test: test.to_string(),
                target: target.to_string(),
                source,
            })
            .and_then(|()| {
                catch_panic(run).map_err(|source| RunError::RunFailure {
                    test: test.to_string(),
                    target: target.to_string(),
                    source,
                })
            });

        match &result {
            Ok(()) => {
                debug!("{test} passed on {target}");
                self.ledger.record(test, target, scope, TargetOutcome::Passed);
            }
            Err(err) => {
                if self.token.trigger() {
                    debug!("Shutdown token raised by {test} on {target}");
                }
                error!("{err}");
                self.ledger.record(
                    test,
                    target,
                    scope,
                    TargetOutcome::Failed {
                        reason: err.to_string(),
                    },
                );
            }
        }
        result
    }
}

/// `(label, context)` pairs for a fan-out, labelled `"{test} on {name}"`.
fn labelled<'a, T: 'a>(
    test: &str,
    entries: impl Iterator<Item = (&'a str, &'a Arc<T>)>,
) -> Vec<(String, Arc<T>)> {
    entries
        .map(|(name, ctx)| (format!("{test} on {name}"), Arc::clone(ctx)))
        .collect()
}

/// Run a test body, turning a panic into [`TestError::Panicked`].
fn catch_panic(body: impl FnOnce() -> Result<(), TestError>) -> Result<(), TestError> {
    panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| {
        Err(TestError::Panicked(panic_message(payload.as_ref())))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
