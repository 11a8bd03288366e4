//! Top-level run: dispatch, then secure the rig if anything went wrong.
//!
//! ```text
//! Dispatcher::run_all ──Ok──► "✅ All tests succeeded!"           → Succeeded
//!        │
//!        Err ──► raise token ──► secure_rig ──Ok──► failure banner      → Failed
//!                                    │
//!                                    Err ──► critical alarm             → RigUnsafe
//! ```

use std::error::Error;
use tracing::{debug, error, info, warn};

use crate::context::RigContext;
use crate::dispatch::Dispatcher;
use crate::recovery::{raise_critical_alarm, secure_rig};
use crate::registry::TestRegistry;
use crate::report::{RunReport, RunStatus};
use crate::shutdown::ShutdownToken;

/// Exit code for a successful run.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for a failed or interrupted run after the rig was secured.
pub const EXIT_TEST_FAILED: i32 = 1;
/// Exit code for configuration and startup errors.
pub const EXIT_STARTUP_ERROR: i32 = 2;
/// Exit code for a run that left the rig unsafe.
pub const EXIT_RIG_UNSAFE: i32 = 3;

impl RunStatus {
    /// Process exit code for this status.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Succeeded => EXIT_SUCCESS,
            Self::Failed => EXIT_TEST_FAILED,
            Self::RigUnsafe => EXIT_RIG_UNSAFE,
        }
    }
}

/// One configured test run.
#[derive(Debug)]
pub struct RigRunner {
    rig: RigContext,
    registry: TestRegistry,
    token: ShutdownToken,
    secure_after_failure: bool,
}

impl RigRunner {
    /// Create a runner with a fresh shutdown token and recovery enabled.
    pub fn new(rig: RigContext, registry: TestRegistry) -> Self {
        Self {
            rig,
            registry,
            token: ShutdownToken::new(),
            secure_after_failure: true,
        }
    }

    /// Use an externally owned token (e.g. one wired to Ctrl+C).
    pub fn with_token(mut self, token: ShutdownToken) -> Self {
        self.token = token;
        self
    }

    /// Enable or disable securing the rig after a failure.
    pub fn secure_after_failure(mut self, enabled: bool) -> Self {
        self.secure_after_failure = enabled;
        self
    }

    /// The run's shutdown token.
    pub fn token(&self) -> ShutdownToken {
        self.token.clone()
    }

    /// The resolved rig.
    pub fn rig(&self) -> &RigContext {
        &self.rig
    }

    /// Run every test, then secure the rig if the run did not succeed.
    ///
    /// Never returns an error: every outcome is folded into the report.
    pub fn run(&self) -> RunReport {
        let dispatcher = Dispatcher::new(&self.rig, self.token.clone());
        let result = dispatcher.run_all(&self.registry);
        let records = dispatcher.into_records();

        let err = match result {
            Ok(()) => {
                info!("✅ All tests succeeded!");
                return RunReport {
                    status: RunStatus::Succeeded,
                    error: None,
                    recovery_error: None,
                    records,
                };
            }
            Err(err) => err,
        };

        self.token.trigger();
        error!("{err}");
        debug!("{}", source_chain(&err));

        let recovery = if self.secure_after_failure {
            secure_rig(self.rig.devices())
        } else {
            warn!("Securing the rig after failure is disabled, leaving devices as they are");
            Ok(())
        };

        match recovery {
            Ok(()) if err.is_test_failure() => {
                error!("some test failed!");
                RunReport {
                    status: RunStatus::Failed,
                    error: Some(err.to_string()),
                    recovery_error: None,
                    records,
                }
            }
            Ok(()) => {
                error!("test run aborted, rig secured");
                RunReport {
                    status: RunStatus::Failed,
                    error: Some(err.to_string()),
                    recovery_error: None,
                    records,
                }
            }
            Err(recovery_err) => {
                raise_critical_alarm(&recovery_err);
                RunReport {
                    status: RunStatus::RigUnsafe,
                    error: Some(err.to_string()),
                    recovery_error: Some(recovery_err.to_string()),
                    records,
                }
            }
        }
    }
}

/// `err: cause: cause...` for the debug log.
fn source_chain(err: &dyn Error) -> String {
    let mut chain = format!("{err:?}");
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(&format!("\n  caused by: {cause:?}"));
        source = cause.source();
    }
    chain
}
