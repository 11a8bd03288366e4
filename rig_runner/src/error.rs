//! Error taxonomy for a test run.
//!
//! ## Propagation Model
//!
//! - **PreconditionsNotMet / RunFailure**: not recoverable locally. The
//!   worker raises the shutdown token and the error aborts the whole run.
//! - **Scheduling**: internal inconsistency. An unknown test name is only
//!   a warning; anything else aborts like a run failure.
//! - **RecoveryFailure**: securing the rig failed. Terminal, escalates to
//!   the critical alarm.

use rig_common::device::DeviceError;
use thiserror::Error;

/// Error returned by a test body (precondition check or run procedure).
#[derive(Debug, Clone, Error)]
pub enum TestError {
    /// The test observed something it did not expect.
    #[error("{0}")]
    Failed(String),

    /// A device call failed.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The test body panicked.
    #[error("test body panicked: {0}")]
    Panicked(String),
}

impl TestError {
    /// Shorthand for [`TestError::Failed`].
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Errors raised while resolving the rig contexts.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Two devices resolved to the same name.
    #[error("duplicate device name: {0}")]
    DuplicateDevice(String),

    /// The device layer could not provide a handle.
    #[error("failed to connect {device}: {source}")]
    Connect {
        /// Device name.
        device: String,
        /// Device-layer error.
        #[source]
        source: DeviceError,
    },

    /// No connector is registered under the configured driver name.
    #[error("unknown device connector: {0}")]
    UnknownConnector(String),
}

/// Failure of the fan-out machinery itself.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker '{label}': {source}")]
    Spawn {
        /// Worker label.
        label: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A worker thread died without returning.
    #[error("worker '{label}' panicked")]
    Panicked {
        /// Worker label.
        label: String,
    },
}

/// Errors that abort a test run.
#[derive(Debug, Error)]
pub enum RunError {
    /// The target was not in a state where the test can run.
    #[error("preconditions not met for {test} on {target}: {source}")]
    PreconditionsNotMet {
        /// Test name.
        test: String,
        /// Target name (device, axis, or coupling).
        target: String,
        /// What the precondition check reported.
        #[source]
        source: TestError,
    },

    /// The run procedure failed.
    #[error("{test} failed on {target}: {source}")]
    RunFailure {
        /// Test name.
        test: String,
        /// Target name (device, axis, or coupling).
        target: String,
        /// What the run procedure reported.
        #[source]
        source: TestError,
    },

    /// Internal scheduling inconsistency.
    #[error("scheduling error: {0}")]
    Scheduling(String),

    /// The shutdown token was raised from outside the run (e.g. Ctrl+C).
    #[error("run interrupted before {next_test}")]
    Interrupted {
        /// First test that was not dispatched.
        next_test: String,
    },

    /// The shutdown token was raised while a test was running and no
    /// target reported a failure.
    #[error("run interrupted during {test}")]
    InterruptedDuring {
        /// Test whose targets were cut short.
        test: String,
    },

    /// Worker fan-out failed.
    #[error(transparent)]
    Task(#[from] TaskError),
}

impl RunError {
    /// Whether this error came from a test body rather than the scheduler.
    pub fn is_test_failure(&self) -> bool {
        matches!(
            self,
            Self::PreconditionsNotMet { .. } | Self::RunFailure { .. }
        )
    }
}

/// Errors raised while securing the rig after a failure.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// A device did not accept the idle command.
    #[error("could not idle {device}: {source}")]
    IdleFailed {
        /// Device name.
        device: String,
        /// Device-layer error.
        #[source]
        source: DeviceError,
    },

    /// Recovery fan-out failed.
    #[error(transparent)]
    Task(#[from] TaskError),
}
