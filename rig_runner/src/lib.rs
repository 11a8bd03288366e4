//! # Rig Runner Library
//!
//! Concurrent test scheduler for a motor-controller test rig.
//!
//! Tests run in registry order. Each test fans out over its targets
//! (devices, axes, or coupled axis groups) on one thread per target, and
//! every branch is joined before the next test starts. Mechanically coupled
//! axes are never driven by two threads at once. The first failure raises
//! a shared shutdown token, stops the run, and every device is commanded to
//! idle.
//!
//! # Module Structure
//!
//! - [`context`] - Device, axis and coupling contexts built from the rig description
//! - [`lock`] - Ordered multi-axis locking
//! - [`shutdown`] - Shared shutdown token
//! - [`task_group`] - Thread-per-target fan-out with a join barrier
//! - [`registry`] - Test traits, test cases, registry and catalog
//! - [`dispatch`] - Per-test fan-out, locking and outcome recording
//! - [`recovery`] - Securing the rig after a failure
//! - [`runner`] - Full run: dispatch, recovery, report
//! - [`report`] - Outcome ledger and JSON run report
//! - [`connectors`] - Device connector registry
//! - [`sim`] - Simulated devices
//! - [`suites`] - Built-in tests and run plans
//! - [`error`] - Error taxonomy
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         RigRunner                              │
//! │  ┌──────────────┐   ┌──────────────┐   ┌────────────────────┐  │
//! │  │ TestRegistry │──►│  Dispatcher  │──►│ for_all_parallel   │  │
//! │  └──────────────┘   └──────┬───────┘   │ (1 thread/target)  │  │
//! │                            │           └─────────┬──────────┘  │
//! │                            ▼                     ▼             │
//! │                   ┌────────────────┐    ┌────────────────┐     │
//! │                   │ ShutdownToken  │◄───│ LockPlan +     │     │
//! │                   └───────┬────────┘    │ test body      │     │
//! │                           ▼             └────────────────┘     │
//! │                   ┌────────────────┐                           │
//! │                   │  secure_rig    │ (idle every device)       │
//! │                   └────────────────┘                           │
//! └────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod connectors;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod lock;
pub mod recovery;
pub mod registry;
pub mod report;
pub mod runner;
pub mod shutdown;
pub mod sim;
pub mod suites;
pub mod task_group;

pub use context::RigContext;
pub use error::{RunError, TestError};
pub use registry::{TestCase, TestRegistry};
pub use report::{RunReport, RunStatus};
pub use runner::RigRunner;
pub use shutdown::ShutdownToken;
