//! Per-target outcome ledger and run report.

use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;

use crate::registry::TestScope;

/// What happened to one (test, target) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TargetOutcome {
    /// Preconditions held and the run procedure succeeded.
    Passed,
    /// Not started because the shutdown token was raised.
    Skipped,
    /// Preconditions failed or the run procedure failed.
    Failed {
        /// Error text.
        reason: String,
    },
}

/// One ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetRecord {
    /// Test name.
    pub test: String,
    /// Device, axis, or coupling name.
    pub target: String,
    /// Scope the test ran at.
    pub scope: TestScope,
    /// Result.
    #[serde(flatten)]
    pub outcome: TargetOutcome,
}

/// Final state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every test completed without failure.
    Succeeded,
    /// A test failed (or the run was interrupted) and the rig was secured.
    Failed,
    /// A test failed and the rig could not be secured.
    RigUnsafe,
}

/// Serializable summary of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Overall status.
    pub status: RunStatus,
    /// Error that aborted the run, if any.
    pub error: Option<String>,
    /// Error raised while securing the rig, if any.
    pub recovery_error: Option<String>,
    /// Ledger in completion order.
    pub records: Vec<TargetRecord>,
}

impl RunReport {
    /// Number of records with the given outcome kind.
    pub fn count(&self, pred: impl Fn(&TargetOutcome) -> bool) -> usize {
        self.records.iter().filter(|r| pred(&r.outcome)).count()
    }

    /// Records for one test name.
    pub fn for_test<'a>(&'a self, test: &'a str) -> impl Iterator<Item = &'a TargetRecord> {
        self.records.iter().filter(move |r| r.test == test)
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// Thread-safe ledger shared by all workers of a run.
#[derive(Debug, Default)]
pub struct OutcomeLedger {
    records: Mutex<Vec<TargetRecord>>,
}

impl OutcomeLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn record(&self, test: &str, target: &str, scope: TestScope, outcome: TargetOutcome) {
        self.records.lock().push(TargetRecord {
            test: test.to_string(),
            target: target.to_string(),
            scope,
            outcome,
        });
    }

    /// Copy of the records so far.
    pub fn snapshot(&self) -> Vec<TargetRecord> {
        self.records.lock().clone()
    }

    /// Consume the ledger.
    pub fn into_records(self) -> Vec<TargetRecord> {
        self.records.into_inner()
    }
}
