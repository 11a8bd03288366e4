//! Shared rigs and probe tests.

mod failure;
mod locking;
mod scheduling;

use parking_lot::Mutex;
use rig_common::config::{DeviceConfig, RigConfig};
use rig_runner::context::{AxisContext, DeviceContext, RigContext};
use rig_runner::error::TestError;
use rig_runner::registry::{AxisTest, CoupledPairTest, DeviceTest};
use rig_runner::sim::SimConnector;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

pub const HOLD: Duration = Duration::from_millis(60);

pub fn rig_config(devices: &[&str], couplings: &[&[&str]]) -> RigConfig {
    RigConfig {
        devices: devices
            .iter()
            .map(|n| DeviceConfig {
                name: Some(n.to_string()),
                ..Default::default()
            })
            .collect(),
        couplings: couplings
            .iter()
            .map(|g| g.iter().map(|s| s.to_string()).collect())
            .collect(),
        ..Default::default()
    }
}

pub fn build_rig(devices: &[&str], couplings: &[&[&str]]) -> (SimConnector, RigContext) {
    let connector = SimConnector::new();
    let rig = RigContext::build(&rig_config(devices, couplings), &connector).unwrap();
    (connector, rig)
}

// ─── Probe ──────────────────────────────────────────────────────────

/// One observed execution.
#[derive(Debug, Clone)]
pub struct Span {
    pub test: String,
    pub target: String,
    pub start: Instant,
    pub end: Instant,
}

impl Span {
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Records when each test body ran and how many ran at once.
#[derive(Debug, Default)]
pub struct Probe {
    running: AtomicUsize,
    peak: AtomicUsize,
    spans: Mutex<Vec<Span>>,
}

impl Probe {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn observe(&self, test: &str, target: &str, hold: Duration) {
        let start = Instant::now();
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(hold);
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.spans.lock().push(Span {
            test: test.to_string(),
            target: target.to_string(),
            start,
            end: Instant::now(),
        });
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn spans(&self) -> Vec<Span> {
        self.spans.lock().clone()
    }

    pub fn span(&self, test: &str, target: &str) -> Span {
        self.spans
            .lock()
            .iter()
            .find(|s| s.test == test && s.target == target)
            .cloned()
            .unwrap_or_else(|| panic!("{test} never ran on {target}"))
    }

    pub fn targets(&self, test: &str) -> Vec<String> {
        self.spans
            .lock()
            .iter()
            .filter(|s| s.test == test)
            .map(|s| s.target.clone())
            .collect()
    }
}

/// Probe test usable at every scope. Holds each target for `hold`, or
/// for the per-target override.
pub struct ProbeTest {
    name: &'static str,
    probe: Arc<Probe>,
    hold: Duration,
    slow: HashMap<String, Duration>,
}

impl ProbeTest {
    pub fn new(name: &'static str, probe: &Arc<Probe>) -> Self {
        Self {
            name,
            probe: Arc::clone(probe),
            hold: HOLD,
            slow: HashMap::new(),
        }
    }

    pub fn hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    pub fn slow_on(mut self, target: &str, hold: Duration) -> Self {
        self.slow.insert(target.to_string(), hold);
        self
    }

    fn observe(&self, target: &str) {
        let hold = self.slow.get(target).copied().unwrap_or(self.hold);
        self.probe.observe(self.name, target, hold);
    }
}

impl DeviceTest for ProbeTest {
    fn name(&self) -> &str {
        self.name
    }
    fn check_preconditions(&self, _: &DeviceContext) -> Result<(), TestError> {
        Ok(())
    }
    fn run(&self, device: &DeviceContext) -> Result<(), TestError> {
        self.observe(device.name());
        Ok(())
    }
}

impl AxisTest for ProbeTest {
    fn name(&self) -> &str {
        self.name
    }
    fn check_preconditions(&self, _: &AxisContext) -> Result<(), TestError> {
        Ok(())
    }
    fn run(&self, axis: &AxisContext) -> Result<(), TestError> {
        self.observe(axis.name());
        Ok(())
    }
}

impl CoupledPairTest for ProbeTest {
    fn name(&self) -> &str {
        self.name
    }
    fn check_preconditions(&self, _: &AxisContext, _: &AxisContext) -> Result<(), TestError> {
        Ok(())
    }
    fn run(&self, first: &AxisContext, second: &AxisContext) -> Result<(), TestError> {
        self.observe(&format!("{}+{}", first.name(), second.name()));
        Ok(())
    }
}

/// Device test that always fails its run procedure.
pub struct FailingDeviceTest;

impl DeviceTest for FailingDeviceTest {
    fn name(&self) -> &str {
        "always_fails"
    }
    fn check_preconditions(&self, _: &DeviceContext) -> Result<(), TestError> {
        Ok(())
    }
    fn run(&self, device: &DeviceContext) -> Result<(), TestError> {
        Err(TestError::failed(format!("{} misbehaved", device.name())))
    }
}
