//! Test cases and the ordered test registry.
//!
//! A test case is one of three scopes, each with its own trait:
//!
//! | Scope         | Trait              | Targets                   | Locking             |
//! |---------------|--------------------|---------------------------|---------------------|
//! | Device        | [`DeviceTest`]     | every device              | none                |
//! | Axis          | [`AxisTest`]       | every non-ignored axis    | axis + coupled axes |
//! | Coupled pair  | [`CoupledPairTest`]| every valid coupling      | all coupling members|
//!
//! Test bodies log through `tracing`; the dispatcher enters a span naming
//! the test and target before calling them.

use serde::Serialize;
use std::fmt;
use tracing::warn;

use crate::context::{AxisContext, DeviceContext};
use crate::error::{RunError, TestError};

/// A test run once per device.
pub trait DeviceTest: Send + Sync {
    /// Display name.
    fn name(&self) -> &str;

    /// Gate run before [`DeviceTest::run`]. An error means "preconditions not met".
    fn check_preconditions(&self, device: &DeviceContext) -> Result<(), TestError>;

    /// The test procedure.
    fn run(&self, device: &DeviceContext) -> Result<(), TestError>;
}

/// A test run once per axis.
pub trait AxisTest: Send + Sync {
    /// Display name.
    fn name(&self) -> &str;

    /// Gate run before [`AxisTest::run`].
    fn check_preconditions(&self, axis: &AxisContext) -> Result<(), TestError>;

    /// The test procedure.
    fn run(&self, axis: &AxisContext) -> Result<(), TestError>;
}

/// A test run once per mechanical coupling.
///
/// `first` and `second` are the two lowest-named members of the coupling.
/// Every member is locked for the duration of the call.
pub trait CoupledPairTest: Send + Sync {
    /// Display name.
    fn name(&self) -> &str;

    /// Gate run before [`CoupledPairTest::run`].
    fn check_preconditions(
        &self,
        first: &AxisContext,
        second: &AxisContext,
    ) -> Result<(), TestError>;

    /// The test procedure.
    fn run(&self, first: &AxisContext, second: &AxisContext) -> Result<(), TestError>;
}

/// Scope of a test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestScope {
    /// Once per device.
    Device,
    /// Once per axis.
    Axis,
    /// Once per coupling.
    CoupledPair,
}

/// One entry of the registry.
pub enum TestCase {
    /// Device-scope test. `exclusive` tests run one device at a time.
    Device {
        /// Test implementation.
        test: Box<dyn DeviceTest>,
        /// Never run two instances at once.
        exclusive: bool,
    },
    /// Axis-scope test.
    Axis(Box<dyn AxisTest>),
    /// Coupled-pair test.
    CoupledPair(Box<dyn CoupledPairTest>),
}

impl TestCase {
    /// Non-exclusive device test.
    pub fn device(test: impl DeviceTest + 'static) -> Self {
        Self::Device {
            test: Box::new(test),
            exclusive: false,
        }
    }

    /// Exclusive device test.
    pub fn exclusive_device(test: impl DeviceTest + 'static) -> Self {
        Self::Device {
            test: Box::new(test),
            exclusive: true,
        }
    }

    /// Axis test.
    pub fn axis(test: impl AxisTest + 'static) -> Self {
        Self::Axis(Box::new(test))
    }

    /// Coupled-pair test.
    pub fn coupled_pair(test: impl CoupledPairTest + 'static) -> Self {
        Self::CoupledPair(Box::new(test))
    }

    /// Display name of the wrapped test.
    pub fn name(&self) -> &str {
        match self {
            Self::Device { test, .. } => test.name(),
            Self::Axis(test) => test.name(),
            Self::CoupledPair(test) => test.name(),
        }
    }

    /// Scope of the wrapped test.
    pub fn scope(&self) -> TestScope {
        match self {
            Self::Device { .. } => TestScope::Device,
            Self::Axis(_) => TestScope::Axis,
            Self::CoupledPair(_) => TestScope::CoupledPair,
        }
    }

    /// Whether this is an exclusive device test. Always `false` for other scopes.
    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Device { exclusive: true, .. })
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name())
            .field("scope", &self.scope())
            .field("exclusive", &self.is_exclusive())
            .finish()
    }
}

/// Ordered sequence of test cases.
#[derive(Debug, Default)]
pub struct TestRegistry {
    tests: Vec<TestCase>,
}

impl TestRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a test. Builder style.
    pub fn with(mut self, test: TestCase) -> Self {
        self.tests.push(test);
        self
    }

    /// Append a test.
    pub fn push(&mut self, test: TestCase) {
        self.tests.push(test);
    }

    /// Build a registry from catalog names.
    ///
    /// Unknown names are scheduling errors that only warn: they are logged
    /// and left out of the plan.
    pub fn from_names<S: AsRef<str>>(catalog: &TestCatalog, names: &[S]) -> Self {
        let mut registry = Self::new();
        for name in names {
            match catalog.create(name.as_ref()) {
                Ok(test) => registry.push(test),
                Err(e) => warn!("ignoring unknown test type: {e}"),
            }
        }
        registry
    }

    /// Tests in run order.
    pub fn iter(&self) -> impl Iterator<Item = &TestCase> {
        self.tests.iter()
    }

    /// Number of tests.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

/// Factory function type for catalog entries.
pub type TestFactory = fn() -> TestCase;

/// Name → constructor table for building registries from configuration.
#[derive(Debug, Default)]
pub struct TestCatalog {
    entries: Vec<(&'static str, TestFactory)>,
}

impl TestCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a test constructor.
    ///
    /// # Panics
    /// Panics if a test with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: TestFactory) {
        if self.entries.iter().any(|(n, _)| *n == name) {
            panic!("Test '{name}' is already registered");
        }
        self.entries.push((name, factory));
    }

    /// Instantiate a test by name.
    ///
    /// # Errors
    /// Returns `RunError::Scheduling` if the name is unknown.
    pub fn create(&self, name: &str) -> Result<TestCase, RunError> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, factory)| factory())
            .ok_or_else(|| RunError::Scheduling(format!("no test named '{name}'")))
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(n, _)| *n).collect()
    }
}
