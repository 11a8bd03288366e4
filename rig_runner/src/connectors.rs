//! Registry of device connectors.
//!
//! The configured `runner.driver` name is looked up here at startup. The
//! registry is built by the caller and passed by value; there is no global
//! state.

use rig_common::consts::DEFAULT_DRIVER;
use rig_common::device::{ConnectorFactory, DeviceConnector};
use std::collections::HashMap;

use crate::error::ContextError;

/// Registry of available device connectors.
pub struct ConnectorRegistry {
    factories: HashMap<&'static str, ConnectorFactory>,
}

impl ConnectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry pre-populated with the built-in connectors.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(DEFAULT_DRIVER, crate::sim::create_connector);
        registry
    }

    /// Register a connector factory.
    ///
    /// # Panics
    /// Panics if a connector with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: ConnectorFactory) {
        if self.factories.contains_key(name) {
            panic!("Connector '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Create a connector instance by name.
    ///
    /// # Errors
    /// Returns `ContextError::UnknownConnector` if nothing is registered under `name`.
    pub fn create(&self, name: &str) -> Result<Box<dyn DeviceConnector>, ContextError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ContextError::UnknownConnector(name.to_string()))?;
        Ok(factory())
    }

    /// Registered connector names, sorted.
    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
