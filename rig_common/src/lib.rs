//! Rig Common Library
//!
//! This crate provides the configuration model and the device-layer
//! contract shared by every consumer of the motor-controller test rig.
//!
//! # Module Structure
//!
//! - [`config`] - Rig description, TOML loading trait and validation
//! - [`consts`] - Rig-wide constants
//! - [`device`] - Device control surface (`DeviceHandle`, `DeviceConnector`)
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use rig_common::config::{ConfigLoader, RigConfig};
//! use rig_common::device::{AxisIndex, AxisState};
//! ```

pub mod config;
pub mod consts;
pub mod device;
pub mod prelude;
