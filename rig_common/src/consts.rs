//! Rig-wide constants.
//!
//! Single source of truth for naming conventions and default paths.

/// Number of independently actuated axes on every device.
pub const AXES_PER_DEVICE: usize = 2;

/// Prefix of the synthesized name given to unnamed devices (`odrive{index}`).
pub const DEVICE_NAME_PREFIX: &str = "odrive";

/// Separator between device name and axis name in a qualified axis name.
pub const AXIS_NAME_SEPARATOR: char = '.';

/// Default rig description path.
pub const DEFAULT_RIG_CONFIG_PATH: &str = "/etc/rig/test-rig.toml";

/// Default device connector.
pub const DEFAULT_DRIVER: &str = "simulation";

/// Synthesized name for the device at `index` in the rig description.
pub fn default_device_name(index: usize) -> String {
    format!("{DEVICE_NAME_PREFIX}{index}")
}

/// Qualified axis name, e.g. `odrive0.axis1`.
pub fn qualified_axis_name(device: &str, axis: usize) -> String {
    format!("{device}{AXIS_NAME_SEPARATOR}axis{axis}")
}
