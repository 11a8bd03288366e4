//! Device, axis and coupling contexts for one run.
//!
//! Built once at startup from the rig description and immutable afterwards.
//!
//! ## Ownership
//!
//! ```text
//! RigContext ─┬─ devices: NamedMap<DeviceContext> ── owns [AxisContext; 2]
//!             ├─ axes:    NamedMap<AxisContext>      (shared Arcs, minus ignored)
//!             └─ couplings: Vec<Coupling>            (derived, ≥ 2 members)
//! AxisContext ── Weak<DeviceContext> back-reference
//! ```

use parking_lot::Mutex;
use rig_common::config::{DeviceConfig, RigConfig};
use rig_common::consts::{AXES_PER_DEVICE, qualified_axis_name};
use rig_common::device::{
    AxisIndex, AxisState, AxisStatus, DeviceConnector, DeviceError, DeviceHandle,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use crate::error::ContextError;
use crate::lock::LockPlan;

// ─── Insertion-Ordered Map ──────────────────────────────────────────

/// Name → context map that iterates in insertion order.
#[derive(Debug)]
pub struct NamedMap<T> {
    entries: Vec<(String, Arc<T>)>,
    index: HashMap<String, usize>,
}

impl<T> NamedMap<T> {
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Insert a value. Returns `false` (and keeps the old value) if the
    /// name is already present.
    pub fn insert(&mut self, name: impl Into<String>, value: Arc<T>) -> bool {
        let name = name.into();
        if self.index.contains_key(&name) {
            return false;
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, value));
        true
    }

    /// Look up by name.
    pub fn get(&self, name: &str) -> Option<&Arc<T>> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    /// Whether `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<T>)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &Arc<T>> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl<T> Default for NamedMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Device ─────────────────────────────────────────────────────────

/// One physical controller and its two axes.
pub struct DeviceContext {
    name: String,
    config: DeviceConfig,
    handle: Arc<dyn DeviceHandle>,
    axes: [Arc<AxisContext>; AXES_PER_DEVICE],
}

impl DeviceContext {
    /// Create a device context. Both axis contexts are created with it.
    pub fn new(
        name: impl Into<String>,
        config: DeviceConfig,
        handle: Arc<dyn DeviceHandle>,
    ) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|device| {
            let axes = AxisIndex::ALL.map(|index| {
                Arc::new(AxisContext {
                    name: qualified_axis_name(&name, index.index()),
                    index,
                    device: device.clone(),
                    handle: Arc::clone(&handle),
                    lock: Mutex::new(()),
                })
            });
            Self {
                name,
                config,
                handle,
                axes,
            }
        })
    }

    /// Device name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device entry from the rig description.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Control surface of the device.
    pub fn handle(&self) -> &dyn DeviceHandle {
        self.handle.as_ref()
    }

    /// Both axes in device order.
    pub fn axes(&self) -> &[Arc<AxisContext>; AXES_PER_DEVICE] {
        &self.axes
    }

    /// One axis.
    pub fn axis(&self, index: AxisIndex) -> &Arc<AxisContext> {
        &self.axes[index.index()]
    }

    /// Command both axes to idle.
    ///
    /// Both axes are always commanded; the first error is returned.
    pub fn request_idle(&self) -> Result<(), DeviceError> {
        let mut first_err = None;
        for axis in AxisIndex::ALL {
            if let Err(e) = self.handle.request_state(axis, AxisState::Idle) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ─── Axis ───────────────────────────────────────────────────────────

/// One axis of a device.
pub struct AxisContext {
    name: String,
    index: AxisIndex,
    device: Weak<DeviceContext>,
    handle: Arc<dyn DeviceHandle>,
    lock: Mutex<()>,
}

impl AxisContext {
    /// Qualified name, e.g. `odrive0.axis1`.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position on the owning device.
    #[inline]
    pub fn index(&self) -> AxisIndex {
        self.index
    }

    /// Owning device, if it is still alive.
    pub fn device(&self) -> Option<Arc<DeviceContext>> {
        self.device.upgrade()
    }

    /// Control surface of the owning device.
    pub fn handle(&self) -> &dyn DeviceHandle {
        self.handle.as_ref()
    }

    /// Read this axis' status.
    pub fn status(&self) -> Result<AxisStatus, DeviceError> {
        self.handle.axis_status(self.index)
    }

    /// Request a state on this axis.
    pub fn request_state(&self, state: AxisState) -> Result<(), DeviceError> {
        self.handle.request_state(self.index, state)
    }

    /// Exclusive-access lock. Only [`LockPlan`] takes it.
    pub(crate) fn lock(&self) -> &Mutex<()> {
        &self.lock
    }
}

impl fmt::Debug for AxisContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AxisContext")
            .field("name", &self.name)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

// ─── Coupling ───────────────────────────────────────────────────────

/// Mechanically linked axes (at least two, no duplicates).
#[derive(Debug, Clone)]
pub struct Coupling {
    axes: Vec<Arc<AxisContext>>,
}

impl Coupling {
    /// Member axes in configuration order.
    pub fn axes(&self) -> &[Arc<AxisContext>] {
        &self.axes
    }

    /// Display name, e.g. `odrive0.axis0...odrive1.axis0`.
    pub fn name(&self) -> String {
        self.axes
            .iter()
            .map(|a| a.name())
            .collect::<Vec<_>>()
            .join("...")
    }

    /// Whether the named axis is a member.
    pub fn contains(&self, axis_name: &str) -> bool {
        self.axes.iter().any(|a| a.name() == axis_name)
    }

    /// Lock plan covering every member.
    pub fn lock_plan(&self) -> LockPlan {
        LockPlan::new(&self.axes)
    }
}

/// Resolve raw coupling groups against the known axes.
///
/// Unknown or ignored members are dropped, duplicates collapse, and a group
/// left with fewer than two members is discarded. Never fails.
pub fn resolve_couplings(groups: &[Vec<String>], axes: &NamedMap<AxisContext>) -> Vec<Coupling> {
    let mut couplings = Vec::new();
    for group in groups {
        let mut seen = HashSet::new();
        let members: Vec<_> = group
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .filter_map(|name| {
                let axis = axes.get(name);
                if axis.is_none() {
                    debug!("Coupling member {name} is not a known axis, dropping it");
                }
                axis.cloned()
            })
            .collect();

        if members.len() < 2 {
            debug!("Dropping coupling {group:?}: fewer than 2 known axes");
            continue;
        }
        couplings.push(Coupling { axes: members });
    }
    couplings
}

// ─── Rig ────────────────────────────────────────────────────────────

/// Every context of one run.
#[derive(Debug, Default)]
pub struct RigContext {
    devices: NamedMap<DeviceContext>,
    axes: NamedMap<AxisContext>,
    couplings: Vec<Coupling>,
}

impl RigContext {
    /// Build the contexts from the rig description.
    ///
    /// Devices and axes named in `config.ignore` are left out. Handles are
    /// obtained from `connector`; nothing else touches the hardware.
    ///
    /// # Errors
    /// - `ContextError::DuplicateDevice` if two devices resolve to one name
    /// - `ContextError::Connect` if the device layer cannot provide a handle
    pub fn build(
        config: &RigConfig,
        connector: &dyn DeviceConnector,
    ) -> Result<Self, ContextError> {
        let ignore: HashSet<&str> = config.ignore.iter().map(String::as_str).collect();

        let mut devices = Vec::with_capacity(config.devices.len());
        for (idx, device_config) in config.devices.iter().enumerate() {
            let name = device_config.resolved_name(idx);
            if ignore.contains(name.as_str()) {
                info!("Ignoring device {name}");
                continue;
            }
            let handle = connector
                .connect(&name, device_config)
                .map_err(|source| ContextError::Connect {
                    device: name.clone(),
                    source,
                })?;
            devices.push(DeviceContext::new(name, device_config.clone(), handle));
        }

        let rig = Self::from_devices(devices, &config.couplings, &ignore)?;
        info!(
            "Rig resolved via '{}': {} devices, {} axes, {} couplings",
            connector.name(),
            rig.devices.len(),
            rig.axes.len(),
            rig.couplings.len()
        );
        Ok(rig)
    }

    /// Assemble a rig from already-connected devices.
    ///
    /// # Errors
    /// Returns `ContextError::DuplicateDevice` if two devices share a name.
    pub fn from_devices(
        devices: Vec<Arc<DeviceContext>>,
        couplings: &[Vec<String>],
        ignore: &HashSet<&str>,
    ) -> Result<Self, ContextError> {
        let mut device_map = NamedMap::new();
        let mut axis_map = NamedMap::new();

        for device in devices {
            let name = device.name().to_string();
            if ignore.contains(name.as_str()) {
                continue;
            }
            if device_map.contains(&name) {
                return Err(ContextError::DuplicateDevice(name));
            }
            for axis in device.axes() {
                if ignore.contains(axis.name()) {
                    info!("Ignoring axis {}", axis.name());
                    continue;
                }
                axis_map.insert(axis.name(), Arc::clone(axis));
            }
            device_map.insert(name, device);
        }

        let couplings = resolve_couplings(couplings, &axis_map);
        Ok(Self {
            devices: device_map,
            axes: axis_map,
            couplings,
        })
    }

    /// Devices in rig order.
    pub fn devices(&self) -> &NamedMap<DeviceContext> {
        &self.devices
    }

    /// Non-ignored axes in rig order.
    pub fn axes(&self) -> &NamedMap<AxisContext> {
        &self.axes
    }

    /// Valid couplings.
    pub fn couplings(&self) -> &[Coupling] {
        &self.couplings
    }

    /// Lock plan for an axis-scope execution: the axis itself plus every
    /// axis that shares a coupling with it.
    pub fn conflicting_axes(&self, axis: &Arc<AxisContext>) -> LockPlan {
        let coupled = self
            .couplings
            .iter()
            .filter(|c| c.contains(axis.name()))
            .flat_map(|c| c.axes().iter());
        LockPlan::new(std::iter::once(axis).chain(coupled))
    }
}
