//! Securing the rig after a failed run.
//!
//! Every device gets an idle command on both axes, all devices in parallel.
//! This path ignores the axis locks: a worker that is still stuck inside a
//! test body must not be able to block it.

use std::sync::Arc;
use tracing::{error, info};

use crate::context::{DeviceContext, NamedMap};
use crate::error::RecoveryError;
use crate::task_group::for_all_parallel;

/// Command every device to idle and wait for all of them.
///
/// # Errors
/// Returns the first `RecoveryError::IdleFailed` (or fan-out failure). All
/// devices are still commanded when one of them fails.
pub fn secure_rig(devices: &NamedMap<DeviceContext>) -> Result<(), RecoveryError> {
    error!("=> Test failed. Please wait while I secure the test rig...");
    let targets: Vec<(String, Arc<DeviceContext>)> = devices
        .iter()
        .map(|(name, device)| (format!("secure {name}"), Arc::clone(device)))
        .collect();

    for_all_parallel(&targets, |device| {
        device
            .request_idle()
            .map_err(|source| RecoveryError::IdleFailed {
                device: device.name().to_string(),
                source,
            })?;
        info!("{} is idle", device.name());
        Ok(())
    })
}

/// Log the operator alarm for an unsafe rig.
pub fn raise_critical_alarm(err: &RecoveryError) {
    error!("{err}");
    error!("***********************************************");
    error!("****                                       ****");
    error!("****  CRITICAL: COULD NOT SECURE TEST RIG  ****");
    error!("****       CUT THE POWER IMMEDIATELY!      ****");
    error!("****                                       ****");
    error!("***********************************************");
}
