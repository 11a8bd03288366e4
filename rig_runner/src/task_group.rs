//! Thread-per-target fan-out with a join barrier.
//!
//! [`for_all_parallel`] starts one named OS thread per `(label, target)`
//! pair, waits for all of them, and reports the first error in the order
//! the workers produced them. Later errors are logged and dropped.

use parking_lot::Mutex;
use std::thread;
use tracing::{debug, warn};

use crate::error::TaskError;

/// Run `work` on every target in parallel and block until all have returned.
///
/// Worker threads are named after their label. A worker that panics is
/// reported as [`TaskError::Panicked`]; a worker that cannot be spawned as
/// [`TaskError::Spawn`]. Workers that did start always run to completion
/// before this function returns.
pub fn for_all_parallel<T, E, F>(targets: &[(String, T)], work: F) -> Result<(), E>
where
    T: Sync,
    E: From<TaskError> + std::fmt::Display + Send,
    F: Fn(&T) -> Result<(), E> + Sync,
{
    let first_error: Mutex<Option<E>> = Mutex::new(None);
    let record = |err: E| {
        let mut slot = first_error.lock();
        if slot.is_none() {
            *slot = Some(err);
        } else {
            warn!("Additional failure: {err}");
        }
    };

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(targets.len());
        for (label, target) in targets {
            let spawned = thread::Builder::new()
                .name(label.clone())
                .spawn_scoped(scope, || {
                    if let Err(err) = work(target) {
                        record(err);
                    }
                });
            match spawned {
                Ok(handle) => handles.push((label, handle)),
                Err(source) => record(E::from(TaskError::Spawn {
                    label: label.clone(),
                    source,
                })),
            }
        }

        debug!("Joining {} workers", handles.len());
        for (label, handle) in handles {
            if handle.join().is_err() {
                record(E::from(TaskError::Panicked {
                    label: label.clone(),
                }));
            }
        }
    });

    first_error.into_inner().map_or(Ok(()), Err)
}
