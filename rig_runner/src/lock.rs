//! Coupling lock manager.
//!
//! Every caller that needs more than one axis lock goes through
//! [`LockPlan`], which orders the axes by name and removes duplicates
//! before acquiring. Sorting by name is the only deadlock-prevention
//! mechanism in the scheduler, so no other module touches the raw
//! per-axis mutexes.

use parking_lot::MutexGuard;
use std::sync::Arc;
use tracing::trace;

use crate::context::AxisContext;

/// A set of axes in global acquisition order.
#[derive(Debug, Clone, Default)]
pub struct LockPlan {
    axes: Vec<Arc<AxisContext>>,
}

impl LockPlan {
    /// Build a plan from any collection of axes.
    ///
    /// The result depends only on the axis names, never on the order in
    /// which they were supplied.
    pub fn new<'a>(axes: impl IntoIterator<Item = &'a Arc<AxisContext>>) -> Self {
        let mut axes: Vec<_> = axes.into_iter().cloned().collect();
        axes.sort_by(|a, b| a.name().cmp(b.name()));
        axes.dedup_by(|a, b| a.name() == b.name());
        Self { axes }
    }

    /// Axes in acquisition order.
    pub fn axes(&self) -> &[Arc<AxisContext>] {
        &self.axes
    }

    /// Axis names in acquisition order.
    pub fn names(&self) -> Vec<&str> {
        self.axes.iter().map(|a| a.name()).collect()
    }

    /// Number of locks in the plan.
    pub fn len(&self) -> usize {
        self.axes.len()
    }

    /// Whether the plan holds no axes.
    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Block until every lock in the plan is held.
    ///
    /// The returned guard releases all of them when dropped, on every exit
    /// path including unwinding.
    pub fn acquire(&self) -> AxisLockGuard<'_> {
        let mut guards = Vec::with_capacity(self.axes.len());
        for axis in &self.axes {
            trace!("Acquiring lock {}", axis.name());
            guards.push(axis.lock().lock());
        }
        AxisLockGuard { plan: self, guards }
    }
}

/// Held locks of a [`LockPlan`].
#[must_use = "locks are released as soon as the guard is dropped"]
pub struct AxisLockGuard<'a> {
    plan: &'a LockPlan,
    guards: Vec<MutexGuard<'a, ()>>,
}

impl AxisLockGuard<'_> {
    /// Names of the held locks in acquisition order.
    pub fn names(&self) -> Vec<&str> {
        self.plan.names()
    }
}

impl Drop for AxisLockGuard<'_> {
    fn drop(&mut self) {
        // Release in reverse acquisition order.
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
        trace!("Released locks {:?}", self.plan.names());
    }
}
