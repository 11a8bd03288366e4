//! Run-scoped cooperative cancellation.
//!
//! The token is created at run start, raised by the first failure (or by
//! Ctrl+C), and never reset. Workers read it immediately before starting
//! axis- or coupling-scoped work; a body that is already running is never
//! interrupted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared shutdown flag. Cloning yields another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    raised: Arc<AtomicBool>,
}

impl ShutdownToken {
    /// Create a lowered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the token. Idempotent.
    ///
    /// Returns `true` only for the call that actually raised it.
    pub fn trigger(&self) -> bool {
        !self.raised.swap(true, Ordering::SeqCst)
    }

    /// Whether the token has been raised.
    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}
