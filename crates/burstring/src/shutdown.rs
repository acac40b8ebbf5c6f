//! Cooperative shutdown flag shared by the producer and consumer loops.

use crate::Doorbell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable, set-once shutdown flag.
///
/// Loops poll [`is_requested`](Self::is_requested) between attempts; setting
/// the flag never interrupts a transfer in progress. If a [`Doorbell`] is
/// attached, requesting shutdown also rings it so loops waiting on it notice
/// immediately instead of after their backoff interval.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    doorbell: Option<Arc<Doorbell>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing flag, e.g. one set from a signal handler.
    pub fn from_shared(flag: Arc<AtomicBool>) -> Self {
        Self {
            flag,
            doorbell: None,
        }
    }

    /// Rings `doorbell` when shutdown is requested.
    pub fn with_doorbell(mut self, doorbell: Arc<Doorbell>) -> Self {
        self.doorbell = Some(doorbell);
        self
    }

    /// Sets the flag. Idempotent: returns `true` only for the call that
    /// performed the transition.
    pub fn request_shutdown(&self) -> bool {
        let first = !self.flag.swap(true, Ordering::AcqRel);
        if first {
            if let Some(doorbell) = &self.doorbell {
                doorbell.ring_always();
            }
        }
        first
    }

    /// Returns `true` once shutdown has been requested.
    #[inline]
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
