//! Error types for ring construction and pipeline lifecycle.
//!
//! The transfer operations themselves never fail: a full ring or an empty
//! ring is reported as a zero count and handled by backoff-and-retry.

use thiserror::Error;

/// Errors surfaced when building a ring or validating a [`Config`](crate::Config).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConstructionError {
    /// A ring must have at least one slot.
    #[error("capacity must be non-zero")]
    ZeroCapacity,

    /// Slot indices are derived with a bitmask.
    #[error("capacity {capacity} is not a power of two")]
    NotPowerOfTwo {
        /// The rejected capacity.
        capacity: usize,
    },

    /// Capacity exceeds what 32-bit cursors can address.
    #[error("capacity {capacity} exceeds maximum {max}")]
    TooLarge {
        /// The rejected capacity.
        capacity: usize,
        /// The largest accepted capacity.
        max: usize,
    },

    /// The slot storage could not be allocated.
    #[error("failed to allocate storage for {capacity} slots")]
    AllocationFailed {
        /// The requested capacity.
        capacity: usize,
    },

    /// A burst must be non-empty and fit in the ring, otherwise the
    /// producer can never make progress.
    #[error("burst size {burst} is invalid for capacity {capacity}")]
    InvalidBurst {
        /// The configured burst size.
        burst: usize,
        /// The configured capacity.
        capacity: usize,
    },
}

/// Errors from starting or joining a [`Pipeline`](crate::Pipeline).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The ring could not be constructed.
    #[error("construction failed: {0}")]
    Construction(#[from] ConstructionError),

    /// The OS refused to start a worker thread.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Which worker failed to start.
        name: &'static str,
        /// The underlying OS error.
        source: std::io::Error,
    },

    /// A worker thread panicked before returning its stats.
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

impl PipelineError {
    /// Returns `true` if the failure happened before any thread ran.
    #[inline]
    pub fn is_startup(&self) -> bool {
        matches!(self, Self::Construction(_) | Self::Spawn { .. })
    }
}
