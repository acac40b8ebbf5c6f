//! Debug assertion macros for ring buffer cursor invariants.
//!
//! Only active in debug builds (`debug_assert!`), so there is zero overhead
//! in release builds. Cursors are `u32` and wrap, so every comparison is
//! done on wrapping distances rather than raw values.

// =============================================================================
// Bounded reservation
// =============================================================================

/// Assert that the producer never reserves more space than exists.
///
/// **Invariant**: `producer_head - consumer_tail ≤ capacity`
///
/// Used in: `Producer::try_enqueue_batch()` after computing the new head
macro_rules! debug_assert_bounded_count {
    ($producer_head:expr, $consumer_tail:expr, $capacity:expr) => {
        debug_assert!(
            ($producer_head.wrapping_sub($consumer_tail) as usize) <= $capacity,
            "bounded count violated: producer_head {} is {} slots past consumer_tail {} (capacity {})",
            $producer_head,
            $producer_head.wrapping_sub($consumer_tail),
            $consumer_tail,
            $capacity
        )
    };
}

// =============================================================================
// Read only published data
// =============================================================================

/// Assert that the consumer head does not pass the producer's publish point.
///
/// **Invariant**: `consumer_head ≤ producer_tail`
///
/// Used in: `Consumer::try_dequeue_batch()` before reserving items
macro_rules! debug_assert_head_not_past_tail {
    ($new_head:expr, $old_head:expr, $producer_tail:expr) => {
        debug_assert!(
            $new_head.wrapping_sub($old_head) <= $producer_tail.wrapping_sub($old_head),
            "consumer_head {} advanced beyond producer_tail {}",
            $new_head,
            $producer_tail
        )
    };
}

// =============================================================================
// Monotonic progress
// =============================================================================

/// Assert that a cursor only moves forward, by at most one ring's worth.
///
/// **Invariant**: `0 ≤ new - old ≤ capacity` (wrapping)
///
/// Used in: both publish points
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr, $capacity:expr) => {
        debug_assert!(
            ($new.wrapping_sub($old) as usize) <= $capacity,
            "{} moved backwards or jumped: {} -> {} (capacity {})",
            $name,
            $old,
            $new,
            $capacity
        )
    };
}

// =============================================================================
// Initialized range check
// =============================================================================

/// Assert that we're reading from an initialized slot.
///
/// **Invariant**: `slot(i) holds data ⟺ consumer_head ≤ i < producer_tail`
///
/// Used in: `Consumer::try_dequeue_batch()` before `assume_init_read()`
macro_rules! debug_assert_initialized_read {
    ($pos:expr, $head:expr, $tail:expr) => {
        debug_assert!(
            $pos.wrapping_sub($head) < $tail.wrapping_sub($head),
            "reading slot at cursor {} outside initialized range [{}, {})",
            $pos,
            $head,
            $tail
        )
    };
}

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_head_not_past_tail;
pub(crate) use debug_assert_initialized_read;
pub(crate) use debug_assert_monotonic;
