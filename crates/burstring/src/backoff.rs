//! Wait strategies used between failed enqueue/dequeue attempts.
//!
//! The ring never blocks. When a loop finds it full or empty it calls
//! [`BackoffStrategy::wait`], which must return within a bounded time, then
//! retries. After every successful transfer the loop calls
//! [`BackoffStrategy::notify`] so a strategy that can wake the other side
//! early gets the chance to.

use crate::{Config, WaitStrategy};
use std::hint;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// How a loop waits before retrying a full/empty ring.
pub trait BackoffStrategy: Send {
    /// Waits a bounded amount of time.
    fn wait(&mut self);

    /// Called after a successful transfer.
    fn reset(&mut self) {}

    /// Called after this side publishes; may wake the other side.
    fn notify(&self) {}
}

impl<B: BackoffStrategy + ?Sized> BackoffStrategy for Box<B> {
    fn wait(&mut self) {
        (**self).wait();
    }

    fn reset(&mut self) {
        (**self).reset();
    }

    fn notify(&self) {
        (**self).notify();
    }
}

/// Builds the strategy selected by `config.wait_strategy`.
///
/// Both loops of one pipeline must share the same `doorbell` for
/// [`WaitStrategy::Doorbell`] to wake anything.
pub fn backoff_for(config: &Config, doorbell: &Arc<Doorbell>) -> Box<dyn BackoffStrategy> {
    match config.wait_strategy {
        WaitStrategy::Fixed => Box::new(FixedBackoff::new(config.backoff_interval)),
        WaitStrategy::Exponential => Box::new(ExponentialBackoff::new(config.backoff_interval)),
        WaitStrategy::Doorbell => Box::new(DoorbellBackoff::new(
            Arc::clone(doorbell),
            config.backoff_interval,
        )),
    }
}

// ---------------------------------------------------------------------
// FIXED
// ---------------------------------------------------------------------

/// Unconditional sleep of a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff {
    interval: Duration,
}

impl FixedBackoff {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl BackoffStrategy for FixedBackoff {
    fn wait(&mut self) {
        thread::sleep(self.interval);
    }
}

// ---------------------------------------------------------------------
// EXPONENTIAL
// ---------------------------------------------------------------------

/// Adaptive backoff (Crossbeam-style), extended with a sleep phase.
///
/// Progressively increases wait time: spin with PAUSE → yield to OS →
/// sleep, doubling up to `max_sleep`.
#[derive(Debug)]
pub struct ExponentialBackoff {
    step: u32,
    max_sleep: Duration,
}

impl ExponentialBackoff {
    const SPIN_LIMIT: u32 = 6; // 2^6 = 64 spins max before yielding
    const YIELD_LIMIT: u32 = 10; // Then sleep
    const SLEEP_BASE: Duration = Duration::from_micros(1);

    /// Creates a new backoff instance.
    #[inline]
    pub fn new(max_sleep: Duration) -> Self {
        Self { step: 0, max_sleep }
    }

    /// Light spin with PAUSE hints.
    #[inline]
    fn spin(&self) {
        let spins = 1u32 << self.step.min(Self::SPIN_LIMIT);
        for _ in 0..spins {
            hint::spin_loop();
        }
    }

    fn sleep_duration(&self) -> Duration {
        let shift = self.step.saturating_sub(Self::YIELD_LIMIT).min(20);
        (Self::SLEEP_BASE * (1u32 << shift)).min(self.max_sleep)
    }

    /// True once spinning and yielding are exhausted and every wait sleeps.
    #[inline]
    pub fn is_sleeping(&self) -> bool {
        self.step >= Self::YIELD_LIMIT
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn wait(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            self.spin();
        } else if self.step < Self::YIELD_LIMIT {
            thread::yield_now();
        } else {
            thread::sleep(self.sleep_duration());
        }
        if self.step < Self::YIELD_LIMIT + 20 {
            self.step += 1;
        }
    }

    /// Reset for next wait cycle.
    fn reset(&mut self) {
        self.step = 0;
    }
}

// ---------------------------------------------------------------------
// DOORBELL
// ---------------------------------------------------------------------

/// Publish notification shared by a producer and a consumer.
///
/// A generation counter under a mutex plus a condvar. Ringing bumps the
/// generation; waiters return as soon as the generation differs from the
/// last one they saw, or when their timeout expires.
#[derive(Debug, Default)]
pub struct Doorbell {
    generation: Mutex<u64>,
    cond: Condvar,
    waiters: AtomicUsize,
}

impl Doorbell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        *self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wakes every waiter.
    pub fn ring(&self) {
        if self.waiters.load(Ordering::SeqCst) == 0 {
            return;
        }
        self.ring_always();
    }

    /// Wakes every waiter without the idle fast path.
    pub fn ring_always(&self) {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation = generation.wrapping_add(1);
        drop(generation);
        self.cond.notify_all();
    }

    /// Waits until the generation differs from `seen` or `timeout` elapses.
    /// Returns the generation observed on exit.
    pub fn wait_past(&self, seen: u64, timeout: Duration) -> u64 {
        self.waiters.fetch_add(1, Ordering::SeqCst);
        let guard = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _timed_out) = self
            .cond
            .wait_timeout_while(guard, timeout, |generation| *generation == seen)
            .unwrap_or_else(PoisonError::into_inner);
        let generation = *guard;
        drop(guard);
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        generation
    }
}

/// Waits on a [`Doorbell`], never longer than `interval`.
///
/// The timeout keeps the bounded-delay guarantee of [`FixedBackoff`]: a
/// missed ring costs at most one interval.
#[derive(Debug)]
pub struct DoorbellBackoff {
    bell: Arc<Doorbell>,
    interval: Duration,
    seen: u64,
}

impl DoorbellBackoff {
    pub fn new(bell: Arc<Doorbell>, interval: Duration) -> Self {
        let seen = bell.generation();
        Self {
            bell,
            interval,
            seen,
        }
    }
}

impl BackoffStrategy for DoorbellBackoff {
    fn wait(&mut self) {
        self.seen = self.bell.wait_past(self.seen, self.interval);
    }

    fn notify(&self) {
        self.bell.ring();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_exponential_progression() {
        let mut b = ExponentialBackoff::new(Duration::from_micros(50));

        // Should start at step 0
        assert_eq!(b.step, 0);

        b.wait();
        assert!(b.step > 0);

        // Should eventually sleep, capped at max_sleep
        while !b.is_sleeping() {
            b.wait();
        }
        for _ in 0..30 {
            b.wait();
        }
        assert_eq!(b.sleep_duration(), Duration::from_micros(50));

        // Reset
        b.reset();
        assert_eq!(b.step, 0);
    }

    #[test]
    fn test_fixed_backoff_sleeps_interval() {
        let mut b = FixedBackoff::new(Duration::from_millis(5));
        let start = Instant::now();
        b.wait();
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_doorbell_times_out_without_ring() {
        let bell = Arc::new(Doorbell::new());
        let mut b = DoorbellBackoff::new(Arc::clone(&bell), Duration::from_millis(5));
        let start = Instant::now();
        b.wait();
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_doorbell_ring_between_waits_is_not_lost() {
        let bell = Arc::new(Doorbell::new());
        let mut b = DoorbellBackoff::new(Arc::clone(&bell), Duration::from_secs(10));

        bell.ring_always();
        let start = Instant::now();
        b.wait();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(b.seen, 1);
    }

    #[test]
    fn test_doorbell_wakes_waiter() {
        let bell = Arc::new(Doorbell::new());
        let waiter_bell = Arc::clone(&bell);

        let waiter = thread::spawn(move || {
            let mut b = DoorbellBackoff::new(waiter_bell, Duration::from_secs(10));
            let start = Instant::now();
            b.wait();
            start.elapsed()
        });

        // Keep ringing until the waiter has parked and seen it.
        while !waiter.is_finished() {
            bell.ring();
            thread::sleep(Duration::from_millis(1));
        }
        assert!(waiter.join().unwrap() < Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_for_selects_strategy() {
        let bell = Arc::new(Doorbell::new());
        let config = Config::default()
            .with_wait_strategy(WaitStrategy::Doorbell)
            .with_backoff_interval(Duration::from_millis(1));
        let mut b = backoff_for(&config, &bell);
        b.notify();
        b.wait();
        b.reset();
    }
}
