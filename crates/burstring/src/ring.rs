use crate::config::validate_capacity;
use crate::invariants::{
    debug_assert_bounded_count, debug_assert_head_not_past_tail, debug_assert_initialized_read,
    debug_assert_monotonic,
};
use crate::{Config, ConstructionError, Metrics, MetricsSnapshot};
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// Four u32 cursors, never reset, wrapping on overflow. A slot index is
// `cursor & mask`.
//
// ## Ownership split
//
// - `producer.head`, `producer.tail`: written only by the `Producer` handle
// - `consumer.head`, `consumer.tail`: written only by the `Consumer` handle
//
// Each handle is unique (not Clone) and mutates through `&mut self`, so there
// is never a writer/writer race on a cursor. Each pair sits in its own
// `CachePadded` block to keep the two threads off each other's cache line.
//
// ## Enqueue (producer)
// 1. Load `producer.head` Relaxed (own cursor)
// 2. Free space from cached `consumer.tail`; if short, refresh with Acquire
//    (pairs with the consumer's Release store: slots it freed are no longer
//    being read)
// 3. Store `producer.head += n` Relaxed (reserve)
// 4. Move items into slots
// 5. Store `producer.tail = producer.head` Release (publish)
//
// ## Dequeue (consumer)
// 1. Load `consumer.head` Relaxed (own cursor)
// 2. Filled count from cached `producer.tail`; if short, refresh with Acquire
//    (pairs with step 5 above: slot contents are visible)
// 3. Store `consumer.head += n` Relaxed (reserve)
// 4. Move items out of slots
// 5. Store `consumer.tail = consumer.head` Release (publish free space)
//
// The head cursors are never read by the other thread; they exist so each
// side has an explicit reservation point distinct from its publish point.
//
// =============================================================================

/// One side's reservation/publish cursor pair.
#[derive(Debug)]
struct Cursors {
    /// Next cursor this side will reserve.
    head: AtomicU32,
    /// Publish point observed by the other side.
    tail: AtomicU32,
}

impl Cursors {
    const fn new(origin: u32) -> Self {
        Self {
            head: AtomicU32::new(origin),
            tail: AtomicU32::new(origin),
        }
    }
}

/// Bounded lock-free SPSC ring of `T`, moved in bursts.
///
/// Build it with [`RingBuffer::new`], then [`split`](RingBuffer::split) it into
/// the single [`Producer`] and single [`Consumer`] that may touch it.
pub struct RingBuffer<T> {
    // === PRODUCER HOT ===
    producer: CachePadded<Cursors>,
    // === CONSUMER HOT ===
    consumer: CachePadded<Cursors>,

    // === COLD STATE ===
    /// Set once the producer handle is closed or dropped
    closed: AtomicBool,
    /// Set once the consumer handle is dropped
    consumer_closed: AtomicBool,
    metrics: Metrics,
    enable_metrics: bool,
    capacity: u32,
    mask: u32,

    // === DATA BUFFER ===
    /// Fixed at construction; slot `i` holds data iff
    /// `consumer.head <= i < producer.tail` (wrapping).
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// SAFETY: slot access is partitioned by the cursor protocol above; a slot is
// touched by at most one thread between a Release publish and the matching
// Acquire load. Items cross threads, so T must be Send.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Creates a ring with `capacity` slots.
    ///
    /// Fails if the capacity is zero, not a power of two, larger than
    /// [`MAX_CAPACITY`](crate::MAX_CAPACITY), or the storage cannot be allocated.
    pub fn new(capacity: usize) -> Result<Self, ConstructionError> {
        Self::with_origin(capacity, 0, false)
    }

    /// Creates a ring from a [`Config`], honoring `enable_metrics`.
    pub fn from_config(config: &Config) -> Result<Self, ConstructionError> {
        Self::with_origin(config.capacity, 0, config.enable_metrics)
    }

    /// All four cursors start at `origin`; tests use this to exercise u32 wrap.
    fn with_origin(
        capacity: usize,
        origin: u32,
        enable_metrics: bool,
    ) -> Result<Self, ConstructionError> {
        validate_capacity(capacity)?;

        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(capacity)
            .map_err(|_| ConstructionError::AllocationFailed { capacity })?;
        buffer.resize_with(capacity, || UnsafeCell::new(MaybeUninit::uninit()));

        Ok(Self {
            producer: CachePadded::new(Cursors::new(origin)),
            consumer: CachePadded::new(Cursors::new(origin)),
            closed: AtomicBool::new(false),
            consumer_closed: AtomicBool::new(false),
            metrics: Metrics::new(),
            enable_metrics,
            capacity: capacity as u32,
            mask: (capacity - 1) as u32,
            buffer: buffer.into_boxed_slice(),
        })
    }

    /// Hands out the two endpoints. The ring lives until both are dropped.
    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        let ring = Arc::new(self);
        let origin = ring.producer.tail.load(Ordering::Relaxed);
        (
            Producer {
                ring: Arc::clone(&ring),
                cached_consumer_tail: origin,
            },
            Consumer {
                ring,
                cached_producer_tail: origin,
            },
        )
    }

    // ---------------------------------------------------------------------
    // STATUS (any thread, approximate under concurrency)
    // ---------------------------------------------------------------------

    /// Returns the number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Returns the number of published items not yet reserved by the consumer.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.consumer.head.load(Ordering::Relaxed);
        let tail = self.producer.tail.load(Ordering::Relaxed);
        (tail.wrapping_sub(head) as usize).min(self.capacity())
    }

    /// Returns true if nothing is published.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if no slot is free for the producer.
    #[inline]
    pub fn is_full(&self) -> bool {
        let head = self.producer.head.load(Ordering::Relaxed);
        let tail = self.consumer.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail) >= self.capacity
    }

    /// Returns true once the producer has closed or been dropped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns true once the consumer has been dropped. Nothing will free
    /// slots after this, so a full ring stays full.
    #[inline]
    pub fn is_consumer_closed(&self) -> bool {
        self.consumer_closed.load(Ordering::Acquire)
    }

    /// Get a snapshot of metrics if enabled.
    pub fn metrics(&self) -> MetricsSnapshot {
        if self.enable_metrics {
            self.metrics.snapshot()
        } else {
            MetricsSnapshot::default()
        }
    }

    #[inline]
    fn slot(&self, cursor: u32) -> *mut MaybeUninit<T> {
        self.buffer[(cursor & self.mask) as usize].get()
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        // Drop every published item the consumer never took.
        let head = *self.consumer.head.get_mut();
        let tail = *self.producer.tail.get_mut();
        let count = tail.wrapping_sub(head);

        for i in 0..count {
            let idx = (head.wrapping_add(i) & self.mask) as usize;
            // SAFETY: [consumer.head, producer.tail) holds initialized items
            // and we have exclusive access.
            unsafe { self.buffer[idx].get_mut().assume_init_drop() };
        }
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("producer", &*self.producer)
            .field("consumer", &*self.consumer)
            .field("closed", &self.is_closed())
            .field("consumer_closed", &self.is_consumer_closed())
            .finish_non_exhaustive()
    }
}

/// Creates a ring with `capacity` slots and splits it.
pub fn channel<T>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), ConstructionError> {
    RingBuffer::new(capacity).map(RingBuffer::split)
}

// =============================================================================
// PRODUCER
// =============================================================================

/// Write endpoint. Owns `producer.head` and `producer.tail`.
#[derive(Debug)]
pub struct Producer<T> {
    ring: Arc<RingBuffer<T>>,
    /// Last observed `consumer.tail`; never ahead of the real value.
    cached_consumer_tail: u32,
}

impl<T> Producer<T> {
    /// Enqueues the whole batch or nothing.
    ///
    /// On success every item is moved out of `items` (leaving it empty) and
    /// the batch length is returned. If the batch does not fit, `items` is
    /// untouched and 0 is returned. A batch larger than the capacity never
    /// fits, even against an empty ring.
    pub fn try_enqueue_batch(&mut self, items: &mut Vec<T>) -> usize {
        let count = items.len();
        let Some(start) = self.reserve(count) else {
            return 0;
        };

        for (i, item) in items.drain(..).enumerate() {
            // SAFETY: [start, start + count) was reserved above; the consumer
            // has released these slots (Acquire on consumer.tail) and will not
            // read them before the Release publish below.
            unsafe { (*self.ring.slot(start.wrapping_add(i as u32))).write(item) };
        }

        self.publish(start, count);
        count
    }

    /// Clones and enqueues the whole slice or nothing. Same contract as
    /// [`try_enqueue_batch`](Self::try_enqueue_batch).
    pub fn try_enqueue_slice(&mut self, items: &[T]) -> usize
    where
        T: Clone,
    {
        let count = items.len();
        let Some(start) = self.reserve(count) else {
            return 0;
        };

        let mut guard = PartialWrite {
            ring: &*self.ring,
            start,
            written: 0,
        };
        for item in items {
            let value = item.clone();
            // SAFETY: as in try_enqueue_batch; the guard undoes the
            // reservation if a clone panics.
            unsafe { (*guard.ring.slot(start.wrapping_add(guard.written))).write(value) };
            guard.written += 1;
        }
        std::mem::forget(guard);

        self.publish(start, count);
        count
    }

    /// Reserves `count` slots by advancing `producer.head`. Returns the
    /// prior head (the write start), or `None` if the batch does not fit.
    fn reserve(&mut self, count: usize) -> Option<u32> {
        let ring = &*self.ring;
        if count == 0 {
            return None;
        }
        if count > ring.capacity() {
            if ring.enable_metrics {
                ring.metrics.record_rejection();
            }
            return None;
        }

        let head = ring.producer.head.load(Ordering::Relaxed);
        let mut free = ring.capacity - head.wrapping_sub(self.cached_consumer_tail);

        if (free as usize) < count {
            // Slow path: refresh cache
            self.cached_consumer_tail = ring.consumer.tail.load(Ordering::Acquire);
            free = ring.capacity - head.wrapping_sub(self.cached_consumer_tail);
            if (free as usize) < count {
                if ring.enable_metrics {
                    ring.metrics.record_rejection();
                }
                return None;
            }
        }

        let new_head = head.wrapping_add(count as u32);
        debug_assert_bounded_count!(new_head, self.cached_consumer_tail, ring.capacity());
        ring.producer.head.store(new_head, Ordering::Relaxed);
        Some(head)
    }

    /// Publishes the reserved slots by moving `producer.tail` up to `producer.head`.
    fn publish(&self, start: u32, count: usize) {
        let ring = &*self.ring;
        let new_tail = ring.producer.head.load(Ordering::Relaxed);
        debug_assert_eq!(new_tail, start.wrapping_add(count as u32));
        debug_assert_monotonic!("producer_tail", start, new_tail, ring.capacity());

        ring.producer.tail.store(new_tail, Ordering::Release);

        if ring.enable_metrics {
            ring.metrics.record_enqueue(count);
        }
    }

    /// Free slots as seen from the producer (refreshes the cached view).
    pub fn free_slots(&mut self) -> usize {
        let ring = &*self.ring;
        self.cached_consumer_tail = ring.consumer.tail.load(Ordering::Acquire);
        let head = ring.producer.head.load(Ordering::Relaxed);
        (ring.capacity - head.wrapping_sub(self.cached_consumer_tail)) as usize
    }

    /// Marks the ring closed. The consumer observes it with
    /// [`Consumer::is_producer_closed`]. Dropping the producer also closes.
    pub fn close(&self) {
        self.ring.closed.store(true, Ordering::Release);
    }

    /// Returns true once the consumer has been dropped.
    #[inline]
    pub fn is_consumer_closed(&self) -> bool {
        self.ring.is_consumer_closed()
    }

    /// Shared view of the ring for status queries.
    pub fn ring(&self) -> &RingBuffer<T> {
        &self.ring
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Undoes a producer reservation if cloning panics mid-batch.
struct PartialWrite<'a, T> {
    ring: &'a RingBuffer<T>,
    start: u32,
    written: u32,
}

impl<T> Drop for PartialWrite<'_, T> {
    fn drop(&mut self) {
        for i in 0..self.written {
            // SAFETY: these slots were written by this reservation and never published.
            unsafe { (*self.ring.slot(self.start.wrapping_add(i))).assume_init_drop() };
        }
        self.ring.producer.head.store(self.start, Ordering::Relaxed);
    }
}

// =============================================================================
// CONSUMER
// =============================================================================

/// Read endpoint. Owns `consumer.head` and `consumer.tail`.
#[derive(Debug)]
pub struct Consumer<T> {
    ring: Arc<RingBuffer<T>>,
    /// Last observed `producer.tail`; never ahead of the real value.
    cached_producer_tail: u32,
}

impl<T> Consumer<T> {
    /// Moves up to `max` published items into `out`, in FIFO order.
    ///
    /// Partial results are normal: returns however many were available, up
    /// to `max`, and 0 if nothing is published. Never waits for more.
    pub fn try_dequeue_batch(&mut self, out: &mut Vec<T>, max: usize) -> usize {
        let ring = &*self.ring;
        if max == 0 {
            return 0;
        }

        let head = ring.consumer.head.load(Ordering::Relaxed);
        let mut filled = self.cached_producer_tail.wrapping_sub(head) as usize;

        if filled < max {
            // Slow path: refresh cache
            self.cached_producer_tail = ring.producer.tail.load(Ordering::Acquire);
            filled = self.cached_producer_tail.wrapping_sub(head) as usize;
            if filled == 0 {
                if ring.enable_metrics {
                    ring.metrics.record_empty();
                }
                return 0;
            }
        }

        let count = max.min(filled);
        let new_head = head.wrapping_add(count as u32);
        debug_assert_head_not_past_tail!(new_head, head, self.cached_producer_tail);

        // Grow `out` before reserving so nothing below can fail.
        out.reserve(count);
        ring.consumer.head.store(new_head, Ordering::Relaxed);

        for i in 0..count as u32 {
            let pos = head.wrapping_add(i);
            debug_assert_initialized_read!(pos, head, self.cached_producer_tail);
            // SAFETY: [head, producer.tail) was published with Release and
            // observed with Acquire; the producer will not reuse these slots
            // until consumer.tail moves past them.
            out.push(unsafe { (*ring.slot(pos)).assume_init_read() });
        }

        debug_assert_monotonic!("consumer_tail", head, new_head, ring.capacity());
        ring.consumer.tail.store(new_head, Ordering::Release);

        if ring.enable_metrics {
            ring.metrics.record_dequeue(count);
        }
        count
    }

    /// Published items waiting for this consumer (refreshes the cached view).
    pub fn available(&mut self) -> usize {
        let ring = &*self.ring;
        self.cached_producer_tail = ring.producer.tail.load(Ordering::Acquire);
        let head = ring.consumer.head.load(Ordering::Relaxed);
        self.cached_producer_tail.wrapping_sub(head) as usize
    }

    /// Returns true once the producer has closed or been dropped. Items it
    /// published before closing remain dequeueable.
    #[inline]
    pub fn is_producer_closed(&self) -> bool {
        self.ring.is_closed()
    }

    /// Shared view of the ring for status queries.
    pub fn ring(&self) -> &RingBuffer<T> {
        &self.ring
    }
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        // Also runs when a consumer thread unwinds, so a producer waiting
        // on a full ring can stop.
        self.ring.consumer_closed.store(true, Ordering::Release);
    }
}
