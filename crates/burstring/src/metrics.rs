use std::sync::atomic::{AtomicU64, Ordering};

/// Transfer counters for one ring.
///
/// Each counter is written by exactly one side (enqueue counters by the
/// producer, dequeue counters by the consumer), so `Relaxed` is enough.
#[derive(Debug, Default)]
pub struct Metrics {
    items_enqueued: AtomicU64,
    batches_enqueued: AtomicU64,
    enqueue_rejections: AtomicU64,
    items_dequeued: AtomicU64,
    batches_dequeued: AtomicU64,
    empty_dequeues: AtomicU64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub items_enqueued: u64,
    pub batches_enqueued: u64,
    /// Enqueue attempts refused because the batch did not fit.
    pub enqueue_rejections: u64,
    pub items_dequeued: u64,
    pub batches_dequeued: u64,
    /// Dequeue attempts that found nothing published.
    pub empty_dequeues: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_enqueue(&self, items: usize) {
        self.items_enqueued.fetch_add(items as u64, Ordering::Relaxed);
        self.batches_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_rejection(&self) {
        self.enqueue_rejections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_dequeue(&self, items: usize) {
        self.items_dequeued.fetch_add(items as u64, Ordering::Relaxed);
        self.batches_dequeued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_empty(&self) {
        self.empty_dequeues.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_enqueued: self.items_enqueued.load(Ordering::Relaxed),
            batches_enqueued: self.batches_enqueued.load(Ordering::Relaxed),
            enqueue_rejections: self.enqueue_rejections.load(Ordering::Relaxed),
            items_dequeued: self.items_dequeued.load(Ordering::Relaxed),
            batches_dequeued: self.batches_dequeued.load(Ordering::Relaxed),
            empty_dequeues: self.empty_dequeues.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Items accepted but not yet taken by the consumer at snapshot time.
    pub fn in_flight(&self) -> u64 {
        self.items_enqueued.saturating_sub(self.items_dequeued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_records() {
        let m = Metrics::new();
        m.record_enqueue(64);
        m.record_enqueue(64);
        m.record_rejection();
        m.record_dequeue(100);
        m.record_empty();

        let snap = m.snapshot();
        assert_eq!(snap.items_enqueued, 128);
        assert_eq!(snap.batches_enqueued, 2);
        assert_eq!(snap.enqueue_rejections, 1);
        assert_eq!(snap.items_dequeued, 100);
        assert_eq!(snap.batches_dequeued, 1);
        assert_eq!(snap.empty_dequeues, 1);
        assert_eq!(snap.in_flight(), 28);
    }
}
