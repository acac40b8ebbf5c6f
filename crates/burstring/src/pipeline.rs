//! Producer and consumer loops, and the two-thread lifecycle that runs them.
//!
//! # Example
//!
//! ```
//! use burstring::{Config, Pipeline};
//! use std::time::Duration;
//!
//! let config = Config::new(512, 64, Duration::from_millis(1)).with_item_limit(10_000);
//! let pipeline = Pipeline::spawn(config, |_item: burstring::WorkItem| {}).unwrap();
//! let report = pipeline.join().unwrap();
//! assert_eq!(report.consumer.items_dequeued, 10_000);
//! ```

use crate::backoff::{backoff_for, BackoffStrategy, Doorbell};
use crate::{
    Config, Consumer, MetricsSnapshot, PipelineError, Producer, RingBuffer, ShutdownSignal,
    WorkItem,
};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

// =============================================================================
// PRODUCER LOOP
// =============================================================================

/// Counters reported by [`ProducerLoop::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub items_enqueued: u64,
    pub bursts_enqueued: u64,
    /// Enqueue attempts that found the ring full.
    pub full_retries: u64,
    /// Items of a burst dropped because shutdown arrived, or the consumer
    /// went away, while it waited.
    pub items_abandoned: u64,
    /// Id of the last enqueued item, 0 if none.
    pub last_id: u64,
}

/// Generates bursts of [`WorkItem`]s and pushes each burst whole.
pub struct ProducerLoop<P, B> {
    producer: Producer<WorkItem<P>>,
    shutdown: ShutdownSignal,
    completion: Option<ShutdownSignal>,
    backoff: B,
    burst_size: usize,
    item_limit: Option<u64>,
    make_payload: Box<dyn FnMut(u64) -> P + Send>,
}

impl<P, B> ProducerLoop<P, B>
where
    P: Default + 'static,
    B: BackoffStrategy,
{
    /// Burst size and item limit come from `config`; payloads default to `P::default()`.
    pub fn new(
        producer: Producer<WorkItem<P>>,
        shutdown: ShutdownSignal,
        config: &Config,
        backoff: B,
    ) -> Self {
        Self {
            producer,
            shutdown,
            completion: None,
            backoff,
            burst_size: config.max_burst,
            item_limit: config.item_limit,
            make_payload: Box::new(|_| P::default()),
        }
    }
}

impl<P, B: BackoffStrategy> ProducerLoop<P, B> {
    /// Builds each item's payload from its id.
    pub fn with_payload<F>(mut self, make_payload: F) -> Self
    where
        F: FnMut(u64) -> P + Send + 'static,
    {
        self.make_payload = Box::new(make_payload);
        self
    }

    /// Requests `signal` once this loop has published its last burst,
    /// including when it unwinds from a panic.
    pub fn with_completion(mut self, signal: ShutdownSignal) -> Self {
        self.completion = Some(signal);
        self
    }

    /// Runs until shutdown is requested, the item limit is reached, or the
    /// consumer is dropped.
    pub fn run(mut self) -> ProducerStats {
        let _completion = CompletionGuard(self.completion.take());
        let mut stats = ProducerStats::default();
        let mut burst = Vec::with_capacity(self.burst_size);
        // Ids are private to this thread; the first item is 1.
        let mut next_id = 0u64;

        debug!(
            burst_size = self.burst_size,
            capacity = self.producer.ring().capacity(),
            item_limit = ?self.item_limit,
            "producer loop started"
        );

        'produce: while !self.shutdown.is_requested() && !self.producer.is_consumer_closed() {
            let want = match self.item_limit {
                Some(limit) => (limit - next_id).min(self.burst_size as u64) as usize,
                None => self.burst_size,
            };
            if want == 0 {
                break;
            }

            for _ in 0..want {
                next_id += 1;
                burst.push(WorkItem::new(next_id, (self.make_payload)(next_id)));
            }

            loop {
                let sent = self.producer.try_enqueue_batch(&mut burst);
                if sent > 0 {
                    stats.items_enqueued += sent as u64;
                    stats.bursts_enqueued += 1;
                    stats.last_id = next_id;
                    self.backoff.reset();
                    self.backoff.notify();
                    break;
                }

                stats.full_retries += 1;
                trace!(burst = burst.len(), "ring is full, backing off");
                self.backoff.wait();

                if self.producer.is_consumer_closed() {
                    warn!(burst = burst.len(), "consumer is gone, abandoning burst");
                    stats.items_abandoned += burst.len() as u64;
                    burst.clear();
                    break 'produce;
                }
                if self.shutdown.is_requested() {
                    stats.items_abandoned += burst.len() as u64;
                    burst.clear();
                    break 'produce;
                }
            }
        }

        self.producer.close();
        info!(
            produced = stats.items_enqueued,
            bursts = stats.bursts_enqueued,
            full_retries = stats.full_retries,
            abandoned = stats.items_abandoned,
            "producer loop exiting"
        );
        stats
    }
}

/// Requests the completion signal on drop.
struct CompletionGuard(Option<ShutdownSignal>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(signal) = &self.0 {
            signal.request_shutdown();
        }
    }
}

// =============================================================================
// CONSUMER LOOP
// =============================================================================

/// Counters reported by [`ConsumerLoop::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub items_dequeued: u64,
    pub bursts_dequeued: u64,
    /// Dequeue attempts that found the ring empty.
    pub empty_polls: u64,
    /// Id of the last dequeued item, 0 if none.
    pub last_id: u64,
    /// Items whose id was not greater than the previous one.
    pub out_of_order: u64,
    /// Ring metrics at exit (all zero unless enabled in the config).
    pub ring_metrics: MetricsSnapshot,
}

/// Pulls bursts out of the ring and hands each item to a handler.
pub struct ConsumerLoop<P, B> {
    consumer: Consumer<WorkItem<P>>,
    shutdown: ShutdownSignal,
    backoff: B,
    burst_size: usize,
}

impl<P, B: BackoffStrategy> ConsumerLoop<P, B> {
    /// Dequeue burst size comes from `config`.
    pub fn new(
        consumer: Consumer<WorkItem<P>>,
        shutdown: ShutdownSignal,
        config: &Config,
        backoff: B,
    ) -> Self {
        Self {
            consumer,
            shutdown,
            backoff,
            burst_size: config.max_burst,
        }
    }

    /// Runs until shutdown has been requested and a drain attempt started
    /// after observing it comes back empty.
    pub fn run<F>(mut self, mut handler: F) -> ConsumerStats
    where
        F: FnMut(WorkItem<P>),
    {
        let mut stats = ConsumerStats::default();
        let mut burst = Vec::with_capacity(self.burst_size);

        debug!(burst_size = self.burst_size, "consumer loop started");

        loop {
            // Read the flag before draining so the final empty drain is
            // ordered after the last publish that preceded the request.
            let stopping = self.shutdown.is_requested();
            let got = self.consumer.try_dequeue_batch(&mut burst, self.burst_size);

            if got == 0 {
                if stopping {
                    break;
                }
                stats.empty_polls += 1;
                trace!("ring is empty, backing off");
                self.backoff.wait();
                continue;
            }

            self.backoff.reset();
            self.backoff.notify();
            stats.bursts_dequeued += 1;

            for item in burst.drain(..) {
                if item.id <= stats.last_id {
                    stats.out_of_order += 1;
                }
                stats.last_id = item.id;
                stats.items_dequeued += 1;
                handler(item);
            }
        }

        stats.ring_metrics = self.consumer.ring().metrics();
        if stats.out_of_order > 0 {
            warn!(out_of_order = stats.out_of_order, "items arrived out of order");
        }
        info!(
            processed = stats.items_dequeued,
            bursts = stats.bursts_dequeued,
            empty_polls = stats.empty_polls,
            "consumer loop exiting"
        );
        stats
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Final stats from both threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    pub producer: ProducerStats,
    pub consumer: ConsumerStats,
}

impl PipelineReport {
    /// Every enqueued item was dequeued, none twice, none out of order.
    pub fn is_conserved(&self) -> bool {
        self.producer.items_enqueued == self.consumer.items_dequeued
            && self.producer.last_id == self.consumer.last_id
            && self.consumer.out_of_order == 0
    }
}

/// One producer thread and one consumer thread around a private ring.
///
/// The ring, burst buffers and doorbell live in the two threads; the caller
/// keeps only the [`ShutdownSignal`]. The consumer stops on an internal drain
/// signal that the producer raises after its final publish, so requesting
/// shutdown never strands published items.
pub struct Pipeline {
    shutdown: ShutdownSignal,
    producer: JoinHandle<ProducerStats>,
    consumer: JoinHandle<ConsumerStats>,
}

impl Pipeline {
    /// Starts a pipeline with default payloads.
    pub fn spawn<P, H>(config: Config, handler: H) -> Result<Self, PipelineError>
    where
        P: Default + Send + 'static,
        H: FnMut(WorkItem<P>) + Send + 'static,
    {
        Self::spawn_with(config, |_| P::default(), handler)
    }

    /// Starts a pipeline whose producer builds payloads with `make_payload`.
    pub fn spawn_with<P, M, H>(
        config: Config,
        make_payload: M,
        handler: H,
    ) -> Result<Self, PipelineError>
    where
        P: Default + Send + 'static,
        M: FnMut(u64) -> P + Send + 'static,
        H: FnMut(WorkItem<P>) + Send + 'static,
    {
        config.validate()?;
        let (producer, consumer) = RingBuffer::<WorkItem<P>>::from_config(&config)?.split();

        let doorbell = Arc::new(Doorbell::new());
        let shutdown = ShutdownSignal::new().with_doorbell(Arc::clone(&doorbell));
        let drained = ShutdownSignal::new().with_doorbell(Arc::clone(&doorbell));

        let producer_loop = ProducerLoop::new(
            producer,
            shutdown.clone(),
            &config,
            backoff_for(&config, &doorbell),
        )
        .with_payload(make_payload)
        .with_completion(drained.clone());

        let consumer_loop =
            ConsumerLoop::new(consumer, drained, &config, backoff_for(&config, &doorbell));

        let producer = thread::Builder::new()
            .name("burst-producer".into())
            .spawn(move || producer_loop.run())
            .map_err(|source| PipelineError::Spawn {
                name: "producer",
                source,
            })?;

        let consumer = match thread::Builder::new()
            .name("burst-consumer".into())
            .spawn(move || consumer_loop.run(handler))
        {
            Ok(handle) => handle,
            Err(source) => {
                shutdown.request_shutdown();
                let _ = producer.join();
                return Err(PipelineError::Spawn {
                    name: "consumer",
                    source,
                });
            }
        };

        debug!(
            capacity = config.capacity,
            burst = config.max_burst,
            strategy = ?config.wait_strategy,
            "pipeline started"
        );

        Ok(Self {
            shutdown,
            producer,
            consumer,
        })
    }

    /// A handle that stops the pipeline when requested.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Requests shutdown. Idempotent.
    pub fn request_shutdown(&self) -> bool {
        self.shutdown.request_shutdown()
    }

    /// True once both threads have exited.
    pub fn is_finished(&self) -> bool {
        self.producer.is_finished() && self.consumer.is_finished()
    }

    /// Waits for both threads to exit.
    ///
    /// Without an item limit this blocks until shutdown is requested. If the
    /// consumer thread panics the producer stops on its own and this returns
    /// [`PipelineError::ThreadPanicked`].
    pub fn join(self) -> Result<PipelineReport, PipelineError> {
        let producer = self.producer.join();
        let consumer = self.consumer.join();
        match (producer, consumer) {
            (Ok(producer), Ok(consumer)) => Ok(PipelineReport { producer, consumer }),
            (Err(_), _) => Err(PipelineError::ThreadPanicked("producer")),
            (_, Err(_)) => Err(PipelineError::ThreadPanicked("consumer")),
        }
    }
}
