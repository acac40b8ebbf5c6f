//! burstring - Lock-Free SPSC Burst Queue
//!
//! A bounded single-producer single-consumer ring buffer that moves bursts
//! of work items from one dedicated producer thread to one dedicated
//! consumer thread without locks.
//!
//! # Key Features
//!
//! - All-or-nothing batch enqueue, partial-allowed batch dequeue
//! - Four 32-bit wrapping cursors with acquire/release publish points
//! - Producer and consumer cursor pairs on separate cache lines
//! - Split `Producer`/`Consumer` endpoints enforce the 1:1 discipline
//! - Pluggable backoff (fixed sleep, exponential, doorbell wake-up)
//! - Cooperative shutdown with guaranteed drain
//!
//! # Example
//!
//! ```
//! use burstring::channel;
//!
//! let (mut producer, mut consumer) = channel::<u64>(512).unwrap();
//!
//! // The whole burst goes in, or none of it does
//! let mut burst: Vec<u64> = (0..64).collect();
//! assert_eq!(producer.try_enqueue_batch(&mut burst), 64);
//!
//! // Dequeue returns what is available, up to the limit
//! let mut out = Vec::new();
//! assert_eq!(consumer.try_dequeue_batch(&mut out, 100), 64);
//! assert_eq!(out[0], 0);
//! ```

mod backoff;
mod config;
mod error;
mod invariants;
mod metrics;
mod pipeline;
mod ring;
mod shutdown;
mod work;

pub use backoff::{
    backoff_for, BackoffStrategy, Doorbell, DoorbellBackoff, ExponentialBackoff, FixedBackoff,
};
pub use config::{Config, WaitStrategy, HIGH_THROUGHPUT_CONFIG, LOW_LATENCY_CONFIG, MAX_CAPACITY};
pub use error::{ConstructionError, PipelineError};
pub use metrics::{Metrics, MetricsSnapshot};
pub use pipeline::{
    ConsumerLoop, ConsumerStats, Pipeline, PipelineReport, ProducerLoop, ProducerStats,
};
pub use ring::{channel, Consumer, Producer, RingBuffer};
pub use shutdown::ShutdownSignal;
pub use work::WorkItem;
