use burstring::{
    channel, Config, ConsumerLoop, FixedBackoff, Pipeline, ProducerLoop, ShutdownSignal,
    WaitStrategy, WorkItem,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const STRESS_ITEMS: u64 = 1_000_000;
const STRESS_CAPACITY: usize = 512;
const STRESS_BURST: usize = 64;

#[test]
fn test_stress_one_million_items_in_order() {
    let (mut producer, mut consumer) = channel::<u64>(STRESS_CAPACITY).unwrap();

    let producer_handle = thread::spawn(move || {
        let mut next = 0u64;
        let mut burst = Vec::with_capacity(STRESS_BURST);
        while next < STRESS_ITEMS {
            if burst.is_empty() {
                let end = (next + STRESS_BURST as u64).min(STRESS_ITEMS);
                burst.extend(next..end);
            }
            let n = burst.len();
            let sent = producer.try_enqueue_batch(&mut burst);
            assert!(sent == 0 || sent == n, "partial enqueue: {sent} of {n}");
            if sent == 0 {
                thread::yield_now();
            } else {
                next += sent as u64;
            }
        }
    });

    let mut expected = 0u64;
    let mut out = Vec::with_capacity(STRESS_BURST);
    while expected < STRESS_ITEMS {
        out.clear();
        let got = consumer.try_dequeue_batch(&mut out, STRESS_BURST);
        assert!(got <= STRESS_BURST);
        if got == 0 {
            thread::yield_now();
            continue;
        }
        for item in &out {
            assert_eq!(*item, expected, "FIFO violation");
            expected += 1;
        }
    }

    producer_handle.join().unwrap();
    assert_eq!(expected, STRESS_ITEMS);
    out.clear();
    assert_eq!(consumer.try_dequeue_batch(&mut out, STRESS_BURST), 0);
}

#[test]
fn test_stress_loops_with_fixed_backoff() {
    let config = Config::new(STRESS_CAPACITY, STRESS_BURST, Duration::from_micros(50))
        .with_item_limit(STRESS_ITEMS);
    let (producer, consumer) = channel::<WorkItem>(config.capacity).unwrap();
    let done = ShutdownSignal::new();

    let producer_handle = thread::spawn({
        let done = done.clone();
        move || {
            ProducerLoop::new(
                producer,
                ShutdownSignal::new(),
                &config,
                FixedBackoff::new(config.backoff_interval),
            )
            .with_completion(done)
            .run()
        }
    });

    let mut expected = 1u64;
    let stats = ConsumerLoop::new(
        consumer,
        done,
        &config,
        FixedBackoff::new(config.backoff_interval),
    )
    .run(|item| {
        assert_eq!(item.id, expected);
        expected += 1;
    });

    let produced = producer_handle.join().unwrap();
    assert_eq!(produced.items_enqueued, STRESS_ITEMS);
    assert_eq!(stats.items_dequeued, STRESS_ITEMS);
    assert_eq!(stats.out_of_order, 0);
    assert_eq!(stats.last_id, STRESS_ITEMS);
}

#[test]
fn test_shutdown_drain_delivers_every_item() {
    const N: u64 = 300;
    let config = Config::new(512, 64, Duration::from_millis(1));
    let (mut producer, consumer) = channel::<WorkItem>(config.capacity).unwrap();

    for chunk in (1..=N).collect::<Vec<_>>().chunks(64) {
        let mut burst: Vec<WorkItem> = chunk.iter().map(|&id| WorkItem::new(id, ())).collect();
        assert_eq!(producer.try_enqueue_batch(&mut burst), chunk.len());
    }

    // Signal set before the consumer has read anything.
    let shutdown = ShutdownSignal::new();
    shutdown.request_shutdown();

    let handle = thread::spawn(move || {
        ConsumerLoop::new(
            consumer,
            shutdown,
            &config,
            FixedBackoff::new(config.backoff_interval),
        )
        .run(|_| {})
    });

    let stats = handle.join().unwrap();
    assert_eq!(stats.items_dequeued, N);
    assert_eq!(stats.last_id, N);
    drop(producer);
}

#[test]
fn test_consumer_exits_promptly_on_empty_ring() {
    let config = Config::new(64, 8, Duration::from_millis(5));
    let (_producer, consumer) = channel::<WorkItem>(config.capacity).unwrap();
    let shutdown = ShutdownSignal::new();

    let handle = thread::spawn({
        let shutdown = shutdown.clone();
        move || {
            ConsumerLoop::new(
                consumer,
                shutdown,
                &config,
                FixedBackoff::new(config.backoff_interval),
            )
            .run(|_| {})
        }
    });

    thread::sleep(Duration::from_millis(20));
    let start = Instant::now();
    shutdown.request_shutdown();
    let stats = handle.join().unwrap();

    assert_eq!(stats.items_dequeued, 0);
    assert!(stats.empty_polls > 0);
    assert!(start.elapsed() < Duration::from_secs(1));
}

fn run_pipeline_until_shutdown(strategy: WaitStrategy) {
    let config = Config::new(256, 32, Duration::from_millis(2))
        .with_wait_strategy(strategy)
        .with_metrics(true);
    let seen = Arc::new(AtomicU64::new(0));
    let seen_in_handler = Arc::clone(&seen);

    let pipeline = Pipeline::spawn(config, move |_item: WorkItem| {
        seen_in_handler.fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while seen.load(Ordering::Relaxed) < 10_000 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(pipeline.request_shutdown());
    assert!(!pipeline.request_shutdown());

    let report = pipeline.join().unwrap();
    assert!(report.is_conserved(), "{report:?}");
    assert_eq!(report.consumer.items_dequeued, seen.load(Ordering::Relaxed));
    assert_eq!(
        report.consumer.ring_metrics.items_enqueued,
        report.producer.items_enqueued
    );
    assert!(report.producer.items_enqueued >= 10_000);
}

#[test]
fn test_pipeline_fixed_strategy() {
    run_pipeline_until_shutdown(WaitStrategy::Fixed);
}

#[test]
fn test_pipeline_exponential_strategy() {
    run_pipeline_until_shutdown(WaitStrategy::Exponential);
}

#[test]
fn test_pipeline_doorbell_strategy() {
    run_pipeline_until_shutdown(WaitStrategy::Doorbell);
}

#[test]
fn test_pipeline_slow_consumer_applies_backpressure() {
    let config = Config::new(16, 8, Duration::from_millis(1))
        .with_item_limit(200)
        .with_wait_strategy(WaitStrategy::Doorbell);

    let pipeline = Pipeline::spawn(config, |_item: WorkItem| {
        thread::sleep(Duration::from_micros(200));
    })
    .unwrap();

    let report = pipeline.join().unwrap();
    assert!(report.is_conserved());
    assert_eq!(report.consumer.items_dequeued, 200);
    assert!(report.producer.full_retries > 0);
}

#[test]
fn test_pipeline_shutdown_signal_is_shared() {
    let config = Config::new(64, 16, Duration::from_millis(1));
    let pipeline = Pipeline::spawn(config, |_item: WorkItem| {}).unwrap();

    let signal = pipeline.shutdown_signal();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        signal.request_shutdown();
    });

    let report = pipeline.join().unwrap();
    assert!(report.is_conserved());
}
