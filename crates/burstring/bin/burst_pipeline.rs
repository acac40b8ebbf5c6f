//! Runs one producer thread and one consumer thread over a burst ring until
//! Ctrl+C (or `--duration-secs`, or `--items`) stops it.
//!
//! Run with: `cargo run -p burstring --features cli --bin burst_pipeline -- --strategy doorbell --duration-secs 5`
//!
//! Flags:
//!   --capacity N        ring slots, power of two (default 512)
//!   --burst N           items per burst (default 64)
//!   --backoff-ms N      retry interval in milliseconds (default 10)
//!   --strategy S        fixed | exponential | doorbell (default fixed)
//!   --items N           stop after producing N items
//!   --duration-secs N   stop after N seconds
//!   --metrics           collect ring metrics
//!
//! Log level follows `RUST_LOG` (default `info`).

use burstring::{Config, Pipeline, PipelineReport, WorkItem};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

struct Args {
    config: Config,
    duration: Option<Duration>,
}

fn parse_args() -> Result<Args, String> {
    let mut config = Config::default();
    let mut duration = None;
    let mut args = std::env::args().skip(1);

    while let Some(flag) = args.next() {
        if flag == "--metrics" {
            config = config.with_metrics(true);
            continue;
        }
        let value = args
            .next()
            .ok_or_else(|| format!("missing value for {flag}"))?;
        let number = || {
            value
                .parse::<u64>()
                .map_err(|e| format!("invalid value for {flag}: {value} ({e})"))
        };
        match flag.as_str() {
            "--capacity" => config.capacity = number()? as usize,
            "--burst" => config.max_burst = number()? as usize,
            "--backoff-ms" => {
                config = config.with_backoff_interval(Duration::from_millis(number()?));
            }
            "--strategy" => config = config.with_wait_strategy(value.parse()?),
            "--items" => config = config.with_item_limit(number()?),
            "--duration-secs" => duration = Some(Duration::from_secs(number()?)),
            other => return Err(format!("unknown flag: {other}")),
        }
    }

    Ok(Args { config, duration })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    let Args { config, duration } = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        capacity = config.capacity,
        burst = config.max_burst,
        backoff = ?config.backoff_interval,
        strategy = ?config.wait_strategy,
        item_limit = ?config.item_limit,
        "starting burst pipeline"
    );

    let pipeline = match Pipeline::spawn(config, |_item: WorkItem| {}) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let shutdown = pipeline.shutdown_signal();
    let joined = tokio::task::spawn_blocking(move || pipeline.join());
    tokio::pin!(joined);

    let stop_after = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };

    // The first stop trigger becomes the single shutdown request.
    let result = tokio::select! {
        res = &mut joined => res,
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, requesting threads to exit");
            shutdown.request_shutdown();
            joined.await
        }
        () = stop_after => {
            info!("duration elapsed, requesting threads to exit");
            shutdown.request_shutdown();
            joined.await
        }
    };

    match result {
        Ok(Ok(report)) => {
            log_report(&report, config.enable_metrics);
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!("{e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("join task failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn log_report(report: &PipelineReport, with_metrics: bool) {
    info!(
        num_produced = report.producer.items_enqueued,
        num_processed = report.consumer.items_dequeued,
        abandoned = report.producer.items_abandoned,
        full_retries = report.producer.full_retries,
        empty_polls = report.consumer.empty_polls,
        "pipeline finished"
    );
    if with_metrics {
        let m = report.consumer.ring_metrics;
        info!(
            batches_enqueued = m.batches_enqueued,
            batches_dequeued = m.batches_dequeued,
            rejections = m.enqueue_rejections,
            empty_dequeues = m.empty_dequeues,
            "ring metrics"
        );
    }
    if !report.is_conserved() {
        warn!("produced and processed counts differ");
    }
}
