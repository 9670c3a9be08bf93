mod config;
mod evaluator;
mod feed;

use anyhow::{Context, Result};
use clap::Parser;
use config::Args;
use evaluator::KeywordGrader;
use gradeq_dispatcher::Dispatcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::BufReader;
use tokio::signal;
use tracing::{error, info, instrument, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing subscriber
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_line_number(true)
            .init();
    }

    info!("Gradeq Worker booting...");

    let config = args.resolve_config().map_err(|e| {
        error!("Failed to load dispatcher configuration: {:#}", e);
        e
    })?;

    info!(
        max_concurrent = config.max_concurrent,
        tick_interval_ms = config.tick_interval_ms,
        grade_timeout_ms = ?config.grade_timeout_ms,
        max_attempts = config.retry.max_attempts,
        "Dispatcher configured"
    );

    let dispatcher = Dispatcher::new(config, Arc::new(KeywordGrader))?;
    let reporter = tokio::spawn(report_status(
        dispatcher.clone(),
        Duration::from_secs(args.status_every.max(1)),
    ));

    tokio::select! {
        result = run(&args, &dispatcher) => result?,
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            let status = dispatcher.status();
            warn!(
                queue_length = status.queue_length,
                in_flight = status.in_flight,
                "Received shutdown signal, abandoning pending jobs"
            );
        }
    }

    reporter.abort();
    info!("Worker shutdown complete");
    Ok(())
}

/// Feed all input to the dispatcher, then wait for the queue to drain.
#[instrument(skip_all, fields(input = ?args.input))]
async fn run(args: &Args, dispatcher: &Dispatcher) -> Result<()> {
    let summary = match &args.input {
        Some(path) => {
            let file = File::open(path)
                .await
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            feed::feed(BufReader::new(file), dispatcher).await?
        }
        None => feed::feed(BufReader::new(tokio::io::stdin()), dispatcher).await?,
    };

    info!(
        accepted = summary.accepted,
        rejected = summary.rejected,
        malformed = summary.malformed,
        "Input exhausted, draining queue"
    );

    dispatcher.wait_idle().await;
    info!("All admitted jobs processed");
    Ok(())
}

async fn report_status(dispatcher: Dispatcher, every: Duration) {
    let mut ticks = tokio::time::interval(every);
    loop {
        ticks.tick().await;
        let status = dispatcher.status();
        if status.running {
            info!(
                queue_length = status.queue_length,
                in_flight = status.in_flight,
                capacity = status.capacity,
                "Dispatcher status"
            );
        }
    }
}
