//! CLI entry point for cadence.
//!
//! The `cadence` binary is the composition root for the kernel primitives:
//! it loads timing configuration, builds each scheduler or bus explicitly,
//! registers schedulers in a [`SchedulerRegistry`], and tears everything
//! down before exiting.

mod cli;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use cadence_kernel::{
    EventBus, OneShotConfig, OneShotScheduler, PacerState, RecurringConfig, RecurringScheduler,
    SchedulerRegistry, TimingConfig, event_set,
};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

/// How often the foreground thread checks whether a scheduler has finished.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound on waiting for asynchronous deliveries.
const ASYNC_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct Tick {
    seq: u64,
}

#[derive(Debug)]
struct Drained;

event_set!(DemoEvents { Tick, Drained });

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let timing = match &cli.config {
        Some(path) => TimingConfig::load(path)
            .with_context(|| format!("failed to load timing config from {}", path.display()))?,
        None => TimingConfig::default(),
    };
    info!(wait_slice = ?timing.wait_slice, "timing configured");

    let registry = SchedulerRegistry::new();

    let result = match cli.command {
        Commands::Interval {
            period_ms,
            max,
            immediate,
        } => cmd_interval(&registry, &timing, period_ms, max, immediate),
        Commands::Timeout {
            delay_ms,
            cancel_after_ms,
        } => cmd_timeout(&registry, &timing, delay_ms, cancel_after_ms),
        Commands::Bus {
            listeners,
            events,
            asynchronous,
        } => cmd_bus(listeners, events, asynchronous),
    };

    if cli.json {
        let summary = serde_json::to_string_pretty(&registry.list_all())
            .context("failed to serialize registry summary")?;
        println!("{summary}");
    }

    registry.cancel_all();
    result
}

// ---------------------------------------------------------------------------
// Subcommand: interval
// ---------------------------------------------------------------------------

fn cmd_interval(
    registry: &SchedulerRegistry,
    timing: &TimingConfig,
    period_ms: u64,
    max: u64,
    immediate: bool,
) -> Result<()> {
    if max == 0 {
        bail!("--max must be at least 1");
    }

    let started = Instant::now();
    let config = RecurringConfig::new(Duration::from_millis(period_ms), move |i| {
        println!("  tick {:>3}  +{:>6} ms", i, started.elapsed().as_millis());
        true
    })
    .with_max_iterations(max)
    .with_run_immediately(immediate);

    let scheduler = Arc::new(RecurringScheduler::with_timing("interval", config, timing));
    registry.register_recurring(Arc::clone(&scheduler))?;
    scheduler.start().context("failed to start interval scheduler")?;

    while matches!(scheduler.state(), PacerState::Running | PacerState::Paused) {
        thread::sleep(POLL_INTERVAL);
    }

    info!(
        executions = scheduler.execution_count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "interval finished"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: timeout
// ---------------------------------------------------------------------------

fn cmd_timeout(
    registry: &SchedulerRegistry,
    timing: &TimingConfig,
    delay_ms: i64,
    cancel_after_ms: Option<u64>,
) -> Result<()> {
    let started = Instant::now();
    let config = OneShotConfig::with_delay_ms(delay_ms, move || {
        println!("  fired after {} ms", started.elapsed().as_millis());
    });

    let scheduler = Arc::new(
        OneShotScheduler::with_timing("timeout", config, timing)
            .context("failed to arm timeout scheduler")?,
    );
    registry.register_one_shot(Arc::clone(&scheduler))?;

    if let Some(ms) = cancel_after_ms {
        thread::sleep(Duration::from_millis(ms));
        scheduler.cancel();
    } else {
        while scheduler.is_pending() {
            thread::sleep(POLL_INTERVAL);
        }
    }

    if scheduler.has_fired() {
        println!("  timer fired");
    } else {
        println!("  timer cancelled before firing");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: bus
// ---------------------------------------------------------------------------

fn cmd_bus(listeners: usize, events: u64, asynchronous: bool) -> Result<()> {
    let bus = EventBus::<DemoEvents>::new();
    let delivered = Arc::new(AtomicU64::new(0));
    let checksum = Arc::new(AtomicU64::new(0));

    let subscriptions: Vec<_> = (0..listeners)
        .map(|_| {
            let delivered = Arc::clone(&delivered);
            let checksum = Arc::clone(&checksum);
            bus.subscribe(move |tick: &Tick| {
                delivered.fetch_add(1, Ordering::Relaxed);
                checksum.fetch_add(tick.seq, Ordering::Relaxed);
            })
        })
        .collect();
    let _drained = bus.subscribe(|_: &Drained| info!("bus drained"));

    for seq in 0..events {
        if asynchronous {
            bus.dispatch_async(Tick { seq })
                .context("failed to spawn async dispatch")?;
        } else {
            bus.dispatch(Tick { seq });
        }
    }

    let expected = events * listeners as u64;
    let deadline = Instant::now() + ASYNC_DRAIN_TIMEOUT;
    while delivered.load(Ordering::Relaxed) < expected {
        if Instant::now() >= deadline {
            bail!(
                "only {} of {} deliveries completed",
                delivered.load(Ordering::Relaxed),
                expected
            );
        }
        thread::sleep(POLL_INTERVAL);
    }
    bus.dispatch(Drained);

    println!(
        "  {} listeners, {} events, {} deliveries, checksum {}",
        listeners,
        events,
        delivered.load(Ordering::Relaxed),
        checksum.load(Ordering::Relaxed)
    );
    drop(subscriptions);
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
