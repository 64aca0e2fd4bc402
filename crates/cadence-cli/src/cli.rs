//! CLI argument definitions for cadence.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// cadence -- recurring timers, one-shot timers, and a typed event bus.
#[derive(Parser)]
#[command(
    name = "cadence",
    version,
    about = "cadence -- thread-backed schedulers and event bus",
    long_about = "Drives the cadence kernel primitives from the command line: run a \
                  recurring scheduler, arm a one-shot timer, or push events through a bus."
)]
pub struct Cli {
    /// TOML file with timing overrides (`wait_slice_ms`, `thread_name`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Default log level when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Print a JSON summary of the registry when the command finishes.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a recurring scheduler until it reaches its iteration cap.
    Interval {
        /// Milliseconds between the starts of consecutive ticks.
        #[arg(long, default_value_t = 500)]
        period_ms: u64,

        /// Number of ticks to run (must be at least 1).
        #[arg(long, default_value_t = 5)]
        max: u64,

        /// Tick once immediately instead of waiting a full period first.
        #[arg(long)]
        immediate: bool,
    },

    /// Arm a one-shot timer and wait for it.
    Timeout {
        /// Delay before firing; negative values fire immediately.
        #[arg(long, default_value_t = 1000, allow_negative_numbers = true)]
        delay_ms: i64,

        /// Cancel the timer after this many milliseconds.
        #[arg(long)]
        cancel_after_ms: Option<u64>,
    },

    /// Dispatch events through a typed bus.
    Bus {
        /// Number of listeners to subscribe.
        #[arg(long, default_value_t = 3)]
        listeners: usize,

        /// Number of events to dispatch.
        #[arg(long, default_value_t = 10)]
        events: u64,

        /// Use fire-and-forget dispatch.
        #[arg(long = "async")]
        asynchronous: bool,
    },
}
