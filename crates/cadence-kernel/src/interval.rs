//! Recurring scheduler.
//!
//! [`RecurringScheduler`] runs a callback on a fixed cadence on its own
//! worker thread.  The callback receives the zero-based execution index and
//! returns `true` to keep going or `false` to stop.
//!
//! # Cadence
//!
//! The period is measured from the start of one invocation to the start of
//! the next: after each call the worker sleeps `period - callback_duration`
//! (saturating at zero).  A period of zero therefore re-invokes immediately.
//!
//! # Live configuration
//!
//! The configuration lives behind a lock shared with the worker, which reads
//! the callback, period and iteration cap afresh on every tick.  Edits made
//! through [`RecurringScheduler::update_config`] and the `set_*` helpers take
//! effect on the next tick without a restart.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::TimingConfig;
use crate::error::Result;
use crate::pacer::{CancellablePacer, PacerContext, PacerState};

/// Callback invoked on every tick.  Return `false` to stop the scheduler.
pub type TickFn = Arc<dyn Fn(u64) -> bool + Send + Sync>;

/// Configuration for a [`RecurringScheduler`].
#[derive(Clone)]
pub struct RecurringConfig {
    pub callback: TickFn,
    /// Time between the starts of consecutive invocations.
    pub period: Duration,
    /// Stop after this many invocations.  `0` means unbounded.
    pub max_iterations: u64,
    /// Invoke once as soon as the worker starts instead of waiting a full
    /// period first.
    pub run_immediately: bool,
}

impl RecurringConfig {
    /// Unbounded schedule that waits one period before the first tick.
    pub fn new<F>(period: Duration, callback: F) -> Self
    where
        F: Fn(u64) -> bool + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
            period,
            max_iterations: 0,
            run_immediately: false,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_run_immediately(mut self, run_immediately: bool) -> Self {
        self.run_immediately = run_immediately;
        self
    }
}

impl std::fmt::Debug for RecurringConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecurringConfig")
            .field("period", &self.period)
            .field("max_iterations", &self.max_iterations)
            .field("run_immediately", &self.run_immediately)
            .finish_non_exhaustive()
    }
}

/// Repeats a callback on a cadence until stopped, cancelled, or exhausted.
///
/// Created idle; call [`start`](Self::start) to spawn the worker.  Dropping
/// the scheduler cancels it.
pub struct RecurringScheduler {
    pacer: CancellablePacer,
    config: Arc<RwLock<RecurringConfig>>,
    last_run: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl RecurringScheduler {
    /// Create an idle scheduler with default timing.
    pub fn new(name: impl Into<String>, config: RecurringConfig) -> Self {
        Self::with_timing(name, config, &TimingConfig::default())
    }

    /// Create an idle scheduler with explicit timing.
    pub fn with_timing(
        name: impl Into<String>,
        config: RecurringConfig,
        timing: &TimingConfig,
    ) -> Self {
        Self {
            pacer: CancellablePacer::new(name, timing),
            config: Arc::new(RwLock::new(config)),
            last_run: Arc::new(RwLock::new(None)),
        }
    }

    /// Spawn the worker.  Fails with `AlreadyRunning` if it is still alive.
    pub fn start(&self) -> Result<()> {
        let config = Arc::clone(&self.config);
        let last_run = Arc::clone(&self.last_run);
        self.pacer.start(move |ctx| run_loop(&ctx, &config, &last_run))
    }

    /// Stop the worker and join it.  The scheduler can be started again.
    pub fn stop(&self) {
        self.pacer.stop();
    }

    pub fn pause(&self) -> bool {
        self.pacer.pause()
    }

    pub fn resume(&self) -> bool {
        self.pacer.resume()
    }

    /// Cancel and join.  No callback runs after this returns.
    pub fn cancel(&self) {
        self.pacer.cancel();
    }

    /// Cancel, then start again with a fresh execution counter.
    pub fn restart(&self) -> Result<()> {
        self.pacer.cancel();
        self.start()
    }

    pub fn is_running(&self) -> bool {
        self.pacer.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.pacer.is_paused()
    }

    pub fn is_cancelled(&self) -> bool {
        self.pacer.is_cancelled()
    }

    pub fn execution_count(&self) -> u64 {
        self.pacer.execution_count()
    }

    pub fn state(&self) -> PacerState {
        self.pacer.state()
    }

    pub fn name(&self) -> &str {
        self.pacer.name()
    }

    pub fn id(&self) -> Uuid {
        self.pacer.id()
    }

    /// Wall-clock time at which the most recent invocation began.
    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        *self.last_run.read().unwrap_or_else(PoisonError::into_inner)
    }

    // -- Live configuration -------------------------------------------------

    /// Snapshot of the current configuration.
    pub fn config(&self) -> RecurringConfig {
        read_config(&self.config)
    }

    /// Edit the configuration in place.  The worker sees the change on its
    /// next tick.
    pub fn update_config(&self, edit: impl FnOnce(&mut RecurringConfig)) {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        edit(&mut config);
        tracing::debug!(scheduler = %self.name(), config = ?*config, "configuration updated");
    }

    pub fn set_period(&self, period: Duration) {
        self.update_config(|c| c.period = period);
    }

    pub fn set_max_iterations(&self, max_iterations: u64) {
        self.update_config(|c| c.max_iterations = max_iterations);
    }

    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(u64) -> bool + Send + Sync + 'static,
    {
        self.update_config(|c| c.callback = Arc::new(callback));
    }
}

impl std::fmt::Debug for RecurringScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecurringScheduler")
            .field("pacer", &self.pacer)
            .field("config", &self.config())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Worker loop
// ---------------------------------------------------------------------------

fn read_config(config: &RwLock<RecurringConfig>) -> RecurringConfig {
    config
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn cap_reached(ctx: &PacerContext, max_iterations: u64) -> bool {
    max_iterations > 0 && ctx.execution_count() >= max_iterations
}

fn run_loop(
    ctx: &PacerContext,
    config: &RwLock<RecurringConfig>,
    last_run: &RwLock<Option<DateTime<Utc>>>,
) {
    let initial = read_config(config);
    if !initial.run_immediately && ctx.wait(initial.period).is_halted() {
        return;
    }

    loop {
        if !ctx.gate() {
            return;
        }

        let current = read_config(config);
        if cap_reached(ctx, current.max_iterations) {
            tracing::debug!(scheduler = %ctx.name(), "iteration cap reached");
            return;
        }

        let index = ctx.next_execution();
        *last_run.write().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        tracing::trace!(scheduler = %ctx.name(), execution = index, "tick");

        let started = Instant::now();
        let keep_going = ctx.invoke(|| (current.callback)(index)).unwrap_or(false);
        let elapsed = started.elapsed();

        if !keep_going {
            tracing::debug!(scheduler = %ctx.name(), execution = index, "callback requested stop");
            return;
        }

        // Re-read so edits made during the callback apply to this wait.
        let current = read_config(config);
        if cap_reached(ctx, current.max_iterations) {
            tracing::debug!(scheduler = %ctx.name(), "iteration cap reached");
            return;
        }

        let delay = current.period.saturating_sub(elapsed);
        if ctx.wait(delay).is_halted() {
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
