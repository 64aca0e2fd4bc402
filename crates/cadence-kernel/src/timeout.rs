//! One-shot delayed scheduler.
//!
//! [`OneShotScheduler`] arms itself on construction: its worker waits for the
//! configured delay and then invokes the callback exactly once, unless it is
//! cancelled first.  [`restart`](OneShotScheduler::restart) disarms any
//! pending invocation and arms a fresh one from the current configuration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use uuid::Uuid;

use crate::config::TimingConfig;
use crate::error::Result;
use crate::pacer::{CancellablePacer, PacerContext, PacerState};

/// Callback fired once the delay elapses.
pub type FireFn = Arc<dyn Fn() + Send + Sync>;

/// Configuration for a [`OneShotScheduler`].
#[derive(Clone)]
pub struct OneShotConfig {
    pub callback: FireFn,
    pub delay: Duration,
    /// Fire as soon as the worker starts, ignoring `delay`.
    pub run_immediately: bool,
}

impl OneShotConfig {
    pub fn new<F>(delay: Duration, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
            delay,
            run_immediately: false,
        }
    }

    /// Build from a signed millisecond delay.  Negative values are clamped
    /// to zero, i.e. fire immediately.
    pub fn with_delay_ms<F>(delay_ms: i64, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let delay = Duration::from_millis(u64::try_from(delay_ms).unwrap_or(0));
        Self::new(delay, callback)
    }

    pub fn with_run_immediately(mut self, run_immediately: bool) -> Self {
        self.run_immediately = run_immediately;
        self
    }

    fn fires_immediately(&self) -> bool {
        self.run_immediately || self.delay.is_zero()
    }
}

impl std::fmt::Debug for OneShotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneShotConfig")
            .field("delay", &self.delay)
            .field("run_immediately", &self.run_immediately)
            .finish_non_exhaustive()
    }
}

/// Runs a callback once after a delay.
///
/// Dropping the scheduler cancels any pending invocation.
pub struct OneShotScheduler {
    pacer: CancellablePacer,
    config: Arc<RwLock<OneShotConfig>>,
    fired: Arc<AtomicBool>,
}

impl OneShotScheduler {
    /// Create and arm a scheduler with default timing.
    pub fn new(name: impl Into<String>, config: OneShotConfig) -> Result<Self> {
        Self::with_timing(name, config, &TimingConfig::default())
    }

    /// Create and arm a scheduler with explicit timing.
    pub fn with_timing(
        name: impl Into<String>,
        config: OneShotConfig,
        timing: &TimingConfig,
    ) -> Result<Self> {
        let scheduler = Self {
            pacer: CancellablePacer::new(name, timing),
            config: Arc::new(RwLock::new(config)),
            fired: Arc::new(AtomicBool::new(false)),
        };
        scheduler.arm()?;
        Ok(scheduler)
    }

    /// Cancel the pending invocation, if any, and join the worker.
    ///
    /// If the callback is already executing, this waits for it to finish.
    pub fn cancel(&self) {
        self.pacer.cancel();
    }

    /// Cancel, then arm again using the current configuration.
    pub fn restart(&self) -> Result<()> {
        self.pacer.cancel();
        self.arm()
    }

    pub fn is_cancelled(&self) -> bool {
        self.pacer.is_cancelled()
    }

    /// `true` once the callback has run (or panicked) for the current arm.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// `true` while the worker is still waiting or firing.
    pub fn is_pending(&self) -> bool {
        self.pacer.is_alive()
    }

    pub fn state(&self) -> PacerState {
        self.pacer.state()
    }

    pub fn execution_count(&self) -> u64 {
        self.pacer.execution_count()
    }

    pub fn name(&self) -> &str {
        self.pacer.name()
    }

    pub fn id(&self) -> Uuid {
        self.pacer.id()
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> OneShotConfig {
        read_config(&self.config)
    }

    /// Change the delay used by the next `restart`.
    pub fn set_delay(&self, delay: Duration) {
        self.config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .delay = delay;
    }

    /// Replace the callback.  A pending invocation that has not fired yet
    /// picks up the new callback.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .callback = Arc::new(callback);
    }

    fn arm(&self) -> Result<()> {
        self.fired.store(false, Ordering::Release);
        let config = Arc::clone(&self.config);
        let fired = Arc::clone(&self.fired);
        self.pacer.start(move |ctx| fire_once(&ctx, &config, &fired))
    }
}

impl std::fmt::Debug for OneShotScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneShotScheduler")
            .field("pacer", &self.pacer)
            .field("config", &self.config())
            .field("fired", &self.has_fired())
            .finish()
    }
}

fn read_config(config: &RwLock<OneShotConfig>) -> OneShotConfig {
    config
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn fire_once(ctx: &PacerContext, config: &RwLock<OneShotConfig>, fired: &AtomicBool) {
    let armed = read_config(config);
    if !armed.fires_immediately() && ctx.wait(armed.delay).is_halted() {
        tracing::debug!(scheduler = %ctx.name(), "cancelled before firing");
        return;
    }
    if !ctx.gate() {
        return;
    }

    let callback = read_config(config).callback;
    ctx.next_execution();
    tracing::debug!(scheduler = %ctx.name(), "firing");
    // A panic still counts as fired.
    ctx.invoke(|| callback());
    fired.store(true, Ordering::Release);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
