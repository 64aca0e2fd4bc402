//! Cancellable pacer.
//!
//! The pacer owns at most one worker thread and the flags that steer it.
//! Both schedulers hand it a loop body; the body receives a [`PacerContext`]
//! through which it waits, honours pause, counts executions, and invokes the
//! user callback behind a panic barrier.
//!
//! # State machine
//!
//! ```text
//! Idle --start--> Running --pause--> Paused --resume--> Running
//!                    |                  |
//!                    +------cancel------+----> Cancelled
//!                    |
//!                    +--body returns--> Stopped
//! ```
//!
//! Waits are sliced into chunks of at most [`TimingConfig::wait_slice`], so a
//! cancel or pause is observed within one slice even if the condition
//! variable notification is missed.  `cancel()` joins the worker, which means
//! no callback runs after it returns.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TimingConfig;
use crate::error::{KernelError, Result};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Observable lifecycle state of a pacer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacerState {
    /// Never started.
    Idle,
    /// Worker alive and not paused.
    Running,
    /// Worker alive but blocked before its next invocation.
    Paused,
    /// Explicitly cancelled; terminal until the next `start`.
    Cancelled,
    /// Worker exited on its own (callback asked to stop, iteration cap
    /// reached, callback panicked) or via `stop`.
    Stopped,
}

/// Result of a sliced wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full duration elapsed.
    Elapsed,
    /// `stop` or `cancel` was requested while waiting.
    Halted,
}

impl WaitOutcome {
    pub fn is_halted(self) -> bool {
        self == Self::Halted
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct PacerShared {
    name: String,
    id: Uuid,
    slice: Duration,

    /// Worker thread alive.
    running: AtomicBool,
    paused: AtomicBool,
    /// Set by `cancel`; cleared only by the next `start`.
    cancelled: AtomicBool,
    /// Set by `stop` and `cancel`; tells the worker to leave its loop.
    halt: AtomicBool,
    /// `start` has succeeded at least once.
    launched: AtomicBool,
    execution_count: AtomicU64,

    /// Flag writes that must wake the worker happen under this lock.
    gate: Mutex<()>,
    signal: Condvar,
}

impl PacerShared {
    fn lock_gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flip a flag under the gate lock and wake the worker.
    fn signal_with(&self, update: impl FnOnce()) {
        let _guard = self.lock_gate();
        update();
        self.signal.notify_all();
    }
}

/// Clears `running` when the worker exits, however it exits.
struct RunningGuard(Arc<PacerShared>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.signal_with(|| self.0.running.store(false, Ordering::Release));
        tracing::debug!(
            scheduler = %self.0.name,
            executions = self.0.execution_count.load(Ordering::Acquire),
            "worker exited"
        );
    }
}

// ---------------------------------------------------------------------------
// Worker-side handle
// ---------------------------------------------------------------------------

/// The worker thread's view of its pacer.
#[derive(Clone)]
pub struct PacerContext {
    shared: Arc<PacerShared>,
}

impl PacerContext {
    /// Block for `duration`, waking early if the pacer is halted.
    ///
    /// A zero duration returns immediately unless a halt is pending.  A
    /// duration too large to represent as a deadline waits until halted.
    pub fn wait(&self, duration: Duration) -> WaitOutcome {
        let shared = &self.shared;
        let deadline = Instant::now().checked_add(duration);
        let mut guard = shared.lock_gate();
        loop {
            if shared.halt.load(Ordering::Acquire) {
                return WaitOutcome::Halted;
            }
            let chunk = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitOutcome::Elapsed;
                    }
                    (deadline - now).min(shared.slice)
                }
                None => shared.slice,
            };
            tracing::trace!(scheduler = %shared.name, ?chunk, "waiting");
            guard = shared
                .signal
                .wait_timeout(guard, chunk)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Block while paused.  Returns `false` if the pacer was halted, in
    /// which case the caller must not invoke its callback.
    pub fn gate(&self) -> bool {
        let shared = &self.shared;
        let mut guard = shared.lock_gate();
        loop {
            if shared.halt.load(Ordering::Acquire) {
                return false;
            }
            if !shared.paused.load(Ordering::Acquire) {
                return true;
            }
            guard = shared
                .signal
                .wait_timeout(guard, shared.slice)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Return the current execution index and advance the counter.
    pub fn next_execution(&self) -> u64 {
        self.shared.execution_count.fetch_add(1, Ordering::AcqRel)
    }

    pub fn execution_count(&self) -> u64 {
        self.shared.execution_count.load(Ordering::Acquire)
    }

    pub fn is_halted(&self) -> bool {
        self.shared.halt.load(Ordering::Acquire)
    }

    /// Run `f`, converting a panic into `None`.
    ///
    /// The panic is logged and swallowed; it never crosses the worker
    /// thread boundary.
    pub fn invoke<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Some(value),
            Err(payload) => {
                tracing::error!(
                    scheduler = %self.shared.name,
                    scheduler_id = %self.shared.id,
                    panic = %panic_message(payload.as_ref()),
                    "callback panicked; stopping"
                );
                None
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

/// Best-effort extraction of a panic payload's message.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// CancellablePacer
// ---------------------------------------------------------------------------

/// Owner-side handle: one worker thread plus its lifecycle flags.
///
/// Dropping the pacer cancels it and joins the worker.
pub struct CancellablePacer {
    shared: Arc<PacerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    thread_name: String,
}

impl CancellablePacer {
    /// Create an idle pacer.  Nothing is spawned until [`start`](Self::start).
    pub fn new(name: impl Into<String>, timing: &TimingConfig) -> Self {
        let name = name.into();
        let thread_name = format!("{}-{}", timing.thread_name, name);
        Self {
            shared: Arc::new(PacerShared {
                name,
                id: Uuid::now_v7(),
                slice: timing.wait_slice.max(Duration::from_millis(1)),
                running: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
                halt: AtomicBool::new(false),
                launched: AtomicBool::new(false),
                execution_count: AtomicU64::new(0),
                gate: Mutex::new(()),
                signal: Condvar::new(),
            }),
            worker: Mutex::new(None),
            thread_name,
        }
    }

    /// Spawn the worker running `body`.
    ///
    /// Fails with [`KernelError::AlreadyRunning`] (and changes nothing) if a
    /// worker is still alive.  Otherwise clears `cancelled` and `paused`,
    /// resets the execution counter, and returns without waiting for the
    /// body to begin.
    pub fn start<F>(&self, body: F) -> Result<()>
    where
        F: FnOnce(PacerContext) + Send + 'static,
    {
        let mut worker = self.lock_worker();

        if self.shared.running.load(Ordering::Acquire) {
            tracing::warn!(scheduler = %self.shared.name, "start rejected: already running");
            return Err(KernelError::AlreadyRunning {
                name: self.shared.name.clone(),
            });
        }

        // Reap a worker that has already left its loop.
        if let Some(finished) = worker.take() {
            self.join(finished);
        }

        self.shared.signal_with(|| {
            self.shared.cancelled.store(false, Ordering::Release);
            self.shared.paused.store(false, Ordering::Release);
            self.shared.halt.store(false, Ordering::Release);
            self.shared.execution_count.store(0, Ordering::Release);
            self.shared.running.store(true, Ordering::Release);
        });

        let ctx = PacerContext {
            shared: Arc::clone(&self.shared),
        };
        let guard = RunningGuard(Arc::clone(&self.shared));
        let spawned = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                let _guard = guard;
                body(ctx);
            });

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                self.shared.launched.store(true, Ordering::Release);
                tracing::info!(
                    scheduler = %self.shared.name,
                    scheduler_id = %self.shared.id,
                    "worker started"
                );
                Ok(())
            }
            Err(err) => {
                // The closure (and with it the guard) was dropped, which
                // already cleared `running`.
                tracing::error!(scheduler = %self.shared.name, error = %err, "worker spawn failed");
                Err(KernelError::ThreadSpawn {
                    name: self.shared.name.clone(),
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Hold the worker before its next invocation.
    ///
    /// Returns `false` if no worker is alive, the pacer is already paused,
    /// or it has been cancelled.
    pub fn pause(&self) -> bool {
        let mut changed = false;
        self.shared.signal_with(|| {
            if self.shared.running.load(Ordering::Acquire)
                && !self.shared.cancelled.load(Ordering::Acquire)
            {
                changed = !self.shared.paused.swap(true, Ordering::AcqRel);
            }
        });
        if changed {
            tracing::debug!(scheduler = %self.shared.name, "paused");
        }
        changed
    }

    /// Release a paused worker.  Returns `false` if it was not paused.
    pub fn resume(&self) -> bool {
        let mut changed = false;
        self.shared.signal_with(|| {
            changed = self.shared.paused.swap(false, Ordering::AcqRel);
        });
        if changed {
            tracing::debug!(scheduler = %self.shared.name, "resumed");
        }
        changed
    }

    /// Mark the pacer cancelled and join the worker.
    ///
    /// Legal in any state, including before `start`.  When called from the
    /// worker thread itself the join is skipped; the worker leaves its loop
    /// at the next wait or gate.
    pub fn cancel(&self) {
        tracing::info!(scheduler = %self.shared.name, "cancel requested");
        self.halt_and_join(true);
    }

    /// Ask the worker to leave its loop and join it, without marking the
    /// pacer cancelled.
    pub fn stop(&self) {
        tracing::info!(scheduler = %self.shared.name, "stop requested");
        self.halt_and_join(false);
    }

    /// `true` while the worker is alive and not paused.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire) && !self.shared.paused.load(Ordering::Acquire)
    }

    /// `true` while the worker is alive.
    pub fn is_alive(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    pub fn execution_count(&self) -> u64 {
        self.shared.execution_count.load(Ordering::Acquire)
    }

    pub fn state(&self) -> PacerState {
        let shared = &self.shared;
        if shared.cancelled.load(Ordering::Acquire) {
            PacerState::Cancelled
        } else if shared.running.load(Ordering::Acquire) {
            if shared.paused.load(Ordering::Acquire) {
                PacerState::Paused
            } else {
                PacerState::Running
            }
        } else if shared.launched.load(Ordering::Acquire) {
            PacerState::Stopped
        } else {
            PacerState::Idle
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    // -- Private helpers ----------------------------------------------------

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raise the halt flag and take the worker handle in one critical
    /// section on the worker lock, so a concurrent `start` cannot slip a new
    /// worker in between and have it joined (or its halt cleared).
    fn halt_and_join(&self, cancel: bool) {
        let handle = {
            let mut worker = self.lock_worker();
            self.shared.signal_with(|| {
                if cancel {
                    self.shared.cancelled.store(true, Ordering::Release);
                }
                self.shared.halt.store(true, Ordering::Release);
            });
            match worker.as_ref() {
                Some(h) if h.thread().id() == thread::current().id() => None,
                _ => worker.take(),
            }
        };
        if let Some(handle) = handle {
            self.join(handle);
        }
    }

    fn join(&self, handle: JoinHandle<()>) {
        if let Err(payload) = handle.join() {
            tracing::error!(
                scheduler = %self.shared.name,
                panic = %panic_message(payload.as_ref()),
                "worker thread panicked"
            );
        }
    }
}

impl Drop for CancellablePacer {
    fn drop(&mut self) {
        if self.shared.running.load(Ordering::Acquire) {
            self.cancel();
        }
    }
}

impl std::fmt::Debug for CancellablePacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellablePacer")
            .field("name", &self.shared.name)
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("execution_count", &self.execution_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
